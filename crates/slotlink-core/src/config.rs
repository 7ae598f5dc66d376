use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const CONFIG_VERSION: u32 = 1;

/// Default time constant of the per-user delay estimator, in seconds.
pub const DEFAULT_DELAY_TIME_CONSTANT_S: f64 = 1.0;

/// Which metric picks the user served in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Highest `instantaneous_rate / mean_achieved_rate`.
    ProportionalFair,
    /// Highest `instantaneous_rate * backlog^alpha`.
    MaxWeight,
}

impl SelectionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionRule::ProportionalFair => "proportional_fair",
            SelectionRule::MaxWeight => "max_weight",
        }
    }
}

impl fmt::Display for SelectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SelectionRule {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "proportional_fair" | "propfair" => Ok(SelectionRule::ProportionalFair),
            "max_weight" | "maxweight" => Ok(SelectionRule::MaxWeight),
            other => Err(ConfigError::UnknownRule(other.to_string())),
        }
    }
}

/// Raw, unvalidated scheduler parameters as they appear in TOML.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfigInput {
    pub version: u32,
    pub num_users: Option<i64>,
    pub feedback_delay: Option<f64>,
    pub slot_duration: Option<f64>,
    pub ewma_window: Option<i64>,
    pub alpha: Option<f64>,
    pub selection_rule: Option<String>,
    pub delay_time_constant: Option<f64>,
}

/// Validated scheduler parameters, fixed for the scheduler's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerConfig {
    pub num_users: usize,
    /// Passed through to the rate estimator; unused by the scheduler itself.
    pub feedback_delay: f64,
    pub slot_duration: f64,
    pub ewma_window: u32,
    pub alpha: f64,
    pub selection_rule: SelectionRule,
    pub delay_time_constant: f64,
}

impl SchedulerConfigInput {
    pub fn resolve(self) -> Result<SchedulerConfig, ConfigError> {
        let version = if self.version == 0 {
            CONFIG_VERSION
        } else {
            self.version
        };
        if version != CONFIG_VERSION {
            return Err(ConfigError::UnsupportedVersion(version));
        }

        let num_users = self.num_users.ok_or(ConfigError::Missing("num_users"))?;
        if num_users <= 0 {
            return Err(ConfigError::OutOfRange {
                name: "num_users",
                expected: "a positive integer",
                value: num_users as f64,
            });
        }

        let feedback_delay = self
            .feedback_delay
            .ok_or(ConfigError::Missing("feedback_delay"))?;
        if !feedback_delay.is_finite() || feedback_delay < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "feedback_delay",
                expected: "a finite non-negative number",
                value: feedback_delay,
            });
        }

        let slot_duration = self
            .slot_duration
            .ok_or(ConfigError::Missing("slot_duration"))?;
        check_positive("slot_duration", slot_duration)?;

        let ewma_window = self.ewma_window.ok_or(ConfigError::Missing("ewma_window"))?;
        if ewma_window <= 0 || ewma_window > u32::MAX as i64 {
            return Err(ConfigError::OutOfRange {
                name: "ewma_window",
                expected: "a positive integer",
                value: ewma_window as f64,
            });
        }

        let alpha = self.alpha.ok_or(ConfigError::Missing("alpha"))?;
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "alpha",
                expected: "a finite non-negative number",
                value: alpha,
            });
        }

        let selection_rule = self
            .selection_rule
            .ok_or(ConfigError::Missing("selection_rule"))?
            .parse::<SelectionRule>()?;

        let delay_time_constant = self
            .delay_time_constant
            .unwrap_or(DEFAULT_DELAY_TIME_CONSTANT_S);
        check_positive("delay_time_constant", delay_time_constant)?;

        Ok(SchedulerConfig {
            num_users: num_users as usize,
            feedback_delay,
            slot_duration,
            ewma_window: ewma_window as u32,
            alpha,
            selection_rule,
            delay_time_constant,
        })
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            expected: "a finite positive number",
            value,
        })
    }
}

impl SchedulerConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let parsed: SchedulerConfigInput =
            toml::from_str(input).map_err(|e| ConfigError::Toml(e.to_string()))?;
        parsed.resolve()
    }

    /// Builds a config in code. Runs the same validation as TOML input.
    pub fn new(
        num_users: usize,
        feedback_delay: f64,
        slot_duration: f64,
        ewma_window: u32,
        alpha: f64,
        selection_rule: SelectionRule,
    ) -> Result<Self, ConfigError> {
        SchedulerConfigInput {
            version: CONFIG_VERSION,
            num_users: Some(num_users as i64),
            feedback_delay: Some(feedback_delay),
            slot_duration: Some(slot_duration),
            ewma_window: Some(ewma_window as i64),
            alpha: Some(alpha),
            selection_rule: Some(selection_rule.as_str().to_string()),
            delay_time_constant: None,
        }
        .resolve()
    }

    /// Re-checks a config whose fields may have been edited after
    /// resolution.
    pub fn validate(&self) -> Result<(), ConfigError> {
        SchedulerConfigInput {
            version: CONFIG_VERSION,
            num_users: Some(self.num_users as i64),
            feedback_delay: Some(self.feedback_delay),
            slot_duration: Some(self.slot_duration),
            ewma_window: Some(i64::from(self.ewma_window)),
            alpha: Some(self.alpha),
            selection_rule: Some(self.selection_rule.as_str().to_string()),
            delay_time_constant: Some(self.delay_time_constant),
        }
        .resolve()
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        num_users = 3
        feedback_delay = 0.02
        slot_duration = 0.00167
        ewma_window = 100
        alpha = 1.0
        selection_rule = "proportional_fair"
    "#;

    #[test]
    fn parse_toml_config_basic() {
        let cfg = SchedulerConfig::from_toml_str(FULL).unwrap();
        assert_eq!(cfg.num_users, 3);
        assert!((cfg.feedback_delay - 0.02).abs() < f64::EPSILON);
        assert!((cfg.slot_duration - 0.00167).abs() < f64::EPSILON);
        assert_eq!(cfg.ewma_window, 100);
        assert_eq!(cfg.selection_rule, SelectionRule::ProportionalFair);
        assert!((cfg.delay_time_constant - DEFAULT_DELAY_TIME_CONSTANT_S).abs() < f64::EPSILON);
    }

    #[test]
    fn legacy_rule_names_are_accepted() {
        assert_eq!(
            "propfair".parse::<SelectionRule>().unwrap(),
            SelectionRule::ProportionalFair
        );
        assert_eq!(
            "maxweight".parse::<SelectionRule>().unwrap(),
            SelectionRule::MaxWeight
        );
        assert_eq!(
            " max_weight ".parse::<SelectionRule>().unwrap(),
            SelectionRule::MaxWeight
        );
    }

    #[test]
    fn unknown_rule_is_fatal() {
        let toml = FULL.replace("proportional_fair", "round_robin");
        let err = SchedulerConfig::from_toml_str(&toml).unwrap_err();
        assert_eq!(err, ConfigError::UnknownRule("round_robin".into()));
    }

    #[test]
    fn every_core_parameter_is_required() {
        for key in [
            "num_users",
            "feedback_delay",
            "slot_duration",
            "ewma_window",
            "alpha",
            "selection_rule",
        ] {
            let toml: String = FULL
                .lines()
                .filter(|line| !line.trim_start().starts_with(key))
                .collect::<Vec<_>>()
                .join("\n");
            let err = SchedulerConfig::from_toml_str(&toml).unwrap_err();
            assert_eq!(err, ConfigError::Missing(key), "key {key}");
        }
    }

    #[test]
    fn rejects_non_positive_window_and_slot() {
        let err = SchedulerConfig::new(2, 0.0, 1.0, 0, 1.0, SelectionRule::MaxWeight).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { name: "ewma_window", .. }));

        let err = SchedulerConfig::new(2, 0.0, 0.0, 4, 1.0, SelectionRule::MaxWeight).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { name: "slot_duration", .. }));

        let err =
            SchedulerConfig::new(2, 0.0, f64::NAN, 4, 1.0, SelectionRule::MaxWeight).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { name: "slot_duration", .. }));

        let err = SchedulerConfig::new(0, 0.0, 1.0, 4, 1.0, SelectionRule::MaxWeight).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { name: "num_users", .. }));
    }

    #[test]
    fn rejects_negative_alpha() {
        let err = SchedulerConfig::new(2, 0.0, 1.0, 4, -0.5, SelectionRule::MaxWeight).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { name: "alpha", .. }));
    }

    #[test]
    fn rejects_other_versions() {
        let toml = format!("version = 2\n{FULL}");
        let err = SchedulerConfig::from_toml_str(&toml).unwrap_err();
        assert_eq!(err, ConfigError::UnsupportedVersion(2));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let err = SchedulerConfig::from_toml_str("num_users = [").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn delay_time_constant_override() {
        let toml = format!("{FULL}\ndelay_time_constant = 0.5");
        let cfg = SchedulerConfig::from_toml_str(&toml).unwrap();
        assert!((cfg.delay_time_constant - 0.5).abs() < f64::EPSILON);

        let toml = format!("{FULL}\ndelay_time_constant = 0.0");
        assert!(SchedulerConfig::from_toml_str(&toml).is_err());
    }
}
