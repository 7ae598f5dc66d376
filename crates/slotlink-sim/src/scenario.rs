use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

use slotlink_core::config::{SchedulerConfig, SchedulerConfigInput, SelectionRule};

use crate::channel::ChannelConfig;

/// A complete simulation setup, as read from TOML.
///
/// ```toml
/// seed = 7
/// duration = 10.0
/// channel_step = 0.01
///
/// [scheduler]
/// num_users = 2
/// feedback_delay = 0.002
/// slot_duration = 0.00167
/// ewma_window = 100
/// alpha = 1.0
/// selection_rule = "proportional_fair"
///
/// [[users]]
/// arrival_rate_pps = 300.0
/// min_rate_bps = 1e6
/// max_rate_bps = 4e6
/// rate_step_bps = 1e5
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_duration")]
    pub duration: f64,
    /// Seconds between channel capacity updates.
    #[serde(default = "default_channel_step")]
    pub channel_step: f64,
    pub scheduler: SchedulerConfigInput,
    #[serde(default)]
    pub users: Vec<UserScenario>,
}

/// Traffic and channel for one user.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserScenario {
    /// Mean Poisson arrival rate in packets per second. `0.0` for no traffic.
    pub arrival_rate_pps: f64,
    #[serde(default = "default_packet_bytes")]
    pub packet_bytes: usize,
    #[serde(default = "default_queue_limit")]
    pub queue_limit_bytes: usize,
    #[serde(flatten)]
    pub channel: ChannelConfig,
}

fn default_duration() -> f64 {
    10.0
}

fn default_channel_step() -> f64 {
    0.01
}

fn default_packet_bytes() -> usize {
    1500
}

fn default_queue_limit() -> usize {
    1_500_000
}

impl UserScenario {
    pub fn new(arrival_rate_pps: f64, channel: ChannelConfig) -> Self {
        Self {
            arrival_rate_pps,
            packet_bytes: default_packet_bytes(),
            queue_limit_bytes: default_queue_limit(),
            channel,
        }
    }
}

impl ScenarioConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("invalid scenario TOML")
    }

    /// A demo scenario: `num_users` users with staggered mean capacities
    /// between 1 and 5 Mbit/s, each offered about 60% of its mean capacity.
    pub fn demo(num_users: usize, rule: SelectionRule) -> Self {
        let users = (0..num_users)
            .map(|i| {
                let mean = 1e6 + 4e6 * i as f64 / num_users.max(2).saturating_sub(1) as f64;
                let channel = ChannelConfig {
                    min_rate_bps: mean * 0.5,
                    max_rate_bps: mean * 1.5,
                    rate_step_bps: mean * 0.05,
                    outage_probability: 0.0,
                    outage_steps: 10,
                };
                let pps = 0.6 * mean / (8.0 * default_packet_bytes() as f64);
                UserScenario::new(pps, channel)
            })
            .collect();
        Self {
            seed: 1,
            duration: default_duration(),
            channel_step: default_channel_step(),
            scheduler: SchedulerConfigInput {
                num_users: Some(num_users as i64),
                feedback_delay: Some(0.002),
                slot_duration: Some(0.00167),
                ewma_window: Some(100),
                alpha: Some(1.0),
                selection_rule: Some(rule.as_str().to_string()),
                ..SchedulerConfigInput::default()
            },
            users,
        }
    }

    /// Validates the scenario and resolves the scheduler section.
    pub fn resolve(&self) -> Result<SchedulerConfig> {
        let scheduler = self
            .scheduler
            .clone()
            .resolve()
            .context("invalid [scheduler] section")?;
        ensure!(
            self.users.len() == scheduler.num_users,
            "scenario has {} [[users]] entries but num_users = {}",
            self.users.len(),
            scheduler.num_users
        );
        ensure!(
            self.duration.is_finite() && self.duration > 0.0,
            "duration must be > 0, got {}",
            self.duration
        );
        ensure!(
            self.channel_step.is_finite() && self.channel_step > 0.0,
            "channel_step must be > 0, got {}",
            self.channel_step
        );
        for (idx, user) in self.users.iter().enumerate() {
            ensure!(
                user.arrival_rate_pps.is_finite() && user.arrival_rate_pps >= 0.0,
                "user {idx}: arrival_rate_pps must be >= 0"
            );
            ensure!(user.packet_bytes > 0, "user {idx}: packet_bytes must be > 0");
            ensure!(
                user.queue_limit_bytes >= user.packet_bytes,
                "user {idx}: queue_limit_bytes must hold at least one packet"
            );
            let ch = &user.channel;
            ensure!(
                ch.min_rate_bps.is_finite() && ch.min_rate_bps >= 0.0,
                "user {idx}: min_rate_bps must be >= 0"
            );
            ensure!(
                ch.max_rate_bps.is_finite() && ch.max_rate_bps >= ch.min_rate_bps,
                "user {idx}: max_rate_bps must be >= min_rate_bps"
            );
            ensure!(
                ch.rate_step_bps.is_finite() && ch.rate_step_bps >= 0.0,
                "user {idx}: rate_step_bps must be >= 0"
            );
            ensure!(
                (0.0..=1.0).contains(&ch.outage_probability),
                "user {idx}: outage_probability must be in [0, 1]"
            );
        }
        Ok(scheduler)
    }
}
