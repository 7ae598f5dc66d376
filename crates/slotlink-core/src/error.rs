use thiserror::Error;

/// Reasons a scheduler configuration is refused.
///
/// Configuration problems are fatal at construction time; the scheduler
/// never falls back to a default for a required parameter.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing required parameter `{0}`")]
    Missing(&'static str),

    #[error("parameter `{name}` must be {expected}, got {value}")]
    OutOfRange {
        name: &'static str,
        expected: &'static str,
        value: f64,
    },

    #[error("unknown selection rule `{0}` (expected `proportional_fair` or `max_weight`)")]
    UnknownRule(String),

    #[error("unsupported config version {0}")]
    UnsupportedVersion(u32),

    #[error("invalid config TOML: {0}")]
    Toml(String),
}
