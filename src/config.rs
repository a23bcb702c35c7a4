//! Engine configuration loaded from environment variables.
//!
//! - `ROADMAPPER_COMPLETION_THRESHOLD` - minimum analyzer confidence for
//!   auto-completion, in `[0, 1]` (default: 0.7)
//! - `ROADMAPPER_EXTERNAL_TIMEOUT_SECS` - bound on each collaborator call (default: 30)
//! - `ROADMAPPER_COMMIT_LIMIT` - commits fetched as progress evidence (default: 10)

use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_COMPLETION_THRESHOLD: f64 = 0.7;
pub const DEFAULT_EXTERNAL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_COMMIT_LIMIT: usize = 10;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a number, got '{value}'")]
    NotANumber { name: &'static str, value: String },

    #[error("completion threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Tunables for the roadmap engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// A progress check auto-completes a task when the analyzer suggests
    /// completion with at least this confidence.
    pub completion_threshold: f64,
    pub external_timeout: Duration,
    pub commit_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            completion_threshold: DEFAULT_COMPLETION_THRESHOLD,
            external_timeout: DEFAULT_EXTERNAL_TIMEOUT,
            commit_limit: DEFAULT_COMMIT_LIMIT,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source. Unset variables
    /// keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("ROADMAPPER_COMPLETION_THRESHOLD") {
            let threshold = parse("ROADMAPPER_COMPLETION_THRESHOLD", &value)?;
            config = config.with_threshold(threshold)?;
        }

        if let Some(value) = lookup("ROADMAPPER_EXTERNAL_TIMEOUT_SECS") {
            let secs: u64 = parse("ROADMAPPER_EXTERNAL_TIMEOUT_SECS", &value)?;
            if secs == 0 {
                return Err(ConfigError::Zero("ROADMAPPER_EXTERNAL_TIMEOUT_SECS"));
            }
            config.external_timeout = Duration::from_secs(secs);
        }

        if let Some(value) = lookup("ROADMAPPER_COMMIT_LIMIT") {
            let limit: usize = parse("ROADMAPPER_COMMIT_LIMIT", &value)?;
            if limit == 0 {
                return Err(ConfigError::Zero("ROADMAPPER_COMMIT_LIMIT"));
            }
            config.commit_limit = limit;
        }

        Ok(config)
    }

    pub fn with_threshold(mut self, threshold: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::ThresholdOutOfRange(threshold));
        }
        self.completion_threshold = threshold;
        Ok(self)
    }

    pub fn with_external_timeout(mut self, timeout: Duration) -> Self {
        self.external_timeout = timeout;
        self
    }
}

pub(crate) fn parse<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::NotANumber {
        name,
        value: value.to_string(),
    })
}
