use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid engine config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{var}={value:?} is not a valid number")]
    InvalidEnv { var: &'static str, value: String },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
}

/// Engine tuning knobs. Every field has a default.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Contributions needed before a round is reduced
    pub world_size: usize,
    pub worker_threads: usize,
    /// Sleep between polls of a readiness signal that is not ready yet
    pub ready_poll_interval_us: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            world_size: 1,
            worker_threads: 2,
            ready_poll_interval_us: 50,
        }
    }
}

impl EngineConfig {
    pub const WORLD_SIZE_VAR: &'static str = "PUSHPULL_WORLD_SIZE";
    pub const WORKER_THREADS_VAR: &'static str = "PUSHPULL_WORKER_THREADS";
    pub const READY_POLL_VAR: &'static str = "PUSHPULL_READY_POLL_US";

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `PUSHPULL_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, Self::WORLD_SIZE_VAR)? {
            config.world_size = v as usize;
        }
        if let Some(v) = parse_var(&lookup, Self::WORKER_THREADS_VAR)? {
            config.worker_threads = v as usize;
        }
        if let Some(v) = parse_var(&lookup, Self::READY_POLL_VAR)? {
            config.ready_poll_interval_us = v;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world_size == 0 {
            return Err(ConfigError::Zero("world_size"));
        }
        if self.worker_threads == 0 {
            return Err(ConfigError::Zero("worker_threads"));
        }
        Ok(())
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_micros(self.ready_poll_interval_us)
    }
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv { var, value }),
    }
}
