//! Council configuration
//!
//! Loaded from defaults, a TOML file, or `SAGES_*` environment variables.
//! Validation happens eagerly: a bad threshold is the one error that is
//! allowed to surface to the caller.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ConfigResult};

/// Default minimum weighted-confidence share for consensus
pub const DEFAULT_CONSENSUS_THRESHOLD: f64 = 0.75;

/// Default per-agent message queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default minimum confidence for accepting a conflict resolution
pub const DEFAULT_RESOLUTION_ACCEPTANCE: f64 = 0.7;

/// Configuration for the sage council
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    /// Minimum winning share of total confidence weight
    pub consensus_threshold: f64,

    /// Capacity of each agent's audit queue
    pub queue_capacity: usize,

    /// Detect and persist health alerts after every session
    pub auto_sync: bool,

    /// Allow knowledge transfer between agents
    pub cross_sage_learning: bool,

    /// Upper bound on a single consult call
    pub consult_timeout_ms: u64,

    /// Minimum confidence for a conflict resolution to be accepted
    pub resolution_acceptance: f64,

    /// Interval of the background health monitor
    pub health_check_interval_ms: u64,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            consensus_threshold: DEFAULT_CONSENSUS_THRESHOLD,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            auto_sync: true,
            cross_sage_learning: true,
            consult_timeout_ms: 30_000,
            resolution_acceptance: DEFAULT_RESOLUTION_ACCEPTANCE,
            health_check_interval_ms: 60_000,
        }
    }
}

impl CouncilConfig {
    /// Create config from `SAGES_*` environment variables
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Create config from an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("SAGES_CONSENSUS_THRESHOLD") {
            match val.parse() {
                Ok(v) => config.consensus_threshold = v,
                Err(_) => warn!(value = %val, "Ignoring unparsable SAGES_CONSENSUS_THRESHOLD"),
            }
        }
        if let Some(val) = lookup("SAGES_QUEUE_CAPACITY") {
            match val.parse() {
                Ok(v) => config.queue_capacity = v,
                Err(_) => warn!(value = %val, "Ignoring unparsable SAGES_QUEUE_CAPACITY"),
            }
        }
        if let Some(val) = lookup("SAGES_AUTO_SYNC") {
            config.auto_sync = parse_flag(&val);
        }
        if let Some(val) = lookup("SAGES_CROSS_SAGE_LEARNING") {
            config.cross_sage_learning = parse_flag(&val);
        }
        if let Some(val) = lookup("SAGES_CONSULT_TIMEOUT_MS") {
            match val.parse() {
                Ok(v) => config.consult_timeout_ms = v,
                Err(_) => warn!(value = %val, "Ignoring unparsable SAGES_CONSULT_TIMEOUT_MS"),
            }
        }
        if let Some(val) = lookup("SAGES_HEALTH_INTERVAL_MS") {
            match val.parse() {
                Ok(v) => config.health_check_interval_ms = v,
                Err(_) => warn!(value = %val, "Ignoring unparsable SAGES_HEALTH_INTERVAL_MS"),
            }
        }

        config
    }

    /// Parse config from a TOML document
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Check every field is within its legal range
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.consensus_threshold > 0.0 && self.consensus_threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(self.consensus_threshold));
        }
        if !(self.resolution_acceptance > 0.0 && self.resolution_acceptance <= 1.0) {
            return Err(ConfigError::InvalidAcceptance(self.resolution_acceptance));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidCapacity);
        }
        if self.consult_timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn consult_timeout(&self) -> Duration {
        Duration::from_millis(self.consult_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms.max(1))
    }
}

fn parse_flag(val: &str) -> bool {
    val.eq_ignore_ascii_case("true") || val == "1"
}
