//! Error taxonomy for the consultation engine
//!
//! Only configuration errors are meant to escape to callers. Everything
//! else is caught at the session boundary and turned into a failed
//! session, a failed response, or a log line.

use thiserror::Error;

use crate::state::SessionPhase;

/// Result type for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Error type for coordination operations
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("Agent unavailable: {0}")]
    AgentUnavailable(String),

    #[error("Consultation with {agent_id} timed out after {timeout_ms}ms")]
    ConsultationTimeout { agent_id: String, timeout_ms: u64 },

    #[error("no eligible agents")]
    NoEligibleAgents,

    #[error("no valid responses")]
    NoValidResponses,

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Agent already registered with different capabilities: {0}")]
    DuplicateAgent(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: SessionPhase, to: SessionPhase },

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Error returned by an individual agent consultation
#[derive(Debug, Clone, Error)]
pub enum ConsultError {
    #[error("Consultation failed: {0}")]
    Failed(String),

    #[error("Agent unavailable: {0}")]
    Unavailable(String),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors, raised eagerly at construction time
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("consensus threshold must be within (0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("resolution acceptance must be within (0, 1], got {0}")]
    InvalidAcceptance(f64),

    #[error("queue capacity must be at least 1")]
    InvalidCapacity,

    #[error("consult timeout must be at least 1ms")]
    InvalidTimeout,

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
