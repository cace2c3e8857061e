//! Sage Coordination Library
//!
//! Multi-agent consultation engine for the four sages (knowledge, task,
//! incident, rag):
//! - Concurrent fan-out of consultations with per-call timeouts
//! - Weighted-confidence consensus with a tunable threshold
//! - Severity-based conflict resolution
//! - Bounded per-agent audit queues
//! - Cross-agent knowledge transfer
//! - Rolling performance metrics and health alerting
//!
//! # Usage
//!
//! ```ignore
//! use sage_coordination::{ConsultationRequest, CouncilConfig, RequestType, SageCouncil};
//!
//! let council = SageCouncil::new(CouncilConfig::from_env())?;
//! // ... add agents ...
//! let result = council
//!     .run_session(ConsultationRequest::new(RequestType::IncidentResponse, "db failover"))
//!     .await;
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod agent;
pub mod config;
pub mod council;
pub mod ensemble;
pub mod error;
pub mod events;
pub mod monitor;
pub mod pollination;
pub mod queue;
pub mod registry;
pub mod state;

// Re-export agent types
pub use agent::{
    Agent, AgentHandles, AgentResponse, ConsultationRequest, KnowledgeItem, RequestType, Sage,
    ScriptedAgent, SharedAgent,
};

// Re-export config and error types
pub use config::CouncilConfig;
pub use error::{
    ConfigError, ConfigResult, ConsultError, CoordinationError, CoordinationResult,
};

// Re-export the council facade
pub use council::{CouncilContext, SageCouncil};

// Re-export ensemble types
pub use ensemble::{
    ConflictResolution, ConflictResolver, ConflictSeverity, ConsensusEngine, ConsensusResult,
    ResolutionStrategy, SessionCoordinator,
};

// Re-export event types
pub use events::{CouncilEvent, EventBus, EventFilter, SharedEventBus};

// Re-export monitoring types
pub use monitor::{
    Alert, AlertSeverity, HealthMonitor, HealthSnapshot, OverallHealth, PerformanceMetrics,
    PerformanceTracker,
};

pub use pollination::{CrossPollination, KnowledgeTransfer, PollinationReport};
pub use queue::{Message, MessageQueues, MessageType};
pub use registry::{AgentEntry, AgentHealth, AgentRegistry, SharedRegistry};

// Re-export state types
pub use state::{
    JsonlStore, LearningSession, MemoryStore, Persistence, PersistenceError, SessionPhase,
    SessionRecord, SessionResult, SessionStatus,
};
