//! Session state and persistence
//!
//! - `types`: the session state machine and the record persisted for it
//! - `store`: the `Persistence` seam plus in-memory and JSONL backends
//!
//! # Usage
//!
//! ```ignore
//! use sage_coordination::state::{JsonlStore, Persistence};
//!
//! let store = JsonlStore::open("./sage-state")?;
//! store.save_session(&record)?;
//! let history = store.load_sessions()?;
//! ```

pub mod store;
pub mod types;

// Re-export core types
pub use store::{
    JsonlStore, MemoryStore, Persistence, PersistenceError, PersistenceResult, SharedPersistence,
};
pub use types::{
    LearningSession, PhaseTransition, SessionId, SessionPhase, SessionRecord, SessionResult,
    SessionStatus,
};
