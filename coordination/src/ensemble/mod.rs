//! Consultation and consensus
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                   SessionCoordinator                       │
//! │  • Selects participants from the registry                  │
//! │  • Fans consult calls out, collects them with timeouts     │
//! │  • Persists the session and updates metrics                │
//! └─────────────────────────┬─────────────────────────────────┘
//!                           │
//!                           ▼
//!                   ┌───────────────┐       ┌──────────────────┐
//!                   │ConsensusEngine│◀──────│ ConflictResolver │
//!                   │ (weighted     │ medium│ (severity-based  │
//!                   │  plurality)   │       │  arbitration)    │
//!                   └───────────────┘       └──────────────────┘
//! ```
//!
//! # Components
//!
//! - **Coordinator**: one full consultation round per call
//! - **ConsensusEngine**: pure weighted-confidence aggregation
//! - **ConflictResolver**: single-shot arbitration outside a session

pub mod arbitration;
pub mod coordinator;
pub mod voting;

// Re-export core types
pub use arbitration::{ConflictResolution, ConflictResolver, ConflictSeverity, ResolutionStrategy};
pub use coordinator::{next_session_id, SessionCoordinator};
pub use voting::{ConsensusEngine, ConsensusResult};
