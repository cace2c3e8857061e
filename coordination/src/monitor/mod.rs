//! Rolling metrics and health monitoring
//!
//! - `performance`: session counters and the incremental response-time average
//! - `health`: registry snapshots, alert detection and the periodic checker

pub mod health;
pub mod performance;

pub use health::{Alert, AlertSeverity, AgentStatus, HealthMonitor, HealthSnapshot, OverallHealth};
pub use performance::{PerformanceMetrics, PerformanceTracker, SharedPerformanceTracker};
