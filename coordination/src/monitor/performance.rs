//! Process-wide collaboration metrics
//!
//! Updated once per finished session. The running average is maintained
//! incrementally and never recomputed from history.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoordinationError, CoordinationResult};
use crate::state::SessionRecord;

/// Shared reference to PerformanceTracker
pub type SharedPerformanceTracker = Arc<PerformanceTracker>;

/// Aggregate collaboration metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_collaborations: u64,
    pub successful_consensus: u64,
    pub failed_consensus: u64,
    /// Mean session duration in seconds
    pub avg_response_time: f64,
}

impl PerformanceMetrics {
    /// Fraction of collaborations that reached consensus
    pub fn consensus_rate(&self) -> f64 {
        if self.total_collaborations == 0 {
            return 0.0;
        }
        self.successful_consensus as f64 / self.total_collaborations as f64
    }

    fn record(&mut self, duration_secs: f64, consensus_reached: bool) {
        self.total_collaborations += 1;
        if consensus_reached {
            self.successful_consensus += 1;
        } else {
            self.failed_consensus += 1;
        }

        let n = self.total_collaborations as f64;
        let duration = if duration_secs.is_finite() {
            duration_secs.max(0.0)
        } else {
            0.0
        };
        self.avg_response_time = (self.avg_response_time * (n - 1.0) + duration) / n;
    }
}

impl std::fmt::Display for PerformanceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "collaborations={} consensus={}/{} avg_response_time={:.3}s",
            self.total_collaborations,
            self.successful_consensus,
            self.total_collaborations,
            self.avg_response_time,
        )
    }
}

/// Serialized owner of the process-wide metrics
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    metrics: Mutex<PerformanceMetrics>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this tracker
    pub fn shared(self) -> SharedPerformanceTracker {
        Arc::new(self)
    }

    /// Fold a finished session into the metrics
    pub fn update(&self, record: &SessionRecord) -> CoordinationResult<PerformanceMetrics> {
        self.record(record.duration_secs, record.consensus_reached())
    }

    /// Fold a single observation into the metrics
    pub fn record(
        &self,
        duration_secs: f64,
        consensus_reached: bool,
    ) -> CoordinationResult<PerformanceMetrics> {
        let mut metrics = self
            .metrics
            .lock()
            .map_err(|_| CoordinationError::LockPoisoned)?;
        metrics.record(duration_secs, consensus_reached);
        debug!(
            total = metrics.total_collaborations,
            avg_response_time = metrics.avg_response_time,
            "Performance metrics updated"
        );
        Ok(metrics.clone())
    }

    pub fn snapshot(&self) -> CoordinationResult<PerformanceMetrics> {
        self.metrics
            .lock()
            .map(|m| m.clone())
            .map_err(|_| CoordinationError::LockPoisoned)
    }

    /// Explicit restart: zero every counter
    pub fn reset(&self) -> CoordinationResult<()> {
        *self
            .metrics
            .lock()
            .map_err(|_| CoordinationError::LockPoisoned)? = PerformanceMetrics::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{ConsultationRequest, RequestType};
    use crate::state::LearningSession;

    fn record_with_duration(secs: f64) -> SessionRecord {
        let mut session = LearningSession::new(
            "session_1_0".to_string(),
            ConsultationRequest::new(RequestType::General, "metrics"),
        );
        session.fail("no eligible agents");
        let mut record = session.to_record();
        record.duration_secs = secs;
        record
    }

    #[test]
    fn test_scenario_e_incremental_average() {
        let forward = PerformanceTracker::new();
        forward.update(&record_with_duration(10.0)).unwrap();
        let metrics = forward.update(&record_with_duration(20.0)).unwrap();
        assert_eq!(metrics.avg_response_time, 15.0);
        assert_eq!(metrics.total_collaborations, 2);
        assert_eq!(metrics.failed_consensus, 2);

        let backward = PerformanceTracker::new();
        backward.update(&record_with_duration(20.0)).unwrap();
        backward.update(&record_with_duration(10.0)).unwrap();
        assert_eq!(backward.snapshot().unwrap().avg_response_time, 15.0);
    }

    #[test]
    fn test_consensus_rate() {
        let tracker = PerformanceTracker::new();
        assert_eq!(tracker.snapshot().unwrap().consensus_rate(), 0.0);

        tracker.record(1.0, true).unwrap();
        tracker.record(1.0, true).unwrap();
        tracker.record(1.0, false).unwrap();

        let metrics = tracker.snapshot().unwrap();
        assert_eq!(metrics.successful_consensus, 2);
        assert!((metrics.consensus_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_reset() {
        let tracker = PerformanceTracker::new();
        tracker.record(3.0, true).unwrap();
        tracker.reset().unwrap();
        assert_eq!(tracker.snapshot().unwrap(), PerformanceMetrics::default());
    }

    #[test]
    fn test_bad_duration_counts_as_zero() {
        let tracker = PerformanceTracker::new();
        tracker.record(f64::NAN, false).unwrap();
        tracker.record(4.0, false).unwrap();
        assert_eq!(tracker.snapshot().unwrap().avg_response_time, 2.0);
    }
}
