//! Event types for council coordination
//!
//! Published on the event bus as sessions, resolutions and health checks
//! progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ensemble::arbitration::{ConflictSeverity, ResolutionStrategy};
use crate::monitor::health::AlertSeverity;
use crate::state::{SessionId, SessionStatus};

/// All council coordination events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CouncilEvent {
    /// A session selected its participants
    SessionStarted {
        session_id: SessionId,
        request_type: String,
        participants: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// An agent's consult call resolved
    AgentConsulted {
        session_id: SessionId,
        agent_id: String,
        success: bool,
        confidence: f64,
        response_time: f64,
        timestamp: DateTime<Utc>,
    },

    /// A selected agent was unavailable at dispatch
    AgentSkipped {
        session_id: SessionId,
        agent_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Consensus was computed over a session's responses
    ConsensusEvaluated {
        session_id: SessionId,
        consensus_reached: bool,
        leading_recommendation: Option<String>,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// A session reached a terminal state
    SessionEnded {
        session_id: SessionId,
        status: SessionStatus,
        reason: Option<String>,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },

    /// A conflict resolution finished
    ConflictResolved {
        strategy: ResolutionStrategy,
        severity: Option<ConflictSeverity>,
        resolved: bool,
        final_recommendation: Option<String>,
        confidence: f64,
        timestamp: DateTime<Utc>,
    },

    /// Knowledge moved from one agent to another
    KnowledgeTransferred {
        source: String,
        target: String,
        offered: usize,
        accepted: usize,
        integration_quality: f64,
        timestamp: DateTime<Utc>,
    },

    /// The health monitor raised an alert
    AlertRaised {
        alert_id: String,
        agent_id: String,
        message: String,
        severity: AlertSeverity,
        timestamp: DateTime<Utc>,
    },
}

impl CouncilEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            CouncilEvent::SessionStarted { timestamp, .. } => *timestamp,
            CouncilEvent::AgentConsulted { timestamp, .. } => *timestamp,
            CouncilEvent::AgentSkipped { timestamp, .. } => *timestamp,
            CouncilEvent::ConsensusEvaluated { timestamp, .. } => *timestamp,
            CouncilEvent::SessionEnded { timestamp, .. } => *timestamp,
            CouncilEvent::ConflictResolved { timestamp, .. } => *timestamp,
            CouncilEvent::KnowledgeTransferred { timestamp, .. } => *timestamp,
            CouncilEvent::AlertRaised { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            CouncilEvent::SessionStarted { .. } => "session_started",
            CouncilEvent::AgentConsulted { .. } => "agent_consulted",
            CouncilEvent::AgentSkipped { .. } => "agent_skipped",
            CouncilEvent::ConsensusEvaluated { .. } => "consensus_evaluated",
            CouncilEvent::SessionEnded { .. } => "session_ended",
            CouncilEvent::ConflictResolved { .. } => "conflict_resolved",
            CouncilEvent::KnowledgeTransferred { .. } => "knowledge_transferred",
            CouncilEvent::AlertRaised { .. } => "alert_raised",
        }
    }

    /// Get the session ID if this event is session-scoped
    pub fn session_id(&self) -> Option<&str> {
        match self {
            CouncilEvent::SessionStarted { session_id, .. }
            | CouncilEvent::AgentConsulted { session_id, .. }
            | CouncilEvent::AgentSkipped { session_id, .. }
            | CouncilEvent::ConsensusEvaluated { session_id, .. }
            | CouncilEvent::SessionEnded { session_id, .. } => Some(session_id),
            _ => None,
        }
    }

    /// Get the agent ID if this event concerns a single agent
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            CouncilEvent::AgentConsulted { agent_id, .. }
            | CouncilEvent::AgentSkipped { agent_id, .. }
            | CouncilEvent::AlertRaised { agent_id, .. } => Some(agent_id),
            CouncilEvent::KnowledgeTransferred { target, .. } => Some(target),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = CouncilEvent::AgentSkipped {
            session_id: "session_1_0".to_string(),
            agent_id: "rag".to_string(),
            reason: "agent unavailable: rag".to_string(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"agent_skipped\""));

        let parsed: CouncilEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type(), "agent_skipped");
        assert_eq!(parsed.session_id(), Some("session_1_0"));
        assert_eq!(parsed.agent_id(), Some("rag"));
    }

    #[test]
    fn test_unscoped_events() {
        let event = CouncilEvent::ConflictResolved {
            strategy: ResolutionStrategy::ExpertArbitration,
            severity: Some(ConflictSeverity::High),
            resolved: true,
            final_recommendation: Some("shard".to_string()),
            confidence: 0.9,
            timestamp: Utc::now(),
        };
        assert!(event.session_id().is_none());
        assert!(event.agent_id().is_none());
    }
}
