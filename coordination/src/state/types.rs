//! Session state: phases, transitions and the persisted session record

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentResponse, ConsultationRequest};
use crate::ensemble::voting::ConsensusResult;
use crate::error::{CoordinationError, CoordinationResult};

/// Unique identifier for consultation sessions
pub type SessionId = String;

/// Phase of a consultation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Id allocated, participants selected
    Initiated,
    /// Consult calls issued
    Dispatched,
    /// Waiting for every outstanding call
    AwaitingResponses,
    /// Consensus computed over collected responses
    ConsensusEvaluated,
    Completed,
    Failed,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this phase
    pub fn valid_transitions(self) -> &'static [SessionPhase] {
        match self {
            Self::Initiated => &[Self::Dispatched, Self::Failed],
            Self::Dispatched => &[Self::AwaitingResponses, Self::Failed],
            Self::AwaitingResponses => &[Self::ConsensusEvaluated, Self::Failed],
            Self::ConsensusEvaluated => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initiated => write!(f, "initiated"),
            Self::Dispatched => write!(f, "dispatched"),
            Self::AwaitingResponses => write!(f, "awaiting_responses"),
            Self::ConsensusEvaluated => write!(f, "consensus_evaluated"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Externally visible session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A recorded phase change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub timestamp: DateTime<Utc>,
}

/// One in-flight consultation round, owned by the coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSession {
    pub session_id: SessionId,
    /// Participants in registration order
    pub participating_agents: Vec<String>,
    pub request: ConsultationRequest,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub phase: SessionPhase,
    pub transitions: Vec<PhaseTransition>,
    pub responses: BTreeMap<String, AgentResponse>,
    pub consensus_result: Option<ConsensusResult>,
    /// Selected agents that were unavailable at dispatch
    pub skipped_agents: Vec<String>,
    /// Why the session failed, if it did
    pub reason: Option<String>,
}

impl LearningSession {
    pub fn new(session_id: SessionId, request: ConsultationRequest) -> Self {
        Self {
            session_id,
            participating_agents: Vec::new(),
            request,
            start_time: Utc::now(),
            end_time: None,
            status: SessionStatus::Active,
            phase: SessionPhase::Initiated,
            transitions: Vec::new(),
            responses: BTreeMap::new(),
            consensus_result: None,
            skipped_agents: Vec::new(),
            reason: None,
        }
    }

    /// Move to a new phase, rejecting illegal transitions
    pub fn transition(&mut self, to: SessionPhase) -> CoordinationResult<()> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(CoordinationError::InvalidTransition {
                from: self.phase,
                to,
            });
        }

        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
        });
        self.phase = to;
        Ok(())
    }

    /// Finish the session successfully
    pub fn complete(&mut self) -> CoordinationResult<()> {
        self.transition(SessionPhase::Completed)?;
        self.status = SessionStatus::Completed;
        self.end_time = Some(Utc::now());
        Ok(())
    }

    /// Fail the session from whatever phase it is in
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.phase.is_terminal() {
            self.transitions.push(PhaseTransition {
                from: self.phase,
                to: SessionPhase::Failed,
                timestamp: Utc::now(),
            });
            self.phase = SessionPhase::Failed;
        }
        self.status = SessionStatus::Failed;
        self.reason = Some(reason.into());
        self.end_time = Some(Utc::now());
    }

    /// Seconds between start and end (or now, while active)
    pub fn duration_secs(&self) -> f64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Build the persisted form of this session
    pub fn to_record(&self) -> SessionRecord {
        SessionRecord {
            session_id: self.session_id.clone(),
            request: self.request.clone(),
            participating_agents: self.participating_agents.clone(),
            skipped_agents: self.skipped_agents.clone(),
            status: self.status,
            responses: self
                .participating_agents
                .iter()
                .filter_map(|id| self.responses.get(id).cloned())
                .collect(),
            consensus: self.consensus_result.clone(),
            reason: self.reason.clone(),
            transitions: self.transitions.clone(),
            started_at: self.start_time,
            ended_at: self.end_time,
            duration_secs: self.duration_secs(),
        }
    }
}

/// Durable record of a finished session; also what callers get back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub request: ConsultationRequest,
    pub participating_agents: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_agents: Vec<String>,
    pub status: SessionStatus,
    pub responses: Vec<AgentResponse>,
    pub consensus: Option<ConsensusResult>,
    pub reason: Option<String>,
    pub transitions: Vec<PhaseTransition>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: f64,
}

/// Result of `run_session`
pub type SessionResult = SessionRecord;

impl SessionRecord {
    pub fn consensus_reached(&self) -> bool {
        self.consensus
            .as_ref()
            .map(|c| c.consensus_reached)
            .unwrap_or(false)
    }

    pub fn final_decision(&self) -> Option<&str> {
        self.consensus
            .as_ref()
            .and_then(|c| c.final_decision.as_deref())
    }
}
