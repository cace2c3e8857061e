//! Session coordinator - one full consultation round per `run_session`
//!
//! ```text
//! Initiated ──▶ Dispatched ──▶ AwaitingResponses ──▶ ConsensusEvaluated ──▶ Completed
//!     │              │                 │                      │
//!     └──────────────┴─────────────────┴──────────────────────┴──────────▶ Failed
//! ```
//!
//! Agent and persistence failures never escape `run_session`: a failed
//! consult becomes a failed response, a failed save becomes a log line,
//! and anything else turns the session into `Failed` with a reason.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::voting::ConsensusEngine;
use crate::agent::{AgentResponse, ConsultationRequest};
use crate::council::CouncilContext;
use crate::error::{ConfigResult, CoordinationError, CoordinationResult};
use crate::events::CouncilEvent;
use crate::monitor::HealthMonitor;
use crate::queue::{Message, MessageType};
use crate::state::{LearningSession, SessionId, SessionPhase, SessionResult, SessionStatus};

/// Sender recorded on dispatch audit messages
const COORDINATOR_SENDER: &str = "coordinator";

/// Process-wide session counter, starting at 1
static SESSION_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Allocate a `session_{counter}_{unix_timestamp}` id
pub fn next_session_id() -> SessionId {
    let counter = SESSION_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("session_{}_{}", counter, Utc::now().timestamp())
}

/// Orchestrates consultation sessions over a shared council context
pub struct SessionCoordinator {
    context: CouncilContext,
    engine: ConsensusEngine,
    health: HealthMonitor,
    active: Mutex<HashMap<SessionId, LearningSession>>,
}

impl SessionCoordinator {
    pub fn new(context: CouncilContext) -> ConfigResult<Self> {
        let engine = ConsensusEngine::new(context.config.consensus_threshold)?;
        let health = HealthMonitor::new(context.registry.clone())
            .with_persistence(context.persistence.clone())
            .with_event_bus(context.event_bus.clone());

        Ok(Self {
            context,
            engine,
            health,
            active: Mutex::new(HashMap::new()),
        })
    }

    /// Ids of sessions currently in flight
    pub fn get_active_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self
            .active
            .lock()
            .map(|a| a.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Current state of an in-flight session
    pub fn active_session(&self, session_id: &str) -> Option<LearningSession> {
        self.active
            .lock()
            .ok()
            .and_then(|a| a.get(session_id).cloned())
    }

    /// Run one consultation round. Always returns a well-formed result.
    pub async fn run_session(&self, request: ConsultationRequest) -> SessionResult {
        let session_id = next_session_id();
        let mut session = LearningSession::new(session_id.clone(), request);
        info!(
            session_id = %session_id,
            request_type = %session.request.request_type,
            "Session initiated"
        );

        if let Err(e) = self.drive(&mut session).await {
            match e {
                CoordinationError::NoEligibleAgents => {
                    warn!(session_id = %session_id, "Session failed: {}", e)
                }
                _ => error!(
                    session_id = %session_id,
                    phase = %session.phase,
                    "Session failed: {}",
                    e
                ),
            }
            session.fail(e.to_string());
        }

        self.finish(session)
    }

    async fn drive(&self, session: &mut LearningSession) -> CoordinationResult<()> {
        // Initiated: pick participants
        let selected = {
            let registry = self
                .context
                .registry
                .read()
                .map_err(|_| CoordinationError::LockPoisoned)?;
            registry.select_for(&session.request.request_type)
        };
        if selected.is_empty() {
            return Err(CoordinationError::NoEligibleAgents);
        }
        self.track(session);

        // Dispatched: fan out
        session.transition(SessionPhase::Dispatched)?;
        let request = Arc::new(session.request.clone());
        let timeout = self.context.config.consult_timeout();
        let timeout_ms = self.context.config.consult_timeout_ms;
        let mut join_set: JoinSet<(String, AgentResponse)> = JoinSet::new();

        for agent_id in &selected {
            let handle = if self.is_active(agent_id)? {
                self.context.handles.get(agent_id)
            } else {
                None
            };
            let Some(agent) = handle else {
                let reason = CoordinationError::AgentUnavailable(agent_id.clone()).to_string();
                warn!(
                    session_id = %session.session_id,
                    agent_id = %agent_id,
                    "Skipping agent: {}",
                    reason
                );
                session.skipped_agents.push(agent_id.clone());
                self.context.event_bus.publish(CouncilEvent::AgentSkipped {
                    session_id: session.session_id.clone(),
                    agent_id: agent_id.clone(),
                    reason,
                    timestamp: Utc::now(),
                });
                continue;
            };

            self.context.queues.enqueue(
                agent_id,
                Message::new(
                    Some(session.session_id.clone()),
                    MessageType::ConsultationRequest,
                    session.request.description.clone(),
                    COORDINATOR_SENDER,
                ),
            )?;
            session.participating_agents.push(agent_id.clone());

            let agent_id = agent_id.clone();
            let request = Arc::clone(&request);
            join_set.spawn(async move {
                let start = Instant::now();
                let response = match tokio::time::timeout(timeout, agent.consult(&request)).await {
                    Ok(Ok(mut response)) => {
                        response.agent_id = agent_id.clone();
                        response.confidence_score = response.clamped_confidence();
                        response
                    }
                    Ok(Err(e)) => AgentResponse::failure(&agent_id, e.to_string()),
                    Err(_) => AgentResponse::failure(
                        &agent_id,
                        CoordinationError::ConsultationTimeout {
                            agent_id: agent_id.clone(),
                            timeout_ms,
                        }
                        .to_string(),
                    ),
                };
                let elapsed = start.elapsed().as_secs_f64();
                (agent_id, response.with_response_time(elapsed))
            });
        }

        if session.participating_agents.is_empty() {
            return Err(CoordinationError::NoEligibleAgents);
        }
        self.track(session);
        info!(
            session_id = %session.session_id,
            participants = ?session.participating_agents,
            skipped = session.skipped_agents.len(),
            "Consultations dispatched"
        );
        self.context.event_bus.publish(CouncilEvent::SessionStarted {
            session_id: session.session_id.clone(),
            request_type: session.request.request_type.to_string(),
            participants: session.participating_agents.clone(),
            timestamp: Utc::now(),
        });

        // AwaitingResponses: fan in
        session.transition(SessionPhase::AwaitingResponses)?;
        let mut collected: HashMap<String, AgentResponse> = HashMap::new();
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((agent_id, response)) => {
                    collected.insert(agent_id, response);
                }
                Err(e) => warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "Consultation task panicked"
                ),
            }
        }

        for agent_id in session.participating_agents.clone() {
            let response = collected
                .remove(&agent_id)
                .unwrap_or_else(|| AgentResponse::failure(&agent_id, "consultation task panicked"));
            self.record_response(session, response)?;
        }
        self.track(session);

        // ConsensusEvaluated
        session.transition(SessionPhase::ConsensusEvaluated)?;
        let order = {
            let registry = self
                .context
                .registry
                .read()
                .map_err(|_| CoordinationError::LockPoisoned)?;
            registry.registration_order()
        };
        let responses: Vec<AgentResponse> = session.responses.values().cloned().collect();
        let result = self
            .engine
            .clone()
            .with_agent_order(order)
            .form(&responses, &session.request);

        self.context.event_bus.publish(CouncilEvent::ConsensusEvaluated {
            session_id: session.session_id.clone(),
            consensus_reached: result.consensus_reached,
            leading_recommendation: result.leading_recommendation.clone(),
            confidence: result.consensus_confidence,
            timestamp: Utc::now(),
        });
        session.consensus_result = Some(result);

        session.complete()
    }

    fn is_active(&self, agent_id: &str) -> CoordinationResult<bool> {
        let registry = self
            .context
            .registry
            .read()
            .map_err(|_| CoordinationError::LockPoisoned)?;
        Ok(registry.is_active(agent_id))
    }

    /// Fold one collected response into the session, registry and audit log
    fn record_response(
        &self,
        session: &mut LearningSession,
        response: AgentResponse,
    ) -> CoordinationResult<()> {
        let agent_id = response.agent_id.clone();
        {
            let mut registry = self
                .context
                .registry
                .write()
                .map_err(|_| CoordinationError::LockPoisoned)?;
            if response.success {
                registry.record_success(&agent_id)?;
            } else {
                registry.record_failure(&agent_id)?;
            }
        }

        let content = if response.success {
            response.recommendation.clone()
        } else {
            response.supporting_evidence.join("; ")
        };
        self.context.queues.enqueue(
            &agent_id,
            Message::new(
                Some(session.session_id.clone()),
                MessageType::ConsultationResponse,
                content,
                agent_id.as_str(),
            ),
        )?;

        debug!(
            session_id = %session.session_id,
            agent_id = %agent_id,
            success = response.success,
            confidence = response.confidence_score,
            response_time = response.response_time,
            "Response collected"
        );
        self.context.event_bus.publish(CouncilEvent::AgentConsulted {
            session_id: session.session_id.clone(),
            agent_id: agent_id.clone(),
            success: response.success,
            confidence: response.confidence_score,
            response_time: response.response_time,
            timestamp: Utc::now(),
        });

        session.responses.insert(agent_id, response);
        Ok(())
    }

    /// Mirror the session into the active-session table
    fn track(&self, session: &LearningSession) {
        match self.active.lock() {
            Ok(mut active) => {
                active.insert(session.session_id.clone(), session.clone());
            }
            Err(_) => warn!(session_id = %session.session_id, "Active-session table poisoned"),
        }
    }

    /// Terminal bookkeeping shared by completed and failed sessions
    fn finish(&self, session: LearningSession) -> SessionResult {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&session.session_id);
        }

        let record = session.to_record();

        if let Err(e) = self.context.persistence.save_session(&record) {
            let err = CoordinationError::PersistenceFailure(e.to_string());
            warn!(session_id = %record.session_id, "{}", err);
        }

        if record.status == SessionStatus::Completed {
            if let Err(e) = self.context.tracker.update(&record) {
                warn!(session_id = %record.session_id, "Failed to update metrics: {}", e);
            }
        }

        if self.context.config.auto_sync {
            if let Err(e) = self.health.check() {
                warn!(session_id = %record.session_id, "Health sync failed: {}", e);
            }
        }

        self.context.event_bus.publish(CouncilEvent::SessionEnded {
            session_id: record.session_id.clone(),
            status: record.status,
            reason: record.reason.clone(),
            duration_secs: record.duration_secs,
            timestamp: Utc::now(),
        });

        info!(
            session_id = %record.session_id,
            status = %record.status,
            consensus_reached = record.consensus_reached(),
            decision = record.final_decision().unwrap_or("-"),
            duration_secs = record.duration_secs,
            "Session finished"
        );
        record
    }
}
