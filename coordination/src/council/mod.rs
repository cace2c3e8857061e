//! Sage Council - the public face of the consultation engine
//!
//! Owns the process-wide state (registry, queues, metrics, persistence,
//! event bus) in an explicit [`CouncilContext`] and wires it into the
//! session coordinator, conflict resolver, cross-pollination and health
//! monitor. Lifecycle is construction to [`SageCouncil::shutdown`].
//!
//! # Usage
//!
//! ```ignore
//! use sage_coordination::{
//!     ConsultationRequest, CouncilConfig, RequestType, Sage, SageCouncil, ScriptedAgent,
//! };
//!
//! let council = SageCouncil::new(CouncilConfig::from_env())?
//!     .with_agent(ScriptedAgent::for_sage(Sage::Knowledge, "add an index", 0.9))?
//!     .with_agent(ScriptedAgent::for_sage(Sage::Rag, "add an index", 0.8))?;
//!
//! let result = council
//!     .run_session(ConsultationRequest::new(RequestType::PatternAnalysis, "slow joins"))
//!     .await;
//! println!("{:?}", result.final_decision());
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agent::{Agent, AgentHandles, AgentResponse, ConsultationRequest, SharedAgent};
use crate::config::CouncilConfig;
use crate::ensemble::arbitration::{ConflictResolution, ConflictResolver, ConflictSeverity};
use crate::ensemble::coordinator::SessionCoordinator;
use crate::ensemble::voting::ConsensusEngine;
use crate::error::{ConfigResult, CoordinationError, CoordinationResult};
use crate::events::{CouncilEvent, EventBus, SharedEventBus};
use crate::monitor::{
    HealthMonitor, HealthSnapshot, PerformanceMetrics, PerformanceTracker,
    SharedPerformanceTracker,
};
use crate::pollination::{CrossPollination, PollinationReport};
use crate::queue::{MessageQueues, SharedMessageQueues};
use crate::registry::{AgentRegistry, SharedRegistry};
use crate::state::{MemoryStore, SessionId, SessionResult, SharedPersistence};

/// Explicitly owned process-wide state, shared by every component.
///
/// Cloning shares the same underlying state.
#[derive(Clone)]
pub struct CouncilContext {
    pub config: CouncilConfig,
    pub registry: SharedRegistry,
    pub handles: AgentHandles,
    pub queues: SharedMessageQueues,
    pub tracker: SharedPerformanceTracker,
    pub persistence: SharedPersistence,
    pub event_bus: SharedEventBus,
}

impl CouncilContext {
    /// Validate the config and build fresh state with an in-memory store
    pub fn new(config: CouncilConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            registry: AgentRegistry::new().shared(),
            handles: AgentHandles::new(),
            queues: MessageQueues::new(config.queue_capacity).shared(),
            tracker: PerformanceTracker::new().shared(),
            persistence: Arc::new(MemoryStore::new()),
            event_bus: EventBus::new().shared(),
            config,
        })
    }

    pub fn with_persistence(mut self, persistence: SharedPersistence) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_event_bus(mut self, event_bus: SharedEventBus) -> Self {
        self.event_bus = event_bus;
        self
    }
}

/// Facade over the whole engine
pub struct SageCouncil {
    context: CouncilContext,
    coordinator: SessionCoordinator,
    resolver: ConflictResolver,
    pollination: CrossPollination,
    health: Arc<HealthMonitor>,
    monitor_task: Mutex<Option<JoinHandle<()>>>,
}

impl SageCouncil {
    /// Build a council with an in-memory store. Invalid config fails here.
    pub fn new(config: CouncilConfig) -> ConfigResult<Self> {
        Self::with_context(CouncilContext::new(config)?)
    }

    /// Build a council over an existing context
    pub fn with_context(context: CouncilContext) -> ConfigResult<Self> {
        context.config.validate()?;

        let coordinator = SessionCoordinator::new(context.clone())?;
        let resolver = ConflictResolver::new(context.config.resolution_acceptance)?
            .with_engine(ConsensusEngine::new(context.config.consensus_threshold)?);
        let pollination = CrossPollination::new(
            context.registry.clone(),
            context.handles.clone(),
            context.queues.clone(),
            context.config.consult_timeout(),
        )
        .with_event_bus(context.event_bus.clone())
        .enabled(context.config.cross_sage_learning);
        let health = Arc::new(
            HealthMonitor::new(context.registry.clone())
                .with_persistence(context.persistence.clone())
                .with_event_bus(context.event_bus.clone()),
        );

        info!(
            threshold = context.config.consensus_threshold,
            queue_capacity = context.config.queue_capacity,
            auto_sync = context.config.auto_sync,
            cross_sage_learning = context.config.cross_sage_learning,
            "Sage council initialized"
        );

        Ok(Self {
            context,
            coordinator,
            resolver,
            pollination,
            health,
            monitor_task: Mutex::new(None),
        })
    }

    /// Register and bind an agent, builder style
    pub fn with_agent(self, agent: impl Agent + 'static) -> CoordinationResult<Self> {
        self.add_agent(Arc::new(agent))?;
        Ok(self)
    }

    /// Register and bind an agent.
    ///
    /// Returns `false` when the agent was already registered with the same
    /// capabilities; its handle is rebound either way.
    pub fn add_agent(&self, agent: SharedAgent) -> CoordinationResult<bool> {
        let added = self
            .context
            .registry
            .write()
            .map_err(|_| CoordinationError::LockPoisoned)?
            .register(agent.id(), agent.capabilities())?;
        self.context.handles.bind(agent)?;
        Ok(added)
    }

    /// Mark an agent available or unavailable for future sessions
    pub fn set_agent_active(&self, agent_id: &str, active: bool) -> CoordinationResult<()> {
        self.context
            .registry
            .write()
            .map_err(|_| CoordinationError::LockPoisoned)?
            .set_active(agent_id, active)
    }

    /// Run one consultation session
    pub async fn run_session(&self, request: ConsultationRequest) -> SessionResult {
        self.coordinator.run_session(request).await
    }

    /// Arbitrate already-produced recommendations
    pub fn resolve_conflict(
        &self,
        recommendations: &BTreeMap<String, AgentResponse>,
    ) -> ConflictResolution {
        let resolution = self.resolver.resolve_conflict(recommendations);
        self.publish_resolution(&resolution);
        resolution
    }

    /// Arbitrate with a caller-chosen severity
    pub fn resolve_with_severity(
        &self,
        recommendations: &BTreeMap<String, AgentResponse>,
        severity: ConflictSeverity,
    ) -> ConflictResolution {
        let resolution = self.resolver.resolve_with_severity(recommendations, severity);
        self.publish_resolution(&resolution);
        resolution
    }

    fn publish_resolution(&self, resolution: &ConflictResolution) {
        self.context.event_bus.publish(CouncilEvent::ConflictResolved {
            strategy: resolution.strategy,
            severity: resolution.severity,
            resolved: resolution.resolved,
            final_recommendation: resolution.final_recommendation.clone(),
            confidence: resolution.confidence_score,
            timestamp: Utc::now(),
        });
    }

    pub fn get_health(&self) -> CoordinationResult<HealthSnapshot> {
        self.health.snapshot()
    }

    pub fn get_metrics(&self) -> CoordinationResult<PerformanceMetrics> {
        self.context.tracker.snapshot()
    }

    /// Zero the performance metrics
    pub fn reset_metrics(&self) -> CoordinationResult<()> {
        self.context.tracker.reset()
    }

    /// Run one knowledge-transfer round across active agents
    pub async fn cross_pollinate(&self) -> CoordinationResult<PollinationReport> {
        self.pollination.run().await
    }

    /// Ids of sessions currently in flight
    pub fn get_active_sessions(&self) -> Vec<SessionId> {
        self.coordinator.get_active_sessions()
    }

    /// Start the periodic health monitor. Calling it again is a no-op.
    pub fn start_health_monitor(&self) -> CoordinationResult<()> {
        let mut task = self
            .monitor_task
            .lock()
            .map_err(|_| CoordinationError::LockPoisoned)?;
        if task.is_none() {
            let interval = self.context.config.health_check_interval();
            info!(interval_ms = interval.as_millis() as u64, "Starting health monitor");
            *task = Some(Arc::clone(&self.health).spawn(interval));
        }
        Ok(())
    }

    /// Stop background work
    pub fn shutdown(&self) {
        match self.monitor_task.lock() {
            Ok(mut task) => {
                if let Some(handle) = task.take() {
                    handle.abort();
                    info!("Health monitor stopped");
                }
            }
            Err(_) => warn!("Monitor handle poisoned during shutdown"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CouncilEvent> {
        self.context.event_bus.subscribe()
    }

    pub fn context(&self) -> &CouncilContext {
        &self.context
    }

    pub fn config(&self) -> &CouncilConfig {
        &self.context.config
    }
}

impl Drop for SageCouncil {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{RequestType, Sage, ScriptedAgent};
    use crate::error::ConfigError;
    use crate::ensemble::arbitration::ResolutionStrategy;

    #[test]
    fn test_invalid_config_fails_eagerly() {
        let config = CouncilConfig {
            consensus_threshold: 1.5,
            ..CouncilConfig::default()
        };
        assert!(matches!(
            SageCouncil::new(config),
            Err(ConfigError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_resolver_shares_council_threshold() {
        let config = CouncilConfig {
            consensus_threshold: 0.6,
            resolution_acceptance: 0.5,
            ..CouncilConfig::default()
        };
        let council = SageCouncil::new(config).unwrap();
        assert_eq!(council.resolver.engine().threshold(), 0.6);
        assert_eq!(council.resolver.acceptance(), 0.5);
    }

    #[tokio::test]
    async fn test_add_agent_idempotent_and_duplicate() {
        let council = SageCouncil::new(CouncilConfig::default()).unwrap();
        let first = Arc::new(ScriptedAgent::for_sage(Sage::Task, "X", 0.5));
        assert!(council.add_agent(first.clone()).unwrap());
        assert!(!council.add_agent(first).unwrap());

        let conflicting = Arc::new(
            ScriptedAgent::new("task", "X", 0.5)
                .with_capabilities(["planning".to_string()].into_iter().collect()),
        );
        assert!(matches!(
            council.add_agent(conflicting),
            Err(CoordinationError::DuplicateAgent(_))
        ));
    }

    #[tokio::test]
    async fn test_session_and_metrics() {
        let council = SageCouncil::new(CouncilConfig::default())
            .unwrap()
            .with_agent(ScriptedAgent::for_sage(Sage::Knowledge, "index", 0.9))
            .unwrap()
            .with_agent(ScriptedAgent::for_sage(Sage::Rag, "index", 0.7))
            .unwrap();

        let result = council
            .run_session(ConsultationRequest::new(RequestType::PatternAnalysis, "slow joins"))
            .await;
        assert_eq!(result.final_decision(), Some("index"));

        let metrics = council.get_metrics().unwrap();
        assert_eq!(metrics.total_collaborations, 1);
        assert_eq!(metrics.successful_consensus, 1);

        council.reset_metrics().unwrap();
        assert_eq!(council.get_metrics().unwrap().total_collaborations, 0);
    }

    #[tokio::test]
    async fn test_resolve_conflict_publishes() {
        let council = SageCouncil::new(CouncilConfig::default()).unwrap();
        let mut rx = council.subscribe();

        let recs: BTreeMap<String, AgentResponse> = [
            ("A", "shard", 0.9),
            ("B", "cache", 0.7),
            ("C", "index", 0.6),
        ]
        .into_iter()
        .map(|(a, r, c)| (a.to_string(), AgentResponse::success(a, r, c)))
        .collect();

        let resolution = council.resolve_conflict(&recs);
        assert_eq!(resolution.strategy, ResolutionStrategy::ExpertArbitration);
        assert_eq!(rx.recv().await.unwrap().event_type(), "conflict_resolved");
    }

    #[tokio::test]
    async fn test_health_monitor_lifecycle() {
        let council = SageCouncil::new(CouncilConfig::default()).unwrap();
        council.start_health_monitor().unwrap();
        council.start_health_monitor().unwrap();
        assert!(council.monitor_task.lock().unwrap().is_some());

        council.shutdown();
        assert!(council.monitor_task.lock().unwrap().is_none());
    }
}
