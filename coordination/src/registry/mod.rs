//! Agent registry: participant identity, capability and health
//!
//! The authoritative table of who can be consulted. Entries keep their
//! registration order, which doubles as the deterministic tie-break order
//! for consensus.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::RequestType;
use crate::error::{CoordinationError, CoordinationResult};

/// Consecutive failed consultations before an agent is marked `Error`
const ERROR_AFTER_FAILURES: u32 = 3;

/// Shared reference to AgentRegistry
pub type SharedRegistry = Arc<RwLock<AgentRegistry>>;

/// Health of a single agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentHealth {
    Healthy,
    Warning,
    Error,
}

impl std::fmt::Display for AgentHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A registered agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    pub active: bool,
    pub health: AgentHealth,
    pub last_interaction: Option<DateTime<Utc>>,
    pub capabilities: BTreeSet<String>,
    /// Failed consultations since the last success
    pub consecutive_failures: u32,
    pub success_count: u64,
    pub failure_count: u64,
}

impl AgentEntry {
    fn new(id: String, capabilities: BTreeSet<String>) -> Self {
        Self {
            id,
            active: true,
            health: AgentHealth::Healthy,
            last_interaction: None,
            capabilities,
            consecutive_failures: 0,
            success_count: 0,
            failure_count: 0,
        }
    }

    /// Whether this agent can serve a request of the given type
    pub fn is_eligible_for(&self, request_type: &RequestType) -> bool {
        match request_type.required_capabilities() {
            Some(required) => required.iter().any(|c| self.capabilities.contains(*c)),
            None => true,
        }
    }

    /// Fraction of consultations that succeeded (1.0 with no history)
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            1.0
        } else {
            self.success_count as f64 / total as f64
        }
    }
}

/// Registry of all agents, in registration order
#[derive(Debug, Default)]
pub struct AgentRegistry {
    entries: Vec<AgentEntry>,
    index: HashMap<String, usize>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a shared reference to this registry
    pub fn shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Register an agent.
    ///
    /// Re-registering with identical capabilities is a no-op and returns
    /// `false`; different capabilities fail with `DuplicateAgent`.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        capabilities: BTreeSet<String>,
    ) -> CoordinationResult<bool> {
        let id = id.into();

        if let Some(&pos) = self.index.get(&id) {
            if self.entries[pos].capabilities == capabilities {
                debug!(agent_id = %id, "Agent already registered");
                return Ok(false);
            }
            return Err(CoordinationError::DuplicateAgent(id));
        }

        info!(agent_id = %id, capabilities = ?capabilities, "Registering agent");
        self.index.insert(id.clone(), self.entries.len());
        self.entries.push(AgentEntry::new(id, capabilities));
        Ok(true)
    }

    pub fn get(&self, id: &str) -> Option<&AgentEntry> {
        self.index.get(id).map(|&pos| &self.entries[pos])
    }

    fn get_mut(&mut self, id: &str) -> CoordinationResult<&mut AgentEntry> {
        match self.index.get(id) {
            Some(&pos) => Ok(&mut self.entries[pos]),
            None => Err(CoordinationError::UnknownAgent(id.to_string())),
        }
    }

    /// Set an agent's health, touching `last_interaction`
    pub fn set_health(&mut self, id: &str, health: AgentHealth) -> CoordinationResult<()> {
        let entry = self.get_mut(id)?;
        entry.health = health;
        entry.last_interaction = Some(Utc::now());
        Ok(())
    }

    pub fn set_active(&mut self, id: &str, active: bool) -> CoordinationResult<()> {
        let entry = self.get_mut(id)?;
        if entry.active != active {
            info!(agent_id = id, active, "Agent availability changed");
        }
        entry.active = active;
        Ok(())
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.get(id).map(|e| e.active).unwrap_or(false)
    }

    /// Record an interaction without changing health
    pub fn touch(&mut self, id: &str) -> CoordinationResult<()> {
        self.get_mut(id)?.last_interaction = Some(Utc::now());
        Ok(())
    }

    /// Record a successful consultation
    pub fn record_success(&mut self, id: &str) -> CoordinationResult<()> {
        let entry = self.get_mut(id)?;
        entry.success_count += 1;
        entry.consecutive_failures = 0;
        entry.health = AgentHealth::Healthy;
        entry.last_interaction = Some(Utc::now());
        Ok(())
    }

    /// Record a failed or timed-out consultation
    pub fn record_failure(&mut self, id: &str) -> CoordinationResult<()> {
        let entry = self.get_mut(id)?;
        entry.failure_count += 1;
        entry.consecutive_failures += 1;
        entry.health = if entry.consecutive_failures >= ERROR_AFTER_FAILURES {
            AgentHealth::Error
        } else {
            AgentHealth::Warning
        };
        entry.last_interaction = Some(Utc::now());
        Ok(())
    }

    /// Active agents eligible for a request, in registration order.
    ///
    /// An empty result means no session is possible; it is not an error.
    pub fn select_for(&self, request_type: &RequestType) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.active && e.is_eligible_for(request_type))
            .map(|e| e.id.clone())
            .collect()
    }

    /// All entries in registration order
    pub fn entries(&self) -> &[AgentEntry] {
        &self.entries
    }

    /// All ids in registration order
    pub fn registration_order(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Ids of active agents in registration order
    pub fn active_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.active)
            .map(|e| e.id.clone())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|e| e.active).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
