//! Registry health snapshots and alerting

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CoordinationError, CoordinationResult};
use crate::events::{CouncilEvent, SharedEventBus};
use crate::registry::{AgentHealth, SharedRegistry};
use crate::state::SharedPersistence;

/// Health score at or above which the council is healthy
const HEALTHY_SCORE: f64 = 0.75;

/// Health score at or above which the council is degraded but usable
const WARNING_SCORE: f64 = 0.5;

/// Council-wide health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    Warning,
    Critical,
}

impl OverallHealth {
    pub fn from_score(score: f64) -> Self {
        if score >= HEALTHY_SCORE {
            Self::Healthy
        } else if score >= WARNING_SCORE {
            Self::Warning
        } else {
            Self::Critical
        }
    }
}

impl std::fmt::Display for OverallHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Per-agent view inside a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub id: String,
    pub active: bool,
    pub health: AgentHealth,
    pub last_interaction: Option<DateTime<Utc>>,
    pub success_rate: f64,
}

/// Point-in-time council health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub total_agents: usize,
    pub active_agents: usize,
    /// `active / total`, 0 with no agents
    pub health_score: f64,
    pub overall_health: OverallHealth,
    pub agents: Vec<AgentStatus>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A detected health problem with one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub agent_id: String,
    pub message: String,
    pub severity: AlertSeverity,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        agent_id: impl Into<String>,
        message: impl Into<String>,
        severity: AlertSeverity,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            message: message.into(),
            severity,
            raised_at: Utc::now(),
        }
    }
}

/// Reads the registry and reports on it
#[derive(Clone)]
pub struct HealthMonitor {
    registry: SharedRegistry,
    persistence: Option<SharedPersistence>,
    event_bus: Option<SharedEventBus>,
}

impl HealthMonitor {
    pub fn new(registry: SharedRegistry) -> Self {
        Self {
            registry,
            persistence: None,
            event_bus: None,
        }
    }

    /// Persist alerts raised by `check`
    pub fn with_persistence(mut self, persistence: SharedPersistence) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Publish alerts raised by `check`
    pub fn with_event_bus(mut self, event_bus: SharedEventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Current council health; read-only
    pub fn snapshot(&self) -> CoordinationResult<HealthSnapshot> {
        let registry = self
            .registry
            .read()
            .map_err(|_| CoordinationError::LockPoisoned)?;

        let total_agents = registry.len();
        let active_agents = registry.active_count();
        let health_score = if total_agents == 0 {
            0.0
        } else {
            active_agents as f64 / total_agents as f64
        };

        let agents = registry
            .entries()
            .iter()
            .map(|e| AgentStatus {
                id: e.id.clone(),
                active: e.active,
                health: e.health,
                last_interaction: e.last_interaction,
                success_rate: e.success_rate(),
            })
            .collect();

        Ok(HealthSnapshot {
            total_agents,
            active_agents,
            health_score,
            overall_health: OverallHealth::from_score(health_score),
            agents,
            checked_at: Utc::now(),
        })
    }

    /// Alerts for every inactive agent and every unhealthy active one
    pub fn detect_alerts(&self) -> CoordinationResult<Vec<Alert>> {
        let registry = self
            .registry
            .read()
            .map_err(|_| CoordinationError::LockPoisoned)?;

        let alerts = registry
            .entries()
            .iter()
            .filter_map(|e| {
                if !e.active {
                    Some(Alert::new(
                        &e.id,
                        format!("{} is inactive", e.id),
                        AlertSeverity::Critical,
                    ))
                } else if e.health != AgentHealth::Healthy {
                    let severity = match e.health {
                        AgentHealth::Error => AlertSeverity::Critical,
                        _ => AlertSeverity::Warning,
                    };
                    Some(Alert::new(
                        &e.id,
                        format!("{} health issue: {}", e.id, e.health),
                        severity,
                    ))
                } else {
                    None
                }
            })
            .collect();
        Ok(alerts)
    }

    /// Detect alerts, then persist and publish each one.
    ///
    /// Persistence failures are logged and swallowed.
    pub fn check(&self) -> CoordinationResult<Vec<Alert>> {
        let alerts = self.detect_alerts()?;

        for alert in &alerts {
            if let Some(ref persistence) = self.persistence {
                if let Err(e) = persistence.save_alert(alert) {
                    warn!(agent_id = %alert.agent_id, "Failed to persist alert: {}", e);
                }
            }
            if let Some(ref bus) = self.event_bus {
                bus.publish(CouncilEvent::AlertRaised {
                    alert_id: alert.id.clone(),
                    agent_id: alert.agent_id.clone(),
                    message: alert.message.clone(),
                    severity: alert.severity,
                    timestamp: alert.raised_at,
                });
            }
        }

        if !alerts.is_empty() {
            info!(count = alerts.len(), "Health alerts raised");
        }
        Ok(alerts)
    }

    /// Run `check` every `interval` on a background task
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = interval.max(Duration::from_millis(1));
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                match self.check() {
                    Ok(alerts) => debug!(alerts = alerts.len(), "Periodic health check"),
                    Err(e) => warn!("Periodic health check failed: {}", e),
                }
            }
        })
    }
}
