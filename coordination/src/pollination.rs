//! Cross-pollination: pairwise knowledge transfer between active agents
//!
//! Every active source shares once; every other active agent is offered
//! that knowledge. The participant list is read from the live registry on
//! each run.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::agent::{AgentHandles, KnowledgeItem};
use crate::error::{CoordinationError, CoordinationResult};
use crate::events::{CouncilEvent, SharedEventBus};
use crate::queue::{Message, MessageType, SharedMessageQueues};
use crate::registry::SharedRegistry;

/// One source → target transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeTransfer {
    pub source: String,
    pub target: String,
    pub offered: usize,
    pub accepted: usize,
    /// `(accepted / offered) * mean(item confidence)`, 0 when nothing was offered
    pub integration_quality: f64,
    pub transferred_at: DateTime<Utc>,
}

/// Outcome of a cross-pollination round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollinationReport {
    pub transfers: Vec<KnowledgeTransfer>,
    pub average_quality: f64,
    /// Set when cross-agent learning is disabled
    pub skipped: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl PollinationReport {
    fn skipped() -> Self {
        let now = Utc::now();
        Self {
            transfers: Vec::new(),
            average_quality: 0.0,
            skipped: true,
            started_at: now,
            completed_at: now,
        }
    }
}

/// Score a single transfer
pub fn integration_quality(offered: &[KnowledgeItem], accepted: usize) -> f64 {
    if offered.is_empty() {
        return 0.0;
    }
    let accepted = accepted.min(offered.len());
    let mean_confidence =
        offered.iter().map(|i| i.confidence).sum::<f64>() / offered.len() as f64;
    let quality = (accepted as f64 / offered.len() as f64) * mean_confidence;
    if quality.is_nan() {
        0.0
    } else {
        quality.clamp(0.0, 1.0)
    }
}

/// Runs knowledge transfer rounds
#[derive(Clone)]
pub struct CrossPollination {
    registry: SharedRegistry,
    handles: AgentHandles,
    queues: SharedMessageQueues,
    event_bus: Option<SharedEventBus>,
    timeout: Duration,
    enabled: bool,
}

impl CrossPollination {
    pub fn new(
        registry: SharedRegistry,
        handles: AgentHandles,
        queues: SharedMessageQueues,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            handles,
            queues,
            event_bus: None,
            timeout,
            enabled: true,
        }
    }

    pub fn with_event_bus(mut self, event_bus: SharedEventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Disabled rounds return a skipped report without contacting anyone
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Run one round over every ordered pair of active agents
    pub async fn run(&self) -> CoordinationResult<PollinationReport> {
        if !self.enabled {
            debug!("Cross-agent learning disabled, skipping pollination");
            return Ok(PollinationReport::skipped());
        }

        let started_at = Utc::now();
        let participants: Vec<String> = {
            let registry = self
                .registry
                .read()
                .map_err(|_| CoordinationError::LockPoisoned)?;
            registry
                .active_ids()
                .into_iter()
                .filter(|id| self.handles.contains(id))
                .collect()
        };

        let knowledge = self.extract_all(&participants).await;

        let mut transfers = Vec::new();
        for source in &participants {
            let items = knowledge.get(source).map(Vec::as_slice).unwrap_or(&[]);
            let round = participants
                .iter()
                .filter(|t| *t != source)
                .map(|target| self.transfer(source, target, items));
            for transfer in join_all(round).await {
                transfers.push(transfer?);
            }
        }

        let average_quality = if transfers.is_empty() {
            0.0
        } else {
            transfers.iter().map(|t| t.integration_quality).sum::<f64>() / transfers.len() as f64
        };

        info!(
            participants = participants.len(),
            transfers = transfers.len(),
            average_quality,
            "Cross-pollination complete"
        );

        Ok(PollinationReport {
            transfers,
            average_quality,
            skipped: false,
            started_at,
            completed_at: Utc::now(),
        })
    }

    /// Ask every source for its knowledge concurrently
    async fn extract_all(&self, sources: &[String]) -> HashMap<String, Vec<KnowledgeItem>> {
        let mut join_set: JoinSet<(String, Vec<KnowledgeItem>)> = JoinSet::new();

        for id in sources {
            let Some(agent) = self.handles.get(id) else {
                continue;
            };
            let id = id.clone();
            let timeout = self.timeout;
            join_set.spawn(async move {
                match tokio::time::timeout(timeout, agent.share_knowledge()).await {
                    Ok(items) => (id, items),
                    Err(_) => {
                        warn!(
                            agent_id = %id,
                            timeout_ms = timeout.as_millis() as u64,
                            "Knowledge extraction timed out"
                        );
                        (id, Vec::new())
                    }
                }
            });
        }

        let mut knowledge = HashMap::new();
        while let Some(res) = join_set.join_next().await {
            match res {
                Ok((id, items)) => {
                    debug!(agent_id = %id, items = items.len(), "Knowledge extracted");
                    knowledge.insert(id, items);
                }
                Err(e) => warn!(error = %e, "Knowledge extraction task panicked"),
            }
        }
        knowledge
    }

    async fn transfer(
        &self,
        source: &str,
        target: &str,
        items: &[KnowledgeItem],
    ) -> CoordinationResult<KnowledgeTransfer> {
        let accepted = match self.handles.get(target) {
            Some(agent) => {
                match tokio::time::timeout(self.timeout, agent.integrate_knowledge(source, items))
                    .await
                {
                    Ok(n) => n.min(items.len()),
                    Err(_) => {
                        warn!(source, target, "Knowledge integration timed out");
                        0
                    }
                }
            }
            None => 0,
        };

        let quality = integration_quality(items, accepted);
        let transfer = KnowledgeTransfer {
            source: source.to_string(),
            target: target.to_string(),
            offered: items.len(),
            accepted,
            integration_quality: quality,
            transferred_at: Utc::now(),
        };

        self.queues.enqueue(
            target,
            Message::new(
                None,
                MessageType::KnowledgeTransfer,
                format!("{} of {} items from {}", accepted, items.len(), source),
                source,
            ),
        )?;
        {
            let mut registry = self
                .registry
                .write()
                .map_err(|_| CoordinationError::LockPoisoned)?;
            registry.touch(source)?;
            registry.touch(target)?;
        }

        if let Some(ref bus) = self.event_bus {
            bus.publish(CouncilEvent::KnowledgeTransferred {
                source: transfer.source.clone(),
                target: transfer.target.clone(),
                offered: transfer.offered,
                accepted: transfer.accepted,
                integration_quality: transfer.integration_quality,
                timestamp: transfer.transferred_at,
            });
        }

        debug!(source, target, accepted, quality, "Knowledge transferred");
        Ok(transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::agent::{Agent, ScriptedAgent};
    use crate::queue::MessageQueues;
    use crate::registry::AgentRegistry;

    fn setup(
        agents: Vec<ScriptedAgent>,
    ) -> (CrossPollination, SharedRegistry, SharedMessageQueues) {
        let registry = AgentRegistry::new().shared();
        let handles = AgentHandles::new();
        for agent in agents {
            registry
                .write()
                .unwrap()
                .register(agent.id(), agent.capabilities())
                .unwrap();
            handles.bind(Arc::new(agent)).unwrap();
        }
        let queues = MessageQueues::default().shared();
        let pollination = CrossPollination::new(
            registry.clone(),
            handles,
            queues.clone(),
            Duration::from_secs(5),
        );
        (pollination, registry, queues)
    }

    #[test]
    fn test_integration_quality() {
        let items = vec![
            KnowledgeItem::new("a", "x", 0.8),
            KnowledgeItem::new("b", "y", 0.6),
        ];
        assert!((integration_quality(&items, 2) - 0.7).abs() < 1e-9);
        assert!((integration_quality(&items, 1) - 0.35).abs() < 1e-9);
        assert_eq!(integration_quality(&items, 0), 0.0);
        assert_eq!(integration_quality(&[], 0), 0.0);
        // Over-reporting is capped at what was offered
        assert!((integration_quality(&items, 9) - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_every_ordered_pair() {
        let (pollination, _, queues) = setup(vec![
            ScriptedAgent::new("knowledge", "x", 0.5)
                .with_knowledge(vec![KnowledgeItem::new("naming", "snake_case", 1.0)]),
            ScriptedAgent::new("task", "x", 0.5),
            ScriptedAgent::new("rag", "x", 0.5).rejecting_knowledge(),
        ]);

        let report = pollination.run().await.unwrap();
        assert!(!report.skipped);
        assert_eq!(report.transfers.len(), 6);

        let to_task = report
            .transfers
            .iter()
            .find(|t| t.source == "knowledge" && t.target == "task")
            .unwrap();
        assert_eq!(to_task.accepted, 1);
        assert_eq!(to_task.integration_quality, 1.0);

        let to_rag = report
            .transfers
            .iter()
            .find(|t| t.source == "knowledge" && t.target == "rag")
            .unwrap();
        assert_eq!(to_rag.accepted, 0);
        assert_eq!(to_rag.integration_quality, 0.0);

        // knowledge and rag each sent one transfer to task
        assert_eq!(queues.len("task"), 2);
        assert!((report.average_quality - 1.0 / 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_inactive_agents_excluded() {
        let (pollination, registry, _) = setup(vec![
            ScriptedAgent::new("knowledge", "x", 0.5),
            ScriptedAgent::new("task", "x", 0.5),
            ScriptedAgent::new("rag", "x", 0.5),
        ]);
        registry.write().unwrap().set_active("rag", false).unwrap();

        let report = pollination.run().await.unwrap();
        assert_eq!(report.transfers.len(), 2);
        assert!(report
            .transfers
            .iter()
            .all(|t| t.source != "rag" && t.target != "rag"));
    }

    #[tokio::test]
    async fn test_disabled_round_is_skipped() {
        let (pollination, _, queues) = setup(vec![
            ScriptedAgent::new("knowledge", "x", 0.5),
            ScriptedAgent::new("task", "x", 0.5),
        ]);

        let report = pollination.enabled(false).run().await.unwrap();
        assert!(report.skipped);
        assert!(report.transfers.is_empty());
        assert_eq!(queues.len("task"), 0);
    }
}
