//! Conflict resolution, cross-pollination and health monitoring through
//! the public council API.

use std::collections::BTreeMap;
use std::sync::Arc;

use sage_coordination::{
    AgentResponse, ConflictSeverity, CouncilConfig, KnowledgeItem, OverallHealth,
    ResolutionStrategy, Sage, SageCouncil, ScriptedAgent,
};

fn recommendations(entries: &[(&str, &str, f64)]) -> BTreeMap<String, AgentResponse> {
    entries
        .iter()
        .map(|(agent, rec, conf)| {
            (
                agent.to_string(),
                AgentResponse::success(*agent, *rec, *conf),
            )
        })
        .collect()
}

// ── Conflict resolution ────────────────────────────────────────────

#[test]
fn test_high_severity_expert_wins_regardless_of_votes() {
    let council = SageCouncil::new(CouncilConfig::default()).unwrap();
    let resolution = council.resolve_conflict(&recommendations(&[
        ("A", "shard", 0.9),
        ("B", "cache", 0.7),
        ("C", "index", 0.6),
    ]));

    assert_eq!(resolution.severity, Some(ConflictSeverity::High));
    assert_eq!(resolution.strategy, ResolutionStrategy::ExpertArbitration);
    assert_eq!(resolution.final_recommendation.as_deref(), Some("shard"));
    assert_eq!(resolution.confidence_score, 0.9);
    assert!(resolution.resolved);
    assert_eq!(
        resolution.participating_agents,
        vec!["A".to_string(), "B".to_string(), "C".to_string()]
    );
}

#[test]
fn test_forced_severity_is_single_shot() {
    let council = SageCouncil::new(CouncilConfig::default()).unwrap();
    let recs = recommendations(&[("A", "cache", 0.55), ("B", "index", 0.5)]);

    let resolution = council.resolve_with_severity(&recs, ConflictSeverity::Medium);
    assert_eq!(resolution.strategy, ResolutionStrategy::WeightedVote);
    assert_eq!(resolution.final_recommendation.as_deref(), Some("cache"));
    assert!(!resolution.resolved);
    assert!(resolution.quality_score < 0.7);
}

#[test]
fn test_custom_acceptance_threshold() {
    let config = CouncilConfig {
        resolution_acceptance: 0.5,
        ..CouncilConfig::default()
    };
    let council = SageCouncil::new(config).unwrap();
    let resolution = council.resolve_with_severity(
        &recommendations(&[("A", "cache", 0.8), ("B", "index", 0.8)]),
        ConflictSeverity::Low,
    );
    assert_eq!(resolution.confidence_score, 0.5);
    assert!(resolution.resolved);
}

// ── Cross-pollination ──────────────────────────────────────────────

#[tokio::test]
async fn test_pollination_tracks_registry_growth() {
    let council = SageCouncil::new(CouncilConfig::default()).unwrap();
    let knowledge = Arc::new(
        ScriptedAgent::for_sage(Sage::Knowledge, "x", 0.5)
            .with_knowledge(vec![KnowledgeItem::new("retries", "use jitter", 0.8)]),
    );
    let task = Arc::new(ScriptedAgent::for_sage(Sage::Task, "x", 0.5));
    council.add_agent(knowledge.clone()).unwrap();
    council.add_agent(task.clone()).unwrap();

    let report = council.cross_pollinate().await.unwrap();
    assert_eq!(report.transfers.len(), 2);
    assert_eq!(task.received_knowledge().len(), 1);

    council
        .add_agent(Arc::new(ScriptedAgent::for_sage(Sage::Rag, "x", 0.5)))
        .unwrap();
    let report = council.cross_pollinate().await.unwrap();
    assert_eq!(report.transfers.len(), 6);
    assert_eq!(task.received_knowledge().len(), 2);

    let queue = council.context().queues.snapshot("rag").unwrap();
    assert_eq!(queue.len(), 2);
}

#[tokio::test]
async fn test_pollination_disabled_by_config() {
    let config = CouncilConfig {
        cross_sage_learning: false,
        ..CouncilConfig::default()
    };
    let council = SageCouncil::new(config).unwrap();
    let task = Arc::new(ScriptedAgent::for_sage(Sage::Task, "x", 0.5));
    council
        .add_agent(Arc::new(
            ScriptedAgent::for_sage(Sage::Knowledge, "x", 0.5)
                .with_knowledge(vec![KnowledgeItem::new("a", "b", 1.0)]),
        ))
        .unwrap();
    council.add_agent(task.clone()).unwrap();

    let report = council.cross_pollinate().await.unwrap();
    assert!(report.skipped);
    assert!(task.received_knowledge().is_empty());
}

// ── Health ─────────────────────────────────────────────────────────

#[test]
fn test_health_idempotent_and_thresholds() {
    let council = SageCouncil::new(CouncilConfig::default()).unwrap();
    for sage in Sage::all() {
        council
            .add_agent(Arc::new(ScriptedAgent::for_sage(*sage, "x", 0.5)))
            .unwrap();
    }

    let first = council.get_health().unwrap();
    let second = council.get_health().unwrap();
    assert_eq!(first.health_score, second.health_score);
    assert_eq!(first.overall_health, OverallHealth::Healthy);

    council.set_agent_active("rag", false).unwrap();
    council.set_agent_active("incident", false).unwrap();
    let degraded = council.get_health().unwrap();
    assert_eq!(degraded.health_score, 0.5);
    assert_eq!(degraded.overall_health, OverallHealth::Warning);
    assert_eq!(degraded.active_agents, 2);
    assert_eq!(degraded.total_agents, 4);
}
