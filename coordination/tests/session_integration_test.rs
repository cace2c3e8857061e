//! Mocked session integration test: drives full consultation rounds
//! through the council facade with scripted agents.
//!
//! Covers: registry ↔ coordinator ↔ consensus ↔ persistence ↔ metrics
//! running together.

use std::sync::Arc;
use std::time::Duration;

use sage_coordination::{
    AgentHealth, ConsultationRequest, CouncilConfig, CouncilContext, JsonlStore, RequestType,
    Sage, SageCouncil, ScriptedAgent, SessionStatus,
};
use tempfile::tempdir;

fn council_with(agents: Vec<ScriptedAgent>) -> SageCouncil {
    let council = SageCouncil::new(CouncilConfig::default()).unwrap();
    for agent in agents {
        council.add_agent(Arc::new(agent)).unwrap();
    }
    council
}

// ── Consensus scenarios ────────────────────────────────────────────

#[tokio::test]
async fn test_below_threshold_still_completes() {
    let council = council_with(vec![
        ScriptedAgent::for_sage(Sage::Knowledge, "X", 0.9),
        ScriptedAgent::for_sage(Sage::Task, "X", 0.8),
        ScriptedAgent::for_sage(Sage::Rag, "Y", 0.6),
    ]);

    let result = council
        .run_session(ConsultationRequest::new(RequestType::General, "plurality"))
        .await;

    assert_eq!(result.status, SessionStatus::Completed);
    assert!(!result.consensus_reached());
    assert!(result.final_decision().is_none());

    let consensus = result.consensus.unwrap();
    assert!((consensus.total_weight - 2.3).abs() < 1e-9);
    assert!((consensus.consensus_confidence - 0.739).abs() < 1e-3);
}

#[tokio::test]
async fn test_failed_response_lifts_consensus() {
    let council = council_with(vec![
        ScriptedAgent::for_sage(Sage::Knowledge, "X", 0.9),
        ScriptedAgent::for_sage(Sage::Task, "X", 0.8),
        ScriptedAgent::for_sage(Sage::Rag, "Y", 0.6).failing("index offline"),
    ]);

    let result = council
        .run_session(ConsultationRequest::new(RequestType::General, "plurality"))
        .await;

    assert!(result.consensus_reached());
    assert_eq!(result.final_decision(), Some("X"));
    assert_eq!(result.consensus.unwrap().consensus_confidence, 1.0);
}

#[tokio::test]
async fn test_all_failures_no_valid_responses() {
    let council = council_with(vec![
        ScriptedAgent::for_sage(Sage::Knowledge, "X", 0.9).failing("down"),
        ScriptedAgent::for_sage(Sage::Task, "X", 0.8).failing("down"),
    ]);

    let result = council
        .run_session(ConsultationRequest::new(RequestType::General, "dark"))
        .await;

    assert_eq!(result.status, SessionStatus::Completed);
    let consensus = result.consensus.unwrap();
    assert!(!consensus.consensus_reached);
    assert!(consensus.final_decision.is_none());
    assert_eq!(consensus.reason.as_deref(), Some("no valid responses"));
}

// ── No eligible agents ─────────────────────────────────────────────

#[tokio::test]
async fn test_all_agents_inactive_fails_session() {
    let council = council_with(
        Sage::all()
            .iter()
            .map(|s| ScriptedAgent::for_sage(*s, "X", 0.9))
            .collect(),
    );
    for sage in Sage::all() {
        council.set_agent_active(sage.id(), false).unwrap();
    }

    let result = council
        .run_session(ConsultationRequest::new(RequestType::PatternAnalysis, "anyone?"))
        .await;

    assert_eq!(result.status, SessionStatus::Failed);
    assert_eq!(result.reason.as_deref(), Some("no eligible agents"));
    assert!(result.participating_agents.is_empty());
    assert_eq!(council.get_metrics().unwrap().total_collaborations, 0);
}

#[tokio::test]
async fn test_no_capability_match_fails_session() {
    let council = council_with(vec![ScriptedAgent::for_sage(Sage::Task, "X", 0.9)]);

    let result = council
        .run_session(ConsultationRequest::new(RequestType::KnowledgeRetrieval, "docs"))
        .await;
    assert_eq!(result.status, SessionStatus::Failed);
}

// ── Concurrency ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_latency_bounded_by_slowest_agent() {
    let council = council_with(
        Sage::all()
            .iter()
            .map(|s| ScriptedAgent::for_sage(*s, "X", 0.8).with_delay(Duration::from_secs(5)))
            .collect(),
    );

    let start = tokio::time::Instant::now();
    let result = council
        .run_session(ConsultationRequest::new(RequestType::General, "parallel"))
        .await;

    assert_eq!(result.responses.len(), 4);
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_never_fails_session() {
    let config = CouncilConfig {
        consult_timeout_ms: 2_000,
        ..CouncilConfig::default()
    };
    let council = SageCouncil::new(config).unwrap();
    council
        .add_agent(Arc::new(ScriptedAgent::for_sage(Sage::Knowledge, "X", 0.9)))
        .unwrap();
    council
        .add_agent(Arc::new(
            ScriptedAgent::for_sage(Sage::Task, "Y", 1.0).with_delay(Duration::from_secs(300)),
        ))
        .unwrap();

    let result = council
        .run_session(ConsultationRequest::new(RequestType::General, "hung backend"))
        .await;

    assert_eq!(result.status, SessionStatus::Completed);
    assert_eq!(result.final_decision(), Some("X"));

    let health = council.get_health().unwrap();
    let task = health.agents.iter().find(|a| a.id == "task").unwrap();
    assert_eq!(task.health, AgentHealth::Warning);
}

#[tokio::test]
async fn test_concurrent_sessions_keep_metrics_consistent() {
    let council = Arc::new(council_with(vec![
        ScriptedAgent::for_sage(Sage::Knowledge, "X", 0.9),
        ScriptedAgent::for_sage(Sage::Task, "X", 0.9),
    ]));

    let mut handles = Vec::new();
    for i in 0..16 {
        let council = Arc::clone(&council);
        handles.push(tokio::spawn(async move {
            council
                .run_session(ConsultationRequest::new(RequestType::General, format!("run {i}")))
                .await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().session_id);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 16);

    let metrics = council.get_metrics().unwrap();
    assert_eq!(metrics.total_collaborations, 16);
    assert_eq!(metrics.successful_consensus, 16);
    assert!(council.get_active_sessions().is_empty());
}

// ── Persistence ────────────────────────────────────────────────────

#[tokio::test]
async fn test_sessions_persisted_to_jsonl() {
    let dir = tempdir().unwrap();
    let store = Arc::new(JsonlStore::open(dir.path()).unwrap());
    let context = CouncilContext::new(CouncilConfig::default())
        .unwrap()
        .with_persistence(store.clone());
    let council = SageCouncil::with_context(context).unwrap();
    council
        .add_agent(Arc::new(ScriptedAgent::for_sage(Sage::Incident, "rollback", 0.95)))
        .unwrap();

    let completed = council
        .run_session(ConsultationRequest::new(RequestType::IncidentResponse, "5xx spike"))
        .await;
    council.set_agent_active("incident", false).unwrap();
    let failed = council
        .run_session(ConsultationRequest::new(RequestType::IncidentResponse, "again"))
        .await;

    let records = store.load_sessions().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].session_id, completed.session_id);
    assert_eq!(records[0].final_decision(), Some("rollback"));
    assert_eq!(records[1].session_id, failed.session_id);
    assert_eq!(records[1].status, SessionStatus::Failed);

    // auto_sync recorded the inactive agent after the second session
    let alerts = store.load_alerts().unwrap();
    assert!(alerts.iter().any(|a| a.message == "incident is inactive"));
}
