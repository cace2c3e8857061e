//! Conflict resolution between already-produced recommendations
//!
//! Single-shot arbitration outside a full session. The strategy follows
//! from how badly the recommendations disagree:
//!
//! | Severity | Strategy             | Confidence                       |
//! |----------|----------------------|----------------------------------|
//! | low      | `simple_majority`    | winning endorsements / voters    |
//! | medium   | `weighted_vote`      | consensus confidence             |
//! | high     | `expert_arbitration` | the expert's own confidence      |
//!
//! There is no retry or escalation loop: a resolution below the
//! acceptance bar is reported as unresolved.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::voting::ConsensusEngine;
use crate::agent::AgentResponse;
use crate::config::DEFAULT_RESOLUTION_ACCEPTANCE;
use crate::error::{ConfigError, ConfigResult};

/// Distinct recommendations at or above which a conflict is high severity
const HIGH_DISTINCT: usize = 3;

/// Confidence spread at or above which a conflict is high severity
const HIGH_SPREAD: f64 = 0.5;

/// Confidence spread at or above which a two-way split is medium severity
const MEDIUM_SPREAD: f64 = 0.2;

/// How badly the recommendations disagree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Strategy used to settle a conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    SimpleMajority,
    WeightedVote,
    ExpertArbitration,
    /// Nothing to arbitrate
    None,
}

impl ResolutionStrategy {
    pub fn for_severity(severity: ConflictSeverity) -> Self {
        match severity {
            ConflictSeverity::Low => Self::SimpleMajority,
            ConflictSeverity::Medium => Self::WeightedVote,
            ConflictSeverity::High => Self::ExpertArbitration,
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SimpleMajority => write!(f, "simple_majority"),
            Self::WeightedVote => write!(f, "weighted_vote"),
            Self::ExpertArbitration => write!(f, "expert_arbitration"),
            Self::None => write!(f, "none"),
        }
    }
}

/// Outcome of a conflict resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// Whether the confidence cleared the acceptance bar
    pub resolved: bool,
    pub strategy: ResolutionStrategy,
    pub severity: Option<ConflictSeverity>,
    pub final_recommendation: Option<String>,
    pub confidence_score: f64,
    /// `min(confidence * 1.2, 1.0)`
    pub quality_score: f64,
    pub participating_agents: Vec<String>,
    pub resolved_at: DateTime<Utc>,
}

/// Picks and applies a resolution strategy
#[derive(Debug, Clone)]
pub struct ConflictResolver {
    acceptance: f64,
    engine: ConsensusEngine,
}

impl ConflictResolver {
    /// Create a resolver accepting resolutions at or above `acceptance`
    pub fn new(acceptance: f64) -> ConfigResult<Self> {
        if !(acceptance > 0.0 && acceptance <= 1.0) {
            return Err(ConfigError::InvalidAcceptance(acceptance));
        }
        Ok(Self {
            acceptance,
            engine: ConsensusEngine::default(),
        })
    }

    /// Reuse a consensus engine for the weighted-vote path
    pub fn with_engine(mut self, engine: ConsensusEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn acceptance(&self) -> f64 {
        self.acceptance
    }

    pub fn engine(&self) -> &ConsensusEngine {
        &self.engine
    }

    /// Severity of a conflict among the successful responses
    pub fn assess_severity(recommendations: &BTreeMap<String, AgentResponse>) -> ConflictSeverity {
        let valid: Vec<&AgentResponse> = recommendations.values().filter(|r| r.success).collect();
        if valid.is_empty() {
            return ConflictSeverity::Low;
        }

        let mut distinct: Vec<&str> = valid.iter().map(|r| r.recommendation.as_str()).collect();
        distinct.sort_unstable();
        distinct.dedup();

        let confidences = valid.iter().map(|r| r.clamped_confidence());
        let max = confidences.clone().fold(f64::MIN, f64::max);
        let min = confidences.fold(f64::MAX, f64::min);
        let spread = max - min;

        if distinct.len() >= HIGH_DISTINCT || spread >= HIGH_SPREAD {
            ConflictSeverity::High
        } else if distinct.len() == 2 && spread >= MEDIUM_SPREAD {
            ConflictSeverity::Medium
        } else {
            ConflictSeverity::Low
        }
    }

    /// Resolve a conflict, choosing the strategy from its severity
    pub fn resolve_conflict(
        &self,
        recommendations: &BTreeMap<String, AgentResponse>,
    ) -> ConflictResolution {
        let severity = Self::assess_severity(recommendations);
        self.resolve_with_severity(recommendations, severity)
    }

    /// Resolve a conflict with a caller-chosen severity
    pub fn resolve_with_severity(
        &self,
        recommendations: &BTreeMap<String, AgentResponse>,
        severity: ConflictSeverity,
    ) -> ConflictResolution {
        // The map key is the authoritative agent id
        let valid: Vec<AgentResponse> = recommendations
            .iter()
            .filter(|(_, r)| r.success)
            .map(|(id, r)| AgentResponse {
                agent_id: id.clone(),
                ..r.clone()
            })
            .collect();

        if valid.is_empty() {
            warn!(candidates = recommendations.len(), "No valid recommendations to arbitrate");
            return ConflictResolution {
                resolved: false,
                strategy: ResolutionStrategy::None,
                severity: None,
                final_recommendation: None,
                confidence_score: 0.0,
                quality_score: 0.0,
                participating_agents: Vec::new(),
                resolved_at: Utc::now(),
            };
        }

        let strategy = ResolutionStrategy::for_severity(severity);
        let (final_recommendation, confidence_score) = match strategy {
            ResolutionStrategy::SimpleMajority => Self::simple_majority(&valid),
            ResolutionStrategy::WeightedVote => self.weighted_vote(&valid),
            ResolutionStrategy::ExpertArbitration => Self::expert_arbitration(&valid),
            ResolutionStrategy::None => (None, 0.0),
        };

        let confidence_score = confidence_score.clamp(0.0, 1.0);
        let resolved = final_recommendation.is_some() && confidence_score >= self.acceptance;

        info!(
            severity = %severity,
            strategy = %strategy,
            resolved,
            confidence = confidence_score,
            "Conflict resolution complete"
        );

        ConflictResolution {
            resolved,
            strategy,
            severity: Some(severity),
            final_recommendation,
            confidence_score,
            quality_score: (confidence_score * 1.2).min(1.0),
            participating_agents: valid.iter().map(|r| r.agent_id.clone()).collect(),
            resolved_at: Utc::now(),
        }
    }

    /// Most endorsements wins; ties go to the recommendation endorsed by
    /// the lexicographically lowest agent id
    fn simple_majority(valid: &[AgentResponse]) -> (Option<String>, f64) {
        let mut sorted: Vec<&AgentResponse> = valid.iter().collect();
        sorted.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        let mut counts: Vec<(&str, usize)> = Vec::new();
        for response in &sorted {
            match counts
                .iter_mut()
                .find(|(rec, _)| *rec == response.recommendation)
            {
                Some((_, count)) => *count += 1,
                None => counts.push((&response.recommendation, 1)),
            }
        }

        let mut best: Option<(&str, usize)> = None;
        for &(rec, count) in &counts {
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((rec, count)),
            }
        }

        debug!(tally = ?counts, "Simple majority tally");
        match best {
            Some((rec, count)) => (Some(rec.to_string()), count as f64 / sorted.len() as f64),
            None => (None, 0.0),
        }
    }

    /// Weighted-confidence plurality via the consensus engine
    fn weighted_vote(&self, valid: &[AgentResponse]) -> (Option<String>, f64) {
        let result = self.engine.aggregate(valid);
        (result.leading_recommendation, result.consensus_confidence)
    }

    /// The single most confident response wins outright
    fn expert_arbitration(valid: &[AgentResponse]) -> (Option<String>, f64) {
        let mut sorted: Vec<&AgentResponse> = valid.iter().collect();
        sorted.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));

        let mut expert: Option<&AgentResponse> = None;
        for response in sorted {
            match expert {
                Some(e) if response.clamped_confidence() <= e.clamped_confidence() => {}
                _ => expert = Some(response),
            }
        }

        match expert {
            Some(e) => {
                debug!(
                    expert = %e.agent_id,
                    confidence = e.clamped_confidence(),
                    "Expert selected"
                );
                (Some(e.recommendation.clone()), e.clamped_confidence())
            }
            None => (None, 0.0),
        }
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self {
            acceptance: DEFAULT_RESOLUTION_ACCEPTANCE,
            engine: ConsensusEngine::default(),
        }
    }
}
