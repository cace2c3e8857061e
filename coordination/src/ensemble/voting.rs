//! Weighted-confidence consensus
//!
//! Every successful response votes for its recommendation with its own
//! confidence as weight. The heaviest recommendation wins if its share of
//! the total weight reaches the threshold.
//!
//! This is an advisory plurality vote. A single very confident agent can
//! carry the decision.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::agent::{AgentResponse, ConsultationRequest};
use crate::config::DEFAULT_CONSENSUS_THRESHOLD;
use crate::error::{ConfigError, ConfigResult, CoordinationError};

/// Weights closer than this are considered tied
const TIE_EPSILON: f64 = 1e-9;

/// Outcome of a consensus evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub consensus_reached: bool,
    /// Winning recommendation, set only when consensus was reached
    pub final_decision: Option<String>,
    /// Heaviest recommendation regardless of threshold
    pub leading_recommendation: Option<String>,
    /// Winning share of total weight, within [0, 1]
    pub consensus_confidence: f64,
    pub total_weight: f64,
    /// Agents whose responses were counted
    pub participating_agents: Vec<String>,
    /// Aggregate weight per recommendation
    pub all_recommendations: BTreeMap<String, f64>,
    pub reason: Option<String>,
}

impl ConsensusResult {
    fn no_valid_responses() -> Self {
        Self {
            consensus_reached: false,
            final_decision: None,
            leading_recommendation: None,
            consensus_confidence: 0.0,
            total_weight: 0.0,
            participating_agents: Vec::new(),
            all_recommendations: BTreeMap::new(),
            reason: Some(CoordinationError::NoValidResponses.to_string()),
        }
    }
}

/// Pure consensus computation
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    threshold: f64,
    /// Tie-break order; agents not listed rank after, by id
    agent_order: Vec<String>,
}

impl ConsensusEngine {
    /// Create an engine with a validated threshold
    pub fn new(threshold: f64) -> ConfigResult<Self> {
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        Ok(Self {
            threshold,
            agent_order: Vec::new(),
        })
    }

    /// Break ties by this order (normally registration order)
    pub fn with_agent_order(mut self, order: Vec<String>) -> Self {
        self.agent_order = order;
        self
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Form consensus over a session's responses
    pub fn form(
        &self,
        responses: &[AgentResponse],
        request: &ConsultationRequest,
    ) -> ConsensusResult {
        let result = self.aggregate(responses);
        info!(
            request_type = %request.request_type,
            responses = responses.len(),
            valid = result.participating_agents.len(),
            consensus_reached = result.consensus_reached,
            confidence = result.consensus_confidence,
            "Consensus evaluated"
        );
        result
    }

    /// Aggregate responses into a consensus result.
    ///
    /// The output depends only on the set of responses, never on their
    /// order in the slice.
    pub fn aggregate(&self, responses: &[AgentResponse]) -> ConsensusResult {
        let rank: HashMap<&str, usize> = self
            .agent_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut valid: Vec<&AgentResponse> = responses.iter().filter(|r| r.success).collect();
        if valid.is_empty() {
            debug!(responses = responses.len(), "No valid responses for consensus");
            return ConsensusResult::no_valid_responses();
        }

        // Canonical order makes both the floating-point sums and the
        // tie-break independent of arrival order
        valid.sort_by(|a, b| {
            let ra = rank.get(a.agent_id.as_str()).copied().unwrap_or(usize::MAX);
            let rb = rank.get(b.agent_id.as_str()).copied().unwrap_or(usize::MAX);
            ra.cmp(&rb).then_with(|| a.agent_id.cmp(&b.agent_id))
        });

        let mut total_weight = 0.0;
        let mut weights: BTreeMap<String, f64> = BTreeMap::new();
        // Recommendations in order of their best-ranked endorser
        let mut first_seen: Vec<&str> = Vec::new();

        for response in &valid {
            let confidence = response.clamped_confidence();
            total_weight += confidence;
            *weights.entry(response.recommendation.clone()).or_insert(0.0) += confidence;
            if !first_seen.contains(&response.recommendation.as_str()) {
                first_seen.push(&response.recommendation);
            }
        }

        let mut best: Option<(&str, f64)> = None;
        for &rec in &first_seen {
            let weight = weights.get(rec).copied().unwrap_or(0.0);
            match best {
                Some((_, best_weight)) if weight <= best_weight + TIE_EPSILON => {}
                _ => best = Some((rec, weight)),
            }
        }

        let (leading, leading_weight) = match best {
            Some((rec, weight)) => (rec.to_string(), weight),
            None => return ConsensusResult::no_valid_responses(),
        };

        let consensus_confidence = if total_weight > 0.0 {
            (leading_weight / total_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let consensus_reached = total_weight > 0.0 && consensus_confidence >= self.threshold;

        debug!(
            leading = %leading,
            leading_weight,
            total_weight,
            consensus_confidence,
            threshold = self.threshold,
            "Aggregated recommendations"
        );

        ConsensusResult {
            consensus_reached,
            final_decision: consensus_reached.then(|| leading.clone()),
            leading_recommendation: Some(leading),
            consensus_confidence,
            total_weight,
            participating_agents: valid.iter().map(|r| r.agent_id.clone()).collect(),
            all_recommendations: weights,
            reason: if consensus_reached {
                None
            } else {
                Some(format!(
                    "confidence {:.3} below threshold {:.2}",
                    consensus_confidence, self.threshold
                ))
            },
        }
    }
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_CONSENSUS_THRESHOLD,
            agent_order: Vec::new(),
        }
    }
}
