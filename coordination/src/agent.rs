//! Agents: the reasoning participants consulted by the council
//!
//! The engine never reasons itself. Each participant implements [`Agent`]
//! and self-reports a confidence with every recommendation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConsultError, CoordinationError, CoordinationResult};

/// The four named sages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sage {
    /// Long-term knowledge and pattern memory
    Knowledge,
    /// Task planning and throughput
    Task,
    /// Incident history and failure analysis
    Incident,
    /// Retrieval over indexed documents
    Rag,
}

impl Sage {
    /// Canonical registry id
    pub fn id(&self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Task => "task",
            Self::Incident => "incident",
            Self::Rag => "rag",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Knowledge => "Accumulated patterns, conventions and prior decisions",
            Self::Task => "Task decomposition, scheduling and throughput",
            Self::Incident => "Incident history, failure modes and remediation",
            Self::Rag => "Document retrieval and reference lookup",
        }
    }

    /// Default capability set: the sage's own domain
    pub fn capabilities(&self) -> BTreeSet<String> {
        BTreeSet::from([self.id().to_string()])
    }

    /// All sages in their canonical registration order
    pub fn all() -> &'static [Sage] {
        &[Sage::Knowledge, Sage::Task, Sage::Incident, Sage::Rag]
    }
}

impl std::fmt::Display for Sage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl std::str::FromStr for Sage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "knowledge" => Ok(Self::Knowledge),
            "task" => Ok(Self::Task),
            "incident" => Ok(Self::Incident),
            "rag" => Ok(Self::Rag),
            other => Err(format!("unknown sage: {}", other)),
        }
    }
}

/// Kind of consultation being requested
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequestType {
    PatternAnalysis,
    PerformanceOptimization,
    IncidentResponse,
    KnowledgeRetrieval,
    General,
    Other(String),
}

impl RequestType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::PatternAnalysis => "pattern_analysis",
            Self::PerformanceOptimization => "performance_optimization",
            Self::IncidentResponse => "incident_response",
            Self::KnowledgeRetrieval => "knowledge_retrieval",
            Self::General => "general",
            Self::Other(name) => name,
        }
    }

    /// Capabilities an agent needs to be consulted for this request.
    ///
    /// `None` means every active agent is eligible.
    pub fn required_capabilities(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::PatternAnalysis => Some(&["knowledge", "rag"]),
            Self::PerformanceOptimization => Some(&["task", "incident"]),
            Self::IncidentResponse => Some(&["incident", "knowledge"]),
            Self::KnowledgeRetrieval => Some(&["rag", "knowledge"]),
            Self::General | Self::Other(_) => None,
        }
    }
}

impl From<&str> for RequestType {
    fn from(s: &str) -> Self {
        match s {
            "pattern_analysis" => Self::PatternAnalysis,
            "performance_optimization" => Self::PerformanceOptimization,
            "incident_response" => Self::IncidentResponse,
            "knowledge_retrieval" => Self::KnowledgeRetrieval,
            "general" => Self::General,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for RequestType {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<RequestType> for String {
    fn from(r: RequestType) -> Self {
        r.as_str().to_string()
    }
}

impl std::fmt::Display for RequestType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request put to the council
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsultationRequest {
    pub request_type: RequestType,
    pub description: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl ConsultationRequest {
    pub fn new(request_type: impl Into<RequestType>, description: impl Into<String>) -> Self {
        Self {
            request_type: request_type.into(),
            description: description.into(),
            context: BTreeMap::new(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// One agent's answer to a consultation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    /// May be omitted when the response is keyed by agent id
    #[serde(default)]
    pub agent_id: String,
    pub success: bool,
    pub recommendation: String,
    /// Self-reported confidence, kept within [0, 1]
    pub confidence_score: f64,
    #[serde(default)]
    pub supporting_evidence: Vec<String>,
    /// Wall-clock seconds spent answering
    #[serde(default)]
    pub response_time: f64,
}

impl AgentResponse {
    /// A successful response. Out-of-range confidence is clamped.
    pub fn success(
        agent_id: impl Into<String>,
        recommendation: impl Into<String>,
        confidence_score: f64,
    ) -> Self {
        let agent_id = agent_id.into();
        let confidence_score = clamp_confidence(&agent_id, confidence_score);
        Self {
            agent_id,
            success: true,
            recommendation: recommendation.into(),
            confidence_score,
            supporting_evidence: Vec::new(),
            response_time: 0.0,
        }
    }

    /// A failed response, excluded from consensus
    pub fn failure(agent_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            success: false,
            recommendation: String::new(),
            confidence_score: 0.0,
            supporting_evidence: vec![reason.into()],
            response_time: 0.0,
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.supporting_evidence = evidence;
        self
    }

    pub fn with_response_time(mut self, secs: f64) -> Self {
        self.response_time = secs.max(0.0);
        self
    }

    /// Confidence guaranteed to lie within [0, 1], whatever was deserialized
    pub fn clamped_confidence(&self) -> f64 {
        clamp_confidence(&self.agent_id, self.confidence_score)
    }
}

fn clamp_confidence(agent_id: &str, confidence: f64) -> f64 {
    if confidence.is_nan() {
        warn!(agent_id, "NaN confidence treated as 0.0");
        return 0.0;
    }
    if !(0.0..=1.0).contains(&confidence) {
        warn!(agent_id, confidence, "Confidence outside [0, 1], clamping");
    }
    confidence.clamp(0.0, 1.0)
}

/// A unit of knowledge one agent can hand to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub topic: String,
    pub content: String,
    pub confidence: f64,
}

impl KnowledgeItem {
    pub fn new(topic: impl Into<String>, content: impl Into<String>, confidence: f64) -> Self {
        Self {
            topic: topic.into(),
            content: content.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// A reasoning participant
#[async_trait]
pub trait Agent: Send + Sync {
    /// Registry id of this agent
    fn id(&self) -> &str;

    /// Capabilities used for request routing
    fn capabilities(&self) -> BTreeSet<String>;

    /// Answer a consultation. May block on a remote call; the coordinator
    /// bounds it with a timeout.
    async fn consult(&self, request: &ConsultationRequest) -> Result<AgentResponse, ConsultError>;

    /// Knowledge this agent is willing to share with its peers
    async fn share_knowledge(&self) -> Vec<KnowledgeItem> {
        Vec::new()
    }

    /// Absorb knowledge from a peer, returning how many items were accepted
    async fn integrate_knowledge(&self, _source: &str, items: &[KnowledgeItem]) -> usize {
        items.len()
    }
}

/// Shared handle to a live agent
pub type SharedAgent = Arc<dyn Agent>;

/// Live agent handles keyed by registry id.
///
/// The registry holds identity and health; this holds the objects that
/// actually get consulted. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct AgentHandles {
    inner: Arc<RwLock<HashMap<String, SharedAgent>>>,
}

impl AgentHandles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind (or rebind) the handle for `agent.id()`
    pub fn bind(&self, agent: SharedAgent) -> CoordinationResult<()> {
        self.inner
            .write()
            .map_err(|_| CoordinationError::LockPoisoned)?
            .insert(agent.id().to_string(), agent);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<SharedAgent> {
        self.inner.read().ok().and_then(|h| h.get(id).cloned())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().map(|h| h.contains_key(id)).unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|h| h.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deterministic agent that replays a fixed answer.
///
/// Used by the CLI and by tests in place of a real reasoning backend.
#[derive(Debug)]
pub struct ScriptedAgent {
    id: String,
    capabilities: BTreeSet<String>,
    recommendation: String,
    confidence: f64,
    evidence: Vec<String>,
    delay: Option<Duration>,
    failure: Option<String>,
    knowledge: Vec<KnowledgeItem>,
    accept_knowledge: bool,
    received: Mutex<Vec<(String, KnowledgeItem)>>,
}

impl ScriptedAgent {
    pub fn new(id: impl Into<String>, recommendation: impl Into<String>, confidence: f64) -> Self {
        let id = id.into();
        Self {
            capabilities: BTreeSet::from([id.clone()]),
            id,
            recommendation: recommendation.into(),
            confidence,
            evidence: Vec::new(),
            delay: None,
            failure: None,
            knowledge: Vec::new(),
            accept_knowledge: true,
            received: Mutex::new(Vec::new()),
        }
    }

    /// Scripted stand-in for one of the four sages
    pub fn for_sage(sage: Sage, recommendation: impl Into<String>, confidence: f64) -> Self {
        Self::new(sage.id(), recommendation, confidence).with_capabilities(sage.capabilities())
    }

    pub fn with_capabilities(mut self, capabilities: BTreeSet<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every consultation with this message
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    pub fn with_knowledge(mut self, knowledge: Vec<KnowledgeItem>) -> Self {
        self.knowledge = knowledge;
        self
    }

    /// Reject every knowledge item offered by peers
    pub fn rejecting_knowledge(mut self) -> Self {
        self.accept_knowledge = false;
        self
    }

    /// Knowledge received from peers, tagged with the source id
    pub fn received_knowledge(&self) -> Vec<(String, KnowledgeItem)> {
        self.received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn capabilities(&self) -> BTreeSet<String> {
        self.capabilities.clone()
    }

    async fn consult(&self, request: &ConsultationRequest) -> Result<AgentResponse, ConsultError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(ref reason) = self.failure {
            return Err(ConsultError::Failed(reason.clone()));
        }

        let evidence = if self.evidence.is_empty() {
            vec![format!("{} reviewed {}", self.id, request.request_type)]
        } else {
            self.evidence.clone()
        };

        Ok(
            AgentResponse::success(&self.id, &self.recommendation, self.confidence)
                .with_evidence(evidence),
        )
    }

    async fn share_knowledge(&self) -> Vec<KnowledgeItem> {
        self.knowledge.clone()
    }

    async fn integrate_knowledge(&self, source: &str, items: &[KnowledgeItem]) -> usize {
        if !self.accept_knowledge {
            return 0;
        }
        match self.received.lock() {
            Ok(mut received) => {
                received.extend(items.iter().map(|i| (source.to_string(), i.clone())));
                items.len()
            }
            Err(_) => 0,
        }
    }
}
