use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sage_coordination::{CouncilConfig, KnowledgeItem, Sage, ScriptedAgent};
use serde::Deserialize;

/// A scripted participant declared in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentDecl {
    pub id: String,
    pub recommendation: String,
    pub confidence: f64,
    /// Defaults to `[id]`.
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Fail every consultation with this message.
    #[serde(default)]
    pub fail: Option<String>,
    #[serde(default)]
    pub delay_ms: Option<u64>,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub knowledge: Vec<KnowledgeItem>,
}

fn default_active() -> bool {
    true
}

impl AgentDecl {
    pub fn build(&self) -> ScriptedAgent {
        let mut agent = ScriptedAgent::new(&self.id, &self.recommendation, self.confidence);
        if let Some(ref caps) = self.capabilities {
            agent = agent.with_capabilities(caps.iter().cloned().collect::<BTreeSet<_>>());
        }
        if let Some(ref reason) = self.fail {
            agent = agent.failing(reason);
        }
        if let Some(ms) = self.delay_ms {
            agent = agent.with_delay(Duration::from_millis(ms));
        }
        if !self.evidence.is_empty() {
            agent = agent.with_evidence(self.evidence.clone());
        }
        if !self.knowledge.is_empty() {
            agent = agent.with_knowledge(self.knowledge.clone());
        }
        agent
    }
}

/// Top-level CLI configuration file.
///
/// ```toml
/// [council]
/// consensus_threshold = 0.8
///
/// [[agents]]
/// id = "knowledge"
/// recommendation = "add an index"
/// confidence = 0.9
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub council: Option<CouncilConfig>,
    #[serde(default)]
    pub agents: Vec<AgentDecl>,
}

impl CliConfig {
    /// Load from a TOML file, or fall back to the environment and the four
    /// default sages.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                Self::parse(&raw).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Self::default(),
        };

        if config.agents.is_empty() {
            config.agents = default_sages();
        }
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Council settings: the file's `[council]` table, else `SAGES_*` env.
    pub fn council(&self) -> CouncilConfig {
        self.council.clone().unwrap_or_else(CouncilConfig::from_env)
    }
}

/// The four sages with a neutral scripted answer.
pub fn default_sages() -> Vec<AgentDecl> {
    Sage::all()
        .iter()
        .map(|sage| AgentDecl {
            id: sage.id().to_string(),
            recommendation: format!("consult {} records", sage.id()),
            confidence: 0.6,
            capabilities: Some(sage.capabilities().into_iter().collect()),
            active: true,
            fail: None,
            delay_ms: None,
            evidence: vec![sage.description().to_string()],
            knowledge: Vec::new(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sage_coordination::Agent;
    use tempfile::tempdir;

    #[test]
    fn test_parse_full_config() {
        let config = CliConfig::parse(
            r#"
            [council]
            consensus_threshold = 0.8
            auto_sync = false

            [[agents]]
            id = "knowledge"
            recommendation = "add an index"
            confidence = 0.9
            capabilities = ["knowledge", "rag"]

            [[agents]]
            id = "task"
            recommendation = "batch writes"
            confidence = 0.4
            active = false
            fail = "backend down"
            "#,
        )
        .unwrap();

        let council = config.council();
        assert_eq!(council.consensus_threshold, 0.8);
        assert!(!council.auto_sync);
        assert_eq!(council.queue_capacity, 100);

        assert_eq!(config.agents.len(), 2);
        assert!(config.agents[0].active);
        assert!(!config.agents[1].active);

        let agent = config.agents[0].build();
        assert!(agent.capabilities().contains("rag"));
    }

    #[test]
    fn test_load_without_agents_uses_sages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sages.toml");
        std::fs::write(&path, "[council]\nqueue_capacity = 10\n").unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.council().queue_capacity, 10);
        let ids: Vec<&str> = config.agents.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["knowledge", "task", "incident", "rag"]);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempdir().unwrap();
        assert!(CliConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}
