mod config;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::CliConfig;
use sage_coordination::{
    AgentResponse, ConsultationRequest, CouncilContext, JsonlStore, SageCouncil,
};
use serde::Serialize;
use tracing::info;

/// Operator CLI for the sage council
#[derive(Parser, Debug)]
#[command(name = "sages", author, version, about, long_about = None)]
struct Args {
    /// Append session records and alerts to a JSONL store in this directory
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one consultation session and print the result
    Consult {
        /// e.g. pattern_analysis, performance_optimization, incident_response
        #[arg(long)]
        request_type: String,

        #[arg(long)]
        description: String,

        /// TOML file with [council] settings and [[agents]] entries
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Resolve a conflict from a JSON map of agent id to response
    Resolve {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the council health snapshot
    Health {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Consult {
            request_type,
            description,
            config,
        } => {
            let council = build_council(config.as_deref(), args.store.as_deref())?;
            let request = ConsultationRequest::new(request_type, description);
            let result = council.run_session(request).await;
            print_json(&result)?;
        }
        Command::Resolve { input, config } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let recommendations: BTreeMap<String, AgentResponse> =
                serde_json::from_str(&raw).context("parsing recommendations")?;

            let council = build_council(config.as_deref(), args.store.as_deref())?;
            let resolution = council.resolve_conflict(&recommendations);
            print_json(&resolution)?;
        }
        Command::Health { config } => {
            let council = build_council(config.as_deref(), args.store.as_deref())?;
            print_json(&council.get_health()?)?;
        }
    }

    Ok(())
}

fn build_council(config_path: Option<&Path>, store: Option<&Path>) -> Result<SageCouncil> {
    let config = CliConfig::load(config_path)?;

    let mut context = CouncilContext::new(config.council())?;
    if let Some(dir) = store {
        let store = JsonlStore::open(dir)
            .with_context(|| format!("opening store {}", dir.display()))?;
        info!(path = %dir.display(), "Using JSONL store");
        context = context.with_persistence(Arc::new(store));
    }

    let council = SageCouncil::with_context(context)?;
    for decl in &config.agents {
        council.add_agent(Arc::new(decl.build()))?;
        if !decl.active {
            council.set_agent_active(&decl.id, false)?;
        }
    }
    info!(agents = config.agents.len(), "Council ready");
    Ok(council)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
