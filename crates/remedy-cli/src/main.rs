//! `remedy` — adaptive remediation policy engine CLI.

mod simulate;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use remedy_events::{EventBus, TOPIC_ISSUE_DETECTED, TOPIC_ISSUE_RESOLVED};
use remedy_orchestrator::Orchestrator;
use remedy_policy::{EngineConfig, Learner, SqlitePolicyStore, ValueStore};

use crate::simulate::{scenario_payloads, SimulatedExecutor};

#[derive(Debug, Parser)]
#[command(name = "remedy", about = "Adaptive remediation policy engine")]
struct Cli {
    /// Directory holding the engine config and policy database.
    #[arg(long, default_value = "data", env = "REMEDY_DATA_DIR")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Drive synthetic failure scenarios through the full engine.
    Simulate {
        /// Number of symptom events to publish.
        #[arg(long, default_value_t = 30)]
        runs: usize,
        /// Seed for the selector and the simulated executor.
        #[arg(long)]
        seed: Option<u64>,
        /// Override the configured exploration rate for this run.
        #[arg(long)]
        epsilon: Option<f64>,
    },
    /// Print the learned policy table.
    Policy {
        /// Emit the snapshot as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Apply a human-feedback correction to one (state, action) pair.
    Feedback {
        #[arg(long)]
        state: String,
        #[arg(long)]
        action: String,
        /// Feedback value substituted for the reward in the update step.
        #[arg(long)]
        value: f64,
    },
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn open_engine(data_dir: &Path) -> Result<(EngineConfig, Arc<ValueStore>)> {
    let config = EngineConfig::load_or_init(&data_dir.join("engine.json"))?;
    let backend = SqlitePolicyStore::new(data_dir.join("policy.db"))
        .context("failed to open policy database")?;
    let store = ValueStore::open(Box::new(backend)).context("failed to load policy table")?;
    Ok((config, Arc::new(store)))
}

async fn run_simulate(
    data_dir: &Path,
    runs: usize,
    seed: Option<u64>,
    epsilon: Option<f64>,
) -> Result<()> {
    let (mut config, store) = open_engine(data_dir)?;
    if let Some(epsilon) = epsilon {
        config.epsilon = epsilon;
        config.validate()?;
    }

    tracing::info!(runs, seed = ?seed, "starting simulation");
    let bus = Arc::new(EventBus::new());
    let executor = Arc::new(match seed {
        Some(seed) => SimulatedExecutor::with_seed(seed),
        None => SimulatedExecutor::from_entropy(),
    });
    let orchestrator = Arc::new(match seed {
        Some(seed) => Orchestrator::with_seed(&config, store, executor, bus.clone(), seed)?,
        None => Orchestrator::new(&config, store, executor, bus.clone())?,
    });
    orchestrator.attach(tokio::runtime::Handle::current());

    bus.subscribe(TOPIC_ISSUE_RESOLVED, |payload| {
        let action = payload
            .get("action_taken")
            .and_then(|value| value.as_str())
            .unwrap_or("?");
        let success = payload
            .pointer("/result/success")
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        let reward = payload
            .get("reward")
            .and_then(|value| value.as_f64())
            .unwrap_or(0.0);
        let service = payload
            .pointer("/issue/service")
            .and_then(|value| value.as_str())
            .unwrap_or("?");
        let verdict = if success { "resolved" } else { "failed" };
        println!("{service}: {action} -> {verdict} (reward {reward:+.3})");
    });

    let scenarios = scenario_payloads();
    for run in 0..runs {
        let payload = &scenarios[run % scenarios.len()];
        bus.publish(TOPIC_ISSUE_DETECTED, payload);
    }

    // Cycles run on spawned tasks; wait for the last one to land.
    loop {
        let handled = orchestrator.metrics().issues_handled;
        if handled as usize >= runs {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // Let the final resolution publish drain before summarizing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let metrics = orchestrator.metrics();
    println!();
    println!("issues handled:      {}", metrics.issues_handled);
    println!("successful:          {}", metrics.successful_resolutions);
    println!("success rate:        {:.1}%", metrics.success_rate * 100.0);
    println!("avg recent reward:   {:+.3}", metrics.average_recent_reward);
    println!("policy pairs:        {}", orchestrator.policy_snapshot().len());
    Ok(())
}

fn run_policy(data_dir: &Path, json: bool) -> Result<()> {
    let (_config, store) = open_engine(data_dir)?;
    let snapshot = store.snapshot();

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    if snapshot.is_empty() {
        println!("policy table is empty");
        return Ok(());
    }

    println!(
        "{:<32} {:<32} {:>10} {:>7}  {}",
        "state", "action", "estimate", "visits", "last_updated"
    );
    for record in snapshot {
        println!(
            "{:<32} {:<32} {:>10.4} {:>7}  {}",
            record.state,
            record.action,
            record.estimate,
            record.visit_count,
            record.last_updated.to_rfc3339()
        );
    }
    Ok(())
}

fn run_feedback(data_dir: &Path, state: &str, action: &str, value: f64) -> Result<()> {
    let (config, store) = open_engine(data_dir)?;
    let catalog = Arc::new(config.catalog());
    let learner = Learner::new(store, catalog, config.alpha, config.gamma)?;

    let update = learner
        .apply_feedback(state, action, value)
        .context("feedback update failed to persist")?;
    println!(
        "{}/{}: estimate {:+.4} -> {:+.4} (visits {})",
        update.state, update.action, update.previous_estimate, update.new_estimate, update.visit_count
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Simulate { runs, seed, epsilon } => {
            run_simulate(&cli.data_dir, runs, seed, epsilon).await
        }
        Command::Policy { json } => run_policy(&cli.data_dir, json),
        Command::Feedback {
            state,
            action,
            value,
        } => run_feedback(&cli.data_dir, &state, &action, value),
    }
}
