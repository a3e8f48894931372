//! # Cadence — scheduled autonomous agents
//!
//! Fires persisted agents on their cron schedules and records every run.
//!
//! Usage:
//!   cadence run                          # Run the scheduler until Ctrl-C
//!   cadence check                        # Run a single tick now
//!   cadence fire <ws> <agent> -s k=v     # Run one agent manually
//!   cadence webhook <token>              # Trigger the agent owning a webhook token
//!   cadence runs <ws> --agent <id>       # Show recent runs
//!   cadence validate "0 9 * * 1-5"       # Preview upcoming occurrences

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use cadence_agent::{ExecutorDispatch, OpenAiCompatibleProvider};
use cadence_core::traits::{AgentStore, NoTools, RunRecorder, SettingsSource, SystemClock};
use cadence_core::{FileSettings, Settings};
use cadence_scheduler::{FileStore, RunDb, Scheduler, SchedulerDeps, StandardCron};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "cadence",
    version,
    about = "⏰ Cadence — minute-aligned scheduler for autonomous LLM agents"
)]
struct Cli {
    /// Config file (default: ~/.cadence/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler until interrupted
    Run,
    /// Run one scheduler tick immediately
    Check,
    /// Run an agent now
    Fire {
        workspace: String,
        agent: String,
        /// Invocation value overrides (key=value)
        #[arg(short, long = "set", value_parser = parse_key_val)]
        values: Vec<(String, String)>,
    },
    /// Trigger an agent by its webhook token
    Webhook {
        token: String,
        #[arg(short, long = "set", value_parser = parse_key_val)]
        values: Vec<(String, String)>,
    },
    /// Assign a fresh webhook token to an agent
    Token { workspace: String, agent: String },
    /// Create a workspace
    Workspace { name: String },
    /// List recent runs of a workspace
    Runs {
        workspace: String,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Check a cron expression and print its next occurrences
    Validate {
        expression: String,
        #[arg(long, default_value = "5")]
        count: usize,
    },
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{s}'"))
}

/// Everything the subcommands need, wired once.
struct App {
    scheduler: Arc<Scheduler>,
    store: Arc<FileStore>,
    runs: Arc<RunDb>,
}

impl App {
    fn build(settings_source: Arc<dyn SettingsSource>) -> Result<Self> {
        let settings = settings_source
            .load_settings()
            .context("failed to load settings")?;
        let data_dir = settings.data_path();
        tracing::debug!("📂 Data directory: {}", data_dir.display());

        let store = Arc::new(FileStore::new(&data_dir));
        let runs = Arc::new(RunDb::open(&data_dir.join("runs.db"))?);
        let provider = Arc::new(OpenAiCompatibleProvider::from_settings(&settings));
        let runner = Arc::new(ExecutorDispatch::new(
            settings_source.clone(),
            provider,
            Arc::new(NoTools),
            runs.clone(),
        ));

        let scheduler = Scheduler::new(SchedulerDeps {
            settings: settings_source,
            workspaces: store.clone(),
            agents: store.clone(),
            runner,
            cron: Arc::new(StandardCron),
            clock: Arc::new(SystemClock),
        });

        Ok(Self {
            scheduler,
            store,
            runs,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "cadence=debug,cadence_scheduler=debug,cadence_agent=debug"
    } else {
        "cadence=info,cadence_scheduler=info,cadence_agent=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config_path = cli
        .config
        .as_deref()
        .map(|p| PathBuf::from(shellexpand::tilde(p).to_string()))
        .unwrap_or_else(Settings::default_path);
    let settings: Arc<dyn SettingsSource> = Arc::new(FileSettings::new(config_path));
    let build = || App::build(settings.clone());

    match cli.command {
        Command::Validate { expression, count } => validate(&expression, count)?,
        Command::Run => {
            let app = build()?;
            let delay = app.scheduler.start();
            tracing::info!(
                "⏰ Cadence scheduler started, first check in {}s",
                delay.as_secs()
            );
            tokio::signal::ctrl_c().await?;
            app.scheduler.stop();
            tracing::info!("👋 Shutting down");
        }
        Command::Check => {
            let app = build()?;
            let report = app.scheduler.check().await;
            app.scheduler.stop();
            println!(
                "✅ {} workspace(s), {} scheduled agent(s), {} dispatched, {} duplicate(s), {} failure(s)",
                report.workspaces,
                report.scheduled,
                report.dispatched,
                report.duplicates,
                report.failures
            );
        }
        Command::Fire {
            workspace,
            agent,
            values,
        } => {
            let app = build()?;
            let values: HashMap<_, _> = values.into_iter().collect();
            let run = app.scheduler.run_manual(&workspace, &agent, values).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        Command::Webhook { token, values } => {
            let app = build()?;
            let values: HashMap<_, _> = values.into_iter().collect();
            let run = app.scheduler.run_webhook(&token, values).await?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        Command::Token { workspace, agent } => {
            let app = build()?;
            let mut found = app
                .store
                .load_agents(&workspace)
                .await?
                .into_iter()
                .find(|a| a.id == agent)
                .with_context(|| format!("agent '{agent}' not found in workspace {workspace}"))?;
            let token = cadence_scheduler::generate_webhook_token(
                app.store.as_ref(),
                app.store.as_ref(),
                &workspace,
                &agent,
            )
            .await?;
            found.webhook_token = Some(token.clone());
            app.store.save_agent(&found).await?;
            println!("🔑 {token}");
        }
        Command::Workspace { name } => {
            let app = build()?;
            let header = app.store.create_workspace(&name).await?;
            println!("📁 {} {}", header.uuid, header.name);
        }
        Command::Runs {
            workspace,
            agent,
            limit,
        } => {
            let app = build()?;
            let runs = app
                .runs
                .list_agent_runs(&workspace, agent.as_deref(), limit)
                .await?;
            if runs.is_empty() {
                println!("No runs recorded.");
            }
            for run in runs {
                println!(
                    "{}  {:<8} {:<8} {}  {}",
                    run.created_at.format("%Y-%m-%d %H:%M:%S"),
                    run.trigger,
                    run.status,
                    run.agent_id,
                    run.error.as_deref().unwrap_or_default()
                );
            }
        }
    }

    Ok(())
}

fn validate(expression: &str, count: usize) -> Result<()> {
    let schedule = cadence_scheduler::cron::parse(expression)?;
    println!("✅ '{expression}' is valid. Next occurrences (UTC):");
    for at in schedule.upcoming(chrono::Utc).take(count) {
        println!("   {}", at.format("%Y-%m-%d %H:%M (%a)"));
    }
    Ok(())
}
