//! Reaper - retention controller daemon
//!
//! ## Commands
//!
//! - `run`: load a manifest into a store and enforce TTL retention until interrupted
//! - `plan`: print the TTL decision for every execution in a manifest, changing nothing

mod manifest;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use reaper_core::obs::ReconcileSpan;
use reaper_core::{evaluate, ControllerConfig, RetentionManager, TtlDecision};
use reaper_state::{ChangeFeed, MemoryResourceStore, ResourceStore, SurrealResourceStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use crate::manifest::Manifest;

#[derive(Parser)]
#[command(name = "reaperd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Retention controller for managed resources and their runs", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a manifest and enforce retention until Ctrl-C
    Run {
        /// Manifest of managed resources and executions (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// SurrealDB URL (e.g. surrealkv://.reaper/db); in-memory store when omitted
        #[arg(long, env = "SURREALDB_URL")]
        db: Option<String>,

        /// Concurrent TTL reconciles (overrides REAPER_EXECUTION_MAX_CONCURRENT_RECONCILES)
        #[arg(long)]
        workers: Option<usize>,

        /// Budget per reconcile attempt, e.g. "30s" (overrides REAPER_CONTEXT_TIMEOUT)
        #[arg(long, value_parser = humantime::parse_duration)]
        reconcile_timeout: Option<Duration>,

        /// Delay before a failed attempt is retried, e.g. "5s" (overrides REAPER_RETRY_DELAY)
        #[arg(long, value_parser = humantime::parse_duration)]
        retry_delay: Option<Duration>,

        /// Skip enqueueing already-finished executions on start
        #[arg(long)]
        no_resync: bool,
    },

    /// Show what the TTL controller would do for each execution
    Plan {
        /// Manifest of managed resources and executions (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Evaluate as of this instant (RFC 3339); defaults to now
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    reaper_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            manifest,
            db,
            workers,
            reconcile_timeout,
            retry_delay,
            no_resync,
        } => {
            let mut config =
                ControllerConfig::from_env().context("Invalid REAPER_* configuration")?;
            if let Some(workers) = workers {
                config.execution_max_concurrent_reconciles = workers;
            }
            if let Some(timeout) = reconcile_timeout {
                config.reconcile_timeout = timeout;
            }
            if let Some(delay) = retry_delay {
                config.retry_delay = delay;
            }
            if no_resync {
                config.resync_on_start = false;
            }
            cmd_run(&manifest, db.as_deref(), config).await
        }
        Commands::Plan { manifest, now } => cmd_plan(&manifest, now),
    }
}

async fn cmd_run(manifest: &Path, db: Option<&str>, config: ControllerConfig) -> Result<()> {
    let manifest = Manifest::load(manifest)?;
    match db {
        Some(url) => {
            let store = SurrealResourceStore::connect(url)
                .await
                .with_context(|| format!("Failed to connect to {url}"))?;
            serve(Arc::new(store), &manifest, config).await
        }
        None => serve(Arc::new(MemoryResourceStore::new()), &manifest, config).await,
    }
}

async fn serve<S>(store: Arc<S>, manifest: &Manifest, config: ControllerConfig) -> Result<()>
where
    S: ResourceStore + ChangeFeed + 'static,
{
    let loaded = manifest.apply(store.as_ref()).await?;
    info!(resources = loaded, ?config, "manifest applied");

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown requested");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
        }
    });

    RetentionManager::new(store, config).run(cancel).await;
    Ok(())
}

fn cmd_plan(manifest: &Path, now: Option<DateTime<Utc>>) -> Result<()> {
    let manifest = Manifest::load(manifest)?;
    let now = now.unwrap_or_else(Utc::now);
    for line in plan_lines(&manifest, now) {
        println!("{line}");
    }
    Ok(())
}

fn plan_lines(manifest: &Manifest, now: DateTime<Utc>) -> Vec<String> {
    manifest
        .executions
        .iter()
        .map(|run| {
            let key = run.key();
            let _span = ReconcileSpan::enter("plan", &key);
            format!("{key}\t{}", describe(evaluate(run, now)))
        })
        .collect()
}

fn describe(decision: TtlDecision) -> String {
    match decision {
        TtlDecision::Expired { .. } => "expired".to_string(),
        TtlDecision::Pending { remaining, .. } => {
            format!("pending {}", humantime::format_duration(remaining))
        }
        TtlDecision::NoTtl => "no-ttl".to_string(),
        TtlDecision::NotTerminal => "not-terminal".to_string(),
    }
}
