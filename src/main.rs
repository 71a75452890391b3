//! Rune Watchdog CLI
//!
//! Replays engine events against a cluster snapshot and prints where the
//! watchdog placed every container.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use rune_watchdog::config::{format_duration, parse_duration};
use rune_watchdog::logging::init_logging;
use rune_watchdog::swarm::{ClusterSnapshot, MemoryCluster};
use rune_watchdog::watchdog::backoff_schedule;
use rune_watchdog::{Watchdog, WatchdogOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Rune Watchdog - reschedules containers off failed Swarm nodes
#[derive(Parser)]
#[command(name = "rune-watchdog")]
#[command(author = "Evoker Industries")]
#[command(version)]
#[command(about = "Reschedules containers off failed Swarm nodes", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay engine events against a cluster snapshot
    Simulate {
        #[command(flatten)]
        options: OptionArgs,
        /// Cluster snapshot (JSON)
        #[arg(short, long)]
        state: PathBuf,
        /// Engine IDs to disconnect, in order
        #[arg(long)]
        disconnect: Vec<String>,
        /// Engine IDs to reconnect after the disconnects are handled
        #[arg(long)]
        reconnect: Vec<String>,
    },

    /// Print the reschedule backoff schedule
    Backoff {
        #[command(flatten)]
        options: OptionArgs,
        /// Number of retries to show
        #[arg(short, long, default_value = "10")]
        attempts: u32,
    },
}

/// Watchdog options: an optional file, overridden by individual flags
#[derive(Args)]
struct OptionArgs {
    /// Watchdog options file (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Reschedule attempts per failed node (0 = unbounded)
    #[arg(long)]
    retry: Option<u32>,
    /// Base retry interval (e.g. 30s, 500ms, 5m)
    #[arg(long, value_parser = parse_duration)]
    interval: Option<Duration>,
    /// Maximum retry interval
    #[arg(long, value_parser = parse_duration)]
    max_interval: Option<Duration>,
}

impl OptionArgs {
    fn load(&self) -> anyhow::Result<WatchdogOptions> {
        let mut options = match &self.config {
            Some(path) => WatchdogOptions::from_file(path)
                .with_context(|| format!("failed to load options from {}", path.display()))?,
            None => WatchdogOptions::default(),
        };

        if let Some(retry) = self.retry {
            options.reschedule_retry = retry;
        }
        if let Some(interval) = self.interval {
            options.reschedule_retry_interval = interval;
        }
        if let Some(max_interval) = self.max_interval {
            options.reschedule_retry_max_interval = max_interval;
        }

        options.validate()?;
        Ok(options)
    }
}

fn load_snapshot(path: &Path) -> anyhow::Result<ClusterSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid snapshot {}", path.display()))
}

async fn simulate(
    options: WatchdogOptions,
    snapshot: ClusterSnapshot,
    disconnect: &[String],
    reconnect: &[String],
) -> anyhow::Result<ClusterSnapshot> {
    let cluster = Arc::new(MemoryCluster::from_snapshot(snapshot));
    let watchdog = Watchdog::new(cluster.clone(), options)?;

    for id in disconnect {
        info!(node = %id, "Disconnecting engine");
        cluster.disconnect_engine(id)?;
    }
    for failure in watchdog.wait_idle().await {
        warn!(task = %failure.task, "Task failed: {}", failure.message);
    }

    for id in reconnect {
        info!(node = %id, "Reconnecting engine");
        cluster.reconnect_engine(id)?;
    }
    for failure in watchdog.wait_idle().await {
        warn!(task = %failure.task, "Task failed: {}", failure.message);
    }

    watchdog.stop().await;
    Ok(cluster.snapshot())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Commands::Simulate {
            options,
            state,
            disconnect,
            reconnect,
        } => {
            let options = options.load()?;
            let snapshot = load_snapshot(&state)?;
            let result = simulate(options, snapshot, &disconnect, &reconnect).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Backoff { options, attempts } => {
            let options = options.load()?;
            println!("{:<10} DELAY", "ATTEMPT");
            for (i, delay) in backoff_schedule(&options, attempts).into_iter().enumerate() {
                println!("{:<10} {}", i + 1, format_duration(delay));
            }
        }
    }

    Ok(())
}
