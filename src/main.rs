//! rostersync daemon: fetch upstream event trees on an interval, reconcile
//! each into the local store, and fan the results out downstream.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::Mutex;
use tracing::{error, info};

use rostersync::bridge::{DownstreamClient, SyncBridge};
use rostersync::config::Config;
use rostersync::upstream::UpstreamClient;
use rostersync::{Reconciler, Store, WriteScheduler};

#[derive(Parser)]
#[command(name = "rostersync")]
#[command(about = "Reconciles upstream event trees into a local store and a downstream REST system")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "rostersync.toml")]
    config: String,

    /// SQLite database path (overrides config file)
    #[arg(long, env = "ROSTERSYNC_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Run a single sync pass and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rostersync=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting rostersync");
    info!("Config file: {}", cli.config);

    let content = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("reading config file {}", cli.config))?;
    let mut config: Config = toml::from_str(&content).context("parsing config file")?;

    if let Some(db_path) = cli.db_path {
        config.store.db_path = db_path;
    }

    info!("Store: {}", config.store.db_path.display());
    info!("Upstream: {}", config.upstream.base_url);
    info!("Downstream: {}", config.downstream.base_url);

    let store = Arc::new(Mutex::new(
        Store::open(&config.store.db_path).context("opening store")?,
    ));
    let scheduler = WriteScheduler::new();

    let upstream = UpstreamClient::new(&config.upstream).context("building upstream client")?;
    let downstream =
        DownstreamClient::new(&config.downstream).context("building downstream client")?;

    let reconciler = Reconciler::new(store.clone(), scheduler.clone());
    let bridge = SyncBridge::new(downstream, store, scheduler);

    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(config.sync.interval_secs));

    loop {
        interval.tick().await;
        run_pass(&upstream, &reconciler, &bridge).await;
        if cli.once {
            break;
        }
    }

    Ok(())
}

/// One sync pass. Failures are logged and the pass moves on; the failed
/// tree is retried naturally on the next tick.
async fn run_pass(upstream: &UpstreamClient, reconciler: &Reconciler, bridge: &SyncBridge) {
    let trees = match upstream.fetch_event_trees().await {
        Ok(trees) => trees,
        Err(err) => {
            error!(error = %err, "upstream fetch failed, skipping pass");
            return;
        }
    };

    for (tree, result) in trees.iter().zip(reconciler.reconcile_many(&trees).await) {
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(
                    external_id = tree.external_id,
                    error = %err,
                    "reconciliation failed"
                );
                continue;
            }
        };

        if let Err(err) = bridge.sync_outcome(&outcome).await {
            error!(
                external_id = outcome.event.external_id,
                error = %err,
                "downstream sync failed"
            );
        }
    }
}
