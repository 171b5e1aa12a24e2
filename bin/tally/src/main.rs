//! Tally - Substrate transfer ledger indexer.
//!
//! # Usage
//!
//! ```bash
//! # Start with default config
//! tally
//!
//! # Index Polkadot from block 1,000,000
//! NETWORK=polkadot START_BLOCK=1000000 WS_URL=wss://rpc.polkadot.io tally
//! ```

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};

use tally_core::error::IndexerError;
use tally_core::metrics::init_metrics;
use tally_core::ports::BlockSource;
use tally_core::services::{PipelineConfig, PipelineService};
use tally_storage::{Database, DatabaseConfig, PgLedgerRepository};
use tally_substrate::{SubstrateClient, SubstrateClientConfig};

/// Tally CLI - transfer ledger indexer.
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Tally - folds Balances.Transfer events into per-account balances")]
#[command(version)]
struct Cli {
    /// Substrate node WebSocket URL.
    #[arg(long, env = "WS_URL", default_value = "ws://127.0.0.1:9944")]
    ws_url: String,

    /// PostgreSQL database URL.
    #[arg(long, env = "DATABASE_URL", default_value = "postgres://localhost/tally")]
    database_url: String,

    /// Relay chain to index (kusama or polkadot); also selects the SS58 prefix.
    #[arg(long, env = "NETWORK", default_value = "kusama")]
    network: String,

    /// Qualified name of the tracked event.
    #[arg(long, env = "EVENT_NAME", default_value = "Balances.Transfer")]
    event_name: String,

    /// Maximum number of blocks per batch.
    #[arg(long, env = "BATCH_SIZE", default_value = "500")]
    batch_size: u32,

    /// Seconds to wait before polling again once caught up.
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "10")]
    poll_interval_secs: u64,

    /// First block to index when the database has no cursor.
    #[arg(long, env = "START_BLOCK", default_value = "0")]
    start_block: u64,

    /// Number of blocks fetched concurrently within a batch.
    #[arg(long, env = "FETCH_CONCURRENCY", default_value = "8")]
    fetch_concurrency: usize,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Run database migrations and exit.
    #[arg(long)]
    migrate_only: bool,

    /// Purge all ledger data from the database and exit.
    ///
    /// This deletes accounts, transfers, historical balances and resets the
    /// cursor. Schema/migrations are preserved.
    #[arg(long)]
    purge: bool,

    /// Skip confirmation prompt for destructive operations (like --purge).
    #[arg(long, short = 'y')]
    yes: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn pipeline_config(&self, chain_id: String) -> PipelineConfig {
        PipelineConfig {
            chain_id,
            network: self.network.clone(),
            event_name: self.event_name.clone(),
            batch_size: self.batch_size,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            start_block: self.start_block,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled = match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>() {
        Ok(metrics_addr) => {
            match PrometheusBuilder::new()
                .with_http_listener(metrics_addr)
                .install()
            {
                Ok(()) => {
                    init_metrics();
                    true
                }
                Err(e) => {
                    warn!("⚠️  Failed to start metrics exporter: {}. Continuing without metrics.", e);
                    false
                }
            }
        }
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            false
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting Tally");
    debug!(ws_url = %cli.ws_url, "Substrate endpoint");
    debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────────
    info!("🗄️  Connecting to database...");
    let db = Database::connect(&DatabaseConfig::for_pipeline(&cli.database_url))
        .await
        .context("Failed to connect to database")?;

    db.migrate().await.context("Failed to run migrations")?;
    info!("🗄️  Database ready (migrations applied)");

    if cli.migrate_only {
        info!("🛑 --migrate-only flag set, exiting");
        return Ok(());
    }

    if cli.purge {
        return handle_purge(&db, cli.yes, cli.start_block).await;
    }

    let db = Arc::new(db);
    let repository = Arc::new(PgLedgerRepository::new(db.clone()));

    // ─────────────────────────────────────────────────────────────────────────
    // 📡 SUBSTRATE CONNECTION
    // ─────────────────────────────────────────────────────────────────────────
    info!("📡 Connecting to Substrate node...");
    let substrate_config = SubstrateClientConfig {
        ws_url: cli.ws_url.clone(),
        fetch_concurrency: cli.fetch_concurrency,
    };

    let substrate_client = SubstrateClient::connect(substrate_config)
        .await
        .context("Failed to connect to Substrate node")?;
    let substrate_client = Arc::new(substrate_client);

    let genesis_hash = substrate_client.genesis_hash().await?;
    let finalized = substrate_client.finalized_head().await?;

    info!(
        genesis = %hex::encode(&genesis_hash.0[..8]),
        head = finalized.number,
        network = %cli.network,
        "🔗 Chain connected"
    );

    let pipeline = PipelineService::new(
        cli.pipeline_config(hex::encode(genesis_hash.0)),
        substrate_client,
        repository,
    )
    .context("Invalid pipeline configuration")?;

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ PIPELINE START
    // ─────────────────────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut pipeline_handle = tokio::spawn(
        async move { pipeline.run(shutdown_rx).await }.instrument(info_span!("pipeline")),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ Tally ready");
    if metrics_enabled {
        info!(
            "   📊 Metrics:  http://localhost:{}/metrics",
            cli.metrics_port
        );
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    let outcome = tokio::select! {
        _ = shutdown_signal() => None,
        joined = &mut pipeline_handle => Some(joined),
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────────
    let result = match outcome {
        None => {
            info!("🛑 Shutting down...");
            let _ = shutdown_tx.send(true);
            match tokio::time::timeout(Duration::from_secs(30), pipeline_handle).await {
                Ok(_) => debug!("Pipeline stopped"),
                Err(_) => warn!("⚠️  Pipeline shutdown timed out"),
            }
            Ok(())
        }
        Some(Ok(Ok(()) | Err(IndexerError::ShutdownRequested))) => Ok(()),
        Some(Ok(Err(e))) => {
            error!(error = %e, "❌ Pipeline stopped on a fatal error");
            Err(e).context("Pipeline failed")
        }
        Some(Err(join_error)) => {
            error!(error = %join_error, "❌ Pipeline task panicked");
            Err(anyhow!("Pipeline task failed: {}", join_error))
        }
    };

    db.close().await;
    info!("🛑 Shutdown complete");
    result
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Handle the --purge command.
async fn handle_purge(db: &Database, skip_confirmation: bool, start_block: u64) -> Result<()> {
    warn!("⚠️  PURGE MODE: This will delete ALL ledger data!");
    warn!("   - All accounts, transfers and historical balances");
    warn!("   - The indexer cursor will be reset");
    warn!("   - Schema and migrations will be preserved");

    if !skip_confirmation {
        print!("\n🔴 Are you sure you want to purge all data? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            info!("❌ Purge cancelled");
            return Ok(());
        }
    }

    info!("🗑️  Purging database...");
    let stats = db.purge().await.context("Failed to purge database")?;

    info!("✅ Database purged successfully");
    info!("   👛 Accounts removed: {}", stats.accounts_removed);
    info!("   💸 Transfers removed: {}", stats.transfers_removed);
    info!("   📜 History rows removed: {}", stats.history_removed);
    info!("   The pipeline will start from block {} on next run", start_block);

    Ok(())
}
