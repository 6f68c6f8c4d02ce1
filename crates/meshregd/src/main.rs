//! meshregd — the meshreg registry daemon.
//!
//! Single binary that assembles the registry:
//! - Write-ahead log (replayed on startup)
//! - Region-sharded gateway/agent store
//! - REST API
//!
//! # Usage
//!
//! ```text
//! meshregd --config /etc/meshreg/meshregd.toml --data-dir /var/lib/meshreg
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use meshreg_state::RankOrder;
use tracing::info;
use tracing_subscriber::EnvFilter;

use meshregd::Daemon;
use meshregd::config::{DaemonConfig, LoggingConfig};

const DEFAULT_LOG_FILTER: &str = "info,meshreg=debug,meshregd=debug";

#[derive(Parser)]
#[command(name = "meshregd", about = "meshreg gateway/agent registry daemon")]
struct Cli {
    /// TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on. Overrides `PORT` and the config file.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Directory holding the write-ahead log.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Gateway ranking direction (ascending or descending).
    #[arg(long)]
    rank_order: Option<RankOrder>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => DaemonConfig::from_file(path)?,
        None => DaemonConfig::default(),
    };
    config.apply_port_env(std::env::var("PORT").ok().as_deref())?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    if let Some(data_dir) = cli.data_dir {
        config.wal.data_dir = data_dir;
    }
    if let Some(rank_order) = cli.rank_order {
        config.registry.rank_order = rank_order;
    }
    config.validate()?;

    init_tracing(&config.logging);
    info!(config = ?cli.config, wal = %config.wal.path().display(), "meshreg daemon starting");

    let daemon = Daemon::open(&config)?;
    let listener = tokio::net::TcpListener::bind(config.server.listen).await?;

    // Graceful shutdown on Ctrl-C.
    daemon
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = logging.filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER);
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    });

    if logging.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
