//! meshregd — startup and shutdown sequencing for the registry daemon.
//!
//! ```text
//! open WAL ──► empty Registry ──► replay WAL ──► serve HTTP ──► (signal) ──► close WAL
//! ```
//!
//! A WAL that cannot be opened or replayed is fatal: the daemon refuses
//! to serve rather than serve a registry it cannot make durable.

pub mod config;

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use meshreg_api::{RegistryService, build_router};
use meshreg_state::Registry;
use meshreg_wal::{ReplayStats, Wal, WalOptions};
use tracing::{error, info};

use crate::config::DaemonConfig;

/// A registry restored from its log, ready to serve.
pub struct Daemon {
    service: RegistryService,
    replay: ReplayStats,
}

impl Daemon {
    /// Open the WAL, build an empty registry and replay the log into it.
    pub fn open(config: &DaemonConfig) -> anyhow::Result<Self> {
        let path = config.wal.path();
        let wal = Wal::open_with(&path, WalOptions { sync: config.wal.sync })
            .with_context(|| format!("failed to open wal {}", path.display()))?;

        let registry = Registry::with_rank_order(config.registry.rank_order);
        let replay = match wal.replay_into(&registry) {
            Ok(stats) => stats,
            Err(e) => {
                error!(path = %path.display(), offset = ?e.offset(), error = %e, "wal replay failed; refusing to start");
                return Err(e).with_context(|| format!("failed to replay wal {}", path.display()));
            }
        };
        info!(
            records = replay.records,
            bytes = replay.bytes,
            regions = registry.regions().len(),
            rank_order = %registry.rank_order(),
            "registry restored"
        );

        let service = RegistryService::new(Arc::new(registry), Arc::new(wal))
            .with_default_top_k(config.registry.default_top_k)
            .with_default_region(config.registry.default_region.clone());
        Ok(Self { service, replay })
    }

    pub fn service(&self) -> &RegistryService {
        &self.service
    }

    pub fn replay_stats(&self) -> ReplayStats {
        self.replay
    }

    pub fn router(&self) -> Router {
        build_router(self.service.clone())
    }

    /// Serve on `listener` until `shutdown` resolves, then close the WAL.
    pub async fn serve<F>(self, listener: tokio::net::TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(%addr, "API server starting");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;

        self.close()
    }

    /// Flush and close the WAL.
    pub fn close(self) -> anyhow::Result<()> {
        self.service.wal().close().context("failed to close wal")?;
        info!("meshregd stopped");
        Ok(())
    }
}
