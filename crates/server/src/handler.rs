//! Metrics handler: owns the current store set, reconfigures it atomically and renders it.

use std::io::{self, Write};
use std::sync::Arc;

use flate2::{write::GzEncoder, Compression};
use ksm_collectors::Builder;
use ksm_core::ShardAssignment;
use ksm_kubehub::WatchTasks;
use ksm_store::MetricsWriter;
use metrics::gauge;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How the shard assignment is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardingMode {
    /// Fixed assignment applied once at startup.
    Static(ShardAssignment),
    /// Assignments arrive through [`MetricsHandler::configure_sharding`] from an external driver.
    External,
}

/// One configuration: its stores, the tasks feeding them, and the token that stops those tasks.
#[derive(Default)]
struct Generation {
    cancel: Option<CancellationToken>,
    stores: Vec<Arc<dyn MetricsWriter>>,
    tasks: WatchTasks,
    shard: Option<ShardAssignment>,
}

/// A rendered scrape body.
#[derive(Debug)]
pub struct Scrape {
    pub body: Vec<u8>,
    pub gzip: bool,
}

pub struct MetricsHandler {
    builder: Builder,
    enable_gzip: bool,
    shutdown: CancellationToken,
    // Serving holds the read side for a whole render; reconfiguration takes the write side.
    current: RwLock<Generation>,
}

impl MetricsHandler {
    pub fn new(builder: Builder, enable_gzip: bool, shutdown: CancellationToken) -> Self {
        Self { builder, enable_gzip, shutdown, current: RwLock::new(Generation::default()) }
    }

    /// Replace the store set with a freshly built one under `shard`. Tasks of the
    /// previous configuration are cancelled and awaited before the new build starts.
    pub async fn configure_sharding(&self, shard: ShardAssignment) {
        let mut current = self.current.write().await;
        let previous = std::mem::take(&mut *current);
        if let Some(cancel) = previous.cancel {
            cancel.cancel();
        }
        previous.tasks.join_all().await;

        if shard.is_sharded() {
            info!(
                shard = shard.shard(),
                total_shards = shard.total(),
                "configuring sharding of this instance (zero-indexed shard)"
            );
        }
        let cancel = self.shutdown.child_token();
        let built = self.builder.build(shard, &cancel);
        *current = Generation { cancel: Some(cancel), stores: built.stores, tasks: built.tasks, shard: Some(shard) };
        gauge!("kruise_state_metrics_shard_ordinal").set(shard.shard() as f64);
        gauge!("kruise_state_metrics_total_shards").set(shard.total() as f64);
    }

    pub async fn current_shard(&self) -> Option<ShardAssignment> {
        self.current.read().await.shard
    }

    /// Apply `mode` and block until the shutdown token fires, then stop every watch task.
    pub async fn run(&self, mode: ShardingMode) {
        match mode {
            ShardingMode::Static(shard) => {
                info!("autosharding disabled");
                self.configure_sharding(shard).await;
            }
            ShardingMode::External => info!("autosharding enabled; waiting for shard assignment"),
        }
        self.shutdown.cancelled().await;
        self.stop().await;
    }

    /// Cancel and await every watch task of the current configuration.
    pub async fn stop(&self) {
        let mut current = self.current.write().await;
        if let Some(cancel) = current.cancel.take() {
            cancel.cancel();
        }
        std::mem::take(&mut current.tasks).join_all().await;
        info!("metrics handler stopped");
    }

    /// Render every store, in collector order, gzip-encoded when enabled and accepted.
    pub async fn scrape(&self, accept_encoding: Option<&str>) -> io::Result<Scrape> {
        let gzip = self.enable_gzip && accept_encoding.is_some_and(accepts_gzip);
        let current = self.current.read().await;
        if gzip {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            write_stores(&current.stores, &mut enc)?;
            Ok(Scrape { body: enc.finish()?, gzip })
        } else {
            let mut body = Vec::new();
            write_stores(&current.stores, &mut body)?;
            Ok(Scrape { body, gzip })
        }
    }
}

fn write_stores(stores: &[Arc<dyn MetricsWriter>], w: &mut dyn Write) -> io::Result<()> {
    for s in stores {
        s.write_all(w)?;
    }
    Ok(())
}

/// True when an Accept-Encoding value lists gzip (`gzip` or `gzip;q=...`).
pub fn accepts_gzip(header: &str) -> bool {
    header.split(',').map(str::trim).any(|part| part == "gzip" || part.starts_with("gzip;"))
}
