//! Background statistics worker

use crate::handle::StatsHandle;
use rsdb_catalog::Catalog;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Drives refresh, flush and histogram loading for one [`StatsHandle`].
///
/// All three run on the same task, one at a time, so a flush never races a
/// refresh on the snapshot.
pub struct StatsWorker {
    handle: Arc<StatsHandle>,
    catalog: Arc<dyn Catalog>,
}

impl StatsWorker {
    pub fn new(handle: Arc<StatsHandle>, catalog: Arc<dyn Catalog>) -> Self {
        Self { handle, catalog }
    }

    /// Spawn the worker loop on the current runtime. Send `true` on the
    /// returned channel (or drop it) to stop the loop.
    pub fn spawn(self) -> (JoinHandle<()>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(rx).await });
        (task, tx)
    }

    /// Run until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let config = self.handle.config();
        let mut refresh = tokio::time::interval(config.lease());
        let mut flush = tokio::time::interval(config.lease());
        let mut load = tokio::time::interval(config.load_check_interval());
        for ticker in [&mut refresh, &mut flush, &mut load] {
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        tracing::info!("Statistics worker started, lease {:?}", config.lease());
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = refresh.tick() => self.refresh_once().await,
                _ = flush.tick() => {
                    self.handle.flush().await;
                }
                _ = load.tick() => {
                    if self.handle.take_load_signal() {
                        self.load_once().await;
                    }
                }
            }
        }
        tracing::info!("Statistics worker stopped");
    }

    /// One refresh cycle. Errors are logged; the next tick retries.
    pub async fn refresh_once(&self) {
        if let Err(e) = self.handle.refresh(self.catalog.as_ref()).await {
            tracing::warn!("Refresh statistics failed: {}", e);
        }
        // Requests whose table was not cached yet may be servable now.
        if self.handle.pending_histogram_loads() > 0 {
            self.handle.signal_load();
        }
    }

    /// One lazy-load pass. Errors are logged; failed requests stay registered
    /// and are retried after the next refresh.
    pub async fn load_once(&self) {
        match self.handle.load_needed_histograms().await {
            Ok(0) => {}
            Ok(n) => tracing::debug!("Loaded {} needed histograms", n),
            Err(e) => tracing::warn!("Load needed histograms failed: {}", e),
        }
    }
}
