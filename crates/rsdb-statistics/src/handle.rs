//! StatsHandle - owner of the statistics snapshot and its update paths

use crate::cache::{Snapshot, StatsCache};
use crate::collector::{PendingStats, SessionStatsCollector};
use crate::events::{AnalyzeOutcome, SchemaChangeEvent};
use crate::loader::HistogramNeededColumns;
use crate::queue::EventQueue;
use parking_lot::Mutex;
use rsdb_catalog::{CachedTableStats, Catalog, TableInfo};
use rsdb_common::{Result, RsdbError, StatsConfig, TableId, Version};
use rsdb_storage::{HistogramKind, QueryFeedback, StatsStorage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What one [`StatsHandle::flush`] did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub schema_changes_applied: usize,
    pub schema_changes_failed: usize,
    /// Tables whose deltas were persisted
    pub deltas_persisted: usize,
    pub deltas_dropped: usize,
    pub error_rates_persisted: usize,
    pub analyze_pairs_saved: usize,
    pub analyze_pairs_failed: usize,
    pub feedback_persisted: usize,
    pub feedback_dropped: usize,
}

/// Statistics handle shared by the planner sessions and the background worker.
///
/// Readers go through [`StatsHandle::get_table_stats`]. One driver (see
/// [`crate::StatsWorker`]) calls [`StatsHandle::refresh`],
/// [`StatsHandle::flush`] and [`StatsHandle::load_needed_histograms`]; the
/// handle does not serialize those calls itself.
pub struct StatsHandle {
    pub(crate) config: StatsConfig,
    pub(crate) storage: Arc<dyn StatsStorage>,
    pub(crate) cache: StatsCache,
    /// Latest meta version applied to the cache
    last_version: AtomicU64,
    /// `last_version` as of the start of the previous refresh. Refresh reads
    /// from here so rows committed late, within one lease, are not missed.
    prev_last_version: AtomicU64,
    ddl_events: EventQueue<SchemaChangeEvent>,
    analyze_results: EventQueue<AnalyzeOutcome>,
    load_signals: EventQueue<()>,
    pub(crate) needed_columns: HistogramNeededColumns,
    collectors: Mutex<Vec<Arc<SessionStatsCollector>>>,
    pub(crate) pending: Mutex<PendingStats>,
}

impl StatsHandle {
    pub fn new(config: StatsConfig, storage: Arc<dyn StatsStorage>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            ddl_events: EventQueue::new("schema change", config.ddl_queue_capacity),
            analyze_results: EventQueue::new("analyze result", config.analyze_queue_capacity),
            load_signals: EventQueue::new("histogram load", config.load_queue_capacity),
            config,
            storage,
            cache: StatsCache::new(),
            last_version: AtomicU64::new(0),
            prev_last_version: AtomicU64::new(0),
            needed_columns: HistogramNeededColumns::new(),
            collectors: Mutex::new(Vec::new()),
            pending: Mutex::new(PendingStats::default()),
        })
    }

    pub fn config(&self) -> &StatsConfig {
        &self.config
    }

    pub fn last_version(&self) -> Version {
        Version(self.last_version.load(Ordering::Acquire))
    }

    pub fn prev_last_version(&self) -> Version {
        Version(self.prev_last_version.load(Ordering::Acquire))
    }

    /// Reset every cached, queued and accumulated piece of state. Test only.
    pub fn clear(&self) {
        self.cache.clear();
        self.last_version.store(0, Ordering::Release);
        self.prev_last_version.store(0, Ordering::Release);
        self.ddl_events.clear();
        self.analyze_results.clear();
        self.load_signals.clear();
        self.needed_columns.clear();
        self.collectors.lock().clear();
        *self.pending.lock() = PendingStats::default();
    }

    // ---------------------------------------------------------------------
    // Read path
    // ---------------------------------------------------------------------

    /// Raw cache lookup.
    pub fn get(&self, table_id: TableId) -> Option<Arc<CachedTableStats>> {
        self.cache.get(table_id)
    }

    /// The whole current snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.cache.snapshot()
    }

    /// Statistics for a table. A table that was never analyzed gets pseudo
    /// statistics, cached so later lookups return the same object.
    pub fn get_table_stats(&self, table: &TableInfo) -> Arc<CachedTableStats> {
        self.cache.get_or_insert_with(table.id, || {
            tracing::debug!("No statistics for {} ('{}'), using pseudo", table.id, table.name);
            CachedTableStats::pseudo(table, self.config.pseudo_row_count)
        })
    }

    /// [`StatsHandle::get_table_stats`] by id, resolving the table through
    /// the catalog first.
    pub fn table_stats_by_id(
        &self,
        catalog: &dyn Catalog,
        table_id: TableId,
    ) -> Result<Arc<CachedTableStats>> {
        if let Some(table) = self.cache.get(table_id) {
            return Ok(table);
        }
        let table = catalog
            .table_by_id(table_id)
            .ok_or_else(|| RsdbError::NotFound(format!("table {}", table_id)))?;
        Ok(self.get_table_stats(&table))
    }

    // ---------------------------------------------------------------------
    // Refresh
    // ---------------------------------------------------------------------

    /// Apply every statistics meta row written since the previous refresh.
    ///
    /// Rows are read from `prev_last_version`, not `last_version`: a writer
    /// with a smaller version may commit after one with a larger version, and
    /// re-reading the last lease window picks those up. Tables missing from the
    /// catalog or from storage are removed from the cache; tables whose
    /// statistics can not be read this time are left as they are.
    pub async fn refresh(&self, catalog: &dyn Catalog) -> Result<()> {
        let rows = self.storage.meta_rows_since(self.prev_last_version()).await?;
        self.prev_last_version
            .store(self.last_version.load(Ordering::Acquire), Ordering::Release);
        if rows.is_empty() {
            return Ok(());
        }

        let old = self.cache.snapshot();
        // None marks a removal. Later rows for a table overwrite earlier ones.
        let mut changes: HashMap<TableId, Option<Arc<CachedTableStats>>> = HashMap::new();
        for row in &rows {
            self.last_version.fetch_max(row.version.0, Ordering::AcqRel);

            let Some(table) = catalog.table_by_id(row.table_id) else {
                tracing::debug!(
                    "Unknown {} in stats meta, maybe it has been dropped",
                    row.table_id
                );
                changes.insert(row.table_id, None);
                continue;
            };
            // Rows from the re-read lease window are usually already applied.
            if let Some(cached) = old.get(&row.table_id) {
                if !cached.pseudo && cached.version == row.version {
                    continue;
                }
            }
            let stats = match self.storage.table_stats(&table).await {
                Ok(stats) => stats,
                Err(e) => {
                    // Most likely a schema change on this table; the next
                    // meta row for it will bring the update.
                    tracing::debug!(
                        "Failed to read statistics of {} ('{}'): {}",
                        table.id,
                        table.name,
                        e
                    );
                    continue;
                }
            };
            let Some(mut stats) = stats else {
                changes.insert(row.table_id, None);
                continue;
            };
            stats.version = row.version;
            stats.count = row.count;
            stats.modify_count = row.modify_count;
            keep_loaded_columns(&mut stats, old.get(&row.table_id));
            changes.insert(row.table_id, Some(Arc::new(stats)));
        }

        let mut tables = Vec::new();
        let mut removed = Vec::new();
        for (table_id, change) in changes {
            match change {
                Some(stats) => tables.push(stats),
                // Ids re-read from the lease window may be gone already.
                None if old.contains_key(&table_id) => removed.push(table_id),
                None => {}
            }
        }
        tracing::debug!(
            "Refreshed statistics: {} meta rows, {} tables updated, {} removed, last version {}",
            rows.len(),
            tables.len(),
            removed.len(),
            self.last_version()
        );
        self.cache.replace(tables, &removed);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Inbound events
    // ---------------------------------------------------------------------

    /// Queue a schema change for the next flush. Fails with
    /// [`RsdbError::QueueFull`] instead of blocking.
    pub fn send_schema_change(&self, event: SchemaChangeEvent) -> Result<()> {
        self.ddl_events.push(event)
    }

    /// Queue a finished analyze job for the next flush. Fails with
    /// [`RsdbError::QueueFull`] instead of blocking.
    pub fn send_analyze_outcome(&self, outcome: AnalyzeOutcome) -> Result<()> {
        self.analyze_results.push(outcome)
    }

    pub fn pending_schema_changes(&self) -> usize {
        self.ddl_events.len()
    }

    pub fn pending_analyze_outcomes(&self) -> usize {
        self.analyze_results.len()
    }

    /// Wake the histogram loader. A full queue means a wake-up is already
    /// pending, so the signal is coalesced.
    pub(crate) fn signal_load(&self) {
        let _ = self.load_signals.try_push(());
    }

    /// Consume pending load wake-ups, returning whether there were any.
    pub fn take_load_signal(&self) -> bool {
        !self.load_signals.drain().is_empty()
    }

    pub fn pending_histogram_loads(&self) -> usize {
        self.needed_columns.len()
    }

    /// Register a collector for a new session.
    pub fn new_session_collector(&self) -> Arc<SessionStatsCollector> {
        let collector = Arc::new(SessionStatsCollector::new(self.config.max_feedback_count));
        self.collectors.lock().push(collector.clone());
        collector
    }

    // ---------------------------------------------------------------------
    // Flush
    // ---------------------------------------------------------------------

    /// Push everything accumulated since the last flush to storage.
    ///
    /// Failures are logged and isolated: a failed schema change or analyze
    /// pair is queued again (up to `max_flush_retries` flushes), failed
    /// delta and feedback batches stay in memory for the next flush.
    pub async fn flush(&self) -> FlushReport {
        let mut report = FlushReport::default();
        self.flush_schema_changes(&mut report).await;
        self.sweep_collectors(&mut report);
        self.flush_deltas(&mut report).await;
        self.flush_analyze_results(&mut report).await;
        self.flush_feedback(&mut report).await;
        tracing::debug!("Flushed statistics: {:?}", report);
        report
    }

    async fn flush_schema_changes(&self, report: &mut FlushReport) {
        for mut event in self.ddl_events.drain() {
            match self.handle_schema_change(&event).await {
                Ok(()) => report.schema_changes_applied += 1,
                Err(e) => {
                    tracing::warn!(
                        "Handle schema change {:?} on {} failed: {}",
                        event.kind,
                        event.table_id(),
                        e
                    );
                    report.schema_changes_failed += 1;
                    event.attempts += 1;
                    let attempts = event.attempts;
                    self.requeue(&self.ddl_events, event, attempts);
                }
            }
        }
    }

    /// Move every session's local state into the shared pending state and
    /// unlink sessions that were closed.
    fn sweep_collectors(&self, report: &mut FlushReport) {
        let mut collectors = self.collectors.lock();
        let mut pending = self.pending.lock();
        for collector in collectors.iter() {
            let dropped = pending.merge(collector.take(), self.config.max_feedback_count);
            report.feedback_dropped += dropped;
        }
        collectors.retain(|c| !c.is_deleted());
    }

    async fn flush_deltas(&self, report: &mut FlushReport) {
        let deltas = std::mem::take(&mut self.pending.lock().deltas);
        if !deltas.is_empty() {
            let batch: Vec<_> = deltas.iter().map(|(id, d)| (*id, *d)).collect();
            match self.storage.dump_deltas(&batch).await {
                Ok(()) => report.deltas_persisted += batch.len(),
                Err(e) => {
                    tracing::warn!("Dump stats delta of {} tables failed: {}", batch.len(), e);
                    let mut pending = self.pending.lock();
                    for (id, delta) in deltas {
                        pending.deltas.entry(id).or_default().merge(delta);
                    }
                    if pending.deltas.len() > self.config.max_pending_delta_tables {
                        tracing::warn!(
                            "Dropping stats delta of {} tables, over the limit of {}",
                            pending.deltas.len(),
                            self.config.max_pending_delta_tables
                        );
                        report.deltas_dropped += pending.deltas.len();
                        pending.deltas.clear();
                    }
                }
            }
        }

        let rates = std::mem::take(&mut self.pending.lock().rates);
        if !rates.is_empty() {
            let batch: Vec<_> = rates.iter().map(|(id, r)| (*id, *r)).collect();
            match self.storage.dump_error_rates(&batch).await {
                Ok(()) => report.error_rates_persisted += batch.len(),
                Err(e) => {
                    tracing::warn!("Dump error rate of {} tables failed: {}", batch.len(), e);
                    let mut pending = self.pending.lock();
                    for (id, rate) in rates {
                        pending.rates.entry(id).or_default().merge(rate);
                    }
                    if pending.rates.len() > self.config.max_pending_delta_tables {
                        pending.rates.clear();
                    }
                }
            }
        }
    }

    async fn flush_analyze_results(&self, report: &mut FlushReport) {
        for mut outcome in self.analyze_results.drain() {
            let kind = HistogramKind::from_is_index(outcome.is_index);
            let mut failed = Vec::new();
            for hist in std::mem::take(&mut outcome.hists) {
                let saved = self
                    .storage
                    .save_analyze_pair(
                        outcome.table_id,
                        outcome.count,
                        kind,
                        hist.hist_id,
                        &hist.histogram,
                        hist.cm_sketch.as_ref(),
                    )
                    .await;
                match saved {
                    Ok(()) => report.analyze_pairs_saved += 1,
                    Err(e) => {
                        tracing::warn!(
                            "Save histogram {} of {} to storage failed: {}",
                            hist.hist_id,
                            outcome.table_id,
                            e
                        );
                        report.analyze_pairs_failed += 1;
                        failed.push(hist);
                    }
                }
            }
            if !failed.is_empty() {
                outcome.hists = failed;
                outcome.attempts += 1;
                let attempts = outcome.attempts;
                self.requeue(&self.analyze_results, outcome, attempts);
            }
        }
    }

    async fn flush_feedback(&self, report: &mut FlushReport) {
        let feedback = std::mem::take(&mut self.pending.lock().feedback);
        if feedback.is_empty() {
            return;
        }
        match self.storage.dump_feedback(&feedback).await {
            Ok(()) => report.feedback_persisted += feedback.len(),
            Err(e) => {
                tracing::warn!("Dump stats feedback of {} records failed: {}", feedback.len(), e);
                let mut pending = self.pending.lock();
                let mut kept = feedback;
                kept.append(&mut pending.feedback);
                report.feedback_dropped +=
                    kept.len().saturating_sub(self.config.max_feedback_count);
                kept.truncate(self.config.max_feedback_count);
                pending.feedback = kept;
            }
        }
    }

    fn requeue<T>(&self, queue: &EventQueue<T>, item: T, attempts: u32) {
        if attempts >= self.config.max_flush_retries {
            tracing::warn!(
                "Giving up on {} event after {} attempts",
                queue.name(),
                attempts
            );
            return;
        }
        if queue.try_push(item).is_err() {
            tracing::warn!("{} queue is full, dropping failed event", queue.name());
        }
    }

    /// Take the buffered query feedback, including what sessions have not
    /// handed over yet. Test only.
    pub fn drain_query_feedback(&self) -> Vec<QueryFeedback> {
        let mut report = FlushReport::default();
        self.sweep_collectors(&mut report);
        std::mem::take(&mut self.pending.lock().feedback)
    }
}

/// Reuse histograms already loaded into the old cache entry when storage still
/// has the same version of the column.
fn keep_loaded_columns(stats: &mut CachedTableStats, old: Option<&Arc<CachedTableStats>>) {
    let Some(old) = old else {
        return;
    };
    for (id, col) in stats.columns.iter_mut() {
        if col.is_loaded() {
            continue;
        }
        if let Some(old_col) = old.columns.get(id) {
            if old_col.is_loaded() && old_col.last_update_version() == col.last_update_version() {
                *col = old_col.clone();
            }
        }
    }
}
