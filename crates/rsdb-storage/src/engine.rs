//! Statistics store trait and implementations

use crate::meta::{ErrorRate, HistogramKind, QueryFeedback, StatsMetaRow, TableDelta};
use async_trait::async_trait;
use parking_lot::Mutex;
use rsdb_catalog::{
    CachedColumnStats, CachedIndexStats, CachedTableStats, CmSketch, ColumnInfo, Histogram,
    TableInfo,
};
use rsdb_common::{ColumnId, Result, RsdbError, TableId, Version};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Persistent statistics store.
///
/// Reads are used by the refresh loop and the lazy histogram loader, writes by
/// the flush path. Every call is a single round trip to the store.
#[async_trait]
pub trait StatsStorage: Send + Sync {
    /// Meta rows with `version > since`, ordered by version ascending.
    async fn meta_rows_since(&self, since: Version) -> Result<Vec<StatsMetaRow>>;

    /// Rebuild a table's statistics from storage.
    ///
    /// Returns `Ok(None)` when the store holds no statistics for the table.
    /// Index histograms are loaded; column histograms carry only their counters
    /// and are loaded on demand through [`StatsStorage::column_histogram`].
    async fn table_stats(&self, table: &TableInfo) -> Result<Option<CachedTableStats>>;

    /// Load the histogram and sketch of one column.
    async fn column_histogram(
        &self,
        table_id: TableId,
        column_id: ColumnId,
    ) -> Result<(Histogram, Option<CmSketch>)>;

    /// Save one histogram/sketch pair produced by an analyze job and bump the
    /// table's meta row.
    async fn save_analyze_pair(
        &self,
        table_id: TableId,
        count: i64,
        kind: HistogramKind,
        hist_id: i64,
        histogram: &Histogram,
        cm_sketch: Option<&CmSketch>,
    ) -> Result<()>;

    /// Apply accumulated row/modify count deltas, one batch.
    async fn dump_deltas(&self, deltas: &[(TableId, TableDelta)]) -> Result<()>;

    /// Apply accumulated estimation error rates, one batch.
    async fn dump_error_rates(&self, rates: &[(TableId, ErrorRate)]) -> Result<()>;

    /// Store query feedback, one batch.
    async fn dump_feedback(&self, feedback: &[QueryFeedback]) -> Result<()>;

    /// Create the meta row of a new (or truncated) table.
    async fn insert_table_meta(&self, table_id: TableId) -> Result<()>;

    /// Record statistics placeholders for newly added columns.
    async fn insert_column_meta(
        &self,
        table_id: TableId,
        columns: &[ColumnInfo],
        count: i64,
    ) -> Result<()>;

    /// Delete histograms of dropped columns or indices.
    async fn delete_histograms(&self, table_id: TableId, kind: HistogramKind, ids: &[i64])
        -> Result<()>;
}

/// Injected failures for [`InMemoryStatsStorage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    MetaQuery,
    /// `table_stats` reports a concurrent schema change on the table
    TableStats(TableId),
    ColumnHistogram(TableId, ColumnId),
    SaveHistogram(TableId, i64),
    DumpDeltas,
    DumpErrorRates,
    DumpFeedback,
    /// Schema-change bookkeeping writes for the table fail
    SchemaChange(TableId),
}

#[derive(Debug, Clone)]
struct StoredHistogram {
    histogram: Histogram,
    cm_sketch: Option<CmSketch>,
}

#[derive(Default)]
struct State {
    last_version: u64,
    meta: HashMap<TableId, StatsMetaRow>,
    histograms: HashMap<(TableId, HistogramKind, i64), StoredHistogram>,
    error_rates: HashMap<TableId, ErrorRate>,
    feedback: Vec<QueryFeedback>,
    fail_points: HashSet<FailPoint>,
}

impl State {
    fn next_version(&mut self) -> Version {
        self.last_version += 1;
        Version(self.last_version)
    }

    fn check(&self, point: FailPoint) -> Result<()> {
        if !self.fail_points.contains(&point) {
            return Ok(());
        }
        match point {
            FailPoint::TableStats(table_id) => Err(RsdbError::SchemaChanged(table_id)),
            other => Err(RsdbError::Storage(format!("injected failure: {:?}", other))),
        }
    }

    fn bump_meta(&mut self, table_id: TableId) -> Version {
        let version = self.next_version();
        let row = self.meta.entry(table_id).or_insert(StatsMetaRow {
            version,
            table_id,
            modify_count: 0,
            count: 0,
        });
        row.version = version;
        version
    }
}

/// In-memory statistics store, for tests and embedded use
#[derive(Default)]
pub struct InMemoryStatsStorage {
    state: Mutex<State>,
}

impl InMemoryStatsStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a meta row at a fresh version.
    pub fn put_table_meta(&self, table_id: TableId, count: i64, modify_count: i64) -> Version {
        let mut state = self.state.lock();
        let version = state.next_version();
        state.meta.insert(
            table_id,
            StatsMetaRow {
                version,
                table_id,
                modify_count,
                count,
            },
        );
        version
    }

    /// Upsert a meta row at an explicit version, simulating a writer that
    /// commits after others with larger versions.
    pub fn put_table_meta_at(
        &self,
        version: Version,
        table_id: TableId,
        count: i64,
        modify_count: i64,
    ) {
        let mut state = self.state.lock();
        state.last_version = state.last_version.max(version.0);
        state.meta.insert(
            table_id,
            StatsMetaRow {
                version,
                table_id,
                modify_count,
                count,
            },
        );
    }

    pub fn remove_table_meta(&self, table_id: TableId) {
        self.state.lock().meta.remove(&table_id);
    }

    /// Store a histogram without touching the meta row.
    pub fn put_histogram(
        &self,
        table_id: TableId,
        kind: HistogramKind,
        hist_id: i64,
        histogram: Histogram,
        cm_sketch: Option<CmSketch>,
    ) {
        self.state.lock().histograms.insert(
            (table_id, kind, hist_id),
            StoredHistogram {
                histogram,
                cm_sketch,
            },
        );
    }

    pub fn meta_row(&self, table_id: TableId) -> Option<StatsMetaRow> {
        self.state.lock().meta.get(&table_id).copied()
    }

    pub fn histogram(&self, table_id: TableId, kind: HistogramKind, hist_id: i64) -> Option<Histogram> {
        self.state
            .lock()
            .histograms
            .get(&(table_id, kind, hist_id))
            .map(|h| h.histogram.clone())
    }

    pub fn error_rate(&self, table_id: TableId) -> Option<ErrorRate> {
        self.state.lock().error_rates.get(&table_id).copied()
    }

    pub fn feedback(&self) -> Vec<QueryFeedback> {
        self.state.lock().feedback.clone()
    }

    pub fn inject_failure(&self, point: FailPoint) {
        self.state.lock().fail_points.insert(point);
    }

    pub fn clear_failure(&self, point: FailPoint) {
        self.state.lock().fail_points.remove(&point);
    }
}

#[async_trait]
impl StatsStorage for InMemoryStatsStorage {
    async fn meta_rows_since(&self, since: Version) -> Result<Vec<StatsMetaRow>> {
        let state = self.state.lock();
        state.check(FailPoint::MetaQuery)?;
        let mut rows: Vec<StatsMetaRow> = state
            .meta
            .values()
            .filter(|row| row.version > since)
            .copied()
            .collect();
        rows.sort_by_key(|row| (row.version, row.table_id));
        Ok(rows)
    }

    async fn table_stats(&self, table: &TableInfo) -> Result<Option<CachedTableStats>> {
        let state = self.state.lock();
        state.check(FailPoint::TableStats(table.id))?;
        let Some(meta) = state.meta.get(&table.id) else {
            return Ok(None);
        };

        let mut stats = CachedTableStats::new(table.id);
        stats.version = meta.version;
        stats.count = meta.count;
        stats.modify_count = meta.modify_count;

        for info in &table.columns {
            let Some(stored) = state.histograms.get(&(table.id, HistogramKind::Column, info.id.0))
            else {
                continue;
            };
            let hist = &stored.histogram;
            let col = CachedColumnStats {
                info: info.clone(),
                histogram: Histogram::unloaded(
                    hist.ndv,
                    hist.null_count,
                    hist.last_update_version,
                    hist.tot_col_size,
                ),
                cm_sketch: None,
                count: hist.total_row_count(),
            };
            stats.columns.insert(info.id, Arc::new(col));
        }
        for info in &table.indices {
            let Some(stored) = state.histograms.get(&(table.id, HistogramKind::Index, info.id.0))
            else {
                continue;
            };
            let idx = CachedIndexStats {
                info: info.clone(),
                histogram: stored.histogram.clone(),
                cm_sketch: stored.cm_sketch.clone(),
            };
            stats.indices.insert(info.id, Arc::new(idx));
        }
        Ok(Some(stats))
    }

    async fn column_histogram(
        &self,
        table_id: TableId,
        column_id: ColumnId,
    ) -> Result<(Histogram, Option<CmSketch>)> {
        let state = self.state.lock();
        state.check(FailPoint::ColumnHistogram(table_id, column_id))?;
        Ok(state
            .histograms
            .get(&(table_id, HistogramKind::Column, column_id.0))
            .map(|s| (s.histogram.clone(), s.cm_sketch.clone()))
            .unwrap_or_default())
    }

    async fn save_analyze_pair(
        &self,
        table_id: TableId,
        count: i64,
        kind: HistogramKind,
        hist_id: i64,
        histogram: &Histogram,
        cm_sketch: Option<&CmSketch>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.check(FailPoint::SaveHistogram(table_id, hist_id))?;
        let version = state.bump_meta(table_id);
        if let Some(row) = state.meta.get_mut(&table_id) {
            row.count = count;
            row.modify_count = 0;
        }
        let mut histogram = histogram.clone();
        histogram.last_update_version = version;
        state.histograms.insert(
            (table_id, kind, hist_id),
            StoredHistogram {
                histogram,
                cm_sketch: cm_sketch.cloned(),
            },
        );
        tracing::debug!("Saved {:?} histogram {} of {} at {}", kind, hist_id, table_id, version);
        Ok(())
    }

    async fn dump_deltas(&self, deltas: &[(TableId, TableDelta)]) -> Result<()> {
        let mut state = self.state.lock();
        state.check(FailPoint::DumpDeltas)?;
        for (table_id, delta) in deltas {
            // Deltas for tables without a meta row have nothing to update.
            if !state.meta.contains_key(table_id) {
                continue;
            }
            let version = state.next_version();
            if let Some(row) = state.meta.get_mut(table_id) {
                row.version = version;
                row.count = (row.count + delta.row_delta).max(0);
                row.modify_count += delta.modify_delta;
            }
        }
        Ok(())
    }

    async fn dump_error_rates(&self, rates: &[(TableId, ErrorRate)]) -> Result<()> {
        let mut state = self.state.lock();
        state.check(FailPoint::DumpErrorRates)?;
        for (table_id, rate) in rates {
            state.error_rates.entry(*table_id).or_default().merge(*rate);
        }
        Ok(())
    }

    async fn dump_feedback(&self, feedback: &[QueryFeedback]) -> Result<()> {
        let mut state = self.state.lock();
        state.check(FailPoint::DumpFeedback)?;
        state.feedback.extend_from_slice(feedback);
        Ok(())
    }

    async fn insert_table_meta(&self, table_id: TableId) -> Result<()> {
        let mut state = self.state.lock();
        state.check(FailPoint::SchemaChange(table_id))?;
        if !state.meta.contains_key(&table_id) {
            state.bump_meta(table_id);
        }
        Ok(())
    }

    async fn insert_column_meta(
        &self,
        table_id: TableId,
        columns: &[ColumnInfo],
        count: i64,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.check(FailPoint::SchemaChange(table_id))?;
        let version = state.bump_meta(table_id);
        for col in columns {
            // A new column holds only NULLs for the existing rows.
            state.histograms.insert(
                (table_id, HistogramKind::Column, col.id.0),
                StoredHistogram {
                    histogram: Histogram::unloaded(0, count, version, 0),
                    cm_sketch: None,
                },
            );
        }
        Ok(())
    }

    async fn delete_histograms(
        &self,
        table_id: TableId,
        kind: HistogramKind,
        ids: &[i64],
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.check(FailPoint::SchemaChange(table_id))?;
        for id in ids {
            state.histograms.remove(&(table_id, kind, *id));
        }
        if state.meta.contains_key(&table_id) {
            state.bump_meta(table_id);
        }
        Ok(())
    }
}
