//! On-demand histogram loading
//!
//! Refresh only brings column counters into the cache. When the planner needs
//! the buckets of a column it registers the column here, and
//! [`StatsHandle::load_needed_histograms`] fetches them in the background.

use crate::handle::StatsHandle;
use parking_lot::Mutex;
use rsdb_catalog::CachedColumnStats;
use rsdb_common::{ColumnId, Result, TableId};
use std::collections::HashSet;
use std::sync::Arc;

/// A column whose histogram some query asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NeededColumn {
    pub table_id: TableId,
    pub column_id: ColumnId,
}

/// Outstanding histogram load requests, shared by all sessions
#[derive(Debug, Default)]
pub struct HistogramNeededColumns {
    cols: Mutex<HashSet<NeededColumn>>,
}

impl HistogramNeededColumns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the column was already registered.
    pub fn insert(&self, col: NeededColumn) -> bool {
        self.cols.lock().insert(col)
    }

    pub fn delete(&self, col: NeededColumn) {
        self.cols.lock().remove(&col);
    }

    pub fn delete_table(&self, table_id: TableId) {
        self.cols.lock().retain(|c| c.table_id != table_id);
    }

    /// Registered columns, ordered by table then column.
    pub fn all_cols(&self) -> Vec<NeededColumn> {
        let mut cols: Vec<NeededColumn> = self.cols.lock().iter().copied().collect();
        cols.sort();
        cols
    }

    pub fn len(&self) -> usize {
        self.cols.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.lock().is_empty()
    }

    pub fn clear(&self) {
        self.cols.lock().clear();
    }
}

impl StatsHandle {
    /// Ask for a column's histogram to be loaded and wake the loader.
    pub fn request_histogram(&self, table_id: TableId, column_id: ColumnId) {
        let col = NeededColumn {
            table_id,
            column_id,
        };
        if self.needed_columns.insert(col) {
            tracing::debug!("Histogram of {} {} requested", table_id, column_id);
        }
        self.signal_load();
    }

    /// Load every registered histogram whose table is cached.
    ///
    /// Entries are cleared once loaded, or once the cached column turns out to
    /// be loaded already or gone. Entries whose table is not cached, or whose
    /// table was replaced while loading, stay registered. The first storage
    /// error aborts the call; the failed entry and everything after it stay
    /// registered.
    ///
    /// Returns the number of histograms loaded.
    pub async fn load_needed_histograms(&self) -> Result<usize> {
        let mut loaded = 0;
        for col in self.needed_columns.all_cols() {
            let Some(table) = self.cache.get(col.table_id) else {
                continue;
            };
            let Some(column) = table.column(col.column_id) else {
                self.needed_columns.delete(col);
                continue;
            };
            if column.is_loaded() {
                self.needed_columns.delete(col);
                continue;
            }
            let version = table.version;

            let (mut histogram, cm_sketch) = self
                .storage
                .column_histogram(col.table_id, col.column_id)
                .await?;
            // Storage supplies buckets and sketch; the counters are the ones
            // already cached, which for pseudo tables are the estimates.
            histogram.ndv = column.ndv();
            histogram.null_count = column.null_count();
            histogram.last_update_version = column.last_update_version();
            histogram.tot_col_size = column.tot_col_size();
            let count = if histogram.is_empty() {
                column.count
            } else {
                histogram.total_row_count()
            };
            let column = Arc::new(CachedColumnStats {
                info: column.info.clone(),
                count,
                histogram,
                cm_sketch,
            });

            // Publish on a copy of whatever is cached now, unless a refresh
            // replaced the table with a different version meanwhile.
            let published = self.cache.update(col.table_id, |current| {
                if current.version != version {
                    return None;
                }
                let mut next = current.copy();
                next.columns.insert(col.column_id, column);
                Some(next)
            });
            if published {
                self.needed_columns.delete(col);
                loaded += 1;
            } else {
                // Stays registered and is loaded against the new version next time.
                tracing::debug!(
                    "{} changed while loading {}, histogram discarded",
                    col.table_id,
                    col.column_id
                );
            }
        }
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(table: i64, column: i64) -> NeededColumn {
        NeededColumn {
            table_id: TableId(table),
            column_id: ColumnId(column),
        }
    }

    #[test]
    fn test_registry_dedup_and_order() {
        let registry = HistogramNeededColumns::new();
        assert!(registry.insert(col(2, 1)));
        assert!(registry.insert(col(1, 3)));
        assert!(!registry.insert(col(2, 1)));

        assert_eq!(registry.all_cols(), vec![col(1, 3), col(2, 1)]);
        registry.delete(col(1, 3));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_delete_table() {
        let registry = HistogramNeededColumns::new();
        registry.insert(col(1, 1));
        registry.insert(col(1, 2));
        registry.insert(col(2, 1));

        registry.delete_table(TableId(1));
        assert_eq!(registry.all_cols(), vec![col(2, 1)]);
        registry.clear();
        assert!(registry.is_empty());
    }
}
