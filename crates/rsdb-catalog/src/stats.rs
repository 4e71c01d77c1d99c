//! Cached table, column and index statistics used by the cost-based optimizer
//!
//! These objects are published into the statistics snapshot and shared by
//! every planner thread, so they are never mutated once published. Use
//! [`CachedTableStats::copy`] to get a private shallow clone before editing.

use crate::traits::{ColumnInfo, IndexInfo, TableInfo};
use rsdb_common::{ColumnId, IndexId, TableId, Version};
use std::collections::HashMap;
use std::sync::Arc;

/// Rows per distinct value assumed for pseudo statistics.
pub const PSEUDO_EQUAL_RATE: i64 = 1000;

/// Average value width assumed for variable-width columns without stats.
const PSEUDO_VALUE_WIDTH: i64 = 8;

/// One histogram bucket. Bounds use the string representation for universal
/// storage; `count` is cumulative over all buckets up to and including this one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bucket {
    pub lower: String,
    pub upper: String,
    pub count: i64,
    pub repeats: i64,
}

/// Equi-depth histogram for one column or index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    pub buckets: Vec<Bucket>,
    /// Number of distinct values (NDV)
    pub ndv: i64,
    pub null_count: i64,
    /// Storage version the histogram was last written at
    pub last_update_version: Version,
    /// Total stored size of the column in bytes
    pub tot_col_size: i64,
}

impl Histogram {
    /// A histogram with statistics counters but no buckets loaded.
    pub fn unloaded(ndv: i64, null_count: i64, last_update_version: Version, tot_col_size: i64) -> Self {
        Self {
            buckets: vec![],
            ndv,
            null_count,
            last_update_version,
            tot_col_size,
        }
    }

    /// Number of buckets. Zero means not loaded (or no data).
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Rows covered by the histogram, nulls included.
    pub fn total_row_count(&self) -> i64 {
        self.buckets.last().map(|b| b.count).unwrap_or(0) + self.null_count
    }
}

/// Count-min sketch. Construction and queries live with the analyze job;
/// the cache only stores and replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct CmSketch {
    pub depth: usize,
    pub width: usize,
    pub count: u64,
    pub table: Vec<Vec<u32>>,
}

impl CmSketch {
    pub fn new(depth: usize, width: usize) -> Self {
        Self {
            depth,
            width,
            count: 0,
            table: vec![vec![0; width]; depth],
        }
    }
}

/// Statistics for a single column
#[derive(Debug, Clone)]
pub struct CachedColumnStats {
    pub info: ColumnInfo,
    pub histogram: Histogram,
    pub cm_sketch: Option<CmSketch>,
    /// Rows covered by these statistics
    pub count: i64,
}

impl CachedColumnStats {
    pub fn id(&self) -> ColumnId {
        self.info.id
    }

    pub fn ndv(&self) -> i64 {
        self.histogram.ndv
    }

    pub fn null_count(&self) -> i64 {
        self.histogram.null_count
    }

    pub fn tot_col_size(&self) -> i64 {
        self.histogram.tot_col_size
    }

    pub fn last_update_version(&self) -> Version {
        self.histogram.last_update_version
    }

    /// Whether the histogram buckets are in memory.
    pub fn is_loaded(&self) -> bool {
        !self.histogram.is_empty()
    }
}

/// Statistics for a single index
#[derive(Debug, Clone)]
pub struct CachedIndexStats {
    pub info: IndexInfo,
    pub histogram: Histogram,
    pub cm_sketch: Option<CmSketch>,
}

/// Statistics for a table, as published in the statistics snapshot
#[derive(Debug, Clone)]
pub struct CachedTableStats {
    pub table_id: TableId,
    /// Storage version these statistics were read at
    pub version: Version,
    /// Row count
    pub count: i64,
    /// Rows changed since the last full analyze
    pub modify_count: i64,
    pub columns: HashMap<ColumnId, Arc<CachedColumnStats>>,
    pub indices: HashMap<IndexId, Arc<CachedIndexStats>>,
    /// Synthesized from metadata only
    pub pseudo: bool,
}

impl CachedTableStats {
    pub fn new(table_id: TableId) -> Self {
        Self {
            table_id,
            version: Version::ZERO,
            count: 0,
            modify_count: 0,
            columns: HashMap::new(),
            indices: HashMap::new(),
            pseudo: false,
        }
    }

    /// Shallow clone: the column and index maps are copied, the per-column
    /// objects are shared.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn column(&self, id: ColumnId) -> Option<&Arc<CachedColumnStats>> {
        self.columns.get(&id)
    }

    pub fn index(&self, id: IndexId) -> Option<&Arc<CachedIndexStats>> {
        self.indices.get(&id)
    }

    /// Placeholder statistics derived from table metadata alone.
    pub fn pseudo(table: &TableInfo, row_count: i64) -> Self {
        let ndv = row_count / PSEUDO_EQUAL_RATE;
        let columns = table
            .columns
            .iter()
            .map(|info| {
                let width = info
                    .data_type
                    .primitive_width()
                    .map(|w| w as i64)
                    .unwrap_or(PSEUDO_VALUE_WIDTH);
                let col = CachedColumnStats {
                    info: info.clone(),
                    histogram: Histogram::unloaded(ndv, 0, Version::ZERO, width * row_count),
                    cm_sketch: None,
                    count: row_count,
                };
                (info.id, Arc::new(col))
            })
            .collect();
        let indices = table
            .indices
            .iter()
            .map(|info| {
                let idx = CachedIndexStats {
                    info: info.clone(),
                    histogram: Histogram::unloaded(ndv, 0, Version::ZERO, 0),
                    cm_sketch: None,
                };
                (info.id, Arc::new(idx))
            })
            .collect();

        Self {
            table_id: table.id,
            version: Version::ZERO,
            count: row_count,
            modify_count: 0,
            columns,
            indices,
            pseudo: true,
        }
    }
}
