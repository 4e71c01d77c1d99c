//! Rows exchanged with the statistics store

use rsdb_common::{TableId, Version};

/// One row of the statistics meta table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsMetaRow {
    pub version: Version,
    pub table_id: TableId,
    pub modify_count: i64,
    pub count: i64,
}

/// Whether a histogram belongs to a column or an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HistogramKind {
    Column,
    Index,
}

impl HistogramKind {
    pub fn from_is_index(is_index: bool) -> Self {
        if is_index {
            HistogramKind::Index
        } else {
            HistogramKind::Column
        }
    }
}

/// Row count and modify count changes accumulated by query execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableDelta {
    /// Net change of the table's row count
    pub row_delta: i64,
    /// Rows inserted, updated or deleted
    pub modify_delta: i64,
}

impl TableDelta {
    pub fn merge(&mut self, other: TableDelta) {
        self.row_delta += other.row_delta;
        self.modify_delta += other.modify_delta;
    }
}

/// Accumulated estimation error for a table
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ErrorRate {
    /// Sum of per-query relative errors
    pub error_sum: f64,
    pub query_total: u64,
}

impl ErrorRate {
    pub fn merge(&mut self, other: ErrorRate) {
        self.error_sum += other.error_sum;
        self.query_total += other.query_total;
    }

    /// Mean relative error, 0 when nothing was recorded.
    pub fn ratio(&self) -> f64 {
        if self.query_total == 0 {
            0.0
        } else {
            self.error_sum / self.query_total as f64
        }
    }
}

/// Observed vs. estimated row count of one scan
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFeedback {
    pub table_id: TableId,
    /// Column or index the estimate was based on
    pub hist_id: Option<i64>,
    pub kind: HistogramKind,
    pub estimated: i64,
    pub actual: i64,
}

impl QueryFeedback {
    /// Relative error of the estimate against the actual count.
    pub fn error(&self) -> f64 {
        let actual = self.actual.max(1) as f64;
        (self.estimated - self.actual).abs() as f64 / actual
    }
}
