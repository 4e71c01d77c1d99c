//! Events consumed by [`crate::StatsHandle::flush`]

use rsdb_catalog::{CmSketch, ColumnInfo, Histogram, IndexInfo, TableInfo};
use rsdb_common::{ColumnId, IndexId, TableId};

/// What a schema change did to a table
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaChangeKind {
    CreateTable,
    /// The table was recreated under a new id
    TruncateTable { old_table_id: TableId },
    DropTable,
    AddColumn { columns: Vec<ColumnInfo> },
    DropColumn { column_ids: Vec<ColumnId> },
    AddIndex { index: IndexInfo },
    DropIndex { index_id: IndexId },
}

/// Notification from the schema-change executor
#[derive(Debug, Clone)]
pub struct SchemaChangeEvent {
    pub kind: SchemaChangeKind,
    /// Table metadata after the change
    pub table: TableInfo,
    pub(crate) attempts: u32,
}

impl SchemaChangeEvent {
    pub fn new(kind: SchemaChangeKind, table: TableInfo) -> Self {
        Self {
            kind,
            table,
            attempts: 0,
        }
    }

    pub fn table_id(&self) -> TableId {
        self.table.id
    }
}

/// One histogram produced by an analyze job
#[derive(Debug, Clone)]
pub struct AnalyzedHistogram {
    /// Column or index id the histogram belongs to
    pub hist_id: i64,
    pub histogram: Histogram,
    pub cm_sketch: Option<CmSketch>,
}

/// Result of a finished analyze job
#[derive(Debug, Clone)]
pub struct AnalyzeOutcome {
    pub table_id: TableId,
    pub is_index: bool,
    /// Row count seen by the job
    pub count: i64,
    pub hists: Vec<AnalyzedHistogram>,
    pub(crate) attempts: u32,
}

impl AnalyzeOutcome {
    pub fn new(table_id: TableId, is_index: bool, count: i64, hists: Vec<AnalyzedHistogram>) -> Self {
        Self {
            table_id,
            is_index,
            count,
            hists,
            attempts: 0,
        }
    }
}
