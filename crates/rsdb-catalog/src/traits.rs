//! Catalog traits

use arrow_schema::DataType;
use rsdb_common::{ColumnId, IndexId, Result, TableId};

/// Column metadata
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub id: ColumnId,
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

impl ColumnInfo {
    pub fn new(id: i64, name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            id: ColumnId(id),
            name: name.into(),
            data_type,
            nullable: true,
        }
    }
}

/// Index metadata
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub id: IndexId,
    pub name: String,
    pub columns: Vec<ColumnId>,
    pub unique: bool,
}

/// Table metadata as seen by the statistics layer
#[derive(Debug, Clone, PartialEq)]
pub struct TableInfo {
    pub id: TableId,
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub indices: Vec<IndexInfo>,
}

impl TableInfo {
    pub fn new(id: i64, name: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        Self {
            id: TableId(id),
            name: name.into(),
            columns,
            indices: vec![],
        }
    }

    pub fn with_index(mut self, index: IndexInfo) -> Self {
        self.indices.push(index);
        self
    }

    pub fn column(&self, id: ColumnId) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.id == id)
    }
}

/// Schema catalog: resolves table ids to live table metadata.
pub trait Catalog: Send + Sync {
    /// Get table metadata, `None` if the table does not exist (e.g. dropped)
    fn table_by_id(&self, id: TableId) -> Option<TableInfo>;

    /// Register a table
    fn create_table(&self, table: TableInfo) -> Result<()>;

    /// Remove a table
    fn drop_table(&self, id: TableId) -> Result<()>;
}
