//! In-memory catalog implementation

use super::{Catalog, TableInfo};
use dashmap::DashMap;
use rsdb_common::{Result, RsdbError, TableId};

/// In-memory catalog implementation
pub struct InMemoryCatalog {
    tables: DashMap<TableId, TableInfo>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
        }
    }

    /// Replace a table's metadata in place, as a schema change would.
    pub fn alter_table(&self, table: TableInfo) -> Result<()> {
        match self.tables.get_mut(&table.id) {
            Some(mut entry) => {
                *entry = table;
                Ok(())
            }
            None => Err(RsdbError::NotFound(format!("table {}", table.id))),
        }
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog for InMemoryCatalog {
    fn table_by_id(&self, id: TableId) -> Option<TableInfo> {
        self.tables.get(&id).map(|t| t.value().clone())
    }

    fn create_table(&self, table: TableInfo) -> Result<()> {
        if self.tables.contains_key(&table.id) {
            return Err(RsdbError::Catalog(format!(
                "table {} ('{}') already exists",
                table.id, table.name
            )));
        }
        self.tables.insert(table.id, table);
        Ok(())
    }

    fn drop_table(&self, id: TableId) -> Result<()> {
        self.tables
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RsdbError::NotFound(format!("table {}", id)))
    }
}
