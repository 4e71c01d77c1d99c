//! Schema change handling

use crate::events::{SchemaChangeEvent, SchemaChangeKind};
use crate::handle::StatsHandle;
use rsdb_catalog::{CachedIndexStats, Histogram};
use rsdb_common::{Result, TableId};
use rsdb_storage::HistogramKind;
use std::sync::Arc;

impl StatsHandle {
    /// Apply one schema change to storage and to the cached entry.
    pub(crate) async fn handle_schema_change(&self, event: &SchemaChangeEvent) -> Result<()> {
        let table_id = event.table_id();
        match &event.kind {
            SchemaChangeKind::CreateTable => {
                self.storage.insert_table_meta(table_id).await?;
            }
            SchemaChangeKind::TruncateTable { old_table_id } => {
                self.storage.insert_table_meta(table_id).await?;
                self.forget_table(*old_table_id);
            }
            SchemaChangeKind::DropTable => {
                self.forget_table(table_id);
            }
            SchemaChangeKind::AddColumn { columns } => {
                let count = self.cache.get(table_id).map(|t| t.count).unwrap_or(0);
                self.storage
                    .insert_column_meta(table_id, columns, count)
                    .await?;
                // Rebuilt by the next refresh, which sees the bumped meta row.
                self.cache.replace(vec![], &[table_id]);
            }
            SchemaChangeKind::AddIndex { index } => {
                // Storage has nothing for the new index until it is analyzed,
                // so keep the table's statistics and add an empty entry.
                self.cache.update(table_id, |current| {
                    let mut next = current.copy();
                    next.indices.insert(
                        index.id,
                        Arc::new(CachedIndexStats {
                            info: index.clone(),
                            histogram: Histogram::default(),
                            cm_sketch: None,
                        }),
                    );
                    Some(next)
                });
            }
            SchemaChangeKind::DropColumn { column_ids } => {
                let ids: Vec<i64> = column_ids.iter().map(|id| id.0).collect();
                self.storage
                    .delete_histograms(table_id, HistogramKind::Column, &ids)
                    .await?;
                self.cache.update(table_id, |current| {
                    let mut next = current.copy();
                    for id in column_ids {
                        next.columns.remove(id);
                    }
                    Some(next)
                });
                for id in column_ids {
                    self.needed_columns.delete(crate::NeededColumn {
                        table_id,
                        column_id: *id,
                    });
                }
            }
            SchemaChangeKind::DropIndex { index_id } => {
                self.storage
                    .delete_histograms(table_id, HistogramKind::Index, &[index_id.0])
                    .await?;
                self.cache.update(table_id, |current| {
                    let mut next = current.copy();
                    next.indices.remove(index_id);
                    Some(next)
                });
            }
        }
        tracing::debug!("Applied schema change {:?} on {}", event.kind, table_id);
        Ok(())
    }

    /// Drop everything held in memory for a table that no longer exists.
    fn forget_table(&self, table_id: TableId) {
        self.cache.replace(vec![], &[table_id]);
        self.pending.lock().discard_table(table_id);
        self.needed_columns.delete_table(table_id);
    }
}
