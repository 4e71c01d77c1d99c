//! Copy-on-write statistics snapshot

use parking_lot::{Mutex, RwLock};
use rsdb_catalog::CachedTableStats;
use rsdb_common::TableId;
use std::collections::HashMap;
use std::sync::Arc;

/// Immutable table id -> statistics map shared by all readers
pub type Snapshot = HashMap<TableId, Arc<CachedTableStats>>;

/// Holds the current [`Snapshot`].
///
/// The read/write lock only guards the pointer: readers clone the `Arc` and
/// release it, writers build the next map under `writer` and swap it in. A
/// reader sees either all of a `replace` or none of it, and never waits for a
/// map to be copied.
pub struct StatsCache {
    current: RwLock<Arc<Snapshot>>,
    writer: Mutex<()>,
}

impl StatsCache {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Snapshot::new())),
            writer: Mutex::new(()),
        }
    }

    /// The current snapshot. Use it when several lookups must agree.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn get(&self, table_id: TableId) -> Option<Arc<CachedTableStats>> {
        self.snapshot().get(&table_id).cloned()
    }

    /// Install a new snapshot: the current one with `tables` inserted or
    /// overwritten, then `removed` deleted.
    ///
    /// Writers are serialized, but the objects passed in may have been built
    /// from an older snapshot; the last replace wins for each table.
    pub fn replace(&self, tables: Vec<Arc<CachedTableStats>>, removed: &[TableId]) {
        if tables.is_empty() && removed.is_empty() {
            return;
        }
        let _writer = self.writer.lock();
        let mut next = Snapshot::clone(&self.snapshot());
        for table in tables {
            next.insert(table.table_id, table);
        }
        for id in removed {
            next.remove(id);
        }
        self.install(next);
    }

    /// Return the cached entry for `table_id`, installing `make()` first if
    /// there is none.
    pub fn get_or_insert_with(
        &self,
        table_id: TableId,
        make: impl FnOnce() -> CachedTableStats,
    ) -> Arc<CachedTableStats> {
        if let Some(table) = self.get(table_id) {
            return table;
        }
        let _writer = self.writer.lock();
        let current = self.snapshot();
        if let Some(table) = current.get(&table_id) {
            return table.clone();
        }
        let table = Arc::new(make());
        let mut next = Snapshot::clone(&current);
        next.insert(table_id, table.clone());
        self.install(next);
        table
    }

    /// Rewrite the current entry for `table_id`. `f` sees the entry as of the
    /// moment the write happens and returns the replacement, or `None` to
    /// leave it alone. Returns whether a new snapshot was installed.
    pub fn update(
        &self,
        table_id: TableId,
        f: impl FnOnce(&CachedTableStats) -> Option<CachedTableStats>,
    ) -> bool {
        let _writer = self.writer.lock();
        let current = self.snapshot();
        let Some(updated) = current.get(&table_id).and_then(|t| f(t)) else {
            return false;
        };
        let mut next = Snapshot::clone(&current);
        next.insert(table_id, Arc::new(updated));
        self.install(next);
        true
    }

    fn install(&self, next: Snapshot) {
        *self.current.write() = Arc::new(next);
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn clear(&self) {
        let _writer = self.writer.lock();
        self.install(Snapshot::new());
    }
}

impl Default for StatsCache {
    fn default() -> Self {
        Self::new()
    }
}
