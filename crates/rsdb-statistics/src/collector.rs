//! Per-session usage collectors
//!
//! Query execution records row-count changes, estimation error and feedback in
//! a session-local collector. Flush sweeps every collector into the handle's
//! pending state, so sessions only contend on their own lock.

use parking_lot::Mutex;
use rsdb_common::TableId;
use rsdb_storage::{ErrorRate, QueryFeedback, TableDelta};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Accumulated, not yet persisted usage state
#[derive(Debug, Default)]
pub(crate) struct PendingStats {
    pub deltas: HashMap<TableId, TableDelta>,
    pub rates: HashMap<TableId, ErrorRate>,
    pub feedback: Vec<QueryFeedback>,
}

impl PendingStats {
    /// Fold `other` in. Feedback beyond `max_feedback` records is dropped;
    /// returns how many were dropped.
    pub fn merge(&mut self, other: PendingStats, max_feedback: usize) -> usize {
        for (id, delta) in other.deltas {
            self.deltas.entry(id).or_default().merge(delta);
        }
        for (id, rate) in other.rates {
            self.rates.entry(id).or_default().merge(rate);
        }
        let room = max_feedback.saturating_sub(self.feedback.len());
        let dropped = other.feedback.len().saturating_sub(room);
        self.feedback.extend(other.feedback.into_iter().take(room));
        dropped
    }

    /// Forget everything recorded for a table that no longer exists.
    pub fn discard_table(&mut self, table_id: TableId) {
        self.deltas.remove(&table_id);
        self.rates.remove(&table_id);
        self.feedback.retain(|fb| fb.table_id != table_id);
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty() && self.rates.is_empty() && self.feedback.is_empty()
    }
}

/// Usage collector owned by one session
#[derive(Debug)]
pub struct SessionStatsCollector {
    pending: Mutex<PendingStats>,
    max_feedback: usize,
    deleted: AtomicBool,
}

impl SessionStatsCollector {
    pub(crate) fn new(max_feedback: usize) -> Self {
        Self {
            pending: Mutex::new(PendingStats::default()),
            max_feedback,
            deleted: AtomicBool::new(false),
        }
    }

    /// Record a DML effect on a table.
    pub fn update(&self, table_id: TableId, row_delta: i64, modify_delta: i64) {
        self.pending
            .lock()
            .deltas
            .entry(table_id)
            .or_default()
            .merge(TableDelta {
                row_delta,
                modify_delta,
            });
    }

    /// Record the relative estimation error of one query on a table.
    pub fn update_error_rate(&self, table_id: TableId, error: f64) {
        self.pending
            .lock()
            .rates
            .entry(table_id)
            .or_default()
            .merge(ErrorRate {
                error_sum: error,
                query_total: 1,
            });
    }

    /// Keep a feedback record and account its error against the table.
    /// Returns false when the local buffer is full and the record was dropped.
    pub fn store_feedback(&self, feedback: QueryFeedback) -> bool {
        let mut pending = self.pending.lock();
        pending
            .rates
            .entry(feedback.table_id)
            .or_default()
            .merge(ErrorRate {
                error_sum: feedback.error(),
                query_total: 1,
            });
        if pending.feedback.len() >= self.max_feedback {
            return false;
        }
        pending.feedback.push(feedback);
        true
    }

    /// Mark the session closed. The next flush takes its remaining state and
    /// unlinks it.
    pub fn delete(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn take(&self) -> PendingStats {
        std::mem::take(&mut *self.pending.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsdb_storage::HistogramKind;

    fn feedback(table: i64, estimated: i64, actual: i64) -> QueryFeedback {
        QueryFeedback {
            table_id: TableId(table),
            hist_id: Some(1),
            kind: HistogramKind::Column,
            estimated,
            actual,
        }
    }

    #[test]
    fn test_update_accumulates() {
        let collector = SessionStatsCollector::new(8);
        collector.update(TableId(1), 3, 3);
        collector.update(TableId(1), -1, 1);
        collector.update(TableId(2), 1, 1);

        let pending = collector.take();
        assert_eq!(pending.deltas[&TableId(1)].row_delta, 2);
        assert_eq!(pending.deltas[&TableId(1)].modify_delta, 4);
        assert_eq!(pending.deltas.len(), 2);
        assert!(collector.take().is_empty());
    }

    #[test]
    fn test_feedback_bounded_but_rate_recorded() {
        let collector = SessionStatsCollector::new(1);
        assert!(collector.store_feedback(feedback(1, 20, 10)));
        assert!(!collector.store_feedback(feedback(1, 10, 10)));

        let pending = collector.take();
        assert_eq!(pending.feedback.len(), 1);
        let rate = pending.rates[&TableId(1)];
        assert_eq!(rate.query_total, 2);
        assert!((rate.error_sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_caps_feedback() {
        let mut global = PendingStats::default();
        global.feedback.push(feedback(1, 1, 1));

        let mut local = PendingStats::default();
        local.feedback = vec![feedback(1, 1, 1), feedback(2, 1, 1), feedback(3, 1, 1)];
        local.deltas.insert(TableId(1), TableDelta { row_delta: 1, modify_delta: 1 });

        let dropped = global.merge(local, 2);
        assert_eq!(dropped, 2);
        assert_eq!(global.feedback.len(), 2);
        assert_eq!(global.deltas[&TableId(1)].modify_delta, 1);
    }

    #[test]
    fn test_discard_table() {
        let mut pending = PendingStats::default();
        pending.deltas.insert(TableId(1), TableDelta::default());
        pending.deltas.insert(TableId(2), TableDelta::default());
        pending.feedback.push(feedback(1, 1, 1));

        pending.discard_table(TableId(1));
        assert!(!pending.deltas.contains_key(&TableId(1)));
        assert!(pending.deltas.contains_key(&TableId(2)));
        assert!(pending.feedback.is_empty());
    }

    #[test]
    fn test_delete_marks_collector() {
        let collector = SessionStatsCollector::new(1);
        assert!(!collector.is_deleted());
        collector.delete();
        assert!(collector.is_deleted());
    }
}
