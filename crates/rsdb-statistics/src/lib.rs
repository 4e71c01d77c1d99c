//! RSDB Statistics - Statistics cache for cost-based optimization
//!
//! [`StatsHandle`] owns an immutable snapshot of per-table statistics that
//! planner threads read without waiting, and the queues and accumulators that
//! a single background [`StatsWorker`] folds into storage and back into the
//! snapshot.

pub mod cache;
pub mod collector;
pub mod ddl;
pub mod events;
pub mod handle;
pub mod loader;
pub mod queue;
pub mod worker;

pub use cache::{Snapshot, StatsCache};
pub use collector::SessionStatsCollector;
pub use events::{AnalyzeOutcome, AnalyzedHistogram, SchemaChangeEvent, SchemaChangeKind};
pub use handle::{FlushReport, StatsHandle};
pub use loader::{HistogramNeededColumns, NeededColumn};
pub use queue::EventQueue;
pub use worker::StatsWorker;
