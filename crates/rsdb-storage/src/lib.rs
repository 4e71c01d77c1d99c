//! RSDB Storage - Persistent statistics store abstraction

pub mod engine;
pub mod meta;

pub use engine::{FailPoint, InMemoryStatsStorage, StatsStorage};
pub use meta::{ErrorRate, HistogramKind, QueryFeedback, StatsMetaRow, TableDelta};
