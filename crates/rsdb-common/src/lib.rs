//! RSDB Common - Shared types, errors, and configuration

pub mod config;
pub mod error;
pub mod types;

pub use config::StatsConfig;
pub use error::{Result, RsdbError};
pub use types::{ColumnId, IndexId, TableId, Version};
