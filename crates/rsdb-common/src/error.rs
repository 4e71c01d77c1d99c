//! RSDB Error types

use crate::types::TableId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RsdbError {
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// The table's schema changed while its statistics were being read.
    #[error("Schema of {0} changed during statistics load")]
    SchemaChanged(TableId),

    #[error("Queue full: {0}")]
    QueueFull(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl RsdbError {
    /// Errors caused by a concurrent DDL on the table being read.
    pub fn is_schema_change(&self) -> bool {
        matches!(self, RsdbError::SchemaChanged(_))
    }
}

pub type Result<T> = std::result::Result<T, RsdbError>;
