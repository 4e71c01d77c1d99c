//! RSDB Core Types

use serde::{Deserialize, Serialize};

/// Unique table identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(pub i64);

impl TableId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "table_{}", self.0)
    }
}

impl From<i64> for TableId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Column identifier, unique within a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ColumnId(pub i64);

impl ColumnId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ColumnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "column_{}", self.0)
    }
}

impl From<i64> for ColumnId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Index identifier, unique within a table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexId(pub i64);

impl IndexId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for IndexId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "index_{}", self.0)
    }
}

impl From<i64> for IndexId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Storage version of a statistics write. Versions only grow.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version(pub u64);

impl Version {
    pub const ZERO: Version = Version(0);

    pub fn new(v: u64) -> Self {
        Self(v)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
