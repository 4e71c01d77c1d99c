//! RSDB Catalog - Table metadata and statistics types

pub mod in_memory;
pub mod stats;
pub mod traits;

pub use in_memory::InMemoryCatalog;
pub use stats::{
    Bucket, CachedColumnStats, CachedIndexStats, CachedTableStats, CmSketch, Histogram,
    PSEUDO_EQUAL_RATE,
};
pub use traits::{Catalog, ColumnInfo, IndexInfo, TableInfo};
