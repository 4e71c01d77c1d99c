//! Statistics cache configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Statistics handle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Refresh/flush period in milliseconds. Commit skew between statistics
    /// writers must stay below one lease.
    pub lease_ms: u64,

    /// How often the background worker checks for histogram load requests
    pub load_check_interval_ms: u64,

    /// Capacity of the schema-change event queue
    pub ddl_queue_capacity: usize,

    /// Capacity of the analyze-result queue
    pub analyze_queue_capacity: usize,

    /// Capacity of the histogram load signal queue
    pub load_queue_capacity: usize,

    /// Max number of query feedback records buffered between flushes
    pub max_feedback_count: usize,

    /// Max number of tables kept in the unpersisted delta map after a failed
    /// flush. Beyond this the map is dropped.
    pub max_pending_delta_tables: usize,

    /// How many flushes a failed schema-change event or analyze result is
    /// retried before it is dropped
    pub max_flush_retries: u32,

    /// Row count assumed for tables that were never analyzed
    pub pseudo_row_count: i64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            lease_ms: 3_000,
            load_check_interval_ms: 100,
            ddl_queue_capacity: 100,
            analyze_queue_capacity: 100,
            load_queue_capacity: 1,
            max_feedback_count: 1 << 10,
            max_pending_delta_tables: 100_000,
            max_flush_retries: 3,
            pseudo_row_count: 10_000,
        }
    }
}

impl StatsConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    pub fn load_check_interval(&self) -> Duration {
        Duration::from_millis(self.load_check_interval_ms)
    }

    /// Reject settings the handle cannot run with.
    pub fn validate(&self) -> Result<(), crate::RsdbError> {
        if self.lease_ms == 0 {
            return Err(crate::RsdbError::Config("lease_ms must be > 0".to_string()));
        }
        if self.load_check_interval_ms == 0 {
            return Err(crate::RsdbError::Config(
                "load_check_interval_ms must be > 0".to_string(),
            ));
        }
        for (name, cap) in [
            ("ddl_queue_capacity", self.ddl_queue_capacity),
            ("analyze_queue_capacity", self.analyze_queue_capacity),
            ("load_queue_capacity", self.load_queue_capacity),
        ] {
            if cap == 0 {
                return Err(crate::RsdbError::Config(format!("{name} must be > 0")));
            }
        }
        if self.pseudo_row_count < 0 {
            return Err(crate::RsdbError::Config(
                "pseudo_row_count must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self, crate::RsdbError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| crate::RsdbError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), crate::RsdbError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
