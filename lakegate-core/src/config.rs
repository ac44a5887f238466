//! Engine settings

use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::metadata::DEFAULT_FOOTER_TAIL_BYTES;

/// Limits and fan-out used while evaluating one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest diff the engine will hold in memory
    pub max_diff_entries: usize,
    /// Entries requested per diff/listing page
    pub page_size: usize,
    /// Concurrent footer reads or listings per request
    pub fanout: usize,
    /// Size of the first tail read for footers
    pub footer_tail_bytes: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_diff_entries: 100_000,
            page_size: 1_000,
            fanout: 8,
            footer_tail_bytes: DEFAULT_FOOTER_TAIL_BYTES,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("max_diff_entries", self.max_diff_entries as u64),
            ("page_size", self.page_size as u64),
            ("fanout", self.fanout as u64),
            ("footer_tail_bytes", self.footer_tail_bytes),
        ] {
            if value == 0 {
                return Err(ValidationError::config(format!("engine.{} must be greater than 0", name)));
            }
        }
        Ok(())
    }
}
