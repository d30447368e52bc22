//! Hash-join operator configuration.
//!
//! Values normally arrive from the engine's configuration layer; this module
//! only owns the defaults, the JSON shape and the range checks.

use colq_error::{ColqError, Result};
use serde::{Deserialize, Serialize};

/// Default size of one row-chain page (16 MiB).
pub const DEFAULT_VALUE_PAGE_SIZE: usize = 16 * 1024 * 1024;

/// Default row-chain page ceiling. Effectively unbounded.
pub const DEFAULT_VALUE_MAX_PAGES: usize = i32::MAX as usize;

/// Smallest accepted row-chain page.
pub const MIN_VALUE_PAGE_SIZE: usize = 64;

pub const DEFAULT_MAP_INITIAL_CAPACITY: usize = 128;

/// Sizing of the join-key map and the slave row chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HashJoinConfig {
    /// Bytes per row-chain page.
    pub value_page_size: usize,
    /// Maximum number of row-chain pages; exceeding it fails the query.
    pub value_max_pages: usize,
    /// Distinct keys the join-key map is sized for up front.
    pub map_initial_capacity: usize,
}

impl Default for HashJoinConfig {
    fn default() -> Self {
        Self {
            value_page_size: DEFAULT_VALUE_PAGE_SIZE,
            value_max_pages: DEFAULT_VALUE_MAX_PAGES,
            map_initial_capacity: DEFAULT_MAP_INITIAL_CAPACITY,
        }
    }
}

impl HashJoinConfig {
    /// Parse a JSON object; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ColqError::invalid_config(format!("hash join config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_value_page_size(mut self, value_page_size: usize) -> Self {
        self.value_page_size = value_page_size;
        self
    }

    #[must_use]
    pub fn with_value_max_pages(mut self, value_max_pages: usize) -> Self {
        self.value_max_pages = value_max_pages;
        self
    }

    #[must_use]
    pub fn with_map_initial_capacity(mut self, map_initial_capacity: usize) -> Self {
        self.map_initial_capacity = map_initial_capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.value_page_size < MIN_VALUE_PAGE_SIZE {
            return Err(ColqError::invalid_config(format!(
                "value_page_size must be at least {MIN_VALUE_PAGE_SIZE}, got {}",
                self.value_page_size
            )));
        }
        if self.value_max_pages == 0 {
            return Err(ColqError::invalid_config(
                "value_max_pages must be positive",
            ));
        }
        Ok(())
    }

    /// Upper bound on chain storage in bytes.
    #[must_use]
    pub fn value_capacity_bytes(&self) -> u64 {
        (self.value_page_size as u64).saturating_mul(self.value_max_pages as u64)
    }
}
