// Chunk: docs/chunks/store_config - Persistable store configuration

//! Store configuration.
//!
//! A [`StoreConfig`] is fixed at construction except for the
//! over-provisioning percentage, which only affects later bulk loads and
//! block splits. Zero sizes select the defaults, so a config deserialized
//! from a sparse settings file is always usable.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::line_ending::LineEnding;

pub const DEFAULT_BLOCK_SIZE: usize = 2048;
pub const DEFAULT_CHAPTER_SIZE: usize = 10;
pub const DEFAULT_OVER_PROVISION_PCT: u8 = 5;

/// Largest accepted over-provisioning percentage.
pub const MAX_OVER_PROVISION_PCT: u8 = 99;

/// Sizing parameters for a [`TextStore`](crate::TextStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Capacity of each data block in bytes. `0` selects the default.
    pub block_size: usize,
    /// Blocks per chapter-index entry. `0` selects the default.
    pub chapter_size: usize,
    /// Percentage of each block left free after a bulk load or split.
    pub over_provision_pct: u8,
    /// Ending used by line-level helpers such as `insert_line`.
    pub line_ending: LineEnding,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            chapter_size: DEFAULT_CHAPTER_SIZE,
            over_provision_pct: DEFAULT_OVER_PROVISION_PCT,
            line_ending: LineEnding::Lf,
        }
    }
}

impl StoreConfig {
    /// Config with the given sizes; zeros select the defaults.
    pub fn with_sizes(block_size: usize, chapter_size: usize) -> Self {
        Self {
            block_size,
            chapter_size,
            ..Self::default()
        }
        .normalized()
    }

    /// Replaces zero sizes with the defaults.
    pub fn normalized(mut self) -> Self {
        if self.block_size == 0 {
            self.block_size = DEFAULT_BLOCK_SIZE;
        }
        if self.chapter_size == 0 {
            self.chapter_size = DEFAULT_CHAPTER_SIZE;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.over_provision_pct > MAX_OVER_PROVISION_PCT {
            return Err(StoreError::InvalidArgument(format!(
                "over_provision_pct must be in 0..={MAX_OVER_PROVISION_PCT}, got {}",
                self.over_provision_pct
            )));
        }
        Ok(())
    }

    /// Bytes written into a block before moving on to the next one when
    /// loading or splitting. Always at least one.
    pub fn fill_level(&self) -> usize {
        let pct = usize::from(self.over_provision_pct.min(MAX_OVER_PROVISION_PCT));
        (self.block_size * (100 - pct) / 100).max(1)
    }
}
