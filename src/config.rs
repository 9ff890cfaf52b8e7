//! Construction parameters for the hash indexes.

use crate::bucket::SLOTS;
use crate::error::{IndexError, Result};

/// Default load factor that triggers a linear-hash split.
pub const DEFAULT_LOAD_FACTOR: f64 = 0.75;

/// Default ceiling on the extendible-hash directory depth (16M slots).
pub const DEFAULT_MAX_GLOBAL_DEPTH: u32 = 24;

/// Smallest load factor a linear index accepts: `1 / SLOTS`.
pub const MIN_LOAD_FACTOR: f64 = 1.0 / SLOTS as f64;

/// Hard ceiling: directory indexes are taken from a `u64` hash and must fit a `usize`.
const MAX_SUPPORTED_DEPTH: u32 = if usize::BITS < 64 { usize::BITS - 1 } else { 48 };

/// Configuration shared by [`LinearHashIndex`](crate::LinearHashIndex) and
/// [`ExtendibleHashIndex`](crate::ExtendibleHashIndex).
///
/// Fields that do not apply to a variant are ignored by it.
#[derive(Debug, Clone, PartialEq)]
pub struct HashConfig {
    /// Number of home buckets (linear) or directory slots (extendible) at construction.
    /// Must be non-zero; the extendible index also requires a power of two.
    pub initial_buckets: usize,
    /// Ratio of stored keys to nominal capacity above which the linear index splits.
    pub load_factor: f64,
    /// Largest global depth the extendible directory may reach.
    pub max_global_depth: u32,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self {
            initial_buckets: 4,
            load_factor: DEFAULT_LOAD_FACTOR,
            max_global_depth: DEFAULT_MAX_GLOBAL_DEPTH,
        }
    }
}

impl HashConfig {
    /// Default config with the given initial bucket count.
    pub fn with_initial_buckets(initial_buckets: usize) -> Self {
        Self {
            initial_buckets,
            ..Self::default()
        }
    }

    pub(crate) fn validate_linear(&self) -> Result<()> {
        if self.initial_buckets == 0 {
            return Err(IndexError::invalid_config("initial_buckets must be non-zero"));
        }
        // One split per insert adds SLOTS slots for one key, so below
        // 1/SLOTS the load can never fall back under the threshold.
        if !(MIN_LOAD_FACTOR..=1.0).contains(&self.load_factor) {
            return Err(IndexError::invalid_config(format!(
                "load_factor must be within [{MIN_LOAD_FACTOR}, 1], got {}",
                self.load_factor
            )));
        }
        Ok(())
    }

    /// Validates and returns the initial global depth.
    pub(crate) fn validate_extendible(&self) -> Result<u32> {
        if !self.initial_buckets.is_power_of_two() {
            return Err(IndexError::invalid_config(format!(
                "initial_buckets must be a power of two, got {}",
                self.initial_buckets
            )));
        }
        if self.max_global_depth > MAX_SUPPORTED_DEPTH {
            return Err(IndexError::invalid_config(format!(
                "max_global_depth {} exceeds supported maximum {}",
                self.max_global_depth, MAX_SUPPORTED_DEPTH
            )));
        }
        let depth = self.initial_buckets.trailing_zeros();
        if depth > self.max_global_depth {
            return Err(IndexError::invalid_config(format!(
                "initial directory depth {} exceeds max_global_depth {}",
                depth, self.max_global_depth
            )));
        }
        Ok(depth)
    }
}
