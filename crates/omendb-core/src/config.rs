//! Engine configuration.
//!
//! All tunables the core recognizes, with conservative defaults. The caller
//! constructs an [`IndexConfig`] programmatically (file/env loading lives in
//! the embedding layer, not here).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Population at which the flat buffer migrates into a graph.
pub const DEFAULT_FLAT_THRESHOLD: usize = 500;

/// Bulk-insert size at which an empty index builds segmented.
pub const DEFAULT_SEGMENTED_THRESHOLD: usize = 10_000;

/// Engine configuration.
///
/// `dimension` is not part of the config: it is fixed at `init` time and
/// immutable until `clear`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Per-layer connection cap (M). Layer 0 uses `2 * m`. Must be >= 4.
    pub m: usize,
    /// Build-time beam width.
    pub ef_construction: usize,
    /// Default query-time beam width.
    pub ef_search: usize,
    /// Flat -> graph migration point.
    pub flat_threshold: usize,
    /// Bulk -> segmented threshold.
    pub segmented_threshold: usize,
    /// Enable the Hamming pre-filter during graph traversal.
    pub binary_quant: bool,
    /// Seed for the level-assignment PRNG.
    pub seed: u64,
    /// Fixed arena growth factor. `None` selects the adaptive tiered policy.
    pub growth_factor: Option<f32>,
    /// Write CRC32 block checksums on checkpoint (zeros are always accepted
    /// on read).
    pub checksum: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            flat_threshold: DEFAULT_FLAT_THRESHOLD,
            segmented_threshold: DEFAULT_SEGMENTED_THRESHOLD,
            binary_quant: false,
            seed: 0x5DEE_CE66_D1A4_B5B5,
            growth_factor: None,
            checksum: true,
        }
    }
}

impl IndexConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Config` if any field is outside its legal range.
    pub fn validate(&self) -> Result<()> {
        if self.m < 4 {
            return Err(Error::Config(format!("M must be >= 4, got {}", self.m)));
        }
        if self.ef_construction == 0 {
            return Err(Error::Config("ef_construction must be > 0".into()));
        }
        if self.ef_search == 0 {
            return Err(Error::Config("ef_search must be > 0".into()));
        }
        if self.flat_threshold == 0 {
            return Err(Error::Config("flat_threshold must be > 0".into()));
        }
        if let Some(g) = self.growth_factor {
            if g <= 1.0 || !g.is_finite() {
                return Err(Error::Config(format!(
                    "growth_factor must be a finite value > 1.0, got {g}"
                )));
            }
        }
        Ok(())
    }

    /// Config with the Hamming pre-filter enabled.
    #[must_use]
    pub fn with_binary_quant(mut self) -> Self {
        self.binary_quant = true;
        self
    }

    /// Config with a caller-supplied level-draw seed.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
