//! HNSW tuning parameters.

use crate::config::IndexConfig;
use serde::{Deserialize, Serialize};

/// Graph construction and search parameters.
///
/// `m` caps connections on upper layers; layer 0 holds up to `2 * m`. The
/// level-assignment multiplier is derived as `1 / ln(m)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HnswParams {
    /// Per-layer connection cap on layers above 0.
    pub m: usize,
    /// Build-time beam width.
    pub ef_construction: usize,
    /// Default query-time beam width.
    pub ef_search: usize,
    /// Level-draw PRNG seed.
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 64,
            seed: 0x5DEE_CE66_D1A4_B5B5,
        }
    }
}

impl HnswParams {
    /// Extracts graph parameters from the engine configuration.
    #[must_use]
    pub const fn from_config(config: &IndexConfig) -> Self {
        Self {
            m: config.m,
            ef_construction: config.ef_construction,
            ef_search: config.ef_search,
            seed: config.seed,
        }
    }

    /// Connection cap for a layer: `2 * m` at layer 0, `m` above.
    #[must_use]
    pub const fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 {
            self.m * 2
        } else {
            self.m
        }
    }

    /// Level-assignment multiplier `1 / ln(m)`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn level_mult(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_caps() {
        let params = HnswParams::default();
        assert_eq!(params.max_connections(0), 32);
        assert_eq!(params.max_connections(1), 16);
        assert_eq!(params.max_connections(5), 16);
    }

    #[test]
    fn test_level_mult() {
        let params = HnswParams::default();
        assert!((params.level_mult() - 1.0 / 16f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_from_config() {
        let config = IndexConfig {
            m: 8,
            ef_construction: 77,
            ef_search: 33,
            seed: 5,
            ..IndexConfig::default()
        };
        let params = HnswParams::from_config(&config);
        assert_eq!(params.m, 8);
        assert_eq!(params.ef_construction, 77);
        assert_eq!(params.ef_search, 33);
        assert_eq!(params.seed, 5);
    }
}
