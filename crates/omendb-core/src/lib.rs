//! # `OmenDB` Core
//!
//! Embeddable approximate-nearest-neighbor vector index with crash-durable
//! persistence.
//!
//! The engine adapts its backend to the population: an exact-scan flat
//! buffer for small indexes, a monolithic HNSW graph past the migration
//! threshold, and a parallel segmented HNSW for bulk loads. Vector payloads
//! live in a contiguous arena; checkpoints stream them to a memory-mapped
//! block file and recovery rebuilds the graph by re-insertion.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use omendb_core::OmenIndex;
//!
//! let mut index = OmenIndex::new();
//! index.init(768)?;
//!
//! index.insert("doc-1", &embedding)?;
//! let hits = index.search(&query, 10)?;
//!
//! index.checkpoint("/var/lib/omen/main")?;
//! ```
//!
//! ## Features
//!
//! - **SIMD distance kernels**: 8-lane L2 / cosine / dot with monomorphized
//!   variants for common embedding dimensions
//! - **Binary quantization**: optional 1-bit-per-dimension Hamming
//!   pre-filter during graph traversal
//! - **Adaptive dispatch**: flat, graph, and segmented backends behind one
//!   facade
//! - **mmap persistence**: 64 KiB-aligned block checkpoints with CRC32
//!   body checksums

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod arena;
pub mod config;
pub mod distance;
pub mod error;
pub mod idmap;
pub mod index;
pub mod quant;
pub mod simd;
pub mod storage;

pub use config::IndexConfig;
pub use distance::DistanceMetric;
pub use error::{Error, Result};
pub use index::{IndexMode, IndexStats, OmenIndex};
