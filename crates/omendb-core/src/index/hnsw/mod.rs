//! HNSW graph backends: monolithic and segmented.

pub mod graph;
pub mod params;
pub mod segmented;

pub use graph::{HnswGraph, VectorView};
pub use params::HnswParams;
pub use segmented::SegmentedHnsw;
