//! Segmented HNSW: independent shards built and searched in parallel.
//!
//! Bulk loads of `segmented_threshold` or more vectors into an empty index
//! split the input range into up to [`MAX_SEGMENTS`] contiguous partitions,
//! one graph per partition. No cross-segment edges exist, so each rayon
//! worker owns its graph outright during the build; the shared arena is
//! filled before dispatch and only read afterwards.
//!
//! Merged search tags per-segment hits with `segment << 28 | local` so the
//! top-k selector can rank across segments in a single u32 id space, then
//! translates winners back to arena ids.

use super::graph::{HnswGraph, VectorView};
use super::params::HnswParams;
use rayon::prelude::*;
use tracing::debug;

use crate::index::topk::TopK;

/// Bits of the encoded id reserved for the segment number.
const SEGMENT_BITS: u32 = 4;

/// Upper bound on segment count (one nibble of the encoded id).
pub const MAX_SEGMENTS: usize = 1 << SEGMENT_BITS;

const LOCAL_BITS: u32 = 32 - SEGMENT_BITS;
const LOCAL_MASK: u32 = (1 << LOCAL_BITS) - 1;

#[inline]
#[allow(clippy::cast_possible_truncation)]
fn encode(segment: usize, local: u32) -> u32 {
    debug_assert!(segment < MAX_SEGMENTS);
    debug_assert!(local <= LOCAL_MASK);
    ((segment as u32) << LOCAL_BITS) | local
}

#[inline]
fn decode(id: u32) -> (usize, u32) {
    ((id >> LOCAL_BITS) as usize, id & LOCAL_MASK)
}

/// Parallel multi-segment HNSW index.
#[derive(Debug)]
pub struct SegmentedHnsw {
    segments: Vec<HnswGraph>,
}

impl SegmentedHnsw {
    /// Builds segments over `ids` (arena ids, already appended) in parallel.
    ///
    /// The input range is split into contiguous partitions, one per worker,
    /// bounded by [`MAX_SEGMENTS`]. Within a segment insertions follow input
    /// order; across segments order is unspecified.
    #[must_use]
    pub fn build(params: HnswParams, ids: &[u32], view: VectorView<'_>) -> Self {
        let parallelism = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        let segment_count = parallelism.min(MAX_SEGMENTS).min(ids.len()).max(1);
        let chunk = ids.len().div_ceil(segment_count);

        debug!(
            vectors = ids.len(),
            segments = segment_count,
            "building segmented index"
        );

        let mut segments: Vec<HnswGraph> = (0..segment_count)
            .map(|s| {
                // Per-segment seed offset keeps level sequences independent.
                let mut p = params;
                p.seed = params.seed.wrapping_add(s as u64 * 0x9E37_79B9_7F4A_7C15);
                HnswGraph::new(p)
            })
            .collect();

        segments
            .par_iter_mut()
            .enumerate()
            .for_each(|(s, graph)| {
                let start = s * chunk;
                let end = ((s + 1) * chunk).min(ids.len());
                for &vector_id in &ids[start..end] {
                    graph.insert(vector_id, view);
                }
            });

        Self { segments }
    }

    /// Number of segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Live vectors across all segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.iter().map(HnswGraph::len).sum()
    }

    /// Returns true if no live vectors remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Inserts one vector after the bulk build, routed to the smallest
    /// segment to keep shards balanced.
    pub fn insert(&mut self, vector_id: u32, view: VectorView<'_>) {
        let mut target = 0;
        for (s, graph) in self.segments.iter().enumerate() {
            if graph.node_count() < self.segments[target].node_count() {
                target = s;
            }
        }
        self.segments[target].insert(vector_id, view);
    }

    /// Queries every segment in parallel and merges the per-segment top-k.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize, ef: usize, view: VectorView<'_>) -> Vec<(u32, f32)> {
        let per_segment: Vec<Vec<(u32, f32)>> = self
            .segments
            .par_iter()
            .map(|graph| graph.search_local(query, k, ef, view))
            .collect();

        let mut merged = TopK::new(k);
        for (s, results) in per_segment.iter().enumerate() {
            for &(local, dist) in results {
                merged.push(encode(s, local), dist);
            }
        }

        merged
            .finalize()
            .into_iter()
            .map(|(tag, dist)| {
                let (s, local) = decode(tag);
                (self.segments[s].node_vector(local), dist)
            })
            .collect()
    }

    /// Tombstones a vector in whichever segment holds it.
    pub fn delete(&mut self, vector_id: u32) -> bool {
        self.segments.iter_mut().any(|g| g.delete(vector_id))
    }

    /// Returns whether the arena id is tombstoned (None if unknown).
    #[must_use]
    pub fn is_deleted(&self, vector_id: u32) -> Option<bool> {
        self.segments.iter().find_map(|g| g.is_deleted(vector_id))
    }

    pub(crate) fn segments(&self) -> &[HnswGraph] {
        &self.segments
    }
}
