//! Flat exact-search buffer for small populations.
//!
//! Below the migration threshold, a linear scan over the arena beats graph
//! traversal and guarantees perfect recall. The buffer only tracks which
//! arena ids are live; vector bytes stay in the arena like everywhere else.

use super::topk::TopK;
use crate::arena::VectorArena;
use crate::distance::DistanceKernel;

/// Distances are scored in chunks of this many vectors so the top-k
/// selector can reject whole chunks with one vectorized minimum.
const SCAN_CHUNK: usize = 64;

/// Exact linear-scan store used while the population is small.
#[derive(Debug, Clone, Default)]
pub struct FlatBuffer {
    ids: Vec<u32>,
}

impl FlatBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub const fn new() -> Self {
        Self { ids: Vec::new() }
    }

    /// Number of live vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Tracks an arena id. The vector itself was already appended.
    pub fn insert(&mut self, id: u32) {
        self.ids.push(id);
    }

    /// Forgets an id, preserving insertion order for later migration.
    pub fn remove(&mut self, id: u32) -> bool {
        if let Some(pos) = self.ids.iter().position(|&x| x == id) {
            self.ids.remove(pos);
            true
        } else {
            false
        }
    }

    /// Live ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    /// Exact k-NN over every live vector.
    #[must_use]
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        arena: &VectorArena,
        kernel: &DistanceKernel,
    ) -> Vec<(u32, f32)> {
        let mut topk = TopK::new(k);
        let mut dists = [0.0f32; SCAN_CHUNK];

        for chunk in self.ids.chunks(SCAN_CHUNK) {
            for (slot, &id) in dists.iter_mut().zip(chunk) {
                *slot = kernel.distance(query, arena.slot(id));
            }
            topk.push_chunk(chunk, &dists[..chunk.len()]);
        }
        topk.finalize()
    }

    /// Hands every id (in insertion order) to `sink` and empties the buffer.
    ///
    /// Migration inserts vectors one-by-one: on a population this small the
    /// cost is bounded and individual insertion yields better connectivity
    /// than a bulk build.
    pub fn migrate_into(&mut self, mut sink: impl FnMut(u32)) {
        for &id in &self.ids {
            sink(id);
        }
        self.ids.clear();
    }

    /// Drops every id.
    pub fn clear(&mut self) {
        self.ids.clear();
    }
}
