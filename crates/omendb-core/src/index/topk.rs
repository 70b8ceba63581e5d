//! Top-k selection over (id, distance) streams.
//!
//! Two regimes: small k keeps a sorted array updated by scan-and-shift
//! (branch-predictable, no allocation churn); larger k keeps a bounded
//! max-heap where the root is the current worst kept distance. Batch scoring
//! paths can reject whole chunks with a vectorized chunk minimum before
//! touching the selector.

use crate::simd;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Candidate heap entry: a numeric id scored by its distance to the query.
///
/// Orders by distance under IEEE 754 total ordering, ties by id; a NaN
/// distance therefore cannot break `BinaryHeap` invariants. Equality
/// follows the same ordering so `Eq` stays consistent with `Ord`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Scored {
    /// Distance to the query.
    pub dist: f32,
    /// Candidate id (graph node or arena slot, caller-defined).
    pub id: u32,
}

impl PartialEq for Scored {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scored {}

impl PartialOrd for Scored {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scored {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist
            .total_cmp(&other.dist)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Largest k handled by the sorted-array regime.
const SORTED_MAX_K: usize = 16;

enum Selector {
    Sorted(Vec<(u32, f32)>),
    Heap(BinaryHeap<Scored>),
}

/// Streaming top-k selector; smallest k distances win.
pub struct TopK {
    k: usize,
    selector: Selector,
}

impl TopK {
    /// Creates a selector retaining the `k` smallest distances.
    #[must_use]
    pub fn new(k: usize) -> Self {
        let selector = if k <= SORTED_MAX_K {
            Selector::Sorted(Vec::with_capacity(k + 1))
        } else {
            Selector::Heap(BinaryHeap::with_capacity(k + 1))
        };
        Self { k, selector }
    }

    /// Number of candidates currently kept.
    #[must_use]
    pub fn len(&self) -> usize {
        match &self.selector {
            Selector::Sorted(v) => v.len(),
            Selector::Heap(h) => h.len(),
        }
    }

    /// Returns true if nothing has been kept yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current k-th best distance, or `f32::MAX` while underfull.
    #[must_use]
    pub fn worst(&self) -> f32 {
        if self.len() < self.k {
            return f32::MAX;
        }
        match &self.selector {
            Selector::Sorted(v) => v.last().map_or(f32::MAX, |&(_, d)| d),
            Selector::Heap(h) => h.peek().map_or(f32::MAX, |s| s.dist),
        }
    }

    /// Offers one candidate.
    pub fn push(&mut self, id: u32, dist: f32) {
        if self.k == 0 {
            return;
        }
        match &mut self.selector {
            Selector::Sorted(v) => {
                if v.len() == self.k && dist >= v[v.len() - 1].1 {
                    return;
                }
                // Scan from the tail and shift larger entries right.
                let mut pos = v.len();
                while pos > 0 && v[pos - 1].1 > dist {
                    pos -= 1;
                }
                v.insert(pos, (id, dist));
                v.truncate(self.k);
            }
            Selector::Heap(h) => {
                if h.len() < self.k {
                    h.push(Scored { dist, id });
                } else if let Some(&root) = h.peek() {
                    if dist < root.dist {
                        h.pop();
                        h.push(Scored { dist, id });
                    }
                }
            }
        }
    }

    /// Offers a chunk of scored candidates.
    ///
    /// When the selector is full and even the chunk's minimum cannot enter,
    /// the whole chunk is rejected without per-element work.
    pub fn push_chunk(&mut self, ids: &[u32], dists: &[f32]) {
        debug_assert_eq!(ids.len(), dists.len());
        if self.len() >= self.k && simd::chunk_min(dists) >= self.worst() {
            return;
        }
        for (&id, &d) in ids.iter().zip(dists) {
            self.push(id, d);
        }
    }

    /// Consumes the selector, returning kept candidates sorted ascending by
    /// distance.
    #[must_use]
    pub fn finalize(self) -> Vec<(u32, f32)> {
        match self.selector {
            Selector::Sorted(v) => v,
            Selector::Heap(h) => h
                .into_sorted_vec()
                .into_iter()
                .map(|s| (s.id, s.dist))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scored_ordering_is_total() {
        let a = Scored { dist: 1.0, id: 0 };
        let b = Scored { dist: 1.0, id: 1 };
        let nan = Scored { dist: f32::NAN, id: 2 };
        assert!(a < b, "ties break by id");
        assert!(a < nan, "+NaN sorts last under total ordering");
        assert_eq!(nan, nan);
    }

    #[test]
    fn test_sorted_regime_orders_ascending() {
        let mut topk = TopK::new(3);
        for (id, d) in [(0, 5.0), (1, 1.0), (2, 3.0), (3, 0.5), (4, 9.0)] {
            topk.push(id, d);
        }
        assert_eq!(topk.finalize(), vec![(3, 0.5), (1, 1.0), (2, 3.0)]);
    }

    #[test]
    fn test_heap_regime_matches_sorted() {
        let dists: Vec<f32> = (0..200).map(|i| ((i * 37) % 101) as f32).collect();

        let mut small = TopK::new(16);
        let mut large = TopK::new(17);
        for (i, &d) in dists.iter().enumerate() {
            small.push(i as u32, d);
            large.push(i as u32, d);
        }
        let small = small.finalize();
        let large = large.finalize();
        assert_eq!(small.len(), 16);
        assert_eq!(large.len(), 17);
        for i in 0..16 {
            assert_eq!(small[i].1, large[i].1);
        }
        // Ascending order in both regimes.
        for w in large.windows(2) {
            assert!(w[0].1 <= w[1].1);
        }
    }

    #[test]
    fn test_worst_tracks_kth() {
        let mut topk = TopK::new(2);
        assert_eq!(topk.worst(), f32::MAX);
        topk.push(0, 4.0);
        assert_eq!(topk.worst(), f32::MAX);
        topk.push(1, 2.0);
        assert_eq!(topk.worst(), 4.0);
        topk.push(2, 1.0);
        assert_eq!(topk.worst(), 2.0);
    }

    #[test]
    fn test_push_chunk_rejects_hopeless() {
        let mut topk = TopK::new(2);
        topk.push(0, 1.0);
        topk.push(1, 2.0);
        // Entire chunk worse than the current worst; ids must not enter.
        topk.push_chunk(&[10, 11, 12], &[5.0, 6.0, 7.0]);
        let out = topk.finalize();
        assert_eq!(out, vec![(0, 1.0), (1, 2.0)]);
    }

    #[test]
    fn test_push_chunk_admits_winners() {
        let mut topk = TopK::new(2);
        topk.push(0, 10.0);
        topk.push(1, 20.0);
        topk.push_chunk(&[100, 101, 102], &[15.0, 0.5, 30.0]);
        let out = topk.finalize();
        assert_eq!(out[0], (101, 0.5));
        assert_eq!(out[1], (0, 10.0));
    }

    #[test]
    fn test_k_zero_keeps_nothing() {
        let mut topk = TopK::new(0);
        topk.push(0, 1.0);
        assert!(topk.finalize().is_empty());
    }

    #[test]
    fn test_duplicate_distances_kept() {
        let mut topk = TopK::new(4);
        for id in 0..10u32 {
            topk.push(id, 1.0);
        }
        assert_eq!(topk.finalize().len(), 4);
    }
}
