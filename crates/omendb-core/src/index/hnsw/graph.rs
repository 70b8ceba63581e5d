//! Hierarchical navigable small-world graph.
//!
//! Layered proximity graph after Malkov & Yashunin. Nodes live in an
//! append-only array; each carries its drawn level, a tombstone flag, and
//! one bounded neighbor list per occupied layer. All operations run under
//! the engine's single-writer discipline, so the structure needs no interior
//! locking; the bulk path builds independent graphs per segment instead of
//! sharing one.
//!
//! Vector payloads stay in the arena. Every operation receives a
//! [`VectorView`] bundling the arena, the optional binary-code store, and
//! the resolved distance kernel.

use super::params::HnswParams;
use crate::arena::VectorArena;
use crate::distance::DistanceKernel;
use crate::index::topk::{Scored, TopK};
use crate::quant::BinaryCodeStore;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Hard cap on drawn levels.
pub(crate) const MAX_LEVEL: usize = 15;

/// Binary pre-filter slack: candidates whose approximate distance exceeds
/// this multiple of the current worst kept result skip the float kernel.
const BINARY_PREFILTER_SLACK: f32 = 1.3;

/// Borrowed view of the vector data a graph operation reads.
#[derive(Clone, Copy)]
pub struct VectorView<'a> {
    /// Float payload arena.
    pub arena: &'a VectorArena,
    /// Binary codes, when the Hamming pre-filter is enabled.
    pub codes: Option<&'a BinaryCodeStore>,
    /// Resolved distance kernel.
    pub kernel: &'a DistanceKernel,
}

impl VectorView<'_> {
    #[inline]
    fn distance(&self, query: &[f32], vector_id: u32) -> f32 {
        self.kernel.distance(query, self.arena.slot(vector_id))
    }
}

#[derive(Debug, Clone)]
struct Node {
    vector_id: u32,
    level: usize,
    deleted: bool,
    /// Neighbor lists for layers `0..=level`, each bounded by the layer cap.
    links: Vec<Vec<u32>>,
}

/// Monolithic HNSW index over arena-resident vectors.
#[derive(Debug, Clone)]
pub struct HnswGraph {
    params: HnswParams,
    nodes: Vec<Node>,
    /// Arena id -> node id.
    node_of: FxHashMap<u32, u32>,
    /// Entry point: a node with the maximum level, lowest node id on ties.
    entry: Option<u32>,
    rng_state: u64,
    live: usize,
}

impl HnswGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new(params: HnswParams) -> Self {
        let seed = if params.seed == 0 {
            HnswParams::default().seed
        } else {
            params.seed
        };
        Self {
            params,
            nodes: Vec::new(),
            node_of: FxHashMap::default(),
            entry: None,
            rng_state: seed,
            live: 0,
        }
    }

    /// Number of live (non-tombstoned) vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no live vectors remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Total nodes including tombstones.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the arena id has a (possibly tombstoned) node.
    #[must_use]
    pub fn contains(&self, vector_id: u32) -> bool {
        self.node_of.contains_key(&vector_id)
    }

    /// Inserts an arena-resident vector and returns its node id.
    ///
    /// The caller must have appended the vector (and its binary code, when
    /// enabled) before calling; the graph only stores topology.
    pub fn insert(&mut self, vector_id: u32, view: VectorView<'_>) -> u32 {
        let level = self.random_level();
        #[allow(clippy::cast_possible_truncation)]
        let node_id = self.nodes.len() as u32;
        let links = (0..=level)
            .map(|l| Vec::with_capacity(self.params.max_connections(l)))
            .collect();
        self.nodes.push(Node {
            vector_id,
            level,
            deleted: false,
            links,
        });
        self.node_of.insert(vector_id, node_id);
        self.live += 1;

        let Some(entry) = self.entry else {
            self.entry = Some(node_id);
            return node_id;
        };

        let query = view.arena.slot(vector_id);
        let query_code = view.codes.and_then(|c| c.get(vector_id));
        let entry_level = self.nodes[entry as usize].level;

        // Greedy 1-NN descent through the layers above the new node.
        let mut current = entry;
        for layer in (level + 1..=entry_level).rev() {
            current = self.greedy_descend(query, current, layer, view);
        }

        // Beam search + heuristic selection on every occupied layer.
        for layer in (0..=level.min(entry_level)).rev() {
            let candidates = self.search_layer(
                query,
                query_code,
                &[current],
                self.params.ef_construction,
                layer,
                view,
            );
            let cap = self.params.max_connections(layer);
            let selected = self.select_neighbors(&candidates, cap, view);

            self.nodes[node_id as usize].links[layer].clone_from(&selected);
            for &neighbor in &selected {
                self.add_link(neighbor, node_id, layer, view);
            }

            if let Some(&(next, _)) = candidates.first() {
                current = next;
            }
        }

        if level > entry_level {
            self.entry = Some(node_id);
        }
        node_id
    }

    /// Searches for the `k` nearest live vectors.
    ///
    /// Returns `(arena id, distance)` ascending; tombstoned nodes are
    /// traversed but never returned.
    #[must_use]
    pub fn search(&self, query: &[f32], k: usize, ef: usize, view: VectorView<'_>) -> Vec<(u32, f32)> {
        self.search_local(query, k, ef, view)
            .into_iter()
            .map(|(node, dist)| (self.node_vector(node), dist))
            .collect()
    }

    /// Like [`HnswGraph::search`] but returns graph-local node ids.
    ///
    /// The segmented index merges per-segment results under an encoded
    /// `(segment, local node)` tag and translates to arena ids afterwards.
    pub(crate) fn search_local(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        view: VectorView<'_>,
    ) -> Vec<(u32, f32)> {
        let Some(entry) = self.entry else {
            return Vec::new();
        };

        let entry_level = self.nodes[entry as usize].level;
        let mut current = entry;
        for layer in (1..=entry_level).rev() {
            current = self.greedy_descend(query, current, layer, view);
        }

        let query_code = view.codes.map(|c| c.encode_query(query));
        let candidates = self.search_layer(
            query,
            query_code.as_deref(),
            &[current],
            ef.max(k),
            0,
            view,
        );

        let mut topk = TopK::new(k);
        for (node, dist) in candidates {
            if !self.nodes[node as usize].deleted {
                topk.push(node, dist);
            }
        }
        topk.finalize()
    }

    /// Tombstones a vector. Edges remain; results filter the node out.
    ///
    /// Returns false if the id is unknown or already tombstoned.
    pub fn delete(&mut self, vector_id: u32) -> bool {
        let Some(&node) = self.node_of.get(&vector_id) else {
            return false;
        };
        let n = &mut self.nodes[node as usize];
        if n.deleted {
            return false;
        }
        n.deleted = true;
        self.live -= 1;
        if self.entry == Some(node) {
            self.reelect_entry();
        }
        true
    }

    /// Returns whether the arena id is tombstoned (None if unknown).
    #[must_use]
    pub fn is_deleted(&self, vector_id: u32) -> Option<bool> {
        self.node_of
            .get(&vector_id)
            .map(|&n| self.nodes[n as usize].deleted)
    }

    // -------------------------------------------------------------------------
    // Test and sibling-module accessors
    // -------------------------------------------------------------------------

    pub(crate) fn entry_node(&self) -> Option<u32> {
        self.entry
    }

    pub(crate) fn node_level(&self, node: u32) -> usize {
        self.nodes[node as usize].level
    }

    pub(crate) fn node_vector(&self, node: u32) -> u32 {
        self.nodes[node as usize].vector_id
    }

    pub(crate) fn node_deleted(&self, node: u32) -> bool {
        self.nodes[node as usize].deleted
    }

    pub(crate) fn neighbors(&self, node: u32, layer: usize) -> &[u32] {
        &self.nodes[node as usize].links[layer]
    }

    pub(crate) fn params(&self) -> &HnswParams {
        &self.params
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn random_level(&mut self) -> usize {
        // xorshift64; seeded for reproducible level sequences.
        let mut s = self.rng_state;
        s ^= s << 13;
        s ^= s >> 7;
        s ^= s << 17;
        self.rng_state = s;

        // Top 53 bits shifted into (0, 1] so ln() is always finite.
        let u = ((s >> 11) as f64 + 1.0) / (1u64 << 53) as f64;
        let level = (-u.ln() * self.params.level_mult()).floor() as usize;
        level.min(MAX_LEVEL)
    }

    fn greedy_descend(&self, query: &[f32], entry: u32, layer: usize, view: VectorView<'_>) -> u32 {
        let mut best = entry;
        let mut best_dist = view.distance(query, self.node_vector(best));

        loop {
            let mut improved = false;
            let current = best;
            for &n in &self.nodes[current as usize].links[layer] {
                let d = view.distance(query, self.node_vector(n));
                if d < best_dist {
                    best = n;
                    best_dist = d;
                    improved = true;
                }
            }
            if !improved {
                return best;
            }
        }
    }

    /// Beam search over one layer; returns `(node id, distance)` ascending.
    ///
    /// Tombstoned nodes participate (their edges keep the graph navigable),
    /// so callers filter results as needed.
    fn search_layer(
        &self,
        query: &[f32],
        query_code: Option<&[u8]>,
        entries: &[u32],
        ef: usize,
        layer: usize,
        view: VectorView<'_>,
    ) -> Vec<(u32, f32)> {
        let mut visited: FxHashSet<u32> = FxHashSet::default();
        let mut candidates: BinaryHeap<Reverse<Scored>> = BinaryHeap::new();
        let mut results: BinaryHeap<Scored> = BinaryHeap::new();

        for &ep in entries {
            if !visited.insert(ep) {
                continue;
            }
            let dist = view.distance(query, self.node_vector(ep));
            candidates.push(Reverse(Scored { dist, id: ep }));
            results.push(Scored { dist, id: ep });
        }

        while let Some(Reverse(current)) = candidates.pop() {
            let worst = results.peek().map_or(f32::MAX, |s| s.dist);
            if current.dist > worst && results.len() >= ef {
                break;
            }

            for &n in &self.nodes[current.id as usize].links[layer] {
                if !visited.insert(n) {
                    continue;
                }

                // Hamming pre-filter: once the beam is full, skip the float
                // kernel for candidates whose approximate distance is far
                // beyond the current worst. Anything kept is re-scored with
                // the exact kernel below.
                if let (Some(qc), Some(codes)) = (query_code, view.codes) {
                    if results.len() >= ef {
                        let worst = results.peek().map_or(f32::MAX, |s| s.dist);
                        if let Some(approx) = codes.distance_to(qc, self.node_vector(n)) {
                            if approx > worst * BINARY_PREFILTER_SLACK {
                                continue;
                            }
                        }
                    }
                }

                let dist = view.distance(query, self.node_vector(n));
                let worst = results.peek().map_or(f32::MAX, |s| s.dist);
                if results.len() < ef || dist < worst {
                    candidates.push(Reverse(Scored { dist, id: n }));
                    results.push(Scored { dist, id: n });
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<(u32, f32)> = results.into_iter().map(|s| (s.id, s.dist)).collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }

    /// Relative-neighborhood selection: walk candidates by ascending
    /// distance to the query, accept `c` iff it is closer to the query than
    /// to every already-accepted neighbor. Under-full quotas are topped up
    /// with the nearest rejects.
    fn select_neighbors(
        &self,
        candidates: &[(u32, f32)],
        cap: usize,
        view: VectorView<'_>,
    ) -> Vec<u32> {
        if candidates.len() <= cap {
            return candidates.iter().map(|&(n, _)| n).collect();
        }

        let mut selected: Vec<(u32, f32)> = Vec::with_capacity(cap);
        for &(cand, cand_dist) in candidates {
            if selected.len() >= cap {
                break;
            }
            let cand_vec = view.arena.slot(self.node_vector(cand));
            let diverse = selected.iter().all(|&(kept, _)| {
                cand_dist
                    < view
                        .kernel
                        .distance(cand_vec, view.arena.slot(self.node_vector(kept)))
            });
            if diverse {
                selected.push((cand, cand_dist));
            }
        }

        if selected.len() < cap {
            for &(cand, cand_dist) in candidates {
                if selected.len() >= cap {
                    break;
                }
                if !selected.iter().any(|&(n, _)| n == cand) {
                    selected.push((cand, cand_dist));
                }
            }
        }

        selected.into_iter().map(|(n, _)| n).collect()
    }

    /// Adds `new_neighbor` to `node`'s list at `layer`, re-running the
    /// heuristic when the cap overflows. Edges dropped by the prune also
    /// remove their reverse direction, keeping every edge reciprocated.
    fn add_link(&mut self, node: u32, new_neighbor: u32, layer: usize, view: VectorView<'_>) {
        let cap = self.params.max_connections(layer);
        let links = &self.nodes[node as usize].links[layer];
        if links.iter().any(|&n| n == new_neighbor) {
            return;
        }
        if links.len() < cap {
            self.nodes[node as usize].links[layer].push(new_neighbor);
            return;
        }

        let base = view.arena.slot(self.node_vector(node));
        let mut expanded: Vec<(u32, f32)> = self.nodes[node as usize].links[layer]
            .iter()
            .copied()
            .chain(std::iter::once(new_neighbor))
            .map(|n| {
                (
                    n,
                    view.kernel.distance(base, view.arena.slot(self.node_vector(n))),
                )
            })
            .collect();
        expanded.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let keep = self.select_neighbors(&expanded, cap, view);

        let dropped: Vec<u32> = expanded
            .iter()
            .map(|&(n, _)| n)
            .filter(|n| !keep.contains(n))
            .collect();
        self.nodes[node as usize].links[layer] = keep;

        for d in dropped {
            let back = &mut self.nodes[d as usize].links[layer];
            if let Some(pos) = back.iter().position(|&x| x == node) {
                back.swap_remove(pos);
            }
        }
    }

    fn reelect_entry(&mut self) {
        let mut best: Option<u32> = None;
        for (i, n) in self.nodes.iter().enumerate() {
            if n.deleted {
                continue;
            }
            #[allow(clippy::cast_possible_truncation)]
            let i = i as u32;
            match best {
                None => best = Some(i),
                Some(b) => {
                    if n.level > self.nodes[b as usize].level {
                        best = Some(i);
                    }
                }
            }
        }
        self.entry = best;
    }
}
