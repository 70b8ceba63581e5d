//! Adaptive dispatch between the flat buffer, the monolithic graph, and the
//! segmented graph.
//!
//! The active backend is a state machine driven by population and insert
//! shape:
//!
//! - `Flat -> Graph` when one more insert would push the flat buffer past
//!   `flat_threshold`; the buffer migrates one vector at a time into a fresh
//!   graph before the triggering insert proceeds.
//! - `Flat(empty) -> Segmented` only for a bulk insert of at least
//!   `segmented_threshold` vectors into an empty index.
//!
//! Modes never mix for search; a migration completes before the engine
//! returns, so the next search always sees exactly one backend.

use crate::arena::VectorArena;
use crate::config::IndexConfig;
use crate::distance::{DistanceKernel, DistanceMetric};
use crate::error::Result;
use crate::index::flat::FlatBuffer;
use crate::index::hnsw::graph::{HnswGraph, VectorView};
use crate::index::hnsw::params::HnswParams;
use crate::index::hnsw::segmented::SegmentedHnsw;
use crate::index::IndexMode;
use crate::quant::BinaryCodeStore;
use tracing::{debug, info};

enum Backend {
    Flat(FlatBuffer),
    Graph(HnswGraph),
    Segmented(SegmentedHnsw),
}

/// Population-adaptive vector index over one arena.
pub(crate) struct AdaptiveIndex {
    config: IndexConfig,
    kernel: DistanceKernel,
    arena: VectorArena,
    codes: Option<BinaryCodeStore>,
    backend: Backend,
}

impl AdaptiveIndex {
    pub(crate) fn new(dimension: usize, metric: DistanceMetric, config: IndexConfig) -> Self {
        let kernel = DistanceKernel::new(metric, dimension);
        let arena = VectorArena::new(dimension, config.growth_factor);
        let codes = config.binary_quant.then(|| BinaryCodeStore::new(dimension));
        Self {
            config,
            kernel,
            arena,
            codes,
            backend: Backend::Flat(FlatBuffer::new()),
        }
    }

    pub(crate) const fn dimension(&self) -> usize {
        self.arena.dimension()
    }

    pub(crate) const fn arena(&self) -> &VectorArena {
        &self.arena
    }

    pub(crate) fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub(crate) const fn metric(&self) -> DistanceMetric {
        self.kernel.metric()
    }

    /// Live (non-deleted) population.
    pub(crate) fn len(&self) -> usize {
        match &self.backend {
            Backend::Flat(flat) => flat.len(),
            Backend::Graph(graph) => graph.len(),
            Backend::Segmented(seg) => seg.len(),
        }
    }

    /// Tombstoned population (arena slots without a live entry).
    pub(crate) fn tombstones(&self) -> usize {
        self.arena.len() - self.len()
    }

    pub(crate) fn mode(&self) -> IndexMode {
        match &self.backend {
            Backend::Flat(_) => IndexMode::Flat,
            Backend::Graph(_) => IndexMode::Graph,
            Backend::Segmented(_) => IndexMode::Segmented,
        }
    }

    /// Inserts one validated vector, migrating flat -> graph when the
    /// threshold is crossed. Returns the assigned dense numeric id.
    pub(crate) fn insert(&mut self, vector: &[f32]) -> Result<u32> {
        if let Backend::Flat(flat) = &self.backend {
            if flat.len() >= self.config.flat_threshold {
                self.migrate_to_graph();
            }
        }

        let id = self.append(vector)?;
        let view = VectorView {
            arena: &self.arena,
            codes: self.codes.as_ref(),
            kernel: &self.kernel,
        };
        match &mut self.backend {
            Backend::Flat(flat) => flat.insert(id),
            Backend::Graph(graph) => {
                graph.insert(id, view);
            }
            Backend::Segmented(seg) => seg.insert(id, view),
        }
        Ok(id)
    }

    /// Builds the segmented backend from a bulk batch into an empty index.
    ///
    /// The arena and code store are filled serially up front; segment
    /// construction then runs share-nothing in parallel over the id range.
    pub(crate) fn build_segmented(&mut self, vectors: &[&[f32]]) -> Result<Vec<u32>> {
        debug_assert_eq!(self.len(), 0);

        self.arena.reserve(vectors.len());
        let mut ids = Vec::with_capacity(vectors.len());
        for v in vectors {
            ids.push(self.append(v)?);
        }

        let params = HnswParams::from_config(&self.config);
        let seg = SegmentedHnsw::build(
            params,
            &ids,
            VectorView {
                arena: &self.arena,
                codes: self.codes.as_ref(),
                kernel: &self.kernel,
            },
        );
        info!(
            vectors = ids.len(),
            segments = seg.segment_count(),
            "bulk build complete, segmented mode active"
        );
        self.backend = Backend::Segmented(seg);
        Ok(ids)
    }

    /// k-NN search on the active backend.
    pub(crate) fn search(&self, query: &[f32], k: usize, ef: usize) -> Vec<(u32, f32)> {
        let view = VectorView {
            arena: &self.arena,
            codes: self.codes.as_ref(),
            kernel: &self.kernel,
        };
        match &self.backend {
            Backend::Flat(flat) => flat.search(query, k, &self.arena, &self.kernel),
            Backend::Graph(graph) => graph.search(query, k, ef, view),
            Backend::Segmented(seg) => seg.search(query, k, ef, view),
        }
    }

    /// Removes a numeric id from the live set (tombstone in graph modes).
    pub(crate) fn delete(&mut self, id: u32) -> bool {
        match &mut self.backend {
            Backend::Flat(flat) => flat.remove(id),
            Backend::Graph(graph) => graph.delete(id),
            Backend::Segmented(seg) => seg.delete(id),
        }
    }

    fn append(&mut self, vector: &[f32]) -> Result<u32> {
        let id = self.arena.append(vector)?;
        if let Some(codes) = &mut self.codes {
            codes.push(vector);
        }
        Ok(id)
    }

    fn migrate_to_graph(&mut self) {
        let params = HnswParams::from_config(&self.config);
        let mut graph = HnswGraph::new(params);

        if let Backend::Flat(flat) = &mut self.backend {
            debug!(population = flat.len(), "migrating flat buffer into graph");
            let view = VectorView {
                arena: &self.arena,
                codes: self.codes.as_ref(),
                kernel: &self.kernel,
            };
            flat.migrate_into(|id| {
                graph.insert(id, view);
            });
        }
        self.backend = Backend::Graph(graph);
    }
}
