//! Public index facade.
//!
//! [`OmenIndex`] owns the adaptive engine, the bidirectional string/numeric
//! id maps, and the in-memory metadata store, and enforces the validation
//! contract: input faults are rejected before any state mutation, so a
//! failed operation leaves the index unchanged.

mod engine;
pub mod flat;
pub mod hnsw;
pub mod topk;

use crate::config::IndexConfig;
use crate::distance::DistanceMetric;
use crate::error::{Error, Result};
use crate::idmap::{ReverseIdMap, StringIdMap};
use crate::storage::{meta, CheckpointFile};
use engine::AdaptiveIndex;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Active backend of the adaptive engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    /// Exact linear scan (small populations).
    Flat,
    /// Monolithic HNSW graph.
    Graph,
    /// Parallel segmented HNSW.
    Segmented,
}

/// Snapshot of index state for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    /// Active backend.
    pub mode: IndexMode,
    /// Live vector count.
    pub live: usize,
    /// Tombstoned (deleted but unreclaimed) count.
    pub tombstones: usize,
    /// Vector dimension.
    pub dimension: usize,
}

struct Inner {
    engine: AdaptiveIndex,
    forward: StringIdMap,
    reverse: ReverseIdMap,
    metadata: FxHashMap<String, Vec<(String, String)>>,
}

/// Embeddable adaptive vector index.
///
/// Construct with [`OmenIndex::new`], then [`init`](OmenIndex::init) with a
/// dimension. [`clear`](OmenIndex::clear) destroys all state; a following
/// `init` may pick a different dimension.
#[derive(Default)]
pub struct OmenIndex {
    inner: Option<Inner>,
}

impl OmenIndex {
    /// Creates an uninitialized index.
    #[must_use]
    pub fn new() -> Self {
        Self { inner: None }
    }

    /// Initializes with the default metric and configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if already initialized, or `Config` for a zero
    /// dimension.
    pub fn init(&mut self, dimension: usize) -> Result<()> {
        self.init_with(dimension, DistanceMetric::default(), IndexConfig::default())
    }

    /// Initializes with an explicit metric and configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if already initialized and `Config` if the
    /// dimension is zero or the configuration is out of range.
    pub fn init_with(
        &mut self,
        dimension: usize,
        metric: DistanceMetric,
        config: IndexConfig,
    ) -> Result<()> {
        if self.inner.is_some() {
            return Err(Error::InvalidInput(
                "index already initialized; call clear() first".into(),
            ));
        }
        if dimension == 0 {
            return Err(Error::Config("dimension must be > 0".into()));
        }
        config.validate()?;

        self.inner = Some(Inner {
            engine: AdaptiveIndex::new(dimension, metric, config),
            forward: StringIdMap::new(),
            reverse: ReverseIdMap::new(),
            metadata: FxHashMap::default(),
        });
        Ok(())
    }

    /// Returns true once `init` has succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    /// Configured dimension, if initialized.
    #[must_use]
    pub fn dimension(&self) -> Option<usize> {
        self.inner.as_ref().map(|i| i.engine.dimension())
    }

    /// Live vector count (zero when uninitialized).
    #[must_use]
    pub fn count(&self) -> u64 {
        self.inner.as_ref().map_or(0, |i| i.engine.len() as u64)
    }

    /// Returns true if the string id is live in the index.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .as_ref()
            .is_some_and(|i| i.forward.get(id).is_some())
    }

    /// Diagnostic snapshot, if initialized.
    #[must_use]
    pub fn stats(&self) -> Option<IndexStats> {
        self.inner.as_ref().map(|i| IndexStats {
            mode: i.engine.mode(),
            live: i.engine.len(),
            tombstones: i.engine.tombstones(),
            dimension: i.engine.dimension(),
        })
    }

    /// Inserts a vector under a caller-supplied unique string id.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `DimensionMismatch`, `InvalidInput` (non-finite
    /// component), `DuplicateId`, or `CapacityExceeded`. All are rejected
    /// before any state changes.
    pub fn insert(&mut self, id: &str, vector: &[f32]) -> Result<()> {
        self.insert_inner(id, vector, None)
    }

    /// Inserts a vector with key/value metadata (stored in memory, keys
    /// sorted; consumed by [`OmenIndex::search_filtered`]).
    ///
    /// # Errors
    ///
    /// Same contract as [`OmenIndex::insert`].
    pub fn insert_with_metadata(
        &mut self,
        id: &str,
        vector: &[f32],
        metadata: Vec<(String, String)>,
    ) -> Result<()> {
        self.insert_inner(id, vector, Some(metadata))
    }

    /// Inserts a batch of vectors; `vectors` is row-major `ids.len() x dim`.
    ///
    /// Returns one success flag per row. Rows with input faults (non-finite
    /// floats, duplicate ids) are skipped; a resource fault aborts the rest
    /// of the batch. A bulk batch of at least `segmented_threshold` rows
    /// into an empty index builds the segmented backend in parallel.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, or `DimensionMismatch` when `vectors` is not
    /// exactly `ids.len() * dimension` floats.
    pub fn insert_batch(&mut self, ids: &[&str], vectors: &[f32]) -> Result<Vec<bool>> {
        let inner = self.inner.as_mut().ok_or(Error::NotInitialized)?;
        let dim = inner.engine.dimension();
        if vectors.len() != ids.len() * dim {
            return Err(Error::DimensionMismatch {
                expected: ids.len() * dim,
                actual: vectors.len(),
            });
        }

        let mut ok = vec![false; ids.len()];

        // Reject input faults row-by-row before touching the engine.
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        let mut valid: Vec<usize> = Vec::with_capacity(ids.len());
        for (row, &sid) in ids.iter().enumerate() {
            let v = &vectors[row * dim..(row + 1) * dim];
            if !v.iter().all(|x| x.is_finite()) {
                continue;
            }
            if inner.forward.get(sid).is_some() || !seen.insert(sid) {
                continue;
            }
            valid.push(row);
        }

        let bulk = inner.engine.len() == 0
            && valid.len() >= inner.engine.config().segmented_threshold;

        if bulk {
            let refs: Vec<&[f32]> = valid
                .iter()
                .map(|&row| &vectors[row * dim..(row + 1) * dim])
                .collect();
            match inner.engine.build_segmented(&refs) {
                Ok(numeric) => {
                    for (&row, nid) in valid.iter().zip(numeric) {
                        inner.forward.insert(ids[row], nid);
                        inner.reverse.insert(nid, ids[row]);
                        ok[row] = true;
                    }
                }
                Err(e) => warn!(error = %e, "bulk build aborted"),
            }
        } else {
            for &row in &valid {
                let v = &vectors[row * dim..(row + 1) * dim];
                match inner.engine.insert(v) {
                    Ok(nid) => {
                        inner.forward.insert(ids[row], nid);
                        inner.reverse.insert(nid, ids[row]);
                        ok[row] = true;
                    }
                    Err(e) => {
                        warn!(error = %e, "batch insert aborted");
                        break;
                    }
                }
            }
        }
        Ok(ok)
    }

    /// k-NN search; returns `(string id, distance)` ascending.
    ///
    /// # Errors
    ///
    /// `NotInitialized`, `DimensionMismatch`, or `InvalidInput` for a
    /// non-finite query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let inner = self.validated_query(query)?;
        let ef = inner.engine.config().ef_search;
        Ok(self.resolve_hits(inner, inner.engine.search(query, k, ef)))
    }

    /// k-NN search with a caller-supplied beam width.
    ///
    /// # Errors
    ///
    /// Same contract as [`OmenIndex::search`].
    pub fn search_with_ef(
        &self,
        query: &[f32],
        k: usize,
        ef_search: usize,
    ) -> Result<Vec<(String, f32)>> {
        let inner = self.validated_query(query)?;
        Ok(self.resolve_hits(inner, inner.engine.search(query, k, ef_search)))
    }

    /// k-NN search post-filtered on metadata equality pairs.
    ///
    /// Candidates are over-fetched (4k + 16) and filtered down, so heavily
    /// selective filters may return fewer than `k` hits.
    ///
    /// # Errors
    ///
    /// Same contract as [`OmenIndex::search`].
    pub fn search_filtered(
        &self,
        query: &[f32],
        k: usize,
        filter: &[(&str, &str)],
    ) -> Result<Vec<(String, f32)>> {
        let inner = self.validated_query(query)?;
        let fetch = k * 4 + 16;
        let ef = inner.engine.config().ef_search.max(fetch);
        let hits = self.resolve_hits(inner, inner.engine.search(query, fetch, ef));

        Ok(hits
            .into_iter()
            .filter(|(sid, _)| {
                let meta = inner.metadata.get(sid);
                filter.iter().all(|&(key, value)| {
                    meta.is_some_and(|pairs| {
                        pairs.iter().any(|(pk, pv)| pk == key && pv == value)
                    })
                })
            })
            .take(k)
            .collect())
    }

    /// Reads back a vector bit-exactly.
    ///
    /// # Errors
    ///
    /// `NotInitialized` or `IdNotFound`.
    pub fn get(&self, id: &str) -> Result<Vec<f32>> {
        let inner = self.inner.as_ref().ok_or(Error::NotInitialized)?;
        let nid = inner
            .forward
            .get(id)
            .ok_or_else(|| Error::IdNotFound(id.into()))?;
        inner
            .engine
            .arena()
            .get(nid)
            .map(<[f32]>::to_vec)
            .ok_or_else(|| Error::IdNotFound(id.into()))
    }

    /// Metadata stored for an id, if any.
    #[must_use]
    pub fn metadata(&self, id: &str) -> Option<&[(String, String)]> {
        self.inner
            .as_ref()
            .and_then(|i| i.metadata.get(id))
            .map(Vec::as_slice)
    }

    /// Tombstones a vector. The payload is reclaimed at the next
    /// checkpoint, which writes live vectors only.
    ///
    /// # Errors
    ///
    /// `NotInitialized` or `IdNotFound`.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        let inner = self.inner.as_mut().ok_or(Error::NotInitialized)?;
        let nid = inner
            .forward
            .remove(id)
            .ok_or_else(|| Error::IdNotFound(id.into()))?;
        inner.engine.delete(nid);
        inner.reverse.remove(nid);
        inner.metadata.remove(id);
        Ok(())
    }

    /// Destroys all state. A following `init` may change the dimension.
    ///
    /// # Errors
    ///
    /// Never fails today; the `Result` keeps the ABI uniform.
    pub fn clear(&mut self) -> Result<()> {
        self.inner = None;
        Ok(())
    }

    /// Writes all live vectors to `<path>.vectors` / `<path>.meta` and
    /// msyncs. Appends a block when the files already hold a compatible
    /// checkpoint; recreates them otherwise. Tombstoned vectors are not
    /// written, so checkpoint doubles as compaction.
    ///
    /// Returns the number of vectors written.
    ///
    /// # Errors
    ///
    /// `NotInitialized` or `Io`.
    pub fn checkpoint(&self, path: impl AsRef<Path>) -> Result<u64> {
        let inner = self.inner.as_ref().ok_or(Error::NotInitialized)?;
        let vec_path = path_with_suffix(path.as_ref(), ".vectors");
        let meta_path = path_with_suffix(path.as_ref(), ".meta");
        let dim = inner.engine.dimension();
        let checksums = inner.engine.config().checksum;

        let mut entries: Vec<(&str, u32)> = inner.forward.iter().collect();
        entries.sort_unstable_by_key(|&(_, nid)| nid);

        if entries.is_empty() {
            CheckpointFile::create(&vec_path, dim, checksums)?;
            meta::truncate(&meta_path)?;
            info!(path = %vec_path.display(), "checkpointed empty index");
            return Ok(0);
        }

        // Drop any incompatible handle before recreating the file.
        let existing = match CheckpointFile::open(&vec_path, checksums) {
            Ok(f) if f.dimension() == dim => Some(f),
            _ => None,
        };
        let (mut ckpt, fresh) = match existing {
            Some(f) => (f, false),
            None => (CheckpointFile::create(&vec_path, dim, checksums)?, true),
        };
        if fresh {
            meta::truncate(&meta_path)?;
        }

        let refs: Vec<&[f32]> = entries
            .iter()
            .map(|&(_, nid)| inner.engine.arena().slot(nid))
            .collect();
        #[allow(clippy::cast_possible_truncation)]
        ckpt.append_block(&refs, entries.len() as u32)?;

        #[allow(clippy::cast_possible_truncation)]
        let table: Vec<(&str, u32)> = entries
            .iter()
            .enumerate()
            .map(|(i, &(sid, _))| (sid, i as u32))
            .collect();
        meta::append_block(&meta_path, &table)?;

        info!(
            count = entries.len(),
            path = %vec_path.display(),
            "checkpoint complete"
        );
        Ok(entries.len() as u64)
    }

    /// Rebuilds the index from a checkpoint, replacing any current state on
    /// success. The graph is reconstructed eagerly by re-insertion; a
    /// recovered population past `segmented_threshold` takes the parallel
    /// bulk path. On failure the in-memory index is left untouched.
    ///
    /// Returns the number of vectors recovered.
    ///
    /// # Errors
    ///
    /// `Io` if the files cannot be read, `Corrupt` for an invalid header.
    pub fn recover(&mut self, path: impl AsRef<Path>) -> Result<u64> {
        let vec_path = path_with_suffix(path.as_ref(), ".vectors");
        let meta_path = path_with_suffix(path.as_ref(), ".meta");

        let ckpt = CheckpointFile::open(&vec_path, true)?;
        let blocks = ckpt.read_blocks();
        let meta_blocks = meta::read_blocks(&meta_path)?;
        if blocks.len() != meta_blocks.len() {
            warn!(
                vector_blocks = blocks.len(),
                meta_blocks = meta_blocks.len(),
                "block count mismatch between companion files; using common prefix"
            );
        }
        let dim = ckpt.dimension();

        // Later blocks override earlier ones per string id (each checkpoint
        // writes the full live set).
        let mut positions = StringIdMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut payloads: Vec<Vec<f32>> = Vec::new();
        for (block, table) in blocks.iter().zip(&meta_blocks) {
            for (sid, index) in table {
                let idx = *index as usize;
                if idx >= block.count {
                    warn!(id = %sid, "meta index out of block range, skipping");
                    continue;
                }
                let floats = block.floats[idx * dim..(idx + 1) * dim].to_vec();
                if !floats.iter().all(|x| x.is_finite()) {
                    warn!(id = %sid, "non-finite payload in checkpoint, skipping");
                    continue;
                }
                #[allow(clippy::cast_possible_truncation)]
                match positions.get(sid) {
                    Some(pos) => payloads[pos as usize] = floats,
                    None => {
                        positions.insert(sid, order.len() as u32);
                        order.push(sid.clone());
                        payloads.push(floats);
                    }
                }
            }
        }

        let (metric, config) = self.inner.as_ref().map_or_else(
            || (DistanceMetric::default(), IndexConfig::default()),
            |i| (i.engine.metric(), i.engine.config().clone()),
        );

        let mut engine = AdaptiveIndex::new(dim, metric, config.clone());
        let mut forward = StringIdMap::new();
        let mut reverse = ReverseIdMap::new();

        if payloads.len() >= config.segmented_threshold {
            let refs: Vec<&[f32]> = payloads.iter().map(Vec::as_slice).collect();
            let numeric = engine.build_segmented(&refs)?;
            for (sid, nid) in order.iter().zip(numeric) {
                forward.insert(sid, nid);
                reverse.insert(nid, sid);
            }
        } else {
            for (sid, v) in order.iter().zip(&payloads) {
                let nid = engine.insert(v)?;
                forward.insert(sid, nid);
                reverse.insert(nid, sid);
            }
        }

        let count = order.len() as u64;
        self.inner = Some(Inner {
            engine,
            forward,
            reverse,
            metadata: FxHashMap::default(),
        });
        info!(count, path = %vec_path.display(), "recovery complete");
        Ok(count)
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn insert_inner(
        &mut self,
        id: &str,
        vector: &[f32],
        metadata: Option<Vec<(String, String)>>,
    ) -> Result<()> {
        let inner = self.inner.as_mut().ok_or(Error::NotInitialized)?;
        let dim = inner.engine.dimension();
        if vector.len() != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }
        if !vector.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidInput(
                "vector contains NaN or infinite components".into(),
            ));
        }
        if inner.forward.get(id).is_some() {
            return Err(Error::DuplicateId(id.into()));
        }

        let nid = inner.engine.insert(vector)?;
        inner.forward.insert(id, nid);
        inner.reverse.insert(nid, id);
        if let Some(mut pairs) = metadata {
            pairs.sort_by(|a, b| a.0.cmp(&b.0));
            inner.metadata.insert(id.to_string(), pairs);
        }
        Ok(())
    }

    fn validated_query(&self, query: &[f32]) -> Result<&Inner> {
        let inner = self.inner.as_ref().ok_or(Error::NotInitialized)?;
        let dim = inner.engine.dimension();
        if query.len() != dim {
            return Err(Error::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }
        if !query.iter().all(|x| x.is_finite()) {
            return Err(Error::InvalidInput("query contains NaN or Inf".into()));
        }
        Ok(inner)
    }

    #[allow(clippy::unused_self)]
    fn resolve_hits(&self, inner: &Inner, hits: Vec<(u32, f32)>) -> Vec<(String, f32)> {
        hits.into_iter()
            .filter_map(|(nid, dist)| inner.reverse.get(nid).map(|sid| (sid.to_string(), dist)))
            .collect()
    }
}

fn path_with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut os = base.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
