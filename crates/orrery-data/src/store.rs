//! Reference-counted tile caches keyed by patch identity.
//!
//! Patches acquire their tile when they are created and release it when they
//! are destroyed. A tile whose last reference goes away stays cached in LRU
//! order until the cache grows past its limit; a job for a tile nobody
//! references any more is cancelled.

use std::collections::VecDeque;
use std::sync::Arc;

use orrery_config::{FilterMode, HeightmapConfig};
use orrery_surface::PatchId;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::heightmap::{HeightmapHandle, HeightmapTile};
use crate::pipeline::{AsyncDataPipeline, JobKey, JobKind, JobPriority, JobRequest, SubmitOutcome};
use crate::tile::{TileHandle, TileRequest};

const MAX_FREE_BUFFERS: usize = 32;

/// Cache bookkeeping shared by the heightmap and texture stores.
#[derive(Debug)]
pub struct TileCache<T> {
    kind: JobKind,
    max_lod: u8,
    max_unused: usize,
    tiles: FxHashMap<PatchId, Arc<T>>,
    refs: FxHashMap<PatchId, usize>,
    pending: FxHashSet<PatchId>,
    failed: FxHashSet<PatchId>,
    unused: VecDeque<PatchId>,
}

impl<T> TileCache<T> {
    /// Cache for `kind` tiles up to `max_lod`, keeping at most `max_unused`
    /// unreferenced tiles around.
    #[must_use]
    pub fn new(kind: JobKind, max_lod: u8, max_unused: usize) -> Self {
        Self {
            kind,
            max_lod,
            max_unused,
            tiles: FxHashMap::default(),
            refs: FxHashMap::default(),
            pending: FxHashSet::default(),
            failed: FxHashSet::default(),
            unused: VecDeque::new(),
        }
    }

    /// Take a reference on `id`'s tile, submitting a job if it does not exist.
    ///
    /// `buffer` supplies the scratch allocation for a new job; it is only
    /// called when a job is actually submitted.
    pub fn acquire(
        &mut self,
        id: &PatchId,
        pipeline: &mut AsyncDataPipeline,
        priority: JobPriority,
        buffer: impl FnOnce() -> Vec<f32>,
    ) -> (TileRequest<T>, Option<Vec<f32>>) {
        *self.refs.entry(*id).or_insert(0) += 1;

        if id.lod > self.max_lod || self.failed.contains(id) {
            return (TileRequest::Inherit, None);
        }
        if let Some(tile) = self.tiles.get(id) {
            let handle = TileHandle::new(*id, Arc::clone(tile));
            self.unused.retain(|u| u != id);
            return (TileRequest::Ready(handle), None);
        }
        if self.pending.contains(id) {
            return (TileRequest::Pending, None);
        }

        let key = JobKey { id: *id, kind: self.kind };
        self.pending.insert(*id);
        let returned = match pipeline.submit(JobRequest::new(key, priority, buffer())) {
            SubmitOutcome::Queued => None,
            SubmitOutcome::Coalesced(unused) => Some(unused),
        };
        (TileRequest::Pending, returned)
    }

    /// Store a finished tile. Returns a handle to it and any tiles evicted to
    /// make room.
    pub fn insert(&mut self, id: PatchId, tile: T) -> (TileHandle<T>, Vec<Arc<T>>) {
        self.pending.remove(&id);
        let tile = Arc::new(tile);
        self.tiles.insert(id, Arc::clone(&tile));
        let mut evicted = Vec::new();
        if self.refs.get(&id).copied().unwrap_or(0) == 0 {
            self.unused.retain(|u| *u != id);
            self.unused.push_back(id);
            self.evict(&mut evicted);
        }
        (TileHandle::new(id, tile), evicted)
    }

    /// The job for `id` failed for good; its patch keeps ancestor data.
    pub fn mark_failed(&mut self, id: PatchId) {
        self.pending.remove(&id);
        self.failed.insert(id);
    }

    /// Drop a reference. The last release cancels a pending job and moves a
    /// cached tile to the LRU list. Returns evicted tiles.
    pub fn release(&mut self, id: &PatchId, pipeline: &mut AsyncDataPipeline) -> Vec<Arc<T>> {
        let mut evicted = Vec::new();
        let Some(count) = self.refs.get_mut(id) else {
            return evicted;
        };
        *count = count.saturating_sub(1);
        if *count > 0 {
            return evicted;
        }
        self.refs.remove(id);
        if self.pending.remove(id) {
            pipeline.cancel(&JobKey { id: *id, kind: self.kind });
        }
        if self.tiles.contains_key(id) {
            self.unused.push_back(*id);
            self.evict(&mut evicted);
        }
        evicted
    }

    fn evict(&mut self, evicted: &mut Vec<Arc<T>>) {
        while self.unused.len() > self.max_unused {
            let Some(id) = self.unused.pop_front() else {
                break;
            };
            if let Some(tile) = self.tiles.remove(&id) {
                trace!(patch = %id, "evicted tile");
                evicted.push(tile);
            }
        }
    }

    /// Own tile of `id`, or the nearest cached ancestor's tile windowed down to `id`.
    #[must_use]
    pub fn handle_for(&self, id: &PatchId) -> Option<TileHandle<T>> {
        (0..=id.lod).rev().find_map(|lod| {
            let owner = id.ancestor_at(lod);
            self.tiles
                .get(&owner)
                .map(|tile| TileHandle::new(owner, Arc::clone(tile)).derive_descendant(&owner, id))
        })
    }

    #[must_use]
    pub fn contains(&self, id: &PatchId) -> bool {
        self.tiles.contains_key(id)
    }

    #[must_use]
    pub fn is_pending(&self, id: &PatchId) -> bool {
        self.pending.contains(id)
    }

    #[must_use]
    pub fn is_failed(&self, id: &PatchId) -> bool {
        self.failed.contains(id)
    }

    #[must_use]
    pub fn ref_count(&self, id: &PatchId) -> usize {
        self.refs.get(id).copied().unwrap_or(0)
    }

    /// Cached tiles, referenced or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Cached tiles no patch references.
    #[must_use]
    pub fn unused_len(&self) -> usize {
        self.unused.len()
    }
}

/// Heightmap cache plus a pool of recycled texel buffers.
#[derive(Debug)]
pub struct HeightmapStore {
    config: HeightmapConfig,
    placeholder: Arc<HeightmapTile>,
    cache: TileCache<HeightmapTile>,
    free_buffers: Vec<Vec<f32>>,
}

impl HeightmapStore {
    #[must_use]
    pub fn new(config: HeightmapConfig) -> Self {
        let placeholder = Arc::new(HeightmapTile::placeholder(&config));
        let cache = TileCache::new(
            JobKind::Heightmap,
            config.max_heightmap_lod,
            config.max_cached_tiles,
        );
        Self {
            config,
            placeholder,
            cache,
            free_buffers: Vec::new(),
        }
    }

    /// Take a reference on `id`'s heightmap and request it if needed.
    pub fn get_or_create(
        &mut self,
        id: &PatchId,
        pipeline: &mut AsyncDataPipeline,
        distance: f64,
    ) -> TileRequest<HeightmapTile> {
        let priority = JobPriority::new(distance, id.lod);
        let free = &mut self.free_buffers;
        let (request, returned) = self
            .cache
            .acquire(id, pipeline, priority, || free.pop().unwrap_or_default());
        if let Some(buffer) = returned {
            self.recycle(buffer);
        }
        request
    }

    /// Store a generated heightmap and hand back its handle.
    pub fn insert(&mut self, id: PatchId, tile: HeightmapTile) -> HeightmapHandle {
        let (handle, evicted) = self.cache.insert(id, tile);
        self.reclaim(evicted);
        handle
    }

    pub fn mark_failed(&mut self, id: PatchId) {
        self.cache.mark_failed(id);
    }

    /// Drop a reference taken by [`get_or_create`](Self::get_or_create).
    pub fn release(&mut self, id: &PatchId, pipeline: &mut AsyncDataPipeline) {
        let evicted = self.cache.release(id, pipeline);
        self.reclaim(evicted);
    }

    fn reclaim(&mut self, evicted: Vec<Arc<HeightmapTile>>) {
        for tile in evicted {
            if let Ok(tile) = Arc::try_unwrap(tile) {
                self.recycle(tile.into_buffer());
            }
        }
    }

    fn recycle(&mut self, mut buffer: Vec<f32>) {
        if self.free_buffers.len() < MAX_FREE_BUFFERS && buffer.capacity() > 0 {
            buffer.clear();
            self.free_buffers.push(buffer);
        }
    }

    /// Best heightmap for `id`: its own, an ancestor's window, or the placeholder.
    #[must_use]
    pub fn handle_for(&self, id: &PatchId) -> HeightmapHandle {
        self.cache.handle_for(id).unwrap_or_else(|| {
            let root = id.ancestor_at(0);
            TileHandle::new(root, Arc::clone(&self.placeholder)).derive_descendant(&root, id)
        })
    }

    /// Height at patch-local `(u, v)` through the best available data.
    #[must_use]
    pub fn sample(&self, id: &PatchId, u: f64, v: f64) -> f64 {
        self.handle_for(id).sample(u, v, self.config.filter)
    }

    #[must_use]
    pub fn filter(&self) -> FilterMode {
        self.config.filter
    }

    #[must_use]
    pub fn config(&self) -> &HeightmapConfig {
        &self.config
    }

    #[must_use]
    pub fn cache(&self) -> &TileCache<HeightmapTile> {
        &self.cache
    }

    #[must_use]
    pub fn free_buffer_count(&self) -> usize {
        self.free_buffers.len()
    }
}
