//! A body covered by one patch quadtree per face.
//!
//! Each frame [`PatchedShape::update`] folds finished data jobs into the tree,
//! refreshes visibility, builds the frame's [`ApplyPlan`] and applies it:
//! `show_children`, `split`, `instantiate`, `show`, `remove`, `merge`, in that
//! order. Splits and merges keep the neighbor sets of all leaves current, and
//! tessellation levels are recomputed from them before the frame ends.
//!
//! A parent keeps covering its area until all four children have their data,
//! and children keep covering theirs until a merging parent has its own.

use std::sync::Arc;

use glam::{DMat4, DVec3};
use orrery_config::{Config, PatchConfig};
use orrery_data::{
    AsyncDataPipeline, Completion, DataJobError, HeightSource, HeightmapHandle, HeightmapStore,
    JobKind, JobPayload, PipelineStats, ProceduralGenerator, TextureHandle, TextureSource,
    TextureStore, TileGenerator, TileRequest, height_range,
};
use orrery_surface::{AnySurface, GeometrySurface, PatchId, Quadrant, Side, SurfaceCoord};
use rustc_hash::FxHashMap;
use tracing::{debug, debug_span, info, trace, warn};

use crate::arena::{PatchArena, PatchHandle};
use crate::camera::{BodyPose, CameraState};
use crate::controller::{AppearanceHint, LodController};
use crate::error::ShapeError;
use crate::node::{InstanceTask, PatchNode};
use crate::plan::{ApplyPlan, PlanBuilder};
use crate::renderable::{RenderablePatch, SurfaceFrame};
use crate::visibility::VisibilityTester;

/// Counters describing the tree after the last update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShapeStats {
    pub frame: u64,
    pub nodes: usize,
    pub leaves: usize,
    pub shown: usize,
    /// Splits applied since creation.
    pub splits: u64,
    /// Merges completed since creation.
    pub merges: u64,
    pub pending_jobs: usize,
}

pub struct PatchedShape<S = AnySurface> {
    surface: S,
    radius: f64,
    config: PatchConfig,
    controller: LodController,
    arena: PatchArena,
    roots: Vec<PatchHandle>,
    index: FxHashMap<PatchId, PatchHandle>,
    heightmaps: HeightmapStore,
    textures: TextureStore,
    pipeline: AsyncDataPipeline,
    model: DMat4,
    frame: u64,
    splits: u64,
    merges: u64,
}

impl PatchedShape<AnySurface> {
    /// Shape of the configured family and radius with procedural heightmaps.
    pub fn from_config(
        config: &Config,
        heights: Arc<dyn HeightSource>,
        texture: Option<Arc<dyn TextureSource>>,
    ) -> Result<Self, ShapeError> {
        let surface = AnySurface::from_config(&config.shape);
        Self::new(surface, config.shape.radius, config, heights, texture)
    }
}

impl<S: GeometrySurface + Clone + 'static> PatchedShape<S> {
    /// Shape whose heightmaps come from `heights` and textures from `texture`.
    pub fn new(
        surface: S,
        radius: f64,
        config: &Config,
        heights: Arc<dyn HeightSource>,
        texture: Option<Arc<dyn TextureSource>>,
    ) -> Result<Self, ShapeError> {
        let generator = Arc::new(ProceduralGenerator::new(
            surface.clone(),
            heights,
            texture.clone(),
            config.heightmap.clone(),
        ));
        Self::with_generator(surface, radius, config, generator, texture)
    }

    /// Shape fed by an arbitrary tile generator.
    ///
    /// `texture` only tells the shape whether textures exist and how to judge
    /// splits; the tiles themselves come from `generator`.
    pub fn with_generator(
        surface: S,
        radius: f64,
        config: &Config,
        generator: Arc<dyn TileGenerator>,
        texture: Option<Arc<dyn TextureSource>>,
    ) -> Result<Self, ShapeError> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(ShapeError::InvalidRadius(radius));
        }
        let mut patch = config.patch.clone();
        patch.validate();

        let pipeline = AsyncDataPipeline::new(&config.pipeline, generator)?;
        let heightmaps = HeightmapStore::new(config.heightmap.clone());
        let textures = TextureStore::new(texture, config.heightmap.max_cached_tiles);

        let mut shape = Self {
            controller: LodController::new(&patch),
            surface,
            radius,
            config: patch,
            arena: PatchArena::new(),
            roots: Vec::new(),
            index: FxHashMap::default(),
            heightmaps,
            textures,
            pipeline,
            model: DMat4::IDENTITY,
            frame: 0,
            splits: 0,
            merges: 0,
        };

        let family = shape.surface.family();
        for face in 0..shape.surface.face_count() {
            let root = shape.create_node(PatchId::root(family, face), None, 1.0, 0.0);
            shape.roots.push(root);
        }
        shape.link_roots();
        shape.pipeline.pump();

        info!(
            ?family,
            radius,
            faces = shape.roots.len(),
            base_density = shape.config.base_density,
            max_lod = shape.config.max_lod,
            "patched shape created"
        );
        Ok(shape)
    }

    /// Advance one frame. Never blocks on data jobs.
    pub fn update(&mut self, camera: &CameraState, pose: &BodyPose) -> ApplyPlan {
        let span = debug_span!("shape_update", frame = self.frame + 1);
        let _guard = span.enter();

        self.apply_completions();
        self.frame += 1;
        self.model = pose.model();
        self.update_visibility(camera, pose);
        for (_, node) in self.arena.iter_mut() {
            let ready = node.data_ready();
            node.instance.poll(ready);
        }
        self.update_merge_streaks();

        let plan = self.build_plan().finish(self.config.split_budget_per_frame);
        if plan.deferred_splits > 0 {
            let error = DataJobError::BudgetExceeded {
                requested: plan.split.len() + plan.deferred_splits,
                budget: self.config.split_budget_per_frame,
            };
            trace!(%error, "deferring splits to the next frame");
        }
        self.apply(&plan);
        self.update_tessellation();
        self.pipeline.pump();

        if !plan.is_empty() {
            debug!(
                show_children = plan.show_children.len(),
                split = plan.split.len(),
                instantiate = plan.instantiate.len(),
                show = plan.show.len(),
                remove = plan.remove.len(),
                merge = plan.merge.len(),
                "applied plan"
            );
        }
        plan
    }

    // --- Data ---

    fn apply_completions(&mut self) {
        for completion in self.pipeline.drain() {
            match completion {
                Completion::Ready {
                    key,
                    payload: JobPayload::Heightmap(tile),
                    elapsed,
                } => {
                    trace!(patch = %key.id, ?elapsed, "heightmap ready");
                    let handle = self.heightmaps.insert(key.id, tile);
                    self.on_heightmap(key.id, Some(handle));
                }
                Completion::Ready {
                    key,
                    payload: JobPayload::Texture(tile),
                    ..
                } => {
                    let handle = self.textures.insert(key.id, tile);
                    self.on_texture(key.id, Some(handle));
                }
                Completion::Failed { key, error } => {
                    debug!(patch = %key.id, %error, "keeping ancestor data");
                    match key.kind {
                        JobKind::Heightmap => {
                            self.heightmaps.mark_failed(key.id);
                            self.on_heightmap(key.id, None);
                        }
                        JobKind::Texture => {
                            self.textures.mark_failed(key.id);
                            self.on_texture(key.id, None);
                        }
                    }
                }
            }
        }
    }

    /// Node currently holding `id`. Identities of another shape are a bug.
    fn live_handle(&self, id: &PatchId) -> Option<PatchHandle> {
        let valid = id.family == self.surface.family() && id.face < self.surface.face_count();
        if !valid {
            let error = DataJobError::InvalidPatchIdentity { id: *id };
            debug_assert!(valid, "{error}");
            warn!(%error, "ignoring completion");
            return None;
        }
        let handle = self.index.get(id).copied();
        if handle.is_none() {
            trace!(patch = %id, "completion for a destroyed patch");
        }
        handle
    }

    fn on_heightmap(&mut self, id: PatchId, handle: Option<HeightmapHandle>) {
        let Some(h) = self.live_handle(&id) else {
            return;
        };
        let radius = self.radius;
        let ratio = self.config.max_height_ratio;
        let filter = self.heightmaps.filter();
        let surface = &self.surface;
        let Some(node) = self.arena.get_mut(h) else {
            return;
        };
        if let Some(handle) = handle {
            node.heightmap = handle;
        }
        node.heightmap_ready = true;
        if node.lod() == 0 && radius > 0.0 {
            node.average_height = (radius + node.heightmap.corner_average(filter)) / radius;
        }
        node.update_geometry(surface, radius, ratio);
    }

    fn on_texture(&mut self, id: PatchId, handle: Option<TextureHandle>) {
        let Some(h) = self.live_handle(&id) else {
            return;
        };
        if let Some(node) = self.arena.get_mut(h) {
            if handle.is_some() {
                node.texture = handle;
            }
            node.texture_ready = true;
        }
    }

    fn average_height_for(&self, height: f64) -> f64 {
        if self.radius > 0.0 {
            (self.radius + height) / self.radius
        } else {
            1.0
        }
    }

    /// Allocate a node and request its data. `distance` orders the jobs.
    fn create_node(
        &mut self,
        id: PatchId,
        parent: Option<PatchHandle>,
        average_height: f64,
        distance: f64,
    ) -> PatchHandle {
        let (heightmap, heightmap_ready) =
            match self.heightmaps.get_or_create(&id, &mut self.pipeline, distance) {
                TileRequest::Ready(handle) => (handle, true),
                TileRequest::Pending => (self.heightmaps.handle_for(&id), false),
                TileRequest::Inherit => (self.heightmaps.handle_for(&id), true),
            };
        let (texture, texture_ready) =
            match self.textures.get_or_create(&id, &mut self.pipeline, distance) {
                TileRequest::Ready(handle) => (Some(handle), true),
                TileRequest::Pending => (self.textures.handle_for(&id), false),
                TileRequest::Inherit => (self.textures.handle_for(&id), true),
            };

        let mut node = PatchNode::new(
            id,
            parent,
            self.config.base_density,
            average_height,
            heightmap,
        );
        node.heightmap_ready = heightmap_ready;
        node.texture = texture;
        node.texture_ready = texture_ready;
        node.update_geometry(&self.surface, self.radius, self.config.max_height_ratio);

        let handle = self.arena.insert(node);
        self.index.insert(id, handle);
        handle
    }

    /// Release a node's data and drop it from the tree, children first.
    fn destroy(&mut self, handle: PatchHandle) {
        let Some(node) = self.arena.remove(handle) else {
            return;
        };
        if let Some(children) = node.children {
            for child in children {
                self.destroy(child);
            }
        }
        self.index.remove(&node.id);
        self.heightmaps.release(&node.id, &mut self.pipeline);
        self.textures.release(&node.id, &mut self.pipeline);
        self.pipeline.cancel_subtree(&node.id);
    }

    fn hint(&self, id: &PatchId) -> AppearanceHint {
        AppearanceHint {
            tile_size: self.textures.tile_size(),
            can_split: self.textures.can_split(id),
        }
    }

    // --- Visibility and planning ---

    fn update_visibility(&mut self, camera: &CameraState, pose: &BodyPose) {
        let camera_local = pose.to_local(camera.position);
        let ground = self.get_height_at(camera_local).unwrap_or(self.radius);
        let lowest = self.radius + height_range(self.heightmaps.config()).0;
        let tester =
            VisibilityTester::new(&self.surface, &self.config, camera, pose, ground, lowest);

        let surface = &self.surface;
        let radius = self.radius;
        for (_, node) in self.arena.iter_mut() {
            node.visibility(&tester, surface.patch_length(radius, node.lod()));
        }
    }

    fn parent_merging(&self, node: &PatchNode) -> bool {
        node.parent
            .and_then(|p| self.arena.get(p))
            .is_some_and(|p| p.merge_pending)
    }

    fn should_split(&self, node: &PatchNode) -> bool {
        node.is_leaf()
            && node.visible
            && node.heightmap_ready
            && !node.split_pending
            && !node.parent_split_pending
            && !self.parent_merging(node)
            && self.controller.should_split(node, self.hint(&node.id))
    }

    /// Whether every child of `parent` is a leaf that wants to merge this frame.
    fn merge_wanted(&self, children: &[PatchHandle; 4]) -> bool {
        children.iter().all(|&c| {
            self.arena.get(c).is_some_and(|child| {
                child.is_leaf() && self.controller.should_merge(child, self.hint(&child.id))
            })
        })
    }

    /// Extends or resets each parent's run of frames in which a merge was wanted.
    fn update_merge_streaks(&mut self) {
        let wanted: Vec<(PatchHandle, bool)> = self
            .arena
            .iter()
            .filter_map(|(h, node)| node.children.map(|children| (h, self.merge_wanted(&children))))
            .collect();
        for (h, wanted) in wanted {
            if let Some(node) = self.arena.get_mut(h) {
                node.merge_streak = if wanted { node.merge_streak + 1 } else { 0 };
            }
        }
    }

    /// A merge needs the wish to have held for the whole hysteresis window,
    /// and the parent must not have split inside that window either.
    fn should_merge(&self, parent: &PatchNode) -> bool {
        let window = self.config.merge_hysteresis_frames;
        let settled = parent
            .last_split_frame
            .is_none_or(|at| self.frame.saturating_sub(at) >= window);
        settled && parent.merge_streak >= window.max(1)
    }

    fn children_ready(&self, children: &[PatchHandle; 4]) -> bool {
        children
            .iter()
            .all(|&c| self.arena.get(c).is_some_and(PatchNode::instance_ready))
    }

    fn build_plan(&self) -> PlanBuilder {
        let mut plan = PlanBuilder::default();
        for (_, node) in self.arena.iter() {
            let entry = (node.distance, node.id);
            match node.children {
                Some(children) if node.split_pending => {
                    if self.children_ready(&children) {
                        plan.show_children.push(entry);
                    } else if !node.shown {
                        // Cover the area until the children are ready.
                        match node.instance {
                            InstanceTask::Idle => plan.instantiate.push(entry),
                            InstanceTask::Settled => plan.show.push(entry),
                            InstanceTask::Pending => {}
                        }
                    }
                }
                Some(_) if node.merge_pending => {
                    if node.instance_ready() {
                        plan.show.push(entry);
                    }
                }
                Some(_) => {
                    if self.should_merge(node) {
                        plan.merge.push(entry);
                    }
                }
                None => {
                    if self.should_split(node) {
                        plan.split.push(entry);
                    }
                    if node.parent_split_pending {
                        continue;
                    }
                    if LodController::should_instantiate(node) {
                        match node.instance {
                            InstanceTask::Idle => plan.instantiate.push(entry),
                            InstanceTask::Settled => plan.show.push(entry),
                            InstanceTask::Pending => {}
                        }
                    } else if LodController::should_remove(node) {
                        plan.remove.push(entry);
                    }
                }
            }
        }
        plan
    }

    // --- Applying the plan ---

    fn apply(&mut self, plan: &ApplyPlan) {
        for id in &plan.show_children {
            if let Some(h) = self.index.get(id).copied() {
                self.show_children(h);
            }
        }
        for id in &plan.split {
            if let Some(h) = self.index.get(id).copied() {
                self.split(h);
            }
        }
        for id in &plan.instantiate {
            if let Some(node) = self.index.get(id).and_then(|&h| self.arena.get_mut(h)) {
                if node.instance == InstanceTask::Idle {
                    node.instance = InstanceTask::Pending;
                }
            }
        }
        for id in &plan.show {
            if let Some(h) = self.index.get(id).copied() {
                self.show(h);
            }
        }
        for id in &plan.remove {
            if let Some(node) = self.index.get(id).and_then(|&h| self.arena.get_mut(h)) {
                if node.is_leaf() && !node.parent_split_pending && node.lod() != 0 {
                    node.shown = false;
                    node.instance = InstanceTask::Idle;
                }
            }
        }
        for id in &plan.merge {
            if let Some(h) = self.index.get(id).copied() {
                self.begin_merge(h);
            }
        }
    }

    fn show_children(&mut self, h: PatchHandle) {
        let Some(node) = self.arena.get(h) else {
            return;
        };
        let Some(children) = node.children else {
            return;
        };
        if !node.split_pending || !self.children_ready(&children) {
            return;
        }
        for c in children {
            if let Some(child) = self.arena.get_mut(c) {
                child.shown = true;
                child.parent_split_pending = false;
            }
        }
        if let Some(node) = self.arena.get_mut(h) {
            node.shown = false;
            node.instance = InstanceTask::Idle;
            node.split_pending = false;
            trace!(patch = %node.id, "children shown");
        }
    }

    fn split(&mut self, h: PatchHandle) {
        let Some(node) = self.arena.get(h) else {
            return;
        };
        if !node.is_leaf() || node.split_pending {
            return;
        }
        let id = node.id;
        let distance = node.distance;
        let filter = self.heightmaps.filter();
        let averages = Quadrant::ALL.map(|q| {
            let (cx, cy) = q.corner();
            self.average_height_for(node.heightmap.sample(cx + 0.25, cy + 0.25, filter))
        });

        let children = Quadrant::ALL.map(|q| {
            let child = self.create_node(id.child(q), Some(h), averages[q.index()], distance);
            if let Some(c) = self.arena.get_mut(child) {
                c.instance = InstanceTask::Pending;
                c.parent_split_pending = true;
            }
            child
        });
        if let Some(node) = self.arena.get_mut(h) {
            node.children = Some(children);
            node.split_pending = true;
            node.last_split_frame = Some(self.frame);
            node.merge_streak = 0;
        }
        self.splice_split(h, children);
        self.splits += 1;
        debug!(patch = %id, "split");
    }

    fn show(&mut self, h: PatchHandle) {
        let Some(node) = self.arena.get(h) else {
            return;
        };
        if !node.instance_ready() {
            return;
        }
        if node.merge_pending {
            self.finish_merge(h);
            return;
        }
        let showable = if node.is_leaf() {
            !node.parent_split_pending
        } else {
            node.split_pending
        };
        if showable && !node.shown {
            if let Some(node) = self.arena.get_mut(h) {
                node.shown = true;
            }
        }
    }

    fn begin_merge(&mut self, h: PatchHandle) {
        let Some(node) = self.arena.get(h) else {
            return;
        };
        let Some(children) = node.children else {
            return;
        };
        let all_leaves = children
            .iter()
            .all(|&c| self.arena.get(c).is_some_and(PatchNode::is_leaf));
        if node.split_pending || node.merge_pending || !all_leaves {
            return;
        }
        if let Some(node) = self.arena.get_mut(h) {
            node.merge_pending = true;
            if node.instance == InstanceTask::Idle {
                node.instance = InstanceTask::Pending;
            }
            trace!(patch = %node.id, "merge started");
        }
    }

    fn finish_merge(&mut self, h: PatchHandle) {
        let Some(children) = self.arena.get(h).and_then(|n| n.children) else {
            return;
        };
        self.splice_merge(h, children);
        for child in children {
            self.destroy(child);
        }
        if let Some(node) = self.arena.get_mut(h) {
            node.children = None;
            node.merge_pending = false;
            node.merge_streak = 0;
            node.shown = true;
            debug!(patch = %node.id, "merged");
        }
        self.merges += 1;
    }

    // --- Adjacency ---

    fn shares(&self, a: PatchHandle, side: Side, b: PatchHandle) -> bool {
        match (self.arena.get(a), self.arena.get(b)) {
            (Some(na), Some(nb)) => {
                self.surface
                    .shares_edge(na.id.face, &na.bounds, side, nb.id.face, &nb.bounds)
            }
            _ => false,
        }
    }

    fn link_roots(&mut self) {
        let roots = self.roots.clone();
        for &a in &roots {
            let sets = Side::ALL.map(|side| {
                roots
                    .iter()
                    .copied()
                    .filter(|&b| self.shares(a, side, b))
                    .collect::<Vec<_>>()
            });
            if let Some(node) = self.arena.get_mut(a) {
                node.neighbors = sets;
            }
        }
    }

    /// Hand the parent's neighbors to its new children and point the outside
    /// leaves at the children instead of the parent.
    fn splice_split(&mut self, parent: PatchHandle, children: [PatchHandle; 4]) {
        let Some(node) = self.arena.get_mut(parent) else {
            return;
        };
        let old = std::mem::take(&mut node.neighbors);

        for &child in &children {
            let sets = Side::ALL.map(|side| {
                let mut set: Vec<PatchHandle> = Vec::new();
                let outside = old[side.index()]
                    .iter()
                    .flat_map(|&n| if n == parent { children.to_vec() } else { vec![n] });
                for candidate in outside.chain(children) {
                    if !set.contains(&candidate) && self.shares(child, side, candidate) {
                        set.push(candidate);
                    }
                }
                set
            });
            if let Some(c) = self.arena.get_mut(child) {
                c.neighbors = sets;
            }
        }

        let mut external: Vec<PatchHandle> =
            old.iter().flatten().copied().filter(|&n| n != parent).collect();
        external.sort_unstable();
        external.dedup();
        for ext in external {
            for side in Side::ALL {
                let links_parent = self
                    .arena
                    .get(ext)
                    .is_some_and(|n| n.neighbors_on(side).contains(&parent));
                if !links_parent {
                    continue;
                }
                let added: Vec<PatchHandle> = children
                    .iter()
                    .copied()
                    .filter(|&c| self.shares(ext, side, c))
                    .collect();
                if let Some(n) = self.arena.get_mut(ext) {
                    let set = &mut n.neighbors[side.index()];
                    set.retain(|&x| x != parent);
                    for c in added {
                        if !set.contains(&c) {
                            set.push(c);
                        }
                    }
                }
            }
        }
    }

    /// Inverse of [`splice_split`](Self::splice_split): the parent takes over
    /// its children's outside neighbors.
    fn splice_merge(&mut self, parent: PatchHandle, children: [PatchHandle; 4]) {
        let mut external: Vec<PatchHandle> = Vec::new();
        for &c in &children {
            if let Some(child) = self.arena.get(c) {
                for &n in child.neighbors.iter().flatten() {
                    if !children.contains(&n) && !external.contains(&n) {
                        external.push(n);
                    }
                }
            }
        }

        let sets = Side::ALL.map(|side| {
            external
                .iter()
                .copied()
                .chain([parent])
                .filter(|&n| self.shares(parent, side, n))
                .collect::<Vec<_>>()
        });
        if let Some(node) = self.arena.get_mut(parent) {
            node.neighbors = sets;
        }

        for ext in external {
            for side in Side::ALL {
                let links_child = self
                    .arena
                    .get(ext)
                    .is_some_and(|n| n.neighbors_on(side).iter().any(|x| children.contains(x)));
                if !links_child {
                    continue;
                }
                let adjacent = self.shares(ext, side, parent);
                if let Some(n) = self.arena.get_mut(ext) {
                    let set = &mut n.neighbors[side.index()];
                    set.retain(|x| !children.contains(x));
                    if adjacent && !set.contains(&parent) {
                        set.push(parent);
                    }
                }
            }
        }
    }

    /// Coarsest lod across `side`. A parent still covering for its children
    /// looks at their outside neighbors.
    fn min_neighbor_lod(&self, node: &PatchNode, side: Side) -> Option<u8> {
        match node.children {
            None => node
                .neighbors_on(side)
                .iter()
                .filter_map(|&n| self.arena.get(n))
                .map(PatchNode::lod)
                .min(),
            Some(children) => children
                .iter()
                .filter_map(|&c| self.arena.get(c))
                .flat_map(|c| c.neighbors_on(side).iter().copied())
                .filter(|n| !children.contains(n))
                .filter_map(|n| self.arena.get(n))
                .map(PatchNode::lod)
                .min(),
        }
    }

    fn update_tessellation(&mut self) {
        let base = self.config.base_density;
        let levels: Vec<(PatchHandle, [u32; 4])> = self
            .arena
            .iter()
            .filter(|(_, n)| n.is_leaf() || (n.split_pending && n.shown))
            .map(|(h, n)| {
                let outer = Side::ALL.map(|side| {
                    let min_lod = self.min_neighbor_lod(n, side).unwrap_or(n.lod());
                    PatchNode::outer_level(base, n.lod(), min_lod)
                });
                (h, outer)
            })
            .collect();
        for (h, outer) in levels {
            if let Some(node) = self.arena.get_mut(h) {
                node.tess_inner = base;
                node.tess_outer = outer;
            }
        }
    }

    // --- Queries ---

    fn find_handle_at(&self, coord: SurfaceCoord) -> Option<PatchHandle> {
        let mut current = self
            .roots
            .iter()
            .copied()
            .find(|&h| self.arena.get(h).is_some_and(|n| n.id.face == coord.face))?;
        loop {
            let Some(children) = self.arena.get(current)?.children else {
                return Some(current);
            };
            let next = children.into_iter().find(|&c| {
                self.arena
                    .get(c)
                    .is_some_and(|n| n.bounds.contains(coord.x, coord.y))
            });
            match next {
                Some(next) => current = next,
                None => return Some(current),
            }
        }
    }

    /// Deepest patch containing `coord`.
    #[must_use]
    pub fn find_patch_at(&self, coord: SurfaceCoord) -> Option<&PatchNode> {
        self.find_handle_at(coord).and_then(|h| self.arena.get(h))
    }

    /// Distance from the body centre to the terrain along a body-local
    /// direction (for flat tiles: terrain height under a local point).
    #[must_use]
    pub fn get_height_at(&self, direction: DVec3) -> Option<f64> {
        let coord = self.surface.surface_coord(direction)?;
        let node = self.find_patch_at(coord)?;
        let (u, v) = node.coord_to_uv(coord.x, coord.y);
        Some(self.radius + node.heightmap.sample(u, v, self.heightmaps.filter()))
    }

    /// Frame of the displaced surface along a body-local direction, from
    /// central differences of the terrain around it.
    #[must_use]
    pub fn get_normal_at(&self, direction: DVec3) -> Option<SurfaceFrame> {
        let coord = self.surface.surface_coord(direction)?;
        let node = self.find_patch_at(coord)?;
        let b = node.bounds;
        let step = 0.5 * b.width() / f64::from(self.config.base_density);
        let filter = self.heightmaps.filter();
        let point = |x: f64, y: f64| {
            let x = x.clamp(b.x0, b.x1);
            let y = y.clamp(b.y0, b.y1);
            let (u, v) = b.coord_to_uv(x, y);
            let height = node.heightmap.sample(u, v, filter);
            self.surface
                .surface_point(self.radius + height, coord.face, x, y)
        };
        let du = point(coord.x + step, coord.y) - point(coord.x - step, coord.y);
        let dv = point(coord.x, coord.y + step) - point(coord.x, coord.y - step);

        let up = self.surface.surface_normal(coord.face, coord.x, coord.y);
        let mut normal = du.cross(dv).try_normalize().unwrap_or(up);
        if normal.dot(up) < 0.0 {
            normal = -normal;
        }
        let tangent = (du - normal * du.dot(normal))
            .try_normalize()
            .unwrap_or_else(|| normal.any_orthonormal_vector());
        let binormal = normal.cross(tangent);
        Some(SurfaceFrame {
            normal,
            tangent,
            binormal,
        })
    }

    /// Shown patches in identity order, with the pose of the last update.
    #[must_use]
    pub fn renderables(&self) -> Vec<RenderablePatch> {
        let mut out: Vec<RenderablePatch> = self
            .arena
            .iter()
            .filter(|(_, n)| n.shown)
            .map(|(_, n)| RenderablePatch {
                id: n.id,
                world_transform: if self.config.shift_patch_origin {
                    self.model * DMat4::from_translation(n.centre)
                } else {
                    self.model
                },
                tess_inner: n.tess_inner,
                tess_outer: n.tess_outer,
                texture_offset: n.heightmap.offset,
                texture_scale: n.heightmap.scale,
                heightmap: n.heightmap.clone(),
                texture: n.texture.clone(),
                aabb: n.world_aabb,
            })
            .collect();
        out.sort_by_key(|r| r.id);
        out
    }

    #[must_use]
    pub fn node(&self, id: &PatchId) -> Option<&PatchNode> {
        self.index.get(id).and_then(|&h| self.arena.get(h))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PatchNode> {
        self.arena.iter().map(|(_, n)| n)
    }

    /// Identities of the leaves across `side` of `id`.
    #[must_use]
    pub fn neighbor_ids(&self, id: &PatchId, side: Side) -> Vec<PatchId> {
        self.node(id).map_or_else(Vec::new, |n| {
            n.neighbors_on(side)
                .iter()
                .filter_map(|&h| self.arena.get(h))
                .map(|n| n.id)
                .collect()
        })
    }

    #[must_use]
    pub fn children_of(&self, id: &PatchId) -> Option<[PatchId; 4]> {
        let children = self.node(id)?.children?;
        let mut ids = [*id; 4];
        for (slot, h) in ids.iter_mut().zip(children) {
            *slot = self.arena.get(h)?.id;
        }
        Some(ids)
    }

    #[must_use]
    pub fn root_ids(&self) -> Vec<PatchId> {
        self.roots
            .iter()
            .filter_map(|&h| self.arena.get(h))
            .map(|n| n.id)
            .collect()
    }

    /// Leaf identities, sorted.
    #[must_use]
    pub fn leaf_ids(&self) -> Vec<PatchId> {
        let mut ids: Vec<PatchId> = self
            .arena
            .iter()
            .filter(|(_, n)| n.is_leaf())
            .map(|(_, n)| n.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    #[must_use]
    pub fn stats(&self) -> ShapeStats {
        let mut stats = ShapeStats {
            frame: self.frame,
            nodes: self.arena.len(),
            splits: self.splits,
            merges: self.merges,
            pending_jobs: self.pipeline.pending_count(),
            ..Default::default()
        };
        for (_, node) in self.arena.iter() {
            stats.leaves += usize::from(node.is_leaf());
            stats.shown += usize::from(node.shown);
        }
        stats
    }

    #[must_use]
    pub fn pipeline_stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    #[must_use]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    #[must_use]
    pub fn radius(&self) -> f64 {
        self.radius
    }

    #[must_use]
    pub fn config(&self) -> &PatchConfig {
        &self.config
    }

    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[must_use]
    pub fn heightmaps(&self) -> &HeightmapStore {
        &self.heightmaps
    }

    #[must_use]
    pub fn textures(&self) -> &TextureStore {
        &self.textures
    }
}
