//! One node of the surface quadtree.

use glam::DVec3;
use orrery_data::{HeightmapHandle, TextureHandle};
use orrery_math::Aabb;
use orrery_surface::{GeometrySurface, PatchBox, PatchId, Side};

use crate::PatchHandle;

/// State of a patch's render instance.
///
/// Creating an instance is deferred until the patch's data has arrived; the
/// update loop polls the task every frame and never waits on it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InstanceTask {
    /// No instance.
    #[default]
    Idle,
    /// Requested, waiting for data.
    Pending,
    /// Built and ready to show.
    Settled,
}

impl InstanceTask {
    /// Settle a pending task once its data is ready. Returns true if it settled now.
    pub fn poll(&mut self, data_ready: bool) -> bool {
        if *self == InstanceTask::Pending && data_ready {
            *self = InstanceTask::Settled;
            return true;
        }
        false
    }

    #[must_use]
    pub fn is_ready(self) -> bool {
        self == InstanceTask::Settled
    }
}

/// A patch: geometry cache, adjacency and lifecycle flags.
#[derive(Debug, Clone)]
pub struct PatchNode {
    pub id: PatchId,
    pub bounds: PatchBox,
    pub parent: Option<PatchHandle>,
    /// BL, BR, TR, TL when split.
    pub children: Option<[PatchHandle; 4]>,
    /// Leaves across each side, indexed by [`Side::index`].
    pub neighbors: [Vec<PatchHandle>; 4],

    pub tess_inner: u32,
    pub tess_outer: [u32; 4],

    /// Body-local centre at `average_height`.
    pub centre: DVec3,
    pub normal: DVec3,
    /// Body-local bounds between the lowest and highest possible heights.
    pub aabb: Aabb,
    /// World-space bounds from the last visibility pass.
    pub world_aabb: Aabb,
    pub bounding_radius: f64,
    /// Mean surface radius over the patch as a multiple of the body radius.
    pub average_height: f64,

    pub apparent_size: f64,
    pub distance: f64,
    pub in_view: bool,
    pub visible: bool,

    pub instance: InstanceTask,
    pub split_pending: bool,
    pub merge_pending: bool,
    pub parent_split_pending: bool,
    pub shown: bool,
    pub last_split_frame: Option<u64>,
    /// Consecutive frames in which all four children asked to merge.
    pub merge_streak: u64,

    pub heightmap_ready: bool,
    pub texture_ready: bool,
    pub heightmap: HeightmapHandle,
    pub texture: Option<TextureHandle>,
}

impl PatchNode {
    /// Fresh leaf with full tessellation and no instance.
    #[must_use]
    pub fn new(
        id: PatchId,
        parent: Option<PatchHandle>,
        base_density: u32,
        average_height: f64,
        heightmap: HeightmapHandle,
    ) -> Self {
        let bounds = id.patch_box();
        Self {
            id,
            bounds,
            parent,
            children: None,
            neighbors: Default::default(),
            tess_inner: base_density,
            tess_outer: [base_density; 4],
            centre: DVec3::ZERO,
            normal: DVec3::Z,
            aabb: Aabb::new(DVec3::ZERO, DVec3::ZERO),
            world_aabb: Aabb::new(DVec3::ZERO, DVec3::ZERO),
            bounding_radius: 0.0,
            average_height,
            apparent_size: 0.0,
            distance: f64::INFINITY,
            in_view: false,
            visible: false,
            instance: InstanceTask::Idle,
            split_pending: false,
            merge_pending: false,
            parent_split_pending: false,
            shown: false,
            last_split_frame: None,
            merge_streak: 0,
            heightmap_ready: false,
            texture_ready: false,
            heightmap,
            texture: None,
        }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    #[must_use]
    pub fn lod(&self) -> u8 {
        self.id.lod
    }

    #[must_use]
    pub fn instance_ready(&self) -> bool {
        self.instance.is_ready()
    }

    /// Data jobs this patch still waits for.
    #[must_use]
    pub fn jobs_outstanding(&self) -> u32 {
        u32::from(!self.heightmap_ready) + u32::from(!self.texture_ready)
    }

    #[must_use]
    pub fn data_ready(&self) -> bool {
        self.heightmap_ready && self.texture_ready
    }

    pub fn neighbors_on(&self, side: Side) -> &[PatchHandle] {
        &self.neighbors[side.index()]
    }

    #[must_use]
    pub fn coord_to_uv(&self, x: f64, y: f64) -> (f64, f64) {
        self.bounds.coord_to_uv(x, y)
    }

    #[must_use]
    pub fn uv_to_coord(&self, u: f64, v: f64) -> (f64, f64) {
        self.bounds.uv_to_coord(u, v)
    }

    /// Recompute centre, normal and bounds.
    ///
    /// Bounds enclose the surface between the lowest and highest heights of
    /// the current heightmap, scaled by `max_height_ratio`.
    pub fn update_geometry<S: GeometrySurface + ?Sized>(
        &mut self,
        surface: &S,
        radius: f64,
        max_height_ratio: f64,
    ) {
        let face = self.id.face;
        let tile = self.heightmap.tile();
        let lo = radius + tile.min_height().min(0.0) * max_height_ratio;
        let hi = radius + tile.max_height().max(0.0) * max_height_ratio;
        self.centre = surface.centre(radius * self.average_height, face, &self.bounds, DVec3::ZERO);
        self.normal = surface.normal(face, &self.bounds);
        let aabb = surface.aabb(lo, hi, face, &self.bounds, DVec3::ZERO);
        self.aabb = aabb.union(&Aabb::new(self.centre, self.centre));
        self.bounding_radius = self.bounding_radius();
    }

    /// Radius of the sphere around the box centre enclosing the box.
    #[must_use]
    pub fn bounding_radius(&self) -> f64 {
        self.aabb.extents().length()
    }

    /// `base_density` reduced toward coarser neighbors:
    /// `max(1, base >> max(0, lod - min_neighbor_lod))`.
    #[must_use]
    pub fn outer_level(base_density: u32, lod: u8, min_neighbor_lod: u8) -> u32 {
        let diff = u32::from(lod.saturating_sub(min_neighbor_lod));
        base_density.checked_shr(diff).unwrap_or(0).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use orrery_config::HeightmapConfig;
    use orrery_data::{HeightmapTile, TileHandle};
    use orrery_surface::{NormalizedCube, ShapeFamily};

    fn test_node(id: PatchId) -> PatchNode {
        let config = HeightmapConfig {
            size: 3,
            border: 0,
            height_scale: 0.1,
            ..Default::default()
        };
        let tile = Arc::new(HeightmapTile::placeholder(&config));
        PatchNode::new(id, None, 32, 1.0, TileHandle::new(id, tile))
    }

    #[test]
    fn test_outer_level_formula() {
        assert_eq!(PatchNode::outer_level(32, 3, 3), 32);
        assert_eq!(PatchNode::outer_level(32, 3, 2), 16);
        assert_eq!(PatchNode::outer_level(32, 3, 0), 4);
        assert_eq!(PatchNode::outer_level(32, 2, 5), 32, "finer neighbor keeps full density");
        assert_eq!(PatchNode::outer_level(32, 12, 0), 1, "clamped to one segment");
        assert_eq!(PatchNode::outer_level(64, 30, 0), 1, "shift past the width");
    }

    #[test]
    fn test_instance_task_settles_only_when_data_ready() {
        let mut t = InstanceTask::Idle;
        assert!(!t.poll(true), "idle tasks never settle");
        t = InstanceTask::Pending;
        assert!(!t.poll(false));
        assert!(t.poll(true));
        assert!(t.is_ready());
        assert!(!t.poll(true), "already settled");
    }

    #[test]
    fn test_geometry_bounds_contain_centre_and_corners() {
        let id = PatchId::root(ShapeFamily::NormalizedCube, 0);
        let mut node = test_node(id);
        node.update_geometry(&NormalizedCube, 1.0, 1.0);
        assert!((node.centre - DVec3::X).length() < 1e-9, "{:?}", node.centre);
        assert!((node.normal - DVec3::X).length() < 1e-9);
        assert!(node.aabb.contains_point(node.centre));
        let corner = NormalizedCube.surface_point(1.0, 0, 0.0, 0.0);
        assert!(node.aabb.contains_point(corner));
        assert!(node.bounding_radius > 0.5);
    }

    #[test]
    fn test_fresh_node_flags() {
        let node = test_node(PatchId::root(ShapeFamily::UvSphere, 1));
        assert!(node.is_leaf());
        assert_eq!(node.tess_outer, [32; 4]);
        assert_eq!(node.jobs_outstanding(), 2);
        assert!(!node.shown && !node.instance_ready());
        assert_eq!(node.average_height, 1.0);
    }
}
