//! What the renderer gets out of a shape.

use glam::{DMat4, DVec2, DVec3};
use orrery_data::{HeightmapHandle, TextureHandle};
use orrery_math::Aabb;
use orrery_surface::PatchId;

/// One shown patch, ready to draw.
#[derive(Debug, Clone)]
pub struct RenderablePatch {
    pub id: PatchId,
    /// Patch-local to world. Includes the centre offset when the shape shifts patch origins.
    pub world_transform: DMat4,
    pub tess_inner: u32,
    /// Outer levels indexed by side: north, east, south, west.
    pub tess_outer: [u32; 4],
    /// Window of the heightmap tile this patch reads.
    pub texture_offset: DVec2,
    pub texture_scale: DVec2,
    pub heightmap: HeightmapHandle,
    pub texture: Option<TextureHandle>,
    /// World-space bounds.
    pub aabb: Aabb,
}

/// Local frame of the displaced surface at a point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceFrame {
    pub normal: DVec3,
    pub tangent: DVec3,
    pub binormal: DVec3,
}
