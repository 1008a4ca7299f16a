//! Per-frame visibility and apparent size of patches.

use glam::{DMat4, DVec3};
use orrery_config::PatchConfig;
use orrery_math::{Aabb, Frustum, HorizonCuller};
use orrery_surface::{GeometrySurface, SurfaceCoord};

use crate::camera::{BodyPose, CameraState};
use crate::PatchNode;

/// What one patch looks like from the camera this frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatchVisibility {
    pub world_aabb: Aabb,
    pub in_view: bool,
    pub visible: bool,
    pub distance: f64,
    pub apparent_size: f64,
}

/// Far plane derived from the altitude above the terrain under the camera.
///
/// Deeper trees get a nearer far plane: `k = 2 / 2^max(0, (max_lod - 10) / 2)`.
#[must_use]
pub fn clamped_far_plane(altitude: f64, ground_radius: f64, max_lod: u8) -> f64 {
    let shift = ((i32::from(max_lod) - 10) / 2).max(0);
    let k = 2.0 / f64::from(1u32 << shift);
    (altitude * (k * ground_radius + altitude)).max(0.0).sqrt()
}

/// Camera-dependent state shared by every patch test of one frame.
#[derive(Clone, Debug)]
pub struct VisibilityTester {
    frustum: Frustum,
    model: DMat4,
    camera_world: DVec3,
    camera_local: DVec3,
    camera_coord: Option<SurfaceCoord>,
    horizon: Option<HorizonCuller>,
    near: f64,
    far: f64,
    pixel_size: f64,
    max_scale: f64,
}

impl VisibilityTester {
    /// Set up the frame's tests.
    ///
    /// `ground_radius` is the distance from the body centre to the terrain
    /// under the camera (for planar shapes: the terrain height) and
    /// `lowest_radius` the lowest the terrain can get anywhere.
    #[must_use]
    pub fn new<S: GeometrySurface + ?Sized>(
        surface: &S,
        config: &PatchConfig,
        camera: &CameraState,
        pose: &BodyPose,
        ground_radius: f64,
        lowest_radius: f64,
    ) -> Self {
        let model = pose.model();
        let max_scale = pose.max_scale();
        let camera_local = pose.to_local(camera.position);
        let planar = surface.is_planar();

        let far = if config.far_plane_clamp && !planar {
            let altitude = (camera_local.length() - ground_radius).max(0.0);
            clamped_far_plane(altitude, ground_radius, config.max_lod) * max_scale
        } else {
            camera.lens.far
        };
        let projection = camera.lens.projection_with_far(far);
        let frustum = Frustum::from_view_projection(&(projection * camera.view()));

        let horizon = (config.horizon_culling && !planar)
            .then(|| HorizonCuller::new(camera_local, lowest_radius));

        Self {
            frustum,
            model,
            camera_world: camera.position,
            camera_local,
            camera_coord: surface.surface_coord(camera_local),
            horizon,
            near: camera.lens.near,
            far,
            pixel_size: camera.pixel_size,
            max_scale,
        }
    }

    /// Far plane used for this frame's frustum.
    #[must_use]
    pub fn far(&self) -> f64 {
        self.far
    }

    #[must_use]
    pub fn camera_local(&self) -> DVec3 {
        self.camera_local
    }

    /// Face coordinates under the camera, if it projects onto the surface.
    #[must_use]
    pub fn camera_coord(&self) -> Option<SurfaceCoord> {
        self.camera_coord
    }

    /// True if the camera sits over `node`'s coordinate box (boundary included).
    #[must_use]
    pub fn camera_over(&self, node: &PatchNode) -> bool {
        self.camera_coord
            .is_some_and(|c| c.face == node.id.face && node.bounds.contains(c.x, c.y))
    }

    /// Test one patch. `patch_length` is its nominal edge length in local units.
    #[must_use]
    pub fn evaluate(&self, node: &PatchNode, patch_length: f64) -> PatchVisibility {
        let world_aabb = node.aabb.transformed(&self.model);
        let in_view = self.frustum.intersects_aabb(&world_aabb);
        let under = self.camera_over(node);
        let beyond_horizon = self
            .horizon
            .as_ref()
            .is_some_and(|h| !h.is_above_horizon(node.aabb.center(), node.bounding_radius));
        let visible = under || (in_view && !beyond_horizon);

        let distance = world_aabb
            .distance_to_point(self.camera_world)
            .max(self.near);
        let apparent_size = patch_length * self.max_scale / (distance * self.pixel_size);

        PatchVisibility {
            world_aabb,
            in_view,
            visible,
            distance,
            apparent_size,
        }
    }
}

impl PatchNode {
    /// Refresh distance, apparent size and visibility flags from this frame's tester.
    pub fn visibility(&mut self, tester: &VisibilityTester, patch_length: f64) {
        let v = tester.evaluate(self, patch_length);
        self.world_aabb = v.world_aabb;
        self.in_view = v.in_view;
        self.visible = v.visible;
        self.distance = v.distance;
        self.apparent_size = v.apparent_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use orrery_config::HeightmapConfig;
    use orrery_data::{HeightmapTile, TileHandle};
    use orrery_surface::{FlatTile, NormalizedCube, PatchId, Quadrant, ShapeFamily};

    use crate::camera::Lens;

    fn node_for<S: GeometrySurface>(surface: &S, id: PatchId) -> PatchNode {
        let config = HeightmapConfig {
            size: 2,
            border: 0,
            ..Default::default()
        };
        let tile = Arc::new(HeightmapTile::placeholder(&config));
        let mut node = PatchNode::new(id, None, 32, 1.0, TileHandle::new(id, tile));
        node.update_geometry(surface, 1.0, 1.0);
        node
    }

    fn camera_at(position: DVec3, target: DVec3) -> CameraState {
        CameraState::looking_at(position, target, Lens::default(), 0.0025)
    }

    #[test]
    fn test_far_plane_formula() {
        // max_lod <= 11 keeps k = 2: the horizon distance sqrt(h (2R + h)).
        let far = clamped_far_plane(1.0, 1.0, 8);
        assert!((far - 3f64.sqrt()).abs() < 1e-12);
        // max_lod 14 halves k twice.
        let far = clamped_far_plane(1.0, 1.0, 14);
        assert!((far - 1.5f64.sqrt()).abs() < 1e-12);
        assert_eq!(clamped_far_plane(0.0, 1.0, 8), 0.0);
    }

    #[test]
    fn test_facing_patch_in_view_and_back_patch_culled() {
        let s = NormalizedCube;
        let config = PatchConfig::default();
        let cam = camera_at(DVec3::new(2.0, 0.0, 0.0), DVec3::ZERO);
        let t = VisibilityTester::new(&s, &config, &cam, &BodyPose::IDENTITY, 1.0, 1.0);

        let front = node_for(&s, PatchId::root(ShapeFamily::NormalizedCube, 0));
        let v = t.evaluate(&front, s.patch_length(1.0, 0));
        assert!(v.in_view && v.visible);
        assert!(v.distance > 0.9 && v.distance < 1.1, "{}", v.distance);
        let expected = s.patch_length(1.0, 0) / (v.distance * 0.0025);
        assert!((v.apparent_size - expected).abs() < 1e-9);

        // A patch of the far face, small enough to lie wholly behind the horizon.
        let mut back_id = PatchId::root(ShapeFamily::NormalizedCube, 1);
        for _ in 0..3 {
            back_id = back_id.child(Quadrant::TopLeft).child(Quadrant::BottomRight);
        }
        let back = node_for(&s, back_id);
        let v = t.evaluate(&back, s.patch_length(1.0, back_id.lod));
        assert!(!v.visible);
    }

    #[test]
    fn test_camera_over_box_forces_visible() {
        let s = NormalizedCube;
        let config = PatchConfig::default();
        // Just above face 0, looking away from the body.
        let cam = CameraState::looking_toward(
            DVec3::new(1.01, 0.0, 0.0),
            DVec3::X,
            Lens::default(),
            0.0025,
        );
        let t = VisibilityTester::new(&s, &config, &cam, &BodyPose::IDENTITY, 1.0, 1.0);
        let node = node_for(&s, PatchId::root(ShapeFamily::NormalizedCube, 0));
        let v = t.evaluate(&node, 1.0);
        assert!(!v.in_view);
        assert!(v.visible);
        assert!(v.distance < 0.01, "{}", v.distance);
    }

    #[test]
    fn test_pose_scale_feeds_apparent_size() {
        let s = FlatTile::new(10.0);
        let config = PatchConfig::default();
        let cam = camera_at(DVec3::new(0.0, 0.0, 20.0), DVec3::ZERO);
        let node = node_for(&s, PatchId::root(ShapeFamily::FlatTile, 0));

        let unit = VisibilityTester::new(&s, &config, &cam, &BodyPose::IDENTITY, 0.0, 0.0);
        let a = unit.evaluate(&node, 10.0);
        let scaled_pose = BodyPose {
            scale: DVec3::splat(0.5),
            ..BodyPose::IDENTITY
        };
        let scaled = VisibilityTester::new(&s, &config, &cam, &scaled_pose, 0.0, 0.0);
        let b = scaled.evaluate(&node, 10.0);
        assert!(a.visible && b.visible);
        // Half the size, a bit further away: smaller on screen.
        assert!(b.apparent_size < 0.5 * a.apparent_size + 1e-9);
    }

    #[test]
    fn test_far_clamp_used_only_when_enabled() {
        let s = NormalizedCube;
        let cam = camera_at(DVec3::new(1.5, 0.0, 0.0), DVec3::ZERO);
        let off = VisibilityTester::new(
            &s,
            &PatchConfig::default(),
            &cam,
            &BodyPose::IDENTITY,
            1.0,
            1.0,
        );
        assert_eq!(off.far(), Lens::default().far);
        let config = PatchConfig {
            far_plane_clamp: true,
            max_lod: 8,
            ..Default::default()
        };
        let on = VisibilityTester::new(&s, &config, &cam, &BodyPose::IDENTITY, 1.0, 1.0);
        assert!((on.far() - clamped_far_plane(0.5, 1.0, 8)).abs() < 1e-12);
    }
}
