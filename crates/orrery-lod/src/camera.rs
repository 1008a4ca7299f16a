//! Camera and body pose inputs to the per-frame update.

use glam::{DMat4, DQuat, DVec3};

/// Perspective lens parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lens {
    /// Vertical field of view in radians.
    pub fov_y: f64,
    /// Width / height.
    pub aspect: f64,
    /// Near clip plane distance (always positive).
    pub near: f64,
    /// Far clip plane distance (always positive, > near).
    pub far: f64,
}

impl Lens {
    /// World units per pixel at unit depth for a viewport `height` pixels tall.
    #[must_use]
    pub fn pixel_size_for(&self, height: u32) -> f64 {
        2.0 * (0.5 * self.fov_y).tan() / f64::from(height.max(1))
    }

    /// Projection with the lens' own far plane.
    #[must_use]
    pub fn projection(&self) -> DMat4 {
        self.projection_with_far(self.far)
    }

    /// Projection with an overridden far plane, never closer than twice the near plane.
    #[must_use]
    pub fn projection_with_far(&self, far: f64) -> DMat4 {
        DMat4::perspective_rh(self.fov_y, self.aspect, self.near, far.max(2.0 * self.near))
    }
}

impl Default for Lens {
    fn default() -> Self {
        Self {
            fov_y: 45f64.to_radians(),
            aspect: 16.0 / 9.0,
            near: 1e-3,
            far: 1e9,
        }
    }
}

/// Camera pose in world space. Looks down its local -Z axis.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub position: DVec3,
    pub rotation: DQuat,
    pub lens: Lens,
    /// World units per pixel at unit depth.
    pub pixel_size: f64,
}

impl CameraState {
    /// Camera at `position` looking along `direction`.
    #[must_use]
    pub fn looking_toward(position: DVec3, direction: DVec3, lens: Lens, pixel_size: f64) -> Self {
        let dir = direction.try_normalize().unwrap_or(DVec3::NEG_Z);
        Self {
            position,
            rotation: DQuat::from_rotation_arc(DVec3::NEG_Z, dir),
            lens,
            pixel_size,
        }
    }

    /// Camera at `position` looking at `target`.
    #[must_use]
    pub fn looking_at(position: DVec3, target: DVec3, lens: Lens, pixel_size: f64) -> Self {
        Self::looking_toward(position, target - position, lens, pixel_size)
    }

    #[must_use]
    pub fn forward(&self) -> DVec3 {
        self.rotation * DVec3::NEG_Z
    }

    /// View = inverse(Translation * Rotation).
    #[must_use]
    pub fn view(&self) -> DMat4 {
        DMat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    #[must_use]
    pub fn projection(&self) -> DMat4 {
        self.lens.projection()
    }
}

/// Position, orientation and (possibly oblate) scale of a body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyPose {
    pub position: DVec3,
    pub orientation: DQuat,
    pub scale: DVec3,
}

impl BodyPose {
    pub const IDENTITY: BodyPose = BodyPose {
        position: DVec3::ZERO,
        orientation: DQuat::IDENTITY,
        scale: DVec3::ONE,
    };

    /// Body-local to world.
    #[must_use]
    pub fn model(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(self.scale, self.orientation, self.position)
    }

    /// Largest axis scale, for converting local lengths to world lengths.
    #[must_use]
    pub fn max_scale(&self) -> f64 {
        self.scale.abs().max_element()
    }

    /// World point expressed in the body frame.
    #[must_use]
    pub fn to_local(&self, world: DVec3) -> DVec3 {
        self.model().inverse().transform_point3(world)
    }
}

impl Default for BodyPose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Supplies the body pose for a point in time (orbit and rotation models).
pub trait PoseProvider {
    fn get_pose(&self, time: f64) -> BodyPose;
}

/// A body that never moves.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FixedPose(pub BodyPose);

impl PoseProvider for FixedPose {
    fn get_pose(&self, _time: f64) -> BodyPose {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    #[test]
    fn test_looking_toward_sets_forward() {
        let cam = CameraState::looking_toward(DVec3::ZERO, DVec3::X, Lens::default(), 1e-3);
        assert!((cam.forward() - DVec3::X).length() < EPSILON, "{:?}", cam.forward());
        let up = CameraState::looking_toward(DVec3::ZERO, DVec3::Z, Lens::default(), 1e-3);
        assert!((up.forward() - DVec3::Z).length() < EPSILON);
    }

    #[test]
    fn test_view_maps_position_to_origin() {
        let cam = CameraState::looking_at(
            DVec3::new(0.0, 0.0, 3.0),
            DVec3::ZERO,
            Lens::default(),
            1e-3,
        );
        let p = cam.view().transform_point3(cam.position);
        assert!(p.length() < EPSILON);
        // The body centre is straight ahead: on the -Z axis of view space.
        let c = cam.view().transform_point3(DVec3::ZERO);
        assert!(c.x.abs() < EPSILON && c.y.abs() < EPSILON && (c.z + 3.0).abs() < EPSILON);
    }

    #[test]
    fn test_pixel_size_for_viewport() {
        let lens = Lens {
            fov_y: 90f64.to_radians(),
            ..Lens::default()
        };
        assert!((lens.pixel_size_for(1000) - 0.002).abs() < EPSILON);
    }

    #[test]
    fn test_pose_round_trip() {
        let pose = BodyPose {
            position: DVec3::new(10.0, 0.0, 0.0),
            orientation: DQuat::from_rotation_z(0.3),
            scale: DVec3::new(1.0, 1.0, 0.9),
        };
        let local = DVec3::new(0.2, -0.4, 0.7);
        let world = pose.model().transform_point3(local);
        assert!((pose.to_local(world) - local).length() < 1e-12);
        assert_eq!(pose.max_scale(), 1.0);
        assert_eq!(FixedPose(pose).get_pose(5.0), pose);
    }
}
