//! Horizon culling against a sphere.
//!
//! Works in the body's local frame: the body centre is the origin.

use glam::DVec3;

/// Horizon test state derived from the camera position and body radius.
#[derive(Clone, Debug)]
pub struct HorizonCuller {
    camera_pos: DVec3,
    radius: f64,
    camera_distance: f64,
    /// Cosine of the visible-cap half angle seen from the centre, `r / d`.
    cos_horizon: f64,
}

impl HorizonCuller {
    /// `camera_pos` is relative to the body centre.
    #[must_use]
    pub fn new(camera_pos: DVec3, radius: f64) -> Self {
        let camera_distance = camera_pos.length();
        let cos_horizon = if camera_distance > radius {
            radius / camera_distance
        } else {
            0.0
        };
        Self {
            camera_pos,
            radius,
            camera_distance,
            cos_horizon,
        }
    }

    /// Returns `false` only when a sphere at `center` with `bound_radius`
    /// lies entirely beyond the horizon.
    #[must_use]
    pub fn is_above_horizon(&self, center: DVec3, bound_radius: f64) -> bool {
        if self.camera_distance <= self.radius {
            return true;
        }
        let dist = center.length();
        if dist < 1e-10 || bound_radius >= dist {
            return true;
        }

        let cos_angle = center.dot(self.camera_pos) / (dist * self.camera_distance);

        // angle < horizon + margin, expanded with cos(a + b).
        let sin_margin = bound_radius / dist;
        let cos_margin = (1.0 - sin_margin * sin_margin).max(0.0).sqrt();
        let sin_horizon = (1.0 - self.cos_horizon * self.cos_horizon).max(0.0).sqrt();
        let cos_threshold = self.cos_horizon * cos_margin - sin_horizon * sin_margin;

        cos_angle >= cos_threshold
    }

    /// Straight-line distance from the camera to the horizon.
    #[must_use]
    pub fn horizon_distance(&self) -> f64 {
        if self.camera_distance <= self.radius {
            return 0.0;
        }
        (self.camera_distance * self.camera_distance - self.radius * self.radius).sqrt()
    }

    /// Altitude of the camera above the sphere, never negative.
    #[must_use]
    pub fn camera_altitude(&self) -> f64 {
        (self.camera_distance - self.radius).max(0.0)
    }
}
