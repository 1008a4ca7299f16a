//! View frustum extracted from a double-precision view-projection matrix.

use glam::{DMat4, DVec3, DVec4};

use crate::Aabb;

const LEFT: usize = 0;
const RIGHT: usize = 1;
const BOTTOM: usize = 2;
const TOP: usize = 3;
const NEAR: usize = 4;
const FAR: usize = 5;

/// Six inward-facing planes `(a, b, c, d)` with unit normals.
#[derive(Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: [DVec4; 6],
}

impl Frustum {
    /// Extract the planes of a `[0, 1]`-depth projection (glam's `perspective_rh`)
    /// using the Gribb-Hartmann method.
    #[must_use]
    pub fn from_view_projection(vp: &DMat4) -> Self {
        let rows = [vp.row(0), vp.row(1), vp.row(2), vp.row(3)];

        let mut planes = [DVec4::ZERO; 6];
        planes[LEFT] = rows[3] + rows[0];
        planes[RIGHT] = rows[3] - rows[0];
        planes[BOTTOM] = rows[3] + rows[1];
        planes[TOP] = rows[3] - rows[1];
        // Depth runs 0..w, so near is z >= 0 and far is z <= w.
        planes[NEAR] = rows[2];
        planes[FAR] = rows[3] - rows[2];

        for plane in &mut planes {
            let len = plane.truncate().length();
            if len > 0.0 {
                *plane /= len;
            }
        }

        Self { planes }
    }

    /// Returns `true` if the box is at least partially inside.
    ///
    /// Uses the positive-vertex test, which is conservative near frustum
    /// corners but never rejects a visible box.
    #[must_use]
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|plane| {
            let n = plane.truncate();
            let p = DVec3::select(n.cmpge(DVec3::ZERO), aabb.max, aabb.min);
            n.dot(p) + plane.w >= 0.0
        })
    }

    /// Returns `true` if the point is inside or on every plane.
    #[must_use]
    pub fn contains_point(&self, p: DVec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(p) + plane.w >= 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_vp(near: f64, far: f64) -> DMat4 {
        let view = DMat4::look_to_rh(DVec3::ZERO, DVec3::NEG_Z, DVec3::Y);
        let proj = DMat4::perspective_rh(std::f64::consts::FRAC_PI_2, 1.0, near, far);
        proj * view
    }

    #[test]
    fn test_box_in_front_is_visible() {
        let f = Frustum::from_view_projection(&camera_vp(0.1, 100.0));
        let aabb = Aabb::new(DVec3::new(-1.0, -1.0, -5.0), DVec3::new(1.0, 1.0, -3.0));
        assert!(f.intersects_aabb(&aabb));
    }

    #[test]
    fn test_box_behind_is_culled() {
        let f = Frustum::from_view_projection(&camera_vp(0.1, 100.0));
        let aabb = Aabb::new(DVec3::new(-1.0, -1.0, 3.0), DVec3::new(1.0, 1.0, 5.0));
        assert!(!f.intersects_aabb(&aabb));
    }

    #[test]
    fn test_box_beyond_far_is_culled() {
        let f = Frustum::from_view_projection(&camera_vp(0.1, 10.0));
        let aabb = Aabb::new(DVec3::new(-1.0, -1.0, -20.0), DVec3::new(1.0, 1.0, -15.0));
        assert!(!f.intersects_aabb(&aabb));
        let straddling = Aabb::new(DVec3::new(-1.0, -1.0, -12.0), DVec3::new(1.0, 1.0, -8.0));
        assert!(f.intersects_aabb(&straddling));
    }

    #[test]
    fn test_box_to_the_side_is_culled() {
        let f = Frustum::from_view_projection(&camera_vp(0.1, 100.0));
        // 90 degree fov: x = |z| is the edge, so x in [10, 12] at z = -5 is out.
        let aabb = Aabb::new(DVec3::new(10.0, -1.0, -6.0), DVec3::new(12.0, 1.0, -4.0));
        assert!(!f.intersects_aabb(&aabb));
    }

    #[test]
    fn test_contains_point() {
        let f = Frustum::from_view_projection(&camera_vp(0.1, 100.0));
        assert!(f.contains_point(DVec3::new(0.0, 0.0, -1.0)));
        assert!(!f.contains_point(DVec3::new(0.0, 0.0, 1.0)));
        assert!(!f.contains_point(DVec3::new(0.0, 0.0, -0.01)));
    }

    #[test]
    fn test_planes_are_normalized() {
        let f = Frustum::from_view_projection(&camera_vp(0.5, 50.0));
        for plane in &f.planes {
            let len = plane.truncate().length();
            assert!((len - 1.0).abs() < 1e-9, "plane normal length {len}");
        }
    }
}
