//! The `GeometrySurface` contract shared by every shape family.
//!
//! Required methods describe the undisplaced surface in face coordinates.
//! Provided methods lift them to patch boxes: points at patch-local `(u, v)`,
//! centre/normal frames and conservative bounding boxes between two radii.

use glam::DVec3;
use orrery_config::ShapeFamily;
use orrery_math::Aabb;
use serde::{Deserialize, Serialize};

use crate::{COORD_EPSILON, PatchBox, Side};

/// Samples per axis when bounding a patch.
const AABB_SAMPLES: usize = 9;

/// Where an edge of a face continues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeLink {
    /// Face on the other side of the edge.
    pub face: u8,
    /// Edge of that face which coincides with ours.
    pub side: Side,
    /// The edge parameter `t` maps to `1 - t` on the other face.
    pub flipped: bool,
}

/// A position expressed in face coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SurfaceCoord {
    pub face: u8,
    pub x: f64,
    pub y: f64,
}

/// Pure mapping from face coordinates to the surface of one shape family.
pub trait GeometrySurface: Send + Sync + std::fmt::Debug {
    fn family(&self) -> ShapeFamily;

    /// Number of root faces.
    fn face_count(&self) -> u8;

    /// Point at `radius` from the centre (for planar families: at height `radius`).
    fn surface_point(&self, radius: f64, face: u8, x: f64, y: f64) -> DVec3;

    /// Outward unit normal of the undisplaced surface.
    fn surface_normal(&self, face: u8, x: f64, y: f64) -> DVec3;

    /// Continuation of a face edge, `None` for open edges (poles, tile borders).
    fn edge_link(&self, face: u8, side: Side) -> Option<EdgeLink>;

    /// Inverse mapping of a body-local point. `None` when the point maps to no face.
    fn surface_coord(&self, local: DVec3) -> Option<SurfaceCoord>;

    /// Nominal edge length of a patch at `lod`, used for apparent size.
    fn patch_length(&self, radius: f64, lod: u8) -> f64;

    /// True for flat families: no curvature to account for.
    fn is_planar(&self) -> bool {
        false
    }

    /// Unit tangent (increasing `x`) and binormal (decreasing `y`) at face coords.
    fn surface_tangents(&self, face: u8, x: f64, y: f64) -> (DVec3, DVec3) {
        const H: f64 = 1e-6;
        let n = self.surface_normal(face, x, y);
        let xa = (x - H).max(0.0);
        let xb = (x + H).min(1.0);
        let dpdx = self.surface_point(1.0, face, xb, y) - self.surface_point(1.0, face, xa, y);
        let mut t = (dpdx - n * n.dot(dpdx)).normalize_or_zero();
        if t == DVec3::ZERO {
            t = n.any_orthonormal_vector();
        }
        (t, n.cross(t))
    }

    /// Point at patch-local `(u, v)`, relative to `offset`.
    fn point(&self, radius: f64, u: f64, v: f64, face: u8, b: &PatchBox, offset: DVec3) -> DVec3 {
        let (x, y) = b.uv_to_coord(u, v);
        self.surface_point(radius, face, x, y) - offset
    }

    /// Normal at the patch centre.
    fn normal(&self, face: u8, b: &PatchBox) -> DVec3 {
        let (x, y) = b.centre();
        self.surface_normal(face, x, y)
    }

    /// Tangent and binormal at the patch centre.
    fn tangent_binormal(&self, face: u8, b: &PatchBox) -> (DVec3, DVec3) {
        let (x, y) = b.centre();
        self.surface_tangents(face, x, y)
    }

    /// Patch centre at `radius`, relative to `offset`.
    fn centre(&self, radius: f64, face: u8, b: &PatchBox, offset: DVec3) -> DVec3 {
        self.point(radius, 0.5, 0.5, face, b, offset)
    }

    /// Box enclosing the patch between `min_radius` and `max_radius`.
    ///
    /// Sampled on a grid at both radii, then grown by the sagitta of the widest
    /// sample spacing so the curved surface between samples stays inside.
    fn aabb(
        &self,
        min_radius: f64,
        max_radius: f64,
        face: u8,
        b: &PatchBox,
        offset: DVec3,
    ) -> Aabb {
        let n = AABB_SAMPLES;
        let step = 1.0 / (n - 1) as f64;
        let first = self.point(max_radius, 0.0, 0.0, face, b, offset);
        let mut aabb = Aabb::new(first, first);
        let mut outer = Vec::with_capacity(n * n);

        for j in 0..n {
            for i in 0..n {
                let (u, v) = (i as f64 * step, j as f64 * step);
                let hi = self.point(max_radius, u, v, face, b, offset);
                let lo = self.point(min_radius, u, v, face, b, offset);
                aabb.min = aabb.min.min(hi).min(lo);
                aabb.max = aabb.max.max(hi).max(lo);
                outer.push(hi);
            }
        }

        if self.is_planar() {
            return aabb;
        }

        let mut chord: f64 = 0.0;
        for j in 0..n {
            for i in 0..n {
                let p = outer[j * n + i];
                if i + 1 < n {
                    chord = chord.max((outer[j * n + i + 1] - p).length());
                }
                if j + 1 < n {
                    chord = chord.max((outer[(j + 1) * n + i] - p).length());
                }
            }
        }
        let r = max_radius.abs().max(min_radius.abs());
        let sagitta = r - (r * r - 0.25 * chord * chord).max(0.0).sqrt();
        aabb.expand_by(sagitta)
    }

    /// Where the neighbor across `side` of a patch lives: the same face for
    /// interior edges, the linked face for face borders.
    fn across(&self, face: u8, b: &PatchBox, side: Side) -> Option<EdgeLink> {
        if b.on_face_boundary(side) {
            self.edge_link(face, side)
        } else {
            Some(EdgeLink {
                face,
                side: side.opposite(),
                flipped: false,
            })
        }
    }

    /// True if patch `b` touches `a` along a stretch of `a`'s `side` of non-zero length.
    fn shares_edge(&self, a_face: u8, a: &PatchBox, side: Side, b_face: u8, b: &PatchBox) -> bool {
        let Some(link) = self.across(a_face, a, side) else {
            return false;
        };
        if link.face != b_face {
            return false;
        }
        let (a0, a1) = a.edge_interval(side);
        let (m0, m1) = if link.flipped {
            (1.0 - a1, 1.0 - a0)
        } else {
            (a0, a1)
        };
        let edge_at = if a.on_face_boundary(side) {
            // Seam: b must sit on the linked face border.
            b.on_face_boundary(link.side)
        } else {
            (b.edge_coord(link.side) - a.edge_coord(side)).abs() < COORD_EPSILON
        };
        let (b0, b1) = b.edge_interval(link.side);
        edge_at && m0.max(b0) < m1.min(b1) - COORD_EPSILON
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NormalizedCube, PatchId, Quadrant, UvSphere};

    #[test]
    fn test_interior_siblings_share_edges() {
        let s = NormalizedCube;
        let root = PatchId::root(ShapeFamily::NormalizedCube, 0).patch_box();
        let tl = root.quadrant(Quadrant::TopLeft);
        let tr = root.quadrant(Quadrant::TopRight);
        let br = root.quadrant(Quadrant::BottomRight);
        assert!(s.shares_edge(0, &tl, Side::East, 0, &tr));
        assert!(s.shares_edge(0, &tr, Side::West, 0, &tl));
        assert!(!s.shares_edge(0, &tl, Side::East, 0, &br), "corner contact only");
        assert!(!s.shares_edge(0, &tl, Side::South, 0, &tr));
    }

    #[test]
    fn test_cross_face_edge_sharing() {
        let s = NormalizedCube;
        // +X east continues onto the -Z west edge, same direction.
        let link = s.edge_link(0, Side::East).unwrap();
        assert_eq!(link, EdgeLink { face: 5, side: Side::West, flipped: false });

        let a = PatchBox::from_cell(1, 1, 0);
        assert!(s.shares_edge(0, &a, Side::East, 5, &PatchBox::UNIT));
        assert!(s.shares_edge(5, &PatchBox::UNIT, Side::West, 0, &a));
        assert!(s.shares_edge(0, &a, Side::East, 5, &PatchBox::from_cell(1, 0, 0)));
        assert!(!s.shares_edge(0, &a, Side::East, 5, &PatchBox::from_cell(1, 0, 1)));
        assert!(!s.shares_edge(0, &a, Side::East, 5, &PatchBox::from_cell(1, 1, 0)));
    }

    #[test]
    fn test_uv_root_wraps_onto_itself() {
        let s = UvSphere;
        let root = PatchBox::UNIT;
        assert!(s.shares_edge(0, &root, Side::East, 0, &root));
        assert!(s.shares_edge(0, &root, Side::West, 0, &root));
        assert!(s.shares_edge(0, &root, Side::South, 1, &root));
        assert!(!s.shares_edge(0, &root, Side::North, 0, &root));
    }

    #[test]
    fn test_coarser_neighbor_overlap() {
        let s = NormalizedCube;
        let fine = PatchBox::from_cell(2, 1, 1);
        let coarse = PatchBox::from_cell(1, 1, 0);
        assert!(s.shares_edge(0, &fine, Side::East, 0, &coarse));
        assert!(s.shares_edge(0, &coarse, Side::West, 0, &fine));
    }
}
