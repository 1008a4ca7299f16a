//! Cube-sphere families: plain normalization and the squared-distance mapping.

use glam::DVec3;
use orrery_config::ShapeFamily;

use crate::{CubeFace, EdgeLink, GeometrySurface, Side, SurfaceCoord};

const NEWTON_ITERATIONS: usize = 10;
const NEWTON_TOLERANCE: f64 = 1e-14;

/// Squared-distance (Nowell) cube-to-sphere mapping of a `[-1, 1]` cube point:
///
/// ```text
/// sx = x * sqrt(1 - y²/2 - z²/2 + y²z²/3)
/// ```
/// and cyclic for `sy`, `sz`.
#[inline]
#[must_use]
pub fn squared_distance_map(c: DVec3) -> DVec3 {
    let x2 = c.x * c.x;
    let y2 = c.y * c.y;
    let z2 = c.z * c.z;
    DVec3::new(
        c.x * (1.0 - y2 / 2.0 - z2 / 2.0 + y2 * z2 / 3.0).sqrt(),
        c.y * (1.0 - x2 / 2.0 - z2 / 2.0 + x2 * z2 / 3.0).sqrt(),
        c.z * (1.0 - x2 / 2.0 - y2 / 2.0 + x2 * y2 / 3.0).sqrt(),
    )
}

/// Cube faces projected onto the sphere by normalization.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NormalizedCube;

/// Cube faces projected with the squared-distance mapping for more even patch areas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SquaredDistanceCube;

fn cube_patch_length(radius: f64, lod: u8) -> f64 {
    std::f64::consts::FRAC_PI_2 * radius * (-f64::from(lod)).exp2()
}

fn clamp_coord(face: CubeFace, x: f64, y: f64) -> SurfaceCoord {
    SurfaceCoord {
        face: face.index(),
        x: x.clamp(0.0, 1.0),
        y: y.clamp(0.0, 1.0),
    }
}

impl GeometrySurface for NormalizedCube {
    fn family(&self) -> ShapeFamily {
        ShapeFamily::NormalizedCube
    }

    fn face_count(&self) -> u8 {
        6
    }

    fn surface_point(&self, radius: f64, face: u8, x: f64, y: f64) -> DVec3 {
        radius * self.surface_normal(face, x, y)
    }

    fn surface_normal(&self, face: u8, x: f64, y: f64) -> DVec3 {
        CubeFace::from_index(face).cube_point(x, y).normalize()
    }

    fn edge_link(&self, face: u8, side: Side) -> Option<EdgeLink> {
        Some(CubeFace::from_index(face).edge_link(side))
    }

    fn surface_coord(&self, local: DVec3) -> Option<SurfaceCoord> {
        if local.length_squared() == 0.0 {
            return None;
        }
        let face = CubeFace::from_direction(local);
        let (x, y) = face.project(local);
        Some(clamp_coord(face, x, y))
    }

    fn patch_length(&self, radius: f64, lod: u8) -> f64 {
        cube_patch_length(radius, lod)
    }
}

impl GeometrySurface for SquaredDistanceCube {
    fn family(&self) -> ShapeFamily {
        ShapeFamily::SquaredDistanceCube
    }

    fn face_count(&self) -> u8 {
        6
    }

    fn surface_point(&self, radius: f64, face: u8, x: f64, y: f64) -> DVec3 {
        radius * self.surface_normal(face, x, y)
    }

    fn surface_normal(&self, face: u8, x: f64, y: f64) -> DVec3 {
        squared_distance_map(CubeFace::from_index(face).cube_point(x, y))
    }

    fn edge_link(&self, face: u8, side: Side) -> Option<EdgeLink> {
        Some(CubeFace::from_index(face).edge_link(side))
    }

    /// Newton-Raphson on the forward map, seeded by plain projection.
    fn surface_coord(&self, local: DVec3) -> Option<SurfaceCoord> {
        if local.length_squared() == 0.0 {
            return None;
        }
        let target = local.normalize();
        let face = CubeFace::from_direction(target);
        let (mut x, mut y) = face.project(target);
        let f = face.index();

        for _ in 0..NEWTON_ITERATIONS {
            let current = self.surface_normal(f, x, y);
            let error = target - current;
            if error.length() < NEWTON_TOLERANCE {
                break;
            }

            let h = 1e-8;
            let dp_dx = (self.surface_normal(f, (x + h).min(1.0), y) - current) / h;
            let dp_dy = (self.surface_normal(f, x, (y + h).min(1.0)) - current) / h;

            let a11 = dp_dx.dot(dp_dx);
            let a12 = dp_dx.dot(dp_dy);
            let a22 = dp_dy.dot(dp_dy);
            let b1 = dp_dx.dot(error);
            let b2 = dp_dy.dot(error);

            let det = a11 * a22 - a12 * a12;
            if det.abs() < 1e-20 {
                break;
            }

            x = (x + (a22 * b1 - a12 * b2) / det).clamp(0.0, 1.0);
            y = (y + (a11 * b2 - a12 * b1) / det).clamp(0.0, 1.0);
        }

        Some(clamp_coord(face, x, y))
    }

    fn patch_length(&self, radius: f64, lod: u8) -> f64 {
        cube_patch_length(radius, lod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_squared_map_lands_on_unit_sphere() {
        for face in CubeFace::ALL {
            for i in 0..=10 {
                for j in 0..=10 {
                    let (x, y) = (i as f64 / 10.0, j as f64 / 10.0);
                    let p = SquaredDistanceCube.surface_normal(face.index(), x, y);
                    assert!(
                        (p.length() - 1.0).abs() < 1e-12,
                        "{face:?} ({x}, {y}) has length {}",
                        p.length()
                    );
                }
            }
        }
    }

    #[test]
    fn test_face_centre_maps_to_axis() {
        for face in CubeFace::ALL {
            let p = SquaredDistanceCube.surface_point(2.0, face.index(), 0.5, 0.5);
            assert!((p - 2.0 * face.normal()).length() < 1e-12, "{face:?}: {p:?}");
            let q = NormalizedCube.surface_point(2.0, face.index(), 0.5, 0.5);
            assert!((q - 2.0 * face.normal()).length() < 1e-12);
        }
    }

    #[test]
    fn test_normalized_round_trip() {
        for face in CubeFace::ALL {
            for &(x, y) in &[(0.1, 0.9), (0.5, 0.5), (0.73, 0.21)] {
                let p = NormalizedCube.surface_point(3.0, face.index(), x, y);
                let c = NormalizedCube.surface_coord(p).unwrap();
                assert_eq!(c.face, face.index());
                assert!((c.x - x).abs() < EPSILON && (c.y - y).abs() < EPSILON, "{face:?} {c:?}");
            }
        }
    }

    #[test]
    fn test_squared_round_trip() {
        for face in CubeFace::ALL {
            for i in 1..=9 {
                for j in 1..=9 {
                    let (x, y) = (i as f64 / 10.0, j as f64 / 10.0);
                    let p = SquaredDistanceCube.surface_point(1.0, face.index(), x, y);
                    let c = SquaredDistanceCube.surface_coord(p).unwrap();
                    assert_eq!(c.face, face.index(), "face mismatch at ({x}, {y})");
                    assert!(
                        (c.x - x).abs() < EPSILON && (c.y - y).abs() < EPSILON,
                        "{face:?}: ({x}, {y}) recovered as ({}, {})",
                        c.x,
                        c.y
                    );
                }
            }
        }
    }

    #[test]
    fn test_seams_are_continuous_on_sphere() {
        let s = SquaredDistanceCube;
        for face in CubeFace::ALL {
            for side in Side::ALL {
                let link = s.edge_link(face.index(), side).unwrap();
                let (x, y) = side.face_edge_point(0.25);
                let t = if link.flipped { 0.75 } else { 0.25 };
                let (nx, ny) = link.side.face_edge_point(t);
                let a = s.surface_point(1.0, face.index(), x, y);
                let b = s.surface_point(1.0, link.face, nx, ny);
                assert!((a - b).length() < 1e-12, "{face:?} {side:?}");
            }
        }
    }

    #[test]
    fn test_tangent_frame_is_orthonormal() {
        let (t, b) = NormalizedCube.surface_tangents(4, 0.3, 0.6);
        let n = NormalizedCube.surface_normal(4, 0.3, 0.6);
        assert!(t.dot(n).abs() < 1e-9 && b.dot(n).abs() < 1e-9 && t.dot(b).abs() < 1e-9);
        assert!((t.length() - 1.0).abs() < 1e-9 && (b.length() - 1.0).abs() < 1e-9);
        // +Z face: x grows along +X, binormal points to decreasing y (+Y).
        assert!(t.x > 0.9 && b.y > 0.9, "t={t:?} b={b:?}");
    }

    #[test]
    fn test_zero_vector_has_no_coord() {
        assert!(NormalizedCube.surface_coord(DVec3::ZERO).is_none());
        assert!(SquaredDistanceCube.surface_coord(DVec3::ZERO).is_none());
    }
}
