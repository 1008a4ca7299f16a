//! Two hemispheres in spherical coordinates.
//!
//! Face 0 covers the northern hemisphere with `y = 0` at the pole. Face 1 is
//! its mirror: `y = 0` at the south pole, `y = 1` on the equator. Both faces
//! share the longitude convention `φ = 2πx - π`, so their south edges meet
//! along the equator without a flip.

use std::f64::consts::{PI, TAU};

use glam::DVec3;
use orrery_config::ShapeFamily;

use crate::{EdgeLink, GeometrySurface, Side, SurfaceCoord};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UvSphere;

impl UvSphere {
    /// Latitude fraction over the whole sphere, 0 at the north pole.
    #[inline]
    fn global_y(face: u8, y: f64) -> f64 {
        if face == 0 { 0.5 * y } else { 1.0 - 0.5 * y }
    }
}

impl GeometrySurface for UvSphere {
    fn family(&self) -> ShapeFamily {
        ShapeFamily::UvSphere
    }

    fn face_count(&self) -> u8 {
        2
    }

    fn surface_point(&self, radius: f64, face: u8, x: f64, y: f64) -> DVec3 {
        radius * self.surface_normal(face, x, y)
    }

    fn surface_normal(&self, face: u8, x: f64, y: f64) -> DVec3 {
        let theta = PI * Self::global_y(face, y);
        let phi = TAU * x - PI;
        let (st, ct) = theta.sin_cos();
        let (sp, cp) = phi.sin_cos();
        DVec3::new(st * cp, st * sp, ct)
    }

    fn edge_link(&self, face: u8, side: Side) -> Option<EdgeLink> {
        match side {
            Side::North => None,
            Side::South => Some(EdgeLink {
                face: 1 - face.min(1),
                side: Side::South,
                flipped: false,
            }),
            Side::East | Side::West => Some(EdgeLink {
                face,
                side: side.opposite(),
                flipped: false,
            }),
        }
    }

    fn surface_coord(&self, local: DVec3) -> Option<SurfaceCoord> {
        let r = local.length();
        if r == 0.0 {
            return None;
        }
        let gy = (local.z / r).clamp(-1.0, 1.0).acos() / PI;
        let x = ((local.y.atan2(local.x) + PI) / TAU).clamp(0.0, 1.0);
        let (face, y) = if gy <= 0.5 {
            (0, 2.0 * gy)
        } else {
            (1, 2.0 * (1.0 - gy))
        };
        Some(SurfaceCoord { face, x, y })
    }

    /// Pole-to-equator arc per root patch, halving with each level.
    fn patch_length(&self, radius: f64, lod: u8) -> f64 {
        std::f64::consts::FRAC_PI_2 * radius * (-f64::from(lod)).exp2()
    }
}
