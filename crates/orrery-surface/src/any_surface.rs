//! Tagged dispatch over the shape families.

use glam::DVec3;
use orrery_config::{ShapeConfig, ShapeFamily};

use crate::{
    EdgeLink, FlatTile, GeometrySurface, NormalizedCube, Side, SquaredDistanceCube, SurfaceCoord,
    UvSphere,
};

/// Any of the built-in families, chosen at runtime from configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AnySurface {
    UvSphere(UvSphere),
    NormalizedCube(NormalizedCube),
    SquaredDistanceCube(SquaredDistanceCube),
    FlatTile(FlatTile),
}

impl AnySurface {
    #[must_use]
    pub fn from_config(shape: &ShapeConfig) -> Self {
        match shape.family {
            ShapeFamily::UvSphere => AnySurface::UvSphere(UvSphere),
            ShapeFamily::NormalizedCube => AnySurface::NormalizedCube(NormalizedCube),
            ShapeFamily::SquaredDistanceCube => {
                AnySurface::SquaredDistanceCube(SquaredDistanceCube)
            }
            ShapeFamily::FlatTile => AnySurface::FlatTile(FlatTile::new(shape.flat_tile_size)),
        }
    }

    fn inner(&self) -> &dyn GeometrySurface {
        match self {
            AnySurface::UvSphere(s) => s,
            AnySurface::NormalizedCube(s) => s,
            AnySurface::SquaredDistanceCube(s) => s,
            AnySurface::FlatTile(s) => s,
        }
    }
}

impl GeometrySurface for AnySurface {
    fn family(&self) -> ShapeFamily {
        self.inner().family()
    }

    fn face_count(&self) -> u8 {
        self.inner().face_count()
    }

    fn surface_point(&self, radius: f64, face: u8, x: f64, y: f64) -> DVec3 {
        self.inner().surface_point(radius, face, x, y)
    }

    fn surface_normal(&self, face: u8, x: f64, y: f64) -> DVec3 {
        self.inner().surface_normal(face, x, y)
    }

    fn surface_tangents(&self, face: u8, x: f64, y: f64) -> (DVec3, DVec3) {
        self.inner().surface_tangents(face, x, y)
    }

    fn edge_link(&self, face: u8, side: Side) -> Option<EdgeLink> {
        self.inner().edge_link(face, side)
    }

    fn surface_coord(&self, local: DVec3) -> Option<SurfaceCoord> {
        self.inner().surface_coord(local)
    }

    fn patch_length(&self, radius: f64, lod: u8) -> f64 {
        self.inner().patch_length(radius, lod)
    }

    fn is_planar(&self) -> bool {
        self.inner().is_planar()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_picks_family() {
        for family in [
            ShapeFamily::UvSphere,
            ShapeFamily::NormalizedCube,
            ShapeFamily::SquaredDistanceCube,
            ShapeFamily::FlatTile,
        ] {
            let shape = ShapeConfig {
                family,
                ..Default::default()
            };
            let s = AnySurface::from_config(&shape);
            assert_eq!(s.family(), family);
            assert_eq!(s.face_count(), crate::face_count(family));
        }
    }

    #[test]
    fn test_flat_tile_keeps_configured_size() {
        let shape = ShapeConfig {
            family: ShapeFamily::FlatTile,
            flat_tile_size: 42.0,
            ..Default::default()
        };
        let s = AnySurface::from_config(&shape);
        assert!(s.is_planar());
        assert_eq!(s.patch_length(1.0, 1), 21.0);
    }
}
