//! A single square planar tile at height `radius` above the `z = 0` plane.

use glam::DVec3;
use orrery_config::ShapeFamily;

use crate::{EdgeLink, GeometrySurface, Side, SurfaceCoord};

/// Square tile of edge `size` centred on the z axis; `x` grows along +X, `y` along -Y.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlatTile {
    pub size: f64,
}

impl FlatTile {
    #[must_use]
    pub fn new(size: f64) -> Self {
        Self { size }
    }
}

impl GeometrySurface for FlatTile {
    fn family(&self) -> ShapeFamily {
        ShapeFamily::FlatTile
    }

    fn face_count(&self) -> u8 {
        1
    }

    fn surface_point(&self, radius: f64, _face: u8, x: f64, y: f64) -> DVec3 {
        DVec3::new((x - 0.5) * self.size, (0.5 - y) * self.size, radius)
    }

    fn surface_normal(&self, _face: u8, _x: f64, _y: f64) -> DVec3 {
        DVec3::Z
    }

    fn surface_tangents(&self, _face: u8, _x: f64, _y: f64) -> (DVec3, DVec3) {
        (DVec3::X, DVec3::Y)
    }

    fn edge_link(&self, _face: u8, _side: Side) -> Option<EdgeLink> {
        None
    }

    fn surface_coord(&self, local: DVec3) -> Option<SurfaceCoord> {
        let x = local.x / self.size + 0.5;
        let y = 0.5 - local.y / self.size;
        ((0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y)).then_some(SurfaceCoord {
            face: 0,
            x,
            y,
        })
    }

    fn patch_length(&self, _radius: f64, lod: u8) -> f64 {
        self.size * (-f64::from(lod)).exp2()
    }

    fn is_planar(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PatchBox;

    #[test]
    fn test_centre_at_origin_column() {
        let t = FlatTile::new(100.0);
        let c = t.centre(5.0, 0, &PatchBox::UNIT, DVec3::ZERO);
        assert_eq!(c, DVec3::new(0.0, 0.0, 5.0));
    }

    #[test]
    fn test_coord_round_trip_and_outside() {
        let t = FlatTile::new(10.0);
        let p = t.surface_point(0.0, 0, 0.25, 0.75);
        let c = t.surface_coord(p + DVec3::Z * 3.0).unwrap();
        assert!((c.x - 0.25).abs() < 1e-12 && (c.y - 0.75).abs() < 1e-12);
        assert!(t.surface_coord(DVec3::new(6.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn test_aabb_spans_height_range_exactly() {
        let t = FlatTile::new(8.0);
        let b = PatchBox::from_cell(1, 0, 0);
        let aabb = t.aabb(-1.0, 2.0, 0, &b, DVec3::ZERO);
        assert_eq!(aabb.min, DVec3::new(-4.0, 0.0, -1.0));
        assert_eq!(aabb.max, DVec3::new(0.0, 4.0, 2.0));
    }

    #[test]
    fn test_no_links() {
        let t = FlatTile::new(1.0);
        for side in Side::ALL {
            assert!(t.edge_link(0, side).is_none());
        }
    }
}
