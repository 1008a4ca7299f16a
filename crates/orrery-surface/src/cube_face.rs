//! The six faces of a cube-sphere, their basis vectors and how their edges meet.

use glam::DVec3;

use crate::{EdgeLink, Side};

/// The six faces of the cube.
///
/// Each variant corresponds to a face whose outward normal points
/// along the named axis direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CubeFace {
    PosX = 0,
    NegX = 1,
    PosY = 2,
    NegY = 3,
    PosZ = 4,
    NegZ = 5,
}

impl CubeFace {
    /// All six faces in canonical order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PosX,
        CubeFace::NegX,
        CubeFace::PosY,
        CubeFace::NegY,
        CubeFace::PosZ,
        CubeFace::NegZ,
    ];

    /// Face for a patch face index. Out-of-range indices wrap.
    #[must_use]
    pub fn from_index(face: u8) -> CubeFace {
        Self::ALL[usize::from(face) % 6]
    }

    #[must_use]
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Outward-pointing unit normal.
    #[must_use]
    pub fn normal(self) -> DVec3 {
        match self {
            CubeFace::PosX => DVec3::X,
            CubeFace::NegX => DVec3::NEG_X,
            CubeFace::PosY => DVec3::Y,
            CubeFace::NegY => DVec3::NEG_Y,
            CubeFace::PosZ => DVec3::Z,
            CubeFace::NegZ => DVec3::NEG_Z,
        }
    }

    /// Direction of increasing `x` on this face.
    #[must_use]
    pub fn tangent(self) -> DVec3 {
        match self {
            CubeFace::PosX => DVec3::NEG_Z,
            CubeFace::NegX => DVec3::Z,
            CubeFace::PosY | CubeFace::NegY | CubeFace::PosZ => DVec3::X,
            CubeFace::NegZ => DVec3::NEG_X,
        }
    }

    /// Direction of decreasing `y` (toward the north edge).
    #[must_use]
    pub fn bitangent(self) -> DVec3 {
        match self {
            CubeFace::PosX | CubeFace::NegX | CubeFace::PosZ | CubeFace::NegZ => DVec3::Y,
            CubeFace::PosY => DVec3::NEG_Z,
            CubeFace::NegY => DVec3::Z,
        }
    }

    /// Face whose normal is closest to `dir`.
    ///
    /// Ties go to X over Y over Z, positive over negative.
    #[must_use]
    pub fn from_direction(dir: DVec3) -> CubeFace {
        let a = dir.abs();
        if a.x >= a.y && a.x >= a.z {
            if dir.x >= 0.0 { CubeFace::PosX } else { CubeFace::NegX }
        } else if a.y >= a.z {
            if dir.y >= 0.0 { CubeFace::PosY } else { CubeFace::NegY }
        } else if dir.z >= 0.0 {
            CubeFace::PosZ
        } else {
            CubeFace::NegZ
        }
    }

    /// Point on the `[-1, 1]` cube for face coords.
    #[must_use]
    pub fn cube_point(self, x: f64, y: f64) -> DVec3 {
        self.normal() + (2.0 * x - 1.0) * self.tangent() + (1.0 - 2.0 * y) * self.bitangent()
    }

    /// Face coords of a direction projected onto this face's plane.
    ///
    /// Returns the face centre for directions parallel to the plane.
    #[must_use]
    pub fn project(self, dir: DVec3) -> (f64, f64) {
        let d = dir.dot(self.normal());
        if d.abs() < 1e-30 {
            return (0.5, 0.5);
        }
        let q = dir / d;
        ((q.dot(self.tangent()) + 1.0) * 0.5, (1.0 - q.dot(self.bitangent())) * 0.5)
    }

    /// Outward direction of an edge within the face plane.
    #[must_use]
    pub fn side_direction(self, side: Side) -> DVec3 {
        match side {
            Side::North => self.bitangent(),
            Side::South => -self.bitangent(),
            Side::East => self.tangent(),
            Side::West => -self.tangent(),
        }
    }

    /// Edge of this face whose outward direction best matches `dir`.
    #[must_use]
    pub fn side_towards(self, dir: DVec3) -> Side {
        let b = dir.dot(self.bitangent());
        let t = dir.dot(self.tangent());
        if b.abs() >= t.abs() {
            if b >= 0.0 { Side::North } else { Side::South }
        } else if t >= 0.0 {
            Side::East
        } else {
            Side::West
        }
    }

    /// Which face continues across `side`, which of its edges is shared, and
    /// whether the edge parameter runs backwards over there.
    #[must_use]
    pub fn edge_link(self, side: Side) -> EdgeLink {
        let neighbor = CubeFace::from_direction(self.side_direction(side));
        let neighbor_side = neighbor.side_towards(self.normal());

        let (x, y) = side.face_edge_point(0.0);
        let (nx, ny) = neighbor.project(self.cube_point(x, y));
        let flipped = neighbor_side.edge_param(nx, ny) > 0.5;

        EdgeLink {
            face: neighbor.index(),
            side: neighbor_side,
            flipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-12;

    #[test]
    fn test_normals_are_unit_length() {
        for face in CubeFace::ALL {
            let n = face.normal();
            assert!(
                (n.length() - 1.0).abs() < EPSILON,
                "Normal for {face:?} is not unit length: {}",
                n.length()
            );
        }
    }

    #[test]
    fn test_tangent_cross_bitangent_equals_normal() {
        for face in CubeFace::ALL {
            let cross = face.tangent().cross(face.bitangent());
            assert!(
                (cross - face.normal()).length() < EPSILON,
                "tangent x bitangent != normal for {face:?}: got {cross:?}"
            );
        }
    }

    #[test]
    fn test_project_inverts_cube_point() {
        for face in CubeFace::ALL {
            for &(x, y) in &[(0.1, 0.2), (0.5, 0.5), (0.9, 0.35)] {
                let p = face.cube_point(x, y);
                assert_eq!(CubeFace::from_direction(p), face);
                let (px, py) = face.project(p);
                assert!(
                    (px - x).abs() < EPSILON && (py - y).abs() < EPSILON,
                    "{face:?}: ({x}, {y}) came back as ({px}, {py})"
                );
            }
        }
    }

    #[test]
    fn test_face_centre_is_normal() {
        for face in CubeFace::ALL {
            assert_eq!(face.cube_point(0.5, 0.5), face.normal());
        }
    }

    #[test]
    fn test_edge_links_are_symmetric() {
        for face in CubeFace::ALL {
            for side in Side::ALL {
                let link = face.edge_link(side);
                let back = CubeFace::from_index(link.face).edge_link(link.side);
                assert_eq!(back.face, face.index(), "{face:?} {side:?}");
                assert_eq!(back.side, side, "{face:?} {side:?}");
                assert_eq!(back.flipped, link.flipped, "{face:?} {side:?}");
                assert_ne!(link.face, face.index());
            }
        }
    }

    #[test]
    fn test_edge_links_join_the_same_cube_points() {
        for face in CubeFace::ALL {
            for side in Side::ALL {
                let link = face.edge_link(side);
                let other = CubeFace::from_index(link.face);
                for &t in &[0.0, 0.3, 1.0] {
                    let (x, y) = side.face_edge_point(t);
                    let nt = if link.flipped { 1.0 - t } else { t };
                    let (nx, ny) = link.side.face_edge_point(nt);
                    let a = face.cube_point(x, y);
                    let b = other.cube_point(nx, ny);
                    assert!(
                        (a - b).length() < EPSILON,
                        "{face:?} {side:?} t={t}: {a:?} vs {b:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_every_face_has_four_distinct_neighbors() {
        for face in CubeFace::ALL {
            let mut faces: Vec<u8> = Side::ALL.iter().map(|s| face.edge_link(*s).face).collect();
            faces.sort_unstable();
            faces.dedup();
            assert_eq!(faces.len(), 4, "{face:?}");
            assert!(!faces.contains(&face.index()));
        }
    }
}
