//! Patch identity, coordinate boxes, edges and quadrants.

use std::fmt;

use orrery_config::{MAX_SUPPORTED_LOD, ShapeFamily};
use serde::{Deserialize, Serialize};

use crate::SurfaceError;

/// Tolerance for comparing dyadic face coordinates.
pub const COORD_EPSILON: f64 = 1e-12;

/// One of the four edges of a patch.
///
/// `North` is the `y0` edge; `y` grows southward from the conventional pole.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    North = 0,
    East = 1,
    South = 2,
    West = 3,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::North, Side::East, Side::South, Side::West];

    #[must_use]
    pub fn opposite(self) -> Side {
        match self {
            Side::North => Side::South,
            Side::East => Side::West,
            Side::South => Side::North,
            Side::West => Side::East,
        }
    }

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Parameter along this edge for face coords: `x` for north/south, `y` for east/west.
    #[must_use]
    pub fn edge_param(self, x: f64, y: f64) -> f64 {
        match self {
            Side::North | Side::South => x,
            Side::East | Side::West => y,
        }
    }

    /// Face coords of the point at parameter `t` along this edge of the whole face.
    #[must_use]
    pub fn face_edge_point(self, t: f64) -> (f64, f64) {
        match self {
            Side::North => (t, 0.0),
            Side::South => (t, 1.0),
            Side::East => (1.0, t),
            Side::West => (0.0, t),
        }
    }
}

/// Child position inside its parent, in storage order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Quadrant {
    BottomLeft = 0,
    BottomRight = 1,
    TopRight = 2,
    TopLeft = 3,
}

impl Quadrant {
    /// Children order: BL, BR, TR, TL.
    pub const ALL: [Quadrant; 4] = [
        Quadrant::BottomLeft,
        Quadrant::BottomRight,
        Quadrant::TopRight,
        Quadrant::TopLeft,
    ];

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Offsets `(dx, dy)` of this quadrant in child-index space.
    #[must_use]
    pub fn offsets(self) -> (u32, u32) {
        match self {
            Quadrant::BottomLeft => (0, 1),
            Quadrant::BottomRight => (1, 1),
            Quadrant::TopRight => (1, 0),
            Quadrant::TopLeft => (0, 0),
        }
    }

    /// Top-left corner of this quadrant in the parent's `[0, 1]²` uv space.
    #[must_use]
    pub fn corner(self) -> (f64, f64) {
        let (dx, dy) = self.offsets();
        (f64::from(dx) * 0.5, f64::from(dy) * 0.5)
    }

    #[must_use]
    pub fn from_offsets(dx: u32, dy: u32) -> Quadrant {
        match (dx & 1, dy & 1) {
            (0, 1) => Quadrant::BottomLeft,
            (1, 1) => Quadrant::BottomRight,
            (1, _) => Quadrant::TopRight,
            _ => Quadrant::TopLeft,
        }
    }
}

/// Closed rectangle `[x0, x1] × [y0, y1]` in face coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatchBox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl PatchBox {
    /// The whole face.
    pub const UNIT: PatchBox = PatchBox {
        x0: 0.0,
        y0: 0.0,
        x1: 1.0,
        y1: 1.0,
    };

    /// Validate and build a box inside `[0, 1]²` with positive extent.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Result<Self, SurfaceError> {
        let inside = |v: f64| (0.0..=1.0).contains(&v);
        if !(inside(x0) && inside(y0) && inside(x1) && inside(y1)) || x0 >= x1 || y0 >= y1 {
            return Err(SurfaceError::InvalidBox { x0, y0, x1, y1 });
        }
        Ok(Self { x0, y0, x1, y1 })
    }

    /// Box of the cell `(ix, iy)` of a `2^lod` grid.
    #[must_use]
    pub fn from_cell(lod: u8, ix: u32, iy: u32) -> Self {
        let dx = (-f64::from(lod)).exp2();
        Self {
            x0: f64::from(ix) * dx,
            y0: f64::from(iy) * dx,
            x1: f64::from(ix + 1) * dx,
            y1: f64::from(iy + 1) * dx,
        }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.x1 - self.x0
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.y1 - self.y0
    }

    #[must_use]
    pub fn centre(&self) -> (f64, f64) {
        (0.5 * (self.x0 + self.x1), 0.5 * (self.y0 + self.y1))
    }

    /// Closed containment test.
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Box covered by a child quadrant.
    #[must_use]
    pub fn quadrant(&self, q: Quadrant) -> PatchBox {
        let (xm, ym) = self.centre();
        match q {
            Quadrant::BottomLeft => PatchBox {
                x0: self.x0,
                y0: ym,
                x1: xm,
                y1: self.y1,
            },
            Quadrant::BottomRight => PatchBox {
                x0: xm,
                y0: ym,
                x1: self.x1,
                y1: self.y1,
            },
            Quadrant::TopRight => PatchBox {
                x0: xm,
                y0: self.y0,
                x1: self.x1,
                y1: ym,
            },
            Quadrant::TopLeft => PatchBox {
                x0: self.x0,
                y0: self.y0,
                x1: xm,
                y1: ym,
            },
        }
    }

    /// Face coords → patch-local `(u, v)` in `[0, 1]²`.
    #[must_use]
    pub fn coord_to_uv(&self, x: f64, y: f64) -> (f64, f64) {
        ((x - self.x0) / self.width(), (y - self.y0) / self.height())
    }

    /// Patch-local `(u, v)` → face coords.
    #[must_use]
    pub fn uv_to_coord(&self, u: f64, v: f64) -> (f64, f64) {
        (self.x0 + u * self.width(), self.y0 + v * self.height())
    }

    /// Interval covered along an edge, in that edge's parameter.
    #[must_use]
    pub fn edge_interval(&self, side: Side) -> (f64, f64) {
        match side {
            Side::North | Side::South => (self.x0, self.x1),
            Side::East | Side::West => (self.y0, self.y1),
        }
    }

    /// Fixed coordinate of an edge (the `y` of north/south, the `x` of east/west).
    #[must_use]
    pub fn edge_coord(&self, side: Side) -> f64 {
        match side {
            Side::North => self.y0,
            Side::South => self.y1,
            Side::East => self.x1,
            Side::West => self.x0,
        }
    }

    /// True if this edge lies on the boundary of the face.
    #[must_use]
    pub fn on_face_boundary(&self, side: Side) -> bool {
        let target = match side {
            Side::North | Side::West => 0.0,
            Side::South | Side::East => 1.0,
        };
        (self.edge_coord(side) - target).abs() < COORD_EPSILON
    }
}

/// Unique identity of a patch: `(family, face, lod, ix, iy)`.
///
/// `ix` counts eastward and `iy` southward in a `2^lod` grid over the face.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatchId {
    pub family: ShapeFamily,
    pub face: u8,
    pub lod: u8,
    pub ix: u32,
    pub iy: u32,
}

impl fmt::Debug for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?}/{}/{}/{}_{}",
            self.family, self.face, self.lod, self.ix, self.iy
        )
    }
}

impl fmt::Display for PatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Number of root faces for a family.
#[must_use]
pub fn face_count(family: ShapeFamily) -> u8 {
    match family {
        ShapeFamily::UvSphere => 2,
        ShapeFamily::NormalizedCube | ShapeFamily::SquaredDistanceCube => 6,
        ShapeFamily::FlatTile => 1,
    }
}

impl PatchId {
    /// Validate and build an identity.
    pub fn new(
        family: ShapeFamily,
        face: u8,
        lod: u8,
        ix: u32,
        iy: u32,
    ) -> Result<Self, SurfaceError> {
        if face >= face_count(family) {
            return Err(SurfaceError::InvalidFace { family, face });
        }
        if lod > MAX_SUPPORTED_LOD {
            return Err(SurfaceError::InvalidLod { lod });
        }
        let grid = 1u32 << lod;
        if ix >= grid || iy >= grid {
            return Err(SurfaceError::IndexOutOfRange { lod, ix, iy });
        }
        Ok(Self {
            family,
            face,
            lod,
            ix,
            iy,
        })
    }

    /// Root patch of a face.
    #[must_use]
    pub fn root(family: ShapeFamily, face: u8) -> Self {
        Self {
            family,
            face,
            lod: 0,
            ix: 0,
            iy: 0,
        }
    }

    /// Every root of a family, in face order.
    #[must_use]
    pub fn roots(family: ShapeFamily) -> Vec<PatchId> {
        (0..face_count(family))
            .map(|f| Self::root(family, f))
            .collect()
    }

    /// Child identity for a quadrant (incremented lod, doubled indices).
    #[must_use]
    pub fn child(&self, q: Quadrant) -> PatchId {
        let (dx, dy) = q.offsets();
        PatchId {
            lod: self.lod + 1,
            ix: self.ix * 2 + dx,
            iy: self.iy * 2 + dy,
            ..*self
        }
    }

    /// The four children in BL, BR, TR, TL order.
    #[must_use]
    pub fn children(&self) -> [PatchId; 4] {
        Quadrant::ALL.map(|q| self.child(q))
    }

    #[must_use]
    pub fn parent(&self) -> Option<PatchId> {
        (self.lod > 0).then(|| PatchId {
            lod: self.lod - 1,
            ix: self.ix / 2,
            iy: self.iy / 2,
            ..*self
        })
    }

    /// Which quadrant of its parent this patch occupies.
    #[must_use]
    pub fn quadrant(&self) -> Option<Quadrant> {
        (self.lod > 0).then(|| Quadrant::from_offsets(self.ix, self.iy))
    }

    /// Ancestor at `lod`, or `self` when `lod >= self.lod`.
    #[must_use]
    pub fn ancestor_at(&self, lod: u8) -> PatchId {
        if lod >= self.lod {
            return *self;
        }
        let shift = self.lod - lod;
        PatchId {
            lod,
            ix: self.ix >> shift,
            iy: self.iy >> shift,
            ..*self
        }
    }

    /// True if `self` is `other` or one of its ancestors.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &PatchId) -> bool {
        self.family == other.family
            && self.face == other.face
            && self.lod <= other.lod
            && other.ancestor_at(self.lod) == *self
    }

    #[must_use]
    pub fn patch_box(&self) -> PatchBox {
        PatchBox::from_cell(self.lod, self.ix, self.iy)
    }
}
