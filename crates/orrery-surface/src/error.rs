//! Errors raised when building surface identities from untrusted input.

use orrery_config::ShapeFamily;

/// Invalid patch identity or coordinate box.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SurfaceError {
    /// Face index out of range for the family.
    #[error("face {face} does not exist on {family:?}")]
    InvalidFace { family: ShapeFamily, face: u8 },

    /// Level of detail beyond the supported depth.
    #[error("lod {lod} exceeds the supported depth")]
    InvalidLod { lod: u8 },

    /// Grid index outside the `2^lod` grid.
    #[error("cell ({ix}, {iy}) is outside the lod {lod} grid")]
    IndexOutOfRange { lod: u8, ix: u32, iy: u32 },

    /// Box is empty or leaves the unit square.
    #[error("invalid patch box [{x0}, {x1}] x [{y0}, {y1}]")]
    InvalidBox { x0: f64, y0: f64, x1: f64, y1: f64 },
}
