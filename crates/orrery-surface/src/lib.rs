//! Parametric surfaces for patched bodies.
//!
//! A body is covered by one quadtree per face. Each shape family maps face
//! coordinates `(x, y) ∈ [0, 1]²` to points on its surface and declares how
//! face edges join, which lets the quadtree and its adjacency bookkeeping stay
//! agnostic of the family.

mod any_surface;
mod cube_face;
mod cube_sphere;
mod error;
mod flat_tile;
mod patch_id;
mod surface;
mod uv_sphere;

pub use any_surface::AnySurface;
pub use cube_face::CubeFace;
pub use cube_sphere::{NormalizedCube, SquaredDistanceCube, squared_distance_map};
pub use error::SurfaceError;
pub use flat_tile::FlatTile;
pub use orrery_config::ShapeFamily;
pub use patch_id::{COORD_EPSILON, PatchBox, PatchId, Quadrant, Side, face_count};
pub use surface::{EdgeLink, GeometrySurface, SurfaceCoord};
pub use uv_sphere::UvSphere;
