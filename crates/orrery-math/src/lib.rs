//! Double-precision bounding volumes and culling primitives shared by the
//! surface and LOD crates.

mod aabb;
mod frustum;
mod horizon;

pub use aabb::Aabb;
pub use frustum::Frustum;
pub use horizon::HorizonCuller;
