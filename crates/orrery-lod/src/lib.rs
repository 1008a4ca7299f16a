//! Adaptive level of detail for patched bodies.
//!
//! A [`PatchedShape`] keeps one quadtree of [`PatchNode`]s per surface face.
//! Every frame it measures how large each patch appears on screen, splits
//! and merges patches through a [`LodController`] and reports the changes as
//! an [`ApplyPlan`]. Heightmaps and textures arrive asynchronously; until
//! they do, patches read their ancestors' data.

mod arena;
mod camera;
mod controller;
mod error;
mod node;
mod plan;
mod renderable;
mod shape;
mod visibility;

pub use arena::{PatchArena, PatchHandle};
pub use camera::{BodyPose, CameraState, FixedPose, Lens, PoseProvider};
pub use controller::{AppearanceHint, LodController};
pub use error::ShapeError;
pub use node::{InstanceTask, PatchNode};
pub use plan::ApplyPlan;
pub use renderable::{RenderablePatch, SurfaceFrame};
pub use shape::{PatchedShape, ShapeStats};
pub use visibility::{PatchVisibility, VisibilityTester, clamped_far_plane};
