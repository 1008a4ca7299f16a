//! Shared tile handles with an offset/scale window into the tile.
//!
//! A patch whose own tile is not ready borrows an ancestor's tile through a
//! window covering its quadrant. Windows compose by halving the scale and
//! moving the offset to the quadrant corner, so a chain of fallbacks stays a
//! single `(offset, scale)` pair.

use std::sync::Arc;

use glam::DVec2;
use orrery_surface::{PatchId, Quadrant};

/// Reference-counted tile plus the window of it a patch uses.
#[derive(Debug)]
pub struct TileHandle<T> {
    tile: Arc<T>,
    /// Patch that owns the tile.
    pub source: PatchId,
    /// Window origin, in `[0, 1)²`.
    pub offset: DVec2,
    /// Window size, in `(0, 1]²`.
    pub scale: DVec2,
}

impl<T> Clone for TileHandle<T> {
    fn clone(&self) -> Self {
        Self {
            tile: Arc::clone(&self.tile),
            source: self.source,
            offset: self.offset,
            scale: self.scale,
        }
    }
}

impl<T> TileHandle<T> {
    /// Handle covering the whole tile of `source`.
    pub fn new(source: PatchId, tile: Arc<T>) -> Self {
        Self {
            tile,
            source,
            offset: DVec2::ZERO,
            scale: DVec2::ONE,
        }
    }

    /// Handle for a child quadrant, sharing the same tile.
    #[must_use]
    pub fn derive_child(&self, q: Quadrant) -> Self {
        let (cx, cy) = q.corner();
        Self {
            tile: Arc::clone(&self.tile),
            source: self.source,
            offset: self.offset + DVec2::new(cx, cy) * self.scale,
            scale: self.scale * 0.5,
        }
    }

    /// Handle for `target`, a descendant of `self.source`'s window owner `from`.
    #[must_use]
    pub fn derive_descendant(&self, from: &PatchId, target: &PatchId) -> Self {
        let mut handle = self.clone();
        for lod in from.lod + 1..=target.lod {
            if let Some(q) = target.ancestor_at(lod).quadrant() {
                handle = handle.derive_child(q);
            }
        }
        handle
    }

    /// Map patch-local `(u, v)` into tile coordinates.
    #[inline]
    #[must_use]
    pub fn map_uv(&self, u: f64, v: f64) -> DVec2 {
        self.offset + DVec2::new(u, v) * self.scale
    }

    /// True when the handle reads the patch's own tile.
    #[must_use]
    pub fn is_own(&self, id: &PatchId) -> bool {
        self.source == *id
    }

    pub fn tile(&self) -> &T {
        &self.tile
    }
}

/// Outcome of asking a store for a patch's tile.
#[derive(Debug, Clone)]
pub enum TileRequest<T> {
    /// The patch's own tile is cached.
    Ready(TileHandle<T>),
    /// A job is queued or running; keep the fallback until it completes.
    Pending,
    /// No tile will be made for this patch; the fallback is final.
    Inherit,
}
