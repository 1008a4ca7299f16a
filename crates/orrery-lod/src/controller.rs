//! Split/merge policy.
//!
//! The controller only judges a single patch from its apparent size; the
//! structural preconditions (leaf, data ready, hysteresis) are checked by the
//! shape when it builds the frame's plan.

use orrery_config::{LodPolicyConfig, PatchConfig};

use crate::PatchNode;

/// Split threshold margin of the texture-driven policy.
const TEXTURE_SPLIT_FACTOR: f64 = 1.01;
/// Merge divisor of the texture-driven policy.
const TEXTURE_MERGE_DIVISOR: f64 = 1.99;
/// Merge happens below `max_vertex_size / VERTEX_MERGE_DIVISOR`.
const VERTEX_MERGE_DIVISOR: f64 = 2.5;
/// Vertex size used by the texture-driven policy when there is no texture.
const FALLBACK_VERTEX_SIZE: f64 = 16.0;

/// What the texture layer knows about a patch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppearanceHint {
    /// Native tile size of the backing texture, if the shape has one.
    pub tile_size: Option<u32>,
    /// Whether finer texture data exists below this patch.
    pub can_split: bool,
}

#[derive(Clone, Debug)]
pub struct LodController {
    policy: LodPolicyConfig,
    base_density: u32,
    max_lod: u8,
}

impl LodController {
    #[must_use]
    pub fn new(config: &PatchConfig) -> Self {
        Self {
            policy: config.lod_policy,
            base_density: config.base_density.max(1),
            max_lod: config.max_lod,
        }
    }

    #[must_use]
    pub fn max_lod(&self) -> u8 {
        self.max_lod
    }

    /// On-screen size of one mesh cell, in pixels.
    #[must_use]
    pub fn vertex_size(&self, node: &PatchNode) -> f64 {
        node.apparent_size / f64::from(self.base_density)
    }

    /// Policy verdict on subdividing `node`. Never true at `max_lod`.
    #[must_use]
    pub fn should_split(&self, node: &PatchNode, hint: AppearanceHint) -> bool {
        if node.lod() >= self.max_lod {
            return false;
        }
        match (self.policy, hint.tile_size) {
            (LodPolicyConfig::TextureDriven, Some(tile)) => {
                node.apparent_size > f64::from(tile) * TEXTURE_SPLIT_FACTOR && hint.can_split
            }
            (LodPolicyConfig::TextureDriven, None) => {
                self.vertex_size(node) > FALLBACK_VERTEX_SIZE
            }
            (LodPolicyConfig::VertexSize { max_vertex_size }, _) => {
                self.vertex_size(node) > max_vertex_size
            }
        }
    }

    /// Policy verdict on folding `node` back into its parent.
    #[must_use]
    pub fn should_merge(&self, node: &PatchNode, hint: AppearanceHint) -> bool {
        match (self.policy, hint.tile_size) {
            (LodPolicyConfig::TextureDriven, Some(tile)) => {
                node.apparent_size < f64::from(tile) / TEXTURE_MERGE_DIVISOR
            }
            (LodPolicyConfig::TextureDriven, None) => {
                self.vertex_size(node) < FALLBACK_VERTEX_SIZE / VERTEX_MERGE_DIVISOR
            }
            (LodPolicyConfig::VertexSize { max_vertex_size }, _) => {
                self.vertex_size(node) < max_vertex_size / VERTEX_MERGE_DIVISOR
            }
        }
    }

    /// Leaves that are not shown get an instance when visible. Roots always do,
    /// so the body stays covered from every direction.
    #[must_use]
    pub fn should_instantiate(node: &PatchNode) -> bool {
        !node.shown && (node.visible || node.lod() == 0) && node.is_leaf()
    }

    /// Shown patches that went out of sight lose their instance, roots excepted.
    #[must_use]
    pub fn should_remove(node: &PatchNode) -> bool {
        node.shown && !node.visible && node.lod() != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use orrery_config::HeightmapConfig;
    use orrery_data::{HeightmapTile, TileHandle};
    use orrery_surface::{PatchId, Quadrant, ShapeFamily};

    fn node(lod: u8, apparent_size: f64) -> PatchNode {
        let mut id = PatchId::root(ShapeFamily::UvSphere, 0);
        for _ in 0..lod {
            id = id.child(Quadrant::BottomLeft);
        }
        let config = HeightmapConfig {
            size: 2,
            border: 0,
            ..Default::default()
        };
        let tile = Arc::new(HeightmapTile::placeholder(&config));
        let mut n = PatchNode::new(id, None, 32, 1.0, TileHandle::new(id, tile));
        n.apparent_size = apparent_size;
        n
    }

    fn vertex_policy(max_lod: u8) -> LodController {
        LodController::new(&PatchConfig {
            base_density: 32,
            max_lod,
            lod_policy: LodPolicyConfig::VertexSize {
                max_vertex_size: 16.0,
            },
            ..Default::default()
        })
    }

    #[test]
    fn test_vertex_size_thresholds() {
        let c = vertex_policy(10);
        let none = AppearanceHint::default();
        // 32 cells: split above 512 px, merge below 204.8 px.
        assert!(c.should_split(&node(2, 513.0), none));
        assert!(!c.should_split(&node(2, 512.0), none));
        assert!(c.should_merge(&node(2, 204.0), none));
        assert!(!c.should_merge(&node(2, 205.0), none));
        assert!(!c.should_split(&node(2, 300.0), none) && !c.should_merge(&node(2, 300.0), none));
    }

    #[test]
    fn test_max_lod_blocks_split() {
        let c = vertex_policy(3);
        assert!(!c.should_split(&node(3, 1e9), AppearanceHint::default()));
        assert!(c.should_split(&node(2, 1e9), AppearanceHint::default()));
    }

    #[test]
    fn test_texture_policy() {
        let c = LodController::new(&PatchConfig {
            lod_policy: LodPolicyConfig::TextureDriven,
            ..Default::default()
        });
        let hint = AppearanceHint {
            tile_size: Some(256),
            can_split: true,
        };
        assert!(c.should_split(&node(1, 260.0), hint));
        assert!(!c.should_split(&node(1, 258.0), hint));
        assert!(!c.should_split(
            &node(1, 1000.0),
            AppearanceHint {
                can_split: false,
                ..hint
            }
        ));
        assert!(c.should_merge(&node(1, 128.0), hint));
        assert!(!c.should_merge(&node(1, 129.0), hint));
    }

    #[test]
    fn test_instantiate_and_remove_rules() {
        let mut root = node(0, 0.0);
        assert!(LodController::should_instantiate(&root), "roots instantiate when hidden");
        root.shown = true;
        root.visible = false;
        assert!(!LodController::should_remove(&root), "roots are never removed");

        let mut leaf = node(2, 0.0);
        assert!(!LodController::should_instantiate(&leaf));
        leaf.visible = true;
        assert!(LodController::should_instantiate(&leaf));
        leaf.shown = true;
        leaf.visible = false;
        assert!(LodController::should_remove(&leaf));
    }
}
