//! Generational slot storage for patch nodes.
//!
//! The adjacency graph has cycles at every face corner, so nodes refer to
//! each other through handles instead of references. A freed slot bumps its
//! generation; stale handles then resolve to nothing.

use crate::PatchNode;

/// Stable handle to a node in a [`PatchArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatchHandle {
    index: u32,
    generation: u32,
}

impl PatchHandle {
    #[must_use]
    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<PatchNode>,
}

#[derive(Debug, Default)]
pub struct PatchArena {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    len: usize,
}

impl PatchArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, node: PatchNode) -> PatchHandle {
        self.len += 1;
        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.node = Some(node);
            return PatchHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        PatchHandle {
            index,
            generation: 0,
        }
    }

    pub fn remove(&mut self, handle: PatchHandle) -> Option<PatchNode> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation {
            return None;
        }
        let node = slot.node.take()?;
        self.free_list.push(handle.index);
        self.len -= 1;
        Some(node)
    }

    #[must_use]
    pub fn get(&self, handle: PatchHandle) -> Option<&PatchNode> {
        self.slots
            .get(handle.index())
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.node.as_ref())
    }

    pub fn get_mut(&mut self, handle: PatchHandle) -> Option<&mut PatchNode> {
        self.slots
            .get_mut(handle.index())
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.node.as_mut())
    }

    #[must_use]
    pub fn contains(&self, handle: PatchHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Live nodes in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (PatchHandle, &PatchNode)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.node.as_ref().map(|n| {
                (
                    PatchHandle {
                        index: i as u32,
                        generation: s.generation,
                    },
                    n,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PatchHandle, &mut PatchNode)> {
        self.slots.iter_mut().enumerate().filter_map(|(i, s)| {
            let generation = s.generation;
            s.node.as_mut().map(|n| {
                (
                    PatchHandle {
                        index: i as u32,
                        generation,
                    },
                    n,
                )
            })
        })
    }

    #[must_use]
    pub fn handles(&self) -> Vec<PatchHandle> {
        self.iter().map(|(h, _)| h).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use orrery_config::HeightmapConfig;
    use orrery_data::{HeightmapTile, TileHandle};
    use orrery_surface::{PatchId, ShapeFamily};

    fn node(face: u8) -> PatchNode {
        let id = PatchId::root(ShapeFamily::NormalizedCube, face);
        let config = HeightmapConfig {
            size: 2,
            border: 0,
            ..Default::default()
        };
        let tile = Arc::new(HeightmapTile::placeholder(&config));
        PatchNode::new(id, None, 16, 1.0, TileHandle::new(id, tile))
    }

    #[test]
    fn test_insert_get_remove() {
        let mut arena = PatchArena::new();
        let a = arena.insert(node(0));
        let b = arena.insert(node(1));
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.get(b).map(|n| n.id.face), Some(1));
        let removed = arena.remove(a).unwrap();
        assert_eq!(removed.id.face, 0);
        assert!(arena.get(a).is_none());
        assert!(arena.remove(a).is_none(), "double remove is a no-op");
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let mut arena = PatchArena::new();
        let a = arena.insert(node(0));
        arena.remove(a);
        let c = arena.insert(node(2));
        assert_eq!(a.index(), c.index(), "slot reused");
        assert_ne!(a, c);
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(c).map(|n| n.id.face), Some(2));
    }

    #[test]
    fn test_iteration_skips_free_slots() {
        let mut arena = PatchArena::new();
        let handles: Vec<_> = (0..4).map(|f| arena.insert(node(f))).collect();
        arena.remove(handles[1]);
        let faces: Vec<u8> = arena.iter().map(|(_, n)| n.id.face).collect();
        assert_eq!(faces, vec![0, 2, 3]);
        for (_, n) in arena.iter_mut() {
            n.shown = true;
        }
        assert!(arena.iter().all(|(_, n)| n.shown));
        assert_eq!(arena.handles().len(), 3);
    }
}
