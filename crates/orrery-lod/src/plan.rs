//! The ordered work list of one frame.

use orrery_surface::PatchId;

/// Changes emitted by one update, in application order.
///
/// Each list is sorted by ascending camera distance. `split` holds only the
/// splits taken this frame; the rest wait for the next frame's budget.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ApplyPlan {
    /// Parents whose four children became ready: hide the parent, show the children.
    pub show_children: Vec<PatchId>,
    pub split: Vec<PatchId>,
    /// Patches given an instance, hidden until their data is ready.
    pub instantiate: Vec<PatchId>,
    /// Patches whose pending instance became ready, including parents completing a merge.
    pub show: Vec<PatchId>,
    /// Leaves that went out of sight and dropped their instance.
    pub remove: Vec<PatchId>,
    /// Parents that started merging their children.
    pub merge: Vec<PatchId>,
    /// Split candidates left over after the per-frame budget.
    pub deferred_splits: usize,
}

impl ApplyPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.show_children.is_empty()
            && self.split.is_empty()
            && self.instantiate.is_empty()
            && self.show.is_empty()
            && self.remove.is_empty()
            && self.merge.is_empty()
    }
}

/// Candidates gathered during traversal, keyed by distance for sorting.
#[derive(Debug, Default)]
pub(crate) struct PlanBuilder {
    pub show_children: Vec<(f64, PatchId)>,
    pub split: Vec<(f64, PatchId)>,
    pub instantiate: Vec<(f64, PatchId)>,
    pub show: Vec<(f64, PatchId)>,
    pub remove: Vec<(f64, PatchId)>,
    pub merge: Vec<(f64, PatchId)>,
}

fn sorted(mut list: Vec<(f64, PatchId)>) -> Vec<PatchId> {
    list.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    list.into_iter().map(|(_, id)| id).collect()
}

impl PlanBuilder {
    /// Sort every list and cut the splits down to `split_budget`.
    pub fn finish(self, split_budget: usize) -> ApplyPlan {
        let mut split = sorted(self.split);
        let deferred_splits = split.len().saturating_sub(split_budget);
        split.truncate(split_budget);
        ApplyPlan {
            show_children: sorted(self.show_children),
            split,
            instantiate: sorted(self.instantiate),
            show: sorted(self.show),
            remove: sorted(self.remove),
            merge: sorted(self.merge),
            deferred_splits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orrery_surface::{Quadrant, ShapeFamily};

    #[test]
    fn test_lists_sorted_and_splits_capped() {
        let root = PatchId::root(ShapeFamily::NormalizedCube, 0);
        let [a, b, c, d] = root.children();
        let builder = PlanBuilder {
            split: vec![(3.0, a), (1.0, b), (2.0, c), (0.5, d)],
            show: vec![(2.0, a), (1.0, root)],
            ..Default::default()
        };
        let plan = builder.finish(2);
        assert_eq!(plan.split, vec![d, b]);
        assert_eq!(plan.deferred_splits, 2);
        assert_eq!(plan.show, vec![root, a]);
        assert!(!plan.is_empty());
        assert_eq!(root.child(Quadrant::BottomLeft), a);
    }

    #[test]
    fn test_ties_broken_by_identity() {
        let root = PatchId::root(ShapeFamily::UvSphere, 1);
        let other = PatchId::root(ShapeFamily::UvSphere, 0);
        let plan = PlanBuilder {
            remove: vec![(1.0, root), (1.0, other)],
            ..Default::default()
        }
        .finish(2);
        assert_eq!(plan.remove, vec![other, root]);
        assert!(PlanBuilder::default().finish(2).is_empty());
    }
}
