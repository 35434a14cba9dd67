//! Coarsening: merge complete sibling groups back into their parent.
//!
//! A group of `2^dim` siblings is merged when every sibling is a leaf, every
//! sibling is selected, and the merged parent would not sit next to a leaf
//! more than one level finer than itself. Groups that fail these checks are
//! left untouched and reported in [`CoarsenReport::rejected`]; rejection is
//! not an error.

use crate::mesh_error::TreeMeshError;
use crate::topology::key::CellKey;
use crate::topology::tree::{LeafSet, balance_directions};
use std::collections::BTreeSet;

/// Why a sibling group was not merged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoarsenRejection {
    /// At least one sibling has been split further.
    NotAllLeaves,
    /// At least one sibling was not selected.
    NotAllSelected,
    /// The parent would violate 2:1 balance with a finer neighbor.
    WouldUnbalance,
}

/// Outcome of a coarsening pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CoarsenReport {
    /// Parents that replaced their children, finest first.
    pub merged: Vec<CellKey>,
    /// Parents of selected cells that were not merged.
    pub rejected: Vec<(CellKey, CoarsenRejection)>,
}

impl CoarsenReport {
    pub fn is_empty(&self) -> bool {
        self.merged.is_empty() && self.rejected.is_empty()
    }
}

/// Merge sibling groups whose members all satisfy `select`.
///
/// This is a single pass: a parent produced by a merge is not itself
/// considered for merging until the next call.
pub fn coarsen_where<F>(
    leaves: &mut LeafSet,
    mut select: F,
) -> Result<CoarsenReport, TreeMeshError>
where
    F: FnMut(&CellKey) -> bool,
{
    let codec = *leaves.codec();
    let mut selected = BTreeSet::new();
    for key in leaves.iter() {
        if key.level > 0 && select(key) {
            selected.insert(*key);
        }
    }
    let mut parents: Vec<CellKey> = selected
        .iter()
        .filter_map(|key| codec.parent_of(key))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    // finest first, so that a rejected fine merge is settled before its
    // coarser neighbors are checked
    parents.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.cmp(b)));

    let mut report = CoarsenReport::default();
    for parent in parents {
        let children = codec.children_of(&parent)?;
        let verdict = if !children.iter().all(|c| leaves.contains(c)) {
            Some(CoarsenRejection::NotAllLeaves)
        } else if !children.iter().all(|c| selected.contains(c)) {
            Some(CoarsenRejection::NotAllSelected)
        } else if !merge_keeps_balance(leaves, &parent) {
            Some(CoarsenRejection::WouldUnbalance)
        } else {
            None
        };
        match verdict {
            Some(reason) => report.rejected.push((parent, reason)),
            None => {
                leaves.merge(&parent)?;
                report.merged.push(parent);
            }
        }
    }
    if report
        .rejected
        .iter()
        .any(|(_, reason)| *reason == CoarsenRejection::WouldUnbalance)
    {
        log::warn!(
            "coarsen: {} sibling groups kept to preserve 2:1 balance",
            report
                .rejected
                .iter()
                .filter(|(_, r)| *r == CoarsenRejection::WouldUnbalance)
                .count()
        );
    }
    log::debug!(
        "coarsen: {} merged, {} rejected, {} leaves",
        report.merged.len(),
        report.rejected.len(),
        leaves.len()
    );
    Ok(report)
}

/// `true` if no leaf touching `parent` from outside is more than one level
/// finer than `parent`.
fn merge_keeps_balance(leaves: &LeafSet, parent: &CellKey) -> bool {
    let codec = leaves.codec();
    let size = u64::from(codec.size(parent.level));
    for direction in balance_directions(codec.dim()) {
        let Some(block) = codec.neighbor_of(parent, direction) else {
            continue;
        };
        let too_fine = leaves.leaves_within(&block).any(|leaf| {
            if leaf.level <= parent.level + 1 {
                return false;
            }
            let leaf_size = u64::from(codec.size(leaf.level));
            (0..codec.dim()).all(|axis| {
                let a = u64::from(leaf.anchor[axis]);
                let p = u64::from(parent.anchor[axis]);
                match direction[axis] {
                    0 => true,
                    d if d < 0 => a + leaf_size == p,
                    _ => a == p + size,
                }
            })
        });
        if too_fine {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::key::KeyCodec;
    use crate::topology::refine::{RefineOptions, refine_keys};

    fn uniform(counts: &[usize]) -> LeafSet {
        LeafSet::uniform(KeyCodec::new(counts).unwrap())
    }

    #[test]
    fn merges_complete_groups() {
        let mut leaves = uniform(&[2, 2]);
        let before = leaves.clone();
        let key = leaves.codec().key_of(0, [1, 0, 0]).unwrap();
        refine_keys(&mut leaves, &RefineOptions::default(), &[key]).unwrap();
        let report = coarsen_where(&mut leaves, |k| k.level == 1).unwrap();
        assert_eq!(report.merged, vec![key]);
        assert!(report.rejected.is_empty());
        assert_eq!(leaves, before);
    }

    #[test]
    fn partial_selection_is_rejected() {
        let mut leaves = uniform(&[2, 2]);
        let key = leaves.codec().key_of(0, [0, 0, 0]).unwrap();
        let children = leaves.split(&key).unwrap();
        let report = coarsen_where(&mut leaves, |k| *k == children[0]).unwrap();
        assert!(report.merged.is_empty());
        assert_eq!(report.rejected, vec![(key, CoarsenRejection::NotAllSelected)]);
        assert_eq!(leaves.len(), 7);
    }

    #[test]
    fn merge_next_to_finer_cells_is_rejected() {
        let mut leaves = uniform(&[4, 4]);
        let codec = *leaves.codec();
        let left = codec.key_of(0, [0, 0, 0]).unwrap();
        let right = codec.key_of(0, [1, 0, 0]).unwrap();
        leaves.split(&left).unwrap();
        let right_children = leaves.split(&right).unwrap();
        // refine the child of `right` touching `left`
        leaves.split(&right_children[0]).unwrap();
        leaves.check_balance().unwrap();
        let report =
            coarsen_where(&mut leaves, |k| k.level == 1 && codec.covers(&left, k)).unwrap();
        assert_eq!(report.rejected, vec![(left, CoarsenRejection::WouldUnbalance)]);
        leaves.check_balance().unwrap();
    }

    #[test]
    fn split_siblings_are_not_leaves() {
        let mut leaves = uniform(&[2, 2]);
        let key = leaves.codec().key_of(0, [0, 0, 0]).unwrap();
        let children = leaves.split(&key).unwrap();
        leaves.split(&children[3]).unwrap();
        let report = coarsen_where(&mut leaves, |k| k.level == 1).unwrap();
        assert_eq!(report.rejected, vec![(key, CoarsenRejection::NotAllLeaves)]);
    }
}
