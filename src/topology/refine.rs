//! Refinement engine: split selected leaves, then restore 2:1 balance.
//!
//! Every entry point performs the direct splits first and then walks outward
//! from the new leaves, splitting any face (or, in 3D, edge) neighbor that is
//! more than one level coarser, until a fixed point is reached. Each call is a
//! transition from one balanced leaf set to another.

use crate::mesh_error::TreeMeshError;
use crate::topology::key::CellKey;
use crate::topology::tree::{LeafSet, balance_directions};

/// Optional settings for refinement.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RefineOptions {
    /// Deepest level a cell may be split to. `None` leaves the bound to the
    /// request itself: the target levels of point and cell refinement, the
    /// explicit `max_level` of predicate refinement.
    pub max_level: Option<u8>,
    /// Restore 2:1 balance after splitting. Disabling this leaves an
    /// unbalanced tree on which operators are not defined; it exists for
    /// building test fixtures.
    pub balance: bool,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            max_level: None,
            balance: true,
        }
    }
}

impl RefineOptions {
    /// Options splitting down to at most `max_level`.
    pub fn with_max_level(max_level: u8) -> Self {
        Self {
            max_level: Some(max_level),
            ..Self::default()
        }
    }

    fn resolve_max_level(&self, leaves: &LeafSet) -> Result<u8, TreeMeshError> {
        let depth = leaves.codec().depth();
        match self.max_level {
            Some(level) if level > depth => Err(TreeMeshError::LevelOverflow {
                requested: u32::from(level),
                max: u32::from(depth),
            }),
            Some(level) => Ok(level),
            None => Ok(depth),
        }
    }

    /// Cap for predicate refinement: `max_level`, lowered to the configured
    /// bound when one is set.
    fn predicate_cap(&self, leaves: &LeafSet, max_level: u8) -> Result<u8, TreeMeshError> {
        let depth = leaves.codec().depth();
        if max_level > depth {
            return Err(TreeMeshError::LevelOverflow {
                requested: u32::from(max_level),
                max: u32::from(depth),
            });
        }
        Ok(self.resolve_max_level(leaves)?.min(max_level))
    }
}

/// Counts of what a refinement call changed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefineSummary {
    /// Splits requested by the selector.
    pub selected: usize,
    /// Additional splits made to restore balance.
    pub balanced: usize,
}

impl RefineSummary {
    /// `true` if the leaf set was left untouched.
    pub fn is_empty(&self) -> bool {
        self.selected == 0 && self.balanced == 0
    }
}

/// Split every leaf for which `select` holds, re-evaluating `select` on the
/// children, down to `max_level` at most.
pub fn refine_where<F>(
    leaves: &mut LeafSet,
    options: &RefineOptions,
    max_level: u8,
    mut select: F,
) -> Result<RefineSummary, TreeMeshError>
where
    F: FnMut(&CellKey) -> bool,
{
    let max_level = options.predicate_cap(leaves, max_level)?;
    let mut pending: Vec<CellKey> = leaves
        .iter()
        .filter(|key| key.level < max_level)
        .copied()
        .filter(|key| select(key))
        .collect();
    let mut created = Vec::new();
    let mut summary = RefineSummary::default();
    while let Some(key) = pending.pop() {
        let children = leaves.split(&key)?;
        summary.selected += 1;
        for child in children {
            if child.level < max_level && select(&child) {
                pending.push(child);
            } else {
                created.push(child);
            }
        }
    }
    if options.balance {
        summary.balanced = balance(leaves, created)?;
    }
    log::debug!(
        "refine: {} selected splits, {} balancing splits, {} leaves",
        summary.selected,
        summary.balanced,
        leaves.len()
    );
    Ok(summary)
}

/// Split each listed leaf exactly once.
///
/// Keys that are no longer leaves (for instance, split while balancing an
/// earlier key of the list) are skipped.
pub fn refine_keys(
    leaves: &mut LeafSet,
    options: &RefineOptions,
    keys: &[CellKey],
) -> Result<RefineSummary, TreeMeshError> {
    let max_level = options.resolve_max_level(leaves)?;
    if let Some(key) = keys.iter().find(|key| key.level >= max_level) {
        return Err(TreeMeshError::LevelOverflow {
            requested: u32::from(key.level) + 1,
            max: u32::from(max_level),
        });
    }
    let mut created = Vec::new();
    let mut summary = RefineSummary::default();
    for key in keys {
        if !leaves.contains(key) {
            continue;
        }
        created.extend(leaves.split(key)?);
        summary.selected += 1;
    }
    if options.balance {
        summary.balanced = balance(leaves, created)?;
    }
    Ok(summary)
}

/// Split the leaves containing each finest-unit position until the leaf
/// reaches the paired level.
pub fn refine_towards(
    leaves: &mut LeafSet,
    options: &RefineOptions,
    targets: &[([u64; 3], u8)],
) -> Result<RefineSummary, TreeMeshError> {
    let max_level = options.resolve_max_level(leaves)?;
    if let Some((_, level)) = targets.iter().find(|(_, level)| *level > max_level) {
        return Err(TreeMeshError::LevelOverflow {
            requested: u32::from(*level),
            max: u32::from(max_level),
        });
    }
    let mut created = Vec::new();
    let mut summary = RefineSummary::default();
    for (position, level) in targets {
        while let Some(leaf) = leaves.leaf_at(position) {
            if leaf.level >= *level {
                break;
            }
            created.extend(leaves.split(&leaf)?);
            summary.selected += 1;
        }
    }
    if options.balance {
        summary.balanced = balance(leaves, created)?;
    }
    Ok(summary)
}

/// Restore 2:1 balance around `seeds`, returning the number of extra splits.
pub fn balance(leaves: &mut LeafSet, seeds: Vec<CellKey>) -> Result<usize, TreeMeshError> {
    let directions = balance_directions(leaves.codec().dim());
    let mut pending = seeds;
    let mut splits = 0;
    while let Some(key) = pending.pop() {
        if key.level < 2 || !leaves.contains(&key) {
            continue;
        }
        for direction in &directions {
            let Some(p) = leaves.probe(&key, *direction) else {
                continue;
            };
            let Some(other) = leaves.leaf_at(&p) else {
                continue;
            };
            if other.level + 1 < key.level {
                pending.extend(leaves.split(&other)?);
                splits += 1;
                // the split neighbor may still be too coarse
                pending.push(key);
                break;
            }
        }
    }
    Ok(splits)
}
