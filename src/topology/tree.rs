//! Tree topology store: the set of leaf cells of a quad/octree.
//!
//! Leaves are kept in a `BTreeMap` keyed by the Morton code of their anchor.
//! Because every leaf covers a contiguous Morton range, the leaf containing
//! any finest-unit position is the greatest key not exceeding that position's
//! code. Interior tree nodes are never stored; they are implied by the keys.

use crate::mesh_error::TreeMeshError;
use crate::topology::key::{CellKey, KeyCodec, KeyType, encode_morton};
use std::collections::BTreeMap;

/// Result of a neighbor lookup across one face of a leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Neighbor<T> {
    /// The face lies on the domain boundary.
    Boundary,
    /// A single leaf of the same or a coarser level covers the face.
    Conforming(T),
    /// Several finer leaves abut the face; the queried cell's side is hanging.
    Finer(Vec<T>),
}

impl<T> Neighbor<T> {
    /// Apply `f` to every cell in the result.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Neighbor<U> {
        match self {
            Neighbor::Boundary => Neighbor::Boundary,
            Neighbor::Conforming(c) => Neighbor::Conforming(f(c)),
            Neighbor::Finer(cells) => Neighbor::Finer(cells.into_iter().map(f).collect()),
        }
    }
}

/// Offsets to the face neighbors (and, in 3D, edge neighbors) that the 2:1
/// balance rule constrains.
pub fn balance_directions(dim: usize) -> Vec<[i64; 3]> {
    let mut dirs = Vec::new();
    let range = |axis: usize| if axis < dim { -1..=1 } else { 0..=0 };
    for dz in range(2) {
        for dy in range(1) {
            for dx in range(0) {
                let d = [dx, dy, dz];
                let nonzero = d.iter().filter(|v| **v != 0).count();
                if nonzero == 1 || (dim == 3 && nonzero == 2) {
                    dirs.push(d);
                }
            }
        }
    }
    dirs
}

/// The active leaf set.
#[derive(Clone, Debug, PartialEq)]
pub struct LeafSet {
    codec: KeyCodec,
    leaves: BTreeMap<KeyType, CellKey>,
}

impl LeafSet {
    /// All cells of the base grid at level 0.
    pub fn uniform(codec: KeyCodec) -> Self {
        let base = codec.base_counts();
        let size = codec.size(0);
        let mut leaves = BTreeMap::new();
        for k in 0..base[2] {
            for j in 0..base[1] {
                for i in 0..base[0] {
                    let key = CellKey::new(0, [i * size, j * size, k * size]);
                    leaves.insert(codec.encode(&key), key);
                }
            }
        }
        Self { codec, leaves }
    }

    /// Rebuild from an explicit key list, checking that the keys tile the domain.
    pub fn from_keys(
        codec: KeyCodec,
        keys: impl IntoIterator<Item = CellKey>,
    ) -> Result<Self, TreeMeshError> {
        let mut leaves = BTreeMap::new();
        for key in keys {
            codec.validate(&key)?;
            if leaves.insert(codec.encode(&key), key).is_some() {
                return Err(TreeMeshError::Configuration(format!(
                    "duplicate cell {key:?}"
                )));
            }
        }
        let set = Self { codec, leaves };
        set.check_tiling()
            .map_err(|e| TreeMeshError::Configuration(e.to_string()))?;
        Ok(set)
    }

    #[inline]
    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Leaves in Morton order.
    pub fn iter(&self) -> impl Iterator<Item = &CellKey> + '_ {
        self.leaves.values()
    }

    /// `true` if `key` is currently a leaf.
    pub fn contains(&self, key: &CellKey) -> bool {
        self.leaves.get(&self.codec.encode(key)) == Some(key)
    }

    /// Leaf containing the finest-unit position `p`, `None` outside the domain.
    pub fn leaf_at(&self, p: &[u64; 3]) -> Option<CellKey> {
        let extent = self.codec.extent();
        let dim = self.codec.dim();
        if (0..dim).any(|axis| p[axis] >= extent[axis]) {
            return None;
        }
        let anchor = [p[0] as u32, p[1] as u32, p[2] as u32];
        let code = encode_morton(&anchor, dim);
        let (_, leaf) = self.leaves.range(..=code).next_back()?;
        self.codec.contains(leaf, p).then_some(*leaf)
    }

    /// Leaves whose anchors fall inside the Morton range of `block`.
    pub fn leaves_within<'a>(&'a self, block: &CellKey) -> impl Iterator<Item = &'a CellKey> + 'a {
        let (start, end) = self.codec.morton_range(block);
        self.leaves.range(start..end).map(|(_, k)| k)
    }

    /// Finest-unit position just across `key`'s boundary in `direction`,
    /// aligned with the key's anchor on the axes where `direction` is 0.
    pub fn probe(&self, key: &CellKey, direction: [i64; 3]) -> Option<[u64; 3]> {
        let extent = self.codec.extent();
        let size = u64::from(self.codec.size(key.level));
        let mut p = [0u64; 3];
        for axis in 0..self.codec.dim() {
            let a = u64::from(key.anchor[axis]);
            p[axis] = match direction[axis] {
                0 => a,
                d if d < 0 => a.checked_sub(1)?,
                _ => {
                    if a + size >= extent[axis] {
                        return None;
                    }
                    a + size
                }
            };
        }
        Some(p)
    }

    /// Neighbor of `key` across the face normal to `axis` on `side` (0 = minus, 1 = plus).
    pub fn neighbor(&self, key: &CellKey, axis: usize, side: usize) -> Neighbor<CellKey> {
        let mut direction = [0i64; 3];
        direction[axis] = if side == 0 { -1 } else { 1 };
        let Some(p) = self.probe(key, direction) else {
            return Neighbor::Boundary;
        };
        let Some(leaf) = self.leaf_at(&p) else {
            return Neighbor::Boundary;
        };
        if leaf.level <= key.level {
            return Neighbor::Conforming(leaf);
        }
        let Some(block) = self.codec.neighbor_of(key, direction) else {
            return Neighbor::Boundary;
        };
        let face = if side == 0 {
            u64::from(key.anchor[axis])
        } else {
            u64::from(key.anchor[axis]) + u64::from(self.codec.size(key.level))
        };
        let finer = self
            .leaves_within(&block)
            .filter(|leaf| {
                let lo = u64::from(leaf.anchor[axis]);
                let hi = lo + u64::from(self.codec.size(leaf.level));
                lo == face || hi == face
            })
            .copied()
            .collect();
        Neighbor::Finer(finer)
    }

    /// Replace a leaf by its children.
    pub fn split(&mut self, key: &CellKey) -> Result<Vec<CellKey>, TreeMeshError> {
        let children = self.codec.children_of(key)?;
        if self.leaves.remove(&self.codec.encode(key)).is_none() {
            return Err(TreeMeshError::InvariantViolation(format!(
                "{key:?} is not a leaf"
            )));
        }
        for child in &children {
            self.leaves.insert(self.codec.encode(child), *child);
        }
        Ok(children)
    }

    /// Replace the children of `parent` (all leaves) by `parent`.
    pub fn merge(&mut self, parent: &CellKey) -> Result<(), TreeMeshError> {
        let children = self.codec.children_of(parent)?;
        if !children.iter().all(|c| self.contains(c)) {
            return Err(TreeMeshError::InvariantViolation(format!(
                "children of {parent:?} are not all leaves"
            )));
        }
        for child in &children {
            self.leaves.remove(&self.codec.encode(child));
        }
        self.leaves.insert(self.codec.encode(parent), *parent);
        Ok(())
    }

    /// Check that the leaves are disjoint and cover the domain.
    pub fn check_tiling(&self) -> Result<(), TreeMeshError> {
        let dim = self.codec.dim() as u32;
        let mut covered: u128 = 0;
        let mut last_end: Option<KeyType> = None;
        for key in self.leaves.values() {
            let (start, end) = self.codec.morton_range(key);
            if let Some(prev) = last_end {
                if start < prev {
                    return Err(TreeMeshError::InvariantViolation(format!(
                        "{key:?} overlaps a preceding cell"
                    )));
                }
            }
            last_end = Some(end);
            covered += u128::from(self.codec.size(key.level)).pow(dim);
        }
        let extent = self.codec.extent();
        let total: u128 = extent
            .iter()
            .take(self.codec.dim())
            .map(|e| u128::from(*e))
            .product();
        if covered != total {
            return Err(TreeMeshError::InvariantViolation(format!(
                "cells cover {covered} of {total} finest units"
            )));
        }
        Ok(())
    }

    /// Check the 2:1 balance rule across faces (and edges in 3D).
    pub fn check_balance(&self) -> Result<(), TreeMeshError> {
        let dirs = balance_directions(self.codec.dim());
        for key in self.leaves.values() {
            for dir in &dirs {
                let Some(p) = self.probe(key, *dir) else { continue };
                if let Some(other) = self.leaf_at(&p) {
                    if other.level + 1 < key.level {
                        return Err(TreeMeshError::InvariantViolation(format!(
                            "{key:?} and {other:?} differ by more than one level"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves_2x2() -> LeafSet {
        LeafSet::uniform(KeyCodec::new(&[2, 2]).unwrap())
    }

    #[test]
    fn balance_direction_counts() {
        assert_eq!(balance_directions(2).len(), 4);
        assert_eq!(balance_directions(3).len(), 18);
    }

    #[test]
    fn uniform_grid_tiles_domain() {
        let set = LeafSet::uniform(KeyCodec::new(&[4, 2, 2]).unwrap());
        assert_eq!(set.len(), 16);
        set.check_tiling().unwrap();
        set.check_balance().unwrap();
    }

    #[test]
    fn leaf_at_finds_containing_cell() {
        let mut set = leaves_2x2();
        let codec = *set.codec();
        let size = u64::from(codec.size(0));
        let cell = set.leaf_at(&[size + 1, 0, 0]).unwrap();
        assert_eq!(codec.grid_position(&cell), [1, 0, 0]);
        let children = set.split(&cell).unwrap();
        let found = set.leaf_at(&[2 * size - 1, size - 1, 0]).unwrap();
        assert_eq!(found, children[3]);
        assert!(set.leaf_at(&[2 * size, 0, 0]).is_none());
    }

    #[test]
    fn neighbor_kinds() {
        let mut set = leaves_2x2();
        let codec = *set.codec();
        let left = codec.key_of(0, [0, 0, 0]).unwrap();
        let right = codec.key_of(0, [1, 0, 0]).unwrap();
        assert_eq!(set.neighbor(&left, 0, 0), Neighbor::Boundary);
        assert_eq!(set.neighbor(&left, 0, 1), Neighbor::Conforming(right));
        let children = set.split(&right).unwrap();
        match set.neighbor(&left, 0, 1) {
            Neighbor::Finer(cells) => {
                assert_eq!(cells, vec![children[0], children[2]]);
            }
            other => panic!("expected finer neighbors, got {other:?}"),
        }
        assert_eq!(set.neighbor(&children[0], 0, 0), Neighbor::Conforming(left));
    }

    #[test]
    fn merge_restores_parent() {
        let mut set = leaves_2x2();
        let before = set.clone();
        let cell = set.codec().key_of(0, [0, 1, 0]).unwrap();
        set.split(&cell).unwrap();
        assert_eq!(set.len(), 7);
        set.merge(&cell).unwrap();
        assert_eq!(set, before);
    }

    #[test]
    fn from_keys_rejects_gaps_and_overlaps() {
        let codec = KeyCodec::new(&[2, 2]).unwrap();
        let keys: Vec<_> = leaves_2x2().iter().copied().collect();
        assert!(LeafSet::from_keys(codec, keys[..3].to_vec()).is_err());
        let mut overlapping = keys.clone();
        overlapping.push(codec.children_of(&keys[0]).unwrap()[1]);
        assert!(LeafSet::from_keys(codec, overlapping).is_err());
        assert!(LeafSet::from_keys(codec, keys).is_ok());
    }
}
