//! Cell index codec: integer keys for tree cells.
//!
//! Every cell is identified by its refinement `level` and its `anchor`, the
//! integer coordinates of its lower corner measured in units of the finest
//! representable cell. Cells at level `L` have an extent of
//! `1 << (depth - L)` finest units per axis, so anchors of all cells remain
//! integers regardless of their size. Level 0 cells are the cells of the base
//! tensor grid the mesh was constructed from.
//!
//! Parent, child and neighbor keys are derived with integer arithmetic; no
//! pointers are stored anywhere. A bit-interleaved (Morton) code of the anchor
//! orders leaves along a Z-curve and is the persisted cell index.

use crate::mesh_error::TreeMeshError;
use serde::{Deserialize, Serialize};

/// Integer type of persisted cell indexes.
pub type KeyType = u64;

/// Bits available per axis in a Morton code for the given dimension.
#[inline]
pub const fn axis_bits(dim: usize) -> u32 {
    if dim == 2 { 31 } else { 21 }
}

/// Power-of-two guard used at construction.
#[inline]
pub const fn is_power_of_two(n: usize) -> bool {
    n != 0 && (n & (n - 1)) == 0
}

/// A cell of the tree: level plus anchor in finest units.
///
/// The z component of the anchor is always 0 on 2D meshes.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct CellKey {
    pub level: u8,
    pub anchor: [u32; 3],
}

static_assertions::assert_eq_size!(CellKey, [u32; 4]);

impl CellKey {
    #[inline]
    pub const fn new(level: u8, anchor: [u32; 3]) -> Self {
        Self { level, anchor }
    }
}

/// Bit-interleave an anchor into a Morton code, x in the lowest bit.
pub fn encode_morton(anchor: &[u32; 3], dim: usize) -> KeyType {
    let bits = axis_bits(dim);
    let mut key: KeyType = 0;
    for bit in 0..bits {
        for (axis, &a) in anchor.iter().enumerate().take(dim) {
            key |= KeyType::from((a >> bit) & 1) << (bit as usize * dim + axis);
        }
    }
    key
}

/// Inverse of [`encode_morton`].
pub fn decode_morton(key: KeyType, dim: usize) -> [u32; 3] {
    let bits = axis_bits(dim);
    let mut anchor = [0u32; 3];
    for bit in 0..bits {
        for (axis, a) in anchor.iter_mut().enumerate().take(dim) {
            *a |= (((key >> (bit as usize * dim + axis)) & 1) as u32) << bit;
        }
    }
    anchor
}

/// Key arithmetic for one mesh: dimension, deepest level and domain extent.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KeyCodec {
    dim: usize,
    depth: u8,
    /// Base cell counts per axis (1 on unused axes).
    base: [u32; 3],
}

impl KeyCodec {
    /// Build the codec for a base grid of `counts` cells per axis.
    ///
    /// Fails with [`TreeMeshError::Configuration`] unless every count is a
    /// power of two and the grid fits the key width.
    pub fn new(counts: &[usize]) -> Result<Self, TreeMeshError> {
        let dim = counts.len();
        if dim != 2 && dim != 3 {
            return Err(TreeMeshError::Configuration(format!(
                "tree meshes are 2D or 3D, got {dim} cell width vectors"
            )));
        }
        let mut base = [1u32; 3];
        let mut max_bits = 0u32;
        for (axis, &n) in counts.iter().enumerate() {
            if !is_power_of_two(n) {
                return Err(TreeMeshError::Configuration(format!(
                    "axis {axis} has {n} cells; cell counts must be a power of 2"
                )));
            }
            let bits = n.trailing_zeros();
            if bits >= axis_bits(dim) {
                return Err(TreeMeshError::Configuration(format!(
                    "axis {axis} has {n} cells, more than a {dim}D key can address"
                )));
            }
            max_bits = max_bits.max(bits);
            base[axis] = n as u32;
        }
        let depth = (axis_bits(dim) - max_bits).min(u32::from(u8::MAX)) as u8;
        Ok(Self { dim, depth, base })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Deepest representable level.
    #[inline]
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Base cell counts per axis.
    #[inline]
    pub fn base_counts(&self) -> [u32; 3] {
        self.base
    }

    /// Domain extent in finest units per axis (0 on unused axes).
    #[inline]
    pub fn extent(&self) -> [u64; 3] {
        let mut e = [0u64; 3];
        for (axis, v) in e.iter_mut().enumerate().take(self.dim) {
            *v = u64::from(self.base[axis]) << self.depth;
        }
        e
    }

    /// Side length of a cell at `level`, in finest units.
    #[inline]
    pub fn size(&self, level: u8) -> u32 {
        1u32 << (self.depth - level)
    }

    /// Number of children of a split cell (4 in 2D, 8 in 3D).
    #[inline]
    pub fn n_children(&self) -> usize {
        1 << self.dim
    }

    /// Key of the cell at `level` whose position in the level-`level` grid is `position`.
    pub fn key_of(&self, level: u8, position: [u32; 3]) -> Result<CellKey, TreeMeshError> {
        self.check_level(level)?;
        let shift = self.depth - level;
        let mut anchor = [0u32; 3];
        for axis in 0..self.dim {
            let cells = u64::from(self.base[axis]) << level;
            if u64::from(position[axis]) >= cells {
                return Err(TreeMeshError::Configuration(format!(
                    "grid position {position:?} outside level {level} grid"
                )));
            }
            anchor[axis] = position[axis] << shift;
        }
        Ok(CellKey::new(level, anchor))
    }

    /// Position of `key` in the grid of its own level.
    pub fn grid_position(&self, key: &CellKey) -> [u32; 3] {
        let shift = self.depth - key.level;
        let mut pos = [0u32; 3];
        for axis in 0..self.dim {
            pos[axis] = key.anchor[axis] >> shift;
        }
        pos
    }

    /// Parent key, `None` for level 0 cells.
    pub fn parent_of(&self, key: &CellKey) -> Option<CellKey> {
        if key.level == 0 {
            return None;
        }
        let level = key.level - 1;
        let mask = !(self.size(level) - 1);
        let mut anchor = key.anchor;
        for a in anchor.iter_mut().take(self.dim) {
            *a &= mask;
        }
        Some(CellKey::new(level, anchor))
    }

    /// The 4 (2D) or 8 (3D) children in Z order (x varies fastest).
    pub fn children_of(&self, key: &CellKey) -> Result<Vec<CellKey>, TreeMeshError> {
        if key.level >= self.depth {
            return Err(TreeMeshError::LevelOverflow {
                requested: u32::from(key.level) + 1,
                max: u32::from(self.depth),
            });
        }
        let level = key.level + 1;
        let half = self.size(level);
        Ok((0..self.n_children())
            .map(|child| {
                let mut anchor = key.anchor;
                for (axis, a) in anchor.iter_mut().enumerate().take(self.dim) {
                    if (child >> axis) & 1 == 1 {
                        *a += half;
                    }
                }
                CellKey::new(level, anchor)
            })
            .collect())
    }

    /// Same-level key shifted by `direction` cells, `None` if it leaves the domain.
    pub fn neighbor_of(&self, key: &CellKey, direction: [i64; 3]) -> Option<CellKey> {
        let size = i64::from(self.size(key.level));
        let extent = self.extent();
        let mut anchor = key.anchor;
        for axis in 0..self.dim {
            let a = i64::from(key.anchor[axis]) + size * direction[axis];
            if a < 0 || a >= extent[axis] as i64 {
                return None;
            }
            anchor[axis] = a as u32;
        }
        Some(CellKey::new(key.level, anchor))
    }

    /// `true` if `ancestor` covers `key` (a key covers itself).
    pub fn covers(&self, ancestor: &CellKey, key: &CellKey) -> bool {
        if ancestor.level > key.level {
            return false;
        }
        let size = self.size(ancestor.level);
        (0..self.dim).all(|axis| {
            key.anchor[axis] >= ancestor.anchor[axis]
                && key.anchor[axis] < ancestor.anchor[axis] + size
        })
    }

    /// `true` if the finest-unit position `p` falls inside `key`.
    pub fn contains(&self, key: &CellKey, p: &[u64; 3]) -> bool {
        let size = u64::from(self.size(key.level));
        (0..self.dim).all(|axis| {
            let a = u64::from(key.anchor[axis]);
            p[axis] >= a && p[axis] < a + size
        })
    }

    /// Morton code of the key's anchor.
    #[inline]
    pub fn encode(&self, key: &CellKey) -> KeyType {
        encode_morton(&key.anchor, self.dim)
    }

    /// First and one-past-last Morton code covered by `key`.
    pub fn morton_range(&self, key: &CellKey) -> (KeyType, KeyType) {
        let start = self.encode(key);
        let span_bits = self.dim as u32 * u32::from(self.depth - key.level);
        (start, start + (1 << span_bits))
    }

    /// Rebuild a key from a persisted `(index, level)` pair, validating alignment.
    pub fn decode(&self, index: KeyType, level: u8) -> Result<CellKey, TreeMeshError> {
        self.check_level(level)?;
        let anchor = decode_morton(index, self.dim);
        let key = CellKey::new(level, anchor);
        if self.encode(&key) != index {
            return Err(TreeMeshError::Configuration(format!(
                "cell index {index} is not a valid {}D key",
                self.dim
            )));
        }
        self.validate(&key)?;
        Ok(key)
    }

    /// Check that `key` is aligned to its level and lies inside the domain.
    pub fn validate(&self, key: &CellKey) -> Result<(), TreeMeshError> {
        self.check_level(key.level)?;
        let size = self.size(key.level);
        let extent = self.extent();
        for axis in 0..3 {
            let a = key.anchor[axis];
            if axis >= self.dim {
                if a != 0 {
                    return Err(TreeMeshError::Configuration(format!(
                        "{key:?} has a non-zero anchor on unused axis {axis}"
                    )));
                }
                continue;
            }
            if a % size != 0 || u64::from(a) >= extent[axis] {
                return Err(TreeMeshError::Configuration(format!(
                    "{key:?} is not an aligned cell of level {}",
                    key.level
                )));
            }
        }
        Ok(())
    }

    fn check_level(&self, level: u8) -> Result<(), TreeMeshError> {
        if level > self.depth {
            return Err(TreeMeshError::LevelOverflow {
                requested: u32::from(level),
                max: u32::from(self.depth),
            });
        }
        Ok(())
    }
}
