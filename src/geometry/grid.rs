//! Base tensor grid: maps integer tree positions to physical coordinates.
//!
//! Level 0 cells are the cells of a (possibly non-uniform) tensor grid given by
//! per-axis width vectors and an origin. Positions inside a base cell are
//! measured in finest units, `1 << depth` per base cell, so any entity of the
//! tree has an exact integer location. Entity centers are stored in *doubled*
//! finest units to stay integral.

use crate::mesh_error::TreeMeshError;

/// Cell widths and origin of the level 0 grid.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorGrid {
    h: Vec<Vec<f64>>,
    x0: Vec<f64>,
    /// Node coordinates per axis, `h[axis].len() + 1` entries.
    nodes: Vec<Vec<f64>>,
    depth: u8,
}

impl TensorGrid {
    /// Validate widths and origin. An empty origin defaults to zeros.
    pub fn try_new(h: Vec<Vec<f64>>, x0: Vec<f64>, depth: u8) -> Result<Self, TreeMeshError> {
        let dim = h.len();
        let x0 = if x0.is_empty() { vec![0.0; dim] } else { x0 };
        if x0.len() != dim {
            return Err(TreeMeshError::Configuration(format!(
                "origin has {} components for a {dim}D mesh",
                x0.len()
            )));
        }
        if x0.iter().any(|x| !x.is_finite()) {
            return Err(TreeMeshError::Configuration(
                "origin must be finite".to_string(),
            ));
        }
        let mut nodes = Vec::with_capacity(dim);
        for (axis, widths) in h.iter().enumerate() {
            if widths.iter().any(|w| !(w.is_finite() && *w > 0.0)) {
                return Err(TreeMeshError::Configuration(format!(
                    "cell widths along axis {axis} must be finite and positive"
                )));
            }
            let mut axis_nodes = Vec::with_capacity(widths.len() + 1);
            let mut x = x0[axis];
            axis_nodes.push(x);
            for w in widths {
                x += w;
                axis_nodes.push(x);
            }
            nodes.push(axis_nodes);
        }
        Ok(Self { h, x0, nodes, depth })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.h.len()
    }

    #[inline]
    pub fn h(&self) -> &[Vec<f64>] {
        &self.h
    }

    #[inline]
    pub fn x0(&self) -> &[f64] {
        &self.x0
    }

    /// Lower and upper domain bound along `axis`.
    pub fn bounds(&self, axis: usize) -> (f64, f64) {
        let n = &self.nodes[axis];
        (n[0], n[n.len() - 1])
    }

    fn base_cell(&self, axis: usize, finest: u64) -> usize {
        ((finest >> self.depth) as usize).min(self.h[axis].len() - 1)
    }

    /// Physical coordinate of a position given in doubled finest units.
    pub fn coordinate(&self, axis: usize, doubled: u64) -> f64 {
        let finest = doubled / 2;
        let b = self.base_cell(axis, finest);
        let local = doubled as f64 / 2.0 - (b as u64) as f64 * (1u64 << self.depth) as f64;
        self.nodes[axis][b] + self.h[axis][b] * local / (1u64 << self.depth) as f64
    }

    /// Physical length of `size` finest units starting at `start` along `axis`.
    ///
    /// Tree entities never straddle a base cell, so one width applies.
    pub fn length(&self, axis: usize, start: u64, size: u64) -> f64 {
        let b = self.base_cell(axis, start);
        self.h[axis][b] * size as f64 / (1u64 << self.depth) as f64
    }

    /// Finest-unit cell index along `axis` containing `x`.
    ///
    /// Boxes are half-open `[min, max)`, except that the upper domain bound
    /// belongs to the last cell. Returns `None` outside the domain.
    pub fn locate(&self, axis: usize, x: f64) -> Option<u64> {
        let nodes = &self.nodes[axis];
        let n = self.h[axis].len();
        if !(x >= nodes[0] && x <= nodes[n]) {
            return None;
        }
        let per_base = 1u64 << self.depth;
        if x == nodes[n] {
            return Some(n as u64 * per_base - 1);
        }
        // largest b with nodes[b] <= x
        let b = nodes.partition_point(|&v| v <= x).saturating_sub(1).min(n - 1);
        let t = (x - nodes[b]) / self.h[axis][b];
        let offset = ((t * per_base as f64).floor() as u64).min(per_base - 1);
        Some(b as u64 * per_base + offset)
    }

    /// Fractional position of `x` inside `[start, start + size)` finest units.
    pub fn local_coordinate(&self, axis: usize, x: f64, start: u64, size: u64) -> f64 {
        let lo = self.coordinate(axis, 2 * start);
        let width = self.length(axis, start, size);
        ((x - lo) / width).clamp(0.0, 1.0)
    }
}
