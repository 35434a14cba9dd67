//! Permutations from the native entity order to grid order.
//!
//! Grid order sorts by z, then y, then x coordinate, so x varies fastest,
//! the layout of a tensor mesh. Applying the returned matrix `P` to a vector
//! in native order yields the vector in grid order: row `i` of `P` selects
//! the native entity that comes `i`-th in grid order. Hanging entities are
//! not part of the numbering and are left out.

use crate::mesh::TreeMesh;
use crate::mesh_error::TreeMeshError;
use crate::topology::entities::{EntityGroup, Location};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Indices of `locations` sorted into grid order.
pub fn grid_order(locations: &[Location]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..locations.len()).collect();
    order.sort_by_key(|&i| {
        let l = locations[i];
        [l[2], l[1], l[0]]
    });
    order
}

/// Square permutation matrix with a 1 at `(i, order[i])`.
pub fn permutation_matrix(order: &[usize]) -> CsrMatrix<f64> {
    let n = order.len();
    let mut coo = CooMatrix::new(n, n);
    for (row, &col) in order.iter().enumerate() {
        coo.push(row, col, 1.0);
    }
    CsrMatrix::from(&coo)
}

pub fn permute_cells(mesh: &TreeMesh) -> CsrMatrix<f64> {
    let codec = mesh.codec();
    let centers: Vec<Location> = mesh
        .cell_keys()
        .iter()
        .map(|key| {
            let size = u64::from(codec.size(key.level));
            let mut loc = [0u64; 3];
            for axis in 0..codec.dim() {
                loc[axis] = 2 * u64::from(key.anchor[axis]) + size;
            }
            loc
        })
        .collect();
    permutation_matrix(&grid_order(&centers))
}

/// Grid order within each group, shifted by the group offsets.
fn grouped_order<'a>(groups: impl Iterator<Item = &'a EntityGroup>) -> Vec<usize> {
    let mut order = Vec::new();
    let mut offset = 0;
    for group in groups {
        let free = &group.locations()[..group.n_free()];
        order.extend(grid_order(free).into_iter().map(|i| i + offset));
        offset += group.n_free();
    }
    order
}

pub fn permute_faces(mesh: &TreeMesh) -> Result<CsrMatrix<f64>, TreeMeshError> {
    let entities = mesh.entities()?;
    let order = grouped_order((0..mesh.dim()).map(|axis| entities.faces(axis)));
    Ok(permutation_matrix(&order))
}

pub fn permute_edges(mesh: &TreeMesh) -> Result<CsrMatrix<f64>, TreeMeshError> {
    let entities = mesh.entities()?;
    let order = grouped_order((0..mesh.dim()).map(|axis| entities.edges(axis)));
    Ok(permutation_matrix(&order))
}
