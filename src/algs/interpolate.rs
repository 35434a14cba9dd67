//! Interpolation matrices from mesh entities to arbitrary points.
//!
//! Each query point is located in its leaf and receives a local stencil:
//!
//! - nodes: multilinear over the cell's corners;
//! - edges along `a`: multilinear in the axes perpendicular to `a` over the
//!   cell's edges along `a`;
//! - faces normal to `a`: linear along `a` between the cell's two faces;
//! - cell centers: multilinear over a lattice of same-size blocks around the
//!   point, each block valued by the volume average of the leaves tiling it,
//!   with the weight along an axis collapsing onto the center block at the
//!   domain boundary.
//!
//! Stencil entries on hanging entities are spread over their constraint
//! terms, so columns always index free entities.

use crate::algs::locate;
use crate::geometry::metrics;
use crate::mesh::TreeMesh;
use crate::mesh_error::TreeMeshError;
use crate::topology::entities::{
    EntityGroup, corner_location, edge_corners, edge_location, face_location,
};
use crate::topology::key::CellKey;
use crate::topology::location::LocationType;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Build the `points x entities` interpolation matrix for `location`.
pub fn interpolation_matrix<P: AsRef<[f64]>>(
    mesh: &TreeMesh,
    points: &[P],
    location: LocationType,
    zeros_outside: bool,
) -> Result<CsrMatrix<f64>, TreeMeshError> {
    let location = location.check_dim(mesh.dim())?;
    let cells = locate::locate_points(mesh, points)?;
    let entities = mesh.entities()?;
    let group = entities.group(location)?;
    let ncols = group.map_or(mesh.n_cells(), EntityGroup::n_free);
    let mut coo = CooMatrix::new(points.len(), ncols);

    for (row, cell) in cells.into_iter().enumerate() {
        let x = points[row].as_ref();
        let Some(cell) = cell else {
            if zeros_outside {
                continue;
            }
            return Err(TreeMeshError::OutOfBounds {
                index: row,
                point: x.to_vec(),
            });
        };
        let key = mesh.cell_keys()[cell];
        let stencil: Vec<(usize, f64)> = match group {
            None => cell_center_stencil(mesh, &key, x)?,
            Some(group) => entity_stencil(mesh, &key, x, location)?
                .into_iter()
                .flat_map(|(index, w)| {
                    group
                        .terms(index)
                        .into_iter()
                        .map(move |t| (t.index, w * t.weight))
                })
                .collect(),
        };
        for (col, w) in stencil {
            if w != 0.0 {
                coo.push(row, col, w);
            }
        }
    }
    Ok(CsrMatrix::from(&coo))
}

/// Fractional position of `x` inside `key` along each mesh axis.
fn local_coordinates(mesh: &TreeMesh, key: &CellKey, x: &[f64]) -> [f64; 3] {
    let size = u64::from(mesh.codec().size(key.level));
    let mut t = [0.0; 3];
    for axis in 0..mesh.dim() {
        let anchor = u64::from(key.anchor[axis]);
        t[axis] = mesh.grid().local_coordinate(axis, x[axis], anchor, size);
    }
    t
}

/// Product over `axes` of `t` (bit set in `mask`) or `1 - t`.
fn tensor_weight(t: &[f64; 3], mask: usize, axes: impl IntoIterator<Item = usize>) -> f64 {
    axes.into_iter()
        .map(|axis| {
            if (mask >> axis) & 1 == 1 {
                t[axis]
            } else {
                1.0 - t[axis]
            }
        })
        .product()
}

/// Total entity indices and weights of the stencil of `key` for `location`.
fn entity_stencil(
    mesh: &TreeMesh,
    key: &CellKey,
    x: &[f64],
    location: LocationType,
) -> Result<Vec<(usize, f64)>, TreeMeshError> {
    let codec = mesh.codec();
    let dim = mesh.dim();
    let entities = mesh.entities()?;
    let t = local_coordinates(mesh, key, x);
    let mut stencil = Vec::new();
    match location {
        LocationType::Nodes => {
            for corner in 0..codec.n_children() {
                let index = entities.nodes().require(&corner_location(codec, key, corner))?;
                stencil.push((index, tensor_weight(&t, corner, 0..dim)));
            }
        }
        LocationType::Edges(axis) => {
            for corner in edge_corners(dim, axis) {
                let loc = edge_location(codec, key, axis, corner);
                let index = entities.edges(axis).require(&loc)?;
                let w = tensor_weight(&t, corner, (0..dim).filter(|b| *b != axis));
                stencil.push((index, w));
            }
        }
        LocationType::Faces(axis) => {
            for side in 0..2 {
                let loc = face_location(codec, key, axis, side);
                let index = entities.faces(axis).require(&loc)?;
                let w = if side == 0 { 1.0 - t[axis] } else { t[axis] };
                stencil.push((index, w));
            }
        }
        LocationType::CellCenters => {
            return Err(TreeMeshError::InvalidLocationType(location.to_string()));
        }
    }
    Ok(stencil)
}

/// Cell indices and volume fractions of the leaves tiling `block`, `None`
/// when `block` lies inside a coarser leaf.
fn block_average(
    mesh: &TreeMesh,
    block: &CellKey,
) -> Result<Option<Vec<(usize, f64)>>, TreeMeshError> {
    let codec = mesh.codec();
    let grid = mesh.grid();
    let anchor = block.anchor.map(u64::from);
    let leaf = mesh
        .leaves()
        .leaf_at(&anchor)
        .ok_or_else(|| TreeMeshError::InvariantViolation(format!("no cell at {anchor:?}")))?;
    if leaf.level < block.level {
        return Ok(None);
    }
    let total = metrics::cell_volume(grid, &block.anchor, codec.size(block.level));
    mesh.leaves()
        .leaves_within(block)
        .map(|leaf| {
            let index = mesh.cell_index_of(leaf).ok_or_else(|| {
                TreeMeshError::InvariantViolation(format!("{leaf:?} is not indexed"))
            })?;
            let volume = metrics::cell_volume(grid, &leaf.anchor, codec.size(leaf.level));
            Ok((index, volume / total))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

/// Multilinear stencil over `block` and its same-level neighbors on the side
/// of `x`. Each lattice block contributes the volume average of its leaves,
/// `None` when one of them is covered by a coarser leaf.
fn lattice_stencil(
    mesh: &TreeMesh,
    block: &CellKey,
    x: &[f64],
) -> Result<Option<Vec<(usize, f64)>>, TreeMeshError> {
    let codec = mesh.codec();
    let dim = mesh.dim();
    let size = codec.size(block.level);
    let center = metrics::cell_center(mesh.grid(), &block.anchor, size);

    let mut dirs = [0i64; 3];
    let mut t = [0.0; 3];
    for axis in 0..dim {
        let d = x[axis] - center[axis];
        if d == 0.0 {
            continue;
        }
        let mut direction = [0i64; 3];
        direction[axis] = if d > 0.0 { 1 } else { -1 };
        // boundary: constant extrapolation along this axis
        let Some(across) = codec.neighbor_of(block, direction) else {
            continue;
        };
        let across_center = metrics::cell_center(mesh.grid(), &across.anchor, size);
        dirs[axis] = direction[axis];
        t[axis] = (d / (across_center[axis] - center[axis])).min(1.0);
    }

    let mut stencil = Vec::new();
    for mask in 0..1usize << dim {
        if (0..dim).any(|axis| (mask >> axis) & 1 == 1 && dirs[axis] == 0) {
            continue;
        }
        let w = tensor_weight(&t, mask, 0..dim);
        if w == 0.0 {
            continue;
        }
        let mut direction = [0i64; 3];
        for axis in (0..dim).filter(|axis| (mask >> axis) & 1 == 1) {
            direction[axis] = dirs[axis];
        }
        let shifted = codec.neighbor_of(block, direction).ok_or_else(|| {
            TreeMeshError::InvariantViolation(format!("stencil of {block:?} leaves the domain"))
        })?;
        let Some(average) = block_average(mesh, &shifted)? else {
            return Ok(None);
        };
        stencil.extend(average.into_iter().map(|(index, v)| (index, w * v)));
    }
    Ok(Some(stencil))
}

/// Cell indices and weights for a cell-centered value at `x` inside `key`.
///
/// The lattice starts at the level of `key` and moves to the parent level
/// until no lattice block falls inside a coarser leaf; base cells always
/// qualify.
fn cell_center_stencil(
    mesh: &TreeMesh,
    key: &CellKey,
    x: &[f64],
) -> Result<Vec<(usize, f64)>, TreeMeshError> {
    let mut block = *key;
    loop {
        if let Some(stencil) = lattice_stencil(mesh, &block, x)? {
            return Ok(stencil);
        }
        block = mesh.codec().parent_of(&block).ok_or_else(|| {
            TreeMeshError::InvariantViolation(format!("no cell-center stencil for {key:?}"))
        })?;
    }
}
