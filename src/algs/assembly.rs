//! Operator assembly: divergence, nodal gradient, edge curl, cell gradient
//! and the unscaled cell difference stencil.
//!
//! Each operator is assembled cell by cell (or entity by entity) over the
//! total entity space; a hanging entity's column is replaced on the fly by
//! its constraint terms, so the resulting matrices act on free entities only.
//! Global face and edge columns follow the `[x, y, z]` group order of
//! [`Entities::face_offsets`](crate::topology::entities::Entities::face_offsets).
//!
//! Sign conventions: divergence uses outward normals; the curl of a face
//! normal to `+a` circulates right-handed around `+a`; the gradient of an
//! edge is `end - start` over its length. With these, `Div * Curl = 0` and
//! `Curl * Grad = 0` hold exactly on any balanced tree.

use crate::geometry::metrics;
use crate::mesh::TreeMesh;
use crate::mesh_error::TreeMeshError;
use crate::topology::entities::{EntityGroup, Location, edge_location, face_location};
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Push `value` into column block `offset` of entity `index`, spreading it
/// over the constraint terms if the entity hangs.
fn push_entity(
    coo: &mut CooMatrix<f64>,
    row: usize,
    offset: usize,
    group: &EntityGroup,
    index: usize,
    value: f64,
) {
    for term in group.terms(index) {
        coo.push(row, offset + term.index, value * term.weight);
    }
}

/// Cells x free faces.
pub fn face_divergence(mesh: &TreeMesh) -> Result<CsrMatrix<f64>, TreeMeshError> {
    let entities = mesh.entities()?;
    let codec = mesh.codec();
    let volumes = mesh.cell_volumes();
    let offsets = entities.face_offsets();
    let mut coo = CooMatrix::new(mesh.n_cells(), entities.n_faces());
    for (row, key) in mesh.cell_keys().iter().enumerate() {
        for axis in 0..mesh.dim() {
            let group = entities.faces(axis);
            for side in 0..2 {
                let loc = face_location(codec, key, axis, side);
                let face = group.require(&loc)?;
                let area = metrics::face_area(mesh.grid(), axis, &loc, group.size(face));
                let sign = if side == 0 { -1.0 } else { 1.0 };
                let value = sign * area / volumes[row];
                push_entity(&mut coo, row, offsets[axis], group, face, value);
            }
        }
    }
    Ok(CsrMatrix::from(&coo))
}

/// Free edges x free nodes.
pub fn nodal_gradient(mesh: &TreeMesh) -> Result<CsrMatrix<f64>, TreeMeshError> {
    let entities = mesh.entities()?;
    let nodes = entities.nodes();
    let offsets = entities.edge_offsets();
    let mut coo = CooMatrix::new(entities.n_edges(), nodes.n_free());
    for axis in 0..mesh.dim() {
        let group = entities.edges(axis);
        for edge in 0..group.n_free() {
            let row = offsets[axis] + edge;
            let loc = group.location(edge);
            let size = u64::from(group.size(edge));
            let length = metrics::edge_length(mesh.grid(), axis, &loc, group.size(edge));
            let mut start = loc;
            start[axis] -= size;
            let mut end = loc;
            end[axis] += size;
            push_entity(&mut coo, row, 0, nodes, nodes.require(&start)?, -1.0 / length);
            push_entity(&mut coo, row, 0, nodes, nodes.require(&end)?, 1.0 / length);
        }
    }
    Ok(CsrMatrix::from(&coo))
}

/// The four edges bounding a face (or a 2D cell) normal to `+a`, as
/// `(edge axis, location, sign)`, in right-handed circulation order.
fn boundary_edges(a: usize, loc: &Location, size: u64) -> [(usize, Location, f64); 4] {
    let b = (a + 1) % 3;
    let c = (a + 2) % 3;
    let shifted = |axis: usize, up: bool| {
        let mut l = *loc;
        if up {
            l[axis] += size;
        } else {
            l[axis] -= size;
        }
        l
    };
    [
        (b, shifted(c, false), 1.0),
        (c, shifted(b, true), 1.0),
        (b, shifted(c, true), -1.0),
        (c, shifted(b, false), -1.0),
    ]
}

/// Free faces x free edges in 3D; cells x free edges in 2D.
pub fn edge_curl(mesh: &TreeMesh) -> Result<CsrMatrix<f64>, TreeMeshError> {
    let entities = mesh.entities()?;
    let offsets = entities.edge_offsets();
    let grid = mesh.grid();
    if mesh.dim() == 2 {
        let codec = mesh.codec();
        let volumes = mesh.cell_volumes();
        let mut coo = CooMatrix::new(mesh.n_cells(), entities.n_edges());
        for (row, key) in mesh.cell_keys().iter().enumerate() {
            // around +z: +x edge at y-min, +y edge at x-max, -x at y-max, -y at x-min
            let circuit = [
                (0, edge_location(codec, key, 0, 0), 1.0),
                (1, edge_location(codec, key, 1, 0b01), 1.0),
                (0, edge_location(codec, key, 0, 0b10), -1.0),
                (1, edge_location(codec, key, 1, 0), -1.0),
            ];
            for (axis, loc, sign) in circuit {
                let group = entities.edges(axis);
                let edge = group.require(&loc)?;
                let length = metrics::edge_length(grid, axis, &loc, group.size(edge));
                let value = sign * length / volumes[row];
                push_entity(&mut coo, row, offsets[axis], group, edge, value);
            }
        }
        return Ok(CsrMatrix::from(&coo));
    }

    let face_offsets = entities.face_offsets();
    let mut coo = CooMatrix::new(entities.n_faces(), entities.n_edges());
    for a in 0..3 {
        let faces = entities.faces(a);
        for face in 0..faces.n_free() {
            let row = face_offsets[a] + face;
            let loc = faces.location(face);
            let area = metrics::face_area(grid, a, &loc, faces.size(face));
            for (axis, edge_loc, sign) in boundary_edges(a, &loc, u64::from(faces.size(face))) {
                let group = entities.edges(axis);
                let edge = group.require(&edge_loc)?;
                let length = metrics::edge_length(grid, axis, &edge_loc, group.size(edge));
                let value = sign * length / area;
                push_entity(&mut coo, row, offsets[axis], group, edge, value);
            }
        }
    }
    Ok(CsrMatrix::from(&coo))
}

/// `-W * Div^T * diag(volumes)` where `W` is the diagonal `face_weights`
/// (the boundary projection times the inverse face mass).
pub fn cell_gradient(
    divergence: &CsrMatrix<f64>,
    volumes: &[f64],
    face_weights: &[f64],
) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(divergence.ncols(), divergence.nrows());
    for (cell, face, value) in divergence.triplet_iter() {
        let w = face_weights[face];
        if w != 0.0 {
            coo.push(face, cell, -w * value * volumes[cell]);
        }
    }
    CsrMatrix::from(&coo)
}

/// Free faces normal to `axis` x cells, unscaled cell differences.
///
/// A face row holds `+1` for the cell on its plus side and `-1` for the cell
/// on its minus side. Where finer cells share a coarser free face, each
/// contributes its share of the face area, so a constant field differences
/// to zero on every interior face. Boundary faces keep their single cell.
pub fn cell_gradient_stencil(
    mesh: &TreeMesh,
    axis: usize,
) -> Result<CsrMatrix<f64>, TreeMeshError> {
    let entities = mesh.entities()?;
    let codec = mesh.codec();
    let grid = mesh.grid();
    let group = entities.faces(axis);
    let mut coo = CooMatrix::new(group.n_free(), mesh.n_cells());
    for (cell, key) in mesh.cell_keys().iter().enumerate() {
        for side in 0..2 {
            let loc = face_location(codec, key, axis, side);
            let face = group.require(&loc)?;
            let area = metrics::face_area(grid, axis, &loc, group.size(face));
            // the cell lies on the plus side of its minus face
            let sign = if side == 0 { 1.0 } else { -1.0 };
            for term in group.terms(face) {
                let target = group.location(term.index);
                let full = metrics::face_area(grid, axis, &target, group.size(term.index));
                coo.push(term.index, cell, sign * term.weight * area / full);
            }
        }
    }
    Ok(CsrMatrix::from(&coo))
}

/// Stack `blocks` vertically; all blocks must share a column count.
pub fn stack_rows(blocks: &[&CsrMatrix<f64>]) -> CsrMatrix<f64> {
    let ncols = blocks.first().map_or(0, |b| b.ncols());
    let nrows = blocks.iter().map(|b| b.nrows()).sum();
    let mut coo = CooMatrix::new(nrows, ncols);
    let mut offset = 0;
    for block in blocks {
        for (row, col, value) in block.triplet_iter() {
            coo.push(offset + row, col, *value);
        }
        offset += block.nrows();
    }
    CsrMatrix::from(&coo)
}

/// Columns `start..end` of `matrix`, renumbered from 0.
pub fn restrict_columns(matrix: &CsrMatrix<f64>, start: usize, end: usize) -> CsrMatrix<f64> {
    let mut coo = CooMatrix::new(matrix.nrows(), end - start);
    for (row, col, value) in matrix.triplet_iter() {
        if (start..end).contains(&col) {
            coo.push(row, col - start, *value);
        }
    }
    CsrMatrix::from(&coo)
}
