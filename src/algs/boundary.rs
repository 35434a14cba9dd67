//! Boundary classification of faces and cells.
//!
//! Sides are listed as `[x-, x+, y-, y+, (z-, z+)]`. Hanging faces never lie
//! on the domain boundary, so only free faces are classified.

use crate::mesh::TreeMesh;
use crate::mesh_error::TreeMeshError;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Free face indices (within each axis group) on every domain side.
pub fn face_boundary_indices(mesh: &TreeMesh) -> Result<Vec<Vec<usize>>, TreeMeshError> {
    let entities = mesh.entities()?;
    let extent = mesh.codec().extent();
    let mut sides = Vec::with_capacity(2 * mesh.dim());
    for axis in 0..mesh.dim() {
        let group = entities.faces(axis);
        let free = &group.locations()[..group.n_free()];
        for bound in [0, 2 * extent[axis]] {
            sides.push(
                free.iter()
                    .enumerate()
                    .filter(|(_, loc)| loc[axis] == bound)
                    .map(|(i, _)| i)
                    .collect(),
            );
        }
    }
    Ok(sides)
}

/// `true` for every free face, in global face order, on the domain boundary.
pub fn boundary_face_mask(mesh: &TreeMesh) -> Result<Vec<bool>, TreeMeshError> {
    let offsets = mesh.entities()?.face_offsets();
    let mut mask = vec![false; offsets[mesh.dim()]];
    for (side, indices) in mesh.face_boundary_indices()?.iter().enumerate() {
        let offset = offsets[side / 2];
        for i in indices {
            mask[offset + i] = true;
        }
    }
    Ok(mask)
}

/// Diagonal projector over the free faces that zeroes boundary faces.
pub fn interior_face_projection(mesh: &TreeMesh) -> Result<CsrMatrix<f64>, TreeMeshError> {
    let mask = boundary_face_mask(mesh)?;
    let mut coo = CooMatrix::new(mask.len(), mask.len());
    for (face, on_boundary) in mask.into_iter().enumerate() {
        if !on_boundary {
            coo.push(face, face, 1.0);
        }
    }
    Ok(CsrMatrix::from(&coo))
}

/// Cell indices touching every domain side.
pub fn cell_boundary_indices(mesh: &TreeMesh) -> Vec<Vec<usize>> {
    let codec = mesh.codec();
    let extent = codec.extent();
    let mut sides = vec![Vec::new(); 2 * mesh.dim()];
    for (index, key) in mesh.cell_keys().iter().enumerate() {
        let size = u64::from(codec.size(key.level));
        for axis in 0..mesh.dim() {
            let a = u64::from(key.anchor[axis]);
            if a == 0 {
                sides[2 * axis].push(index);
            }
            if a + size == extent[axis] {
                sides[2 * axis + 1].push(index);
            }
        }
    }
    sides
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::refine::RefineOptions;

    #[test]
    fn uniform_boundaries() {
        let mesh = TreeMesh::uniform(&[4, 2], &[4.0, 2.0]).unwrap();
        let faces = face_boundary_indices(&mesh).unwrap();
        let counts: Vec<usize> = faces.iter().map(Vec::len).collect();
        assert_eq!(counts, vec![2, 2, 4, 4]);
        let cells = cell_boundary_indices(&mesh);
        let counts: Vec<usize> = cells.iter().map(Vec::len).collect();
        assert_eq!(counts, vec![2, 2, 4, 4]);
        let mask = boundary_face_mask(&mesh).unwrap();
        assert_eq!(mask.iter().filter(|b| **b).count(), 12);
        let pi = interior_face_projection(&mesh).unwrap();
        assert_eq!(pi.nrows(), mask.len());
        assert_eq!(pi.nnz(), mask.len() - 12);
    }

    #[test]
    fn refined_corner_adds_boundary_faces() {
        let mut mesh = TreeMesh::uniform(&[2, 2], &[1.0, 1.0]).unwrap();
        mesh.refine_cells(&RefineOptions::default(), &[0]).unwrap();
        let faces = face_boundary_indices(&mesh).unwrap();
        // x- side: two fine faces and one coarse face
        assert_eq!(faces[0].len(), 3);
        assert_eq!(cell_boundary_indices(&mesh)[0].len(), 3);
    }
}
