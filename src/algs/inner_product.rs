//! Face inner products used by the cell-centered gradient.
//!
//! The gradient `-Pi Minv Div^T V` needs the inverse of a face mass matrix.
//! Only diagonal (lumped) inverses are supported at this seam; richer inner
//! products can be supplied by implementing [`FaceInnerProduct`].

use crate::mesh::TreeMesh;
use crate::mesh_error::TreeMeshError;
use crate::topology::entities::face_location;

/// Source of the inverse face mass matrix.
pub trait FaceInnerProduct {
    /// Diagonal of the inverse face mass matrix, one entry per free face in
    /// global face order.
    fn inverse_face_mass(&self, mesh: &TreeMesh) -> Result<Vec<f64>, TreeMeshError>;
}

/// Lumped face mass: every cell gives half its volume to each of its faces.
///
/// Contributions of a hanging face go to its constraint terms with squared
/// weights, i.e. the diagonal of `P^T M P` for the total-space lumped mass `M`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LumpedFaceMass;

impl LumpedFaceMass {
    /// Diagonal of the face mass matrix over free faces.
    pub fn face_mass(&self, mesh: &TreeMesh) -> Result<Vec<f64>, TreeMeshError> {
        let entities = mesh.entities()?;
        let offsets = entities.face_offsets();
        let volumes = mesh.cell_volumes();
        let mut mass = vec![0.0; entities.n_faces()];
        for (cell, key) in mesh.cell_keys().iter().enumerate() {
            for axis in 0..mesh.dim() {
                let group = entities.faces(axis);
                for side in 0..2 {
                    let face = group.require(&face_location(mesh.codec(), key, axis, side))?;
                    for term in group.terms(face) {
                        mass[offsets[axis] + term.index] +=
                            0.5 * volumes[cell] * term.weight * term.weight;
                    }
                }
            }
        }
        Ok(mass)
    }
}

impl FaceInnerProduct for LumpedFaceMass {
    fn inverse_face_mass(&self, mesh: &TreeMesh) -> Result<Vec<f64>, TreeMeshError> {
        let mass = self.face_mass(mesh)?;
        if let Some(face) = mass.iter().position(|m| *m <= 0.0) {
            return Err(TreeMeshError::InvariantViolation(format!(
                "face {face} has no mass"
            )));
        }
        Ok(mass.into_iter().map(|m| 1.0 / m).collect())
    }
}
