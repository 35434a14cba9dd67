//! Persisted form of a [`TreeMesh`].
//!
//! A mesh is stored as its base grid (`h`, `x0`) plus one `(cell index,
//! level)` pair per leaf, where the cell index is the Morton code of the
//! leaf's anchor. The pairs are written in cell order but may be read back in
//! any order.

use crate::mesh::TreeMesh;
use crate::mesh_error::TreeMeshError;
use crate::topology::key::KeyType;
use serde::{Deserialize, Serialize};

/// Serialized state of a tree mesh.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TreeMeshState {
    pub cell_indexes: Vec<KeyType>,
    pub cell_levels: Vec<u8>,
    pub h: Vec<Vec<f64>>,
    pub x0: Vec<f64>,
}

impl From<&TreeMesh> for TreeMeshState {
    fn from(mesh: &TreeMesh) -> Self {
        Self {
            cell_indexes: mesh.cell_indexes(),
            cell_levels: mesh.cell_levels(),
            h: mesh.h().to_vec(),
            x0: mesh.x0().to_vec(),
        }
    }
}

impl From<TreeMesh> for TreeMeshState {
    fn from(mesh: TreeMesh) -> Self {
        Self::from(&mesh)
    }
}

impl TryFrom<TreeMeshState> for TreeMesh {
    type Error = TreeMeshError;

    fn try_from(state: TreeMeshState) -> Result<Self, Self::Error> {
        log::debug!(
            "restoring tree mesh from {} persisted cells",
            state.cell_indexes.len()
        );
        TreeMesh::from_cells(state.h, state.x0, &state.cell_indexes, &state.cell_levels)
    }
}
