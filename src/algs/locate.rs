//! Point location: physical coordinates to finest-unit positions to leaves.

use crate::geometry::grid::TensorGrid;
use crate::mesh::TreeMesh;
use crate::mesh_error::TreeMeshError;

/// Finest-unit position of each point, `None` for points outside the domain.
///
/// # Errors
/// [`TreeMeshError::Configuration`] if a point does not have one coordinate
/// per mesh axis.
pub fn finest_positions<P: AsRef<[f64]>>(
    grid: &TensorGrid,
    points: &[P],
) -> Result<Vec<Option<[u64; 3]>>, TreeMeshError> {
    let dim = grid.dim();
    points
        .iter()
        .enumerate()
        .map(|(index, point)| {
            let x = point.as_ref();
            if x.len() != dim {
                return Err(TreeMeshError::Configuration(format!(
                    "point #{index} has {} coordinates on a {dim}D mesh",
                    x.len()
                )));
            }
            let mut p = [0u64; 3];
            for axis in 0..dim {
                match grid.locate(axis, x[axis]) {
                    Some(v) => p[axis] = v,
                    None => return Ok(None),
                }
            }
            Ok(Some(p))
        })
        .collect()
}

/// Index of the leaf containing each point, `None` outside the domain.
pub fn locate_points<P: AsRef<[f64]>>(
    mesh: &TreeMesh,
    points: &[P],
) -> Result<Vec<Option<usize>>, TreeMeshError> {
    finest_positions(mesh.grid(), points)?
        .into_iter()
        .map(|position| {
            let Some(p) = position else { return Ok(None) };
            let leaf = mesh.leaves().leaf_at(&p).ok_or_else(|| {
                TreeMeshError::InvariantViolation(format!("no leaf covers position {p:?}"))
            })?;
            mesh.cell_index_of(&leaf).map(Some).ok_or_else(|| {
                TreeMeshError::InvariantViolation(format!("leaf {leaf:?} is not numbered"))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::refine::RefineOptions;

    #[test]
    fn rejects_wrong_point_dimension() {
        let mesh = TreeMesh::uniform(&[2, 2], &[1.0, 1.0]).unwrap();
        assert!(matches!(
            locate_points(&mesh, &[[0.5, 0.5, 0.5]]),
            Err(TreeMeshError::Configuration(_))
        ));
    }

    #[test]
    fn finds_refined_cells() {
        let mut mesh = TreeMesh::uniform(&[2, 2], &[2.0, 2.0]).unwrap();
        mesh.refine_cells(&RefineOptions::default(), &[0]).unwrap();
        let found = locate_points(&mesh, &[[0.75, 0.25], [1.5, 1.5], [3.0, 0.0]]).unwrap();
        let first = mesh.cell_key(found[0].unwrap()).unwrap();
        assert_eq!(first.level, 1);
        assert_eq!(mesh.cell_centers()[found[0].unwrap()], vec![0.75, 0.25]);
        assert_eq!(mesh.cell_centers()[found[1].unwrap()], vec![1.5, 1.5]);
        assert_eq!(found[2], None);
    }
}
