use tree_mesh::prelude::*;

fn octree_with_refined_corner() -> TreeMesh {
    let mut mesh = TreeMesh::uniform(&[2, 2, 2], &[2.0, 2.0, 2.0]).expect("valid base grid");
    mesh.refine_cells(&RefineOptions::default(), &[0])
        .expect("refinement should succeed");
    mesh
}

fn all_locations(mesh: &TreeMesh) -> Vec<LocationType> {
    let mut kinds = vec![LocationType::Nodes];
    for axis in 0..mesh.dim() {
        kinds.push(LocationType::Faces(axis));
        kinds.push(LocationType::Edges(axis));
    }
    kinds
}

#[test]
fn constraints_are_partitions_of_unity() {
    let mesh = octree_with_refined_corner();
    for kind in all_locations(&mesh) {
        let constraints = mesh.hanging_constraints(kind).unwrap();
        constraints.validate().unwrap();
        let counts = mesh.counts(kind).unwrap();
        assert_eq!(counts.free + counts.hanging, counts.total);
        assert_eq!(constraints.n_free(), counts.free);
        assert_eq!(constraints.n_hanging(), counts.hanging);
        for terms in constraints.constraints().values() {
            let sum: f64 = terms.iter().map(|t| t.weight).sum();
            assert!((sum - 1.0).abs() < 1e-12, "{kind}: weights sum to {sum}");
            assert!(terms.iter().all(|t| t.index < counts.free));
        }
    }
}

#[test]
fn expanded_nodal_values_are_exact_for_linear_fields() {
    let mesh = octree_with_refined_corner();
    let f = |x: &[f64]| 0.5 + x[0] - 2.0 * x[1] + 3.0 * x[2];
    let free: Vec<f64> = mesh.nodes().unwrap().iter().map(|x| f(x)).collect();
    let constraints = mesh.hanging_constraints(LocationType::Nodes).unwrap();
    let all = apply_hanging_constraints(&free, constraints).unwrap();
    assert_eq!(all.len(), mesh.n_total_nodes().unwrap());
    for (value, x) in all[free.len()..].iter().zip(mesh.hanging_nodes().unwrap()) {
        assert!((value - f(&x)).abs() < 1e-12);
    }
}

#[test]
fn hanging_faces_copy_the_coarse_face() {
    let mesh = octree_with_refined_corner();
    // 3 interior sides of the refined corner, 4 fine faces each
    assert_eq!(mesh.n_hanging_faces().unwrap(), 12);
    for axis in 0..3 {
        let constraints = mesh.hanging_constraints(LocationType::Faces(axis)).unwrap();
        let coarse = mesh.faces(axis).unwrap();
        let hanging = mesh.hanging_faces(axis).unwrap();
        assert_eq!(hanging.len(), 4);
        for (index, terms) in constraints.constraints() {
            assert_eq!(terms.len(), 1);
            assert_eq!(terms[0].weight, 1.0);
            let fine = &hanging[index - constraints.n_free()];
            assert_eq!(coarse[terms[0].index][axis], fine[axis]);
            assert_eq!(fine[axis], 1.0);
        }
    }
}

#[test]
fn projection_agrees_with_apply() {
    let mesh = octree_with_refined_corner();
    let constraints = mesh.hanging_constraints(LocationType::Edges(0)).unwrap();
    let free: Vec<f64> = (0..constraints.n_free()).map(|i| i as f64).collect();
    let expanded = apply_hanging_constraints(&free, constraints).unwrap();
    let p = constraints.projection();
    let mut product = vec![0.0; p.nrows()];
    for (i, j, v) in p.triplet_iter() {
        product[i] += v * free[j];
    }
    assert_eq!(product, expanded);
}

#[test]
fn cell_centers_have_no_constraints() {
    let mesh = octree_with_refined_corner();
    assert!(matches!(
        mesh.hanging_constraints(LocationType::CellCenters),
        Err(TreeMeshError::InvalidLocationType(_))
    ));
    let mesh = TreeMesh::uniform(&[2, 2], &[1.0, 1.0]).unwrap();
    assert!(matches!(
        mesh.hanging_constraints(LocationType::Faces(2)),
        Err(TreeMeshError::InvalidLocationType(_))
    ));
}
