use tree_mesh::prelude::*;

/// 8x8 mesh over [0, 8]^2 with the cell covering [4, 5) x [4, 5) split once.
fn refined_center() -> (TreeMesh, usize) {
    let mut mesh = TreeMesh::uniform(&[8, 8], &[8.0, 8.0]).expect("valid base grid");
    let cell = mesh.locate_points(&[[4.0, 4.0]]).expect("inside")[0];
    assert_eq!(mesh.cell_centers()[cell], vec![4.5, 4.5]);
    mesh.refine_cells(&RefineOptions::default(), &[cell])
        .expect("refinement should succeed");
    (mesh, cell)
}

fn cell_at(mesh: &TreeMesh, x: f64, y: f64) -> usize {
    mesh.locate_points(&[[x, y]]).expect("inside")[0]
}

#[test]
fn single_refinement_replaces_one_cell_by_four() {
    let (mesh, _) = refined_center();
    assert_eq!(mesh.n_cells(), 67);
    assert_eq!(mesh.cells_per_level(), vec![63, 4]);
    let fine: Vec<Vec<f64>> = mesh
        .cell_keys()
        .iter()
        .zip(mesh.cell_centers())
        .filter(|(key, _)| key.level == 1)
        .map(|(_, c)| c)
        .collect();
    assert_eq!(
        fine,
        vec![
            vec![4.25, 4.25],
            vec![4.75, 4.25],
            vec![4.25, 4.75],
            vec![4.75, 4.75]
        ]
    );
    mesh.validate_invariants().expect("balanced and tiled");
}

#[test]
fn neighbors_of_the_refined_cell_see_two_finer_cells() {
    let (mesh, _) = refined_center();
    let cases = [
        (cell_at(&mesh, 3.5, 4.5), 0, 1),
        (cell_at(&mesh, 5.5, 4.5), 0, 0),
        (cell_at(&mesh, 4.5, 3.5), 1, 1),
        (cell_at(&mesh, 4.5, 5.5), 1, 0),
    ];
    for (cell, axis, side) in cases {
        match mesh.cell_neighbors(cell, axis, side).expect("valid face") {
            Neighbor::Finer(cells) => {
                assert_eq!(cells.len(), 2);
                for c in cells {
                    assert_eq!(mesh.cell_key(c).unwrap().level, 1);
                }
            }
            other => panic!("expected finer neighbors, got {other:?}"),
        }
    }
    let corner = cell_at(&mesh, 0.5, 0.5);
    assert_eq!(mesh.cell_neighbors(corner, 0, 0).unwrap(), Neighbor::Boundary);
    assert!(matches!(
        mesh.cell_neighbors(corner, 0, 1).unwrap(),
        Neighbor::Conforming(_)
    ));
}

#[test]
fn mid_edge_nodes_hang_on_coarse_endpoints() {
    let (mesh, _) = refined_center();
    assert_eq!(mesh.n_hanging_nodes().unwrap(), 4);
    assert_eq!(mesh.n_nodes().unwrap(), 81 + 1);
    assert_eq!(mesh.n_hanging_faces().unwrap(), 8);

    let nodes = mesh.nodes().unwrap();
    let hanging = mesh.hanging_nodes().unwrap();
    let constraints = mesh.hanging_constraints(LocationType::Nodes).unwrap();
    assert_eq!(constraints.n_free(), nodes.len());
    for (index, terms) in constraints.constraints() {
        let at = &hanging[index - constraints.n_free()];
        assert_eq!(terms.len(), 2);
        let mut midpoint = [0.0; 2];
        for term in terms {
            assert_eq!(term.weight, 0.5);
            for axis in 0..2 {
                midpoint[axis] += 0.5 * nodes[term.index][axis];
            }
        }
        assert_eq!(midpoint.to_vec(), *at);
        // the hanging node lies on the refined cell's boundary
        assert!(at.iter().all(|x| (4.0..=5.0).contains(x)));
    }
}

#[test]
fn operator_shapes_follow_counts() {
    let (mesh, _) = refined_center();
    let div = mesh.face_divergence().unwrap();
    assert_eq!((div.nrows(), div.ncols()), (67, mesh.n_faces().unwrap()));
    let grad = mesh.nodal_gradient().unwrap();
    assert_eq!((grad.nrows(), grad.ncols()), (mesh.n_edges().unwrap(), 82));
    let curl = mesh.edge_curl().unwrap();
    assert_eq!((curl.nrows(), curl.ncols()), (67, mesh.n_edges().unwrap()));
    for axis in 0..2 {
        let g = mesh.cell_gradient_axis(axis).unwrap();
        assert_eq!(g.nrows(), mesh.vn_faces().unwrap()[axis]);
    }
    assert!(matches!(
        mesh.cell_gradient_axis(2),
        Err(TreeMeshError::InvalidLocationType(_))
    ));
}

#[test]
fn refine_points_reaches_requested_levels() {
    let mut mesh = TreeMesh::uniform(&[4, 4], &[1.0, 1.0]).unwrap();
    mesh.refine_points(&RefineOptions::default(), &[[0.1, 0.1], [0.9, 0.6]], &[3, 1])
        .unwrap();
    let cells = mesh.locate_points(&[[0.1, 0.1], [0.9, 0.6]]).unwrap();
    assert_eq!(mesh.levels_of(&cells).unwrap(), vec![3, 1]);
    mesh.validate_invariants().unwrap();
    assert!(matches!(
        mesh.refine_points(&RefineOptions::default(), &[[2.0, 0.0]], &[1]),
        Err(TreeMeshError::OutOfBounds { index: 0, .. })
    ));
}

#[test]
fn predicate_refinement_respects_max_level() {
    let mut mesh = TreeMesh::uniform(&[2, 2, 2], &[1.0, 1.0, 1.0]).unwrap();
    let summary = mesh
        .refine(&RefineOptions::default(), 2, |cell| {
            cell.center.iter().all(|x| *x < 0.3)
        })
        .unwrap();
    assert!(!summary.is_empty());
    assert_eq!(mesh.max_used_level(), 2);
    mesh.validate_invariants().unwrap();
}
