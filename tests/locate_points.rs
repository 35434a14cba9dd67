use tree_mesh::prelude::*;

#[test]
fn point_in_upper_right_quadrant_of_a_2x2_mesh() {
    let mesh = TreeMesh::uniform(&[2, 2], &[2.0, 2.0]).expect("valid base grid");
    let cell = mesh.locate_points(&[[1.5, 0.5]]).unwrap()[0];
    assert_eq!(mesh.cell_centers()[cell], vec![1.5, 0.5]);
    assert_eq!(mesh.cell_widths()[cell], vec![1.0, 1.0]);
}

#[test]
fn cells_are_half_open_except_at_the_upper_bound() {
    let mesh = TreeMesh::uniform(&[2, 2], &[2.0, 2.0]).unwrap();
    let cells = mesh
        .locate_points(&[[1.0, 1.0], [2.0, 2.0], [0.0, 2.0], [0.999, 0.0]])
        .unwrap();
    let centers = mesh.cell_centers();
    assert_eq!(centers[cells[0]], vec![1.5, 1.5]);
    assert_eq!(centers[cells[1]], vec![1.5, 1.5]);
    assert_eq!(centers[cells[2]], vec![0.5, 1.5]);
    assert_eq!(centers[cells[3]], vec![0.5, 0.5]);
}

#[test]
fn outside_points_are_reported() {
    let mesh = TreeMesh::new(vec![vec![0.5; 4], vec![0.25; 2]], vec![-1.0, 1.0]).unwrap();
    assert_eq!(mesh.domain(), (vec![-1.0, 1.0], vec![1.0, 1.5]));
    let points = [[0.0, 1.2], [0.0, 0.9], [1.1, 1.2]];
    assert!(matches!(
        mesh.locate_points(&points),
        Err(TreeMeshError::OutOfBounds { index: 1, .. })
    ));
    let found = mesh.try_locate_points(&points).unwrap();
    assert!(found[0].is_some());
    assert_eq!(&found[1..], &[None, None]);
}

#[test]
fn located_levels_follow_refinement() {
    let mut mesh = TreeMesh::uniform(&[4, 4, 4], &[1.0, 1.0, 1.0]).unwrap();
    mesh.refine(&RefineOptions::default(), 2, |cell| {
        cell.center[0] < 0.25 && cell.center[1] < 0.25 && cell.center[2] < 0.25
    })
    .unwrap();
    let points = [[0.01, 0.01, 0.01], [0.9, 0.9, 0.9]];
    let cells = mesh.locate_points(&points).unwrap();
    assert_eq!(mesh.levels_of(&cells).unwrap(), vec![2, 0]);
    for (cell, p) in cells.iter().zip(points) {
        let center = &mesh.cell_centers()[*cell];
        let widths = &mesh.cell_widths()[*cell];
        for axis in 0..3 {
            assert!((p[axis] - center[axis]).abs() <= widths[axis] / 2.0);
        }
    }
}
