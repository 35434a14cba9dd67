use tree_mesh::prelude::*;

fn adapted_mesh() -> TreeMesh {
    let mut mesh =
        TreeMesh::new(vec![vec![0.5; 4], vec![0.25; 8]], vec![1.0, -2.0]).expect("valid base grid");
    mesh.refine_points(
        &RefineOptions::default(),
        &[[1.3, -1.7], [2.9, -0.1]],
        &[3, 1],
    )
    .expect("refinement should succeed");
    mesh
}

#[test]
fn json_round_trip_reproduces_the_leaf_set() {
    let mesh = adapted_mesh();
    let json = serde_json::to_string(&mesh).expect("serialize");
    let restored: TreeMesh = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(restored, mesh);
    assert_eq!(restored.cell_keys(), mesh.cell_keys());
    assert_eq!(restored.x0(), mesh.x0());
    assert_eq!(restored.h(), mesh.h());
}

#[test]
fn serialized_form_lists_indexes_and_levels() {
    let mesh = adapted_mesh();
    let value = serde_json::to_value(&mesh).unwrap();
    let object = value.as_object().expect("a JSON object");
    let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["cell_indexes", "cell_levels", "h", "x0"]);
    assert_eq!(object["cell_indexes"].as_array().unwrap().len(), mesh.n_cells());
}

#[test]
fn order_of_persisted_cells_does_not_matter() {
    let mesh = adapted_mesh();
    let mut state = TreeMeshState::from(&mesh);
    let n = state.cell_indexes.len();
    let mut pairs: Vec<(u64, u8)> = state
        .cell_indexes
        .iter()
        .copied()
        .zip(state.cell_levels.iter().copied())
        .collect();
    pairs.rotate_left(n / 3);
    pairs.swap(0, n - 1);
    state.cell_indexes = pairs.iter().map(|p| p.0).collect();
    state.cell_levels = pairs.iter().map(|p| p.1).collect();
    let json = serde_json::to_string(&state).unwrap();
    let restored: TreeMesh = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, mesh);
}

#[test]
fn invalid_states_fail_to_deserialize() {
    let mesh = adapted_mesh();
    let mut state = TreeMeshState::from(&mesh);
    state.cell_levels[0] += 1;
    let json = serde_json::to_string(&state).unwrap();
    assert!(serde_json::from_str::<TreeMesh>(&json).is_err());

    let json = r#"{"cell_indexes":[0],"cell_levels":[0],"h":[[1.0,1.0,1.0],[1.0]],"x0":[]}"#;
    assert!(serde_json::from_str::<TreeMesh>(json).is_err());
}
