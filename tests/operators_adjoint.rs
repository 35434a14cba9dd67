use nalgebra::DVector;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tree_mesh::prelude::*;

fn refined_quadtree() -> TreeMesh {
    let mut mesh = TreeMesh::uniform(&[8, 4], &[2.0, 1.0]).expect("valid base grid");
    mesh.refine_points(
        &RefineOptions::default(),
        &[[0.6, 0.4], [1.55, 0.8]],
        &[3, 2],
    )
    .expect("refinement should succeed");
    mesh
}

fn refined_octree() -> TreeMesh {
    let mut mesh = TreeMesh::uniform(&[4, 4, 2], &[1.0, 1.0, 0.5]).expect("valid base grid");
    mesh.refine_points(&RefineOptions::default(), &[[0.4, 0.6, 0.2]], &[2])
        .expect("refinement should succeed");
    mesh
}

fn random_vector(rng: &mut SmallRng, n: usize) -> DVector<f64> {
    DVector::from_fn(n, |_, _| rng.gen_range(-1.0..1.0))
}

/// `<Div v, p>_cells + <v, Grad p>_faces` for `v` vanishing on the boundary.
fn adjoint_defect(mesh: &TreeMesh, seed: u64) -> (f64, f64) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let n_faces = mesh.n_faces().unwrap();
    let mut v = random_vector(&mut rng, n_faces);
    let offsets: Vec<usize> = std::iter::once(0)
        .chain(mesh.vn_faces().unwrap().iter().scan(0, |acc, n| {
            *acc += n;
            Some(*acc)
        }))
        .collect();
    for (side, indices) in mesh.face_boundary_indices().unwrap().iter().enumerate() {
        for i in indices {
            v[offsets[side / 2] + i] = 0.0;
        }
    }
    let p = random_vector(&mut rng, mesh.n_cells());

    let div_v = mesh.face_divergence().unwrap() * &v;
    let grad_p = mesh.cell_gradient().unwrap() * &p;
    let volumes = mesh.cell_volumes();
    let mass = LumpedFaceMass.face_mass(mesh).unwrap();

    let lhs: f64 = (0..mesh.n_cells()).map(|i| volumes[i] * div_v[i] * p[i]).sum();
    let rhs: f64 = (0..n_faces).map(|f| mass[f] * v[f] * grad_p[f]).sum();
    (lhs + rhs, lhs.abs().max(1.0))
}

#[test]
fn divergence_and_gradient_are_adjoint_in_2d() {
    let mesh = refined_quadtree();
    assert!(mesh.n_hanging_faces().unwrap() > 0);
    for seed in 0..4 {
        let (defect, scale) = adjoint_defect(&mesh, seed);
        assert!(defect.abs() < 1e-10 * scale, "defect {defect}");
    }
}

#[test]
fn divergence_and_gradient_are_adjoint_in_3d() {
    let mesh = refined_octree();
    assert!(mesh.n_hanging_faces().unwrap() > 0);
    for seed in 0..4 {
        let (defect, scale) = adjoint_defect(&mesh, seed);
        assert!(defect.abs() < 1e-10 * scale, "defect {defect}");
    }
}

#[test]
fn divergence_of_a_constant_field_vanishes() {
    for mesh in [refined_quadtree(), refined_octree()] {
        let n_fx = mesh.vn_faces().unwrap()[0];
        let mut v = DVector::zeros(mesh.n_faces().unwrap());
        for f in 0..n_fx {
            v[f] = 1.0;
        }
        let div_v = mesh.face_divergence().unwrap() * &v;
        assert!(div_v.iter().all(|d| d.abs() < 1e-10));
    }
}

#[test]
fn gradient_of_a_constant_is_zero_and_curl_grad_vanishes() {
    let mesh = refined_octree();
    let ones = DVector::from_element(mesh.n_cells(), 1.0);
    let grad = mesh.cell_gradient().unwrap() * &ones;
    assert!(grad.iter().all(|g| g.abs() < 1e-10));

    let mut rng = SmallRng::seed_from_u64(7);
    let phi = random_vector(&mut rng, mesh.n_nodes().unwrap());
    let e = mesh.nodal_gradient().unwrap() * &phi;
    let b = mesh.edge_curl().unwrap() * &e;
    assert!(b.iter().all(|x| x.abs() < 1e-10));
}

#[test]
fn per_axis_gradients_stack_into_the_full_gradient() {
    let mesh = refined_quadtree();
    let mut rng = SmallRng::seed_from_u64(11);
    let p = random_vector(&mut rng, mesh.n_cells());
    let full = mesh.cell_gradient().unwrap() * &p;
    let mut offset = 0;
    for axis in 0..2 {
        let part = mesh.cell_gradient_axis(axis).unwrap() * &p;
        for (i, g) in part.iter().enumerate() {
            assert!((g - full[offset + i]).abs() < 1e-9);
        }
        offset += part.len();
    }
    assert_eq!(offset, full.len());
}

#[test]
fn cell_gradient_stencil_differences_constants_to_zero_inside() {
    let mesh = refined_octree();
    let stencil = mesh.cell_gradient_stencil().unwrap();
    assert_eq!(
        (stencil.nrows(), stencil.ncols()),
        (mesh.n_faces().unwrap(), mesh.n_cells())
    );
    let ones = DVector::from_element(mesh.n_cells(), 1.0);
    let differences = stencil * &ones;
    let projection = mesh.interior_face_projection().unwrap();
    let interior = &projection * &differences;
    assert!(interior.iter().all(|d| d.abs() < 1e-12));

    let mut offset = 0;
    for axis in 0..3 {
        let block = mesh.cell_gradient_stencil_axis(axis).unwrap();
        assert_eq!(block.nrows(), mesh.vn_faces().unwrap()[axis]);
        for (row, col, value) in block.triplet_iter() {
            assert_eq!(stencil.get_entry(offset + row, col).unwrap().into_value(), *value);
        }
        offset += block.nrows();
    }
    assert!(std::ptr::eq(stencil, mesh.cell_gradient_stencil().unwrap()));
}

#[test]
fn per_axis_divergence_is_cached_until_refinement() {
    let mut mesh = refined_quadtree();
    let first: *const _ = mesh.face_divergence_axis(1).unwrap();
    assert!(std::ptr::eq(first, mesh.face_divergence_axis(1).unwrap()));
    assert_eq!(
        mesh.face_divergence_axis(1).unwrap().ncols(),
        mesh.vn_faces().unwrap()[1]
    );
    assert!(matches!(
        mesh.face_divergence_axis(2),
        Err(TreeMeshError::InvalidLocationType(_))
    ));

    let summary = mesh
        .refine_points(&RefineOptions::default(), &[[1.9, 0.1]], &[2])
        .unwrap();
    assert!(!summary.is_empty());
    let total: usize = (0..2)
        .map(|axis| mesh.face_divergence_axis(axis).unwrap().ncols())
        .sum();
    assert_eq!(total, mesh.n_faces().unwrap());
}
