use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use tree_mesh::prelude::*;

fn adapted_mesh(levels: u8) -> TreeMesh {
    let mut mesh = TreeMesh::uniform(&[16, 16, 16], &[1.0, 1.0, 1.0]).expect("valid base grid");
    mesh.refine_points(&RefineOptions::default(), &[[0.5, 0.5, 0.5]], &[levels])
        .expect("refinement should succeed");
    mesh
}

fn random_points(n: usize) -> Vec<[f64; 3]> {
    let mut rng = SmallRng::seed_from_u64(42);
    (0..n)
        .map(|_| [rng.r#gen(), rng.r#gen(), rng.r#gen()])
        .collect()
}

fn bench_locate(c: &mut Criterion) {
    let mut group = c.benchmark_group("locate_points");
    let points = random_points(10_000);
    for levels in [0u8, 2, 4] {
        let mesh = adapted_mesh(levels);
        group.bench_with_input(BenchmarkId::from_parameter(levels), &mesh, |b, mesh| {
            b.iter(|| black_box(mesh.locate_points(black_box(&points)).unwrap()));
        });
    }
    group.finish();
}

fn bench_assembly(c: &mut Criterion) {
    let mut group = c.benchmark_group("assembly");
    let mesh = adapted_mesh(3);
    group.bench_function("entities", |b| {
        b.iter(|| {
            let mut fresh = mesh.clone();
            fresh.invalidate_cache();
            black_box(fresh.n_total_faces().unwrap())
        });
    });
    group.bench_function("face_divergence", |b| {
        b.iter(|| {
            let mut fresh = mesh.clone();
            fresh.invalidate_cache();
            black_box(fresh.face_divergence().unwrap().nnz())
        });
    });
    group.bench_function("edge_curl", |b| {
        b.iter(|| {
            let mut fresh = mesh.clone();
            fresh.invalidate_cache();
            black_box(fresh.edge_curl().unwrap().nnz())
        });
    });
    group.finish();
}

criterion_group!(benches, bench_locate, bench_assembly);
criterion_main!(benches);
