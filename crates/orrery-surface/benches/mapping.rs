use criterion::{Criterion, black_box, criterion_group, criterion_main};
use glam::DVec3;
use orrery_surface::*;

fn bench_squared_distance_point(c: &mut Criterion) {
    let s = SquaredDistanceCube;
    c.bench_function("squared_distance_point", |bencher| {
        bencher.iter(|| black_box(s.surface_point(black_box(6_371_000.0), 2, 0.37, 0.61)))
    });
}

fn bench_squared_distance_inverse(c: &mut Criterion) {
    let s = SquaredDistanceCube;
    let p = s.surface_point(1.0, 2, 0.37, 0.61);
    c.bench_function("squared_distance_inverse", |bencher| {
        bencher.iter(|| black_box(s.surface_coord(black_box(p))))
    });
}

fn bench_uv_sphere_point(c: &mut Criterion) {
    let s = UvSphere;
    c.bench_function("uv_sphere_point", |bencher| {
        bencher.iter(|| black_box(s.surface_point(black_box(1.0), 0, 0.2, 0.8)))
    });
}

fn bench_patch_aabb(c: &mut Criterion) {
    let s = NormalizedCube;
    let b = PatchId::new(ShapeFamily::NormalizedCube, 4, 6, 17, 40)
        .map(|id| id.patch_box())
        .unwrap_or(PatchBox::UNIT);
    c.bench_function("normalized_cube_patch_aabb", |bencher| {
        bencher.iter(|| black_box(s.aabb(0.999, 1.001, 4, black_box(&b), DVec3::ZERO)))
    });
}

criterion_group!(
    benches,
    bench_squared_distance_point,
    bench_squared_distance_inverse,
    bench_uv_sphere_point,
    bench_patch_aabb,
);
criterion_main!(benches);
