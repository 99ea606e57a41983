use criterion::{Criterion, black_box, criterion_group, criterion_main};

use glam::{IVec3, Vec3};

use voxfield::map::{OctreeConfig, Resolution, TsdfData, TsdfOctree, allocator, visitor};

/// A populated octree: a slab of valid TSDF data around z = 32.
fn test_octree() -> TsdfOctree {
    let octree = TsdfOctree::new(OctreeConfig {
        size: 128,
        voxel_size: 0.05,
        resolution: Resolution::Multi,
    })
    .unwrap();
    for z in 24..40 {
        for y in 8..120 {
            for x in 8..120 {
                let coord = IVec3::new(x, y, z);
                let block = allocator::block(&octree, coord).unwrap();
                block.set_data(coord, 0, TsdfData::new((z - 32) as f32 / 8.0, 1.0));
            }
        }
    }
    octree
}

fn bench_allocate(c: &mut Criterion) {
    let coords: Vec<IVec3> = (0..512)
        .map(|i| IVec3::new((i % 16) * 8, ((i / 16) % 16) * 8, (i / 256) * 8))
        .collect();

    c.bench_function("allocate_512_blocks", |b| {
        b.iter(|| {
            let octree = TsdfOctree::new(OctreeConfig {
                size: 128,
                voxel_size: 0.05,
                resolution: Resolution::Multi,
            })
            .unwrap();
            allocator::blocks(&octree, black_box(&coords)).unwrap()
        });
    });
}

fn bench_point_lookup(c: &mut Criterion) {
    let octree = test_octree();

    c.bench_function("field_lookup", |b| {
        let mut i = 0i32;
        b.iter(|| {
            i = (i + 1) % 100;
            visitor::field(&octree, black_box(IVec3::new(10 + i, 64, 32)))
        });
    });
}

fn bench_point_lookup_hinted(c: &mut Criterion) {
    let octree = test_octree();
    let hint = voxfield::map::fetcher::block(&octree, IVec3::new(64, 64, 32));

    c.bench_function("field_lookup_hinted", |b| {
        let mut i = 0i32;
        b.iter(|| {
            i = (i + 1) % 8;
            visitor::field_with_hint(&octree, hint, black_box(IVec3::new(64 + i, 64, 32)))
        });
    });
}

fn bench_interp(c: &mut Criterion) {
    let octree = test_octree();

    c.bench_function("field_interp", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = (i + 1) % 100;
            let p = Vec3::new(20.0 + i as f32 * 0.5, 64.25, 32.5);
            visitor::field_interp(&octree, black_box(p))
        });
    });
}

fn bench_gradient(c: &mut Criterion) {
    let octree = test_octree();

    c.bench_function("field_grad", |b| {
        let mut i = 0u32;
        b.iter(|| {
            i = (i + 1) % 100;
            let p = Vec3::new(20.0 + i as f32 * 0.5, 64.25, 32.5);
            visitor::field_grad(&octree, black_box(p))
        });
    });
}

criterion_group!(
    benches,
    bench_allocate,
    bench_point_lookup,
    bench_point_lookup_hinted,
    bench_interp,
    bench_gradient
);
criterion_main!(benches);
