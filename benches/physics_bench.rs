use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ballast::{collision::DynamicTree, *};
use std::hint::black_box;

const DT: f32 = 1.0 / 100.0;

/// Grid of box stacks on a static ground plate, settled for a few steps.
fn prepare_world(stacks: usize) -> World {
    let mut world = World::new(WorldConfig::default().with_sleeping(false));
    let ground = world.create_rigid_body();
    world
        .add_shape(ground, Shape::cuboid(Vec3::new(100.0, 0.5, 100.0)))
        .expect("ground");
    world.set_static(ground, true).expect("ground");

    let side = (stacks as f32).sqrt().ceil() as usize;
    for i in 0..stacks {
        let (x, z) = ((i % side) as f32 * 3.0, (i / side) as f32 * 3.0);
        for level in 0..4 {
            let body = world.create_rigid_body();
            if let Some(body) = world.body_mut(body) {
                body.position = Vec3::new(x, 1.0 + level as f32 * 1.01, z);
            }
            world.add_shape(body, Shape::cuboid(Vec3::splat(0.5))).expect("box");
        }
    }
    for _ in 0..10 {
        world.step(DT, false).expect("settle");
    }
    world
}

fn bench_world_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("world_step");
    for &stacks in &[16usize, 64, 256] {
        let mut sequential = prepare_world(stacks);
        group.bench_with_input(BenchmarkId::new("sequential", stacks), &stacks, |b, _| {
            b.iter(|| sequential.step(black_box(DT), false).expect("step"))
        });
        let mut parallel = prepare_world(stacks);
        group.bench_with_input(BenchmarkId::new("parallel", stacks), &stacks, |b, _| {
            b.iter(|| parallel.step(black_box(DT), true).expect("step"))
        });
    }
    group.finish();
}

fn bench_tree_pairs(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic_tree");
    for &count in &[1_000usize, 10_000] {
        let mut tree = DynamicTree::new(0.1);
        let side = (count as f32).cbrt().ceil() as usize;
        for i in 0..count {
            let center = Vec3::new((i % side) as f32, ((i / side) % side) as f32, (i / (side * side)) as f32) * 0.9;
            tree.add_proxy(i, Aabb::from_center_half_extents(center, Vec3::splat(0.5)), true);
        }
        group.bench_with_input(BenchmarkId::new("enumerate_pairs", count), &count, |b, _| {
            b.iter(|| {
                let mut pairs = 0usize;
                tree.enumerate_pairs(|_, _| true, |_, _| pairs += 1);
                black_box(pairs)
            })
        });
    }
    group.finish();
}

fn bench_ray_cast(c: &mut Criterion) {
    let world = prepare_world(256);
    c.bench_function("world_ray_cast", |b| {
        b.iter(|| {
            world.ray_cast(
                black_box(Vec3::new(-5.0, 2.0, -5.0)),
                black_box(Vec3::new(1.0, -0.05, 1.0)),
                None,
                |_| true,
                |_| true,
            )
        })
    });
}

fn bench_narrow_phase(c: &mut Criterion) {
    let cube = ShapeKind::Box {
        half_extents: Vec3::splat(0.5),
    };
    let hull = ShapeKind::ConvexHull {
        vertices: vec![
            Vec3::new(0.0, 0.6, 0.0),
            Vec3::new(0.5, -0.3, 0.5),
            Vec3::new(-0.5, -0.3, 0.5),
            Vec3::new(0.0, -0.3, -0.6),
        ],
    };
    let rotation = Quat::from_rotation_y(0.3) * Quat::from_rotation_x(0.2);
    c.bench_function("gjk_epa_box_hull", |b| {
        b.iter(|| {
            collision::NarrowPhase::test_overlap(
                black_box(&cube),
                Quat::IDENTITY,
                Vec3::ZERO,
                black_box(&hull),
                rotation,
                Vec3::new(0.7, 0.2, 0.0),
            )
        })
    });
}

criterion_group!(benches, bench_world_step, bench_tree_pairs, bench_ray_cast, bench_narrow_phase);
criterion_main!(benches);
