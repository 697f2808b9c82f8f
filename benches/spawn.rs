use std::hint::black_box;

use criterion::*;
use ecs_runtime::{CommandBuffer, EntityManager};

mod common;
use common::{Position, Wealth};


fn spawn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    group.bench_function("spawn_100k_direct", |b| {
        b.iter(|| {
            let mut world = common::make_world(common::AGENTS_MED).expect("world setup failed");
            common::populate(&mut world, common::AGENTS_MED).expect("populate failed");
            black_box(world);
        });
    });

    group.bench_function("spawn_100k_deferred", |b| {
        b.iter_batched(
            || common::make_world(common::AGENTS_MED).expect("world setup failed"),
            |mut world: EntityManager| {
                let mut buffer = CommandBuffer::new();
                for _ in 0..common::AGENTS_MED {
                    let e = buffer.spawn();
                    buffer.add(e, Position { x: 0.0, y: 0.0 });
                    buffer.add(e, Wealth { value: 100.0 });
                }
                let report = world.apply_commands(buffer);
                black_box(report);
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.bench_function("destroy_and_reuse_10k", |b| {
        b.iter_batched(
            || {
                let mut world = common::make_world(common::AGENTS_SMALL).expect("world setup failed");
                let entities = common::populate(&mut world, common::AGENTS_SMALL).expect("populate failed");
                (world, entities)
            },
            |(mut world, entities)| {
                for e in entities.iter().step_by(2) {
                    world.destroy(*e).expect("destroy failed");
                }
                for _ in 0..entities.len() / 2 {
                    let e = world.create().expect("create failed");
                    world.add(e, Position { x: 1.0, y: 1.0 }).expect("add failed");
                }
                black_box(world);
            },
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark);
criterion_main!(benches);
