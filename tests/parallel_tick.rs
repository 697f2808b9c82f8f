use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use ecs_runtime::{EcsConfig, EntityManager, JobBuilder, JobKind, System, SystemManager};

mod common;
use common::{Growth, Health, Position, Render, Velocity};


#[derive(Clone, Copy, Debug, PartialEq)]
struct Counter(u32);

#[derive(Clone, Copy, Debug, PartialEq)]
struct Spawned(u32);

fn populate(world: &mut EntityManager, count: usize) -> Vec<ecs_runtime::Entity> {
    (0..count)
        .map(|i| {
            let e = world.create().unwrap();
            world.add(e, Position { x: i as f32, y: 0.0 }).unwrap();
            world.add(e, Velocity { dx: 1.0, dy: 2.0 }).unwrap();
            if i % 2 == 0 {
                world.add(e, Health(i as i32)).unwrap();
            }
            e
        })
        .collect()
}

#[test]
fn parallel_job_updates_every_entity() {
    let mut world = common::world();
    let entities = populate(&mut world, 1000);

    let integrate = JobBuilder::new("integrate", world.registry())
        .read::<Velocity>()
        .unwrap()
        .write::<Position>()
        .unwrap()
        .each(|item, _| {
            let (Some(v), Some(mut p)) = (item.read::<Velocity>(), item.write::<Position>()) else {
                return;
            };
            p.x += v.dx;
            p.y += v.dy;
        });

    let mut system = System::new(0, "movement");
    system.add_job(integrate);
    let mut manager = SystemManager::new(common::small_config()).unwrap();
    manager.add_system(system);

    let report = manager.tick(&mut world).unwrap();
    assert_eq!(report.tick, 1);
    assert_eq!(report.stages, 1);
    // Two partitions (with and without Health) of 500 entities, 64 per chunk.
    assert_eq!(report.chunks, 16);

    for (i, &e) in entities.iter().enumerate() {
        assert_eq!(world.get::<Position>(e), Some(&Position { x: i as f32 + 1.0, y: 2.0 }));
    }

    manager.tick(&mut world).unwrap();
    assert_eq!(world.get::<Position>(entities[10]).map(|p| p.x), Some(12.0));
    assert_eq!(manager.ticks(), 2);
}

#[test]
fn dependent_stage_sees_previous_stage_writes() {
    let mut world = common::world();
    let entities = populate(&mut world, 300);

    let mut system = System::new(1, "chain");
    let a = system.add_job(
        JobBuilder::new("a", world.registry())
            .write::<Position>()
            .unwrap()
            .each(|item, _| {
                if let Some(mut p) = item.write::<Position>() {
                    p.x += 1.0;
                }
            }),
    );
    let b = system.add_job(
        JobBuilder::new("b", world.registry())
            .read::<Position>()
            .unwrap()
            .write::<Velocity>()
            .unwrap()
            .each(|item, _| {
                if let (Some(p), Some(mut v)) = (item.read::<Position>(), item.write::<Velocity>()) {
                    v.dx = p.x;
                }
            }),
    );
    system.add_dependency(b, a).unwrap();

    let mut manager = SystemManager::new(common::small_config()).unwrap();
    manager.add_system(system);
    let report = manager.tick(&mut world).unwrap();
    assert_eq!(report.stages, 2);

    for (i, &e) in entities.iter().enumerate() {
        assert_eq!(world.get::<Velocity>(e).map(|v| v.dx), Some(i as f32 + 1.0));
    }
}

#[test]
fn structural_changes_wait_for_replay() {
    let mut world = common::world();
    let entities = populate(&mut world, 200);
    world.register::<Spawned>().unwrap();

    let live_during = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&live_during);

    let reap = JobBuilder::new("reap", world.registry())
        .read::<Health>()
        .unwrap()
        .each(move |item, commands| {
            seen.fetch_add(1, Ordering::Relaxed);
            let Some(health) = item.read::<Health>() else { return; };
            if health.0 % 4 == 0 {
                commands.destroy(item.entity());
            }
            let child = commands.spawn();
            commands.add(child, Spawned(item.entity().id));
        });

    let mut system = System::new(2, "reaper");
    system.add_job(reap);
    let mut manager = SystemManager::new(common::small_config()).unwrap();
    manager.add_system(system);

    let query = world.query().with::<Health>().unwrap().build();
    let expected: Vec<u32> = world.matching(&query).map(|e| e.id).collect();

    let report = manager.tick(&mut world).unwrap();
    assert_eq!(live_during.load(Ordering::Relaxed), 100);
    assert_eq!(report.replay.failed, 0);
    assert_eq!(report.replay.created.len(), 100);

    // Replay order follows entity order, not thread timing.
    let spawned: Vec<u32> = report
        .replay
        .created
        .iter()
        .map(|&e| world.get::<Spawned>(e).unwrap().0)
        .collect();
    assert_eq!(spawned, expected);

    let destroyed = entities.iter().enumerate().filter(|(i, _)| i % 4 == 0).count();
    assert_eq!(world.live_count() as usize, 200 - destroyed + 100);
    for (i, &e) in entities.iter().enumerate() {
        assert_eq!(world.exists(e), i % 4 != 0);
    }
}

#[test]
fn main_thread_jobs_run_on_calling_thread() {
    let mut world = common::world();
    populate(&mut world, 400);

    let caller = std::thread::current().id();
    let threads = Arc::new(Mutex::new(HashSet::new()));
    let record = Arc::clone(&threads);

    let ui = JobBuilder::new("ui", world.registry())
        .read::<Position>()
        .unwrap()
        .kind(JobKind::MainThreadOnly)
        .each(move |_, _| {
            record.lock().insert(std::thread::current().id());
        });

    let mut system = System::new(3, "ui");
    system.add_job(ui);
    let mut manager = SystemManager::new(common::small_config()).unwrap();
    manager.add_system(system);
    manager.tick(&mut world).unwrap();

    assert_eq!(*threads.lock(), HashSet::from([caller]));
}

#[test]
fn blocking_job_runs_after_the_rest_of_its_stage() {
    let mut world = common::world();
    populate(&mut world, 500);

    let processed = Arc::new(AtomicUsize::new(0));
    let observed = Arc::new(AtomicUsize::new(usize::MAX));

    let count = Arc::clone(&processed);
    let worker = JobBuilder::new("worker", world.registry())
        .read::<Velocity>()
        .unwrap()
        .each(move |_, _| {
            count.fetch_add(1, Ordering::SeqCst);
        });

    let (count, seen) = (Arc::clone(&processed), Arc::clone(&observed));
    let barrier = JobBuilder::new("barrier", world.registry())
        .read::<Position>()
        .unwrap()
        .kind(JobKind::Blocking)
        .each(move |_, _| {
            seen.fetch_min(count.load(Ordering::SeqCst), Ordering::SeqCst);
        });

    let mut system = System::new(4, "blocking");
    let w = system.add_job(worker);
    let b = system.add_job(barrier);
    assert_eq!(system.stage_of(w), system.stage_of(b));

    let mut manager = SystemManager::new(common::small_config()).unwrap();
    manager.add_system(system);
    manager.tick(&mut world).unwrap();

    assert_eq!(observed.load(Ordering::SeqCst), 500);
}

#[test]
fn undeclared_access_is_refused_without_stopping_the_job() {
    let mut world = common::world();
    populate(&mut world, 100);

    let refused = Arc::new(AtomicUsize::new(0));
    let count = Arc::clone(&refused);
    let sloppy = JobBuilder::new("sloppy", world.registry())
        .read::<Position>()
        .unwrap()
        .each(move |item, _| {
            if item.read::<Velocity>().is_none() && item.write::<Position>().is_none() {
                count.fetch_add(1, Ordering::Relaxed);
            }
        });

    let mut system = System::new(5, "sloppy");
    system.add_job(sloppy);
    let mut manager = SystemManager::new(common::small_config()).unwrap();
    manager.add_system(system);
    manager.tick(&mut world).unwrap();

    assert_eq!(refused.load(Ordering::Relaxed), 100);
}

#[test]
fn overlapping_borrows_within_one_call_are_refused() {
    let mut world = common::world();
    let entities = populate(&mut world, 100);

    let refused = Arc::new(AtomicUsize::new(0));
    let shared = Arc::new(AtomicUsize::new(0));
    let (refusals, readers) = (Arc::clone(&refused), Arc::clone(&shared));
    let overlap = JobBuilder::new("overlap", world.registry())
        .read::<Velocity>()
        .unwrap()
        .write::<Position>()
        .unwrap()
        .scratch::<u32>()
        .each(move |item, _| {
            {
                let Some(mut first) = item.write::<Position>() else { return; };
                if item.write::<Position>().is_none() {
                    refusals.fetch_add(1, Ordering::Relaxed);
                }
                if item.read::<Position>().is_none() {
                    refusals.fetch_add(1, Ordering::Relaxed);
                }
                first.x += 1.0;
            }
            if let Some(mut again) = item.write::<Position>() {
                again.y += 1.0;
            }

            if let (Some(a), Some(b)) = (item.read::<Velocity>(), item.read::<Velocity>()) {
                if a.dx == b.dx {
                    readers.fetch_add(1, Ordering::Relaxed);
                }
            }

            let Some(mut slot) = item.scratch::<u32>() else { return; };
            if item.scratch::<u32>().is_none() {
                refusals.fetch_add(1, Ordering::Relaxed);
            }
            *slot += 1;
        });

    let mut system = System::new(5, "overlap");
    let handle = system.add_job(overlap);
    let mut manager = SystemManager::new(common::small_config()).unwrap();
    manager.add_system(system);
    manager.tick(&mut world).unwrap();

    assert_eq!(refused.load(Ordering::Relaxed), 300);
    assert_eq!(shared.load(Ordering::Relaxed), 100);
    for (i, &e) in entities.iter().enumerate() {
        assert_eq!(world.get::<Position>(e), Some(&Position { x: i as f32 + 1.0, y: 1.0 }));
    }
    let job = manager.systems()[0].job(handle).unwrap();
    assert!(job.scratch::<u32>().unwrap().current().iter().all(|&v| v == 1));
}

#[test]
fn scratch_carries_values_between_ticks() {
    let mut world = common::world();
    world.register::<Counter>().unwrap();
    let entities = populate(&mut world, 150);
    for &e in &entities {
        world.add(e, Counter(0)).unwrap();
    }

    let count = JobBuilder::new("count", world.registry())
        .write::<Counter>()
        .unwrap()
        .scratch::<u32>()
        .each(|item, _| {
            let previous = item.previous_scratch::<u32>().copied().unwrap_or(0);
            if let Some(mut slot) = item.scratch::<u32>() {
                *slot = previous + 1;
            }
            if let Some(mut counter) = item.write::<Counter>() {
                counter.0 = previous + 1;
            }
        });

    let mut system = System::new(6, "scratch");
    let handle = system.add_job(count);
    let mut manager = SystemManager::new(common::small_config()).unwrap();
    manager.add_system(system);

    for _ in 0..3 {
        manager.tick(&mut world).unwrap();
    }
    for &e in &entities {
        assert_eq!(world.get::<Counter>(e), Some(&Counter(3)));
    }

    let job = manager.systems()[0].job(handle).unwrap();
    let scratch = job.scratch::<u32>().unwrap();
    assert_eq!(scratch.current().len(), 150);
    assert!(scratch.current().iter().all(|&v| v == 3));
    assert!(scratch.previous().iter().all(|&v| v == 2));
}

#[test]
fn systems_run_in_registration_order() {
    let mut world = common::world();
    let entities = populate(&mut world, 64);

    let double = JobBuilder::new("double", world.registry())
        .write::<Position>()
        .unwrap()
        .each(|item, _| {
            if let Some(mut p) = item.write::<Position>() {
                p.x *= 2.0;
            }
        });
    let increment = JobBuilder::new("increment", world.registry())
        .write::<Position>()
        .unwrap()
        .each(|item, _| {
            if let Some(mut p) = item.write::<Position>() {
                p.x += 1.0;
            }
        });

    let mut first = System::new(7, "first");
    first.add_job(double);
    let mut second = System::new(8, "second");
    second.add_job(increment);

    let config = EcsConfig { worker_threads: 2, chunk_size: 8, ..common::small_config() };
    let mut manager = SystemManager::new(config).unwrap();
    manager.add_system(first);
    manager.add_system(second);
    assert_eq!(manager.worker_threads(), 2);
    manager.tick(&mut world).unwrap();

    for (i, &e) in entities.iter().enumerate() {
        assert_eq!(world.get::<Position>(e).map(|p| p.x), Some(i as f32 * 2.0 + 1.0));
    }
}

#[test]
fn excluded_components_filter_job_entities() {
    let mut world = common::world();
    let entities = populate(&mut world, 90);
    for &e in entities.iter().step_by(3) {
        world.add(e, Render(1)).unwrap();
    }

    let touched = Arc::new(Mutex::new(HashSet::new()));
    let record = Arc::clone(&touched);
    let job = JobBuilder::new("unrendered", world.registry())
        .with::<Position>()
        .unwrap()
        .without::<Render>()
        .unwrap()
        .any_of::<(Health, Growth)>()
        .unwrap()
        .each(move |item, _| {
            record.lock().insert(item.entity());
        });

    let mut system = System::new(9, "filter");
    system.add_job(job);
    let mut manager = SystemManager::new(common::small_config()).unwrap();
    manager.add_system(system);
    manager.tick(&mut world).unwrap();

    let expected: HashSet<_> = entities
        .iter()
        .enumerate()
        .filter(|(i, _)| i % 2 == 0 && i % 3 != 0)
        .map(|(_, &e)| e)
        .collect();
    assert_eq!(*touched.lock(), expected);
}
