#![allow(dead_code)]

use ecs_runtime::{EcsConfig, EntityManager};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Velocity {
    pub dx: f32,
    pub dy: f32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Render(pub u32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Size(pub f32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Growth(pub f32);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Health(pub i32);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn small_config() -> EcsConfig {
    EcsConfig {
        max_entities: 2048,
        initial_pool_capacity: 16,
        worker_threads: 4,
        chunk_size: 64,
        ..EcsConfig::default()
    }
}

/// World with every test component registered.
pub fn world() -> EntityManager {
    init_logging();
    let mut world = EntityManager::new(small_config()).unwrap();
    world.register_cloneable::<Position>().unwrap();
    world.register::<Velocity>().unwrap();
    world.register::<Render>().unwrap();
    world.register::<Size>().unwrap();
    world.register::<Growth>().unwrap();
    world.register::<Health>().unwrap();
    world
}
