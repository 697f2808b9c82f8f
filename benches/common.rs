#![allow(dead_code)]

use ecs_runtime::{ECSResult, EcsConfig, Entity, EntityManager};

pub const AGENTS_SMALL: usize = 10_000;
pub const AGENTS_MED: usize = 100_000;

#[derive(Clone, Copy)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy)]
pub struct Wealth {
    pub value: f32,
}

#[derive(Clone, Copy)]
pub struct Productivity {
    pub rate: f32,
}

pub fn config(agent_count: usize) -> EcsConfig {
    EcsConfig { max_entities: agent_count as u32 + 1, ..EcsConfig::default() }
}

pub fn make_world(agent_count: usize) -> ECSResult<EntityManager> {
    let mut world = EntityManager::new(config(agent_count))?;
    world.register::<Position>()?;
    world.register::<Wealth>()?;
    world.register::<Productivity>()?;
    world.freeze_components();
    Ok(world)
}

pub fn populate(world: &mut EntityManager, agent_count: usize) -> ECSResult<Vec<Entity>> {
    let mut entities = Vec::with_capacity(agent_count);
    for _ in 0..agent_count {
        let e = world.create()?;
        world.add(e, Position { x: 0.0, y: 0.0 })?;
        world.add(e, Wealth { value: 100.0 })?;
        world.add(e, Productivity { rate: 1.0 })?;
        entities.push(e);
    }
    Ok(entities)
}
