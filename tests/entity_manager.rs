use ecs_runtime::{ECSError, EcsConfig, Entity, EntityManager, RegistryError};

mod common;
use common::{Growth, Health, Position, Render, Size, Velocity};


#[test]
fn destroyed_entity_no_longer_exists_and_reuse_bumps_version() {
    let mut world = common::world();

    let e = world.create().unwrap();
    assert!(world.exists(e));

    world.destroy(e).unwrap();
    assert!(!world.exists(e));

    // The freed id is recycled first, under a new version.
    let reused = world.create().unwrap();
    assert_eq!(reused.id, e.id);
    assert_ne!(reused.version, e.version);
    assert!(world.exists(reused));
    assert!(!world.exists(e), "stale handle must not alias the new entity");
}

#[test]
fn table_exhaustion_is_reported_not_fatal() {
    common::init_logging();
    let config = EcsConfig { max_entities: 4, ..common::small_config() };
    let mut world = EntityManager::new(config).unwrap();

    // One id is reserved for the null sentinel.
    assert_eq!(world.capacity(), 3);
    for _ in 0..3 {
        world.create().unwrap();
    }

    let err = world.create().unwrap_err();
    assert!(matches!(err, ECSError::Capacity(_)));
    assert_eq!(world.live_count(), 3);
}

#[test]
fn add_get_remove_round_trip() {
    let mut world = common::world();
    let e = world.create().unwrap();

    let value = Position { x: 1.5, y: -2.0 };
    world.add(e, value).unwrap();
    assert_eq!(world.get::<Position>(e), Some(&value));
    assert!(world.has::<Position>(e));

    let removed = world.remove::<Position>(e).unwrap();
    assert_eq!(removed, value);
    assert_eq!(world.get::<Position>(e), None);
    assert!(!world.has::<Position>(e));

    // Removing twice fails without touching the entity.
    assert!(matches!(world.remove::<Position>(e), Err(ECSError::MissingComponent { .. })));
    assert!(world.exists(e));
}

#[test]
fn add_on_existing_component_replaces_value() {
    let mut world = common::world();
    let e = world.create().unwrap();

    world.add(e, Health(10)).unwrap();
    world.add(e, Health(3)).unwrap();

    assert_eq!(world.get::<Health>(e), Some(&Health(3)));
    assert_eq!(world.pool_size::<Health>(), 1);
}

#[test]
fn get_mut_edits_in_place() {
    let mut world = common::world();
    let e = world.create().unwrap();
    world.add(e, Velocity { dx: 1.0, dy: 0.0 }).unwrap();

    if let Some(v) = world.get_mut::<Velocity>(e) {
        v.dy = 4.0;
    }
    assert_eq!(world.get::<Velocity>(e), Some(&Velocity { dx: 1.0, dy: 4.0 }));
}

#[test]
fn stale_handles_degrade_to_errors() {
    let mut world = common::world();
    let e = world.create().unwrap();
    world.add(e, Health(1)).unwrap();
    world.destroy(e).unwrap();

    assert!(matches!(world.add(e, Health(2)), Err(ECSError::InvalidHandle(_))));
    assert!(matches!(world.remove::<Health>(e), Err(ECSError::InvalidHandle(_))));
    assert!(matches!(world.destroy(e), Err(ECSError::InvalidHandle(_))));
    assert_eq!(world.get::<Health>(e), None);
    assert_eq!(world.signature(e), None);

    assert!(!world.exists(Entity::NULL));
    assert!(world.destroy(Entity::NULL).is_err());
}

#[test]
fn destroy_releases_every_component() {
    let mut world = common::world();
    let e = world.create().unwrap();
    let keep = world.create().unwrap();

    for entity in [e, keep] {
        world.add(entity, Position::default()).unwrap();
        world.add(entity, Velocity::default()).unwrap();
        world.add(entity, Health(5)).unwrap();
    }
    world.destroy(e).unwrap();

    assert_eq!(world.pool_size::<Position>(), 1);
    assert_eq!(world.pool_size::<Velocity>(), 1);
    assert_eq!(world.pool_size::<Health>(), 1);
    assert_eq!(world.get::<Health>(keep), Some(&Health(5)));
}

#[test]
fn three_hundred_entities_alternating_signatures() {
    let mut world = common::world();

    let mut entities = Vec::new();
    for i in 0..300u32 {
        let e = world.create().unwrap();
        if i % 2 == 1 {
            world.add(e, Render(i)).unwrap();
            world.add(e, Size(i as f32)).unwrap();
        } else {
            world.add(e, Growth(0.5)).unwrap();
            world.add(e, Health(100)).unwrap();
        }
        entities.push(e);
    }
    let signatures: Vec<_> = entities.iter().map(|&e| world.signature(e).unwrap()).collect();

    for (i, &e) in entities.iter().enumerate() {
        if i % 2 == 0 {
            world.destroy(e).unwrap();
        }
    }

    for (i, &e) in entities.iter().enumerate() {
        if i % 2 == 0 {
            assert!(!world.exists(e));
        } else {
            assert!(world.exists(e));
            assert_eq!(world.signature(e), Some(signatures[i]));
            assert_eq!(world.get::<Render>(e), Some(&Render(i as u32)));
        }
    }
    assert_eq!(world.pool_size::<Render>(), 150);
    assert_eq!(world.pool_size::<Growth>(), 0);
    assert_eq!(world.live_count(), 150);
}

#[test]
fn clone_entity_copies_cloneable_components_only() {
    let mut world = common::world();
    let source = world.create().unwrap();
    world.add(source, Position { x: 3.0, y: 4.0 }).unwrap();
    world.add(source, Health(7)).unwrap();

    let clone = world.clone_entity(source).unwrap();

    assert_ne!(clone, source);
    assert_eq!(world.get::<Position>(clone), Some(&Position { x: 3.0, y: 4.0 }));
    assert!(!world.has::<Health>(clone));
    assert_eq!(world.get::<Health>(source), Some(&Health(7)));
    assert_eq!(world.pool_size::<Position>(), 2);
}

#[test]
fn registration_is_idempotent_and_respects_freeze() {
    struct Late;

    let mut world = common::world();
    let id = world.register::<Health>().unwrap();
    world.freeze_components();

    assert_eq!(world.register::<Health>().unwrap(), id);
    assert!(matches!(
        world.register::<Late>(),
        Err(ECSError::Registry(RegistryError::Frozen { .. }))
    ));

    // Unregistered types are reported, not panicked on.
    let e = world.create().unwrap();
    assert!(matches!(
        world.add(e, Late),
        Err(ECSError::Registry(RegistryError::NotRegistered { .. }))
    ));
    assert_eq!(world.pool_size::<Late>(), 0);
}
