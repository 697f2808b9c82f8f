use std::collections::HashSet;

use ecs_runtime::{ComponentPool, ECSError};

mod common;
use common::{Health, Position};


fn filled_pool(count: u32) -> ComponentPool<u32> {
    let mut pool = ComponentPool::new(0, 64, 4);
    for id in 0..count {
        assert_eq!(pool.insert(id, id * 10).unwrap(), None);
    }
    pool
}

#[test]
fn swap_remove_keeps_moved_value_reachable() {
    let mut pool = filled_pool(5);

    // Removing slot 1 moves the last value (owner 4) into it.
    assert_eq!(pool.remove(1).unwrap(), 10);
    assert_eq!(pool.slot_of(4), Some(1));
    assert_eq!(pool.get(4), Some(&40));
    assert_eq!(pool.get(1), None);
    assert_eq!(pool.len(), 4);
    assert!(pool.is_consistent());

    // Removing the last slot moves nothing.
    assert_eq!(pool.remove(3).unwrap(), 30);
    assert_eq!(pool.get(4), Some(&40));
    assert!(pool.is_consistent());
}

#[test]
fn owners_track_components() {
    let mut pool = filled_pool(4);
    pool.remove(0).unwrap();

    for (owner, value) in pool.iter() {
        assert_eq!(*value, owner * 10);
    }
    let owners: HashSet<u32> = pool.owners().iter().copied().collect();
    assert_eq!(owners, HashSet::from([1, 2, 3]));
}

#[test]
fn removing_absent_value_fails() {
    let mut pool = filled_pool(2);
    assert!(matches!(pool.remove(7), Err(ECSError::MissingComponent { entity: 7, .. })));
    assert_eq!(pool.len(), 2);
}

#[test]
fn insert_beyond_entity_limit_fails() {
    let mut pool = filled_pool(2);
    assert!(matches!(
        pool.insert(64, 640),
        Err(ECSError::EntityOutOfRange { entity: 64, limit: 64 })
    ));
    assert!(matches!(pool.insert(1_000, 0), Err(ECSError::EntityOutOfRange { .. })));
    assert_eq!(pool.len(), 2);
    assert!(pool.is_consistent());

    // The last valid id is still accepted.
    assert_eq!(pool.insert(63, 630).unwrap(), None);
    assert_eq!(pool.get(63), Some(&630));
}

#[test]
fn insert_on_owner_replaces_in_place() {
    let mut pool = filled_pool(3);
    assert_eq!(pool.insert(1, 99).unwrap(), Some(10));
    assert_eq!(pool.len(), 3);
    assert_eq!(pool.get(1), Some(&99));
    assert_eq!(pool.slot_of(1), Some(1));
}

#[test]
fn pool_grows_geometrically() {
    let mut pool: ComponentPool<u64> = ComponentPool::new(0, 1024, 2);
    let mut capacities = Vec::new();
    for id in 0..600u32 {
        pool.insert(id, id as u64).unwrap();
        capacities.push(pool.capacity());
    }
    assert!(pool.capacity() >= 600);
    assert!(pool.is_consistent());

    // Never more than one reallocation per doubling.
    capacities.dedup();
    assert!(capacities.len() <= 11, "capacities: {capacities:?}");
    for (id, value) in pool.iter() {
        assert_eq!(id as u64, *value);
    }
}

#[test]
fn restore_rebuilds_sparse_index() {
    let mut pool = filled_pool(3);
    pool.restore(vec![9, 2], vec![900, 200]);

    assert_eq!(pool.len(), 2);
    assert_eq!(pool.get(9), Some(&900));
    assert_eq!(pool.get(2), Some(&200));
    assert!(!pool.contains(0));
    assert!(!pool.contains(1));
    assert!(pool.is_consistent());
}

#[test]
fn pool_size_matches_live_holders_under_interleaving() {
    let mut world = common::world();
    let entities: Vec<_> = (0..64).map(|_| world.create().unwrap()).collect();
    let mut holders = HashSet::new();

    // Small LCG so the sequence is reproducible.
    let mut state: u32 = 0x2545_f491;
    for _ in 0..2000 {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let e = entities[(state >> 16) as usize % entities.len()];
        if (state >> 8) & 1 == 0 {
            world.add(e, Health(state as i32)).unwrap();
            holders.insert(e);
        } else if world.remove::<Health>(e).is_ok() {
            assert!(holders.remove(&e));
        } else {
            assert!(!holders.contains(&e));
        }
        assert_eq!(world.pool_size::<Health>(), holders.len());
    }

    let pool = world.pool::<Health>().unwrap();
    assert!(pool.is_consistent());
    assert_eq!(world.pool_size::<Position>(), 0);
}
