use ecs_runtime::{
    build_signature, ECSError, EntityQuery, GroupCache, RegistryError, ScratchArray, Signature,
};

mod common;
use common::{Growth, Health, Position, Render, Size, Velocity};


#[test]
fn check_applies_any_of_required_and_excluded() {
    let query = EntityQuery {
        required: build_signature(&[0]),
        excluded: build_signature(&[3]),
        any_of: vec![build_signature(&[1, 2])],
    };

    assert!(query.check(&build_signature(&[0, 1])));
    assert!(query.check(&build_signature(&[0, 2, 4])));
    assert!(!query.check(&build_signature(&[0])), "any-of group unmet");
    assert!(!query.check(&build_signature(&[1, 2])), "required bit missing");
    assert!(!query.check(&build_signature(&[0, 1, 3])), "excluded bit present");
    assert!(EntityQuery::all().check(&Signature::EMPTY));
}

#[test]
fn check_is_monotonic_except_for_excluded_components() {
    let queries = [
        EntityQuery::requiring(build_signature(&[0, 1])),
        EntityQuery { excluded: build_signature(&[2]), ..EntityQuery::requiring(build_signature(&[0])) },
        EntityQuery { any_of: vec![build_signature(&[1, 3])], ..EntityQuery::default() },
        EntityQuery {
            required: build_signature(&[3]),
            excluded: build_signature(&[0, 1]),
            any_of: vec![build_signature(&[2])],
        },
    ];

    for bits in 0u16..16 {
        let ids: Vec<u16> = (0..4).filter(|i| bits & (1 << i) != 0).collect();
        let before = build_signature(&ids);
        for added in 0..4u16 {
            let after = before.with(added);
            for query in &queries {
                if query.check(&before) && !query.check(&after) {
                    assert!(query.excluded.has(added), "{query:?} lost {before:?} after adding {added}");
                }
            }
        }
    }
}

#[test]
fn builder_resolves_types_through_registry() {
    struct Unregistered;

    let world = common::world();
    let query = world
        .query()
        .with::<Position>()
        .unwrap()
        .without::<Velocity>()
        .unwrap()
        .any_of::<(Render, Size)>()
        .unwrap()
        .build();

    let registry = world.registry();
    assert!(query.required.has(registry.id_of::<Position>().unwrap()));
    assert!(query.excluded.has(registry.id_of::<Velocity>().unwrap()));
    assert_eq!(query.any_of.len(), 1);
    assert_eq!(query.any_of[0].count(), 2);

    assert!(matches!(
        world.query().with::<Unregistered>().err(),
        Some(ECSError::Registry(RegistryError::NotRegistered { .. }))
    ));
}

#[test]
fn pack_signatures_are_stable() {
    let world = common::world();
    let registry = world.registry();
    let a = registry.signature_of::<(Growth, Health)>().unwrap();
    let b = registry.signature_of::<(Growth, Health)>().unwrap();
    let c = registry.signature_of::<(Health, Growth)>().unwrap();

    assert_eq!(a, b);
    assert_eq!(a, c);
    assert_eq!(a.count(), 2);
}

#[test]
fn groups_resolve_matching_partitions() {
    let mut world = common::world();
    for i in 0..30 {
        let e = world.create().unwrap();
        world.add(e, Position::default()).unwrap();
        if i % 3 == 0 {
            world.add(e, Velocity::default()).unwrap();
        }
        if i % 5 == 0 {
            world.add(e, Health(1)).unwrap();
        }
    }

    let moving = world.query().with_all::<(Position, Velocity)>().unwrap().build();
    let still = world.query().with::<Position>().unwrap().without::<Velocity>().unwrap().build();

    let mut cache = GroupCache::new();
    let moving_id = cache.register(&moving);
    let still_id = cache.register(&still);
    assert_eq!(cache.register(&moving), moving_id, "identical queries share a group");
    cache.refresh(world.partitions());

    let moving_group = cache.get(moving_id).unwrap();
    let still_group = cache.get(still_id).unwrap();
    assert_eq!(moving_group.total(), 10);
    assert_eq!(still_group.total(), 20);
    assert_eq!(moving_group.total(), world.matching(&moving).count());

    // Group rows are laid out back to back.
    let mut offset = 0;
    for slice in moving_group.slices() {
        assert_eq!(slice.offset, offset);
        assert!(slice.len > 0);
        offset += slice.len;
    }

    // Emptied partitions drop out on the next refresh.
    let holders: Vec<_> = world.matching(&moving).collect();
    for e in holders {
        world.remove::<Velocity>(e).unwrap();
    }
    cache.refresh(world.partitions());
    assert_eq!(cache.get(moving_id).unwrap().total(), 0);
    assert!(cache.get(moving_id).unwrap().slices().is_empty());
    assert_eq!(cache.get(still_id).unwrap().total(), 30);
}

#[test]
fn scratch_array_double_buffers_and_shrinks() {
    let mut scratch: ScratchArray<u32> = ScratchArray::default();

    scratch.prepare(100, 0.25);
    assert_eq!(scratch.current().len(), 100);
    assert!(scratch.previous().is_empty());

    scratch.prepare(10, 0.25);
    assert_eq!(scratch.current().len(), 10);
    assert_eq!(scratch.previous().len(), 100);

    // The large buffer comes back with only 10% utilization.
    scratch.prepare(10, 0.25);
    assert_eq!(scratch.current().len(), 10);
    assert!(scratch.capacity() < 100);
}
