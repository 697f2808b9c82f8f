//! The world: entity table, component pools and structural mutation.
//!
//! [`EntityManager`] exclusively owns every piece of runtime state:
//!
//! * the [`ComponentRegistry`] mapping Rust types to component ids,
//! * the [`EntityTable`] (ids, versions, signatures),
//! * one [`ComponentPool<T>`] per registered type, behind [`ErasedPool`],
//! * the exact-signature [`Partitions`] consumed by group resolution,
//! * per-type lifecycle hooks.
//!
//! ## Failure model
//!
//! Operations on a dead or stale handle log an error and return `Err`/`None`.
//! Nothing here panics on bad input; one dangling handle replayed from a
//! command buffer costs a log line, not the session.
//!
//! ## Hooks and deferred events
//!
//! `before_remove` hooks fire immediately, while the value is still stored.
//! `on_add` hooks and every command a hook records are queued and settled when
//! the outermost mutation (or [`EntityManager::deferred_events`] scope)
//! finishes. Settling repeats until no hook produces further work.
//!
//! ## Parallel access
//!
//! The scheduler borrows pools and partitions through
//! [`EntityManager::dispatch_parts`] for the duration of one stage. Structural
//! changes cannot happen during that borrow; jobs record them into command
//! buffers which are applied through [`EntityManager::apply_commands`].

use std::sync::Arc;

use log::{debug, error, trace, warn};
use rayon::prelude::*;

use crate::engine::commands::{Command, CommandBuffer, EntityTarget};
use crate::engine::component::{Component, ComponentRegistry};
use crate::engine::config::EcsConfig;
use crate::engine::entity::{Entity, EntityTable};
use crate::engine::error::{ECSError, ECSResult, RegistryError};
use crate::engine::hooks::{ComponentHooks, ErasedHooks};
use crate::engine::partition::Partitions;
use crate::engine::query::{EntityQuery, QueryBuilder};
use crate::engine::snapshot::PoolSnapshot;
use crate::engine::spatial::{BucketRef, SpatialIndex};
use crate::engine::storage::{ComponentPool, ErasedPool};
use crate::engine::types::{ComponentID, EntityCount, Signature};


/// Upper bound on hook settle rounds before the remaining work is dropped.
const SETTLE_ROUNDS: usize = 1024;

/// Outcome of replaying a command buffer.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Commands applied successfully.
    pub applied: usize,
    /// Commands logged and skipped.
    pub failed: usize,
    /// Entities created by `CreateEntity` commands, in submission order.
    pub created: Vec<Entity>,
}

/// Owner of all entities, components and their storage.
pub struct EntityManager {
    config: EcsConfig,
    registry: ComponentRegistry,
    entities: EntityTable,
    pools: Vec<Box<dyn ErasedPool>>,
    hooks: Vec<Box<dyn ErasedHooks>>,
    partitions: Partitions,
    event_depth: u32,
    pending_on_add: Vec<(ComponentID, Entity)>,
    hook_commands: CommandBuffer,
}

impl EntityManager {
    /// Creates an empty world sized by `config`.
    pub fn new(config: EcsConfig) -> ECSResult<Self> {
        config.validate()?;
        let max = config.max_entities;
        debug!("world created: {} entity ids", max);
        Ok(Self {
            registry: ComponentRegistry::new(),
            entities: EntityTable::new(max),
            pools: Vec::new(),
            hooks: Vec::new(),
            partitions: Partitions::new(max),
            event_depth: 0,
            pending_on_add: Vec::new(),
            hook_commands: CommandBuffer::new(),
            config,
        })
    }

    /// Configuration the world was built with.
    pub fn config(&self) -> &EcsConfig { &self.config }

    /// Component registry of this world.
    pub fn registry(&self) -> &ComponentRegistry { &self.registry }

    /// Registers component type `T` and allocates its pool.
    ///
    /// Idempotent: registering `T` again returns the same id.
    pub fn register<T: Component>(&mut self) -> ECSResult<ComponentID> {
        let (id, fresh) = self.registry.register::<T>(false).inspect_err(|e| error!("{e}"))?;
        if fresh {
            self.install(ComponentPool::<T>::new(id, self.config.max_entities, self.config.initial_pool_capacity));
        }
        Ok(id)
    }

    /// Registers `T` and allows [`clone_entity`](Self::clone_entity) to copy it.
    pub fn register_cloneable<T: Component + Clone>(&mut self) -> ECSResult<ComponentID> {
        let (id, fresh) = self.registry.register::<T>(true).inspect_err(|e| error!("{e}"))?;
        if fresh {
            let pool = ComponentPool::<T>::new(id, self.config.max_entities, self.config.initial_pool_capacity)
                .with_cloner(<T as Clone>::clone);
            self.install(pool);
        } else if self.registry.description(id).is_some_and(|desc| !desc.cloneable) {
            warn!("{} already registered as non-cloneable", std::any::type_name::<T>());
        }
        Ok(id)
    }

    fn install<T: Component>(&mut self, pool: ComponentPool<T>) {
        debug_assert_eq!(pool.component_id() as usize, self.pools.len());
        debug!("registered component {} as {}", std::any::type_name::<T>(), pool.component_id());
        self.pools.push(Box::new(pool));
        self.hooks.push(Box::new(ComponentHooks::<T>::default()));
    }

    /// Forbids further component registration.
    pub fn freeze_components(&mut self) { self.registry.freeze(); }

    fn id_of<T: Component>(&self) -> ECSResult<ComponentID> {
        self.registry.id_of::<T>().inspect_err(|e| error!("{e}"))
    }

    fn typed_pool<T: Component>(&self, id: ComponentID) -> Option<&ComponentPool<T>> {
        self.pools.get(id as usize)?.as_any().downcast_ref::<ComponentPool<T>>()
    }

    fn typed_pool_mut<T: Component>(&mut self, id: ComponentID) -> ECSResult<&mut ComponentPool<T>> {
        let pool = self
            .pools
            .get_mut(id as usize)
            .ok_or(ECSError::Registry(RegistryError::InvalidComponentId(id)))?;
        let actual = pool.element_type();
        pool.as_any_mut()
            .downcast_mut::<ComponentPool<T>>()
            .ok_or(ECSError::TypeMismatch { expected: std::any::TypeId::of::<T>(), actual })
    }

    /// Pool of `T`, if registered.
    pub fn pool<T: Component>(&self) -> Option<&ComponentPool<T>> {
        self.typed_pool::<T>(self.registry.id_of::<T>().ok()?)
    }

    /// Number of entities currently holding `T`.
    pub fn pool_size<T: Component>(&self) -> usize {
        self.pool::<T>().map_or(0, ComponentPool::len)
    }

    // ----------------------------------------------------------------------
    // Entities
    // ----------------------------------------------------------------------

    /// Number of live entities.
    pub fn live_count(&self) -> EntityCount { self.entities.live_count() }

    /// Maximum number of simultaneously live entities.
    pub fn capacity(&self) -> EntityCount { self.entities.capacity() }

    /// Dense slice of live handles.
    pub fn live_entities(&self) -> &[Entity] { self.entities.live() }

    /// Returns `true` if `entity` is live and not stale.
    pub fn exists(&self, entity: Entity) -> bool { self.entities.exists(entity) }

    /// Current signature of a live entity.
    pub fn signature(&self, entity: Entity) -> Option<Signature> { self.entities.signature(entity) }

    fn checked(&self, entity: Entity) -> ECSResult<()> {
        self.entities.check(entity).map_err(|e| {
            error!("{e}");
            e.into()
        })
    }

    /// Creates an entity with no components.
    ///
    /// Fails with a logged [`CapacityError`](crate::engine::error::CapacityError)
    /// once the table is full.
    pub fn create(&mut self) -> ECSResult<Entity> {
        let entity = self.entities.create()?;
        self.partitions.insert(entity, Signature::EMPTY);
        trace!("created entity {entity}");
        Ok(entity)
    }

    /// Destroys `entity` and every component it owns.
    ///
    /// `before_remove` hooks of each owned component fire first. The id is
    /// recycled with an incremented version.
    pub fn destroy(&mut self, entity: Entity) -> ECSResult<()> {
        self.checked(entity)?;
        let signature = self.entities.signature(entity).unwrap_or_default();

        for id in signature.iterate_over_components() {
            let (pool, hooks) = (&mut self.pools[id as usize], &self.hooks[id as usize]);
            hooks.fire_before_remove(&**pool, entity, &mut self.hook_commands);
            if let Err(e) = pool.remove_dyn(entity.id) {
                error!("destroying {entity}: {e}");
            }
        }
        self.partitions.remove(entity.id);
        self.entities.destroy(entity)?;
        trace!("destroyed entity {entity}");

        self.settle();
        Ok(())
    }

    // ----------------------------------------------------------------------
    // Components
    // ----------------------------------------------------------------------

    /// Returns `true` if `entity` is live and holds `T`.
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        match (self.registry.id_of::<T>(), self.entities.signature(entity)) {
            (Ok(id), Some(signature)) => signature.has(id),
            _ => false,
        }
    }

    /// Stores `value` on `entity`.
    ///
    /// An existing `T` is replaced: its `before_remove` hooks fire, then the new
    /// value's `on_add` hooks.
    pub fn add<T: Component>(&mut self, entity: Entity, value: T) -> ECSResult<()> {
        self.checked(entity)?;
        let id = self.id_of::<T>()?;
        self.attach(entity, id, |pool| {
            let actual = pool.element_type();
            let pool = pool.as_any_mut().downcast_mut::<ComponentPool<T>>().ok_or(
                ECSError::TypeMismatch { expected: std::any::TypeId::of::<T>(), actual },
            )?;
            pool.insert(entity.id, value).map(|_| ())
        })
    }

    /// Shared core of typed and replayed component insertion.
    fn attach(
        &mut self,
        entity: Entity,
        id: ComponentID,
        insert: impl FnOnce(&mut dyn ErasedPool) -> ECSResult<()>,
    ) -> ECSResult<()> {
        let Some(pool) = self.pools.get_mut(id as usize) else {
            return Err(RegistryError::InvalidComponentId(id).into());
        };
        let replacing = pool.contains(entity.id);
        if replacing {
            self.hooks[id as usize].fire_before_remove(&**pool, entity, &mut self.hook_commands);
        }
        insert(&mut **pool).inspect_err(|e| error!("adding component {id} to {entity}: {e}"))?;

        if !replacing {
            let signature = self.entities.signature_mut(entity.id);
            signature.set(id);
            let signature = *signature;
            self.partitions.relocate(entity, signature);
        }
        if self.hooks[id as usize].has_on_add() {
            self.pending_on_add.push((id, entity));
        }
        self.settle();
        Ok(())
    }

    /// Replaces the `T` held by `entity` and returns the previous value.
    ///
    /// Fails if `entity` does not hold `T`. Spatially tracked positions move
    /// between buckets through the hooks fired here.
    pub fn replace<T: Component>(&mut self, entity: Entity, value: T) -> ECSResult<T> {
        self.checked(entity)?;
        let id = self.id_of::<T>()?;
        let pool = self.typed_pool_mut::<T>(id)?;
        if !pool.contains(entity.id) {
            warn!("entity {entity} has no {} to replace", std::any::type_name::<T>());
            return Err(ECSError::MissingComponent { entity: entity.id, component_id: id });
        }

        let (pool, hooks) = (&self.pools[id as usize], &self.hooks[id as usize]);
        hooks.fire_before_remove(&**pool, entity, &mut self.hook_commands);
        let old = self
            .typed_pool_mut::<T>(id)?
            .insert(entity.id, value)?
            .ok_or(ECSError::MissingComponent { entity: entity.id, component_id: id })?;

        if self.hooks[id as usize].has_on_add() {
            self.pending_on_add.push((id, entity));
        }
        self.settle();
        Ok(old)
    }

    /// Shared reference to the `T` held by `entity`.
    ///
    /// Logs and returns `None` for dead handles and missing components.
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.checked(entity).ok()?;
        let id = self.id_of::<T>().ok()?;
        self.typed_pool::<T>(id)?.get(entity.id)
    }

    /// Mutable variant of [`get`](Self::get). Does not change the signature.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.checked(entity).ok()?;
        let id = self.id_of::<T>().ok()?;
        self.typed_pool_mut::<T>(id).ok()?.get_mut(entity.id)
    }

    /// Removes and returns the `T` held by `entity`.
    pub fn remove<T: Component>(&mut self, entity: Entity) -> ECSResult<T> {
        self.checked(entity)?;
        let id = self.id_of::<T>()?;
        if !self.typed_pool_mut::<T>(id)?.contains(entity.id) {
            warn!("entity {entity} has no {} to remove", std::any::type_name::<T>());
            return Err(ECSError::MissingComponent { entity: entity.id, component_id: id });
        }

        let (pool, hooks) = (&self.pools[id as usize], &self.hooks[id as usize]);
        hooks.fire_before_remove(&**pool, entity, &mut self.hook_commands);
        let value = self.typed_pool_mut::<T>(id)?.remove(entity.id)?;
        self.unset(entity, id);
        self.settle();
        Ok(value)
    }

    /// Untyped removal used by command replay.
    fn detach(&mut self, entity: Entity, id: ComponentID) -> ECSResult<()> {
        self.checked(entity)?;
        let Some(pool) = self.pools.get_mut(id as usize) else {
            return Err(RegistryError::InvalidComponentId(id).into());
        };
        if !pool.contains(entity.id) {
            warn!("entity {entity} has no {} to remove", pool.element_type_name());
            return Err(ECSError::MissingComponent { entity: entity.id, component_id: id });
        }
        self.hooks[id as usize].fire_before_remove(&**pool, entity, &mut self.hook_commands);
        pool.remove_dyn(entity.id)?;
        self.unset(entity, id);
        self.settle();
        Ok(())
    }

    fn unset(&mut self, entity: Entity, id: ComponentID) {
        let signature = self.entities.signature_mut(entity.id);
        signature.clear(id);
        let signature = *signature;
        self.partitions.relocate(entity, signature);
    }

    // ----------------------------------------------------------------------
    // Hooks
    // ----------------------------------------------------------------------

    fn hooks_of<T: Component>(&mut self) -> ECSResult<&mut ComponentHooks<T>> {
        let id = self.id_of::<T>()?;
        self.hooks
            .get_mut(id as usize)
            .and_then(|hooks| hooks.as_any_mut().downcast_mut::<ComponentHooks<T>>())
            .ok_or(ECSError::Registry(RegistryError::InvalidComponentId(id)))
    }

    /// Installs a hook fired after a `T` is stored on an entity.
    pub fn on_add<T, F>(&mut self, hook: F) -> ECSResult<()>
    where
        T: Component,
        F: Fn(Entity, &T, &mut CommandBuffer) + Send + Sync + 'static,
    {
        self.hooks_of::<T>()?.push_on_add(Box::new(hook));
        Ok(())
    }

    /// Installs a hook fired right before a `T` leaves an entity.
    pub fn before_remove<T, F>(&mut self, hook: F) -> ECSResult<()>
    where
        T: Component,
        F: Fn(Entity, &T, &mut CommandBuffer) + Send + Sync + 'static,
    {
        self.hooks_of::<T>()?.push_before_remove(Box::new(hook));
        Ok(())
    }

    /// Runs `f` with on-add hooks and hook commands held back until the
    /// outermost scope closes.
    pub fn deferred_events<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.event_depth += 1;
        let result = f(self);
        self.event_depth -= 1;
        self.settle();
        result
    }

    /// Fires queued on-add hooks and replays hook commands until quiescent.
    fn settle(&mut self) {
        if self.event_depth > 0 {
            return;
        }
        self.event_depth += 1;
        for _ in 0..SETTLE_ROUNDS {
            for (id, entity) in std::mem::take(&mut self.pending_on_add) {
                if !self.entities.exists(entity) {
                    continue;
                }
                let (pool, hooks) = (&self.pools[id as usize], &self.hooks[id as usize]);
                hooks.fire_on_add(&**pool, entity, &mut self.hook_commands);
            }
            if self.hook_commands.is_empty() {
                break;
            }
            let commands = std::mem::take(&mut self.hook_commands);
            self.replay(commands);
        }
        if !self.pending_on_add.is_empty() || !self.hook_commands.is_empty() {
            error!("hooks still producing work after {SETTLE_ROUNDS} rounds; dropped");
            self.pending_on_add.clear();
            self.hook_commands = CommandBuffer::new();
        }
        self.event_depth -= 1;
    }

    // ----------------------------------------------------------------------
    // Commands
    // ----------------------------------------------------------------------

    /// Replays `buffer` in submission order.
    ///
    /// Failing commands (dead targets, unregistered types, capacity) are
    /// logged and skipped; the rest still apply.
    pub fn apply_commands(&mut self, buffer: CommandBuffer) -> ReplayReport {
        self.event_depth += 1;
        let report = self.replay(buffer);
        self.event_depth -= 1;
        self.settle();
        trace!("replayed {} commands, {} skipped", report.applied, report.failed);
        report
    }

    fn replay(&mut self, buffer: CommandBuffer) -> ReplayReport {
        let (commands, pending) = buffer.into_parts();
        let mut resolved: Vec<Option<Entity>> = vec![None; pending as usize];
        let mut report = ReplayReport::default();

        let resolve = |resolved: &[Option<Entity>], target: EntityTarget| -> ECSResult<Entity> {
            match target {
                EntityTarget::Live(entity) => Ok(entity),
                EntityTarget::Pending(p) => resolved
                    .get(p.index() as usize)
                    .copied()
                    .flatten()
                    .ok_or(ECSError::UnresolvedPending(p.index())),
            }
        };

        for command in commands {
            let outcome = match command {
                Command::CreateEntity { pending } => self.create().map(|entity| {
                    if let Some(slot) = resolved.get_mut(pending.index() as usize) {
                        *slot = Some(entity);
                    }
                    report.created.push(entity);
                }),
                Command::AddComponent { target, component, value } => {
                    resolve(&resolved, target).and_then(|entity| {
                        self.checked(entity)?;
                        let id = self
                            .registry
                            .component_id_of_type_id(component.type_id)
                            .ok_or(RegistryError::NotRegistered { name: component.name })?;
                        self.attach(entity, id, |pool| pool.insert_dyn(entity.id, value).map(|_| ()))
                    })
                }
                Command::RemoveComponent { target, component } => {
                    resolve(&resolved, target).and_then(|entity| {
                        let id = self
                            .registry
                            .component_id_of_type_id(component.type_id)
                            .ok_or(RegistryError::NotRegistered { name: component.name })?;
                        self.detach(entity, id)
                    })
                }
                Command::DestroyEntity { target } => {
                    resolve(&resolved, target).and_then(|entity| self.destroy(entity))
                }
            };

            match outcome {
                Ok(()) => report.applied += 1,
                Err(e) => {
                    warn!("command skipped: {e}");
                    report.failed += 1;
                }
            }
        }
        report
    }

    // ----------------------------------------------------------------------
    // Cloning
    // ----------------------------------------------------------------------

    /// Creates a new entity carrying clones of every cloneable component of
    /// `source`. Non-cloneable components are skipped.
    ///
    /// Runs inside a deferred-events scope: on-add hooks see the complete
    /// clone. If copying any component fails, the partial clone is discarded
    /// and the error returned.
    pub fn clone_entity(&mut self, source: Entity) -> ECSResult<Entity> {
        self.checked(source)?;
        let signature = self.entities.signature(source).unwrap_or_default();

        self.deferred_events(|world| {
            let clone = world.create()?;
            let mut cloned = Signature::EMPTY;
            let mut failure = None;
            for id in signature.iterate_over_components() {
                let pool = &mut world.pools[id as usize];
                match pool.clone_between(source.id, clone.id) {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!("clone of {source}: {} is not cloneable; skipped", pool.element_type_name());
                        continue;
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
                cloned.set(id);
                if world.hooks[id as usize].has_on_add() {
                    world.pending_on_add.push((id, clone));
                }
            }
            if let Some(e) = failure {
                // The clone was never observable: no hooks fire on teardown.
                error!("clone of {source} failed: {e}; discarding {clone}");
                for id in cloned.iterate_over_components() {
                    world.pools[id as usize].remove_dyn(clone.id)?;
                }
                world.pending_on_add.retain(|&(_, owner)| owner != clone);
                world.partitions.remove(clone.id);
                world.entities.destroy(clone)?;
                return Err(e);
            }
            *world.entities.signature_mut(clone.id) = cloned;
            world.partitions.relocate(clone, cloned);
            Ok(clone)
        })
    }

    // ----------------------------------------------------------------------
    // Iteration
    // ----------------------------------------------------------------------

    /// Starts building a query against this world's registry.
    pub fn query(&self) -> QueryBuilder<'_> { QueryBuilder::new(&self.registry) }

    /// Live entities whose signature passes `query`.
    pub fn matching<'a>(&'a self, query: &'a EntityQuery) -> impl Iterator<Item = Entity> + 'a {
        self.partitions
            .iter()
            .filter(move |partition| query.check(partition.signature()))
            .flat_map(|partition| partition.entities().iter().copied())
    }

    /// Calls `f` for every entity passing `query` that holds `T`.
    pub fn for_each<T, F>(&self, query: &EntityQuery, mut f: F)
    where
        T: Component,
        F: FnMut(Entity, &T),
    {
        let Some(pool) = self.id_of::<T>().ok().and_then(|id| self.typed_pool::<T>(id)) else {
            return;
        };
        for entity in self.matching(query) {
            if let Some(slot) = pool.slot_of(entity.id) {
                f(entity, &pool.components()[slot]);
            }
        }
    }

    /// Calls `f` for every entity passing `query` that holds both `A` and `B`.
    pub fn for_each2<A, B, F>(&self, query: &EntityQuery, mut f: F)
    where
        A: Component,
        B: Component,
        F: FnMut(Entity, &A, &B),
    {
        let pools = self
            .id_of::<A>()
            .ok()
            .and_then(|id| self.typed_pool::<A>(id))
            .zip(self.id_of::<B>().ok().and_then(|id| self.typed_pool::<B>(id)));
        let Some((a, b)) = pools else { return; };

        for entity in self.matching(query) {
            if let (Some(sa), Some(sb)) = (a.slot_of(entity.id), b.slot_of(entity.id)) {
                f(entity, &a.components()[sa], &b.components()[sb]);
            }
        }
    }

    /// Mutable iteration over the `T` of every entity passing `query`.
    pub fn for_each_mut<T, F>(&mut self, query: &EntityQuery, mut f: F)
    where
        T: Component,
        F: FnMut(Entity, &mut T),
    {
        let Ok(id) = self.id_of::<T>() else { return; };
        let Some(pool) = self
            .pools
            .get_mut(id as usize)
            .and_then(|pool| pool.as_any_mut().downcast_mut::<ComponentPool<T>>())
        else {
            return;
        };
        for partition in self.partitions.iter().filter(|p| query.check(p.signature())) {
            for &entity in partition.entities() {
                if !pool.contains(entity.id) {
                    continue;
                }
                if let Some(value) = pool.get_mut(entity.id) {
                    f(entity, value);
                }
            }
        }
    }

    /// Parallel read-only iteration over the `T` of every entity passing
    /// `query`. Runs on the global rayon pool.
    pub fn par_for_each<T, F>(&self, query: &EntityQuery, f: F)
    where
        T: Component,
        F: Fn(Entity, &T) + Send + Sync,
    {
        let Some(pool) = self.id_of::<T>().ok().and_then(|id| self.typed_pool::<T>(id)) else {
            return;
        };
        let slices: Vec<&[Entity]> = self
            .partitions
            .iter()
            .filter(|p| !p.is_empty() && query.check(p.signature()))
            .map(|p| p.entities())
            .collect();

        slices.par_iter().for_each(|entities| {
            entities.par_iter().for_each(|entity| {
                if let Some(slot) = pool.slot_of(entity.id) {
                    f(*entity, &pool.components()[slot]);
                }
            });
        });
    }

    // ----------------------------------------------------------------------
    // Collaborators
    // ----------------------------------------------------------------------

    /// Keeps `index` buckets in sync with the lifecycle of position type `P`.
    pub fn track_spatial<P, I>(&mut self, index: Arc<I>) -> ECSResult<()>
    where
        P: Component,
        I: SpatialIndex<P>,
    {
        let on_add = Arc::clone(&index);
        self.on_add::<P, _>(move |entity, position, _| {
            if let Some(bucket) = on_add.lookup(position) {
                bucket.add_entity(entity);
            }
        })?;
        self.before_remove::<P, _>(move |entity, position, _| {
            if let Some(bucket) = index.lookup(position) {
                bucket.remove_entity(entity);
            }
        })
    }

    /// Exports the pool of `T` as flat owner and value arrays.
    pub fn snapshot_pool<T: Component + Clone>(&self) -> ECSResult<PoolSnapshot<T>> {
        let id = self.id_of::<T>()?;
        let pool = self
            .typed_pool::<T>(id)
            .ok_or(ECSError::Registry(RegistryError::InvalidComponentId(id)))?;
        Ok(PoolSnapshot {
            owners: pool.owners().to_vec(),
            components: pool.components().to_vec(),
        })
    }

    /// Replaces the content of the `T` pool with `snapshot`.
    ///
    /// Every owner must be a live entity. Signatures and partitions follow the
    /// new ownership; before-remove hooks fire for the replaced values and
    /// on-add hooks for the restored ones.
    pub fn restore_pool<T: Component>(&mut self, snapshot: PoolSnapshot<T>) -> ECSResult<()> {
        snapshot.validate().inspect_err(|e| error!("{e}"))?;
        let id = self.id_of::<T>()?;

        let mut owners = Vec::with_capacity(snapshot.owners.len());
        for &owner in &snapshot.owners {
            match self.entities.by_id(owner) {
                Some(entity) => owners.push(entity),
                None => {
                    let e = ECSError::Snapshot(format!("owner {owner} is not a live entity"));
                    error!("{e}");
                    return Err(e);
                }
            }
        }

        self.deferred_events(|world| {
            let previous: Vec<Entity> = world.pools[id as usize]
                .owner_ids()
                .iter()
                .filter_map(|&owner| world.entities.by_id(owner))
                .collect();
            for &entity in &previous {
                let (pool, hooks) = (&world.pools[id as usize], &world.hooks[id as usize]);
                hooks.fire_before_remove(&**pool, entity, &mut world.hook_commands);
            }

            world.typed_pool_mut::<T>(id)?.restore(snapshot.owners, snapshot.components);

            for entity in previous {
                world.unset(entity, id);
            }
            let notify = world.hooks[id as usize].has_on_add();
            for entity in owners {
                let signature = world.entities.signature_mut(entity.id);
                signature.set(id);
                let signature = *signature;
                world.partitions.relocate(entity, signature);
                if notify {
                    world.pending_on_add.push((id, entity));
                }
            }
            debug!("restored pool {} with {} values", std::any::type_name::<T>(), world.pools[id as usize].len());
            Ok(())
        })
    }

    // ----------------------------------------------------------------------
    // Scheduler access
    // ----------------------------------------------------------------------

    /// Exact-signature partitions of the live entities.
    pub fn partitions(&self) -> &Partitions { &self.partitions }

    /// Disjoint borrows of the partitions and the pools for stage dispatch.
    pub(crate) fn dispatch_parts(&mut self) -> (&Partitions, &mut [Box<dyn ErasedPool>]) {
        (&self.partitions, &mut self.pools)
    }
}

impl std::fmt::Debug for EntityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityManager")
            .field("live", &self.entities.live_count())
            .field("components", &self.registry.len())
            .field("partitions", &self.partitions.len())
            .finish_non_exhaustive()
    }
}
