//! Component lifecycle hooks.
//!
//! Each registered component type owns a [`ComponentHooks<T>`] with two
//! callback lists:
//!
//! - **on-add**: fired after a value is stored for an entity,
//! - **before-remove**: fired while the value is still present, right before it
//!   is removed (explicit remove, replacement, or entity destruction).
//!
//! Hooks receive the entity, the value, and a [`CommandBuffer`]. They never see
//! the world itself: any structural change they need is recorded and replayed
//! by the world once the triggering operation has finished, so a hook can never
//! re-enter storage mid-mutation.

use std::any::Any;

use crate::engine::commands::CommandBuffer;
use crate::engine::component::Component;
use crate::engine::entity::Entity;
use crate::engine::storage::{ComponentPool, ErasedPool};


/// Callback invoked with an entity and one of its component values.
pub type HookFn<T> = Box<dyn Fn(Entity, &T, &mut CommandBuffer) + Send + Sync>;

/// Hook lists of one component type.
pub struct ComponentHooks<T> {
    on_add: Vec<HookFn<T>>,
    before_remove: Vec<HookFn<T>>,
}

impl<T> Default for ComponentHooks<T> {
    fn default() -> Self {
        Self { on_add: Vec::new(), before_remove: Vec::new() }
    }
}

impl<T: Component> ComponentHooks<T> {
    /// Appends an on-add hook.
    pub fn push_on_add(&mut self, hook: HookFn<T>) { self.on_add.push(hook); }

    /// Appends a before-remove hook.
    pub fn push_before_remove(&mut self, hook: HookFn<T>) { self.before_remove.push(hook); }

    fn fire(hooks: &[HookFn<T>], pool: &dyn ErasedPool, entity: Entity, commands: &mut CommandBuffer) {
        if hooks.is_empty() {
            return;
        }
        let Some(pool) = pool.as_any().downcast_ref::<ComponentPool<T>>() else { return; };
        let Some(slot) = pool.slot_of(entity.id) else { return; };
        let value = &pool.components()[slot];
        for hook in hooks {
            hook(entity, value, commands);
        }
    }
}

/// Type-erased access to a [`ComponentHooks<T>`], driven by component id.
pub(crate) trait ErasedHooks: Send + Sync {
    /// Fires on-add hooks against the value currently stored for `entity`.
    fn fire_on_add(&self, pool: &dyn ErasedPool, entity: Entity, commands: &mut CommandBuffer);

    /// Fires before-remove hooks against the value currently stored for `entity`.
    fn fire_before_remove(&self, pool: &dyn ErasedPool, entity: Entity, commands: &mut CommandBuffer);

    /// Returns `true` if at least one on-add hook is installed.
    fn has_on_add(&self) -> bool;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedHooks for ComponentHooks<T> {
    fn fire_on_add(&self, pool: &dyn ErasedPool, entity: Entity, commands: &mut CommandBuffer) {
        Self::fire(&self.on_add, pool, entity, commands);
    }

    fn fire_before_remove(&self, pool: &dyn ErasedPool, entity: Entity, commands: &mut CommandBuffer) {
        Self::fire(&self.before_remove, pool, entity, commands);
    }

    fn has_on_add(&self) -> bool { !self.on_add.is_empty() }

    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}
