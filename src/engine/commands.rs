//! # Commands
//!
//! Deferred structural mutations.
//!
//! Rather than mutating storage directly while jobs run in parallel, jobs and
//! hooks record [`Command`] values into a [`CommandBuffer`]. Buffers are owned by
//! a single thread while they are being written, merged after the parallel
//! phase, and replayed by one interpreter
//! ([`EntityManager::apply_commands`]) on a single thread.
//!
//! ## Design
//! - Commands are plain data describing *what* should change. Component payloads
//!   are boxed values tagged with their `TypeId`; nothing captures pointers into
//!   pools that may have been resized by the time the command runs.
//! - Entities created inside a buffer are addressed through [`PendingEntity`]
//!   placeholders until replay assigns them real handles.
//! - Merging buffers rebases placeholders so they stay unique.
//!
//! ## Invariants
//! - Commands are applied in the order they were recorded.
//! - A command whose target is dead at replay time is logged and skipped.
//!
//! [`EntityManager::apply_commands`]: crate::engine::manager::EntityManager::apply_commands

use std::any::{Any, TypeId, type_name};

use crate::engine::component::Component;
use crate::engine::entity::Entity;


/// Placeholder for an entity created by a buffered `CreateEntity` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PendingEntity(pub(crate) u32);

impl PendingEntity {
    /// Index of the placeholder within its buffer.
    #[inline]
    pub fn index(self) -> u32 { self.0 }
}

/// Target of a buffered component command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityTarget {
    /// An entity that was live when the command was recorded.
    Live(Entity),
    /// An entity created earlier in the same buffer.
    Pending(PendingEntity),
}

impl From<Entity> for EntityTarget {
    fn from(entity: Entity) -> Self { EntityTarget::Live(entity) }
}

impl From<PendingEntity> for EntityTarget {
    fn from(pending: PendingEntity) -> Self { EntityTarget::Pending(pending) }
}

/// Identifies a component type without a registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ComponentKey {
    /// Runtime type of the component.
    pub type_id: TypeId,
    /// Type name, for diagnostics.
    pub name: &'static str,
}

impl ComponentKey {
    /// Key of component type `T`.
    #[inline]
    pub fn of<T: 'static>() -> Self {
        Self { type_id: TypeId::of::<T>(), name: type_name::<T>() }
    }
}

/// A deferred structural mutation.
pub enum Command {
    /// Creates a new, component-less entity bound to `pending`.
    CreateEntity {
        /// Placeholder resolved when the command is replayed.
        pending: PendingEntity,
    },

    /// Adds (or replaces) a component on an entity.
    AddComponent {
        /// Entity receiving the component.
        target: EntityTarget,
        /// Component type of `value`.
        component: ComponentKey,
        /// Component value; its dynamic type is `component.type_id`.
        value: Box<dyn Any + Send>,
    },

    /// Removes a component from an entity.
    RemoveComponent {
        /// Entity losing the component.
        target: EntityTarget,
        /// Component type to remove.
        component: ComponentKey,
    },

    /// Destroys an entity and every component it owns.
    DestroyEntity {
        /// Entity to destroy.
        target: EntityTarget,
    },
}

impl Command {
    fn rebase(&mut self, offset: u32) {
        fn shift(target: &mut EntityTarget, offset: u32) {
            if let EntityTarget::Pending(pending) = target {
                pending.0 += offset;
            }
        }
        match self {
            Command::CreateEntity { pending } => pending.0 += offset,
            Command::AddComponent { target, .. }
            | Command::RemoveComponent { target, .. }
            | Command::DestroyEntity { target } => shift(target, offset),
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::CreateEntity { pending } => write!(f, "CreateEntity({pending:?})"),
            Command::AddComponent { target, component, .. } => {
                write!(f, "AddComponent({target:?}, {})", component.name)
            }
            Command::RemoveComponent { target, component } => {
                write!(f, "RemoveComponent({target:?}, {})", component.name)
            }
            Command::DestroyEntity { target } => write!(f, "DestroyEntity({target:?})"),
        }
    }
}

/// Append-only log of deferred structural mutations.
#[derive(Default, Debug)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    pending: u32,
}

impl CommandBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self { Self::default() }

    /// Records the creation of a new entity.
    pub fn spawn(&mut self) -> PendingEntity {
        let pending = PendingEntity(self.pending);
        self.pending += 1;
        self.commands.push(Command::CreateEntity { pending });
        pending
    }

    /// Records adding `value` to `target`.
    pub fn add<T: Component>(&mut self, target: impl Into<EntityTarget>, value: T) {
        self.commands.push(Command::AddComponent {
            target: target.into(),
            component: ComponentKey::of::<T>(),
            value: Box::new(value),
        });
    }

    /// Records removing component `T` from `target`.
    pub fn remove<T: Component>(&mut self, target: impl Into<EntityTarget>) {
        self.commands.push(Command::RemoveComponent {
            target: target.into(),
            component: ComponentKey::of::<T>(),
        });
    }

    /// Records destroying `target`.
    pub fn destroy(&mut self, target: impl Into<EntityTarget>) {
        self.commands.push(Command::DestroyEntity { target: target.into() });
    }

    /// Moves every command of `other` to the end of this buffer.
    pub fn append(&mut self, other: CommandBuffer) {
        let offset = self.pending;
        self.commands.reserve(other.commands.len());
        for mut command in other.commands {
            command.rebase(offset);
            self.commands.push(command);
        }
        self.pending += other.pending;
    }

    /// Number of recorded commands.
    #[inline]
    pub fn len(&self) -> usize { self.commands.len() }

    /// Returns `true` if nothing was recorded.
    #[inline]
    pub fn is_empty(&self) -> bool { self.commands.is_empty() }

    /// Number of placeholders created by this buffer.
    #[inline]
    pub fn pending_count(&self) -> u32 { self.pending }

    /// Recorded commands in submission order.
    #[inline]
    pub fn commands(&self) -> &[Command] { &self.commands }

    /// Consumes the buffer, yielding its commands and placeholder count.
    pub(crate) fn into_parts(self) -> (Vec<Command>, u32) {
        (self.commands, self.pending)
    }
}
