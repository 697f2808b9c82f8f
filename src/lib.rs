//! # ECS Runtime
//!
//! Data-oriented Entity-Component-System runtime with a parallel job
//! scheduler.
//!
//! ## Design Goals
//! - Sparse-set component storage with O(1) add and remove
//! - Signature queries resolved per partition, not per entity
//! - Dependency-ordered, race-free parallel job stages
//! - Structural changes deferred into command buffers
//! - Degrade, don't crash, on dangling handles
//!
//! ## Example
//! ```rust
//! use ecs_runtime::prelude::*;
//!
//! struct Position(f32);
//! struct Velocity(f32);
//!
//! # fn main() -> ECSResult<()> {
//! let mut world = EntityManager::new(EcsConfig::default())?;
//! world.register::<Position>()?;
//! world.register::<Velocity>()?;
//!
//! let e = world.create()?;
//! world.add(e, Position(0.0))?;
//! world.add(e, Velocity(2.0))?;
//!
//! let integrate = JobBuilder::new("integrate", world.registry())
//!     .read::<Velocity>()?
//!     .write::<Position>()?
//!     .each(|item, _| {
//!         if let (Some(v), Some(mut p)) = (item.read::<Velocity>(), item.write::<Position>()) {
//!             p.0 += v.0;
//!         }
//!     });
//!
//! let mut movement = System::new(0, "movement");
//! movement.add_job(integrate);
//!
//! let mut systems = SystemManager::new(EcsConfig::default())?;
//! systems.add_system(movement);
//! systems.tick(&mut world)?;
//!
//! assert_eq!(world.get::<Position>(e).map(|p| p.0), Some(2.0));
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]
#![deny(dead_code)]

pub mod engine;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use engine::manager::{EntityManager, ReplayReport};

pub use engine::entity::{Entity, EntityTable};

pub use engine::component::{
    Component,
    ComponentDesc,
    ComponentRegistry,
    ComponentSet,
};

pub use engine::storage::{ComponentPool, ErasedPool};

pub use engine::partition::{Partition, Partitions};

pub use engine::query::{EntityQuery, QueryBuilder};

pub use engine::group::{Group, GroupCache, GroupID, PartitionSlice, ScratchArray};

pub use engine::job::{ComponentMut, ComponentRef, Job, JobBuilder, JobHandle, JobItem, JobKind};

pub use engine::systems::{Schedule, Stage, System};

pub use engine::scheduler::{SystemManager, TickReport};

pub use engine::commands::{Command, CommandBuffer, ComponentKey, EntityTarget, PendingEntity};

pub use engine::hooks::{ComponentHooks, HookFn};

pub use engine::spatial::{BucketRef, SpatialIndex};

pub use engine::snapshot::PoolSnapshot;

pub use engine::config::EcsConfig;

pub use engine::error::{
    ECSResult,
    ECSError,
    InvalidHandleError,
    CapacityError,
    AllocationError,
    RegistryError,
    SchedulingError,
    InvalidAccessReason,
};

pub use engine::types::{
    EntityID,
    VersionID,
    ComponentID,
    SystemID,
    Signature,
    AccessSets,
    AccessMode,
    build_signature,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used runtime types.
///
/// Import with:
/// ```rust
/// use ecs_runtime::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        EntityManager,
        Entity,
        EntityQuery,
        QueryBuilder,
        CommandBuffer,
        Job,
        JobBuilder,
        JobItem,
        JobKind,
        System,
        SystemManager,
        EcsConfig,
        ECSResult,
        ECSError,
        Signature,
    };
}
