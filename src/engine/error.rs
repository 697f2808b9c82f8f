//! Error types for the ECS runtime.
//!
//! This module declares focused, composable error types used across entity
//! management, component storage, scheduling and command replay. Each error
//! carries enough context to make a log line actionable on its own.
//!
//! ## Failure policy
//! Nothing in the runtime aborts a tick. Every failure is logged where it is
//! detected and then surfaced to the caller as an `Err` (or `None` for plain
//! lookups), so one dangling handle or one misdeclared job degrades a single
//! operation rather than the session.
//!
//! ## Taxonomy
//! * [`InvalidHandleError`]: the entity is dead or its version is stale.
//! * [`CapacityError`]: the entity table is exhausted.
//! * [`SchedulingError`]: dependency cycles, unknown jobs, illegal access.
//! * [`AllocationError`]: pool growth failed even after the fallback path.
//! * [`RegistryError`]: component registration problems.
//!
//! [`ECSError`] aggregates all of them with `From` conversions so internal code
//! can use `?` freely.

use std::any::TypeId;

use thiserror::Error;

use crate::engine::types::{ComponentID, EntityID, VersionID};


/// Returned when an operation targets an entity that is not live.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("stale or dead entity reference (id {id}, version {version})")]
pub struct InvalidHandleError {
    /// Id carried by the offending handle.
    pub id: EntityID,
    /// Version carried by the offending handle.
    pub version: VersionID,
}

/// Returned when the entity table cannot hold another entity.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("entity limit reached ({live} live; capacity {capacity})")]
pub struct CapacityError {
    /// Live entities at the time of the request.
    pub live: u32,
    /// Usable capacity (the sentinel slot excluded).
    pub capacity: u32,
}

/// Returned when a component pool cannot grow.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("failed to grow component pool {component_id} to {requested} elements")]
pub struct AllocationError {
    /// Component whose pool failed to grow.
    pub component_id: ComponentID,
    /// Element count the pool attempted to reach.
    pub requested: usize,
}

/// Failures raised while registering or resolving component types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry was frozen before this type was registered.
    #[error("component registry is frozen; cannot register {name}")]
    Frozen {
        /// Rust type name of the rejected component.
        name: &'static str,
    },

    /// More component types than a signature can hold.
    #[error("component capacity {capacity} exceeded")]
    CapacityExceeded {
        /// Maximum number of component types.
        capacity: usize,
    },

    /// The type was never registered with this world.
    #[error("component {name} is not registered")]
    NotRegistered {
        /// Rust type name of the missing component.
        name: &'static str,
    },

    /// A component id does not name a registered type.
    #[error("invalid component id {0}")]
    InvalidComponentId(ComponentID),
}

/// Reason a job's component access was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidAccessReason {
    /// The component is in neither the read nor the write set.
    Undeclared,
    /// The component was declared read-only but a write was requested.
    WriteToReadOnly,
    /// The job declared no scratch array of the requested type.
    NoScratch,
    /// A guard returned earlier in the same executor call still holds a
    /// conflicting borrow.
    AlreadyBorrowed,
}

/// Failures detected while building or executing job graphs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    /// Adding the edge would create a dependency cycle.
    #[error("dependency cycle: job {job} -> job {dependency}")]
    Cycle {
        /// Job that would depend on `dependency`.
        job: u32,
        /// Dependency that already (transitively) depends on `job`.
        dependency: u32,
    },

    /// The dependency chain exceeded the configured depth.
    #[error("dependency depth limit {limit} exceeded at job {job}")]
    DepthExceeded {
        /// Job where the walk stopped.
        job: u32,
        /// Configured depth limit.
        limit: usize,
    },

    /// A job handle does not belong to this system.
    #[error("unknown job handle {0}")]
    UnknownJob(u32),

    /// A job's component access was refused.
    #[error("job `{job}` made an illegal access to component {component}: {reason:?}")]
    IllegalAccess {
        /// Name of the offending job.
        job: &'static str,
        /// Type name of the component that was accessed.
        component: &'static str,
        /// Why the access was rejected.
        reason: InvalidAccessReason,
    },

    /// The worker pool could not be built.
    #[error("worker pool construction failed: {0}")]
    WorkerPool(String),
}

/// Aggregate error for every runtime operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ECSError {
    /// See [`InvalidHandleError`].
    #[error(transparent)]
    InvalidHandle(#[from] InvalidHandleError),

    /// See [`CapacityError`].
    #[error(transparent)]
    Capacity(#[from] CapacityError),

    /// See [`AllocationError`].
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// See [`RegistryError`].
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// See [`SchedulingError`].
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    /// The entity does not own a component of this type.
    #[error("entity {entity} has no component {component_id}")]
    MissingComponent {
        /// Id of the entity that was queried.
        entity: EntityID,
        /// Component that was missing.
        component_id: ComponentID,
    },

    /// The entity id lies beyond the slots a pool was sized for.
    #[error("entity {entity} out of range (limit {limit})")]
    EntityOutOfRange {
        /// Offending entity id.
        entity: EntityID,
        /// Number of entity slots the pool tracks.
        limit: usize,
    },

    /// A type-erased value did not match the pool's element type.
    #[error("type mismatch: expected {expected:?}, actual {actual:?}")]
    TypeMismatch {
        /// Element type of the destination pool.
        expected: TypeId,
        /// Dynamic type of the provided value.
        actual: TypeId,
    },

    /// A pending entity placeholder was never created in this buffer.
    #[error("unresolved pending entity {0}")]
    UnresolvedPending(u32),

    /// A snapshot could not be applied.
    #[error("invalid snapshot: {0}")]
    Snapshot(String),

    /// Configuration could not be parsed or failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for runtime operations.
pub type ECSResult<T> = Result<T, ECSError>;
