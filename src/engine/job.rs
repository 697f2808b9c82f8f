//! Jobs: declared units of per-entity work.
//!
//! A [`Job`] pairs an executor with a static declaration of what it touches:
//!
//! - the components it **reads** and **writes** ([`AccessSets`]),
//! - the query selecting the entities it runs on (every read and written
//!   component is implicitly required),
//! - its execution class ([`JobKind`]),
//! - optionally a per-row scratch array type.
//!
//! The scheduler runs the executor once per matched entity. The executor gets a
//! [`JobItem`] for component access and a thread-private [`CommandBuffer`] for
//! structural changes, which are replayed after the parallel phase.
//!
//! ## Access discipline
//! `JobItem::read` and `JobItem::write` only serve components declared in the
//! job's access sets. Anything else is logged once per stage as a scheduling
//! error and answered with `None`; the job keeps running.
//!
//! Accessors return guards ([`ComponentRef`], [`ComponentMut`]) that are
//! tracked per executor call. Each bound component (and the scratch array)
//! carries a borrow state:
//!
//! | state  | meaning                 |
//! |--------|-------------------------|
//! | 0      | free                    |
//! | 1      | mutably borrowed        |
//! | n >= 2 | `n - 1` shared borrows  |
//!
//! A borrow that conflicts with a live guard (a second `write`, a `read` while
//! writing, a `write` while reading) is refused the same way as undeclared
//! access. Dropping the guard frees the slot again.
//!
//! ## Example
//! ```ignore
//! let integrate = JobBuilder::new("integrate", world.registry())
//!     .read::<Velocity>()?
//!     .write::<Position>()?
//!     .each(|item, _commands| {
//!         if let (Some(v), Some(mut p)) = (item.read::<Velocity>(), item.write::<Position>()) {
//!             p.x += v.dx;
//!         }
//!     });
//! ```

use std::any::{TypeId, type_name};
use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::error;

use crate::engine::commands::CommandBuffer;
use crate::engine::component::{Component, ComponentRegistry, ComponentSet};
use crate::engine::entity::Entity;
use crate::engine::error::{ECSResult, InvalidAccessReason, SchedulingError};
use crate::engine::group::{ErasedScratch, RawScratch, ScratchArray};
use crate::engine::query::EntityQuery;
use crate::engine::storage::RawPool;
use crate::engine::types::{AccessMode, AccessSets};


/// Executor signature shared by all jobs.
pub type JobFn = dyn Fn(&JobItem<'_>, &mut CommandBuffer) + Send + Sync;

/// Index of a job inside its [`System`](crate::engine::systems::System).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobHandle(pub(crate) u32);

impl JobHandle {
    /// Position of the job in declaration order.
    #[inline]
    pub fn index(self) -> usize { self.0 as usize }
}

/// Execution class of a job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JobKind {
    /// Chunks may run on any worker thread.
    #[default]
    Parallelizable,
    /// Chunks run on the calling (main) thread, concurrently with workers.
    MainThreadOnly,
    /// Runs alone on the main thread after every other chunk of its stage.
    Blocking,
}

/// A declared job, ready to be added to a system.
pub struct Job {
    name: &'static str,
    query: EntityQuery,
    access: AccessSets,
    kind: JobKind,
    scratch: Option<Box<dyn ErasedScratch>>,
    executor: Arc<JobFn>,
}

impl Job {
    /// Human-readable name.
    pub fn name(&self) -> &'static str { self.name }

    /// Entity selection.
    pub fn query(&self) -> &EntityQuery { &self.query }

    /// Declared read/write sets.
    pub fn access(&self) -> &AccessSets { &self.access }

    /// Execution class.
    pub fn kind(&self) -> JobKind { self.kind }

    /// Scratch array, if the job declared one.
    pub fn scratch<S: Component + Default>(&self) -> Option<&ScratchArray<S>> {
        self.scratch.as_ref()?.as_any().downcast_ref::<ScratchArray<S>>()
    }

    pub(crate) fn executor(&self) -> Arc<JobFn> { Arc::clone(&self.executor) }

    pub(crate) fn scratch_mut(&mut self) -> Option<&mut Box<dyn ErasedScratch>> {
        self.scratch.as_mut()
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("access", &self.access)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Builder declaring a job's access, query and class.
pub struct JobBuilder<'r> {
    name: &'static str,
    registry: &'r ComponentRegistry,
    query: EntityQuery,
    access: AccessSets,
    kind: JobKind,
    scratch: Option<Box<dyn ErasedScratch>>,
}

impl<'r> JobBuilder<'r> {
    /// Starts declaring a job named `name`.
    pub fn new(name: &'static str, registry: &'r ComponentRegistry) -> Self {
        Self {
            name,
            registry,
            query: EntityQuery::default(),
            access: AccessSets::default(),
            kind: JobKind::default(),
            scratch: None,
        }
    }

    /// Declares read access to `T` (and requires it).
    pub fn read<T: Component>(mut self) -> ECSResult<Self> {
        let id = self.registry.id_of::<T>()?;
        self.access.read.set(id);
        self.query.require(id);
        Ok(self)
    }

    /// Declares write access to `T` (and requires it).
    pub fn write<T: Component>(mut self) -> ECSResult<Self> {
        let id = self.registry.id_of::<T>()?;
        self.access.write.set(id);
        self.query.require(id);
        Ok(self)
    }

    /// Requires `T` without accessing it.
    pub fn with<T: Component>(mut self) -> ECSResult<Self> {
        self.query.require(self.registry.id_of::<T>()?);
        Ok(self)
    }

    /// Excludes entities owning `T`.
    pub fn without<T: Component>(mut self) -> ECSResult<Self> {
        self.query.exclude(self.registry.id_of::<T>()?);
        Ok(self)
    }

    /// Requires at least one member of the pack `S`.
    pub fn any_of<S: ComponentSet>(mut self) -> ECSResult<Self> {
        self.query.any_of.push(self.registry.signature_of::<S>()?);
        Ok(self)
    }

    /// Sets the execution class.
    pub fn kind(mut self, kind: JobKind) -> Self {
        self.kind = kind;
        self
    }

    /// Declares a per-row scratch array of type `S`.
    pub fn scratch<S: Component + Default>(mut self) -> Self {
        self.scratch = Some(Box::new(ScratchArray::<S>::default()));
        self
    }

    /// Finishes the declaration with its executor.
    pub fn each<F>(self, executor: F) -> Job
    where
        F: Fn(&JobItem<'_>, &mut CommandBuffer) + Send + Sync + 'static,
    {
        Job {
            name: self.name,
            query: self.query,
            access: self.access,
            kind: self.kind,
            scratch: self.scratch,
            executor: Arc::new(executor),
        }
    }
}

/// One component pool bound to a job for the duration of a stage.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PoolBinding {
    pub(crate) mode: AccessMode,
    pub(crate) pool: RawPool,
}

/// A job prepared for dispatch: executor plus resolved pointers.
pub(crate) struct BoundJob {
    pub(crate) name: &'static str,
    pub(crate) kind: JobKind,
    pub(crate) executor: Arc<JobFn>,
    pub(crate) bindings: Vec<PoolBinding>,
    pub(crate) scratch: Option<RawScratch>,
    pub(crate) reported: AtomicBool,
}

impl BoundJob {
    fn report(&self, component: &'static str, reason: InvalidAccessReason) {
        if !self.reported.swap(true, Ordering::Relaxed) {
            let e = SchedulingError::IllegalAccess { job: self.name, component, reason };
            error!("{e}");
        }
    }

    fn binding<T: 'static>(&self) -> Option<(usize, &PoolBinding)> {
        let type_id = TypeId::of::<T>();
        self.bindings.iter().enumerate().find(|(_, b)| b.pool.type_id == type_id)
    }

    /// Fresh borrow states: one per binding, plus one for the scratch array.
    pub(crate) fn borrow_states(&self) -> Vec<Cell<usize>> {
        vec![Cell::new(FREE); self.bindings.len() + 1]
    }
}

const FREE: usize = 0;
const WRITE_LOCKED: usize = 1;

fn acquire_read(state: &Cell<usize>) -> bool {
    match state.get() {
        WRITE_LOCKED => false,
        FREE => { state.set(2); true }
        n => { state.set(n + 1); true }
    }
}

fn acquire_write(state: &Cell<usize>) -> bool {
    if state.get() != FREE {
        return false;
    }
    state.set(WRITE_LOCKED);
    true
}

/// Shared borrow of a component, released on drop.
pub struct ComponentRef<'i, T> {
    value: &'i T,
    state: &'i Cell<usize>,
}

impl<T> Deref for ComponentRef<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T { self.value }
}

impl<T> Drop for ComponentRef<'_, T> {
    fn drop(&mut self) {
        match self.state.get() {
            2 => self.state.set(FREE),
            n => self.state.set(n - 1),
        }
    }
}

/// Exclusive borrow of a component or scratch slot, released on drop.
pub struct ComponentMut<'i, T> {
    value: &'i mut T,
    state: &'i Cell<usize>,
}

impl<T> Deref for ComponentMut<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T { self.value }
}

impl<T> DerefMut for ComponentMut<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T { self.value }
}

impl<T> Drop for ComponentMut<'_, T> {
    fn drop(&mut self) { self.state.set(FREE); }
}

/// Per-entity view handed to a job executor.
pub struct JobItem<'a> {
    pub(crate) job: &'a BoundJob,
    pub(crate) entity: Entity,
    pub(crate) row: usize,
    pub(crate) borrows: &'a [Cell<usize>],
}

impl<'a> JobItem<'a> {
    /// Entity being processed.
    #[inline]
    pub fn entity(&self) -> Entity { self.entity }

    /// Row of the entity within the job's group.
    #[inline]
    pub fn row(&self) -> usize { self.row }

    /// Name of the running job.
    #[inline]
    pub fn job_name(&self) -> &'static str { self.job.name }

    /// Shared access to a declared component.
    ///
    /// Refused while a [`ComponentMut`] of the same type is alive.
    pub fn read<T: Component>(&self) -> Option<ComponentRef<'_, T>> {
        let Some((slot, binding)) = self.job.binding::<T>() else {
            self.job.report(type_name::<T>(), InvalidAccessReason::Undeclared);
            return None;
        };
        // SAFETY: the binding's type id equals T's; the pool is alive and
        // structurally frozen for the stage.
        let ptr = unsafe { binding.pool.value_ptr::<T>(self.entity.id) }?;
        let state = &self.borrows[slot];
        if !acquire_read(state) {
            self.job.report(type_name::<T>(), InvalidAccessReason::AlreadyBorrowed);
            return None;
        }
        // SAFETY: no job in this stage writes T except this one, and the
        // borrow state rules out a live exclusive guard in this call.
        Some(ComponentRef { value: unsafe { &*ptr }, state })
    }

    /// Exclusive access to a component declared as written.
    ///
    /// Refused while any other guard of the same type is alive.
    pub fn write<T: Component>(&self) -> Option<ComponentMut<'_, T>> {
        let Some((slot, binding)) = self.job.binding::<T>() else {
            self.job.report(type_name::<T>(), InvalidAccessReason::Undeclared);
            return None;
        };
        if binding.mode != AccessMode::Write {
            self.job.report(type_name::<T>(), InvalidAccessReason::WriteToReadOnly);
            return None;
        }
        // SAFETY: as for `read`.
        let ptr = unsafe { binding.pool.value_ptr::<T>(self.entity.id) }?;
        let state = &self.borrows[slot];
        if !acquire_write(state) {
            self.job.report(type_name::<T>(), InvalidAccessReason::AlreadyBorrowed);
            return None;
        }
        // SAFETY: this entity's row is visited by one chunk only, no other job
        // of the stage touches T, and the borrow state is now write-locked.
        Some(ComponentMut { value: unsafe { &mut *ptr }, state })
    }

    /// This pass's scratch slot for the entity's row.
    pub fn scratch<S: Component + Default>(&self) -> Option<ComponentMut<'_, S>> {
        let scratch = self.scratch_parts::<S>()?;
        if self.row >= scratch.current_len {
            return None;
        }
        let state = &self.borrows[self.job.bindings.len()];
        if !acquire_write(state) {
            self.job.report(type_name::<S>(), InvalidAccessReason::AlreadyBorrowed);
            return None;
        }
        // SAFETY: type checked, row in bounds, each row visited by one chunk,
        // slot write-locked for this call.
        let value = unsafe { &mut *(scratch.current as *mut S).add(self.row) };
        Some(ComponentMut { value, state })
    }

    /// Previous pass's scratch value for the same group row.
    pub fn previous_scratch<S: Component + Default>(&self) -> Option<&'a S> {
        let scratch = self.scratch_parts::<S>()?;
        if self.row >= scratch.previous_len {
            return None;
        }
        // SAFETY: the previous buffer is read-only for the whole stage.
        Some(unsafe { &*(scratch.previous as *const S).add(self.row) })
    }

    fn scratch_parts<S: 'static>(&self) -> Option<RawScratch> {
        match self.job.scratch {
            Some(scratch) if scratch.type_id == TypeId::of::<S>() => Some(scratch),
            _ => {
                self.job.report(type_name::<S>(), InvalidAccessReason::NoScratch);
                None
            }
        }
    }
}
