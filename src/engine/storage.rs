//! Dense sparse-set component storage.
//!
//! One [`ComponentPool<T>`] exists per registered component type. It stores
//! values densely and maps entity ids to slots through a sparse index:
//!
//! ```text
//! entity_slot[entity id] ──► slot ──► components[slot]
//!                                 └─► owners[slot] == entity id
//! ```
//!
//! # Invariants
//!
//! - `components.len() == owners.len()`.
//! - `entity_slot[owners[i]] == i` for every `i < len`.
//! - `entity_slot[id] == NULL_SLOT` for every id that owns no value here.
//!
//! # Index stability
//!
//! - **insert** appends at `len`; existing slots keep their positions.
//! - **remove** swaps the last value into the freed slot. The value that was
//!   last moves, so any reference or slot index obtained before a remove must be
//!   re-fetched afterwards.
//! - **restore** rebuilds every index from scratch.
//!
//! # Growth
//!
//! Capacity doubles when the pool is full. If the in-place reservation fails,
//! the pool falls back to allocating a fresh buffer, moving the values across
//! and dropping the old one, before reporting an [`AllocationError`].
//!
//! # Type erasure
//!
//! [`ErasedPool`] lets the world hold heterogeneous pools behind
//! `Box<dyn ErasedPool>` and drive them by component id (destroy, replay of
//! deferred commands, cloning). [`RawPool`] exposes the base pointers used by
//! the job scheduler during a parallel stage.

use std::any::{Any, TypeId, type_name};

use log::warn;

use crate::engine::component::Component;
use crate::engine::error::{AllocationError, ECSError, ECSResult};
use crate::engine::types::{ComponentID, EntityID, NULL_SLOT};


/// Dense storage for a single component type.
pub struct ComponentPool<T> {
    component_id: ComponentID,
    components: Vec<T>,
    owners: Vec<EntityID>,
    entity_slot: Vec<u32>,
    cloner: Option<fn(&T) -> T>,
}

impl<T: Component> ComponentPool<T> {
    /// Creates an empty pool addressing `max_entities` ids.
    pub fn new(component_id: ComponentID, max_entities: u32, initial_capacity: usize) -> Self {
        Self {
            component_id,
            components: Vec::with_capacity(initial_capacity),
            owners: Vec::with_capacity(initial_capacity),
            entity_slot: vec![NULL_SLOT; max_entities as usize],
            cloner: None,
        }
    }

    /// Enables entity cloning for this pool.
    pub fn with_cloner(mut self, cloner: fn(&T) -> T) -> Self {
        self.cloner = Some(cloner);
        self
    }

    /// Component id served by this pool.
    #[inline]
    pub fn component_id(&self) -> ComponentID { self.component_id }

    /// Number of stored values.
    #[inline]
    pub fn len(&self) -> usize { self.components.len() }

    /// Returns `true` if the pool holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool { self.components.is_empty() }

    /// Allocated element capacity.
    #[inline]
    pub fn capacity(&self) -> usize { self.components.capacity() }

    /// Slot of `entity_id`, if it owns a value here.
    #[inline]
    pub fn slot_of(&self, entity_id: EntityID) -> Option<usize> {
        match self.entity_slot.get(entity_id as usize) {
            Some(&slot) if slot != NULL_SLOT => Some(slot as usize),
            _ => None,
        }
    }

    /// Returns `true` if `entity_id` owns a value here.
    #[inline]
    pub fn contains(&self, entity_id: EntityID) -> bool {
        self.slot_of(entity_id).is_some()
    }

    /// Dense value slice.
    #[inline]
    pub fn components(&self) -> &[T] { &self.components }

    /// Dense owner slice; `owners()[i]` owns `components()[i]`.
    #[inline]
    pub fn owners(&self) -> &[EntityID] { &self.owners }

    /// Iterates `(owner, value)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityID, &T)> {
        self.owners.iter().copied().zip(self.components.iter())
    }

    /// Returns the value owned by `entity_id`.
    ///
    /// Logs and returns `None` when the entity holds no value of this type.
    pub fn get(&self, entity_id: EntityID) -> Option<&T> {
        match self.slot_of(entity_id) {
            Some(slot) => self.components.get(slot),
            None => {
                warn!("entity {entity_id} has no {} component", type_name::<T>());
                None
            }
        }
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, entity_id: EntityID) -> Option<&mut T> {
        match self.slot_of(entity_id) {
            Some(slot) => self.components.get_mut(slot),
            None => {
                warn!("entity {entity_id} has no {} component", type_name::<T>());
                None
            }
        }
    }

    fn grow(&mut self) -> ECSResult<()> {
        let len = self.components.len();
        let target = (self.components.capacity() * 2).max(1);
        let additional = target - len;

        if self.components.try_reserve_exact(additional).is_ok()
            && self.owners.try_reserve_exact(additional).is_ok()
        {
            return Ok(());
        }

        warn!(
            "in-place growth of {} pool to {target} failed; relocating",
            type_name::<T>()
        );

        // Fresh buffers; values are moved, never cloned.
        let mut components: Vec<T> = Vec::new();
        let mut owners: Vec<EntityID> = Vec::new();
        let fresh = components.try_reserve_exact(target).is_ok()
            && owners.try_reserve_exact(target).is_ok();
        if !fresh
            && (components.try_reserve_exact(len + 1).is_err() || owners.try_reserve_exact(len + 1).is_err())
        {
            return Err(AllocationError { component_id: self.component_id, requested: target }.into());
        }

        components.extend(self.components.drain(..));
        owners.extend(self.owners.drain(..));
        self.components = components;
        self.owners = owners;
        Ok(())
    }

    /// Stores `value` for `entity_id`.
    ///
    /// If the entity already owns a value, it is replaced in place and the old
    /// value is returned. Otherwise the value is appended; O(1) amortized.
    pub fn insert(&mut self, entity_id: EntityID, value: T) -> ECSResult<Option<T>> {
        if entity_id as usize >= self.entity_slot.len() {
            return Err(ECSError::EntityOutOfRange { entity: entity_id, limit: self.entity_slot.len() });
        }
        if let Some(slot) = self.slot_of(entity_id) {
            return Ok(Some(std::mem::replace(&mut self.components[slot], value)));
        }

        if self.components.len() == self.components.capacity() {
            self.grow()?;
        }

        let slot = self.components.len();
        self.components.push(value);
        self.owners.push(entity_id);
        self.entity_slot[entity_id as usize] = slot as u32;
        Ok(None)
    }

    /// Removes and returns the value owned by `entity_id`; O(1).
    ///
    /// Fails with [`ECSError::MissingComponent`] when there is none.
    pub fn remove(&mut self, entity_id: EntityID) -> ECSResult<T> {
        let Some(slot) = self.slot_of(entity_id) else {
            return Err(ECSError::MissingComponent { entity: entity_id, component_id: self.component_id });
        };
        let last = self.components.len() - 1;

        let value = self.components.swap_remove(slot);
        self.owners.swap_remove(slot);
        if slot != last {
            let moved = self.owners[slot];
            self.entity_slot[moved as usize] = slot as u32;
        }
        self.entity_slot[entity_id as usize] = NULL_SLOT;
        Ok(value)
    }

    /// Replaces the whole pool content.
    ///
    /// `owners[i]` becomes the owner of `components[i]`; the sparse index is
    /// rebuilt. Callers validate the owner list beforehand.
    pub fn restore(&mut self, owners: Vec<EntityID>, components: Vec<T>) {
        debug_assert_eq!(owners.len(), components.len());
        for &owner in &self.owners {
            self.entity_slot[owner as usize] = NULL_SLOT;
        }
        for (slot, &owner) in owners.iter().enumerate() {
            self.entity_slot[owner as usize] = slot as u32;
        }
        self.owners = owners;
        self.components = components;
    }

    /// Checks the sparse/dense invariants. Used by tests and debug assertions.
    pub fn is_consistent(&self) -> bool {
        self.components.len() == self.owners.len()
            && self.owners.iter().enumerate().all(|(slot, &owner)| {
                self.entity_slot.get(owner as usize) == Some(&(slot as u32))
            })
            && self.entity_slot.iter().filter(|&&slot| slot != NULL_SLOT).count() == self.owners.len()
    }
}

/// Base pointers of a pool, valid for the duration of one parallel stage.
///
/// ## Safety
/// A `RawPool` is produced from a mutable borrow of the pool and must not
/// outlive it. Structural changes are forbidden while it is in use; the
/// scheduler guarantees this by deferring them into command buffers.
#[derive(Clone, Copy, Debug)]
pub struct RawPool {
    pub(crate) data: *mut u8,
    pub(crate) len: usize,
    pub(crate) slots: *const u32,
    pub(crate) slot_len: usize,
    pub(crate) type_id: TypeId,
}

// SAFETY: access through a RawPool is partitioned by the scheduler so that no two
// threads write the same slot and no thread reads a slot another one writes.
unsafe impl Send for RawPool {}
unsafe impl Sync for RawPool {}

impl RawPool {
    /// Pointer to the value owned by `entity_id`, if any.
    ///
    /// ## Safety
    /// `T` must be the pool's element type and the pool must still be alive
    /// and structurally unchanged.
    #[inline]
    pub(crate) unsafe fn value_ptr<T: 'static>(&self, entity_id: EntityID) -> Option<*mut T> {
        debug_assert_eq!(self.type_id, TypeId::of::<T>());
        if entity_id as usize >= self.slot_len {
            return None;
        }
        // SAFETY: bounds checked above; the caller guarantees the pool is alive.
        let slot = unsafe { *self.slots.add(entity_id as usize) };
        if slot == NULL_SLOT || slot as usize >= self.len {
            return None;
        }
        // SAFETY: slot < len and the caller guarantees the element type.
        Some(unsafe { (self.data as *mut T).add(slot as usize) })
    }
}

/// Type-erased interface over [`ComponentPool<T>`].
pub trait ErasedPool: Send + Sync {
    /// Component id served by this pool.
    fn component_id(&self) -> ComponentID;

    /// Element `TypeId`.
    fn element_type(&self) -> TypeId;

    /// Element type name for diagnostics.
    fn element_type_name(&self) -> &'static str;

    /// Number of stored values.
    fn len(&self) -> usize;

    /// Returns `true` if the pool is empty.
    fn is_empty(&self) -> bool { self.len() == 0 }

    /// Returns `true` if `entity_id` owns a value here.
    fn contains(&self, entity_id: EntityID) -> bool;

    /// Dense owner list.
    fn owner_ids(&self) -> &[EntityID];

    /// Stores a boxed value; the dynamic type must match the element type.
    /// Returns `true` when an existing value was replaced.
    fn insert_dyn(&mut self, entity_id: EntityID, value: Box<dyn Any + Send>) -> ECSResult<bool>;

    /// Removes and drops the value owned by `entity_id`.
    fn remove_dyn(&mut self, entity_id: EntityID) -> ECSResult<()>;

    /// Copies the value of `from` onto `to`. Returns `Ok(false)` when the
    /// component is not cloneable.
    fn clone_between(&mut self, from: EntityID, to: EntityID) -> ECSResult<bool>;

    /// Base pointers for scheduler use.
    fn raw_parts(&mut self) -> RawPool;

    /// Upcast for typed access.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for typed access.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Component> ErasedPool for ComponentPool<T> {
    fn component_id(&self) -> ComponentID { self.component_id }

    fn element_type(&self) -> TypeId { TypeId::of::<T>() }

    fn element_type_name(&self) -> &'static str { type_name::<T>() }

    fn len(&self) -> usize { self.components.len() }

    fn contains(&self, entity_id: EntityID) -> bool { ComponentPool::contains(self, entity_id) }

    fn owner_ids(&self) -> &[EntityID] { &self.owners }

    fn insert_dyn(&mut self, entity_id: EntityID, value: Box<dyn Any + Send>) -> ECSResult<bool> {
        let actual = (*value).type_id();
        let value = value.downcast::<T>().map_err(|_| ECSError::TypeMismatch {
            expected: TypeId::of::<T>(),
            actual,
        })?;
        Ok(self.insert(entity_id, *value)?.is_some())
    }

    fn remove_dyn(&mut self, entity_id: EntityID) -> ECSResult<()> {
        self.remove(entity_id).map(drop)
    }

    fn clone_between(&mut self, from: EntityID, to: EntityID) -> ECSResult<bool> {
        let Some(cloner) = self.cloner else { return Ok(false); };
        let Some(slot) = self.slot_of(from) else {
            return Err(ECSError::MissingComponent { entity: from, component_id: self.component_id });
        };
        let value = cloner(&self.components[slot]);
        self.insert(to, value)?;
        Ok(true)
    }

    fn raw_parts(&mut self) -> RawPool {
        RawPool {
            data: self.components.as_mut_ptr() as *mut u8,
            len: self.components.len(),
            slots: self.entity_slot.as_ptr(),
            slot_len: self.entity_slot.len(),
            type_id: TypeId::of::<T>(),
        }
    }

    fn as_any(&self) -> &dyn Any { self }

    fn as_any_mut(&mut self) -> &mut dyn Any { self }
}
