//! Entity handles and the entity table.
//!
//! An [`Entity`] is a plain `{id, version}` key; it carries no payload. The
//! [`EntityTable`] owns id allocation, version bookkeeping and the per-entity
//! signature table:
//!
//! - `entities` is a dense list of live handles, packed into `[0, live)`.
//! - `entity_index[id]` is the slot of `id` in `entities`, or `NULL_SLOT`.
//! - `signatures[id]` is the component set currently owned by `id`.
//! - `free_list` holds reclaimed ids, already carrying their next version.
//!
//! ## Invariants
//! - For every live `e`, `entities[entity_index[e.id]] == e`.
//! - `live <= max_entities - 1`; the remaining id is never handed out and
//!   stands in for the null entity.

use log::error;

use crate::engine::error::{CapacityError, InvalidHandleError};
use crate::engine::types::{
    EntityCount, EntityID, Signature, VersionID, NULL_ID, NULL_SLOT,
};


/// Handle to an entity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct Entity {
    /// Index into the per-entity tables.
    pub id: EntityID,
    /// Generation of the id at the time the handle was issued.
    pub version: VersionID,
}

impl Entity {
    /// The null entity; never live.
    pub const NULL: Entity = Entity { id: NULL_ID, version: 0 };

    /// Builds a handle from raw parts.
    #[inline]
    pub const fn new(id: EntityID, version: VersionID) -> Self { Self { id, version } }

    /// Returns `true` for the null sentinel.
    #[inline]
    pub const fn is_null(self) -> bool { self.id == NULL_ID }
}

impl Default for Entity {
    fn default() -> Self { Self::NULL }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.id, self.version)
    }
}

/// Allocation and signature table for all entity ids.
pub struct EntityTable {
    entities: Vec<Entity>,
    entity_index: Vec<u32>,
    signatures: Vec<Signature>,
    free_list: Vec<Entity>,
    next_fresh: EntityID,
    max_entities: u32,
}

impl EntityTable {
    /// Creates a table addressing `max_entities` ids.
    pub fn new(max_entities: u32) -> Self {
        Self {
            entities: Vec::with_capacity(max_entities as usize),
            entity_index: vec![NULL_SLOT; max_entities as usize],
            signatures: vec![Signature::EMPTY; max_entities as usize],
            free_list: Vec::new(),
            next_fresh: 0,
            max_entities,
        }
    }

    /// Number of live entities.
    #[inline]
    pub fn live_count(&self) -> EntityCount { self.entities.len() as EntityCount }

    /// Maximum number of simultaneously live entities.
    #[inline]
    pub fn capacity(&self) -> EntityCount { self.max_entities - 1 }

    /// Size of the per-entity tables.
    #[inline]
    pub fn max_entities(&self) -> u32 { self.max_entities }

    /// Dense slice of live handles.
    #[inline]
    pub fn live(&self) -> &[Entity] { &self.entities }

    /// Allocates a new entity with an empty signature.
    ///
    /// Reuses reclaimed ids first. Fails once `capacity()` entities are live.
    pub fn create(&mut self) -> Result<Entity, CapacityError> {
        let live = self.live_count();
        if live >= self.capacity() {
            let e = CapacityError { live, capacity: self.capacity() };
            error!("{e}");
            return Err(e);
        }

        let entity = match self.free_list.pop() {
            Some(recycled) => recycled,
            None => {
                let id = self.next_fresh;
                self.next_fresh += 1;
                Entity::new(id, 0)
            }
        };

        self.entity_index[entity.id as usize] = self.entities.len() as u32;
        self.entities.push(entity);
        self.signatures[entity.id as usize] = Signature::EMPTY;
        Ok(entity)
    }

    /// Returns `true` if `entity` is live and its version is current.
    #[inline]
    pub fn exists(&self, entity: Entity) -> bool {
        match self.entity_index.get(entity.id as usize) {
            Some(&slot) if slot != NULL_SLOT => self.entities[slot as usize].version == entity.version,
            _ => false,
        }
    }

    /// Returns the live handle currently using `id`, if any.
    #[inline]
    pub fn by_id(&self, id: EntityID) -> Option<Entity> {
        match self.entity_index.get(id as usize) {
            Some(&slot) if slot != NULL_SLOT => Some(self.entities[slot as usize]),
            _ => None,
        }
    }

    /// Fails with [`InvalidHandleError`] unless `entity` is live.
    #[inline]
    pub fn check(&self, entity: Entity) -> Result<(), InvalidHandleError> {
        if self.exists(entity) {
            Ok(())
        } else {
            Err(InvalidHandleError { id: entity.id, version: entity.version })
        }
    }

    /// Signature of a live entity.
    #[inline]
    pub fn signature(&self, entity: Entity) -> Option<Signature> {
        self.exists(entity).then(|| self.signatures[entity.id as usize])
    }

    /// Mutable signature slot of a live entity id. The caller checks liveness.
    #[inline]
    pub(crate) fn signature_mut(&mut self, id: EntityID) -> &mut Signature {
        &mut self.signatures[id as usize]
    }

    /// Releases `entity`, swapping the last live handle into its slot.
    ///
    /// The id is queued for reuse with its version incremented, so the
    /// released handle never becomes live again.
    pub fn destroy(&mut self, entity: Entity) -> Result<(), InvalidHandleError> {
        self.check(entity)?;
        let slot = self.entity_index[entity.id as usize] as usize;

        self.entities.swap_remove(slot);
        if slot < self.entities.len() {
            let moved = self.entities[slot];
            self.entity_index[moved.id as usize] = slot as u32;
        }

        self.entity_index[entity.id as usize] = NULL_SLOT;
        self.signatures[entity.id as usize] = Signature::EMPTY;
        self.free_list.push(Entity::new(entity.id, entity.version.wrapping_add(1)));
        Ok(())
    }
}
