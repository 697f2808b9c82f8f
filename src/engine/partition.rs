//! Exact-signature partitions of the live entity set.
//!
//! Component values live in per-type sparse sets, but the scheduler needs to
//! find "all entities whose signature satisfies a query" without scanning every
//! entity. The world therefore buckets live entities by their exact signature:
//! each distinct signature owns one [`Partition`] with a dense list of handles.
//!
//! Group resolution is then a scan over partitions, not entities.
//!
//! ## Invariants
//! - Every live entity appears in exactly one partition, the one keyed by its
//!   current signature.
//! - `location[e.id] == (p, row)` iff `partitions[p].entities[row] == e`.
//! - Partitions are never deleted; an emptied partition keeps its id and is
//!   reused when an entity acquires that signature again.

use std::collections::HashMap;

use crate::engine::entity::Entity;
use crate::engine::types::{EntityID, PartitionID, RowID, Signature, NULL_SLOT};


/// Dense list of entities sharing one signature.
#[derive(Debug)]
pub struct Partition {
    id: PartitionID,
    signature: Signature,
    entities: Vec<Entity>,
}

impl Partition {
    /// Identifier of this partition.
    #[inline]
    pub fn id(&self) -> PartitionID { self.id }

    /// Exact signature shared by every member.
    #[inline]
    pub fn signature(&self) -> &Signature { &self.signature }

    /// Member handles in row order.
    #[inline]
    pub fn entities(&self) -> &[Entity] { &self.entities }

    /// Number of members.
    #[inline]
    pub fn len(&self) -> usize { self.entities.len() }

    /// Returns `true` if the partition currently has no members.
    #[inline]
    pub fn is_empty(&self) -> bool { self.entities.is_empty() }
}

/// All partitions of a world plus the entity → (partition, row) index.
pub struct Partitions {
    partitions: Vec<Partition>,
    by_signature: HashMap<Signature, PartitionID>,
    location: Vec<(PartitionID, RowID)>,
}

impl Partitions {
    /// Creates an empty set of partitions addressing `max_entities` ids.
    pub fn new(max_entities: u32) -> Self {
        Self {
            partitions: Vec::new(),
            by_signature: HashMap::new(),
            location: vec![(NULL_SLOT, NULL_SLOT); max_entities as usize],
        }
    }

    /// Number of partitions ever created.
    #[inline]
    pub fn len(&self) -> usize { self.partitions.len() }

    /// Returns `true` if no partition exists yet.
    #[inline]
    pub fn is_empty(&self) -> bool { self.partitions.is_empty() }

    /// Iterates every partition, including empty ones.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Partition> { self.partitions.iter() }

    /// Partition by id.
    #[inline]
    pub fn get(&self, id: PartitionID) -> Option<&Partition> { self.partitions.get(id as usize) }

    /// Partition currently holding `entity_id`.
    #[inline]
    pub fn partition_of(&self, entity_id: EntityID) -> Option<PartitionID> {
        match self.location.get(entity_id as usize) {
            Some(&(partition, _)) if partition != NULL_SLOT => Some(partition),
            _ => None,
        }
    }

    fn get_or_create(&mut self, signature: Signature) -> PartitionID {
        if let Some(&id) = self.by_signature.get(&signature) {
            return id;
        }
        let id = self.partitions.len() as PartitionID;
        self.by_signature.insert(signature, id);
        self.partitions.push(Partition { id, signature, entities: Vec::new() });
        id
    }

    /// Adds a freshly created entity under `signature`.
    pub fn insert(&mut self, entity: Entity, signature: Signature) {
        debug_assert!(self.partition_of(entity.id).is_none());
        let id = self.get_or_create(signature);
        let partition = &mut self.partitions[id as usize];
        let row = partition.entities.len() as RowID;
        partition.entities.push(entity);
        self.location[entity.id as usize] = (id, row);
    }

    /// Removes an entity from whichever partition holds it; O(1).
    pub fn remove(&mut self, entity_id: EntityID) -> Option<Entity> {
        let (id, row) = *self.location.get(entity_id as usize)?;
        if id == NULL_SLOT {
            return None;
        }

        let partition = &mut self.partitions[id as usize];
        let removed = partition.entities.swap_remove(row as usize);
        if (row as usize) < partition.entities.len() {
            let moved = partition.entities[row as usize];
            self.location[moved.id as usize] = (id, row);
        }
        self.location[entity_id as usize] = (NULL_SLOT, NULL_SLOT);
        Some(removed)
    }

    /// Moves an entity into the partition keyed by `signature`.
    pub fn relocate(&mut self, entity: Entity, signature: Signature) {
        if let Some(current) = self.partition_of(entity.id) {
            if self.partitions[current as usize].signature == signature {
                return;
            }
        }
        self.remove(entity.id);
        self.insert(entity, signature);
    }
}
