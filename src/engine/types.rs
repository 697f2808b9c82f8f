//! Core ECS Types, Identifiers, and Bit-Level Layouts
//!
//! This module defines the **fundamental identifiers and signatures** shared by
//! every other engine module: entity storage, partitions, queries, jobs and the
//! scheduler all speak in terms of the types declared here.
//!
//! ## Entity Representation
//!
//! Entities are a pair of 32-bit values:
//!
//! ```text
//! | id | version |
//! ```
//!
//! - **id** indexes the fixed-size per-entity tables owned by the world.
//! - **version** is bumped whenever an id is recycled, so handles that outlive
//!   their entity are detected instead of silently aliasing a newcomer.
//!
//! ## Signatures
//!
//! Component types are identified by compact [`ComponentID`] values assigned by
//! the world's registry. A [`Signature`] is a fixed-width bitset over those ids
//! and is used as:
//!
//! - the "type" of an entity (which components it currently owns),
//! - the key of a storage partition,
//! - the required / excluded masks of a query,
//! - the read / write declarations of a job ([`AccessSets`]).
//!
//! All signature operations are branch-light word loops with no allocation.

/// Index of an entity inside the world's per-entity tables.
pub type EntityID = u32;
/// Generation counter used to detect stale entities.
pub type VersionID = u32;
/// Count of live entities.
pub type EntityCount = u32;

/// Unique identifier for a component type.
pub type ComponentID = u16;
/// Identifier of an exact-signature storage partition.
pub type PartitionID = u32;
/// Row of an entity inside its partition.
pub type RowID = u32;

/// Unique identifier for a system.
pub type SystemID = u16;
/// Simulation tick counter.
pub type Tick = u64;

/// Reserved id carried by the null entity.
pub const NULL_ID: EntityID = EntityID::MAX;
/// Sentinel stored in sparse index tables for "no slot".
pub const NULL_SLOT: u32 = u32::MAX;

/// Maximum number of registered component types.
pub const COMPONENT_CAP: usize = 128;
/// Number of `u64` words required to represent a full component signature.
pub const SIGNATURE_SIZE: usize = (COMPONENT_CAP + 63) / 64;

/// Bitset representing a set of components.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    /// Packed component bitset.
    pub components: [u64; SIGNATURE_SIZE],
}

impl Signature {
    /// The empty signature.
    pub const EMPTY: Signature = Signature { components: [0u64; SIGNATURE_SIZE] };

    /// Sets the bit corresponding to `component_id`.
    #[inline]
    pub fn set(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] |= 1u64 << bits;
    }

    /// Clears the bit corresponding to `component_id`.
    #[inline]
    pub fn clear(&mut self, component_id: ComponentID) {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        self.components[index] &= !(1u64 << bits);
    }

    /// Returns a copy of this signature with `component_id` set.
    #[inline]
    pub fn with(mut self, component_id: ComponentID) -> Self {
        self.set(component_id);
        self
    }

    /// Returns `true` if `component_id` is present in this signature.
    #[inline]
    pub fn has(&self, component_id: ComponentID) -> bool {
        let index = (component_id as usize) / 64;
        let bits = (component_id as usize) % 64;
        (self.components[index] >> bits) & 1 == 1
    }

    /// Returns `true` if all components in `signature` are present.
    #[inline]
    pub fn contains_all(&self, signature: &Signature) -> bool {
        for (component_a, component_b) in self.components.iter().zip(signature.components.iter()) {
            if (component_a & component_b) != *component_b { return false; }
        }
        true
    }

    /// Returns `true` if at least one component is present in both signatures.
    #[inline]
    pub fn intersects(&self, signature: &Signature) -> bool {
        self.components
            .iter()
            .zip(signature.components.iter())
            .any(|(a, b)| (a & b) != 0)
    }

    /// Returns `true` if no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.components.iter().all(|&word| word == 0)
    }

    /// Number of components in the signature.
    #[inline]
    pub fn count(&self) -> u32 {
        self.components.iter().map(|word| word.count_ones()).sum()
    }

    /// Bitwise union of two signatures.
    #[inline]
    pub fn union(&self, other: &Signature) -> Signature {
        let mut out = *self;
        for (word, other_word) in out.components.iter_mut().zip(other.components.iter()) {
            *word |= other_word;
        }
        out
    }

    /// Iterates over all component IDs set in this signature.
    pub fn iterate_over_components(&self) -> impl Iterator<Item = ComponentID> + '_ {
        self.components
            .iter()
            .enumerate()
            .flat_map(|(word_index, &word)| {
                let base = word_index * 64;
                let mut bits = word;
                std::iter::from_fn(move || {
                    if bits == 0 {
                        return None;
                    }
                    let tz = bits.trailing_zeros() as usize;
                    bits &= bits - 1;
                    Some((base + tz) as ComponentID)
                })
            })
    }
}

/// Builds a component signature from a list of component IDs.
pub fn build_signature(component_ids: &[ComponentID]) -> Signature {
    let mut signature = Signature::default();
    for &component_id in component_ids { signature.set(component_id); }
    signature
}

/// Access mode for a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    /// Read-only access.
    Read,
    /// Exclusive write access.
    Write,
}

/// Declares the component access set of a job.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessSets {
    /// Components read by the job.
    pub read: Signature,
    /// Components written by the job.
    pub write: Signature,
}

impl AccessSets {
    /// Returns `true` if this access set conflicts with another.
    ///
    /// Two sets conflict when either side writes a component the other side
    /// reads or writes. Shared reads never conflict.
    #[inline]
    pub fn conflicts_with(&self, other: &AccessSets) -> bool {
        for ((a_w, a_r), (b_w, b_r)) in self.write.components.iter().zip(self.read.components.iter())
            .zip(other.write.components.iter().zip(other.read.components.iter()))
        {
            // (W ∩ W) or (W ∩ R) or (R ∩ W)
            if (a_w & b_w) != 0 || (a_w & b_r) != 0 || (a_r & b_w) != 0 { return true; }
        }
        false
    }

    /// Returns the mode this set grants for `component_id`, if any.
    #[inline]
    pub fn mode_of(&self, component_id: ComponentID) -> Option<AccessMode> {
        if self.write.has(component_id) {
            Some(AccessMode::Write)
        } else if self.read.has(component_id) {
            Some(AccessMode::Read)
        } else {
            None
        }
    }

    /// Every component touched by this set.
    #[inline]
    pub fn touched(&self) -> Signature {
        self.read.union(&self.write)
    }
}
