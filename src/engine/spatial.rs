//! Boundary to the spatial bucket subsystem.
//!
//! The runtime does not own any spatial storage. A chunk or grid subsystem
//! implements [`SpatialIndex`] for its position component, and
//! [`EntityManager::track_spatial`] wires it to that component's lifecycle
//! hooks:
//!
//! - adding a position puts the entity into the bucket found by `lookup`,
//! - removing a position (or destroying the entity) takes it out again,
//! - replacing a position ([`EntityManager::replace`]) does both, which moves
//!   the entity between buckets when it crosses a boundary.
//!
//! [`EntityManager::track_spatial`]: crate::engine::manager::EntityManager::track_spatial
//! [`EntityManager::replace`]: crate::engine::manager::EntityManager::replace

use crate::engine::entity::Entity;

/// Handle to one spatial bucket.
///
/// Buckets are owned by the spatial subsystem, so mutation goes through a
/// shared reference.
pub trait BucketRef {
    /// Records `entity` as a member of this bucket.
    fn add_entity(&self, entity: Entity);

    /// Removes `entity` from this bucket.
    fn remove_entity(&self, entity: Entity);
}

/// Resolves positions to buckets.
pub trait SpatialIndex<P>: Send + Sync + 'static {
    /// Bucket handle type.
    type Bucket: BucketRef;

    /// Bucket containing `position`, or `None` outside the indexed area.
    fn lookup(&self, position: &P) -> Option<Self::Bucket>;
}
