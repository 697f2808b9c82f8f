//! Groups: cached partition lists per query.
//!
//! A [`Group`] records which storage partitions currently satisfy a query and
//! how many entities each one holds. Partition membership changes between
//! frames, so every scheduling pass calls [`GroupCache::refresh`] before
//! dispatching any job. The refresh is a scan over partitions, not entities.
//!
//! Each group lays its partitions out back-to-back, giving every matched
//! entity a *group row* in `[0, total)`. Per-job scratch arrays are indexed by
//! that row.
//!
//! ## Scratch arrays
//! [`ScratchArray<S>`] is double-buffered: at the start of a pass the buffers
//! swap, so the value written for a row during the previous pass stays readable
//! while the current pass writes fresh values. Buffers grow on demand and are
//! shrunk only when utilization drops below the configured low-water mark, so
//! a group oscillating in size does not reallocate every frame.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use log::trace;

use crate::engine::component::Component;
use crate::engine::partition::Partitions;
use crate::engine::query::EntityQuery;
use crate::engine::types::PartitionID;


/// Index of a group inside a [`GroupCache`].
pub type GroupID = u32;

/// One matched partition inside a group.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionSlice {
    /// Matched partition.
    pub partition: PartitionID,
    /// Entities in the partition at refresh time.
    pub len: usize,
    /// Group row of the partition's first entity.
    pub offset: usize,
}

/// The partitions matching one query, as of the last refresh.
#[derive(Debug)]
pub struct Group {
    query: EntityQuery,
    slices: Vec<PartitionSlice>,
    total: usize,
}

impl Group {
    /// Query defining the group.
    pub fn query(&self) -> &EntityQuery { &self.query }

    /// Matched partitions with their sizes.
    pub fn slices(&self) -> &[PartitionSlice] { &self.slices }

    /// Total matched entities.
    pub fn total(&self) -> usize { self.total }

    fn rebuild(&mut self, partitions: &Partitions) {
        self.slices.clear();
        self.total = 0;
        for partition in partitions.iter() {
            if partition.is_empty() || !self.query.check(partition.signature()) {
                continue;
            }
            self.slices.push(PartitionSlice {
                partition: partition.id(),
                len: partition.len(),
                offset: self.total,
            });
            self.total += partition.len();
        }
    }
}

/// Deduplicated set of groups requested by the registered systems.
#[derive(Default)]
pub struct GroupCache {
    groups: Vec<Group>,
    index: HashMap<EntityQuery, GroupID>,
}

impl GroupCache {
    /// Creates an empty cache.
    pub fn new() -> Self { Self::default() }

    /// Returns the group for `query`, creating it on first request.
    pub fn register(&mut self, query: &EntityQuery) -> GroupID {
        if let Some(&id) = self.index.get(query) {
            return id;
        }
        let id = self.groups.len() as GroupID;
        self.index.insert(query.clone(), id);
        self.groups.push(Group { query: query.clone(), slices: Vec::new(), total: 0 });
        id
    }

    /// Re-resolves every group against the current partitions.
    pub fn refresh(&mut self, partitions: &Partitions) {
        for group in &mut self.groups {
            group.rebuild(partitions);
        }
        trace!("refreshed {} groups over {} partitions", self.groups.len(), partitions.len());
    }

    /// Group by id.
    pub fn get(&self, id: GroupID) -> Option<&Group> { self.groups.get(id as usize) }

    /// Number of distinct groups.
    pub fn len(&self) -> usize { self.groups.len() }

    /// Returns `true` if no group was registered.
    pub fn is_empty(&self) -> bool { self.groups.is_empty() }
}

/// Double-buffered per-row scratch storage.
pub struct ScratchArray<S> {
    current: Vec<S>,
    previous: Vec<S>,
}

impl<S> Default for ScratchArray<S> {
    fn default() -> Self {
        Self { current: Vec::new(), previous: Vec::new() }
    }
}

impl<S: Default> ScratchArray<S> {
    /// Swaps buffers and sizes the current one to `len` default values.
    pub fn prepare(&mut self, len: usize, low_water: f32) {
        std::mem::swap(&mut self.current, &mut self.previous);
        self.current.clear();

        let capacity = self.current.capacity();
        if capacity > 0 && (len as f32) < capacity as f32 * low_water {
            self.current.shrink_to(len.max(1));
        }
        self.current.resize_with(len, S::default);
    }

    /// Values written during the current pass.
    pub fn current(&self) -> &[S] { &self.current }

    /// Values written during the previous pass.
    pub fn previous(&self) -> &[S] { &self.previous }

    /// Allocated capacity of the current buffer.
    pub fn capacity(&self) -> usize { self.current.capacity() }
}

/// Base pointers of a scratch array for one stage.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RawScratch {
    pub(crate) current: *mut u8,
    pub(crate) current_len: usize,
    pub(crate) previous: *const u8,
    pub(crate) previous_len: usize,
    pub(crate) type_id: TypeId,
}

// SAFETY: every group row is visited by exactly one chunk, so no two threads
// touch the same scratch element.
unsafe impl Send for RawScratch {}
unsafe impl Sync for RawScratch {}

/// Type-erased [`ScratchArray`].
pub(crate) trait ErasedScratch: Send + Sync {
    fn prepare(&mut self, len: usize, low_water: f32);
    fn raw_parts(&mut self) -> RawScratch;
    fn as_any(&self) -> &dyn Any;
}

impl<S: Component + Default> ErasedScratch for ScratchArray<S> {
    fn prepare(&mut self, len: usize, low_water: f32) {
        ScratchArray::prepare(self, len, low_water);
    }

    fn raw_parts(&mut self) -> RawScratch {
        RawScratch {
            current: self.current.as_mut_ptr() as *mut u8,
            current_len: self.current.len(),
            previous: self.previous.as_ptr() as *const u8,
            previous_len: self.previous.len(),
            type_id: TypeId::of::<S>(),
        }
    }

    fn as_any(&self) -> &dyn Any { self }
}
