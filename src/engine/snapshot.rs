//! Boundary to the save/load subsystem.
//!
//! A component pool serializes as two flat arrays: the dense values and the id
//! of the entity owning each value. The save-file layout around them belongs to
//! the caller; any serde format can carry a [`PoolSnapshot`].
//!
//! Restoring a snapshot rebuilds the pool's sparse index from the owner array,
//! so the dense/sparse invariant holds again regardless of the order the values
//! were written in.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::engine::error::{ECSError, ECSResult};
use crate::engine::types::EntityID;


/// Flat image of one component pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot<T> {
    /// `owners[i]` owns `components[i]`.
    pub owners: Vec<EntityID>,
    /// Dense component values.
    pub components: Vec<T>,
}

impl<T> PoolSnapshot<T> {
    /// Number of stored values.
    pub fn len(&self) -> usize { self.components.len() }

    /// Returns `true` if the snapshot holds no values.
    pub fn is_empty(&self) -> bool { self.components.is_empty() }

    /// Checks shape: equal array lengths and no duplicate owners.
    pub fn validate(&self) -> ECSResult<()> {
        if self.owners.len() != self.components.len() {
            return Err(ECSError::Snapshot(format!(
                "{} owners for {} components",
                self.owners.len(),
                self.components.len()
            )));
        }
        let mut seen = HashSet::with_capacity(self.owners.len());
        for &owner in &self.owners {
            if !seen.insert(owner) {
                return Err(ECSError::Snapshot(format!("entity {owner} owns two values")));
            }
        }
        Ok(())
    }
}
