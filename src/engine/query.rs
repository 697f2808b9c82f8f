//! Signature queries.
//!
//! An [`EntityQuery`] is a `(required, excluded, any-of groups)` triple over
//! component signatures. [`EntityQuery::check`] is the single admission test
//! used by ad-hoc iteration, group resolution and job dispatch.
//!
//! ## Evaluation order
//! 1. every any-of group must share at least one bit with the signature,
//! 2. every required bit must be set,
//! 3. no excluded bit may be set.
//!
//! Evaluation stops at the first failing condition.
//!
//! ## Example
//! ```ignore
//! let query = world.query()
//!     .with::<Render>()?
//!     .without::<Hidden>()?
//!     .any_of::<(Sprite, Text)>()?
//!     .build();
//! ```

use crate::engine::component::{Component, ComponentRegistry, ComponentSet};
use crate::engine::error::ECSResult;
use crate::engine::types::{ComponentID, Signature};


/// Admission predicate over entity signatures.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct EntityQuery {
    /// Components that must all be present.
    pub required: Signature,
    /// Components that must all be absent.
    pub excluded: Signature,
    /// Groups of which at least one member must be present, per group.
    pub any_of: Vec<Signature>,
}

impl EntityQuery {
    /// Query matching every signature.
    pub fn all() -> Self { Self::default() }

    /// Query requiring exactly the components of `required`.
    pub fn requiring(required: Signature) -> Self {
        Self { required, ..Self::default() }
    }

    /// Returns `true` if `signature` satisfies the query.
    #[inline]
    pub fn check(&self, signature: &Signature) -> bool {
        for group in &self.any_of {
            if !signature.intersects(group) {
                return false;
            }
        }
        if !signature.contains_all(&self.required) {
            return false;
        }
        !signature.intersects(&self.excluded)
    }

    /// Adds a required component id.
    pub fn require(&mut self, component_id: ComponentID) { self.required.set(component_id); }

    /// Adds an excluded component id.
    pub fn exclude(&mut self, component_id: ComponentID) { self.excluded.set(component_id); }
}

/// Builder resolving component types to a query through a registry.
pub struct QueryBuilder<'r> {
    registry: &'r ComponentRegistry,
    query: EntityQuery,
}

impl<'r> QueryBuilder<'r> {
    /// Creates a builder with an empty query.
    pub fn new(registry: &'r ComponentRegistry) -> Self {
        Self { registry, query: EntityQuery::default() }
    }

    /// Requires component `T`.
    pub fn with<T: Component>(mut self) -> ECSResult<Self> {
        self.query.required.set(self.registry.id_of::<T>()?);
        Ok(self)
    }

    /// Requires every component of the pack `S`.
    pub fn with_all<S: ComponentSet>(mut self) -> ECSResult<Self> {
        let signature = self.registry.signature_of::<S>()?;
        self.query.required = self.query.required.union(&signature);
        Ok(self)
    }

    /// Excludes component `T`.
    pub fn without<T: Component>(mut self) -> ECSResult<Self> {
        self.query.excluded.set(self.registry.id_of::<T>()?);
        Ok(self)
    }

    /// Adds a logical-OR group: at least one member of `S` must be present.
    pub fn any_of<S: ComponentSet>(mut self) -> ECSResult<Self> {
        let signature = self.registry.signature_of::<S>()?;
        self.query.any_of.push(signature);
        Ok(self)
    }

    /// Finishes the query.
    pub fn build(self) -> EntityQuery { self.query }
}
