//! # Component Registry
//!
//! Assigns stable `ComponentID` values to Rust component types.
//!
//! ## Design
//! - The registry is an explicit value owned by an [`EntityManager`]; there is
//!   no process-wide table, so two worlds never share or race on ids and no
//!   static initialization order is involved.
//! - Components are registered once and assigned a compact id in
//!   `[0, COMPONENT_CAP)`, in registration order. Registering the same type twice
//!   returns the existing id.
//! - The registry can be frozen after world setup, after which registration
//!   fails instead of silently extending the id space.
//! - [`ComponentSet`] signatures are memoized per tuple type, so building the
//!   signature of a type pack is a pure lookup after its first use.
//!
//! [`EntityManager`]: crate::engine::manager::EntityManager

use std::{
    any::{TypeId, type_name},
    mem::{size_of, align_of},
    collections::HashMap,
};

use parking_lot::RwLock;

use crate::engine::error::{ECSResult, RegistryError};
use crate::engine::types::{ComponentID, Signature, COMPONENT_CAP};


/// Marker for types that can be stored as components.
///
/// Blanket-implemented for every `'static + Send + Sync` type.
pub trait Component: 'static + Send + Sync {}

impl<T: 'static + Send + Sync> Component for T {}

/// Describes a registered component type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ComponentDesc {
    /// Runtime identifier assigned to this component type.
    pub component_id: ComponentID,

    /// Rust type name for diagnostics.
    pub name: &'static str,

    /// Runtime `TypeId` of the component.
    pub type_id: TypeId,

    /// Size of the component type in bytes.
    pub size: usize,

    /// Alignment of the component type in bytes.
    pub align: usize,

    /// Whether entity cloning may copy this component.
    pub cloneable: bool,
}

impl ComponentDesc {
    /// Constructs a descriptor for type `T` with the given id.
    #[inline]
    pub fn of<T: 'static>(component_id: ComponentID, cloneable: bool) -> Self {
        Self {
            component_id,
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
            cloneable,
        }
    }

    /// Returns `true` if this descriptor refers to type `T`.
    #[inline]
    pub fn matches_type<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl std::fmt::Display for ComponentDesc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ComponentDesc {{ id: {}, name: {}, size: {}, align: {} }}",
            self.component_id, self.name, self.size, self.align
        )
    }
}

/// Mapping between Rust component types and compact `ComponentID` values.
///
/// ## Invariants
/// - Every entry in `by_type` has a matching `by_id[id]`.
/// - `by_id.len()` equals the number of registered types and never exceeds
///   `COMPONENT_CAP`.
#[derive(Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentID>,
    by_id: Vec<ComponentDesc>,
    signatures: RwLock<HashMap<TypeId, Signature>>,
    frozen: bool,
}

impl ComponentRegistry {
    /// Creates an empty, unfrozen registry.
    pub fn new() -> Self { Self::default() }

    /// Registers component type `T` and returns its assigned `ComponentID`.
    ///
    /// Returns the existing id when `T` is already registered, even if the
    /// registry is frozen.
    pub(crate) fn register<T: Component>(&mut self, cloneable: bool) -> ECSResult<(ComponentID, bool)> {
        let type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&type_id) {
            return Ok((existing, false));
        }
        if self.frozen {
            return Err(RegistryError::Frozen { name: type_name::<T>() }.into());
        }
        if self.by_id.len() >= COMPONENT_CAP {
            return Err(RegistryError::CapacityExceeded { capacity: COMPONENT_CAP }.into());
        }

        let id = self.by_id.len() as ComponentID;
        self.by_type.insert(type_id, id);
        self.by_id.push(ComponentDesc::of::<T>(id, cloneable));
        Ok((id, true))
    }

    /// Freezes the registry, preventing further component registrations.
    pub fn freeze(&mut self) { self.frozen = true; }

    /// Returns `true` if the registry has been frozen.
    pub fn is_frozen(&self) -> bool { self.frozen }

    /// Number of registered component types.
    pub fn len(&self) -> usize { self.by_id.len() }

    /// Returns `true` if nothing has been registered.
    pub fn is_empty(&self) -> bool { self.by_id.is_empty() }

    /// Returns the `ComponentID` associated with a `TypeId`, if registered.
    pub fn component_id_of_type_id(&self, type_id: TypeId) -> Option<ComponentID> {
        self.by_type.get(&type_id).copied()
    }

    /// Returns the `ComponentID` for `T`.
    pub fn id_of<T: 'static>(&self) -> ECSResult<ComponentID> {
        self.component_id_of_type_id(TypeId::of::<T>())
            .ok_or_else(|| RegistryError::NotRegistered { name: type_name::<T>() }.into())
    }

    /// Returns the component descriptor for a `ComponentID`, if registered.
    pub fn description(&self, component_id: ComponentID) -> Option<&ComponentDesc> {
        self.by_id.get(component_id as usize)
    }

    /// Iterates over all registered descriptors in id order.
    pub fn descriptions(&self) -> impl Iterator<Item = &ComponentDesc> {
        self.by_id.iter()
    }

    /// Returns the signature of a component type pack.
    ///
    /// The first call for a given `S` resolves every member id; later calls
    /// return the memoized value.
    pub fn signature_of<S: ComponentSet>(&self) -> ECSResult<Signature> {
        let key = TypeId::of::<S>();
        if let Some(signature) = self.signatures.read().get(&key) {
            return Ok(*signature);
        }

        let mut signature = Signature::default();
        for component_id in S::component_ids(self)? {
            signature.set(component_id);
        }
        self.signatures.write().insert(key, signature);
        Ok(signature)
    }
}

/// A compile-time pack of component types.
///
/// Implemented for tuples of one to eight components, e.g. `(Position,)` or
/// `(Render, Size)`.
pub trait ComponentSet: 'static {
    /// Resolves the ids of every member, in declaration order.
    fn component_ids(registry: &ComponentRegistry) -> ECSResult<Vec<ComponentID>>;
}

macro_rules! impl_component_set {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn component_ids(registry: &ComponentRegistry) -> ECSResult<Vec<ComponentID>> {
                Ok(vec![$(registry.id_of::<$name>()?),+])
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);
impl_component_set!(A, B, C, D, E);
impl_component_set!(A, B, C, D, E, F);
impl_component_set!(A, B, C, D, E, F, G);
impl_component_set!(A, B, C, D, E, F, G, H);
