//! Registration of component types and their hierarchy.
//!
//! The registry assigns each component type a dense [`TypeId`] in
//! registration order and captures everything a pool needs to manage
//! instances of the type without knowing it statically: payload layout,
//! capacity, and monomorphized construct/drop functions.
//!
//! # Registration-order invariant
//!
//! A subtype may only be registered after its parent, so a type's id is
//! always strictly greater than every id it implements. Downstream code
//! relies on this for correctness, not just speed:
//! [`TypeRegistry::type_implements`] short-circuits to `false` whenever
//! `candidate < target`, and polymorphic queries walk `implemented_by` sets
//! that are only complete because ancestors are back-filled at registration.
//!
//! # Thread safety
//!
//! Lookups from a Rust type to its id are lock-free reads through `DashMap`;
//! the info table takes a write lock only while a new type registers. The
//! intended lifecycle is still "register everything during single-threaded
//! startup, read forever after" — a [`World`](crate::ecs::World) snapshots
//! the table at construction and never sees later registrations.

use std::{
    alloc::Layout,
    any::TypeId as StdTypeId,
    ptr::NonNull,
    sync::RwLock,
};

use dashmap::DashMap;
use fixedbitset::FixedBitSet;

use crate::ecs::Component;

/// The most component types one registry will hand out ids for.
///
/// Ids are `u16` and one value is reserved as a niche, mirroring the
/// storage format this engine is modeled on.
pub const MAX_TYPES: usize = u16::MAX as usize - 1;

/// A dense identifier for a registered component type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeId(u16);

impl TypeId {
    /// Construct a new TypeId from a raw value.
    #[inline]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Get the index of this id for use in indexable storage (e.g. Vec, bitset).
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Metadata about a registered component type.
///
/// This is the capability bundle a [`Pool`](crate::ecs::Pool) is built from:
/// the payload layout plus construct/drop functions resolved once at
/// registration, and the transitive hierarchy sets used by polymorphic
/// queries.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// The dense type id.
    id: TypeId,

    /// Diagnostic name (the Rust type path).
    name: &'static str,

    /// The Rust TypeId for runtime type checking of payload access.
    type_id: StdTypeId,

    /// The memory layout of one instance payload.
    layout: Layout,

    /// Fixed maximum number of live instances.
    capacity: u16,

    /// In-place constructor, writes the type's default state.
    construct_fn: unsafe fn(NonNull<u8>),

    /// In-place destructor (a no-op for types that don't need drop).
    drop_fn: unsafe fn(NonNull<u8>),

    /// Every type this one implements, transitively, itself included.
    implements: FixedBitSet,

    /// Every type that implements this one, transitively, itself included.
    /// Maintained as the inverse of `implements` while subtypes register.
    implemented_by: FixedBitSet,
}

impl TypeInfo {
    /// Construct the info record for type `C`.
    fn new<C: Component>(id: TypeId, capacity: u16) -> Self {
        let drop_fn = if std::mem::needs_drop::<C>() {
            Self::drop_impl::<C>
        } else {
            Self::drop_noop
        };
        let mut implements = FixedBitSet::with_capacity(id.index() + 1);
        implements.insert(id.index());
        let mut implemented_by = FixedBitSet::with_capacity(id.index() + 1);
        implemented_by.insert(id.index());
        Self {
            id,
            name: std::any::type_name::<C>(),
            type_id: StdTypeId::of::<C>(),
            layout: Layout::new::<C>(),
            capacity,
            construct_fn: Self::construct_impl::<C>,
            drop_fn,
            implements,
            implemented_by,
        }
    }

    /// Get the dense type id.
    #[inline]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Get the diagnostic type name.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Get the Rust TypeId of the payload.
    #[inline]
    pub fn type_id(&self) -> StdTypeId {
        self.type_id
    }

    /// Get the payload memory layout.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Get the fixed instance capacity.
    #[inline]
    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    /// Get the in-place constructor.
    #[inline]
    pub fn construct(&self) -> unsafe fn(NonNull<u8>) {
        self.construct_fn
    }

    /// Get the in-place destructor.
    #[inline]
    pub fn drop_payload(&self) -> unsafe fn(NonNull<u8>) {
        self.drop_fn
    }

    /// The set of type indices this type implements (itself included).
    #[inline]
    pub fn implements(&self) -> &FixedBitSet {
        &self.implements
    }

    /// The set of type indices implementing this type (itself included).
    #[inline]
    pub fn implemented_by(&self) -> &FixedBitSet {
        &self.implemented_by
    }

    /// Construct implementation: write the default state into the slot.
    unsafe fn construct_impl<C: Component>(ptr: NonNull<u8>) {
        unsafe {
            ptr.as_ptr().cast::<C>().write(C::default());
        }
    }

    /// Drop implementation for types that need drop.
    unsafe fn drop_impl<C>(ptr: NonNull<u8>) {
        unsafe {
            std::ptr::drop_in_place(ptr.as_ptr() as *mut C);
        }
    }

    /// No-op drop for types that don't need drop.
    unsafe fn drop_noop(_ptr: NonNull<u8>) {}
}

/// The registry of component types for one simulation context.
///
/// Create one, register every component type during startup (parents before
/// subtypes), then hand it to each [`World`](crate::ecs::World) you build.
/// There is no global instance; the registry travels explicitly.
pub struct TypeRegistry {
    /// Map from Rust TypeId to dense id. Lock-free reads via sharded concurrent hashmap.
    type_map: DashMap<StdTypeId, TypeId>,

    /// Registered type info, indexed by dense id. Protected by RwLock for rare writes.
    types: RwLock<Vec<TypeInfo>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Create a new empty type registry.
    #[inline]
    pub fn new() -> Self {
        Self {
            type_map: DashMap::new(),
            types: RwLock::new(Vec::new()),
        }
    }

    /// Register `C` as a root component type with the given pool capacity.
    ///
    /// Returns the existing id if `C` is already registered.
    pub fn register<C: Component>(&self, capacity: u16) -> TypeId {
        self.register_inner::<C>(capacity, None)
    }

    /// Register `C` as a subtype of the already-registered `Parent`.
    ///
    /// `C` inherits `Parent`'s full `implements` set and is added to the
    /// `implemented_by` set of every ancestor, keeping both sets transitive
    /// closures without any recursion at query time.
    ///
    /// # Panics
    ///
    /// Panics if `Parent` has not been registered yet; parents always
    /// register before their subtypes.
    pub fn register_subtype<C: Component, Parent: Component>(&self, capacity: u16) -> TypeId {
        let parent = self.get::<Parent>().unwrap_or_else(|| {
            panic!(
                "parent component type '{}' must be registered before its subtype '{}'",
                std::any::type_name::<Parent>(),
                std::any::type_name::<C>(),
            )
        });
        self.register_inner::<C>(capacity, Some(parent))
    }

    fn register_inner<C: Component>(&self, capacity: u16, parent: Option<TypeId>) -> TypeId {
        let std_type_id = StdTypeId::of::<C>();

        // Fast path: check if already registered (lock-free read)
        if let Some(id) = self.type_map.get(&std_type_id) {
            return *id;
        }

        // Slow path: need to register
        // Use entry API to avoid race condition where two threads both miss the cache
        match self.type_map.entry(std_type_id) {
            dashmap::Entry::Occupied(occupied) => *occupied.get(),
            dashmap::Entry::Vacant(vacant) => {
                let mut types = self.types.write().unwrap();
                let index = types.len();
                assert!(
                    index < MAX_TYPES,
                    "component type table overflow: at most {} types can be registered",
                    MAX_TYPES
                );

                let id = TypeId(index as u16);
                let mut info = TypeInfo::new::<C>(id, capacity);

                if let Some(parent) = parent {
                    // The parent's implements set already holds the full
                    // ancestor closure (parent included), so one pass over it
                    // links this type both ways.
                    let ancestors = types[parent.index()].implements.clone();
                    for ancestor in ancestors.ones() {
                        info.implements.insert(ancestor);
                        let up = &mut types[ancestor].implemented_by;
                        up.grow(index + 1);
                        up.insert(index);
                    }
                }

                types.push(info);
                vacant.insert(id);
                id
            }
        }
    }

    /// Get the id for type `C`, if registered.
    #[inline]
    pub fn get<C: Component>(&self) -> Option<TypeId> {
        self.type_map
            .get(&StdTypeId::of::<C>())
            .map(|entry| *entry.value())
    }

    /// Get a clone of the info record for the given id, if registered.
    #[inline]
    pub fn info(&self, id: TypeId) -> Option<TypeInfo> {
        let types = self.types.read().unwrap();
        types.get(id.index()).cloned()
    }

    /// Check whether `candidate` implements `target`.
    ///
    /// Trivially true on equality. Trivially false when
    /// `candidate < target`: a type can only implement types registered
    /// before it, so the id comparison alone settles that case.
    pub fn type_implements(&self, candidate: TypeId, target: TypeId) -> bool {
        if candidate == target {
            return true;
        }
        if candidate < target {
            return false;
        }
        let types = self.types.read().unwrap();
        types
            .get(candidate.index())
            .is_some_and(|info| info.implements.contains(target.index()))
    }

    /// Clone the full type table, indexed by dense id.
    ///
    /// Worlds call this at construction; types registered afterwards are
    /// invisible to them.
    pub fn snapshot(&self) -> Vec<TypeInfo> {
        self.types.read().unwrap().clone()
    }

    /// The number of registered types.
    #[inline]
    pub fn len(&self) -> usize {
        self.types.read().unwrap().len()
    }

    /// Check if the registry is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
