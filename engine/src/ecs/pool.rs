//! Fixed-capacity, type-erased storage for one component type.
//!
//! A pool owns three parallel structures sized at creation and never
//! reallocated:
//!
//! - the **arena**: `capacity` payload slots of the registered layout,
//!   contiguous in one allocation;
//! - the **headers**: per-slot bookkeeping (owner, chain links, roster
//!   position, generation, pending-destroy flag);
//! - the **roster**: a permutation of `[0, capacity)` whose first
//!   `free_cursor` entries name the live slots in allocation order.
//!
//! Allocation takes the slot named at the roster's free boundary; freeing
//! swaps the dying slot's roster entry with the last live entry, so both
//! operations are O(1) and no live slot ever moves. External code addresses
//! an instance by `(type, slot)`, which stays valid across unrelated frees.
//!
//! Each free bumps the slot's wrapping [`Generation`], invalidating every
//! outstanding [`WeakHandle`](crate::ecs::WeakHandle) that observed the old
//! value. The generation deliberately carries over into the next occupant of
//! the slot — resetting it would resurrect stale handles.

use std::{
    alloc::{self, Layout},
    any::TypeId as StdTypeId,
    fmt,
    ptr::NonNull,
};

use log::{debug, warn};

use crate::ecs::{Component, Host, TypeId, TypeInfo};

/// Per-slot wrapping allocation counter.
///
/// Eight bits wide: the weak-handle registry re-checks every handle at least
/// once per [`CHECK_FREQUENCY`](crate::ecs::handle::CHECK_FREQUENCY) sweeps,
/// which matches this width so a stale handle is evicted before the counter
/// can wrap all the way around to a false match.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(u8);

impl Generation {
    /// Get the next generation from the current, wrapping at the type width.
    #[inline]
    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Get the raw counter value.
    #[inline]
    pub fn value(&self) -> u8 {
        self.0
    }
}

/// Failure to allocate a component instance.
///
/// Exhaustion is an expected condition a caller may handle (a full world is
/// a design decision, not a crash); the pool additionally logs a warning so
/// undersized capacities surface during development.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Every slot in the pool is live.
    PoolExhausted {
        /// The component type that ran out of instances.
        type_name: &'static str,
        /// The pool's fixed capacity.
        capacity: u16,
    },
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolExhausted {
                type_name,
                capacity,
            } => write!(
                f,
                "no free instances of component type '{}' (capacity {})",
                type_name, capacity
            ),
        }
    }
}

impl std::error::Error for AllocError {}

/// Per-slot bookkeeping kept parallel to the payload arena.
#[derive(Debug, Clone)]
pub(crate) struct Header {
    /// The host this instance is attached to, if allocated.
    pub(crate) owner: Option<Host>,

    /// Next slot in the owner's same-type chain.
    pub(crate) next: Option<u16>,

    /// Previous slot in the owner's same-type chain.
    pub(crate) previous: Option<u16>,

    /// This slot's current position within the roster.
    pub(crate) roster_slot: u16,

    /// Bumped on every free; stale weak handles fail to match it.
    pub(crate) generation: Generation,

    /// Set while the instance is queued for deferred destruction.
    pub(crate) pending_destroy: bool,
}

/// Fixed-capacity storage for every instance of one component type.
pub struct Pool {
    /// The type this pool stores.
    info: TypeInfo,

    /// Byte distance between consecutive payload slots.
    stride: usize,

    /// Base of the payload arena. Dangling when the arena is zero-sized.
    base: NonNull<u8>,

    /// Per-slot headers, parallel to the arena.
    headers: Vec<Header>,

    /// Permutation of `[0, capacity)`; live slots form the prefix.
    roster: Vec<u16>,

    /// Count of currently-live instances.
    free_cursor: u16,
}

impl Pool {
    /// Create the pool for a registered type, pre-allocating its arena and
    /// initializing every header to a benign empty state.
    pub fn new(info: &TypeInfo) -> Self {
        let capacity = info.capacity() as usize;
        let element = info.layout().pad_to_align();
        let stride = element.size();

        let base = if stride * capacity > 0 {
            let arena = Layout::from_size_align(stride * capacity, element.align())
                .expect("component arena layout overflow");
            // SAFETY: arena has non-zero size, checked above.
            let ptr = unsafe { alloc::alloc(arena) };
            let Some(ptr) = NonNull::new(ptr) else {
                alloc::handle_alloc_error(arena)
            };
            ptr
        } else {
            // Zero-sized payloads (marker components) or zero capacity need
            // no arena; a dangling, well-aligned base serves every slot.
            NonNull::new(element.align() as *mut u8).expect("alignment is never zero")
        };

        let headers = (0..capacity)
            .map(|i| Header {
                owner: None,
                next: None,
                previous: None,
                roster_slot: i as u16,
                generation: Generation::default(),
                pending_destroy: false,
            })
            .collect();

        debug!(
            "created pool for '{}': {} slots, {} bytes each",
            info.name(),
            capacity,
            stride
        );

        Self {
            info: info.clone(),
            stride,
            base,
            headers,
            roster: (0..capacity as u16).collect(),
            free_cursor: 0,
        }
    }

    /// The type this pool stores.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.info.id()
    }

    /// The diagnostic name of the stored type.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.info.name()
    }

    /// The fixed slot capacity.
    #[inline]
    pub fn capacity(&self) -> u16 {
        self.info.capacity()
    }

    /// The number of currently-live instances.
    #[inline]
    pub fn live_count(&self) -> u16 {
        self.free_cursor
    }

    /// The live slots, in allocation order.
    #[inline]
    pub fn live_slots(&self) -> &[u16] {
        &self.roster[..self.free_cursor as usize]
    }

    /// Whether the given slot currently holds a live instance.
    #[inline]
    pub fn is_allocated(&self, slot: u16) -> bool {
        let header = &self.headers[slot as usize];
        header.roster_slot < self.free_cursor && self.roster[header.roster_slot as usize] == slot
    }

    /// The current generation of the given slot.
    #[inline]
    pub fn generation(&self, slot: u16) -> Generation {
        self.headers[slot as usize].generation
    }

    /// The host the instance in the given slot is attached to.
    #[inline]
    pub fn owner(&self, slot: u16) -> Option<Host> {
        self.headers[slot as usize].owner
    }

    /// Whether the instance in the given slot is queued for deferred destruction.
    #[inline]
    pub fn is_pending_destroy(&self, slot: u16) -> bool {
        self.headers[slot as usize].pending_destroy
    }

    /// The next slot in the given slot's chain, if any.
    #[inline]
    pub(crate) fn next_in_chain(&self, slot: u16) -> Option<u16> {
        self.headers[slot as usize].next
    }

    #[inline]
    pub(crate) fn header(&self, slot: u16) -> &Header {
        &self.headers[slot as usize]
    }

    #[inline]
    pub(crate) fn header_mut(&mut self, slot: u16) -> &mut Header {
        &mut self.headers[slot as usize]
    }

    /// Allocate an instance for the given owner.
    ///
    /// The new instance's slot comes from the roster's free boundary; its
    /// generation carries over from the slot's previous occupant. The payload
    /// is constructed in place with the type's default state. Chain insertion
    /// is the caller's responsibility.
    pub fn allocate(&mut self, owner: Host) -> Result<u16, AllocError> {
        if self.free_cursor == self.capacity() {
            warn!(
                "could not allocate component of type '{}' for host {}: no free instances (capacity {})",
                self.name(),
                owner.index(),
                self.capacity()
            );
            return Err(AllocError::PoolExhausted {
                type_name: self.name(),
                capacity: self.capacity(),
            });
        }

        let slot = self.roster[self.free_cursor as usize];
        self.free_cursor += 1;

        let header = &mut self.headers[slot as usize];
        header.owner = Some(owner);
        header.next = None;
        header.previous = None;
        header.roster_slot = self.free_cursor - 1;
        header.pending_destroy = false;

        // SAFETY: the slot is within capacity and its payload memory is
        // unoccupied (either never constructed or destructed by `free`).
        unsafe { (self.info.construct())(self.payload_ptr(slot)) };

        Ok(slot)
    }

    /// Release the instance in the given slot back to the pool.
    ///
    /// The payload is destructed, the generation bumped, and the slot's
    /// roster entry swapped with the last live entry. The instance must
    /// already be spliced out of its chain.
    pub fn free(&mut self, slot: u16) {
        debug_assert!(self.is_allocated(slot), "freeing a slot that is not live");
        debug_assert!(
            self.headers[slot as usize].next.is_none()
                && self.headers[slot as usize].previous.is_none(),
            "freeing a component that is still linked into a chain"
        );

        // SAFETY: the slot is live, so its payload was constructed and not
        // yet destructed.
        unsafe { (self.info.drop_payload())(self.payload_ptr(slot)) };

        let header = &mut self.headers[slot as usize];
        header.generation = header.generation.next();
        header.owner = None;
        header.pending_destroy = false;
        let used = header.roster_slot;

        self.free_cursor -= 1;
        let last = self.free_cursor;

        if used != last {
            // Swap the dying entry with the last live entry, then patch the
            // roster positions recorded by both affected slots.
            self.roster.swap(used as usize, last as usize);
            let moved = self.roster[used as usize];
            self.headers[moved as usize].roster_slot = used;
            self.headers[slot as usize].roster_slot = last;
        }
    }

    /// Borrow the payload in the given slot as `C`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is not live, or (in debug builds) if `C` is not
    /// the stored type.
    #[inline]
    pub fn get<C: Component>(&self, slot: u16) -> &C {
        assert!(self.is_allocated(slot), "component slot is not live");
        self.ensure_type::<C>();
        // SAFETY: the slot is live so the payload is initialized, and the
        // type was verified against the registered payload type.
        unsafe { &*self.payload_ptr(slot).as_ptr().cast::<C>() }
    }

    /// Mutably borrow the payload in the given slot as `C`.
    ///
    /// # Panics
    ///
    /// Panics if the slot is not live, or (in debug builds) if `C` is not
    /// the stored type.
    #[inline]
    pub fn get_mut<C: Component>(&mut self, slot: u16) -> &mut C {
        assert!(self.is_allocated(slot), "component slot is not live");
        self.ensure_type::<C>();
        // SAFETY: as in `get`, plus the &mut receiver gives exclusivity.
        unsafe { &mut *self.payload_ptr(slot).as_ptr().cast::<C>() }
    }

    #[inline]
    fn ensure_type<C: Component>(&self) {
        debug_assert_eq!(
            StdTypeId::of::<C>(),
            self.info.type_id(),
            "payload type mismatch: pool stores '{}'",
            self.info.name()
        );
    }

    #[inline]
    fn payload_ptr(&self, slot: u16) -> NonNull<u8> {
        debug_assert!((slot as usize) < self.headers.len());
        // SAFETY: slot is within the arena allocated for `capacity` elements
        // of `stride` bytes; for zero-sized payloads the stride is zero and
        // the dangling base is returned unchanged.
        unsafe { self.base.add(slot as usize * self.stride) }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if self.free_cursor > 0 {
            warn!(
                "found {} components of type '{}' still allocated during pool teardown",
                self.free_cursor,
                self.name()
            );
        }

        // Destruct every still-live payload before the arena goes away.
        for i in 0..self.free_cursor as usize {
            let slot = self.roster[i];
            // SAFETY: roster prefix entries are live, hence initialized.
            unsafe { (self.info.drop_payload())(self.payload_ptr(slot)) };
        }

        let capacity = self.capacity() as usize;
        if self.stride * capacity > 0 {
            let element = self.info.layout().pad_to_align();
            let arena = Layout::from_size_align(self.stride * capacity, element.align())
                .expect("component arena layout overflow");
            // SAFETY: `base` was allocated in `new` with this exact layout.
            unsafe { alloc::dealloc(self.base.as_ptr(), arena) };
        }
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("type", &self.name())
            .field("capacity", &self.capacity())
            .field("live", &self.free_cursor)
            .finish()
    }
}
