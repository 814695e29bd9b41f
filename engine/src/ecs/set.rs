//! Per-host bookkeeping of attached components.
//!
//! A host owns one [`ComponentSet`]: a map from component type to the head of
//! an index-linked chain threaded through the pool's slot headers. The map
//! holds an entry for a type exactly when at least one live component of that
//! type is attached — an empty chain never leaves a key behind.
//!
//! Attach prepends (the newest component becomes the chain head); detach
//! splices a slot out of wherever it sits, patching the head entry when the
//! head itself dies. Chain membership is completely independent of roster
//! position, so pool compaction never disturbs a chain.

use std::collections::HashMap;

use crate::ecs::{Pool, TypeId};

/// The set of components attached to one host, grouped by type into chains.
#[derive(Debug, Default)]
pub struct ComponentSet {
    /// Chain heads by component type. An entry exists iff its chain is non-empty.
    heads: HashMap<TypeId, u16>,
}

impl ComponentSet {
    /// Create an empty set.
    #[inline]
    pub fn new() -> Self {
        Self {
            heads: HashMap::new(),
        }
    }

    /// The head slot of the chain for the given type, if any component of
    /// that exact type is attached.
    #[inline]
    pub fn first(&self, type_id: TypeId) -> Option<u16> {
        self.heads.get(&type_id).copied()
    }

    /// The component types currently present in this set.
    #[inline]
    pub fn types(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.heads.keys().copied()
    }

    /// Whether no components are attached.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    /// Any one (type, head slot) pair, or `None` when the set is empty.
    ///
    /// Removal loops use this to re-fetch the current head after each
    /// mutation instead of caching an iteration end.
    #[inline]
    pub(crate) fn any_head(&self) -> Option<(TypeId, u16)> {
        self.heads.iter().next().map(|(&t, &s)| (t, s))
    }

    /// Prepend a freshly-allocated slot to its type's chain.
    ///
    /// The slot's links must be clear (as `Pool::allocate` leaves them).
    pub(crate) fn attach_head(&mut self, pool: &mut Pool, slot: u16) {
        let type_id = pool.type_id();
        debug_assert!(pool.header(slot).next.is_none() && pool.header(slot).previous.is_none());

        if let Some(old_head) = self.heads.insert(type_id, slot) {
            pool.header_mut(slot).next = Some(old_head);
            pool.header_mut(old_head).previous = Some(slot);
        }
    }

    /// Splice a slot out of its type's chain, clearing its links.
    pub(crate) fn detach(&mut self, pool: &mut Pool, slot: u16) {
        let type_id = pool.type_id();
        let (previous, next) = {
            let header = pool.header(slot);
            (header.previous, header.next)
        };

        match previous {
            Some(previous) => pool.header_mut(previous).next = next,
            None => {
                // The slot was the chain head; the map entry follows the
                // survivor or disappears with the chain.
                debug_assert_eq!(self.heads.get(&type_id), Some(&slot));
                match next {
                    Some(next) => {
                        self.heads.insert(type_id, next);
                    }
                    None => {
                        self.heads.remove(&type_id);
                    }
                }
            }
        }

        if let Some(next) = next {
            pool.header_mut(next).previous = previous;
        }

        let header = pool.header_mut(slot);
        header.next = None;
        header.previous = None;
    }
}

/// Iterator over the slots of one chain, head first.
pub(crate) struct ChainIter<'a> {
    pool: &'a Pool,
    cursor: Option<u16>,
}

impl<'a> ChainIter<'a> {
    #[inline]
    pub(crate) fn new(pool: &'a Pool, head: Option<u16>) -> Self {
        Self { pool, cursor: head }
    }
}

impl Iterator for ChainIter<'_> {
    type Item = u16;

    fn next(&mut self) -> Option<u16> {
        let slot = self.cursor?;
        self.cursor = self.pool.next_in_chain(slot);
        Some(slot)
    }
}
