//! Weak references to pooled components, with amortized revalidation.
//!
//! A [`WeakHandle`] names an entry in the [`HandleRegistry`]; the entry
//! remembers which `(type, slot)` it watches and the [`Generation`] it
//! observed at registration. The handle resolves only while the slot is live
//! and still carries that generation — freeing the component bumps the
//! generation and every handle to it goes stale.
//!
//! Rather than scanning every outstanding handle each tick, entries are
//! spread across [`CHECK_FREQUENCY`] buckets by registration order, and each
//! [`sweep`](HandleRegistry::sweep) revalidates exactly one bucket, splicing
//! stale entries out. Every entry is therefore re-checked at least once per
//! `CHECK_FREQUENCY` sweeps — the same width as the 8-bit generation
//! counter, so a stale entry is evicted before the counter can wrap back to
//! a false match.
//!
//! Entries live in a slab with free-list reuse; each carries an epoch that
//! bumps on eviction, so a `WeakHandle` whose entry was recycled can never
//! resolve against the new occupant.

use crate::ecs::{ComponentRef, Generation};

/// Number of buckets the outstanding handles are spread across; every handle
/// is revalidated at least once per this many sweeps.
pub const CHECK_FREQUENCY: usize = 256;

/// A weak reference to a component instance.
///
/// Copyable and inert: holding one keeps nothing alive, and a stale handle
/// is never an error — it simply stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeakHandle {
    /// Index of the registry entry backing this handle.
    entry: u32,

    /// Epoch of the entry when this handle was issued.
    epoch: u32,
}

/// One registered watch on a component.
#[derive(Debug, Clone)]
struct Entry {
    /// The component being watched.
    target: ComponentRef,

    /// The slot generation observed when the watch was registered.
    generation: Generation,

    /// Bumped when the entry is unlinked; stale handles fail the epoch check.
    epoch: u32,

    /// Whether this entry is currently linked into a bucket.
    linked: bool,

    /// The bucket this entry is (or was last) linked into.
    bucket: u16,

    /// Next entry in the bucket chain.
    next: Option<u32>,

    /// Previous entry in the bucket chain.
    previous: Option<u32>,
}

/// The registry of outstanding weak handles for one world.
#[derive(Debug)]
pub struct HandleRegistry {
    /// Entry slab; unlinked entries are recycled through `free`.
    entries: Vec<Entry>,

    /// Indices of unlinked entries available for reuse.
    free: Vec<u32>,

    /// Chain heads, one per bucket.
    buckets: Vec<Option<u32>>,

    /// The bucket the next sweep will visit.
    cursor: usize,

    /// Total registrations ever made; selects the bucket for the next one.
    registered: u64,

    /// Number of currently-linked entries.
    linked: usize,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
            buckets: vec![None; CHECK_FREQUENCY],
            cursor: 0,
            registered: 0,
            linked: 0,
        }
    }

    /// The number of live (linked) entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.linked
    }

    /// Whether no handles are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.linked == 0
    }

    /// Register a watch on `target` at the given observed generation.
    pub fn register(&mut self, target: ComponentRef, generation: Generation) -> WeakHandle {
        let bucket = (self.registered % CHECK_FREQUENCY as u64) as u16;
        self.registered += 1;

        let index = match self.free.pop() {
            Some(index) => {
                let entry = &mut self.entries[index as usize];
                entry.target = target;
                entry.generation = generation;
                entry.linked = true;
                entry.bucket = bucket;
                entry.previous = None;
                index
            }
            None => {
                let index = self.entries.len() as u32;
                self.entries.push(Entry {
                    target,
                    generation,
                    epoch: 0,
                    linked: true,
                    bucket,
                    next: None,
                    previous: None,
                });
                index
            }
        };

        // Push onto the bucket chain head.
        let old_head = self.buckets[bucket as usize].replace(index);
        self.entries[index as usize].next = old_head;
        if let Some(old_head) = old_head {
            self.entries[old_head as usize].previous = Some(index);
        }

        self.linked += 1;
        WeakHandle {
            entry: index,
            epoch: self.entries[index as usize].epoch,
        }
    }

    /// Look up the target and observed generation behind a handle.
    ///
    /// Returns `None` once the entry has been evicted or released.
    pub fn get(&self, handle: WeakHandle) -> Option<(ComponentRef, Generation)> {
        let entry = self.entries.get(handle.entry as usize)?;
        if entry.linked && entry.epoch == handle.epoch {
            Some((entry.target, entry.generation))
        } else {
            None
        }
    }

    /// Explicitly drop a watch. Returns whether the handle was still live.
    pub fn release(&mut self, handle: WeakHandle) -> bool {
        match self.entries.get(handle.entry as usize) {
            Some(entry) if entry.linked && entry.epoch == handle.epoch => {
                self.unlink(handle.entry);
                true
            }
            _ => false,
        }
    }

    /// Revalidate one bucket of handles, advancing the rotating cursor.
    ///
    /// `is_valid` judges each watched `(target, generation)` pair; entries it
    /// rejects are spliced out. Returns the number of evicted entries.
    pub fn sweep(
        &mut self,
        mut is_valid: impl FnMut(ComponentRef, Generation) -> bool,
    ) -> usize {
        let bucket = self.cursor;
        self.cursor = (self.cursor + 1) % CHECK_FREQUENCY;

        let mut evicted = 0;
        let mut current = self.buckets[bucket];
        while let Some(index) = current {
            // Grab the next link before checking; a failed check splices the
            // entry out of the chain.
            let entry = &self.entries[index as usize];
            current = entry.next;
            if !is_valid(entry.target, entry.generation) {
                self.unlink(index);
                evicted += 1;
            }
        }

        evicted
    }

    fn unlink(&mut self, index: u32) {
        let (previous, next, bucket) = {
            let entry = &self.entries[index as usize];
            debug_assert!(entry.linked);
            (entry.previous, entry.next, entry.bucket)
        };

        match previous {
            Some(previous) => self.entries[previous as usize].next = next,
            None => {
                debug_assert_eq!(self.buckets[bucket as usize], Some(index));
                self.buckets[bucket as usize] = next;
            }
        }
        if let Some(next) = next {
            self.entries[next as usize].previous = previous;
        }

        let entry = &mut self.entries[index as usize];
        entry.linked = false;
        entry.next = None;
        entry.previous = None;
        entry.epoch = entry.epoch.wrapping_add(1);
        self.free.push(index);
        self.linked -= 1;
    }
}
