//! The world: hosts, pools, queries, and the per-tick maintenance pass.
//!
//! A world snapshots a [`TypeRegistry`] at construction and builds one
//! [`Pool`] per registered type. Hosts are created and destroyed through the
//! world and own nothing but a [`ComponentSet`]; all component storage lives
//! in the pools.
//!
//! # Deferred destruction
//!
//! [`mark_for_destroy`](World::mark_for_destroy) is a two-phase free: the
//! component is spliced out of its owner's chain immediately — queries stop
//! seeing it — but its slot, payload, and generation survive until
//! [`flush_destroys`](World::flush_destroys) runs, so in-flight iteration
//! and outstanding weak handles observe "just removed" rather than recycled
//! memory.
//!
//! # Tick contract
//!
//! [`tick`](World::tick) first flushes the deferred-destroy queue, then
//! sweeps one weak-handle bucket. The order is a contract, not an accident:
//! flushing first bumps the generations of everything that died this tick,
//! so the same tick's sweep can already evict handles to them.

use std::sync::Arc;

use crossbeam::queue::SegQueue;
use log::debug;

use crate::ecs::{
    AllocError, Component, ComponentRef, ComponentSet, HandleRegistry, Host, Pool, TypeId,
    TypeInfo, TypeRegistry, WeakHandle,
    set::ChainIter,
};

/// A simulation world: component pools plus the hosts they attach to.
pub struct World {
    /// The type table this world was built against.
    types: Vec<TypeInfo>,

    /// One pool per registered type, indexed by dense type id.
    pools: Vec<Pool>,

    /// Component sets by host index; `None` marks a retired host slot.
    hosts: Vec<Option<ComponentSet>>,

    /// Retired host indices available for reuse.
    free_hosts: Vec<u32>,

    /// Outstanding weak handles.
    handles: HandleRegistry,

    /// Components marked for destruction, awaiting the flush.
    pending: SegQueue<ComponentRef>,

    /// The shared registry, kept for Rust-type to id resolution.
    registry: Arc<TypeRegistry>,
}

impl World {
    /// Build a world over every type registered so far.
    ///
    /// Registration must be complete before worlds are created; types
    /// registered later are invisible to this world.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        let types = registry.snapshot();
        let pools = types.iter().map(Pool::new).collect::<Vec<_>>();
        debug!("created world with {} component pools", pools.len());
        Self {
            types,
            pools,
            hosts: Vec::new(),
            free_hosts: Vec::new(),
            handles: HandleRegistry::new(),
            pending: SegQueue::new(),
            registry,
        }
    }

    /// The registry this world resolves component types through.
    #[inline]
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    // ---- hosts ----------------------------------------------------------

    /// Create a new host with an empty component set.
    pub fn create_host(&mut self) -> Host {
        match self.free_hosts.pop() {
            Some(index) => {
                self.hosts[index as usize] = Some(ComponentSet::new());
                Host::new(index)
            }
            None => {
                let index = self.hosts.len() as u32;
                self.hosts.push(Some(ComponentSet::new()));
                Host::new(index)
            }
        }
    }

    /// Destroy a host: every attached component is marked for deferred
    /// destruction and the host id is retired for reuse.
    pub fn destroy_host(&mut self, host: Host) {
        self.remove_all(host);
        self.hosts[host.index()] = None;
        self.free_hosts.push(host.index() as u32);
    }

    /// Whether the given host id currently names a live host.
    #[inline]
    pub fn host_is_alive(&self, host: Host) -> bool {
        matches!(self.hosts.get(host.index()), Some(Some(_)))
    }

    // ---- attachment and release -----------------------------------------

    /// Attach a new `C` (in its default state) to the host.
    ///
    /// The instance is prepended to the host's chain for the type; mutate it
    /// through [`get_mut`](Self::get_mut) afterwards. Exhaustion of the
    /// type's pool is returned, not thrown — a full pool is the designer's
    /// call to handle.
    pub fn attach<C: Component>(&mut self, host: Host) -> Result<ComponentRef, AllocError> {
        let type_id = self.type_of::<C>();
        self.attach_by_id(host, type_id)
    }

    /// Attach a new instance of the given registered type to the host.
    pub fn attach_by_id(&mut self, host: Host, type_id: TypeId) -> Result<ComponentRef, AllocError> {
        let pool = &mut self.pools[type_id.index()];
        let set = self.hosts[host.index()]
            .as_mut()
            .expect("host is not alive");

        let slot = pool.allocate(host)?;
        set.attach_head(pool, slot);
        Ok(ComponentRef::new(type_id, slot))
    }

    /// Free a component immediately: detach it from its owner's chain and
    /// return its slot to the pool, bumping the generation.
    pub fn free(&mut self, component: ComponentRef) {
        let pool = &mut self.pools[component.type_id().index()];
        assert!(
            pool.is_allocated(component.slot()),
            "freeing a component that is not live"
        );

        // A component already marked for destroy was detached when it was
        // marked; detaching again would corrupt the chain it is no longer in.
        if !pool.is_pending_destroy(component.slot())
            && let Some(owner) = pool.owner(component.slot())
        {
            let set = self.hosts[owner.index()]
                .as_mut()
                .expect("component owner is not alive");
            set.detach(pool, component.slot());
        }

        pool.free(component.slot());
    }

    /// Mark a component for deferred destruction.
    ///
    /// The component leaves its owner's chain immediately, so queries no
    /// longer see it, but the slot is only recycled by the next
    /// [`flush_destroys`](Self::flush_destroys). Marking twice is a no-op.
    pub fn mark_for_destroy(&mut self, component: ComponentRef) {
        let pool = &mut self.pools[component.type_id().index()];
        assert!(
            pool.is_allocated(component.slot()),
            "marking a component that is not live"
        );
        if pool.is_pending_destroy(component.slot()) {
            return;
        }

        pool.header_mut(component.slot()).pending_destroy = true;
        if let Some(owner) = pool.owner(component.slot()) {
            let set = self.hosts[owner.index()]
                .as_mut()
                .expect("component owner is not alive");
            set.detach(pool, component.slot());
        }
        self.pending.push(component);
    }

    /// Whether a live component is queued for deferred destruction.
    pub fn is_marked_for_destroy(&self, component: ComponentRef) -> bool {
        let pool = &self.pools[component.type_id().index()];
        pool.is_allocated(component.slot()) && pool.is_pending_destroy(component.slot())
    }

    /// Release every component marked for destruction since the last flush.
    pub fn flush_destroys(&mut self) {
        while let Some(component) = self.pending.pop() {
            let pool = &mut self.pools[component.type_id().index()];
            // Skip entries resolved in the meantime by a direct `free` (which
            // clears the pending flag, even if the slot was since reused).
            if pool.is_allocated(component.slot()) && pool.is_pending_destroy(component.slot()) {
                pool.free(component.slot());
            }
        }
    }

    /// Mark every component attached to the host for deferred destruction.
    ///
    /// Each mark rewrites the chain head, so the loop re-fetches the current
    /// head from the set every step rather than caching an end.
    pub fn remove_all(&mut self, host: Host) {
        loop {
            let Some((type_id, slot)) = self.hosts[host.index()]
                .as_ref()
                .and_then(|set| set.any_head())
            else {
                break;
            };
            self.mark_for_destroy(ComponentRef::new(type_id, slot));
        }
    }

    /// Run one maintenance pass: flush deferred destroys, then sweep one
    /// weak-handle bucket (in that order — see the module docs).
    pub fn tick(&mut self) {
        self.flush_destroys();

        let pools = &self.pools;
        self.handles.sweep(|target, generation| {
            let pool = &pools[target.type_id().index()];
            pool.is_allocated(target.slot()) && pool.generation(target.slot()) == generation
        });
    }

    // ---- access ---------------------------------------------------------

    /// Borrow a live component's payload.
    #[inline]
    pub fn get<C: Component>(&self, component: ComponentRef) -> &C {
        self.pools[component.type_id().index()].get::<C>(component.slot())
    }

    /// Mutably borrow a live component's payload.
    #[inline]
    pub fn get_mut<C: Component>(&mut self, component: ComponentRef) -> &mut C {
        self.pools[component.type_id().index()].get_mut::<C>(component.slot())
    }

    /// The host a live component is attached to.
    #[inline]
    pub fn owner(&self, component: ComponentRef) -> Option<Host> {
        self.pools[component.type_id().index()].owner(component.slot())
    }

    // ---- weak handles ---------------------------------------------------

    /// Register a weak handle on a live component.
    pub fn watch(&mut self, component: ComponentRef) -> WeakHandle {
        let pool = &self.pools[component.type_id().index()];
        assert!(
            pool.is_allocated(component.slot()),
            "watching a component that is not live"
        );
        self.handles
            .register(component, pool.generation(component.slot()))
    }

    /// Resolve a weak handle to the component payload, if still valid.
    pub fn resolve<C: Component>(&self, handle: WeakHandle) -> Option<&C> {
        let (target, generation) = self.handles.get(handle)?;
        let pool = &self.pools[target.type_id().index()];
        if pool.is_allocated(target.slot()) && pool.generation(target.slot()) == generation {
            Some(pool.get::<C>(target.slot()))
        } else {
            None
        }
    }

    /// Whether a weak handle still points at its original component.
    pub fn is_valid(&self, handle: WeakHandle) -> bool {
        match self.handles.get(handle) {
            Some((target, generation)) => {
                let pool = &self.pools[target.type_id().index()];
                pool.is_allocated(target.slot()) && pool.generation(target.slot()) == generation
            }
            None => false,
        }
    }

    /// Explicitly drop a weak handle's registration.
    pub fn release(&mut self, handle: WeakHandle) -> bool {
        self.handles.release(handle)
    }

    /// The number of outstanding registered weak handles.
    #[inline]
    pub fn watch_count(&self) -> usize {
        self.handles.len()
    }

    // ---- queries --------------------------------------------------------

    /// The first component of exactly type `C` attached to the host.
    pub fn find_first<C: Component>(&self, host: Host) -> Option<ComponentRef> {
        let type_id = self.type_of::<C>();
        let set = self.hosts[host.index()].as_ref()?;
        set.first(type_id)
            .map(|slot| ComponentRef::new(type_id, slot))
    }

    /// The first component attached to the host whose type implements `C`.
    ///
    /// Which descendant type wins when several are attached is unspecified;
    /// callers must not depend on it.
    pub fn find_first_implementing<C: Component>(&self, host: Host) -> Option<ComponentRef> {
        let type_id = self.type_of::<C>();
        let set = self.hosts[host.index()].as_ref()?;
        for candidate in self.types[type_id.index()].implemented_by().ones() {
            let candidate = TypeId::new(candidate as u16);
            if let Some(slot) = set.first(candidate) {
                return Some(ComponentRef::new(candidate, slot));
            }
        }
        None
    }

    /// Collect every component of exactly type `C` attached to the host.
    pub fn find_all<C: Component>(&self, host: Host, sink: &mut Vec<ComponentRef>) {
        let type_id = self.type_of::<C>();
        sink.reserve(self.pools[type_id.index()].live_count() as usize);
        self.collect_chain(host, type_id, sink);
    }

    /// Collect every component attached to the host whose type implements `C`.
    pub fn find_all_implementing<C: Component>(&self, host: Host, sink: &mut Vec<ComponentRef>) {
        let type_id = self.type_of::<C>();
        sink.reserve(self.count_allocated_implementing::<C>());
        for candidate in self.types[type_id.index()].implemented_by().ones() {
            self.collect_chain(host, TypeId::new(candidate as u16), sink);
        }
    }

    fn collect_chain(&self, host: Host, type_id: TypeId, sink: &mut Vec<ComponentRef>) {
        let Some(set) = self.hosts[host.index()].as_ref() else {
            return;
        };
        let pool = &self.pools[type_id.index()];
        for slot in ChainIter::new(pool, set.first(type_id)) {
            sink.push(ComponentRef::new(type_id, slot));
        }
    }

    /// World-wide count of live components of exactly type `C`.
    pub fn count_allocated<C: Component>(&self) -> usize {
        let type_id = self.type_of::<C>();
        self.pools[type_id.index()].live_count() as usize
    }

    /// World-wide count of live components whose type implements `C`.
    ///
    /// Each pool is visited exactly once regardless of hierarchy depth —
    /// `implemented_by` is already the transitive closure.
    pub fn count_allocated_implementing<C: Component>(&self) -> usize {
        let type_id = self.type_of::<C>();
        self.types[type_id.index()]
            .implemented_by()
            .ones()
            .map(|candidate| self.pools[candidate].live_count() as usize)
            .sum()
    }

    /// Iterate every live component of exactly type `C`, world-wide, in
    /// allocation order.
    pub fn live<C: Component>(&self) -> impl Iterator<Item = ComponentRef> + '_ {
        let type_id = self.type_of::<C>();
        self.pools[type_id.index()]
            .live_slots()
            .iter()
            .map(move |&slot| ComponentRef::new(type_id, slot))
    }

    fn type_of<C: Component>(&self) -> TypeId {
        let type_id = self.registry.get::<C>().unwrap_or_else(|| {
            panic!(
                "component type '{}' is not registered",
                std::any::type_name::<C>()
            )
        });
        assert!(
            type_id.index() < self.pools.len(),
            "component type '{}' was registered after this world was created",
            std::any::type_name::<C>()
        );
        type_id
    }
}

#[cfg(test)]
mod tests {
    use cadence_macros::Component;

    use super::*;

    #[derive(Component, Default)]
    struct Base {
        value: i32,
    }

    #[derive(Component, Default)]
    struct Mid {
        #[allow(dead_code)]
        value: i32,
    }

    #[derive(Component, Default)]
    struct Leaf {
        #[allow(dead_code)]
        value: i32,
    }

    #[derive(Component, Default)]
    struct Other;

    fn world() -> World {
        let registry = TypeRegistry::new();
        registry.register::<Base>(16);
        registry.register_subtype::<Mid, Base>(16);
        registry.register_subtype::<Leaf, Mid>(16);
        registry.register::<Other>(16);
        World::new(Arc::new(registry))
    }

    #[test]
    fn attach_and_query() {
        // Given
        let mut world = world();
        let host = world.create_host();

        // When
        let base = world.attach::<Base>(host).unwrap();
        world.get_mut::<Base>(base).value = 41;

        // Then
        assert_eq!(world.find_first::<Base>(host), Some(base));
        assert_eq!(world.get::<Base>(base).value, 41);
        assert_eq!(world.owner(base), Some(host));
        assert_eq!(world.count_allocated::<Base>(), 1);
        assert!(world.find_first::<Mid>(host).is_none());
    }

    #[test]
    fn chain_integrity_through_attach_detach() {
        // Given
        let mut world = world();
        let host = world.create_host();
        let refs: Vec<ComponentRef> = (0..5)
            .map(|i| {
                let r = world.attach::<Base>(host).unwrap();
                world.get_mut::<Base>(r).value = i;
                r
            })
            .collect();

        // When - free the middle, then the newest (the chain head)
        world.free(refs[2]);
        world.free(refs[4]);

        // Then - the walk sees exactly the survivors, once each
        let mut found = Vec::new();
        world.find_all::<Base>(host, &mut found);
        assert_eq!(found.len(), 3);
        for &expected in &[refs[0], refs[1], refs[3]] {
            assert_eq!(found.iter().filter(|&&r| r == expected).count(), 1);
        }

        // When - free the rest
        world.free(refs[3]);
        world.free(refs[1]);
        world.free(refs[0]);

        // Then - the set holds no entry for the now-empty chain
        let mut found = Vec::new();
        world.find_all::<Base>(host, &mut found);
        assert!(found.is_empty());
        assert!(world.find_first::<Base>(host).is_none());
    }

    #[test]
    fn multiple_hosts_do_not_share_chains() {
        // Given
        let mut world = world();
        let one = world.create_host();
        let two = world.create_host();

        // When
        let a = world.attach::<Base>(one).unwrap();
        let b = world.attach::<Base>(two).unwrap();

        // Then
        assert_eq!(world.find_first::<Base>(one), Some(a));
        assert_eq!(world.find_first::<Base>(two), Some(b));
        assert_eq!(world.count_allocated::<Base>(), 2);
    }

    #[test]
    fn polymorphic_queries_see_the_whole_hierarchy() {
        // Given - one of each level, attached in mixed order
        let mut world = world();
        let host = world.create_host();
        let mid = world.attach::<Mid>(host).unwrap();
        let base = world.attach::<Base>(host).unwrap();
        let leaf = world.attach::<Leaf>(host).unwrap();
        world.attach::<Other>(host).unwrap();

        // When
        let mut found = Vec::new();
        world.find_all_implementing::<Base>(host, &mut found);

        // Then - every instance in the hierarchy, exactly once, no others
        assert_eq!(found.len(), 3);
        for &expected in &[base, mid, leaf] {
            assert_eq!(found.iter().filter(|&&r| r == expected).count(), 1);
        }

        // Then - a narrower root narrows the result
        let mut found = Vec::new();
        world.find_all_implementing::<Mid>(host, &mut found);
        assert_eq!(found.len(), 2);

        // Then - find-first falls through to a descendant when the exact
        // type is absent
        world.free(base);
        assert!(world.find_first::<Base>(host).is_none());
        assert!(world.find_first_implementing::<Base>(host).is_some());

        // Then - counts agree with the closure
        assert_eq!(world.count_allocated_implementing::<Base>(), 2);
        assert_eq!(world.count_allocated_implementing::<Mid>(), 2);
        assert_eq!(world.count_allocated_implementing::<Leaf>(), 1);
    }

    #[test]
    fn mark_for_destroy_is_two_phase() {
        // Given
        let mut world = world();
        let host = world.create_host();
        let base = world.attach::<Base>(host).unwrap();
        world.get_mut::<Base>(base).value = 13;
        let handle = world.watch(base);

        // When
        world.mark_for_destroy(base);

        // Then - queries no longer see it, but the payload survives
        assert!(world.find_first::<Base>(host).is_none());
        assert!(world.is_marked_for_destroy(base));
        assert_eq!(world.resolve::<Base>(handle).map(|b| b.value), Some(13));

        // When - marking again is a no-op
        world.mark_for_destroy(base);

        // When - the flush actually frees it
        world.flush_destroys();

        // Then
        assert_eq!(world.count_allocated::<Base>(), 0);
        assert!(world.resolve::<Base>(handle).is_none());
        assert!(!world.is_valid(handle));
    }

    #[test]
    fn direct_free_of_marked_component_is_safe() {
        // Given
        let mut world = world();
        let host = world.create_host();
        let doomed = world.attach::<Base>(host).unwrap();
        world.mark_for_destroy(doomed);

        // When - freed directly before the flush, then the slot is reused
        world.free(doomed);
        let replacement = world.attach::<Base>(host).unwrap();
        world.get_mut::<Base>(replacement).value = 5;

        // Then - the flush must not free the replacement out from under us
        world.flush_destroys();
        assert_eq!(world.get::<Base>(replacement).value, 5);
        assert_eq!(world.count_allocated::<Base>(), 1);
    }

    #[test]
    fn remove_all_empties_the_host() {
        // Given
        let mut world = world();
        let host = world.create_host();
        for _ in 0..3 {
            world.attach::<Base>(host).unwrap();
            world.attach::<Mid>(host).unwrap();
        }

        // When
        world.remove_all(host);

        // Then - chains empty immediately, pools drain at the flush
        assert!(world.find_first::<Base>(host).is_none());
        assert!(world.find_first::<Mid>(host).is_none());
        assert_eq!(world.count_allocated::<Base>(), 3);
        world.flush_destroys();
        assert_eq!(world.count_allocated::<Base>(), 0);
        assert_eq!(world.count_allocated::<Mid>(), 0);
    }

    #[test]
    fn destroy_host_retires_and_reuses_ids() {
        // Given
        let mut world = world();
        let host = world.create_host();
        world.attach::<Base>(host).unwrap();

        // When
        world.destroy_host(host);

        // Then
        assert!(!world.host_is_alive(host));
        let reused = world.create_host();
        assert_eq!(reused, host);
        assert!(world.host_is_alive(reused));
        assert!(world.find_first::<Base>(reused).is_none());
    }

    #[test]
    fn weak_handles_invalidate_on_free() {
        // Given
        let mut world = world();
        let host = world.create_host();
        let base = world.attach::<Base>(host).unwrap();
        let handle = world.watch(base);
        assert!(world.is_valid(handle));

        // When - the slot is freed and immediately reused
        world.free(base);
        let reused = world.attach::<Base>(host).unwrap();

        // Then - same slot, new generation: the old handle stays dead
        assert_eq!(reused.slot(), base.slot());
        assert!(!world.is_valid(handle));
        assert!(world.resolve::<Base>(handle).is_none());
    }

    #[test]
    fn tick_flushes_then_sweeps() {
        // Given
        let mut world = world();
        let host = world.create_host();
        let base = world.attach::<Base>(host).unwrap();
        let handle = world.watch(base);
        world.mark_for_destroy(base);

        // When - one tick: the flush bumps the generation, and the first
        // bucket sweep (where the first watch landed) evicts the handle
        world.tick();

        // Then
        assert_eq!(world.count_allocated::<Base>(), 0);
        assert!(!world.is_valid(handle));
        assert_eq!(world.watch_count(), 0);
    }

    #[test]
    fn stale_handles_drain_within_one_full_rotation() {
        // Given - a pile of watches on a component that then dies
        let mut world = world();
        let host = world.create_host();
        let base = world.attach::<Base>(host).unwrap();
        let handles: Vec<WeakHandle> = (0..100).map(|_| world.watch(base)).collect();
        world.free(base);

        // When - a full rotation of maintenance passes
        for _ in 0..crate::ecs::handle::CHECK_FREQUENCY {
            world.tick();
        }

        // Then - the registry evicted every stale watch
        assert_eq!(world.watch_count(), 0);
        assert!(handles.iter().all(|&h| !world.is_valid(h)));
    }

    #[test]
    fn pool_exhaustion_surfaces_as_error() {
        // Given
        let registry = TypeRegistry::new();
        registry.register::<Base>(1);
        let mut world = World::new(Arc::new(registry));
        let host = world.create_host();
        world.attach::<Base>(host).unwrap();

        // When
        let result = world.attach::<Base>(host);

        // Then
        assert!(matches!(
            result,
            Err(AllocError::PoolExhausted { capacity: 1, .. })
        ));
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn attaching_unregistered_type_panics() {
        let registry = TypeRegistry::new();
        let mut world = World::new(Arc::new(registry));
        let host = world.create_host();
        let _ = world.attach::<Base>(host);
    }

    #[test]
    fn live_iterates_allocation_order() {
        // Given
        let mut world = world();
        let one = world.create_host();
        let two = world.create_host();
        let a = world.attach::<Base>(one).unwrap();
        let b = world.attach::<Base>(two).unwrap();
        let c = world.attach::<Base>(one).unwrap();

        // When / Then
        let live: Vec<ComponentRef> = world.live::<Base>().collect();
        assert_eq!(live, vec![a, b, c]);
    }
}
