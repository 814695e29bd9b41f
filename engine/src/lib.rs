//! cadence — a pooled component engine and static task scheduler for
//! fixed-tick simulation loops.
//!
//! The crate has two halves that meet in the frame loop:
//!
//! - [`ecs`]: fixed-capacity, type-erased component pools with O(1)
//!   allocate/free, per-host component chains, polymorphic ("implements")
//!   queries, and generation-checked weak handles whose revalidation is
//!   amortized over a rotating bucket registry.
//! - [`tasks`]: a statically-registered task graph whose Before/After
//!   contracts are resolved once into a cycle-checked, tick-filtered
//!   execution order.
//!
//! A driver registers component types and tasks during startup, builds a
//! [`World`] and a [`Schedule`], then runs the schedule once per tick:
//!
//! ```rust,ignore
//! let registry = Arc::new(TypeRegistry::new());
//! registry.register::<Health>(64);
//!
//! let mut graph = TaskGraph::new();
//! graph.register(TaskDefinition::new("UpdateHealth", update_health));
//!
//! let mut world = World::new(registry);
//! let schedule = graph.schedule(Tick::GAMEPLAY)?;
//!
//! loop {
//!     schedule.run(&mut world);
//!     world.tick();
//! }
//! ```

// Allow the derive macro to resolve `::cadence_engine::...` paths from within this crate.
extern crate self as cadence_engine;

pub mod ecs;
pub mod tasks;

pub use ecs::{Component, ComponentRef, Host, World};
pub use tasks::{Schedule, TaskDefinition, TaskGraph, Tick, TickMask};
