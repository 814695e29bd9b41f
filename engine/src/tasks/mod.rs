//! Static task registration and dependency-ordered scheduling.
//!
//! Tasks are registered once into a [`TaskGraph`] with a name (which doubles
//! as their dependency identity), an optional function, a tick mask, and a
//! contract callback declaring what they fulfill and how they order against
//! other identities. Computing a [`Schedule`] resolves the contracts into a
//! dependency graph, proves a cycle-free total order exists for the
//! requested tick, and strips the abstract anchor tasks from the executable
//! output.
//!
//! ```rust,ignore
//! let mut graph = TaskGraph::new();
//! graph.register(TaskDefinition::stage("Simulate"));
//! graph.register(
//!     TaskDefinition::new("ApplyDamage", apply_damage)
//!         .with_contract(|c| c.execute_before(Dependency::new("Simulate"))),
//! );
//!
//! let schedule = graph.schedule(Tick::GAMEPLAY)?;
//! schedule.run(&mut world);
//! ```

pub mod graph;
pub mod schedule;

pub use graph::{Contract, Dependency, OrderKind, TaskDefinition, TaskFn, TaskGraph, Tick, TickMask};
pub use schedule::{Schedule, ScheduleError};
