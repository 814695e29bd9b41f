//! Benchmark utilities for the cadence engine.
//!
//! Provides the shared component types and world builders used by the
//! criterion benchmarks.
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench -p cadence_bench
//!
//! # Run a specific benchmark group
//! cargo bench -p cadence_bench -- pool_churn
//! ```
//!
//! Results are written to `target/criterion/` with HTML reports.

pub mod components;

use std::sync::Arc;

use cadence_engine::ecs::{TypeRegistry, World};

use crate::components::*;

/// Build a world with the benchmark component hierarchy registered, each
/// type sized for `capacity` instances.
pub fn bench_world(capacity: u16) -> World {
    let registry = TypeRegistry::new();
    registry.register::<Position>(capacity);
    registry.register::<Velocity>(capacity);
    registry.register::<Collider>(capacity);
    registry.register_subtype::<SphereCollider, Collider>(capacity);
    registry.register_subtype::<BoxCollider, Collider>(capacity);
    World::new(Arc::new(registry))
}
