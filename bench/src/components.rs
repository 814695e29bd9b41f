//! Common component types used across benchmarks.
//!
//! Sized to be representative of real game components, with a small collider
//! hierarchy to exercise the polymorphic query paths.

use cadence_macros::Component;

/// 3D position component (12 bytes).
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// 3D velocity component (12 bytes).
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Base collider component.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct Collider {
    pub layer: u32,
}

/// Sphere-shaped collider.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct SphereCollider {
    pub radius: f32,
}

/// Box-shaped collider.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct BoxCollider {
    pub half_extents: [f32; 3],
}
