//! # engine_math
//!
//! Spatial component types. Re-exports [`glam`] for linear algebra and
//! defines [`Transform3D`], which implements
//! [`Component`](engine_component::Component) with finiteness and scale
//! checks.

pub mod transform;

pub use glam::{Quat, Vec3};

pub use transform::Transform3D;
