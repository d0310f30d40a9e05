//! Concrete component payloads.
//!
//! Each type implements [`Component`](engine_component::Component) with a
//! snake_case type name and a `validate` rule. The storage engine treats them
//! as opaque records; these are the types the coordinator's systems and the
//! storage tests work with.

mod ai;
mod render;
mod spatial;
mod vitals;

pub use ai::{AiController, AiState, Perception};
pub use engine_math::Transform3D;
pub use render::{Animation, Sprite};
pub use spatial::{Position, Velocity};
pub use vitals::{Health, Name};
