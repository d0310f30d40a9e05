use engine_component::Component;
use engine_math::Vec3;
use serde::{Deserialize, Serialize};

/// World-space position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    #[must_use]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z)
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        self.to_vec3().distance(other.to_vec3())
    }
}

impl From<Vec3> for Position {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl Component for Position {
    fn type_name() -> &'static str {
        "position"
    }

    fn validate(&self) -> Result<(), String> {
        if !self.to_vec3().is_finite() {
            return Err("position must be finite".into());
        }
        Ok(())
    }
}

/// Linear velocity in world units per second.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Velocity {
    pub linear: Vec3,
}

impl Velocity {
    pub const ZERO: Self = Self { linear: Vec3::ZERO };

    #[must_use]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            linear: Vec3::new(x, y, z),
        }
    }

    /// Advance `position` by `dt` seconds of this velocity.
    #[must_use]
    pub fn integrate(&self, position: Position, dt: f32) -> Position {
        Position::from(position.to_vec3() + self.linear * dt)
    }
}

impl Default for Velocity {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Component for Velocity {
    fn type_name() -> &'static str {
        "velocity"
    }

    fn validate(&self) -> Result<(), String> {
        if !self.linear.is_finite() {
            return Err("velocity must be finite".into());
        }
        Ok(())
    }
}
