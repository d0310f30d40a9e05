use engine_component::Component;
use serde::{Deserialize, Serialize};

/// Current and maximum hit points.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Health {
    pub current: f32,
    pub max: f32,
}

impl Health {
    /// Full health at `max`.
    #[must_use]
    pub fn full(max: f32) -> Self {
        Self { current: max, max }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    /// Apply damage, clamping to zero.
    pub fn damage(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }

    /// Heal, clamping to max.
    pub fn heal(&mut self, amount: f32) {
        self.current = (self.current + amount).min(self.max);
    }
}

impl Component for Health {
    fn type_name() -> &'static str {
        "health"
    }

    fn validate(&self) -> Result<(), String> {
        if !(self.max.is_finite() && self.max > 0.0) {
            return Err(format!("max must be positive, got {}", self.max));
        }
        if !(0.0..=self.max).contains(&self.current) {
            return Err(format!(
                "current {} outside 0..={}",
                self.current, self.max
            ));
        }
        Ok(())
    }
}

/// Display name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Name {
    pub value: String,
}

impl Name {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { value: name.into() }
    }
}

impl Component for Name {
    fn type_name() -> &'static str {
        "name"
    }

    fn validate(&self) -> Result<(), String> {
        if self.value.trim().is_empty() {
            return Err("name must not be blank".into());
        }
        Ok(())
    }
}
