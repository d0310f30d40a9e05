use engine_component::{Component, Entity};
use serde::{Deserialize, Serialize};

/// High-level behaviour state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiState {
    #[default]
    Idle,
    Patrol,
    Chase,
    Flee,
}

/// Decision state for an AI-driven entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiController {
    pub state: AiState,
    pub target: Option<Entity>,
    /// 0.0 (never engages) to 1.0 (always engages).
    pub aggression: f32,
    /// Seconds until the next decision may change `state`.
    pub cooldown: f32,
}

impl AiController {
    #[must_use]
    pub fn new(aggression: f32) -> Self {
        Self {
            state: AiState::Idle,
            target: None,
            aggression,
            cooldown: 0.0,
        }
    }

    /// Pick a state from what `perception` currently sees.
    ///
    /// Does nothing while the cooldown is running.
    pub fn decide(&mut self, perception: &Perception, dt: f32, decision_interval: f32) {
        self.cooldown = (self.cooldown - dt).max(0.0);
        if self.cooldown > 0.0 {
            return;
        }
        self.cooldown = decision_interval;
        match perception.nearest() {
            Some(target) if self.aggression >= 0.5 => {
                self.state = AiState::Chase;
                self.target = Some(target);
            }
            Some(target) => {
                self.state = AiState::Flee;
                self.target = Some(target);
            }
            None => {
                self.state = if self.state == AiState::Idle {
                    AiState::Patrol
                } else {
                    AiState::Idle
                };
                self.target = None;
            }
        }
    }
}

impl Component for AiController {
    fn type_name() -> &'static str {
        "ai_controller"
    }

    fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.aggression) {
            return Err(format!("aggression {} outside 0..=1", self.aggression));
        }
        if !(self.cooldown.is_finite() && self.cooldown >= 0.0) {
            return Err("cooldown must be non-negative".into());
        }
        if matches!(self.state, AiState::Chase | AiState::Flee) && self.target.is_none() {
            return Err(format!("state {:?} requires a target", self.state));
        }
        if self.target.is_some_and(|t| !t.is_valid()) {
            return Err("target must be a valid entity".into());
        }
        Ok(())
    }
}

/// What an entity can currently sense.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Perception {
    /// Sensing radius in world units.
    pub radius: f32,
    /// Entities in range, nearest first.
    pub visible: Vec<Entity>,
}

impl Perception {
    #[must_use]
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            visible: Vec::new(),
        }
    }

    #[must_use]
    pub fn nearest(&self) -> Option<Entity> {
        self.visible.first().copied()
    }
}

impl Component for Perception {
    fn type_name() -> &'static str {
        "perception"
    }

    fn validate(&self) -> Result<(), String> {
        if !(self.radius.is_finite() && self.radius > 0.0) {
            return Err(format!("radius must be positive, got {}", self.radius));
        }
        if self.visible.iter().any(|e| !e.is_valid()) {
            return Err("visible set contains an invalid entity".into());
        }
        Ok(())
    }
}
