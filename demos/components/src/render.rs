use engine_component::Component;
use serde::{Deserialize, Serialize};

/// A 2D sprite reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sprite {
    /// Texture asset identifier. Must not be empty.
    pub texture_id: String,
    pub width: u32,
    pub height: u32,
    /// Draw order; higher layers draw on top.
    pub layer: i32,
    pub visible: bool,
}

impl Sprite {
    #[must_use]
    pub fn new(texture_id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            texture_id: texture_id.into(),
            width,
            height,
            layer: 0,
            visible: true,
        }
    }

    #[must_use]
    pub fn on_layer(mut self, layer: i32) -> Self {
        self.layer = layer;
        self
    }
}

impl Component for Sprite {
    fn type_name() -> &'static str {
        "sprite"
    }

    fn validate(&self) -> Result<(), String> {
        if self.texture_id.is_empty() {
            return Err("texture_id must not be empty".into());
        }
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "sprite size must be non-zero, got {}x{}",
                self.width, self.height
            ));
        }
        Ok(())
    }
}

/// Frame-based animation state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Animation {
    pub clip: String,
    pub frame: u32,
    pub frame_count: u32,
    /// Frames per second.
    pub fps: f32,
    pub looping: bool,
    /// Seconds accumulated towards the next frame.
    #[serde(default)]
    pub elapsed: f32,
}

impl Animation {
    #[must_use]
    pub fn new(clip: impl Into<String>, frame_count: u32, fps: f32) -> Self {
        Self {
            clip: clip.into(),
            frame: 0,
            frame_count,
            fps,
            looping: true,
            elapsed: 0.0,
        }
    }

    /// Advance by `dt` seconds. Non-looping clips stop on their last frame.
    pub fn advance(&mut self, dt: f32) {
        self.elapsed += dt;
        let step = 1.0 / self.fps;
        while self.elapsed >= step {
            self.elapsed -= step;
            if self.frame + 1 < self.frame_count {
                self.frame += 1;
            } else if self.looping {
                self.frame = 0;
            } else {
                self.elapsed = 0.0;
                break;
            }
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        !self.looping && self.frame + 1 >= self.frame_count
    }
}

impl Component for Animation {
    fn type_name() -> &'static str {
        "animation"
    }

    fn validate(&self) -> Result<(), String> {
        if self.clip.is_empty() {
            return Err("clip must not be empty".into());
        }
        if self.frame_count == 0 {
            return Err("frame_count must be at least 1".into());
        }
        if self.frame >= self.frame_count {
            return Err(format!(
                "frame {} out of range for {} frames",
                self.frame, self.frame_count
            ));
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(format!("fps must be positive, got {}", self.fps));
        }
        if !(self.elapsed.is_finite() && self.elapsed >= 0.0) {
            return Err("elapsed must be non-negative".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_texture_rejected() {
        let err = Sprite::new("", 32, 32).check().unwrap_err();
        assert!(err.to_string().contains("texture_id"));
    }

    #[test]
    fn test_zero_sized_sprite_rejected() {
        assert!(Sprite::new("hero.png", 0, 32).validate().is_err());
    }

    #[test]
    fn test_animation_loops() {
        let mut a = Animation::new("walk", 4, 10.0);
        a.advance(0.45);
        assert_eq!(a.frame, 0);
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_animation_stops_when_not_looping() {
        let mut a = Animation::new("die", 3, 10.0);
        a.looping = false;
        a.advance(1.0);
        assert_eq!(a.frame, 2);
        assert!(a.is_finished());
        assert!(a.validate().is_ok());
    }

    #[test]
    fn test_frame_out_of_range_rejected() {
        let mut a = Animation::new("idle", 2, 8.0);
        a.frame = 2;
        assert!(a.validate().is_err());
    }
}
