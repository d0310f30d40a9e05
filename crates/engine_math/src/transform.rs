//! 3D transform component.
//!
//! [`Transform3D`] holds position, rotation and per-axis scale. Stored
//! transforms are always finite, have a unit rotation and a non-zero scale on
//! every axis; anything else is rejected by [`Component::validate`].

use engine_component::Component;
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Allowed deviation of the rotation's length from 1.
const ROTATION_TOLERANCE: f32 = 1e-3;

/// Position, rotation and scale in 3D space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Transform3D {
    pub position: Vec3,
    /// Unit quaternion.
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform3D {
    /// Origin, no rotation, unit scale.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// A transform at `position` facing `target` (the local `-Z` axis points
    /// at it). Falls back to no rotation when the two points coincide.
    #[must_use]
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        let dir = (target - position).normalize_or_zero();
        let rotation = if dir == Vec3::ZERO {
            Quat::IDENTITY
        } else {
            Quat::from_rotation_arc(Vec3::NEG_Z, dir)
        };
        Self {
            position,
            rotation,
            scale: Vec3::ONE,
        }
    }

    /// The 4x4 model matrix.
    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// The direction the transform faces in world space.
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    #[must_use]
    pub fn translated(mut self, offset: Vec3) -> Self {
        self.position += offset;
        self
    }

    #[must_use]
    pub fn rotated(mut self, rotation: Quat) -> Self {
        self.rotation = (rotation * self.rotation).normalize();
        self
    }

    /// Distance between the two positions; rotation and scale are ignored.
    #[must_use]
    pub fn distance(&self, other: &Self) -> f32 {
        self.position.distance(other.position)
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Component for Transform3D {
    fn type_name() -> &'static str {
        "transform"
    }

    fn validate(&self) -> Result<(), String> {
        if !self.position.is_finite() || !self.rotation.is_finite() || !self.scale.is_finite() {
            return Err("transform contains non-finite values".into());
        }
        if (self.rotation.length() - 1.0).abs() > ROTATION_TOLERANCE {
            return Err(format!(
                "rotation must be a unit quaternion (length {})",
                self.rotation.length()
            ));
        }
        if self.scale.cmpeq(Vec3::ZERO).any() {
            return Err("scale must be non-zero on every axis".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_valid() {
        assert!(Transform3D::IDENTITY.validate().is_ok());
        assert_eq!(Transform3D::IDENTITY.to_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_translated() {
        let t = Transform3D::IDENTITY.translated(Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(t.position, Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(t.distance(&Transform3D::IDENTITY), 5.0);
    }

    #[test]
    fn test_looking_at_faces_target() {
        let t = Transform3D::looking_at(Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0));
        assert!(t.forward().abs_diff_eq(Vec3::X, 1e-5));
        assert!(t.validate().is_ok());

        let same = Transform3D::looking_at(Vec3::ONE, Vec3::ONE);
        assert_eq!(same.rotation, Quat::IDENTITY);
    }

    #[test]
    fn test_rejects_nan_position() {
        let t = Transform3D::from_position(Vec3::new(f32::NAN, 0.0, 0.0));
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_scale() {
        let t = Transform3D {
            scale: Vec3::new(1.0, 0.0, 1.0),
            ..Transform3D::IDENTITY
        };
        assert!(t.check().is_err());
    }

    #[test]
    fn test_rejects_non_unit_rotation() {
        let t = Transform3D {
            rotation: Quat::from_xyzw(0.0, 0.0, 0.0, 2.0),
            ..Transform3D::IDENTITY
        };
        assert!(t.validate().unwrap_err().contains("unit quaternion"));
    }

    #[test]
    fn test_record_roundtrip() {
        let t = Transform3D::from_position(Vec3::new(1.0, 2.0, 3.0))
            .rotated(Quat::from_rotation_y(0.5));
        let restored = Transform3D::from_record(t.to_record().unwrap()).unwrap();
        assert_eq!(t, restored);
    }

    #[test]
    fn test_invalid_record_rejected() {
        let record = serde_json::json!({
            "position": [0.0, 0.0, 0.0],
            "rotation": [0.0, 0.0, 0.0, 1.0],
            "scale": [0.0, 0.0, 0.0],
        });
        assert!(Transform3D::from_record(record).is_err());
    }
}
