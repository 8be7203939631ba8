//! One visible light as reported by culling.
//!
//! Lights emit along their local +Z axis, so the forward direction is the third
//! column of the local-to-world matrix and the world position is the fourth.

use glam::{Mat4, Quat, Vec3, Vec4};

/// How a light illuminates the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LightKind {
    /// Infinitely distant light; only its orientation matters.
    Directional,
    /// Omnidirectional light with a finite range.
    Point,
    /// Cone light with a finite range. Shaded like a point light.
    Spot,
}

impl LightKind {
    /// Whether the light has a position and range-based attenuation.
    pub fn is_positional(self) -> bool {
        !matches!(self, LightKind::Directional)
    }
}

/// Raw attributes of one visible light. Rebuilt by culling every frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LightRecord {
    /// Directional, point or spot.
    pub kind: LightKind,
    /// World transform of the light.
    pub local_to_world: Mat4,
    /// Linear color already multiplied by intensity.
    pub final_color: Vec4,
    /// Effective range in world units. Ignored for directional lights.
    pub range: f32,
}

/// Linear-intensity final color: RGB scaled by intensity, alpha 1.
pub fn linear_final_color(color: Vec3, intensity: f32) -> Vec4 {
    (color * intensity).extend(1.0)
}

impl LightRecord {
    /// A directional light oriented by `rotation`.
    pub fn directional(rotation: Quat, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            local_to_world: Mat4::from_quat(rotation),
            final_color: linear_final_color(color, intensity),
            range: 0.0,
        }
    }

    /// A point light at `position`.
    pub fn point(position: Vec3, color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            kind: LightKind::Point,
            local_to_world: Mat4::from_translation(position),
            final_color: linear_final_color(color, intensity),
            range,
        }
    }

    /// A spot light at `position` facing along `rotation * +Z`.
    pub fn spot(position: Vec3, rotation: Quat, color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            kind: LightKind::Spot,
            local_to_world: Mat4::from_rotation_translation(rotation, position),
            final_color: linear_final_color(color, intensity),
            range,
        }
    }

    /// Facing direction: third column of the world transform.
    pub fn forward(&self) -> Vec4 {
        self.local_to_world.z_axis
    }

    /// World-space origin: fourth column of the world transform.
    pub fn position(&self) -> Vec4 {
        self.local_to_world.w_axis
    }
}
