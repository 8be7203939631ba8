//! Fixed-capacity light arrays uploaded as global shader vector arrays.
//!
//! [`LightUniformArrays`] is allocated once per pipeline and overwritten in place
//! every camera. Only the color slot of an unused index is reset; the
//! direction and attenuation slots keep whatever an earlier frame wrote there,
//! so shaders must gate on the color alpha (or the active count) before reading
//! them.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use crate::light::{LightKind, LightRecord};

/// Lights beyond this index are dropped.
pub const MAX_VISIBLE_LIGHTS: usize = 8;

/// Lower bound on `range²` before inverting it for attenuation.
pub const MIN_RANGE_SQUARED: f32 = 0.00001;

/// Global array name for light colors.
pub const VISIBLE_LIGHT_COLORS: &str = "_VisibleLightColors";
/// Global array name for to-light directions (directional) or positions (others).
pub const VISIBLE_LIGHT_DIRECTIONS_OR_POSITIONS: &str = "_VisibleLightDirectionsOrPositions";
/// Global array name for attenuation factors.
pub const VISIBLE_LIGHT_ATTENUATIONS: &str = "_VisibleLightAttenuations";

/// The three shader light arrays plus the number of slots written this frame.
#[derive(Clone, Debug, PartialEq)]
pub struct LightUniformArrays {
    colors: [Vec4; MAX_VISIBLE_LIGHTS],
    directions_or_positions: [Vec4; MAX_VISIBLE_LIGHTS],
    attenuations: [Vec4; MAX_VISIBLE_LIGHTS],
    active_count: usize,
}

impl Default for LightUniformArrays {
    fn default() -> Self {
        Self::new()
    }
}

impl LightUniformArrays {
    /// Zeroed arrays with no active lights.
    pub fn new() -> Self {
        Self {
            colors: [Vec4::ZERO; MAX_VISIBLE_LIGHTS],
            directions_or_positions: [Vec4::ZERO; MAX_VISIBLE_LIGHTS],
            attenuations: [Vec4::ZERO; MAX_VISIBLE_LIGHTS],
            active_count: 0,
        }
    }

    /// Encode `lights` in order into the arrays and return the active count.
    ///
    /// At most [`MAX_VISIBLE_LIGHTS`] lights are written; the rest are ignored.
    /// Directional lights store their negated forward axis (the direction
    /// towards the light) and zero attenuation. Point and spot lights store
    /// their world position and `1 / max(range², MIN_RANGE_SQUARED)` in the
    /// attenuation's x component.
    pub fn aggregate(&mut self, lights: &[LightRecord]) -> usize {
        let mut count = 0;

        for (i, light) in lights.iter().take(MAX_VISIBLE_LIGHTS).enumerate() {
            self.colors[i] = light.final_color;

            let mut attenuation = Vec4::ZERO;
            match light.kind {
                LightKind::Directional => {
                    let v = light.forward();
                    self.directions_or_positions[i] = Vec4::new(-v.x, -v.y, -v.z, v.w);
                }
                LightKind::Point | LightKind::Spot => {
                    self.directions_or_positions[i] = light.position();
                    attenuation.x = 1.0 / (light.range * light.range).max(MIN_RANGE_SQUARED);
                }
            }
            self.attenuations[i] = attenuation;
            count = i + 1;
        }

        for color in &mut self.colors[count..] {
            *color = Vec4::ZERO;
        }
        self.active_count = count;
        count
    }

    /// Number of slots written by the last [`aggregate`](Self::aggregate).
    pub fn active_count(&self) -> usize {
        self.active_count
    }

    /// Light colors; unused slots hold zero.
    pub fn colors(&self) -> &[Vec4; MAX_VISIBLE_LIGHTS] {
        &self.colors
    }

    /// To-light directions or world positions.
    pub fn directions_or_positions(&self) -> &[Vec4; MAX_VISIBLE_LIGHTS] {
        &self.directions_or_positions
    }

    /// Attenuation factors.
    pub fn attenuations(&self) -> &[Vec4; MAX_VISIBLE_LIGHTS] {
        &self.attenuations
    }
}

/// GPU-side light arrays, 384 bytes, std140-compatible.
///
/// Carries no count: shaders skip slots whose color alpha is zero.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct LightUniformsGpu {
    /// `_VisibleLightColors`.
    pub colors: [[f32; 4]; MAX_VISIBLE_LIGHTS],
    /// `_VisibleLightDirectionsOrPositions`.
    pub directions_or_positions: [[f32; 4]; MAX_VISIBLE_LIGHTS],
    /// `_VisibleLightAttenuations`.
    pub attenuations: [[f32; 4]; MAX_VISIBLE_LIGHTS],
}
