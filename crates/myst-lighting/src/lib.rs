//! Visible-light records and the fixed-capacity light arrays forwarded to shaders.

mod light;
mod uniforms;

pub use light::{LightKind, LightRecord, linear_final_color};
pub use uniforms::{
    LightUniformArrays, LightUniformsGpu, MAX_VISIBLE_LIGHTS, MIN_RANGE_SQUARED,
    VISIBLE_LIGHT_ATTENUATIONS, VISIBLE_LIGHT_COLORS, VISIBLE_LIGHT_DIRECTIONS_OR_POSITIONS,
};
