//! Camera: view/projection matrices, clear behaviour and culling parameters.

use bitflags::bitflags;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3, Vec4};

use crate::frustum::Frustum;

bitflags! {
    /// Which render target buffers are cleared before a camera draws.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u8 {
        /// Clear the color buffer to the camera's background color.
        const COLOR = 1 << 0;
        /// Clear the depth buffer.
        const DEPTH = 1 << 1;
        /// Clear both color and depth.
        const ALL = Self::COLOR.bits() | Self::DEPTH.bits();
    }
}

/// What a camera renders for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CameraKind {
    /// A player-facing game view.
    #[default]
    Game,
    /// The editor scene view.
    SceneView,
    /// An asset preview.
    Preview,
}

/// A camera that generates view and projection matrices for rendering.
#[derive(Debug, Clone)]
pub struct Camera {
    /// World-space position.
    pub position: Vec3,
    /// Rotation as a unit quaternion.
    pub rotation: Quat,
    /// Projection parameters.
    pub projection: Projection,
    /// Near clip plane distance (always positive).
    pub near: f32,
    /// Far clip plane distance (always positive, > near).
    pub far: f32,
    /// Buffers cleared before drawing.
    pub clear_flags: ClearFlags,
    /// Linear RGBA used when clearing color.
    pub background_color: Vec4,
    /// Bit `n` set means renderables on layer `n` are drawn.
    pub culling_mask: u32,
    /// Game, scene view or preview.
    pub kind: CameraKind,
}

/// Projection type for the camera.
#[derive(Debug, Clone)]
pub enum Projection {
    /// Perspective projection for 3D scenes.
    Perspective {
        /// Vertical field of view in radians.
        fov_y: f32,
        /// Width / height.
        aspect_ratio: f32,
    },
    /// Orthographic projection.
    Orthographic {
        /// Half-width of the view volume in world units.
        half_width: f32,
        /// Half-height of the view volume in world units.
        half_height: f32,
    },
}

/// Everything culling needs from a camera, derived on demand.
#[derive(Debug, Clone)]
pub struct CullingParameters {
    /// Combined view-projection matrix.
    pub view_projection: Mat4,
    /// Frustum planes extracted from `view_projection`.
    pub frustum: Frustum,
    /// Camera position.
    pub position: Vec3,
    /// Camera forward axis.
    pub forward: Vec3,
    /// Layer mask copied from the camera.
    pub culling_mask: u32,
}

/// Camera globals uploaded before any draw.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CameraUniform {
    /// View-projection matrix, column-major.
    pub view_proj: [[f32; 4]; 4],
    /// xyz = camera position, w = padding.
    pub camera_pos: [f32; 4],
}

impl Camera {
    /// Compute the view matrix (inverse of camera transform).
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation, self.position).inverse()
    }

    /// Compute the projection matrix with reverse-Z.
    pub fn projection_matrix(&self) -> Mat4 {
        match &self.projection {
            Projection::Perspective {
                fov_y,
                aspect_ratio,
            } => {
                // Reverse-Z: near plane maps to z=1, far plane maps to z=0.
                Mat4::perspective_rh(*fov_y, *aspect_ratio, self.far, self.near)
            }
            Projection::Orthographic {
                half_width,
                half_height,
            } => Mat4::orthographic_rh(
                -*half_width,
                *half_width,
                -*half_height,
                *half_height,
                self.far,
                self.near,
            ),
        }
    }

    /// Compute the combined view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// The forward direction vector (-Z in camera space).
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// The up direction vector (+Y in camera space).
    pub fn up(&self) -> Vec3 {
        self.rotation * Vec3::Y
    }

    /// Update the aspect ratio for perspective projection.
    pub fn set_aspect_ratio(&mut self, width: f32, height: f32) {
        if let Projection::Perspective { aspect_ratio, .. } = &mut self.projection {
            *aspect_ratio = width / height;
        }
    }

    /// Convert the camera to a uniform suitable for GPU upload.
    pub fn to_uniform(&self) -> CameraUniform {
        CameraUniform {
            view_proj: self.view_projection_matrix().to_cols_array_2d(),
            camera_pos: self.position.extend(0.0).to_array(),
        }
    }

    /// Derive culling parameters, or `None` when the camera cannot cull.
    ///
    /// Fails for a zero, negative or inverted near/far range, a degenerate
    /// projection (zero field of view, zero aspect, empty orthographic volume),
    /// and any non-finite input.
    pub fn try_culling_parameters(&self) -> Option<CullingParameters> {
        if !self.has_valid_clip_range() || !self.has_valid_projection() {
            return None;
        }
        if !self.position.is_finite()
            || !self.rotation.is_finite()
            || self.rotation.length_squared() < 1e-6
        {
            return None;
        }

        let view_projection = self.view_projection_matrix();
        if !view_projection.is_finite() {
            return None;
        }

        Some(CullingParameters {
            view_projection,
            frustum: Frustum::from_view_projection(&view_projection),
            position: self.position,
            forward: self.forward().normalize_or_zero(),
            culling_mask: self.culling_mask,
        })
    }

    fn has_valid_clip_range(&self) -> bool {
        self.near.is_finite() && self.far.is_finite() && self.near > 0.0 && self.far > self.near
    }

    fn has_valid_projection(&self) -> bool {
        match self.projection {
            Projection::Perspective {
                fov_y,
                aspect_ratio,
            } => {
                fov_y.is_finite()
                    && fov_y > 0.0
                    && fov_y < std::f32::consts::PI
                    && aspect_ratio.is_finite()
                    && aspect_ratio > 0.0
            }
            Projection::Orthographic {
                half_width,
                half_height,
            } => {
                half_width.is_finite()
                    && half_height.is_finite()
                    && half_width > 0.0
                    && half_height > 0.0
            }
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            projection: Projection::Perspective {
                fov_y: std::f32::consts::FRAC_PI_3,
                aspect_ratio: 16.0 / 9.0,
            },
            near: 0.3,
            far: 1000.0,
            clear_flags: ClearFlags::ALL,
            background_color: Vec4::new(0.192, 0.302, 0.475, 0.0),
            culling_mask: u32::MAX,
            kind: CameraKind::Game,
        }
    }
}
