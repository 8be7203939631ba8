//! Recorded GPU work and the device seam that executes it.

use glam::Vec4;
use myst_lighting::MAX_VISIBLE_LIGHTS;

use crate::batching::DrawBatch;
use crate::camera::CameraUniform;

/// Name of the per-camera command buffer and its profiling sample.
pub const CAMERA_BUFFER_NAME: &str = "Render Camera";

/// One recorded command.
#[derive(Clone, Debug, PartialEq)]
pub enum RenderCommand {
    /// Clear the bound render target.
    ClearRenderTarget {
        /// Clear depth to the far value.
        clear_depth: bool,
        /// Clear color to `background`.
        clear_color: bool,
        /// Linear RGBA clear color.
        background: Vec4,
    },
    /// Upload the camera's view-projection and position globals.
    SetupCameraProperties(CameraUniform),
    /// Upload a global shader vector array by name.
    SetGlobalVectorArray {
        /// Shader-visible array name.
        name: &'static str,
        /// Array contents.
        values: [Vec4; MAX_VISIBLE_LIGHTS],
    },
    /// Open a named profiling sample.
    BeginSample(&'static str),
    /// Close a named profiling sample.
    EndSample(&'static str),
    /// Draw a sorted batch.
    DrawRenderers(DrawBatch),
}

/// An ordered list of commands, reused camera after camera.
#[derive(Debug)]
pub struct CommandBuffer {
    name: &'static str,
    commands: Vec<RenderCommand>,
}

impl CommandBuffer {
    /// Create an empty buffer.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            commands: Vec::new(),
        }
    }

    /// Buffer name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Recorded commands in order.
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    /// Number of recorded commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Drop every command, keeping allocated capacity.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Record a render target clear.
    pub fn clear_render_target(&mut self, clear_depth: bool, clear_color: bool, background: Vec4) {
        self.commands.push(RenderCommand::ClearRenderTarget {
            clear_depth,
            clear_color,
            background,
        });
    }

    /// Record the camera globals.
    pub fn setup_camera_properties(&mut self, camera: CameraUniform) {
        self.commands.push(RenderCommand::SetupCameraProperties(camera));
    }

    /// Record a global vector array upload.
    pub fn set_global_vector_array(
        &mut self,
        name: &'static str,
        values: &[Vec4; MAX_VISIBLE_LIGHTS],
    ) {
        self.commands.push(RenderCommand::SetGlobalVectorArray {
            name,
            values: *values,
        });
    }

    /// Open a profiling sample.
    pub fn begin_sample(&mut self, name: &'static str) {
        self.commands.push(RenderCommand::BeginSample(name));
    }

    /// Close a profiling sample.
    pub fn end_sample(&mut self, name: &'static str) {
        self.commands.push(RenderCommand::EndSample(name));
    }

    /// Record a draw batch. Empty batches are recorded too.
    pub fn draw_renderers(&mut self, batch: DrawBatch) {
        self.commands.push(RenderCommand::DrawRenderers(batch));
    }
}

/// Executes recorded command buffers.
///
/// Work executed between two [`submit`](Self::submit) calls forms one frame.
pub trait RenderDevice {
    /// Execute (or enqueue) every command of `buffer` in order.
    fn execute_command_buffer(&mut self, buffer: &CommandBuffer);

    /// Submit everything executed since the last submit.
    fn submit(&mut self);
}
