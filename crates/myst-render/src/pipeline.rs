//! Per-frame render orchestration.
//!
//! For every camera, in order: derive culling parameters (skipping the camera
//! when that fails), cull, then record into one command buffer
//!
//! 1. the render target clear and camera globals,
//! 2. a `"Render Camera"` profiling sample opening,
//! 3. the light arrays as global vector arrays,
//! 4. the opaque pass, front to back,
//! 5. the transparent pass, back to front,
//! 6. the fallback pass for unsupported materials (debug mode only),
//! 7. the sample closing,
//!
//! and submit it.

use bitflags::bitflags;
use log::{debug, trace};
use myst_config::PipelineConfig;
use myst_lighting::{
    LightUniformArrays, VISIBLE_LIGHT_ATTENUATIONS, VISIBLE_LIGHT_COLORS,
    VISIBLE_LIGHT_DIRECTIONS_OR_POSITIONS,
};

use crate::batching::{DrawBatch, DrawBatchSpec, RenderQueueRange, SortCriteria, ViewPoint};
use crate::camera::{Camera, ClearFlags};
use crate::command::{CAMERA_BUFFER_NAME, CommandBuffer, RenderDevice};
use crate::fallback::FallbackRenderer;
use crate::shader::{SRP_DEFAULT_UNLIT, ShaderRegistry};
use crate::visibility::SceneVisibility;

bitflags! {
    /// Draw batching features enabled for a pipeline.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct PipelineFlags: u32 {
        /// Merge consecutive draws sharing pipeline and material.
        const DYNAMIC_BATCHING = 1 << 0;
        /// Draw renderables sharing a mesh as one instanced draw.
        const INSTANCING = 1 << 1;
    }
}

impl PipelineFlags {
    /// Flags requested by a pipeline configuration.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut flags = Self::empty();
        flags.set(Self::DYNAMIC_BATCHING, config.dynamic_batching);
        flags.set(Self::INSTANCING, config.instancing);
        flags
    }
}

/// Collaborators the pipeline talks to while rendering.
pub struct RenderContext<'a> {
    /// Culling.
    pub scene: &'a dyn SceneVisibility,
    /// Shader pass and material lookup.
    pub shaders: &'a mut dyn ShaderRegistry,
    /// Command execution.
    pub device: &'a mut dyn RenderDevice,
}

/// Forward render pipeline.
///
/// Owns the scratch state reused camera after camera: the light arrays, the
/// command buffer and the lazily created error material.
#[derive(Debug)]
pub struct MystPipeline {
    flags: PipelineFlags,
    lights: LightUniformArrays,
    camera_buffer: CommandBuffer,
    fallback: FallbackRenderer,
}

impl MystPipeline {
    /// Create a pipeline with fixed batching flags.
    pub fn new(flags: PipelineFlags, debug_mode: bool) -> Self {
        Self {
            flags,
            lights: LightUniformArrays::new(),
            camera_buffer: CommandBuffer::new(CAMERA_BUFFER_NAME),
            fallback: FallbackRenderer::new(debug_mode),
        }
    }

    /// Create a pipeline from its configuration.
    ///
    /// The fallback pass is only ever enabled in builds with debug assertions,
    /// whatever `config.debug_mode` says.
    pub fn from_config(config: &PipelineConfig) -> Self {
        let flags = PipelineFlags::from_config(config);
        let debug_mode = config.debug_mode && cfg!(debug_assertions);
        debug!("Creating pipeline: flags={:?}, debug_mode={}", flags, debug_mode);
        Self::new(flags, debug_mode)
    }

    /// Batching flags.
    pub fn flags(&self) -> PipelineFlags {
        self.flags
    }

    /// Whether the fallback pass runs.
    pub fn debug_mode(&self) -> bool {
        self.fallback.is_enabled()
    }

    /// Light arrays as last written.
    pub fn lights(&self) -> &LightUniformArrays {
        &self.lights
    }

    /// Fallback pass state.
    pub fn fallback(&self) -> &FallbackRenderer {
        &self.fallback
    }

    /// Render every camera in order.
    pub fn render(&mut self, ctx: &mut RenderContext<'_>, cameras: &[Camera]) {
        for camera in cameras {
            self.render_camera(ctx, camera);
        }
    }

    /// Render one camera and submit its work. Cameras that cannot cull are
    /// skipped without recording anything.
    pub fn render_camera(&mut self, ctx: &mut RenderContext<'_>, camera: &Camera) {
        let Some(params) = camera.try_culling_parameters() else {
            trace!("Skipping {:?} camera: culling parameters unavailable", camera.kind);
            return;
        };

        let visible = ctx.scene.cull(&params);
        let view = ViewPoint::from(&params);
        let buffer = &mut self.camera_buffer;

        buffer.clear_render_target(
            camera.clear_flags.contains(ClearFlags::DEPTH),
            camera.clear_flags.contains(ClearFlags::COLOR),
            camera.background_color,
        );
        buffer.setup_camera_properties(camera.to_uniform());
        buffer.begin_sample(CAMERA_BUFFER_NAME);

        let active = self.lights.aggregate(&visible.lights);
        buffer.set_global_vector_array(VISIBLE_LIGHT_COLORS, self.lights.colors());
        buffer.set_global_vector_array(
            VISIBLE_LIGHT_DIRECTIONS_OR_POSITIONS,
            self.lights.directions_or_positions(),
        );
        buffer.set_global_vector_array(VISIBLE_LIGHT_ATTENUATIONS, self.lights.attenuations());

        let dynamic_batching = self.flags.contains(PipelineFlags::DYNAMIC_BATCHING);
        let instancing = self.flags.contains(PipelineFlags::INSTANCING);

        let opaque = DrawBatchSpec::new(SRP_DEFAULT_UNLIT)
            .sorted_by(SortCriteria::CommonOpaque)
            .in_queues(RenderQueueRange::OPAQUE)
            .batching(dynamic_batching, instancing);
        buffer.draw_renderers(DrawBatch::build(&opaque, &visible, &view, &*ctx.shaders));

        let transparent = opaque
            .sorted_by(SortCriteria::CommonTransparent)
            .in_queues(RenderQueueRange::TRANSPARENT);
        buffer.draw_renderers(DrawBatch::build(&transparent, &visible, &view, &*ctx.shaders));

        self.fallback.record(buffer, &visible, &view, &mut *ctx.shaders);

        buffer.end_sample(CAMERA_BUFFER_NAME);

        trace!(
            "Recorded {} commands for {:?} camera ({} renderables, {} lights)",
            buffer.len(),
            camera.kind,
            visible.renderables.len(),
            active
        );

        ctx.device.execute_command_buffer(buffer);
        buffer.clear();
        ctx.device.submit();
    }
}
