//! wgpu-backed [`RenderDevice`] rendering into an offscreen color target.
//!
//! Globals (camera and light arrays) live in one uniform buffer at
//! `@group(0) @binding(0)`. Each draw batch becomes one render pass; the first
//! pass after a clear command carries the clear as its load operation. Draws
//! whose pipeline or mesh was never registered are skipped and counted.

use std::collections::HashMap;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use log::{debug, trace};
use myst_lighting::{
    LightUniformsGpu, MAX_VISIBLE_LIGHTS, VISIBLE_LIGHT_ATTENUATIONS, VISIBLE_LIGHT_COLORS,
    VISIBLE_LIGHT_DIRECTIONS_OR_POSITIONS,
};

use crate::batching::DrawBatch;
use crate::buffer::{BufferAllocator, InstanceData, MeshBuffer, VertexPositionNormal};
use crate::camera::CameraUniform;
use crate::command::{CommandBuffer, RenderCommand, RenderDevice};
use crate::shader::{MaterialId, PipelineId, ShaderId, ShaderLibrary};
use crate::visibility::MeshId;

/// Offscreen color target format.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Reverse-Z depth format.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Reverse-Z clear value: 0.0 is the far plane.
pub const DEPTH_CLEAR_VALUE: f32 = 0.0;

/// Errors from resource registration and readback.
#[derive(Debug, thiserror::Error)]
pub enum GpuDeviceError {
    /// A pipeline id was registered twice.
    #[error("pipeline {0:?} is already registered")]
    DuplicatePipeline(PipelineId),

    /// A mesh id was uploaded twice.
    #[error("mesh {0:?} is already uploaded")]
    DuplicateMesh(MeshId),

    /// A shader id is not in the library.
    #[error("shader {0:?} is not registered")]
    UnknownShader(ShaderId),

    /// Mapping the readback buffer failed.
    #[error("failed to map readback buffer: {0}")]
    Readback(#[from] wgpu::BufferAsyncError),

    /// The map callback never ran.
    #[error("readback was interrupted")]
    ReadbackInterrupted,

    /// The requested target is larger than the device allows.
    #[error("render target {width}x{height} exceeds the device limit of {max}")]
    TargetTooLarge { width: u32, height: u32, max: u32 },
}

/// Fragment program of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderProgram {
    /// Per-instance color lit by the visible light arrays.
    ForwardUnlit,
    /// Flat magenta.
    Error,
}

impl ShaderProgram {
    fn fragment_entry_point(self) -> &'static str {
        match self {
            ShaderProgram::ForwardUnlit => "fs_forward",
            ShaderProgram::Error => "fs_error",
        }
    }
}

/// Output blending of a pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendMode {
    /// No blending, depth writes on.
    Opaque,
    /// Alpha blending, depth writes off.
    Alpha,
}

/// Counters for the work executed since the last submit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Render passes begun.
    pub passes: usize,
    /// Device draw calls issued.
    pub draws: usize,
    /// Instances drawn.
    pub instances: usize,
    /// Draws dropped for a missing pipeline or mesh.
    pub skipped: usize,
}

/// Globals uniform: camera then light arrays, 464 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GlobalsUniform {
    /// Set by `SetupCameraProperties`.
    pub camera: CameraUniform,
    /// Set array by array by `SetGlobalVectorArray`.
    pub lights: LightUniformsGpu,
}

#[derive(Clone, Copy, Debug)]
struct ClearRequest {
    clear_depth: bool,
    clear_color: bool,
    background: Vec4,
}

/// Renders command buffers into an offscreen texture.
pub struct GpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    width: u32,
    height: u32,
    color_texture: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
    globals: GlobalsUniform,
    globals_buffer: wgpu::Buffer,
    globals_bind_group: wgpu::BindGroup,
    pipeline_layout: wgpu::PipelineLayout,
    shader: wgpu::ShaderModule,
    pipelines: HashMap<PipelineId, wgpu::RenderPipeline>,
    meshes: HashMap<MeshId, MeshBuffer>,
    material_colors: HashMap<MaterialId, Vec4>,
    instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    instance_cursor: usize,
    finished: Vec<wgpu::CommandBuffer>,
    stats: FrameStats,
    last_stats: FrameStats,
    frames_submitted: u64,
}

impl GpuDevice {
    /// Initial instance buffer capacity.
    const INITIAL_INSTANCES: usize = 256;

    /// Create a device rendering into a `width` x `height` target.
    ///
    /// Fails when either side exceeds `max_texture_dimension_2d`.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
    ) -> Result<Self, GpuDeviceError> {
        let width = width.max(1);
        let height = height.max(1);
        let max = device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(GpuDeviceError::TargetTooLarge { width, height, max });
        }
        let (color_texture, color_view, depth_view) = create_targets(&device, width, height);

        let globals = GlobalsUniform::zeroed();
        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("globals-uniform"),
            size: std::mem::size_of::<GlobalsUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let globals_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("globals-bgl"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<GlobalsUniform>() as u64
                        ),
                    },
                    count: None,
                }],
            });

        let globals_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("globals-bind-group"),
            layout: &globals_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("forward-pipeline-layout"),
            bind_group_layouts: &[&globals_bind_group_layout],
            immediate_size: 0,
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("myst-forward"),
            source: wgpu::ShaderSource::Wgsl(FORWARD_SHADER_SOURCE.into()),
        });

        let instance_buffer =
            BufferAllocator::new(&device).create_instance_buffer(Self::INITIAL_INSTANCES);

        Ok(Self {
            device,
            queue,
            width,
            height,
            color_texture,
            color_view,
            depth_view,
            globals,
            globals_buffer,
            globals_bind_group,
            pipeline_layout,
            shader,
            pipelines: HashMap::new(),
            meshes: HashMap::new(),
            material_colors: HashMap::new(),
            instance_buffer,
            instance_capacity: Self::INITIAL_INSTANCES,
            instance_cursor: 0,
            finished: Vec::new(),
            stats: FrameStats::default(),
            last_stats: FrameStats::default(),
            frames_submitted: 0,
        })
    }

    /// Target size in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Counters of the last submitted frame.
    pub fn last_frame_stats(&self) -> FrameStats {
        self.last_stats
    }

    /// Number of submits so far.
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// Compile the pipeline-state object for `id`.
    pub fn register_pipeline(
        &mut self,
        id: PipelineId,
        program: ShaderProgram,
        blend: BlendMode,
    ) -> Result<(), GpuDeviceError> {
        if self.pipelines.contains_key(&id) {
            return Err(GpuDeviceError::DuplicatePipeline(id));
        }

        let (blend_state, depth_write_enabled) = match blend {
            BlendMode::Opaque => (None, true),
            BlendMode::Alpha => (Some(wgpu::BlendState::ALPHA_BLENDING), false),
        };

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("pipeline-{}", id.0)),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some("vs_main"),
                    buffers: &[VertexPositionNormal::layout(), InstanceData::layout()],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: Some(wgpu::Face::Back),
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled,
                    depth_compare: wgpu::CompareFunction::GreaterEqual, // reverse-Z
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some(program.fragment_entry_point()),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: COLOR_FORMAT,
                        blend: blend_state,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview_mask: None,
                cache: None,
            });

        debug!("Compiled pipeline {:?} ({:?}, {:?})", id, program, blend);
        self.pipelines.insert(id, pipeline);
        Ok(())
    }

    /// Compile every pass of a library shader with the same program and blend.
    pub fn register_shader_passes(
        &mut self,
        library: &ShaderLibrary,
        shader: ShaderId,
        program: ShaderProgram,
        blend: BlendMode,
    ) -> Result<usize, GpuDeviceError> {
        let def = library
            .shader(shader)
            .ok_or(GpuDeviceError::UnknownShader(shader))?;
        for pass in &def.passes {
            self.register_pipeline(pass.pipeline, program, blend)?;
        }
        Ok(def.passes.len())
    }

    /// Upload a mesh under `id`.
    pub fn upload_mesh(
        &mut self,
        id: MeshId,
        vertices: &[VertexPositionNormal],
        indices: &[u16],
    ) -> Result<(), GpuDeviceError> {
        if self.meshes.contains_key(&id) {
            return Err(GpuDeviceError::DuplicateMesh(id));
        }
        let mesh = BufferAllocator::new(&self.device).create_mesh(
            &format!("mesh-{}", id.0),
            vertices,
            indices,
        );
        self.meshes.insert(id, mesh);
        Ok(())
    }

    /// Set the `_Color` used for draws of `material` without an override.
    pub fn set_material_color(&mut self, material: MaterialId, color: Vec4) {
        self.material_colors.insert(material, color);
    }

    fn material_color(&self, material: MaterialId) -> Vec4 {
        self.material_colors
            .get(&material)
            .copied()
            .unwrap_or(Vec4::ONE)
    }

    fn upload_globals(&self) {
        self.queue
            .write_buffer(&self.globals_buffer, 0, bytemuck::bytes_of(&self.globals));
    }

    fn set_light_array(&mut self, name: &str, values: &[Vec4; MAX_VISIBLE_LIGHTS]) -> bool {
        let packed = values.map(|v| v.to_array());
        match name {
            VISIBLE_LIGHT_COLORS => self.globals.lights.colors = packed,
            VISIBLE_LIGHT_DIRECTIONS_OR_POSITIONS => {
                self.globals.lights.directions_or_positions = packed;
            }
            VISIBLE_LIGHT_ATTENUATIONS => self.globals.lights.attenuations = packed,
            _ => {
                debug!("Ignoring unknown global array '{}'", name);
                return false;
            }
        }
        true
    }

    /// Reserve `count` consecutive instance slots and return the first index.
    fn reserve_instances(&mut self, count: usize) -> u32 {
        if self.instance_cursor + count > self.instance_capacity {
            // Passes already encoded keep the old buffer alive.
            self.instance_capacity = count.max(self.instance_capacity * 2);
            self.instance_buffer =
                BufferAllocator::new(&self.device).create_instance_buffer(self.instance_capacity);
            self.instance_cursor = 0;
            trace!("Grew instance buffer to {} instances", self.instance_capacity);
        }
        let first = self.instance_cursor;
        self.instance_cursor += count;
        first as u32
    }

    fn encode_batch(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        batch: &DrawBatch,
        clear: Option<ClearRequest>,
    ) {
        let instances: Vec<InstanceData> = batch
            .draw_calls()
            .iter()
            .map(|call| {
                let color = call
                    .color_override
                    .unwrap_or_else(|| self.material_color(call.material_id));
                InstanceData::new(call.transform, color)
            })
            .collect();

        let base = self.reserve_instances(instances.len());
        if !instances.is_empty() {
            let offset = base as wgpu::BufferAddress
                * std::mem::size_of::<InstanceData>() as wgpu::BufferAddress;
            self.queue
                .write_buffer(&self.instance_buffer, offset, bytemuck::cast_slice(&instances));
        }

        let color_load = match clear {
            Some(c) if c.clear_color => wgpu::LoadOp::Clear(wgpu::Color {
                r: f64::from(c.background.x),
                g: f64::from(c.background.y),
                b: f64::from(c.background.z),
                a: f64::from(c.background.w),
            }),
            _ => wgpu::LoadOp::Load,
        };
        let depth_load = match clear {
            Some(c) if c.clear_depth => wgpu::LoadOp::Clear(DEPTH_CLEAR_VALUE),
            _ => wgpu::LoadOp::Load,
        };

        let mut stats = FrameStats {
            passes: 1,
            ..FrameStats::default()
        };
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("draw-renderers"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            pass.set_bind_group(0, &self.globals_bind_group, &[]);
            pass.set_vertex_buffer(1, self.instance_buffer.slice(..));

            let mut first = base;
            for group in batch.groups() {
                let pipeline = self.pipelines.get(&group.pipeline_id);
                if let Some(pipeline) = pipeline {
                    pass.set_pipeline(pipeline);
                }
                for draw in group.instanced_groups() {
                    let count = draw.instance_count();
                    match (pipeline, self.meshes.get(&draw.mesh_id)) {
                        (Some(_), Some(mesh)) => {
                            mesh.bind(&mut pass);
                            mesh.draw_instanced(&mut pass, first..first + count);
                            stats.draws += 1;
                            stats.instances += count as usize;
                        }
                        _ => stats.skipped += 1,
                    }
                    first += count;
                }
            }
        }

        self.stats.passes += stats.passes;
        self.stats.draws += stats.draws;
        self.stats.instances += stats.instances;
        self.stats.skipped += stats.skipped;
    }

    /// Copy the color target back to the CPU as tightly packed RGBA8 rows.
    ///
    /// Submits any pending work first.
    pub fn read_color_target(&mut self) -> Result<Vec<u8>, GpuDeviceError> {
        const BYTES_PER_PIXEL: u32 = 4;
        let unpadded = self.width * BYTES_PER_PIXEL;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("color-readback"),
            size: u64::from(padded * self.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("color-readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.color_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        self.finished.push(encoder.finish());
        self.queue.submit(self.finished.drain(..));

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        });
        rx.recv()
            .map_err(|_| GpuDeviceError::ReadbackInterrupted)??;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * self.height) as usize);
        for row in 0..self.height {
            let start = (row * padded) as usize;
            pixels.extend_from_slice(&mapped[start..start + unpadded as usize]);
        }
        drop(mapped);
        readback.unmap();
        Ok(pixels)
    }
}

impl RenderDevice for GpuDevice {
    fn execute_command_buffer(&mut self, buffer: &CommandBuffer) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(buffer.name()),
            });
        let mut pending_clear = None;

        for command in buffer.commands() {
            match command {
                RenderCommand::ClearRenderTarget {
                    clear_depth,
                    clear_color,
                    background,
                } => {
                    pending_clear = Some(ClearRequest {
                        clear_depth: *clear_depth,
                        clear_color: *clear_color,
                        background: *background,
                    });
                }
                RenderCommand::SetupCameraProperties(camera) => {
                    self.globals.camera = *camera;
                    self.upload_globals();
                }
                RenderCommand::SetGlobalVectorArray { name, values } => {
                    if self.set_light_array(name, values) {
                        self.upload_globals();
                    }
                }
                RenderCommand::BeginSample(name) => encoder.push_debug_group(name),
                RenderCommand::EndSample(_) => encoder.pop_debug_group(),
                RenderCommand::DrawRenderers(batch) => {
                    self.encode_batch(&mut encoder, batch, pending_clear.take());
                }
            }
        }

        // A clear with no draw after it still has to reach the target.
        if pending_clear.is_some() {
            self.encode_batch(&mut encoder, &DrawBatch::default(), pending_clear);
        }

        self.finished.push(encoder.finish());
    }

    fn submit(&mut self) {
        self.queue.submit(self.finished.drain(..));
        self.instance_cursor = 0;
        self.last_stats = std::mem::take(&mut self.stats);
        self.frames_submitted += 1;
        trace!(
            "Submitted GPU frame {}: {:?}",
            self.frames_submitted, self.last_stats
        );
    }
}

fn create_targets(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView, wgpu::TextureView) {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let color = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("color-target"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COLOR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let depth = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth-target"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
    let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
    (color, color_view, depth_view)
}

/// WGSL for every pipeline: one vertex stage, a lit forward fragment stage
/// and a flat error fragment stage.
///
/// Light slots whose color alpha is zero are unused; their direction and
/// attenuation may be stale.
pub const FORWARD_SHADER_SOURCE: &str = r#"
const MAX_VISIBLE_LIGHTS: u32 = 8u;

struct Globals {
    view_proj: mat4x4<f32>,
    camera_pos: vec4<f32>,
    light_colors: array<vec4<f32>, 8>,
    light_directions_or_positions: array<vec4<f32>, 8>,
    light_attenuations: array<vec4<f32>, 8>,
};

@group(0) @binding(0)
var<uniform> globals: Globals;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

struct InstanceInput {
    @location(2) model_0: vec4<f32>,
    @location(3) model_1: vec4<f32>,
    @location(4) model_2: vec4<f32>,
    @location(5) model_3: vec4<f32>,
    @location(6) color: vec4<f32>,
};

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) color: vec4<f32>,
};

@vertex
fn vs_main(vertex: VertexInput, instance: InstanceInput) -> VertexOutput {
    let model = mat4x4<f32>(instance.model_0, instance.model_1, instance.model_2, instance.model_3);
    let world = model * vec4<f32>(vertex.position, 1.0);

    var out: VertexOutput;
    out.clip_position = globals.view_proj * world;
    out.world_position = world.xyz;
    out.normal = normalize((model * vec4<f32>(vertex.normal, 0.0)).xyz);
    out.color = instance.color;
    return out;
}

// Directional lights store w = 0, so the light vector is the direction itself.
fn diffuse_light(index: u32, world_position: vec3<f32>, normal: vec3<f32>) -> vec3<f32> {
    let direction_or_position = globals.light_directions_or_positions[index];
    let light_vector = direction_or_position.xyz - world_position * direction_or_position.w;
    let distance_sqr = max(dot(light_vector, light_vector), 0.00001);

    var range_fade = distance_sqr * globals.light_attenuations[index].x;
    range_fade = clamp(1.0 - range_fade * range_fade, 0.0, 1.0);
    range_fade = range_fade * range_fade;

    let diffuse = clamp(dot(normal, normalize(light_vector)), 0.0, 1.0);
    let falloff = select(1.0, range_fade / distance_sqr, direction_or_position.w > 0.0);
    return diffuse * falloff * globals.light_colors[index].rgb;
}

@fragment
fn fs_forward(in: VertexOutput) -> @location(0) vec4<f32> {
    let normal = normalize(in.normal);
    var light = vec3<f32>(0.0);
    for (var i = 0u; i < MAX_VISIBLE_LIGHTS; i++) {
        if globals.light_colors[i].a <= 0.0 {
            continue;
        }
        light += diffuse_light(i, in.world_position, normal);
    }
    return vec4<f32>(in.color.rgb * light, in.color.a);
}

@fragment
fn fs_error(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 1.0, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::unit_cube;
    use crate::camera::Camera;
    use crate::gpu::init_headless_blocking;
    use crate::pipeline::{MystPipeline, PipelineFlags, RenderContext};
    use crate::shader::{ERROR_SHADER_NAME, FORWARD_BASE, ShaderRegistry};
    use crate::visibility::Scene;
    use glam::{Mat4, Vec3};

    const SIZE: u32 = 64;

    fn create_test_device() -> Option<GpuDevice> {
        let ctx = init_headless_blocking().ok()?;
        GpuDevice::new(ctx.device, ctx.queue, SIZE, SIZE).ok()
    }

    fn pixel(pixels: &[u8], x: u32, y: u32) -> [u8; 4] {
        let i = ((y * SIZE + x) * 4) as usize;
        [pixels[i], pixels[i + 1], pixels[i + 2], pixels[i + 3]]
    }

    #[test]
    fn test_globals_uniform_size() {
        assert_eq!(std::mem::size_of::<GlobalsUniform>(), 464);
    }

    #[test]
    fn test_oversized_target_is_rejected() {
        let Ok(ctx) = init_headless_blocking() else {
            return;
        };
        let max = ctx.device.limits().max_texture_dimension_2d;
        let result = GpuDevice::new(ctx.device, ctx.queue, max + 1, SIZE);
        assert!(matches!(
            result,
            Err(GpuDeviceError::TargetTooLarge { width, height, .. })
                if width == max + 1 && height == SIZE
        ));
    }

    #[test]
    fn test_target_too_large_message() {
        let err = GpuDeviceError::TargetTooLarge {
            width: 20000,
            height: 720,
            max: 8192,
        };
        assert_eq!(err.to_string(), "render target 20000x720 exceeds the device limit of 8192");
    }

    #[test]
    fn test_clear_only_frame_fills_background() {
        let Some(mut device) = create_test_device() else {
            return;
        };
        let mut buffer = CommandBuffer::new("clear");
        buffer.clear_render_target(true, true, Vec4::new(1.0, 0.0, 0.0, 1.0));
        device.execute_command_buffer(&buffer);
        device.submit();

        let pixels = device.read_color_target().unwrap();
        assert_eq!(pixels.len(), (SIZE * SIZE * 4) as usize);
        assert_eq!(pixel(&pixels, 0, 0), [255, 0, 0, 255]);
        assert_eq!(pixel(&pixels, SIZE / 2, SIZE / 2), [255, 0, 0, 255]);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let Some(mut device) = create_test_device() else {
            return;
        };
        device
            .register_pipeline(PipelineId(0), ShaderProgram::Error, BlendMode::Opaque)
            .unwrap();
        assert!(matches!(
            device.register_pipeline(PipelineId(0), ShaderProgram::Error, BlendMode::Opaque),
            Err(GpuDeviceError::DuplicatePipeline(PipelineId(0)))
        ));

        let (vertices, indices, _) = unit_cube();
        device.upload_mesh(MeshId(1), &vertices, &indices).unwrap();
        assert!(matches!(
            device.upload_mesh(MeshId(1), &vertices, &indices),
            Err(GpuDeviceError::DuplicateMesh(MeshId(1)))
        ));
    }

    #[test]
    fn test_fallback_draws_unsupported_material_in_magenta() {
        let Some(mut device) = create_test_device() else {
            return;
        };

        let mut shaders = ShaderLibrary::with_builtin_shaders();
        let legacy = shaders.register_shader("Legacy/Diffuse", &[FORWARD_BASE]);
        let error_shader = shaders.find_shader(ERROR_SHADER_NAME).unwrap();
        device
            .register_shader_passes(&shaders, error_shader, ShaderProgram::Error, BlendMode::Opaque)
            .unwrap();
        let material = shaders.create_material(legacy).unwrap();

        let (vertices, indices, bounds) = unit_cube();
        device.upload_mesh(MeshId(0), &vertices, &indices).unwrap();

        let mut scene = Scene::new();
        scene.spawn(
            MeshId(0),
            material.id,
            crate::batching::queue::GEOMETRY,
            Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0)),
            bounds,
        );

        let camera = Camera {
            background_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            ..Camera::default()
        };
        let mut pipeline = MystPipeline::new(PipelineFlags::empty(), true);
        let mut ctx = RenderContext {
            scene: &scene,
            shaders: &mut shaders,
            device: &mut device,
        };
        pipeline.render(&mut ctx, &[camera]);

        let stats = device.last_frame_stats();
        assert_eq!(stats.draws, 1);
        assert_eq!(stats.skipped, 0);

        let pixels = device.read_color_target().unwrap();
        assert_eq!(pixel(&pixels, SIZE / 2, SIZE / 2), [255, 0, 255, 255]);
        assert_eq!(pixel(&pixels, 0, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn test_unregistered_pipeline_is_skipped() {
        let Some(mut device) = create_test_device() else {
            return;
        };
        let mut shaders = ShaderLibrary::new();
        let unlit = shaders.register_shader("Myst/Unlit", &[crate::shader::SRP_DEFAULT_UNLIT]);
        let material = shaders.create_material(unlit).unwrap();
        let (vertices, indices, bounds) = unit_cube();
        device.upload_mesh(MeshId(0), &vertices, &indices).unwrap();

        let mut scene = Scene::new();
        scene.spawn(
            MeshId(0),
            material.id,
            crate::batching::queue::GEOMETRY,
            Mat4::from_translation(Vec3::new(0.0, 0.0, -3.0)),
            bounds,
        );

        let mut pipeline = MystPipeline::new(PipelineFlags::empty(), false);
        let mut ctx = RenderContext {
            scene: &scene,
            shaders: &mut shaders,
            device: &mut device,
        };
        pipeline.render(&mut ctx, &[Camera::default()]);

        let stats = device.last_frame_stats();
        assert_eq!(stats.draws, 0);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.passes, 2);
    }
}
