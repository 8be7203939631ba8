//! Forward render orchestration: culling, light aggregation, sorted opaque and
//! transparent passes, the unsupported-material fallback pass, and the devices
//! that execute the recorded work.

pub mod batching;
pub mod buffer;
pub mod camera;
pub mod command;
pub mod fallback;
pub mod frustum;
pub mod gpu;
pub mod gpu_device;
pub mod pipeline;
pub mod recording;
pub mod shader;
pub mod visibility;

pub use batching::{
    DrawBatch, DrawBatchSpec, DrawCall, DrawGroup, InstancedDraw, RenderQueueRange, SortCriteria,
    ViewPoint, queue,
};
pub use buffer::{BufferAllocator, InstanceData, MeshBuffer, VertexPositionNormal, unit_cube};
pub use camera::{Camera, CameraKind, CameraUniform, ClearFlags, CullingParameters, Projection};
pub use command::{CAMERA_BUFFER_NAME, CommandBuffer, RenderCommand, RenderDevice};
pub use fallback::{ErrorMaterial, FallbackRenderer};
pub use frustum::{Aabb, Frustum};
pub use gpu::{GpuContext, GpuContextError, init_headless_blocking};
pub use gpu_device::{BlendMode, FrameStats, GpuDevice, GpuDeviceError, ShaderProgram};
pub use pipeline::{MystPipeline, PipelineFlags, RenderContext};
pub use recording::{RecordingDevice, SubmittedFrame};
pub use shader::{
    Material, MaterialId, PipelineId, ShaderId, ShaderLibrary, ShaderRegistry, ShaderTagId,
};
pub use visibility::{MeshId, Renderable, RenderableId, Scene, SceneVisibility, VisibleSet};
