//! Debug pass that redraws renderables whose shaders only implement legacy
//! pass names, using the built-in error material.

use log::{debug, error};

use crate::batching::{DrawBatch, DrawBatchSpec, RenderQueueRange, SortCriteria, ViewPoint};
use crate::command::CommandBuffer;
use crate::shader::{ERROR_SHADER_NAME, LEGACY_PASS_TAGS, Material, ShaderRegistry};
use crate::visibility::VisibleSet;

/// Lazily created error material.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorMaterial {
    /// Not requested yet.
    #[default]
    Pending,
    /// Created from the error shader.
    Ready(Material),
    /// The error shader (or its material) could not be obtained.
    Unavailable,
}

impl ErrorMaterial {
    /// Return the material, creating it on first use.
    ///
    /// Creation is attempted at most once; a failure is logged and remembered.
    pub fn get_or_create(&mut self, registry: &mut dyn ShaderRegistry) -> Option<Material> {
        if let ErrorMaterial::Pending = self {
            *self = match registry
                .find_shader(ERROR_SHADER_NAME)
                .and_then(|shader| registry.create_material(shader))
            {
                Some(material) => {
                    debug!("Created error material {:?}", material.id);
                    ErrorMaterial::Ready(material)
                }
                None => {
                    error!(
                        "Shader '{}' is unavailable; unsupported materials will not be drawn",
                        ERROR_SHADER_NAME
                    );
                    ErrorMaterial::Unavailable
                }
            };
        }
        match self {
            ErrorMaterial::Ready(material) => Some(*material),
            _ => None,
        }
    }
}

/// Draws unsupported materials in a flat error color when debugging.
#[derive(Debug)]
pub struct FallbackRenderer {
    enabled: bool,
    error_material: ErrorMaterial,
}

impl FallbackRenderer {
    /// Create a renderer; `enabled` is the runtime debug flag.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            error_material: ErrorMaterial::Pending,
        }
    }

    /// Whether the pass runs.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current error material state.
    pub fn error_material(&self) -> ErrorMaterial {
        self.error_material
    }

    /// The fallback pass drawn with `material`: every legacy tag, every queue,
    /// visibility order, no batching.
    pub fn spec(material: Material) -> DrawBatchSpec {
        DrawBatchSpec::with_tags(LEGACY_PASS_TAGS.to_vec())
            .in_queues(RenderQueueRange::ALL)
            .sorted_by(SortCriteria::None)
            .batching(false, false)
            .with_override_material(material)
    }

    /// Record the fallback draw batch. Returns immediately when disabled or
    /// when the error material is unavailable.
    pub fn record(
        &mut self,
        buffer: &mut CommandBuffer,
        visible: &VisibleSet,
        view: &ViewPoint,
        registry: &mut dyn ShaderRegistry,
    ) {
        if !self.enabled {
            return;
        }
        let Some(material) = self.error_material.get_or_create(registry) else {
            return;
        };

        let batch = DrawBatch::build(&Self::spec(material), visible, view, registry);
        buffer.draw_renderers(batch);
    }
}
