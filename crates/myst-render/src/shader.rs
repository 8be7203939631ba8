//! Shader pass tags, the shader/material registry seam and a table-backed registry.
//!
//! A shader exposes one or more passes, each identified by a [`ShaderTagId`] and
//! backed by a device pipeline-state object ([`PipelineId`]). Draw passes select
//! renderables by asking the registry whether the renderable's material has a
//! pass with one of the pass's tags.

use std::borrow::Cow;
use std::collections::HashMap;

use log::{debug, info};

/// Name of a shader pass ("LightMode" tag).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShaderTagId(Cow<'static, str>);

impl ShaderTagId {
    /// Tag from a static name, usable in constants.
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Tag from an owned or borrowed name.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// The tag string.
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// Default tag drawn by the opaque and transparent passes.
pub const SRP_DEFAULT_UNLIT: ShaderTagId = ShaderTagId::from_static("SRPDefaultUnlit");
/// Legacy forward base pass.
pub const FORWARD_BASE: ShaderTagId = ShaderTagId::from_static("ForwardBase");
/// Legacy deferred prepass.
pub const PREPASS_BASE: ShaderTagId = ShaderTagId::from_static("PrepassBase");
/// Legacy pass drawn regardless of lighting.
pub const ALWAYS: ShaderTagId = ShaderTagId::from_static("Always");
/// Legacy per-vertex lit pass.
pub const VERTEX: ShaderTagId = ShaderTagId::from_static("Vertex");
/// Legacy per-vertex lightmapped pass, RGBM encoded.
pub const VERTEX_LM_RGBM: ShaderTagId = ShaderTagId::from_static("VertexLMRGBM");
/// Legacy per-vertex lightmapped pass.
pub const VERTEX_LM: ShaderTagId = ShaderTagId::from_static("VertexLM");

/// Every legacy pass name; the fallback pass catches shaders that only implement these.
pub const LEGACY_PASS_TAGS: [ShaderTagId; 6] = [
    FORWARD_BASE,
    PREPASS_BASE,
    ALWAYS,
    VERTEX,
    VERTEX_LM_RGBM,
    VERTEX_LM,
];

/// Built-in shader used for the unsupported-material fallback.
pub const ERROR_SHADER_NAME: &str = "Hidden/InternalErrorShader";

/// Handle to a registered shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub u32);

/// Handle to a material instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// Handle to a device pipeline-state object for one shader pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PipelineId(pub u32);

/// A material created from a shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Material {
    /// Material handle.
    pub id: MaterialId,
    /// Shader the material was created from.
    pub shader: ShaderId,
}

/// Resolves shader tags and names to device state.
pub trait ShaderRegistry {
    /// Pipeline state for drawing `material` with its pass tagged `tag`, if the
    /// material's shader implements that pass.
    fn resolve_pass(&self, material: MaterialId, tag: &ShaderTagId) -> Option<PipelineId>;

    /// Pipeline state for pass number `index` of `material`'s shader.
    fn resolve_pass_index(&self, material: MaterialId, index: usize) -> Option<PipelineId>;

    /// Look up a shader by name.
    fn find_shader(&self, name: &str) -> Option<ShaderId>;

    /// Create a new material using `shader`.
    fn create_material(&mut self, shader: ShaderId) -> Option<Material>;
}

/// One pass of a registered shader.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderPass {
    /// Pass tag.
    pub tag: ShaderTagId,
    /// Device pipeline-state object for the pass.
    pub pipeline: PipelineId,
}

/// A registered shader and its passes.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderDef {
    /// Shader name, e.g. `"Myst/Unlit"`.
    pub name: String,
    /// Passes in declaration order.
    pub passes: Vec<ShaderPass>,
}

/// Table-backed [`ShaderRegistry`]: shaders by name, materials by index.
///
/// Pipeline ids are handed out sequentially as passes are registered; a device
/// backend compiles one pipeline-state object per id.
#[derive(Debug, Default)]
pub struct ShaderLibrary {
    shaders: Vec<ShaderDef>,
    by_name: HashMap<String, ShaderId>,
    materials: Vec<ShaderId>,
    next_pipeline: u32,
}

impl ShaderLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a library holding the built-in error shader.
    pub fn with_builtin_shaders() -> Self {
        let mut library = Self::new();
        library.register_shader(ERROR_SHADER_NAME, &[ALWAYS]);
        library
    }

    /// Register a shader whose passes carry `tags`, in order.
    ///
    /// Re-registering a name replaces the previous passes; existing materials
    /// then resolve to the new passes.
    pub fn register_shader(&mut self, name: &str, tags: &[ShaderTagId]) -> ShaderId {
        let passes: Vec<ShaderPass> = tags
            .iter()
            .map(|tag| {
                let pipeline = PipelineId(self.next_pipeline);
                self.next_pipeline += 1;
                ShaderPass {
                    tag: tag.clone(),
                    pipeline,
                }
            })
            .collect();

        if let Some(&id) = self.by_name.get(name) {
            self.shaders[id.0 as usize].passes = passes;
            info!("Replaced shader '{}'", name);
            return id;
        }

        let id = ShaderId(self.shaders.len() as u32);
        self.shaders.push(ShaderDef {
            name: name.to_string(),
            passes,
        });
        self.by_name.insert(name.to_string(), id);
        debug!("Registered shader '{}' with {} passes", name, tags.len());
        id
    }

    /// A registered shader.
    pub fn shader(&self, id: ShaderId) -> Option<&ShaderDef> {
        self.shaders.get(id.0 as usize)
    }

    /// Shader backing `material`.
    pub fn material_shader(&self, material: MaterialId) -> Option<ShaderId> {
        self.materials.get(material.0 as usize).copied()
    }

    /// Number of materials created so far.
    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Number of registered shaders.
    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    /// Whether no shader is registered.
    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    fn material_passes(&self, material: MaterialId) -> Option<&[ShaderPass]> {
        let shader = self.material_shader(material)?;
        self.shader(shader).map(|def| def.passes.as_slice())
    }
}

impl ShaderRegistry for ShaderLibrary {
    fn resolve_pass(&self, material: MaterialId, tag: &ShaderTagId) -> Option<PipelineId> {
        self.material_passes(material)?
            .iter()
            .find(|pass| &pass.tag == tag)
            .map(|pass| pass.pipeline)
    }

    fn resolve_pass_index(&self, material: MaterialId, index: usize) -> Option<PipelineId> {
        self.material_passes(material)?
            .get(index)
            .map(|pass| pass.pipeline)
    }

    fn find_shader(&self, name: &str) -> Option<ShaderId> {
        self.by_name.get(name).copied()
    }

    fn create_material(&mut self, shader: ShaderId) -> Option<Material> {
        self.shader(shader)?;
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(shader);
        Some(Material { id, shader })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_starts_empty() {
        let library = ShaderLibrary::new();
        assert!(library.is_empty());
        assert_eq!(library.material_count(), 0);
    }

    #[test]
    fn test_builtin_error_shader_is_registered() {
        let library = ShaderLibrary::with_builtin_shaders();
        let shader = library.find_shader(ERROR_SHADER_NAME).unwrap();
        assert_eq!(library.shader(shader).unwrap().passes.len(), 1);
    }

    #[test]
    fn test_resolve_pass_by_tag() {
        let mut library = ShaderLibrary::new();
        let shader = library.register_shader("Myst/Unlit", &[SRP_DEFAULT_UNLIT, ALWAYS]);
        let material = library.create_material(shader).unwrap();

        let unlit = library.resolve_pass(material.id, &SRP_DEFAULT_UNLIT);
        let always = library.resolve_pass(material.id, &ALWAYS);
        assert!(unlit.is_some());
        assert!(always.is_some());
        assert_ne!(unlit, always);
        assert!(library.resolve_pass(material.id, &FORWARD_BASE).is_none());
    }

    #[test]
    fn test_resolve_pass_index() {
        let mut library = ShaderLibrary::new();
        let shader = library.register_shader("Legacy/Diffuse", &[FORWARD_BASE, VERTEX]);
        let material = library.create_material(shader).unwrap();
        assert_eq!(
            library.resolve_pass_index(material.id, 1),
            library.resolve_pass(material.id, &VERTEX)
        );
        assert!(library.resolve_pass_index(material.id, 2).is_none());
    }

    #[test]
    fn test_pipeline_ids_are_unique_across_shaders() {
        let mut library = ShaderLibrary::new();
        let a = library.register_shader("A", &[SRP_DEFAULT_UNLIT]);
        let b = library.register_shader("B", &[SRP_DEFAULT_UNLIT]);
        let pa = library.shader(a).unwrap().passes[0].pipeline;
        let pb = library.shader(b).unwrap().passes[0].pipeline;
        assert_ne!(pa, pb);
    }

    #[test]
    fn test_reregister_replaces_passes() {
        let mut library = ShaderLibrary::new();
        let first = library.register_shader("Myst/Unlit", &[ALWAYS]);
        let material = library.create_material(first).unwrap();
        let second = library.register_shader("Myst/Unlit", &[SRP_DEFAULT_UNLIT]);

        assert_eq!(first, second);
        assert_eq!(library.len(), 1);
        assert!(library.resolve_pass(material.id, &ALWAYS).is_none());
        assert!(library.resolve_pass(material.id, &SRP_DEFAULT_UNLIT).is_some());
    }

    #[test]
    fn test_create_material_for_unknown_shader_fails() {
        let mut library = ShaderLibrary::new();
        assert!(library.create_material(ShaderId(7)).is_none());
    }

    #[test]
    fn test_unknown_material_resolves_nothing() {
        let library = ShaderLibrary::with_builtin_shaders();
        assert!(library.resolve_pass(MaterialId(3), &ALWAYS).is_none());
    }

    #[test]
    fn test_legacy_tags_exclude_default_unlit() {
        assert_eq!(LEGACY_PASS_TAGS.len(), 6);
        assert!(!LEGACY_PASS_TAGS.contains(&SRP_DEFAULT_UNLIT));
        assert_eq!(LEGACY_PASS_TAGS[0].name(), "ForwardBase");
    }
}
