//! Visibility: what a camera can see this frame.
//!
//! [`SceneVisibility`] is the seam to whatever owns the scene. [`Scene`] is a
//! flat reference implementation used by the demo and tests.

use glam::{Mat4, Vec4};
use myst_lighting::LightRecord;

use crate::camera::CullingParameters;
use crate::frustum::Aabb;
use crate::shader::MaterialId;

/// Handle to a mesh known to the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub u32);

/// Handle to a renderable in the scene.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderableId(pub u32);

/// A mesh drawn with a material at a world transform.
#[derive(Clone, Debug, PartialEq)]
pub struct Renderable {
    /// Scene handle.
    pub id: RenderableId,
    /// Geometry.
    pub mesh: MeshId,
    /// Material; its shader decides which passes draw the renderable.
    pub material: MaterialId,
    /// Render queue of the material (see [`crate::batching::queue`]).
    pub render_queue: u32,
    /// World transform.
    pub local_to_world: Mat4,
    /// World-space bounds.
    pub bounds: Aabb,
    /// Layer index in `0..32`, tested against the camera's culling mask.
    pub layer: u8,
    /// Per-object `_Color` override.
    pub color_override: Option<Vec4>,
}

/// Renderables and lights visible to one camera, in a deterministic order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VisibleSet {
    /// Visible renderables.
    pub renderables: Vec<Renderable>,
    /// Visible lights.
    pub lights: Vec<LightRecord>,
}

/// Produces the visible set for a camera's culling parameters.
pub trait SceneVisibility {
    /// Cull the scene. Read-only.
    fn cull(&self, params: &CullingParameters) -> VisibleSet;
}

/// A flat list of renderables and lights.
#[derive(Debug, Default)]
pub struct Scene {
    renderables: Vec<Renderable>,
    lights: Vec<LightRecord>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a renderable with bounds given in mesh-local space.
    pub fn spawn(
        &mut self,
        mesh: MeshId,
        material: MaterialId,
        render_queue: u32,
        local_to_world: Mat4,
        local_bounds: Aabb,
    ) -> RenderableId {
        let id = RenderableId(self.renderables.len() as u32);
        self.renderables.push(Renderable {
            id,
            mesh,
            material,
            render_queue,
            local_to_world,
            bounds: local_bounds.transformed(&local_to_world),
            layer: 0,
            color_override: None,
        });
        id
    }

    /// Add a light.
    pub fn add_light(&mut self, light: LightRecord) {
        self.lights.push(light);
    }

    /// Mutable access to a renderable.
    pub fn renderable_mut(&mut self, id: RenderableId) -> Option<&mut Renderable> {
        self.renderables.get_mut(id.0 as usize)
    }

    /// Set or clear the per-object color override.
    pub fn set_color_override(&mut self, id: RenderableId, color: Option<Vec4>) {
        if let Some(renderable) = self.renderable_mut(id) {
            renderable.color_override = color;
        }
    }

    /// All renderables, visible or not.
    pub fn renderables(&self) -> &[Renderable] {
        &self.renderables
    }

    /// All lights, visible or not.
    pub fn lights(&self) -> &[LightRecord] {
        &self.lights
    }
}

impl SceneVisibility for Scene {
    fn cull(&self, params: &CullingParameters) -> VisibleSet {
        let renderables = self
            .renderables
            .iter()
            .filter(|r| layer_visible(params.culling_mask, r.layer))
            .filter(|r| params.frustum.is_visible(&r.bounds))
            .cloned()
            .collect();

        let lights = self
            .lights
            .iter()
            .filter(|light| {
                !light.kind.is_positional()
                    || params
                        .frustum
                        .is_sphere_visible(light.position().truncate(), light.range)
            })
            .cloned()
            .collect();

        VisibleSet {
            renderables,
            lights,
        }
    }
}

fn layer_visible(mask: u32, layer: u8) -> bool {
    layer < 32 && mask & (1 << layer) != 0
}
