//! Draw batching: filter visible renderables into draw calls, sort them and
//! group them to minimize GPU state changes.
//!
//! A [`DrawBatchSpec`] says which passes and queues a draw pass covers and how
//! it is sorted. [`DrawBatch::build`] turns a visible set into sorted
//! [`DrawCall`]s. Grouping is decided by the batching flags: with dynamic
//! batching (or instancing) consecutive calls sharing pipeline and material are
//! yielded together, and with instancing calls sharing a mesh inside a group
//! collapse into one instanced draw. The flags never change which calls exist.

use std::cmp::Ordering;

use glam::{Mat4, Vec3, Vec4};

use crate::camera::CullingParameters;
use crate::shader::{Material, MaterialId, PipelineId, ShaderRegistry, ShaderTagId};
use crate::visibility::{MeshId, Renderable, RenderableId, VisibleSet};

/// Standard render queue values.
pub mod queue {
    /// Drawn first, e.g. skyboxes.
    pub const BACKGROUND: u32 = 1000;
    /// Default opaque geometry.
    pub const GEOMETRY: u32 = 2000;
    /// Alpha-tested geometry, after plain opaque.
    pub const ALPHA_TEST: u32 = 2450;
    /// Alpha-blended geometry.
    pub const TRANSPARENT: u32 = 3000;
    /// Drawn last, e.g. lens effects.
    pub const OVERLAY: u32 = 4000;
}

/// Width of the depth buckets used by front-to-back opaque sorting.
///
/// Renderables whose depth falls in the same bucket are ordered by state, so
/// small depth differences do not break up batches.
pub const OPAQUE_DEPTH_BUCKET: f32 = 4.0;

/// Inclusive range of render queues drawn by a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderQueueRange {
    /// Lowest queue drawn.
    pub lower: u32,
    /// Highest queue drawn.
    pub upper: u32,
}

impl RenderQueueRange {
    /// Queues `0..=2500`.
    pub const OPAQUE: Self = Self::new(0, 2500);
    /// Queues `2501..=5000`.
    pub const TRANSPARENT: Self = Self::new(2501, 5000);
    /// Queues `0..=5000`.
    pub const ALL: Self = Self::new(0, 5000);

    /// Range `lower..=upper`.
    pub const fn new(lower: u32, upper: u32) -> Self {
        Self { lower, upper }
    }

    /// Whether `queue` falls in the range.
    pub fn contains(&self, queue: u32) -> bool {
        (self.lower..=self.upper).contains(&queue)
    }
}

/// Order in which a pass draws.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SortCriteria {
    /// Visibility order.
    #[default]
    None,
    /// Queue, then front-to-back by bucketed depth, then pipeline, material, mesh.
    CommonOpaque,
    /// Queue, then back-to-front by depth, then pipeline, material, mesh.
    CommonTransparent,
}

/// Where depth is measured from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewPoint {
    /// Eye position.
    pub position: Vec3,
    /// Unit view direction.
    pub forward: Vec3,
}

impl ViewPoint {
    /// Distance of `point` along the view direction.
    pub fn depth(&self, point: Vec3) -> f32 {
        (point - self.position).dot(self.forward)
    }
}

impl From<&CullingParameters> for ViewPoint {
    fn from(params: &CullingParameters) -> Self {
        Self {
            position: params.position,
            forward: params.forward,
        }
    }
}

/// What a draw pass draws and how.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawBatchSpec {
    /// A renderable is drawn when its material has a pass with one of these
    /// tags; the first matching tag wins.
    pub shader_tags: Vec<ShaderTagId>,
    /// Sort order.
    pub sort: SortCriteria,
    /// Queues drawn.
    pub queue_range: RenderQueueRange,
    /// Group consecutive calls sharing pipeline and material.
    pub dynamic_batching: bool,
    /// Collapse calls sharing a mesh into instanced draws.
    pub instancing: bool,
    /// Draw every matched renderable with pass 0 of this material instead.
    pub override_material: Option<Material>,
}

impl DrawBatchSpec {
    /// A pass drawing `tag` over every queue in visibility order.
    pub fn new(tag: ShaderTagId) -> Self {
        Self::with_tags(vec![tag])
    }

    /// A pass drawing any of `tags` over every queue in visibility order.
    pub fn with_tags(tags: impl Into<Vec<ShaderTagId>>) -> Self {
        Self {
            shader_tags: tags.into(),
            sort: SortCriteria::None,
            queue_range: RenderQueueRange::ALL,
            dynamic_batching: false,
            instancing: false,
            override_material: None,
        }
    }

    /// Set the sort order.
    pub fn sorted_by(mut self, sort: SortCriteria) -> Self {
        self.sort = sort;
        self
    }

    /// Restrict to a queue range.
    pub fn in_queues(mut self, range: RenderQueueRange) -> Self {
        self.queue_range = range;
        self
    }

    /// Set both batching flags.
    pub fn batching(mut self, dynamic_batching: bool, instancing: bool) -> Self {
        self.dynamic_batching = dynamic_batching;
        self.instancing = instancing;
        self
    }

    /// Replace every matched renderable's material.
    pub fn with_override_material(mut self, material: Material) -> Self {
        self.override_material = Some(material);
        self
    }
}

/// One renderable drawn with one pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawCall {
    /// Pipeline-state object.
    pub pipeline_id: PipelineId,
    /// Material bound for the draw.
    pub material_id: MaterialId,
    /// Geometry.
    pub mesh_id: MeshId,
    /// Source renderable.
    pub renderable: RenderableId,
    /// Queue of the renderable's own material.
    pub render_queue: u32,
    /// Depth of the bounds center along the view direction.
    pub depth: f32,
    /// World transform.
    pub transform: Mat4,
    /// Per-object `_Color` override.
    pub color_override: Option<Vec4>,
}

/// The sorted draw calls of one pass plus the batching flags they were built with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawBatch {
    draw_calls: Vec<DrawCall>,
    sort: SortCriteria,
    dynamic_batching: bool,
    instancing: bool,
}

impl DrawBatch {
    /// Filter, resolve and sort the renderables of `visible` for one pass.
    ///
    /// Renderables outside the queue range or whose material has no pass with
    /// any of the requested tags are skipped. With an override material the draw
    /// uses the override's pass 0; if the override has no pass 0 nothing is drawn.
    pub fn build(
        spec: &DrawBatchSpec,
        visible: &VisibleSet,
        view: &ViewPoint,
        registry: &dyn ShaderRegistry,
    ) -> Self {
        let override_pass = spec
            .override_material
            .and_then(|material| Some((material.id, registry.resolve_pass_index(material.id, 0)?)));
        if spec.override_material.is_some() && override_pass.is_none() {
            return Self::empty(spec);
        }

        let mut draw_calls: Vec<DrawCall> = visible
            .renderables
            .iter()
            .filter(|r| spec.queue_range.contains(r.render_queue))
            .filter_map(|r| {
                let own_pipeline = spec
                    .shader_tags
                    .iter()
                    .find_map(|tag| registry.resolve_pass(r.material, tag))?;
                let (material_id, pipeline_id) =
                    override_pass.unwrap_or((r.material, own_pipeline));
                Some(make_call(r, pipeline_id, material_id, view))
            })
            .collect();

        sort_calls(&mut draw_calls, spec.sort);

        Self {
            draw_calls,
            sort: spec.sort,
            dynamic_batching: spec.dynamic_batching,
            instancing: spec.instancing,
        }
    }

    fn empty(spec: &DrawBatchSpec) -> Self {
        Self {
            draw_calls: Vec::new(),
            sort: spec.sort,
            dynamic_batching: spec.dynamic_batching,
            instancing: spec.instancing,
        }
    }

    /// Number of draw calls in the batch.
    pub fn len(&self) -> usize {
        self.draw_calls.len()
    }

    /// Whether the batch contains no draw calls.
    pub fn is_empty(&self) -> bool {
        self.draw_calls.is_empty()
    }

    /// Draw calls in draw order.
    pub fn draw_calls(&self) -> &[DrawCall] {
        &self.draw_calls
    }

    /// Sort order the batch was built with.
    pub fn sort(&self) -> SortCriteria {
        self.sort
    }

    /// Whether dynamic batching was requested.
    pub fn dynamic_batching(&self) -> bool {
        self.dynamic_batching
    }

    /// Whether instancing was requested.
    pub fn instancing(&self) -> bool {
        self.instancing
    }

    /// Iterate over state groups in draw order.
    ///
    /// With either batching flag set, consecutive calls sharing pipeline and
    /// material form one group; otherwise every call is its own group.
    pub fn groups(&self) -> DrawGroupIter<'_> {
        DrawGroupIter {
            calls: &self.draw_calls,
            cursor: 0,
            merge: self.dynamic_batching || self.instancing,
            instancing: self.instancing,
        }
    }

    /// Number of device draws the batch turns into under its flags.
    pub fn device_draw_count(&self) -> usize {
        self.groups().map(|group| group.instanced_groups().count()).sum()
    }
}

fn make_call(
    renderable: &Renderable,
    pipeline_id: PipelineId,
    material_id: MaterialId,
    view: &ViewPoint,
) -> DrawCall {
    DrawCall {
        pipeline_id,
        material_id,
        mesh_id: renderable.mesh,
        renderable: renderable.id,
        render_queue: renderable.render_queue,
        depth: view.depth(renderable.bounds.center()),
        transform: renderable.local_to_world,
        color_override: renderable.color_override,
    }
}

fn state_order(a: &DrawCall, b: &DrawCall) -> Ordering {
    a.pipeline_id
        .cmp(&b.pipeline_id)
        .then(a.material_id.cmp(&b.material_id))
        .then(a.mesh_id.cmp(&b.mesh_id))
}

fn depth_bucket(depth: f32) -> i64 {
    (depth / OPAQUE_DEPTH_BUCKET).floor() as i64
}

// Stable sorts so ties keep visibility order.
fn sort_calls(calls: &mut [DrawCall], sort: SortCriteria) {
    match sort {
        SortCriteria::None => {}
        SortCriteria::CommonOpaque => calls.sort_by(|a, b| {
            a.render_queue
                .cmp(&b.render_queue)
                .then(depth_bucket(a.depth).cmp(&depth_bucket(b.depth)))
                .then_with(|| state_order(a, b))
        }),
        SortCriteria::CommonTransparent => calls.sort_by(|a, b| {
            a.render_queue
                .cmp(&b.render_queue)
                .then(b.depth.total_cmp(&a.depth))
                .then_with(|| state_order(a, b))
        }),
    }
}

/// A run of draw calls sharing the same pipeline and material.
#[derive(Debug)]
pub struct DrawGroup<'a> {
    /// The pipeline ID shared by all calls in this group.
    pub pipeline_id: PipelineId,
    /// The material ID shared by all calls in this group.
    pub material_id: MaterialId,
    /// The draw calls in this group.
    pub calls: &'a [DrawCall],
    instancing: bool,
}

impl<'a> DrawGroup<'a> {
    /// Yield the device draws of this group.
    ///
    /// With instancing, consecutive calls sharing a mesh are one draw;
    /// otherwise every call is its own draw with one instance.
    pub fn instanced_groups(&self) -> InstancedGroupIter<'a> {
        InstancedGroupIter {
            calls: self.calls,
            cursor: 0,
            merge: self.instancing,
        }
    }
}

/// Iterator over [`DrawGroup`]s within a [`DrawBatch`].
pub struct DrawGroupIter<'a> {
    calls: &'a [DrawCall],
    cursor: usize,
    merge: bool,
    instancing: bool,
}

impl<'a> Iterator for DrawGroupIter<'a> {
    type Item = DrawGroup<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.calls.len() {
            return None;
        }

        let start = self.cursor;
        let pipeline_id = self.calls[start].pipeline_id;
        let material_id = self.calls[start].material_id;
        self.cursor += 1;

        while self.merge
            && self.cursor < self.calls.len()
            && self.calls[self.cursor].pipeline_id == pipeline_id
            && self.calls[self.cursor].material_id == material_id
        {
            self.cursor += 1;
        }

        Some(DrawGroup {
            pipeline_id,
            material_id,
            calls: &self.calls[start..self.cursor],
            instancing: self.instancing,
        })
    }
}

/// A run of draw calls sharing the same mesh, drawn as one instanced draw.
#[derive(Debug)]
pub struct InstancedDraw<'a> {
    /// The mesh ID shared by all calls in this sub-group.
    pub mesh_id: MeshId,
    /// The draw calls in this sub-group.
    pub calls: &'a [DrawCall],
}

impl InstancedDraw<'_> {
    /// Number of instances to draw.
    pub fn instance_count(&self) -> u32 {
        self.calls.len() as u32
    }
}

/// Iterator over [`InstancedDraw`] sub-groups within a [`DrawGroup`].
pub struct InstancedGroupIter<'a> {
    calls: &'a [DrawCall],
    cursor: usize,
    merge: bool,
}

impl<'a> Iterator for InstancedGroupIter<'a> {
    type Item = InstancedDraw<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.calls.len() {
            return None;
        }

        let start = self.cursor;
        let mesh_id = self.calls[start].mesh_id;
        self.cursor += 1;

        while self.merge
            && self.cursor < self.calls.len()
            && self.calls[self.cursor].mesh_id == mesh_id
        {
            self.cursor += 1;
        }

        Some(InstancedDraw {
            mesh_id,
            calls: &self.calls[start..self.cursor],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frustum::Aabb;
    use crate::shader::{ALWAYS, FORWARD_BASE, SRP_DEFAULT_UNLIT, ShaderLibrary};

    struct Fixture {
        library: ShaderLibrary,
        unlit_a: Material,
        unlit_b: Material,
        legacy: Material,
    }

    fn fixture() -> Fixture {
        let mut library = ShaderLibrary::with_builtin_shaders();
        let unlit = library.register_shader("Myst/Unlit", &[SRP_DEFAULT_UNLIT]);
        let other = library.register_shader("Myst/UnlitTinted", &[SRP_DEFAULT_UNLIT]);
        let legacy = library.register_shader("Legacy/Diffuse", &[FORWARD_BASE]);
        Fixture {
            unlit_a: library.create_material(unlit).unwrap(),
            unlit_b: library.create_material(other).unwrap(),
            legacy: library.create_material(legacy).unwrap(),
            library,
        }
    }

    fn renderable(id: u32, mesh: u32, material: MaterialId, queue: u32, z: f32) -> Renderable {
        let transform = Mat4::from_translation(Vec3::new(0.0, 0.0, z));
        Renderable {
            id: RenderableId(id),
            mesh: MeshId(mesh),
            material,
            render_queue: queue,
            local_to_world: transform,
            bounds: Aabb::from_center_extents(Vec3::new(0.0, 0.0, z), Vec3::splat(0.5)),
            layer: 0,
            color_override: None,
        }
    }

    fn view() -> ViewPoint {
        ViewPoint {
            position: Vec3::ZERO,
            forward: Vec3::NEG_Z,
        }
    }

    fn ids(batch: &DrawBatch) -> Vec<u32> {
        batch.draw_calls().iter().map(|c| c.renderable.0).collect()
    }

    #[test]
    fn test_empty_visible_set_produces_zero_draw_calls() {
        let f = fixture();
        let batch = DrawBatch::build(
            &DrawBatchSpec::new(SRP_DEFAULT_UNLIT),
            &VisibleSet::default(),
            &view(),
            &f.library,
        );
        assert!(batch.is_empty());
        assert_eq!(batch.groups().count(), 0);
    }

    #[test]
    fn test_queue_ranges() {
        assert!(RenderQueueRange::OPAQUE.contains(queue::GEOMETRY));
        assert!(RenderQueueRange::OPAQUE.contains(queue::ALPHA_TEST));
        assert!(RenderQueueRange::OPAQUE.contains(2500));
        assert!(!RenderQueueRange::OPAQUE.contains(2501));
        assert!(RenderQueueRange::TRANSPARENT.contains(queue::TRANSPARENT));
        assert!(RenderQueueRange::TRANSPARENT.contains(queue::OVERLAY));
        assert!(!RenderQueueRange::TRANSPARENT.contains(queue::GEOMETRY));
        assert!(RenderQueueRange::ALL.contains(queue::BACKGROUND));
        assert!(!RenderQueueRange::ALL.contains(5001));
    }

    #[test]
    fn test_filters_by_tag_and_queue() {
        let f = fixture();
        let visible = VisibleSet {
            renderables: vec![
                renderable(0, 0, f.unlit_a.id, queue::GEOMETRY, -5.0),
                renderable(1, 0, f.legacy.id, queue::GEOMETRY, -5.0),
                renderable(2, 0, f.unlit_a.id, queue::TRANSPARENT, -5.0),
            ],
            lights: Vec::new(),
        };
        let spec = DrawBatchSpec::new(SRP_DEFAULT_UNLIT).in_queues(RenderQueueRange::OPAQUE);
        let batch = DrawBatch::build(&spec, &visible, &view(), &f.library);
        assert_eq!(ids(&batch), vec![0]);
    }

    #[test]
    fn test_opaque_sorts_front_to_back() {
        let f = fixture();
        let visible = VisibleSet {
            renderables: vec![
                renderable(0, 0, f.unlit_a.id, queue::GEOMETRY, -50.0),
                renderable(1, 0, f.unlit_a.id, queue::GEOMETRY, -5.0),
                renderable(2, 0, f.unlit_a.id, queue::GEOMETRY, -20.0),
            ],
            lights: Vec::new(),
        };
        let spec = DrawBatchSpec::new(SRP_DEFAULT_UNLIT).sorted_by(SortCriteria::CommonOpaque);
        let batch = DrawBatch::build(&spec, &visible, &view(), &f.library);
        assert_eq!(ids(&batch), vec![1, 2, 0]);
    }

    #[test]
    fn test_opaque_orders_by_queue_before_depth() {
        let f = fixture();
        let visible = VisibleSet {
            renderables: vec![
                renderable(0, 0, f.unlit_a.id, queue::ALPHA_TEST, -2.0),
                renderable(1, 0, f.unlit_a.id, queue::GEOMETRY, -90.0),
            ],
            lights: Vec::new(),
        };
        let spec = DrawBatchSpec::new(SRP_DEFAULT_UNLIT).sorted_by(SortCriteria::CommonOpaque);
        let batch = DrawBatch::build(&spec, &visible, &view(), &f.library);
        assert_eq!(ids(&batch), vec![1, 0]);
    }

    #[test]
    fn test_opaque_same_depth_bucket_sorts_by_state() {
        let f = fixture();
        // Both within one depth bucket; unlit_b's pipeline sorts after unlit_a's.
        let visible = VisibleSet {
            renderables: vec![
                renderable(0, 0, f.unlit_b.id, queue::GEOMETRY, -4.5),
                renderable(1, 0, f.unlit_a.id, queue::GEOMETRY, -5.5),
            ],
            lights: Vec::new(),
        };
        let spec = DrawBatchSpec::new(SRP_DEFAULT_UNLIT).sorted_by(SortCriteria::CommonOpaque);
        let batch = DrawBatch::build(&spec, &visible, &view(), &f.library);
        assert_eq!(ids(&batch), vec![1, 0]);
    }

    #[test]
    fn test_transparent_sorts_back_to_front() {
        let f = fixture();
        let visible = VisibleSet {
            renderables: vec![
                renderable(0, 0, f.unlit_a.id, queue::TRANSPARENT, -5.0),
                renderable(1, 0, f.unlit_a.id, queue::TRANSPARENT, -50.0),
                renderable(2, 0, f.unlit_a.id, queue::TRANSPARENT, -20.0),
            ],
            lights: Vec::new(),
        };
        let spec = DrawBatchSpec::new(SRP_DEFAULT_UNLIT)
            .sorted_by(SortCriteria::CommonTransparent)
            .in_queues(RenderQueueRange::TRANSPARENT);
        let batch = DrawBatch::build(&spec, &visible, &view(), &f.library);
        assert_eq!(ids(&batch), vec![1, 2, 0]);
    }

    #[test]
    fn test_no_sort_keeps_visibility_order() {
        let f = fixture();
        let visible = VisibleSet {
            renderables: vec![
                renderable(0, 2, f.unlit_b.id, queue::TRANSPARENT, -5.0),
                renderable(1, 1, f.unlit_a.id, queue::GEOMETRY, -50.0),
                renderable(2, 0, f.unlit_a.id, queue::BACKGROUND, -20.0),
            ],
            lights: Vec::new(),
        };
        let batch = DrawBatch::build(
            &DrawBatchSpec::new(SRP_DEFAULT_UNLIT),
            &visible,
            &view(),
            &f.library,
        );
        assert_eq!(ids(&batch), vec![0, 1, 2]);
    }

    #[test]
    fn test_first_matching_tag_selects_pass() {
        let mut library = ShaderLibrary::new();
        let shader = library.register_shader("Legacy/Two", &[FORWARD_BASE, ALWAYS]);
        let material = library.create_material(shader).unwrap();
        let visible = VisibleSet {
            renderables: vec![renderable(0, 0, material.id, queue::GEOMETRY, -5.0)],
            lights: Vec::new(),
        };
        let spec = DrawBatchSpec::with_tags(vec![ALWAYS, FORWARD_BASE]);
        let batch = DrawBatch::build(&spec, &visible, &view(), &library);
        assert_eq!(
            Some(batch.draw_calls()[0].pipeline_id),
            library.resolve_pass(material.id, &ALWAYS)
        );
    }

    #[test]
    fn test_override_material_replaces_pipeline_and_material() {
        let mut f = fixture();
        let error_shader = f
            .library
            .find_shader(crate::shader::ERROR_SHADER_NAME)
            .unwrap();
        let error = f.library.create_material(error_shader).unwrap();
        let visible = VisibleSet {
            renderables: vec![
                renderable(0, 0, f.legacy.id, queue::GEOMETRY, -5.0),
                renderable(1, 0, f.unlit_a.id, queue::GEOMETRY, -5.0),
            ],
            lights: Vec::new(),
        };
        let spec = DrawBatchSpec::with_tags(crate::shader::LEGACY_PASS_TAGS.to_vec())
            .with_override_material(error);
        let batch = DrawBatch::build(&spec, &visible, &view(), &f.library);

        assert_eq!(ids(&batch), vec![0]);
        let call = &batch.draw_calls()[0];
        assert_eq!(call.material_id, error.id);
        assert_eq!(
            Some(call.pipeline_id),
            f.library.resolve_pass_index(error.id, 0)
        );
        assert_eq!(call.mesh_id, MeshId(0));
    }

    #[test]
    fn test_without_flags_every_call_is_a_device_draw() {
        let f = fixture();
        let visible = VisibleSet {
            renderables: (0..4)
                .map(|i| renderable(i, 7, f.unlit_a.id, queue::GEOMETRY, -5.0))
                .collect(),
            lights: Vec::new(),
        };
        let spec = DrawBatchSpec::new(SRP_DEFAULT_UNLIT);
        let batch = DrawBatch::build(&spec, &visible, &view(), &f.library);
        assert_eq!(batch.groups().count(), 4);
        assert_eq!(batch.device_draw_count(), 4);
    }

    #[test]
    fn test_dynamic_batching_groups_same_pipeline_and_material() {
        let f = fixture();
        let visible = VisibleSet {
            renderables: vec![
                renderable(0, 1, f.unlit_a.id, queue::GEOMETRY, -5.0),
                renderable(1, 2, f.unlit_a.id, queue::GEOMETRY, -5.0),
                renderable(2, 3, f.unlit_b.id, queue::GEOMETRY, -5.0),
            ],
            lights: Vec::new(),
        };
        let spec = DrawBatchSpec::new(SRP_DEFAULT_UNLIT).batching(true, false);
        let batch = DrawBatch::build(&spec, &visible, &view(), &f.library);

        let groups: Vec<_> = batch.groups().collect();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].calls.len(), 2);
        assert_eq!(groups[0].material_id, f.unlit_a.id);
        assert_eq!(groups[1].material_id, f.unlit_b.id);
        // Without instancing each mesh is still its own draw.
        assert_eq!(groups[0].instanced_groups().count(), 2);
    }

    #[test]
    fn test_instancing_collapses_same_mesh() {
        let f = fixture();
        let visible = VisibleSet {
            renderables: (0..3)
                .map(|i| renderable(i, 42, f.unlit_a.id, queue::GEOMETRY, -5.0))
                .collect(),
            lights: Vec::new(),
        };
        let spec = DrawBatchSpec::new(SRP_DEFAULT_UNLIT).batching(false, true);
        let batch = DrawBatch::build(&spec, &visible, &view(), &f.library);

        let groups: Vec<_> = batch.groups().collect();
        assert_eq!(groups.len(), 1);
        let instanced: Vec<_> = groups[0].instanced_groups().collect();
        assert_eq!(instanced.len(), 1);
        assert_eq!(instanced[0].mesh_id, MeshId(42));
        assert_eq!(instanced[0].instance_count(), 3);
    }

    #[test]
    fn test_flags_never_change_draw_calls() {
        let f = fixture();
        let visible = VisibleSet {
            renderables: (0..12)
                .map(|i| {
                    let material = if i % 3 == 0 { f.unlit_b.id } else { f.unlit_a.id };
                    renderable(i, i % 2, material, queue::GEOMETRY, -(i as f32) * 3.0)
                })
                .collect(),
            lights: Vec::new(),
        };

        let base = DrawBatchSpec::new(SRP_DEFAULT_UNLIT).sorted_by(SortCriteria::CommonOpaque);
        let reference = DrawBatch::build(&base, &visible, &view(), &f.library);
        for (dynamic, instancing) in [(true, false), (false, true), (true, true)] {
            let spec = base.clone().batching(dynamic, instancing);
            let batch = DrawBatch::build(&spec, &visible, &view(), &f.library);
            assert_eq!(batch.draw_calls(), reference.draw_calls());

            let instances: u32 = batch
                .groups()
                .flat_map(|g| g.instanced_groups().map(|d| d.instance_count()).collect::<Vec<_>>())
                .sum();
            assert_eq!(instances as usize, reference.len());
            assert!(batch.device_draw_count() <= reference.device_draw_count());
        }
    }

    #[test]
    fn test_depth_measured_along_view_direction() {
        let view = ViewPoint {
            position: Vec3::new(0.0, 0.0, 10.0),
            forward: Vec3::NEG_Z,
        };
        assert_eq!(view.depth(Vec3::new(3.0, 4.0, 0.0)), 10.0);
        assert_eq!(view.depth(Vec3::new(0.0, 0.0, 20.0)), -10.0);
    }
}
