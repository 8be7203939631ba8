//! Demo binary that renders a small scene through the Myst forward pipeline.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p myst-demo` to record frames without a GPU.
//! Run with `cargo run -p myst-demo -- --gpu true --frames 10` to render offscreen.

use clap::Parser;
use glam::{Mat4, Quat, Vec3, Vec4};
use myst_config::{CliArgs, Config};
use myst_lighting::LightRecord;
use myst_render::{
    BlendMode, Camera, CameraKind, GpuDevice, MaterialId, MeshId, MystPipeline, RecordingDevice,
    RenderContext, RenderDevice, Scene, ShaderId, ShaderLibrary, ShaderProgram, ShaderRegistry,
    init_headless_blocking, queue, shader, unit_cube,
};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use std::path::PathBuf;
use tracing::{info, warn};

const CUBE_MESH: MeshId = MeshId(0);

/// Shaders and materials used by the demo scene.
struct DemoMaterials {
    unlit_shader: ShaderId,
    transparent_shader: ShaderId,
    opaque: MaterialId,
    transparent: MaterialId,
    legacy: MaterialId,
}

impl DemoMaterials {
    fn register(shaders: &mut ShaderLibrary) -> Option<Self> {
        let unlit_shader = shaders.register_shader("Myst/Unlit", &[shader::SRP_DEFAULT_UNLIT]);
        let transparent_shader =
            shaders.register_shader("Myst/UnlitTransparent", &[shader::SRP_DEFAULT_UNLIT]);
        let legacy_shader = shaders.register_shader("Legacy/Diffuse", &[shader::FORWARD_BASE]);

        Some(Self {
            unlit_shader,
            transparent_shader,
            opaque: shaders.create_material(unlit_shader)?.id,
            transparent: shaders.create_material(transparent_shader)?.id,
            legacy: shaders.create_material(legacy_shader)?.id,
        })
    }

    fn color(&self, material: MaterialId) -> Vec4 {
        if material == self.opaque {
            Vec4::new(0.8, 0.8, 0.8, 1.0)
        } else if material == self.transparent {
            Vec4::new(0.2, 0.6, 1.0, 0.5)
        } else {
            Vec4::new(1.0, 0.0, 1.0, 1.0)
        }
    }
}

/// Scatter cubes in front of the origin: mostly opaque, some transparent and a
/// few with a legacy-only shader.
fn build_scene(materials: &DemoMaterials) -> Scene {
    let (_, _, bounds) = unit_cube();
    let mut scene = Scene::new();
    let mut rng = Xoshiro256StarStar::seed_from_u64(42); // Fixed seed for reproducible demo

    for i in 0..64 {
        let position = Vec3::new(
            rng.gen_range(-8.0..8.0),
            rng.gen_range(-4.0..4.0),
            rng.gen_range(-30.0..-4.0),
        );
        let transform = Mat4::from_rotation_translation(
            Quat::from_rotation_y(rng.gen_range(0.0..std::f32::consts::TAU)),
            position,
        );
        let (material, render_queue) = match i % 8 {
            0 | 1 => (materials.transparent, queue::TRANSPARENT),
            2 => (materials.legacy, queue::GEOMETRY),
            _ => (materials.opaque, queue::GEOMETRY),
        };
        let id = scene.spawn(CUBE_MESH, material, render_queue, transform, bounds);
        if i % 16 == 3 {
            scene.set_color_override(id, Some(Vec4::new(1.0, 0.5, 0.0, 1.0)));
        }
    }

    scene.add_light(LightRecord::directional(
        Quat::from_rotation_x(-0.8),
        Vec3::new(1.0, 0.95, 0.85),
        1.0,
    ));
    for _ in 0..6 {
        let position = Vec3::new(
            rng.gen_range(-8.0..8.0),
            rng.gen_range(0.0..4.0),
            rng.gen_range(-30.0..-4.0),
        );
        let color = Vec3::new(rng.r#gen(), rng.r#gen(), rng.r#gen());
        scene.add_light(LightRecord::point(position, color, 2.0, 10.0));
    }
    scene.add_light(LightRecord::spot(
        Vec3::new(0.0, 6.0, -10.0),
        Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2),
        Vec3::ONE,
        3.0,
        15.0,
    ));

    scene
}

/// A game camera and a scene view whose far plane collapses onto the near
/// plane, so it cannot cull and is skipped every frame.
fn build_cameras(width: u32, height: u32) -> Vec<Camera> {
    let mut game = Camera {
        position: Vec3::new(0.0, 1.0, 2.0),
        ..Camera::default()
    };
    game.set_aspect_ratio(width as f32, height as f32);

    let degenerate = Camera {
        near: 1.0,
        far: 1.0,
        kind: CameraKind::SceneView,
        ..game.clone()
    };

    vec![game, degenerate]
}

/// Build a GPU device for the scene, or `None` when no adapter or pipeline is available.
fn create_gpu_device(
    config: &Config,
    shaders: &ShaderLibrary,
    materials: &DemoMaterials,
) -> Option<GpuDevice> {
    let gpu = match init_headless_blocking() {
        Ok(gpu) => gpu,
        Err(e) => {
            warn!("GPU unavailable ({e}), recording frames instead");
            return None;
        }
    };

    let (width, height) = (config.render.width, config.render.height);
    let mut device = match GpuDevice::new(gpu.device, gpu.queue, width, height) {
        Ok(device) => device,
        Err(e) => {
            warn!("Cannot create {width}x{height} target ({e}), recording frames instead");
            return None;
        }
    };
    let error_shader = shaders.find_shader(shader::ERROR_SHADER_NAME)?;
    let registered = [
        (materials.unlit_shader, ShaderProgram::ForwardUnlit, BlendMode::Opaque),
        (materials.transparent_shader, ShaderProgram::ForwardUnlit, BlendMode::Alpha),
        (error_shader, ShaderProgram::Error, BlendMode::Opaque),
    ]
    .into_iter()
    .try_for_each(|(shader, program, blend)| {
        device
            .register_shader_passes(shaders, shader, program, blend)
            .map(|_| ())
    });
    if let Err(e) = registered {
        warn!("Failed to build GPU pipelines ({e}), recording frames instead");
        return None;
    }

    let (vertices, indices, _) = unit_cube();
    if let Err(e) = device.upload_mesh(CUBE_MESH, &vertices, &indices) {
        warn!("Failed to upload cube mesh ({e}), recording frames instead");
        return None;
    }
    for material in [materials.opaque, materials.transparent, materials.legacy] {
        device.set_material_color(material, materials.color(material));
    }

    Some(device)
}

fn render_frames(
    pipeline: &mut MystPipeline,
    scene: &Scene,
    shaders: &mut ShaderLibrary,
    device: &mut dyn RenderDevice,
    cameras: &[Camera],
    frames: u32,
) {
    for _ in 0..frames {
        let mut ctx = RenderContext {
            scene,
            shaders: &mut *shaders,
            device: &mut *device,
        };
        pipeline.render(&mut ctx, cameras);
    }
}

fn main() {
    let args = CliArgs::parse();

    // Resolve config directory
    let config_dir = match args.config.clone() {
        Some(dir) => dir,
        None => Config::default_dir().unwrap_or_else(|e| {
            eprintln!("{e}, using ./myst");
            PathBuf::from("myst")
        }),
    };

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    if let Err(e) = myst_log::init_logging(Some(&log_dir), Some(&config)) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let mut shaders = ShaderLibrary::with_builtin_shaders();
    let Some(materials) = DemoMaterials::register(&mut shaders) else {
        eprintln!("Failed to create demo materials");
        return;
    };
    let scene = build_scene(&materials);
    let cameras = build_cameras(config.render.width, config.render.height);
    let mut pipeline = MystPipeline::from_config(&config.pipeline);

    info!(
        "Rendering {} frames: {} renderables, {} lights, {} cameras, flags {:?}, debug mode {}",
        config.render.frames,
        scene.renderables().len(),
        scene.lights().len(),
        cameras.len(),
        pipeline.flags(),
        pipeline.debug_mode()
    );

    let gpu_device = if config.render.use_gpu {
        create_gpu_device(&config, &shaders, &materials)
    } else {
        None
    };

    if let Some(mut device) = gpu_device {
        render_frames(
            &mut pipeline,
            &scene,
            &mut shaders,
            &mut device,
            &cameras,
            config.render.frames,
        );
        let stats = device.last_frame_stats();
        info!(
            "GPU submitted {} camera frames; last: {} passes, {} draws, {} instances, {} skipped",
            device.frames_submitted(),
            stats.passes,
            stats.draws,
            stats.instances,
            stats.skipped
        );
        match device.read_color_target() {
            Ok(pixels) => info!("Read back {} bytes of color target", pixels.len()),
            Err(e) => warn!("Color readback failed: {e}"),
        }
    } else {
        let mut device = RecordingDevice::new();
        render_frames(
            &mut pipeline,
            &scene,
            &mut shaders,
            &mut device,
            &cameras,
            config.render.frames,
        );
        let frames = device.frames();
        let draw_calls: usize = frames.iter().map(|f| f.draw_call_count()).sum();
        let device_draws: usize = frames.iter().map(|f| f.device_draw_count()).sum();
        info!(
            "Recorded {} camera frames, {} commands, {} draw calls in {} device draws",
            frames.len(),
            device.total_commands(),
            draw_calls,
            device_draws
        );
    }

    info!(
        "Fallback pass {}, {} lights in the last camera",
        if pipeline.fallback().is_enabled() { "enabled" } else { "disabled" },
        pipeline.lights().active_count()
    );
}
