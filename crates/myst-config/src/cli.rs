//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Myst command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "myst", about = "Myst forward render pipeline")]
pub struct CliArgs {
    /// Enable dynamic batching.
    #[arg(long)]
    pub dynamic_batching: Option<bool>,

    /// Enable GPU instancing.
    #[arg(long)]
    pub instancing: Option<bool>,

    /// Run the unsupported-material fallback pass (debug builds only).
    #[arg(long)]
    pub debug_mode: Option<bool>,

    /// Number of frames to render.
    #[arg(long)]
    pub frames: Option<u32>,

    /// Render target width.
    #[arg(long)]
    pub width: Option<u32>,

    /// Render target height.
    #[arg(long)]
    pub height: Option<u32>,

    /// Execute on a wgpu device.
    #[arg(long)]
    pub gpu: Option<bool>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(enabled) = args.dynamic_batching {
            self.pipeline.dynamic_batching = enabled;
        }
        if let Some(enabled) = args.instancing {
            self.pipeline.instancing = enabled;
        }
        if let Some(enabled) = args.debug_mode {
            self.pipeline.debug_mode = enabled;
        }
        if let Some(frames) = args.frames {
            self.render.frames = frames;
        }
        if let Some(w) = args.width {
            self.render.width = w;
        }
        if let Some(h) = args.height {
            self.render.height = h;
        }
        if let Some(gpu) = args.gpu {
            self.render.use_gpu = gpu;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
