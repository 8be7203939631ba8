//! Configuration for the Myst render pipeline.
//!
//! The pipeline asset (batching and instancing toggles, debug-mode fallback pass)
//! and the demo's frame settings persist to disk as a RON file. CLI flags parsed
//! with clap override the loaded values.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE_NAME, Config, DebugConfig, PipelineConfig, RenderConfig};
pub use error::ConfigError;
