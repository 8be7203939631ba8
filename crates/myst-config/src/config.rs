//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name used inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Render pipeline asset settings.
    pub pipeline: PipelineConfig,
    /// Frame and target settings.
    pub render: RenderConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Render pipeline asset: read once when a pipeline instance is constructed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Let the device merge compatible draws that share pipeline and material.
    pub dynamic_batching: bool,
    /// Let the device draw renderables sharing a mesh as one instanced draw.
    pub instancing: bool,
    /// Run the unsupported-material fallback pass.
    ///
    /// Follows the build profile and is never written to or read from
    /// `config.ron`; only `--debug-mode` can change it for one run.
    #[serde(skip)]
    pub debug_mode: bool,
}

/// Frame and render target configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Offscreen target width in pixels.
    pub width: u32,
    /// Offscreen target height in pixels.
    pub height: u32,
    /// Number of frames the demo renders before exiting.
    pub frames: u32,
    /// Execute frames on a wgpu device instead of the recording device.
    pub use_gpu: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Also write JSON logs to the log directory (debug builds only).
    pub log_to_file: bool,
}

// --- Default implementations ---

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dynamic_batching: false,
            instancing: false,
            debug_mode: cfg!(debug_assertions),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frames: 3,
            use_gpu: false,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Platform config directory for Myst (e.g. `~/.config/myst`).
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join("myst"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let config = Self::read_file(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized = ron::ser::to_string_pretty(self, pretty)?;
        std::fs::write(&config_path, serialized).map_err(|source| ConfigError::Write {
            path: config_path.clone(),
            source,
        })
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    ///
    /// Pipeline settings only take effect for pipeline instances created after
    /// the reload.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read_file(&config_dir.join(CONFIG_FILE_NAME))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("dynamic_batching: false"));
        assert!(ron_str.contains("width: 1280"));
    }

    #[test]
    fn test_batching_flags_default_off() {
        let config = PipelineConfig::default();
        assert!(!config.dynamic_batching);
        assert!(!config.instancing);
    }

    #[test]
    fn test_debug_mode_follows_build_profile() {
        assert_eq!(PipelineConfig::default().debug_mode, cfg!(debug_assertions));
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(pipeline: (instancing: true))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert!(config.pipeline.instancing);
        assert!(!config.pipeline.dynamic_batching);
        assert_eq!(config.render, RenderConfig::default());
        assert_eq!(config.debug, DebugConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.pipeline.dynamic_batching = true;
        config.render.frames = 10;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE_NAME).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.pipeline.instancing = true;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.unwrap().pipeline.instancing);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, "(pipeline: (instancing: maybe))").unwrap();
        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(err.to_string().contains(&config_path.display().to_string()));
    }

    #[test]
    fn test_debug_mode_is_not_persisted() {
        let dir = tempfile::tempdir().unwrap();
        Config::default().save(dir.path()).unwrap();
        let saved = std::fs::read_to_string(dir.path().join(CONFIG_FILE_NAME)).unwrap();
        assert!(!saved.contains("debug_mode"));
    }

    #[test]
    fn test_saved_debug_mode_is_ignored_on_load() {
        let dir = tempfile::tempdir().unwrap();
        for saved in ["true", "false"] {
            let contents = format!("(pipeline: (instancing: true, debug_mode: {saved}))");
            std::fs::write(dir.path().join(CONFIG_FILE_NAME), contents).unwrap();

            let config = Config::load_or_create(dir.path()).unwrap();
            assert!(config.pipeline.instancing);
            assert_eq!(config.pipeline.debug_mode, cfg!(debug_assertions));
        }
    }
}
