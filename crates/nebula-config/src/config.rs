//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Terrain mesh and tessellation settings.
    pub terrain: TerrainConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
    /// Headless demo settings.
    pub demo: DemoConfig,
}

/// Terrain mesh configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// Grid cells per patch edge (power of two).
    pub patch_size: u32,
    /// Variance tables hold `1 << variance_depth` entries.
    pub variance_depth: u32,
    /// World units per grid cell.
    pub square_size: f32,
    /// Triangle nodes per render pass, split over all workers.
    pub initial_pool_size: usize,
    /// Ceiling for node pool growth.
    pub max_pool_size: usize,
    /// LOD falloff; larger values keep detail further out.
    pub view_radius: f32,
    /// Camera travel in world units that forces a new tessellation.
    pub retessellate_distance: f32,
    /// Tessellation worker threads (0 = one per logical CPU).
    pub worker_threads: usize,
    /// Keep a second set of trees for the shadow camera.
    pub shadow_pass: bool,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Log node pool usage after every tessellation.
    pub show_pool_stats: bool,
}

/// Headless demo configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DemoConfig {
    /// Map width in patches.
    pub map_patches_x: u32,
    /// Map depth in patches.
    pub map_patches_z: u32,
    /// Seed for the generated height field.
    pub seed: u32,
    /// Frames to simulate before exiting.
    pub frames: u64,
    /// Camera speed in world units per frame.
    pub camera_speed: f32,
}

// --- Default implementations ---

impl Default for TerrainConfig {
    fn default() -> Self {
        let initial_pool_size = 1 << 17;
        Self {
            patch_size: 128,
            variance_depth: 12,
            square_size: 8.0,
            initial_pool_size,
            max_pool_size: initial_pool_size * 8,
            view_radius: 300.0,
            retessellate_distance: 64.0,
            worker_threads: 0,
            shadow_pass: true,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            show_pool_stats: false,
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            map_patches_x: 8,
            map_patches_z: 8,
            seed: 42,
            frames: 240,
            camera_speed: 24.0,
        }
    }
}

// --- Load / Save / Reload ---

/// File name of the persisted config inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ron";

impl Config {
    /// Load `config.ron` from `config_dir`, writing the defaults there first
    /// if the file does not exist yet.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", path.display());
            return Ok(config);
        }

        let config = Self::read(&path)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Write this config to `config_dir/config.ron`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::write(config_dir))?;

        let path = config_dir.join(CONFIG_FILE_NAME);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&path, serialized).map_err(ConfigError::write(&path))
    }

    /// Re-read the file; `Some` only when it differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(&config_dir.join(CONFIG_FILE_NAME))?;
        if &fresh == self {
            return Ok(None);
        }
        log::info!("Config reloaded with changes");
        Ok(Some(fresh))
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::read(path))?;
        ron::from_str(&contents).map_err(ConfigError::ParseError)
    }
}
