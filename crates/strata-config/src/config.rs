//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";
const APP_NAME: &str = "strata";

/// Platform config directory for strata, falling back to the working
/// directory when the OS exposes none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Top-level world configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// World identity and location.
    pub world: WorldConfig,
    /// Backing store settings.
    pub storage: StorageConfig,
    /// Terrain generator settings.
    pub generator: GeneratorConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// World identity and location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorldConfig {
    /// Display name of the world.
    pub name: String,
    /// Directory holding chunk data for the directory backend.
    pub directory: PathBuf,
    /// Dimension served by default ("overworld", "nether", "end").
    pub dimension: String,
    /// Spawn block position.
    pub spawn: SpawnConfig,
}

/// Spawn block position.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SpawnConfig {
    /// World block X.
    pub x: i32,
    /// World block Y (height).
    pub y: i32,
    /// World block Z.
    pub z: i32,
}

/// Where chunks are persisted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageBackend {
    /// Kept in memory and lost on exit.
    Memory,
    /// One file per chunk under `world.directory`.
    #[default]
    Directory,
}

/// Backing store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend to open.
    pub backend: StorageBackend,
    /// Seconds between background saves (0 = disabled).
    pub autosave_interval_secs: u64,
}

/// Which generator fills chunks that have no persisted data.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum GeneratorKind {
    /// Stacked layers from `generator.layers`.
    #[default]
    Flat,
    /// Empty chunks.
    Void,
}

/// One flat-world layer, listed bottom first.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LayerConfig {
    /// Namespaced block name.
    pub block: String,
    /// Thickness in blocks.
    pub thickness: u32,
}

/// Terrain generator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Generator to use.
    pub kind: GeneratorKind,
    /// Flat layers, bottom first.
    pub layers: Vec<LayerConfig>,
    /// Biome id written to every column.
    pub biome: u8,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            name: "world".to_string(),
            directory: PathBuf::from("world"),
            dimension: "overworld".to_string(),
            spawn: SpawnConfig::default(),
        }
    }
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self { x: 0, y: 4, z: 0 }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Directory,
            autosave_interval_secs: 30,
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let layer = |block: &str, thickness| LayerConfig {
            block: block.to_string(),
            thickness,
        };
        Self {
            kind: GeneratorKind::Flat,
            layers: vec![
                layer("minecraft:bedrock", 1),
                layer("minecraft:dirt", 2),
                layer("minecraft:grass", 1),
            ],
            biome: 1,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
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
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(4)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}
