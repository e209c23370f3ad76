//! Configuration for strata worlds.
//!
//! Settings persist to disk as RON and can be overridden from the command
//! line. Unknown fields are ignored and missing ones take their defaults, so
//! config files survive upgrades in both directions.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, GeneratorConfig, GeneratorKind, LayerConfig, SpawnConfig, StorageBackend,
    StorageConfig, WorldConfig, default_config_dir,
};
pub use error::ConfigError;
