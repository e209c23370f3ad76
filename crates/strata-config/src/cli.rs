//! Command-line overrides for strata configuration.

use std::path::PathBuf;

use clap::Args;

use crate::{Config, StorageBackend};

/// Options shared by every strata command.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Args, Debug, Default, Clone)]
pub struct CliArgs {
    /// World directory.
    #[arg(long, global = true)]
    pub world: Option<PathBuf>,

    /// World name.
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// Dimension to open (overworld, nether, end).
    #[arg(long, global = true)]
    pub dimension: Option<String>,

    /// Storage backend.
    #[arg(long, value_enum, global = true)]
    pub backend: Option<StorageBackend>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref dir) = args.world {
            self.world.directory = dir.clone();
        }
        if let Some(ref name) = args.name {
            self.world.name = name.clone();
        }
        if let Some(ref dimension) = args.dimension {
            self.world.dimension = dimension.clone();
        }
        if let Some(backend) = args.backend {
            self.storage.backend = backend;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            world: Some(PathBuf::from("/srv/worlds/alpha")),
            dimension: Some("nether".to_string()),
            backend: Some(StorageBackend::Memory),
            ..CliArgs::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.world.directory, PathBuf::from("/srv/worlds/alpha"));
        assert_eq!(config.world.dimension, "nether");
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        // Non-overridden fields retain defaults
        assert_eq!(config.world.name, "world");
        assert_eq!(config.debug.log_level, "info");
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }
}
