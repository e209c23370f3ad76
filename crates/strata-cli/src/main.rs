//! `strata`: inspect, edit, and pre-generate chunk-column worlds.
//!
//! Run with: `cargo run -p strata-cli -- --world ./world info`

mod commands;

use std::path::Path;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use strata_config::{CliArgs, Config, ConfigError, SpawnConfig, default_config_dir};
use strata_world::{ChunkPos, FormatError, Level, OpenError};
use tracing::info;

use crate::commands::CommandError;

#[derive(Parser, Debug)]
#[command(name = "strata", about = "Inspect and pre-generate strata worlds")]
struct Cli {
    #[command(flatten)]
    overrides: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print world name, dimension, and spawn.
    Info {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Generate and persist every chunk in a square around a center chunk.
    Pregen {
        /// Radius in chunks.
        #[arg(long, default_value_t = 4)]
        radius: u32,
        /// Center chunk X (defaults to the spawn chunk).
        #[arg(long, allow_hyphen_values = true)]
        center_x: Option<i32>,
        /// Center chunk Y (defaults to the spawn chunk).
        #[arg(long, allow_hyphen_values = true)]
        center_y: Option<i32>,
        /// Worker threads (defaults to the CPU count).
        #[arg(long)]
        threads: Option<usize>,
    },
    /// Summarize one persisted chunk.
    Inspect {
        /// Chunk X.
        #[arg(allow_hyphen_values = true)]
        x: i32,
        /// Chunk Y.
        #[arg(allow_hyphen_values = true)]
        y: i32,
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Write one block at a world position.
    SetBlock {
        #[arg(allow_hyphen_values = true)]
        x: i32,
        #[arg(allow_hyphen_values = true)]
        y: i32,
        #[arg(allow_hyphen_values = true)]
        z: i32,
        /// Block as `name` or `name[key=value,...]`.
        block: String,
    },
    /// Move the spawn point and save it to the config.
    SetSpawn {
        #[arg(allow_hyphen_values = true)]
        x: i32,
        #[arg(allow_hyphen_values = true)]
        y: i32,
        #[arg(allow_hyphen_values = true)]
        z: i32,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to open world: {0}")]
    Open(#[from] OpenError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_dir = cli
        .overrides
        .config
        .clone()
        .unwrap_or_else(default_config_dir);

    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&cli.overrides);

    strata_log::init_logging(
        Some(&config_dir.join("logs")),
        cfg!(debug_assertions),
        Some(&config),
    );

    match run(cli.command, config, &config_dir) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command, mut config: Config, config_dir: &Path) -> Result<(), CliError> {
    if let Command::SetSpawn { x, y, z } = command {
        config.world.spawn = SpawnConfig { x, y, z };
        config.save(config_dir)?;
        info!("spawn set to ({x}, {y}, {z})");
        return Ok(());
    }

    let level = Level::open(&config)?;
    info!(
        "World: {} | Dimension: {} | Backend: {:?}",
        level.name(),
        level.dimension(),
        config.storage.backend
    );

    let result = dispatch(command, &level);
    // Close even when the command failed so dirty chunks still reach disk.
    let closed = level.close();
    result?;
    closed?;
    Ok(())
}

fn dispatch(command: Command, level: &Level) -> Result<(), CliError> {
    match command {
        Command::Info { json } => {
            let report = commands::info(level)?;
            if json {
                print_json(&report)?;
            } else {
                println!("name:      {}", report.name);
                println!("dimension: {}", report.dimension);
                println!(
                    "spawn:     ({}, {}, {}) in chunk {}{}",
                    report.spawn.x,
                    report.spawn.y,
                    report.spawn.z,
                    report.spawn_chunk,
                    if report.spawn_chunk_generated { "" } else { " (not generated)" }
                );
            }
        }
        Command::Pregen {
            radius,
            center_x,
            center_y,
            threads,
        } => {
            let spawn = level.spawn().chunk_pos();
            let center = ChunkPos::new(center_x.unwrap_or(spawn.x), center_y.unwrap_or(spawn.y));
            let threads = threads.unwrap_or_else(num_cpus::get);
            let report = commands::pregen(level, center, radius, threads);
            println!(
                "{} chunks: {} generated, {} existing, {} failed",
                report.requested,
                report.generated,
                report.existing,
                report.failed.len()
            );
            for pos in &report.failed {
                println!("  failed: {pos}");
            }
        }
        Command::Inspect { x, y, json } => {
            let summary = commands::inspect(level, x, y)?;
            if json {
                print_json(&summary)?;
            } else {
                println!("chunk {} (max height {})", summary.pos, summary.max_height);
                for band in &summary.bands {
                    println!(
                        "  band {:>3}: {:<13} {} layer(s), palette [{}]",
                        band.y,
                        band.finalization,
                        band.layers,
                        band.palette.join(", ")
                    );
                }
                println!(
                    "  {} entities, {} block entities",
                    summary.entities, summary.block_entities
                );
            }
        }
        Command::SetBlock { x, y, z, block } => {
            let state = commands::parse_block_state(&block)?;
            level.set_block_at(x, y, z, state.clone())?;
            println!("set ({x}, {y}, {z}) to {state}");
        }
        Command::SetSpawn { .. } => {}
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CommandError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
