//! Subcommand implementations, independent of argument parsing.

use std::collections::BTreeMap;

use crossbeam_channel::unbounded;
use serde::Serialize;
use strata_world::{BlockState, ChunkPos, Format, FormatError, Level, Spawn};

/// Errors raised by a subcommand.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The world rejected an operation.
    #[error(transparent)]
    Format(#[from] FormatError),
    /// A block string could not be parsed.
    #[error("invalid block state {0:?}: expected name[key=value,...]")]
    InvalidBlock(String),
    /// A report could not be rendered as JSON.
    #[error("failed to encode report: {0}")]
    Json(#[from] serde_json::Error),
}

/// Summary printed by `strata info`.
#[derive(Debug, Serialize)]
pub struct WorldInfo {
    pub name: String,
    pub dimension: String,
    pub spawn: Spawn,
    pub spawn_chunk: ChunkPos,
    pub spawn_chunk_generated: bool,
}

pub fn info(level: &Level) -> Result<WorldInfo, CommandError> {
    let spawn_chunk = level.spawn().chunk_pos();
    Ok(WorldInfo {
        name: level.name().to_string(),
        dimension: level.dimension().to_string(),
        spawn: level.spawn(),
        spawn_chunk,
        spawn_chunk_generated: level
            .format()
            .has_generated_chunk(spawn_chunk.x, spawn_chunk.y)?,
    })
}

/// Outcome of a pre-generation run.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct PregenReport {
    /// Chunks in the requested square.
    pub requested: usize,
    /// Chunks generated and written by this run.
    pub generated: usize,
    /// Chunks that already had persisted data.
    pub existing: usize,
    /// Chunks that failed, sorted.
    pub failed: Vec<ChunkPos>,
}

enum Outcome {
    Generated,
    Existing,
    Failed,
}

/// Generates and persists every chunk within `radius` of `center`, spreading
/// the work over `threads` workers.
///
/// Each chunk is unloaded once written so memory stays bounded.
pub fn pregen(level: &Level, center: ChunkPos, radius: u32, threads: usize) -> PregenReport {
    let r = i32::try_from(radius).unwrap_or(i32::MAX / 2);
    let (job_tx, job_rx) = unbounded::<ChunkPos>();
    let (result_tx, result_rx) = unbounded::<(ChunkPos, Outcome)>();

    let mut requested = 0;
    for dy in -r..=r {
        for dx in -r..=r {
            let _ = job_tx.send(center.offset(dx, dy));
            requested += 1;
        }
    }
    drop(job_tx);

    let format = level.format();
    std::thread::scope(|s| {
        for _ in 0..threads.max(1) {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            s.spawn(move || {
                while let Ok(pos) = jobs.recv() {
                    let outcome = pregen_one(format.as_ref(), pos);
                    let _ = results.send((pos, outcome));
                }
            });
        }
    });
    drop(result_tx);

    let mut report = PregenReport {
        requested,
        ..PregenReport::default()
    };
    for (pos, outcome) in result_rx {
        match outcome {
            Outcome::Generated => report.generated += 1,
            Outcome::Existing => report.existing += 1,
            Outcome::Failed => report.failed.push(pos),
        }
    }
    report.failed.sort();
    tracing::info!(
        "pregen done: {} generated, {} existing, {} failed",
        report.generated,
        report.existing,
        report.failed.len()
    );
    report
}

fn pregen_one(format: &dyn Format, pos: ChunkPos) -> Outcome {
    match format.has_generated_chunk(pos.x, pos.y) {
        Ok(true) => return Outcome::Existing,
        Ok(false) => {}
        Err(e) => {
            tracing::warn!("pregen existence check {}: {}", pos, e);
            return Outcome::Failed;
        }
    }
    let result = format
        .load_chunk(pos.x, pos.y, true)
        .and_then(|()| format.unload_chunk(pos.x, pos.y));
    match result {
        Ok(()) => Outcome::Generated,
        Err(e) => {
            tracing::warn!("pregen {}: {}", pos, e);
            Outcome::Failed
        }
    }
}

/// One subchunk band as reported by `strata inspect`.
#[derive(Debug, Serialize)]
pub struct BandSummary {
    pub y: u8,
    pub finalization: String,
    pub layers: usize,
    pub palette: Vec<String>,
}

/// Chunk summary printed by `strata inspect`.
#[derive(Debug, Serialize)]
pub struct ChunkSummary {
    pub pos: ChunkPos,
    pub dirty: bool,
    pub max_height: u16,
    pub bands: Vec<BandSummary>,
    pub entities: usize,
    pub block_entities: usize,
}

pub fn inspect(level: &Level, x: i32, y: i32) -> Result<ChunkSummary, CommandError> {
    use strata_world::ChunkColumn;

    level.format().load_chunk(x, y, false)?;
    let handle = level.chunk(x, y)?;
    let chunk = handle.read();
    let bands = chunk
        .sub_chunks()
        .map(|sub| BandSummary {
            y: sub.y(),
            finalization: format!("{:?}", sub.finalization),
            layers: sub.storages().len(),
            palette: sub
                .get_block_storage(0)
                .map(|s| s.palette().iter().map(ToString::to_string).collect())
                .unwrap_or_default(),
        })
        .collect();

    Ok(ChunkSummary {
        pos: chunk.pos(),
        dirty: chunk.is_dirty(),
        max_height: chunk.height_map().iter().copied().max().unwrap_or(0),
        bands,
        entities: chunk.entities().len(),
        block_entities: chunk.block_entities().len(),
    })
}

/// Parses `name` or `name[key=value,...]`, the form blocks display as.
pub fn parse_block_state(input: &str) -> Result<BlockState, CommandError> {
    let invalid = || CommandError::InvalidBlock(input.to_string());
    let Some((name, rest)) = input.split_once('[') else {
        if input.is_empty() || input.contains(']') {
            return Err(invalid());
        }
        return Ok(BlockState::new(input));
    };
    let body = rest.strip_suffix(']').ok_or_else(invalid)?;
    if name.is_empty() {
        return Err(invalid());
    }

    let mut properties = BTreeMap::new();
    for pair in body.split(',').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').ok_or_else(invalid)?;
        if key.is_empty() {
            return Err(invalid());
        }
        properties.insert(key.to_string(), value.to_string());
    }
    Ok(BlockState::with_properties(name, properties))
}

#[cfg(test)]
mod tests {
    use strata_config::{Config, StorageBackend};

    use super::*;

    fn memory_level() -> Level {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        config.storage.autosave_interval_secs = 0;
        Level::open(&config).unwrap()
    }

    fn directory_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Directory;
        config.storage.autosave_interval_secs = 0;
        config.world.directory = dir.to_path_buf();
        config
    }

    #[test]
    fn test_pregen_square() {
        let level = memory_level();
        let report = pregen(&level, ChunkPos::new(0, 0), 2, 4);
        assert_eq!(report.requested, 25);
        assert_eq!(report.generated, 25);
        assert!(report.failed.is_empty());
        assert_eq!(level.format().loaded_chunks().len(), 0);

        let again = pregen(&level, ChunkPos::new(1, 1), 1, 2);
        assert_eq!(again.existing, 9);
        assert_eq!(again.generated, 0);
    }

    #[test]
    fn test_info_reports_spawn_chunk() {
        let level = memory_level();
        let before = info(&level).unwrap();
        assert_eq!(before.spawn_chunk, ChunkPos::new(0, 0));
        assert!(!before.spawn_chunk_generated);

        pregen(&level, ChunkPos::new(0, 0), 0, 1);
        assert!(info(&level).unwrap().spawn_chunk_generated);
    }

    #[test]
    fn test_inspect_flat_chunk() {
        let level = memory_level();
        pregen(&level, ChunkPos::new(2, 3), 0, 1);

        let summary = inspect(&level, 2, 3).unwrap();
        assert_eq!(summary.pos, ChunkPos::new(2, 3));
        assert_eq!(summary.max_height, 4);
        assert_eq!(summary.bands.len(), 1);
        assert!(summary.bands[0].palette.contains(&"minecraft:bedrock".to_string()));
        assert!(!summary.dirty);
    }

    #[test]
    fn test_pregen_persists_directory_world() {
        let dir = tempfile::tempdir().unwrap();
        let config = directory_config(dir.path());

        let level = Level::open(&config).unwrap();
        let report = pregen(&level, ChunkPos::new(-1, 0), 1, 3);
        assert_eq!(report.generated, 9);
        level.close().unwrap();

        let world = dir.path().join("overworld");
        assert!(world.join("c.-1.0.stck").exists());
        assert!(world.join("c.-2.-1.stck").exists());
        assert!(!world.join("c.1.0.stck").exists());

        let reopened = Level::open(&config).unwrap();
        assert_eq!(pregen(&reopened, ChunkPos::new(-1, 0), 1, 3).existing, 9);
        let summary = inspect(&reopened, 0, 1).unwrap();
        assert_eq!(summary.max_height, 4);
        assert!(!summary.dirty);
        reopened.close().unwrap();
    }

    #[test]
    fn test_inspect_missing_chunk() {
        let level = memory_level();
        assert!(matches!(
            inspect(&level, 40, 40),
            Err(CommandError::Format(FormatError::ChunkNotFound { .. }))
        ));
    }

    #[test]
    fn test_parse_block_state() {
        assert_eq!(parse_block_state("minecraft:stone").unwrap(), BlockState::new("minecraft:stone"));

        let torch = parse_block_state("minecraft:torch[facing=up,lit=true]").unwrap();
        assert_eq!(torch.name(), "minecraft:torch");
        let props = torch.properties().unwrap();
        assert_eq!(props.get("facing").map(String::as_str), Some("up"));
        assert_eq!(props.get("lit").map(String::as_str), Some("true"));
        assert_eq!(parse_block_state(&torch.to_string()).unwrap(), torch);

        for bad in ["", "[a=b]", "minecraft:torch[facing]", "minecraft:torch[a=b", "stone]"] {
            assert!(parse_block_state(bad).is_err(), "accepted {bad:?}");
        }
    }
}
