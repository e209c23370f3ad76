//! A world level: one active [`Format`] plus world metadata.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_config::{Config, GeneratorKind, StorageBackend};

use crate::autosave::Autosaver;
use crate::block_state::BlockState;
use crate::chunk::{ChunkColumn, ChunkPos};
use crate::dimension::Dimension;
use crate::error::{BlockError, FormatError, OpenError};
use crate::format::{ChunkHandle, Format, Provider};
use crate::generator::{ChunkGenerator, FlatGenerator, FlatLayer, VoidGenerator};
use crate::store::{ChunkStore, DirectoryStore, MemoryStore};

/// World block position players spawn at.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Spawn {
    /// World block X.
    pub x: i32,
    /// World block Y (height).
    pub y: i32,
    /// World block Z.
    pub z: i32,
}

impl Spawn {
    /// Chunk containing this position.
    pub fn chunk_pos(self) -> ChunkPos {
        chunk_of(self.x, self.z)
    }
}

/// Chunk holding world block column `(x, z)`.
fn chunk_of(x: i32, z: i32) -> ChunkPos {
    ChunkPos::new(x.div_euclid(16), z.div_euclid(16))
}

/// A named world served by a [`Format`].
pub struct Level {
    name: String,
    spawn: Spawn,
    format: Arc<dyn Format>,
    autosaver: Option<Autosaver>,
}

impl Level {
    /// Wraps an already opened format.
    pub fn new(name: impl Into<String>, spawn: Spawn, format: Arc<dyn Format>) -> Self {
        Self {
            name: name.into(),
            spawn,
            format,
            autosaver: None,
        }
    }

    /// Opens the store and generator selected by `config`, starting autosave
    /// when an interval is configured.
    pub fn open(config: &Config) -> Result<Self, OpenError> {
        let dimension = Dimension::from_name(&config.world.dimension)
            .ok_or_else(|| OpenError::UnknownDimension(config.world.dimension.clone()))?;

        let store: Arc<dyn ChunkStore> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::Directory => {
                Arc::new(DirectoryStore::open(&config.world.directory, dimension)?)
            }
        };

        let generator: Arc<dyn ChunkGenerator> = match config.generator.kind {
            GeneratorKind::Flat => {
                let layers = config
                    .generator
                    .layers
                    .iter()
                    .map(|l| FlatLayer {
                        block: BlockState::new(l.block.clone()),
                        thickness: l.thickness,
                    })
                    .collect();
                Arc::new(FlatGenerator::new(layers, config.generator.biome)?)
            }
            GeneratorKind::Void => Arc::new(VoidGenerator),
        };

        let spawn = config.world.spawn;
        let mut level = Self::new(
            config.world.name.clone(),
            Spawn {
                x: spawn.x,
                y: spawn.y,
                z: spawn.z,
            },
            Arc::new(Provider::open(store, generator, dimension)),
        );

        if config.storage.autosave_interval_secs > 0 {
            level
                .start_autosave(Duration::from_secs(config.storage.autosave_interval_secs))
                .map_err(OpenError::Autosave)?;
        }
        tracing::info!("opened level {:?} ({})", level.name, dimension);
        Ok(level)
    }

    /// World name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn position.
    pub fn spawn(&self) -> Spawn {
        self.spawn
    }

    /// Moves the spawn position.
    pub fn set_spawn(&mut self, spawn: Spawn) {
        self.spawn = spawn;
    }

    /// Dimension served by the active format.
    pub fn dimension(&self) -> Dimension {
        self.format.dimension()
    }

    /// The active format.
    pub fn format(&self) -> &Arc<dyn Format> {
        &self.format
    }

    /// Chunk at `(x, y)` on the chunk grid, loading or generating it.
    pub fn chunk(&self, x: i32, y: i32) -> Result<ChunkHandle, FormatError> {
        self.format.chunk(x, y)
    }

    /// Block at world position `(x, y, z)`.
    pub fn block_at(&self, x: i32, y: i32, z: i32) -> Result<BlockState, FormatError> {
        let pos = chunk_of(x, z);
        let handle = self.format.chunk(pos.x, pos.y)?;
        let chunk = handle.read();
        Ok(chunk
            .get_block(x.rem_euclid(16), y, z.rem_euclid(16))?
            .clone())
    }

    /// Writes a block at world position `(x, y, z)`.
    ///
    /// If the chunk is unloaded between lookup and write, the write goes to
    /// the reloaded chunk.
    pub fn set_block_at(
        &self,
        x: i32,
        y: i32,
        z: i32,
        state: BlockState,
    ) -> Result<(), FormatError> {
        let pos = chunk_of(x, z);
        loop {
            let handle = self.format.chunk(pos.x, pos.y)?;
            let mut chunk = handle.write();
            match chunk.set_block(x.rem_euclid(16), y, z.rem_euclid(16), state.clone()) {
                Err(BlockError::ChunkEvicted) => {
                    tracing::debug!("chunk {} unloaded before write, retrying", pos);
                }
                result => return Ok(result?),
            }
        }
    }

    /// Starts (or restarts) background saving every `interval`.
    pub fn start_autosave(&mut self, interval: Duration) -> std::io::Result<()> {
        if let Some(previous) = self.autosaver.take() {
            previous.stop();
        }
        self.autosaver = Some(Autosaver::spawn(Arc::clone(&self.format), interval)?);
        Ok(())
    }

    /// Whether background saving is running.
    pub fn is_autosaving(&self) -> bool {
        self.autosaver.is_some()
    }

    /// Stops autosave, then closes the format.
    pub fn close(mut self) -> Result<(), FormatError> {
        if let Some(autosaver) = self.autosaver.take() {
            autosaver.stop();
        }
        self.format.close()?;
        tracing::info!("closed level {:?}", self.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::RwLock;

    use super::*;
    use crate::chunk::Chunk;

    fn memory_config() -> Config {
        let mut config = Config::default();
        config.storage.backend = StorageBackend::Memory;
        config.storage.autosave_interval_secs = 0;
        config
    }

    #[test]
    fn test_open_from_config() {
        let mut config = memory_config();
        config.world.name = "alpha".to_string();
        config.world.dimension = "end".to_string();
        config.world.spawn.y = 70;

        let level = Level::open(&config).unwrap();
        assert_eq!(level.name(), "alpha");
        assert_eq!(level.dimension(), Dimension::End);
        assert_eq!(level.spawn(), Spawn { x: 0, y: 70, z: 0 });
        assert!(!level.is_autosaving());
    }

    #[test]
    fn test_unknown_dimension_rejected() {
        let mut config = memory_config();
        config.world.dimension = "aether".to_string();
        assert!(matches!(
            Level::open(&config),
            Err(OpenError::UnknownDimension(name)) if name == "aether"
        ));
    }

    #[test]
    fn test_flat_generator_from_config() {
        let level = Level::open(&memory_config()).unwrap();
        assert_eq!(level.block_at(0, 0, 0).unwrap().name(), "minecraft:bedrock");
        assert_eq!(level.block_at(-1, 3, -1).unwrap().name(), "minecraft:grass");
        assert!(level.format().is_loaded_chunk(-1, -1));
    }

    #[test]
    fn test_void_generator_from_config() {
        let mut config = memory_config();
        config.generator.kind = GeneratorKind::Void;
        let level = Level::open(&config).unwrap();
        assert!(matches!(
            level.block_at(0, 0, 0),
            Err(FormatError::Block(crate::error::BlockError::SubChunkNotLoaded(0)))
        ));
    }

    #[test]
    fn test_world_coordinates_map_to_chunks() {
        let level = Level::open(&memory_config()).unwrap();
        let glass = BlockState::new("minecraft:glass");
        level.set_block_at(-17, 10, 33, glass.clone()).unwrap();

        let handle = level.chunk(-2, 2).unwrap();
        assert_eq!(handle.read().get_block(15, 10, 1).unwrap(), &glass);
        assert_eq!(level.block_at(-17, 10, 33).unwrap(), glass);
        assert_eq!(Spawn { x: -17, y: 0, z: 33 }.chunk_pos(), ChunkPos::new(-2, 2));
    }

    #[test]
    fn test_close_persists_directory_world() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = memory_config();
        config.storage.backend = StorageBackend::Directory;
        config.world.directory = dir.path().to_path_buf();
        config.storage.autosave_interval_secs = 60;

        let mut level = Level::open(&config).unwrap();
        assert!(level.is_autosaving());
        level.set_spawn(Spawn { x: 5, y: 5, z: 5 });
        level
            .set_block_at(5, 5, 5, BlockState::new("minecraft:stone"))
            .unwrap();
        level.close().unwrap();

        let reopened = Level::open(&config).unwrap();
        assert!(reopened.format().has_generated_chunk(0, 0).unwrap());
        assert_eq!(reopened.block_at(5, 5, 5).unwrap().name(), "minecraft:stone");
        reopened.close().unwrap();
    }

    /// Serves an already unloaded handle on the first lookup.
    struct UnloadedFirst {
        inner: Provider,
        lookups: AtomicUsize,
    }

    impl Format for UnloadedFirst {
        fn close(&self) -> Result<(), FormatError> {
            self.inner.close()
        }

        fn dimension(&self) -> Dimension {
            self.inner.dimension()
        }

        fn set_dimension(&self, dimension: Dimension) {
            self.inner.set_dimension(dimension);
        }

        fn load_chunk(&self, x: i32, y: i32, create: bool) -> Result<(), FormatError> {
            self.inner.load_chunk(x, y, create)
        }

        fn unload_chunk(&self, x: i32, y: i32) -> Result<(), FormatError> {
            self.inner.unload_chunk(x, y)
        }

        fn generate_chunk(&self, x: i32, y: i32) -> Result<(), FormatError> {
            self.inner.generate_chunk(x, y)
        }

        fn has_generated_chunk(&self, x: i32, y: i32) -> Result<bool, FormatError> {
            self.inner.has_generated_chunk(x, y)
        }

        fn is_loaded_chunk(&self, x: i32, y: i32) -> bool {
            self.inner.is_loaded_chunk(x, y)
        }

        fn save_chunk(&self, x: i32, y: i32) -> Result<(), FormatError> {
            self.inner.save_chunk(x, y)
        }

        fn save_chunks(&self) -> Result<(), FormatError> {
            self.inner.save_chunks()
        }

        fn chunk(&self, x: i32, y: i32) -> Result<ChunkHandle, FormatError> {
            if self.lookups.fetch_add(1, Ordering::SeqCst) == 0 {
                let mut stale = Chunk::new(ChunkPos::new(x, y));
                stale.mark_evicted();
                return Ok(Arc::new(RwLock::new(stale)));
            }
            self.inner.chunk(x, y)
        }

        fn loaded_chunks(&self) -> Vec<ChunkHandle> {
            self.inner.loaded_chunks()
        }
    }

    #[test]
    fn test_set_block_retries_unloaded_chunk() {
        let format = Arc::new(UnloadedFirst {
            inner: Provider::open(
                Arc::new(MemoryStore::new()),
                Arc::new(FlatGenerator::classic()),
                Dimension::Overworld,
            ),
            lookups: AtomicUsize::new(0),
        });
        let level = Level::new("retry", Spawn::default(), format.clone());
        let glass = BlockState::new("minecraft:glass");

        level.set_block_at(3, 10, 3, glass.clone()).unwrap();
        assert_eq!(format.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(level.block_at(3, 10, 3).unwrap(), glass);
    }

    #[test]
    fn test_set_block_after_unload_is_visible() {
        let level = Level::open(&memory_config()).unwrap();
        let stale = level.chunk(0, 0).unwrap();
        level.format().unload_chunk(0, 0).unwrap();

        let glass = BlockState::new("minecraft:glass");
        level.set_block_at(1, 10, 1, glass.clone()).unwrap();
        assert_eq!(level.block_at(1, 10, 1).unwrap(), glass);
        assert!(stale.read().get_block(1, 10, 1).unwrap().is_air());
        assert!(stale.read().is_evicted());
    }
}
