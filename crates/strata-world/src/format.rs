//! Chunk providers: the cache of loaded chunks and its load, generate, save
//! and unload lifecycle.
//!
//! [`Format`] is the provider contract. [`Provider`] implements it over any
//! [`ChunkStore`] and [`ChunkGenerator`].
//!
//! Per coordinate a chunk is absent, loading, loaded (clean or dirty), or
//! gone once the provider is closed. Two structures back this:
//!
//! - `loaded`: the cache index, position to [`ChunkHandle`]. Lookups,
//!   inserts and removals take only a shard lock and never wait on I/O.
//! - `slots`: one mutex per coordinate, held for the whole of a load,
//!   generate, save or unload at that coordinate. A second caller for the
//!   same coordinate waits on it and then sees the first caller's result.
//!   Callers for different coordinates never share a slot.
//!
//! An entry in `loaded` is only inserted or removed while its slot is held.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock, RwLockUpgradableReadGuard};

use crate::chunk::{Chunk, ChunkPos};
use crate::dimension::Dimension;
use crate::error::{FormatError, SaveFailure, StoreError};
use crate::generator::ChunkGenerator;
use crate::store::ChunkStore;

/// Shared reference to a chunk in a provider's cache.
///
/// Writes through a handle are visible to every later lookup of the same
/// coordinate until the chunk is unloaded. After that the chunk is evicted
/// and writes fail with [`BlockError::ChunkEvicted`](crate::BlockError::ChunkEvicted).
pub type ChunkHandle = Arc<RwLock<Chunk>>;

/// Provider contract for a world format.
///
/// Implementations must be usable from many threads at once.
pub trait Format: Send + Sync {
    /// Flushes every dirty chunk, then releases the backing store.
    ///
    /// Every other operation fails with [`FormatError::FormatClosed`]
    /// afterwards, including a second `close`.
    fn close(&self) -> Result<(), FormatError>;

    /// Dimension this provider serves.
    fn dimension(&self) -> Dimension;

    /// Sets the dimension this provider serves.
    fn set_dimension(&self, dimension: Dimension);

    /// Loads a chunk into the cache.
    ///
    /// No-op if already loaded. On a store miss, generates the chunk when
    /// `create` is set and fails with [`FormatError::ChunkNotFound`] otherwise.
    fn load_chunk(&self, x: i32, y: i32, create: bool) -> Result<(), FormatError>;

    /// Evicts a chunk, persisting it first if dirty.
    ///
    /// Outstanding handles reject writes afterwards. If persisting fails
    /// the chunk stays loaded and dirty.
    fn unload_chunk(&self, x: i32, y: i32) -> Result<(), FormatError>;

    /// Generates a chunk, replacing any cached chunk at that coordinate.
    fn generate_chunk(&self, x: i32, y: i32) -> Result<(), FormatError>;

    /// Whether the backing store holds data for a chunk, regardless of the cache.
    fn has_generated_chunk(&self, x: i32, y: i32) -> Result<bool, FormatError>;

    /// Whether a chunk is in the cache. Never performs I/O.
    fn is_loaded_chunk(&self, x: i32, y: i32) -> bool;

    /// Persists a chunk if it is loaded and dirty.
    fn save_chunk(&self, x: i32, y: i32) -> Result<(), FormatError>;

    /// Persists every dirty chunk, attempting all of them and reporting
    /// every failure in [`FormatError::SaveChunks`].
    fn save_chunks(&self) -> Result<(), FormatError>;

    /// Returns a chunk, loading or generating it if needed.
    fn chunk(&self, x: i32, y: i32) -> Result<ChunkHandle, FormatError>;

    /// Snapshot of the chunks currently cached.
    fn loaded_chunks(&self) -> Vec<ChunkHandle>;
}

/// Per-coordinate lock. The flag is set once the slot has been retired from
/// the slot table; callers that acquire a retired slot look it up again.
#[derive(Default)]
struct ChunkSlot {
    retired: Mutex<bool>,
}

/// A [`Format`] backed by a [`ChunkStore`] and a [`ChunkGenerator`].
pub struct Provider {
    store: Arc<dyn ChunkStore>,
    generator: Arc<dyn ChunkGenerator>,
    loaded: DashMap<ChunkPos, ChunkHandle>,
    slots: DashMap<ChunkPos, Arc<ChunkSlot>>,
    dimension: RwLock<Dimension>,
    closed: AtomicBool,
}

impl Provider {
    /// Opens a provider over `store`, generating missing chunks with `generator`.
    pub fn open(
        store: Arc<dyn ChunkStore>,
        generator: Arc<dyn ChunkGenerator>,
        dimension: Dimension,
    ) -> Self {
        tracing::info!("opened {} provider", dimension);
        Self {
            store,
            generator,
            loaded: DashMap::new(),
            slots: DashMap::new(),
            dimension: RwLock::new(dimension),
            closed: AtomicBool::new(false),
        }
    }

    /// Handle to a cached chunk without loading it.
    pub fn get_loaded(&self, pos: ChunkPos) -> Option<ChunkHandle> {
        self.loaded.get(&pos).map(|h| Arc::clone(h.value()))
    }

    /// Number of cached chunks.
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Positions of cached chunks with unsaved changes.
    pub fn dirty_chunks(&self) -> Vec<ChunkPos> {
        let mut dirty: Vec<ChunkPos> = self
            .snapshot()
            .into_iter()
            .filter(|(_, h)| h.read().is_dirty())
            .map(|(pos, _)| pos)
            .collect();
        dirty.sort();
        dirty
    }

    /// Loads (or generates) a chunk and returns its handle.
    pub fn load(&self, pos: ChunkPos, create: bool) -> Result<ChunkHandle, FormatError> {
        self.check_open()?;
        if let Some(handle) = self.get_loaded(pos) {
            return Ok(handle);
        }

        loop {
            let slot = self.slot(pos);
            let mut retired = slot.retired.lock();
            if *retired {
                continue;
            }
            // Another caller may have finished loading while we waited.
            if let Some(handle) = self.get_loaded(pos) {
                return Ok(handle);
            }

            return match self.fetch(pos, create) {
                Ok(chunk) => {
                    let handle = Arc::new(RwLock::new(chunk));
                    self.loaded.insert(pos, Arc::clone(&handle));
                    Ok(handle)
                }
                Err(e) => {
                    *retired = true;
                    self.retire(pos, &slot);
                    Err(e)
                }
            };
        }
    }

    /// Reads from the store, falling back to the generator.
    fn fetch(&self, pos: ChunkPos, create: bool) -> Result<Chunk, FormatError> {
        let load_err = |source: StoreError| FormatError::Load {
            x: pos.x,
            y: pos.y,
            source,
        };
        if let Some(raw) = self.store.read_chunk(pos).map_err(load_err)? {
            let chunk = self.store.decode_chunk(pos, &raw).map_err(load_err)?;
            tracing::debug!("loaded chunk {} from store", pos);
            return Ok(chunk);
        }
        if !create {
            return Err(FormatError::ChunkNotFound { x: pos.x, y: pos.y });
        }
        self.run_generator(pos)
    }

    fn run_generator(&self, pos: ChunkPos) -> Result<Chunk, FormatError> {
        let mut chunk = self
            .generator
            .generate(pos)
            .map_err(|source| FormatError::Generate {
                x: pos.x,
                y: pos.y,
                source,
            })?;
        if chunk.pos() != pos {
            return Err(FormatError::Generate {
                x: pos.x,
                y: pos.y,
                source: crate::error::GenerateError(format!(
                    "generator returned chunk at {}",
                    chunk.pos()
                )),
            });
        }
        chunk.mark_dirty();
        tracing::debug!("generated chunk {}", pos);
        Ok(chunk)
    }

    /// Persists `handle` if dirty. Readers proceed during the write;
    /// writers wait until the dirty flag is cleared.
    fn persist(&self, pos: ChunkPos, handle: &ChunkHandle) -> Result<(), StoreError> {
        let chunk = handle.upgradable_read();
        if !chunk.is_dirty() {
            return Ok(());
        }
        self.store.write_chunk(pos, &chunk)?;
        RwLockUpgradableReadGuard::upgrade(chunk).clear_dirty();
        tracing::debug!("saved chunk {}", pos);
        Ok(())
    }

    /// Persists `handle` and marks it evicted. Writes that land after the
    /// first save are flushed under the write lock before eviction.
    fn evict(&self, pos: ChunkPos, handle: &ChunkHandle) -> Result<(), StoreError> {
        self.persist(pos, handle)?;
        let mut chunk = handle.write();
        if chunk.is_dirty() {
            self.store.write_chunk(pos, &chunk)?;
            chunk.clear_dirty();
        }
        chunk.mark_evicted();
        Ok(())
    }

    fn save_one(&self, pos: ChunkPos) -> Result<(), StoreError> {
        let Some(slot) = self.slots.get(&pos).map(|s| Arc::clone(s.value())) else {
            // Never loaded through a slot, so nothing cached to save.
            return Ok(());
        };
        let retired = slot.retired.lock();
        if *retired {
            return Ok(());
        }
        match self.get_loaded(pos) {
            Some(handle) => self.persist(pos, &handle),
            None => Ok(()),
        }
    }

    fn save_all(&self) -> Result<(), FormatError> {
        let mut failures = Vec::new();
        for (pos, _) in self.snapshot() {
            if let Err(source) = self.save_one(pos) {
                tracing::warn!("failed to save chunk {}: {}", pos, source);
                failures.push(SaveFailure { pos, source });
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            failures.sort_by_key(|f| f.pos);
            Err(FormatError::SaveChunks(failures))
        }
    }

    fn snapshot(&self) -> Vec<(ChunkPos, ChunkHandle)> {
        self.loaded
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect()
    }

    fn slot(&self, pos: ChunkPos) -> Arc<ChunkSlot> {
        Arc::clone(self.slots.entry(pos).or_default().value())
    }

    /// Removes `slot` from the table if it is still the current one.
    fn retire(&self, pos: ChunkPos, slot: &Arc<ChunkSlot>) {
        self.slots.remove_if(&pos, |_, current| Arc::ptr_eq(current, slot));
    }

    fn check_open(&self) -> Result<(), FormatError> {
        if self.closed.load(Ordering::Acquire) {
            Err(FormatError::FormatClosed)
        } else {
            Ok(())
        }
    }
}

impl Format for Provider {
    fn close(&self) -> Result<(), FormatError> {
        self.check_open()?;
        self.save_all()?;
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(FormatError::FormatClosed);
        }
        for (pos, handle) in self.snapshot() {
            if let Err(source) = self.evict(pos, &handle) {
                tracing::warn!("chunk {} changed during close and was not saved: {}", pos, source);
                handle.write().mark_evicted();
            }
        }
        self.loaded.clear();
        self.slots.clear();
        self.store.close().map_err(FormatError::Release)?;
        tracing::info!("closed {} provider", self.dimension());
        Ok(())
    }

    fn dimension(&self) -> Dimension {
        *self.dimension.read()
    }

    fn set_dimension(&self, dimension: Dimension) {
        *self.dimension.write() = dimension;
    }

    fn load_chunk(&self, x: i32, y: i32, create: bool) -> Result<(), FormatError> {
        self.load(ChunkPos::new(x, y), create).map(|_| ())
    }

    fn unload_chunk(&self, x: i32, y: i32) -> Result<(), FormatError> {
        self.check_open()?;
        let pos = ChunkPos::new(x, y);
        let Some(slot) = self.slots.get(&pos).map(|s| Arc::clone(s.value())) else {
            return Ok(());
        };
        let mut retired = slot.retired.lock();
        if *retired {
            return Ok(());
        }
        if let Some(handle) = self.get_loaded(pos) {
            self.evict(pos, &handle)
                .map_err(|source| {
                    tracing::warn!("keeping chunk {} loaded, save failed: {}", pos, source);
                    FormatError::SaveFailed { x, y, source }
                })?;
            self.loaded.remove(&pos);
            tracing::debug!("unloaded chunk {}", pos);
        }
        *retired = true;
        self.retire(pos, &slot);
        Ok(())
    }

    fn generate_chunk(&self, x: i32, y: i32) -> Result<(), FormatError> {
        self.check_open()?;
        let pos = ChunkPos::new(x, y);
        loop {
            let slot = self.slot(pos);
            let retired = slot.retired.lock();
            if *retired {
                continue;
            }
            let chunk = self.run_generator(pos)?;
            match self.get_loaded(pos) {
                // Replace in place so outstanding handles see the new chunk.
                Some(handle) => *handle.write() = chunk,
                None => {
                    self.loaded.insert(pos, Arc::new(RwLock::new(chunk)));
                }
            }
            return Ok(());
        }
    }

    fn has_generated_chunk(&self, x: i32, y: i32) -> Result<bool, FormatError> {
        self.check_open()?;
        self.store
            .chunk_exists(ChunkPos::new(x, y))
            .map_err(|source| FormatError::Load { x, y, source })
    }

    fn is_loaded_chunk(&self, x: i32, y: i32) -> bool {
        !self.closed.load(Ordering::Acquire) && self.loaded.contains_key(&ChunkPos::new(x, y))
    }

    fn save_chunk(&self, x: i32, y: i32) -> Result<(), FormatError> {
        self.check_open()?;
        self.save_one(ChunkPos::new(x, y))
            .map_err(|source| FormatError::SaveFailed { x, y, source })
    }

    fn save_chunks(&self) -> Result<(), FormatError> {
        self.check_open()?;
        self.save_all()
    }

    fn chunk(&self, x: i32, y: i32) -> Result<ChunkHandle, FormatError> {
        self.load(ChunkPos::new(x, y), true)
    }

    fn loaded_chunks(&self) -> Vec<ChunkHandle> {
        if self.closed.load(Ordering::Acquire) {
            return Vec::new();
        }
        self.snapshot().into_iter().map(|(_, h)| h).collect()
    }
}
