//! Backing-store adapters.
//!
//! A [`ChunkStore`] owns the byte-level representation of chunks. The
//! provider asks it for raw bytes, has it decode them, and hands it whole
//! chunks to persist. Two adapters ship here: [`MemoryStore`] for tests and
//! ephemeral worlds, and [`DirectoryStore`] with one file per chunk.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::chunk::{Chunk, ChunkPos};
use crate::codec;
use crate::dimension::Dimension;
use crate::error::StoreError;
use crate::sub_chunk::Finalization;

/// Persistence contract a provider drives.
///
/// Implementations must be safe to call from several threads at once for
/// different positions.
pub trait ChunkStore: Send + Sync {
    /// Raw bytes persisted for `pos`, or `None` if nothing is stored.
    fn read_chunk(&self, pos: ChunkPos) -> Result<Option<Vec<u8>>, StoreError>;

    /// Decodes bytes returned by [`read_chunk`](Self::read_chunk).
    fn decode_chunk(&self, pos: ChunkPos, raw: &[u8]) -> Result<Chunk, StoreError> {
        Ok(codec::decode_chunk(pos, raw)?)
    }

    /// Persists `chunk` at `pos`.
    fn write_chunk(&self, pos: ChunkPos, chunk: &Chunk) -> Result<(), StoreError>;

    /// Whether persisted data exists for `pos`.
    fn chunk_exists(&self, pos: ChunkPos) -> Result<bool, StoreError>;

    /// Flushes and releases the store. Later calls may fail with
    /// [`StoreError::Closed`].
    fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Returns `chunk` with any band that was persisted as `Generated` kept at
/// `Generated`, so a rewrite never loses generation progress.
fn preserve_generated<'a>(
    pos: ChunkPos,
    chunk: &'a Chunk,
    previous: Option<&[u8]>,
) -> Cow<'a, Chunk> {
    let Some(previous) = previous else {
        return Cow::Borrowed(chunk);
    };
    let Ok(persisted) = codec::peek_finalizations(previous) else {
        return Cow::Borrowed(chunk);
    };
    let downgraded: Vec<u8> = persisted
        .into_iter()
        .filter(|&(y, old)| {
            chunk
                .sub_chunk(y)
                .is_some_and(|sub| sub.finalization.downgrades(old))
        })
        .map(|(y, _)| y)
        .collect();
    if downgraded.is_empty() {
        return Cow::Borrowed(chunk);
    }

    tracing::warn!(
        "refusing to downgrade generated subchunks {:?} of chunk {}",
        downgraded,
        pos
    );
    let mut fixed = chunk.clone();
    for y in downgraded {
        if let Some(sub) = fixed.band_mut(y) {
            sub.finalization = Finalization::Generated;
        }
    }
    Cow::Owned(fixed)
}

/// Reference in-memory store holding encoded chunks.
#[derive(Default)]
pub struct MemoryStore {
    chunks: RwLock<FxHashMap<ChunkPos, Vec<u8>>>,
    closed: AtomicBool,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted chunks.
    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    /// Returns `true` if nothing has been persisted.
    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Stores raw bytes directly, bypassing encoding.
    pub fn insert_raw(&self, pos: ChunkPos, raw: Vec<u8>) {
        self.chunks.write().insert(pos, raw);
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl ChunkStore for MemoryStore {
    fn read_chunk(&self, pos: ChunkPos) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_open()?;
        Ok(self.chunks.read().get(&pos).cloned())
    }

    fn write_chunk(&self, pos: ChunkPos, chunk: &Chunk) -> Result<(), StoreError> {
        self.check_open()?;
        let mut chunks = self.chunks.write();
        let chunk = preserve_generated(pos, chunk, chunks.get(&pos).map(Vec::as_slice));
        let bytes = codec::encode_chunk(&chunk)?;
        chunks.insert(pos, bytes);
        Ok(())
    }

    fn chunk_exists(&self, pos: ChunkPos) -> Result<bool, StoreError> {
        self.check_open()?;
        Ok(self.chunks.read().contains_key(&pos))
    }

    fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// File extension of chunk files written by [`DirectoryStore`].
pub const CHUNK_FILE_EXTENSION: &str = "stck";

/// Store keeping one STCK file per chunk under `<root>/<dimension>/`.
pub struct DirectoryStore {
    dir: PathBuf,
    closed: AtomicBool,
}

impl DirectoryStore {
    /// Opens (creating if needed) the directory for `dimension` under `root`.
    pub fn open(root: &Path, dimension: Dimension) -> Result<Self, StoreError> {
        let dir = root.join(dimension.name());
        std::fs::create_dir_all(&dir)?;
        tracing::info!("opened chunk directory {}", dir.display());
        Ok(Self {
            dir,
            closed: AtomicBool::new(false),
        })
    }

    /// Directory holding the chunk files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file for `pos`.
    pub fn chunk_path(&self, pos: ChunkPos) -> PathBuf {
        self.dir
            .join(format!("c.{}.{}.{CHUNK_FILE_EXTENSION}", pos.x, pos.y))
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl ChunkStore for DirectoryStore {
    fn read_chunk(&self, pos: ChunkPos) -> Result<Option<Vec<u8>>, StoreError> {
        self.check_open()?;
        match std::fs::read(self.chunk_path(pos)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_chunk(&self, pos: ChunkPos, chunk: &Chunk) -> Result<(), StoreError> {
        self.check_open()?;
        let previous = self.read_chunk(pos)?;
        let chunk = preserve_generated(pos, chunk, previous.as_deref());
        let bytes = codec::encode_chunk(&chunk)?;

        // Write then rename so a crash never leaves a half-written chunk.
        let path = self.chunk_path(pos);
        let tmp = path.with_extension(format!("{CHUNK_FILE_EXTENSION}.tmp"));
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &path)?;
        tracing::debug!("wrote chunk {} ({} bytes)", pos, bytes.len());
        Ok(())
    }

    fn chunk_exists(&self, pos: ChunkPos) -> Result<bool, StoreError> {
        self.check_open()?;
        Ok(self.chunk_path(pos).try_exists()?)
    }

    fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(StoreError::Closed);
        }
        tracing::info!("closed chunk directory {}", self.dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block_state::BlockState;
    use crate::chunk::ChunkColumn;
    use crate::sub_chunk::SubChunk;

    fn generated_chunk(pos: ChunkPos) -> Chunk {
        let mut chunk = Chunk::new(pos);
        let mut sub = SubChunk::new_air(0);
        sub.finalization = Finalization::Generated;
        chunk.insert_sub_chunk(sub).unwrap();
        chunk
    }

    #[test]
    fn test_memory_store_write_read_exists() {
        let store = MemoryStore::new();
        let pos = ChunkPos::new(3, -4);
        assert!(!store.chunk_exists(pos).unwrap());
        assert!(store.read_chunk(pos).unwrap().is_none());

        let mut chunk = Chunk::new(pos);
        chunk.set_block(0, 0, 0, BlockState::new("minecraft:stone")).unwrap();
        store.write_chunk(pos, &chunk).unwrap();

        assert!(store.chunk_exists(pos).unwrap());
        let raw = store.read_chunk(pos).unwrap().unwrap();
        let decoded = store.decode_chunk(pos, &raw).unwrap();
        assert_eq!(decoded.get_block(0, 0, 0).unwrap().name(), "minecraft:stone");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_closed() {
        let store = MemoryStore::new();
        store.close().unwrap();
        assert!(matches!(
            store.read_chunk(ChunkPos::new(0, 0)),
            Err(StoreError::Closed)
        ));
    }

    #[test]
    fn test_write_keeps_generated_state() {
        let store = MemoryStore::new();
        let pos = ChunkPos::new(0, 0);
        store.write_chunk(pos, &generated_chunk(pos)).unwrap();

        let mut regressed = generated_chunk(pos);
        regressed.sub_chunk_mut(0).unwrap().finalization = Finalization::NotGenerated;
        store.write_chunk(pos, &regressed).unwrap();

        let raw = store.read_chunk(pos).unwrap().unwrap();
        let decoded = store.decode_chunk(pos, &raw).unwrap();
        assert_eq!(decoded.sub_chunk(0).unwrap().finalization, Finalization::Generated);
    }

    #[test]
    fn test_directory_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path(), Dimension::Nether).unwrap();
        let pos = ChunkPos::new(-1, 12);
        assert!(!store.chunk_exists(pos).unwrap());

        store.write_chunk(pos, &generated_chunk(pos)).unwrap();
        assert!(store.chunk_exists(pos).unwrap());
        assert!(store.chunk_path(pos).ends_with("nether/c.-1.12.stck"));

        let raw = store.read_chunk(pos).unwrap().unwrap();
        let decoded = store.decode_chunk(pos, &raw).unwrap();
        assert_eq!(decoded.pos(), pos);
        assert_eq!(decoded.sub_chunk(0).unwrap().finalization, Finalization::Generated);
    }

    #[test]
    fn test_directory_store_close_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::open(dir.path(), Dimension::Overworld).unwrap();
        store.close().unwrap();
        assert!(matches!(store.close(), Err(StoreError::Closed)));
        assert!(matches!(
            store.chunk_exists(ChunkPos::new(0, 0)),
            Err(StoreError::Closed)
        ));
    }
}
