//! Error types for block access, persistence, generation, and the provider.

use crate::chunk::ChunkPos;

/// Errors raised while reading or writing blocks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    /// A local coordinate fell outside `[0, 15]`, or a world Y outside the
    /// bands a chunk can address.
    #[error("coordinate out of range: ({x}, {y}, {z})")]
    CoordinateOutOfRange {
        /// X component as given by the caller.
        x: i32,
        /// Y component as given by the caller.
        y: i32,
        /// Z component as given by the caller.
        z: i32,
    },
    /// The cell array is absent or not 4096 entries long.
    #[error("uninitialized block storage: {len} cells")]
    UninitializedStorage {
        /// Length of the cell array found.
        len: usize,
    },
    /// A cell references a palette slot that does not exist.
    #[error("palette miss: index {index} with palette of {palette_len}")]
    PaletteMiss {
        /// Palette index read from the cell.
        index: u16,
        /// Number of palette entries.
        palette_len: usize,
    },
    /// The requested storage layer does not exist.
    #[error("invalid storage layer: {0}")]
    InvalidLayer(isize),
    /// The subchunk band covering a world Y is not present.
    #[error("subchunk {0} not loaded")]
    SubChunkNotLoaded(i32),
    /// Every palette index is in use and none could be reclaimed.
    #[error("palette full: {len} entries")]
    PaletteFull {
        /// Number of palette entries.
        len: usize,
    },
    /// The chunk was unloaded from its provider and no longer accepts writes.
    #[error("chunk was unloaded")]
    ChunkEvicted,
}

/// Errors raised by the chunk codec.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The data does not start with the expected magic bytes.
    #[error("invalid magic bytes")]
    InvalidMagic,
    /// The format version is not supported by this build.
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),
    /// The data ended before a field could be read.
    #[error("data truncated at offset {offset}: needed {needed} more bytes")]
    Truncated {
        /// Offset at which the read started.
        offset: usize,
        /// Bytes that were missing.
        needed: usize,
    },
    /// A storage layer declared an unsupported bits-per-block value.
    #[error("invalid bits per block: {0}")]
    InvalidBitsPerBlock(u8),
    /// A string field was not valid UTF-8.
    #[error("invalid utf-8 in {0}")]
    InvalidString(&'static str),
    /// An encoded chunk named a different position than the one requested.
    #[error("chunk position mismatch: expected {expected}, found {found}")]
    PositionMismatch {
        /// Position the caller asked for.
        expected: ChunkPos,
        /// Position stored in the payload.
        found: ChunkPos,
    },
    /// A length does not fit the field that encodes it.
    #[error("{field} too large to encode: {len}")]
    TooLarge {
        /// Name of the length field.
        field: &'static str,
        /// Length that was rejected.
        len: usize,
    },
    /// Entity payload failed to (de)serialize.
    #[error("nbt: {0}")]
    Nbt(#[from] quartz_nbt::io::NbtIoError),
}

/// Errors raised by a backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// The stored bytes could not be encoded or decoded.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    /// The store was already released.
    #[error("store closed")]
    Closed,
    /// Adapter-specific failure.
    #[error("{0}")]
    Backend(String),
}

/// Error returned by a generation collaborator.
#[derive(Debug, thiserror::Error)]
#[error("generation failed: {0}")]
pub struct GenerateError(pub String);

/// A single chunk that could not be persisted by `save_chunks`.
#[derive(Debug, thiserror::Error)]
#[error("chunk {pos}: {source}")]
pub struct SaveFailure {
    /// Position of the chunk that failed.
    pub pos: ChunkPos,
    /// Cause reported by the store.
    #[source]
    pub source: StoreError,
}

/// Errors raised by a [`Format`](crate::format::Format).
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// No persisted data exists and creation was not requested.
    #[error("chunk ({x}, {y}) not found")]
    ChunkNotFound {
        /// Chunk X.
        x: i32,
        /// Chunk Y.
        y: i32,
    },
    /// The backing store refused a write.
    #[error("failed to save chunk ({x}, {y}): {source}")]
    SaveFailed {
        /// Chunk X.
        x: i32,
        /// Chunk Y.
        y: i32,
        /// Cause reported by the store.
        #[source]
        source: StoreError,
    },
    /// One or more chunks failed during a bulk save.
    #[error("{} chunk(s) failed to save", .0.len())]
    SaveChunks(Vec<SaveFailure>),
    /// The backing store failed while reading.
    #[error("failed to load chunk ({x}, {y}): {source}")]
    Load {
        /// Chunk X.
        x: i32,
        /// Chunk Y.
        y: i32,
        /// Cause reported by the store.
        #[source]
        source: StoreError,
    },
    /// The generation collaborator failed.
    #[error("failed to generate chunk ({x}, {y}): {source}")]
    Generate {
        /// Chunk X.
        x: i32,
        /// Chunk Y.
        y: i32,
        /// Cause reported by the generator.
        #[source]
        source: GenerateError,
    },
    /// The backing store failed to release.
    #[error("failed to release store: {0}")]
    Release(#[source] StoreError),
    /// The format was closed.
    #[error("format closed")]
    FormatClosed,
    /// Block access failed.
    #[error(transparent)]
    Block(#[from] BlockError),
}

impl FormatError {
    /// Positions of every chunk that failed in a bulk save.
    pub fn failed_positions(&self) -> Vec<ChunkPos> {
        match self {
            Self::SaveChunks(failures) => failures.iter().map(|f| f.pos).collect(),
            Self::SaveFailed { x, y, .. } => vec![ChunkPos::new(*x, *y)],
            _ => Vec::new(),
        }
    }
}

/// Errors raised while opening a [`Level`](crate::level::Level) from configuration.
#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    /// The configured dimension name is not known.
    #[error("unknown dimension: {0}")]
    UnknownDimension(String),
    /// The backing store could not be opened.
    #[error("failed to open store: {0}")]
    Store(#[from] StoreError),
    /// The generator settings were rejected.
    #[error("invalid generator settings: {0}")]
    Generator(#[from] GenerateError),
    /// The autosave thread could not be started.
    #[error("failed to start autosave: {0}")]
    Autosave(#[source] std::io::Error),
}
