//! Chunk-column world storage: palette-compressed block storage, subchunks
//! with generation state, chunk columns, and a concurrent chunk provider over
//! pluggable backing stores and generators.

pub mod autosave;
pub mod block_state;
pub mod block_storage;
pub mod chunk;
pub mod codec;
pub mod dimension;
pub mod error;
pub mod format;
pub mod generator;
pub mod level;
pub mod store;
pub mod sub_chunk;
pub mod word_packed;

pub use autosave::Autosaver;
pub use block_state::{BlockState, LegacyId};
pub use block_storage::{BLOCK_STORAGE_SIZE, BlockStorage, STORAGE_SIZE};
pub use chunk::{BAND_HEIGHT, COLUMN_AREA, Chunk, ChunkColumn, ChunkPos, EntityRecord};
pub use dimension::Dimension;
pub use error::{
    BlockError, CodecError, FormatError, GenerateError, OpenError, SaveFailure, StoreError,
};
pub use format::{ChunkHandle, Format, Provider};
pub use generator::{ChunkGenerator, FlatGenerator, FlatLayer, VoidGenerator};
pub use level::{Level, Spawn};
pub use store::{CHUNK_FILE_EXTENSION, ChunkStore, DirectoryStore, MemoryStore};
pub use sub_chunk::{Finalization, MAX_LAYERS, SubChunk, get_finalization};
