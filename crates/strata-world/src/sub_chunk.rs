//! Sixteen-block-tall bands of a chunk column.
//!
//! A [`SubChunk`] stacks one or more [`BlockStorage`] layers. Layer 0 is the
//! primary block layer; higher layers are overlays such as waterlogging and
//! may be absent.

use serde::{Deserialize, Serialize};

use crate::block_state::BlockState;
use crate::block_storage::BlockStorage;
use crate::error::BlockError;

/// Number of storage layers [`SubChunk::set_block_at`] will create: the
/// primary layer and one overlay.
pub const MAX_LAYERS: usize = 2;

/// Generation progress of a subchunk.
///
/// Generation logic is expected to advance `NotGenerated` to `NotSpawnMobs`
/// or `Generated` and never backwards. Nothing here enforces that; stores
/// refuse to overwrite a persisted `Generated` band with a lower state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Finalization {
    /// The backing format cannot express generation state.
    Unsupported,
    /// Terrain has not been generated.
    #[default]
    NotGenerated,
    /// Terrain is generated but mobs have not been spawned.
    NotSpawnMobs,
    /// Fully generated.
    Generated,
}

/// Maps a raw on-disk finalization id to a [`Finalization`].
///
/// Unknown ids return `(Unsupported, false)`: the generation state of such a
/// subchunk must not be trusted.
pub fn get_finalization(raw: i32) -> (Finalization, bool) {
    match raw {
        0 => (Finalization::NotGenerated, true),
        1 => (Finalization::NotSpawnMobs, true),
        2 => (Finalization::Generated, true),
        _ => (Finalization::Unsupported, false),
    }
}

impl Finalization {
    /// Raw on-disk id, or `None` for `Unsupported`, which is never written.
    pub fn raw_id(self) -> Option<u8> {
        match self {
            Self::Unsupported => None,
            Self::NotGenerated => Some(0),
            Self::NotSpawnMobs => Some(1),
            Self::Generated => Some(2),
        }
    }

    /// Whether writing `self` over a persisted `previous` would lose progress.
    pub fn downgrades(self, previous: Finalization) -> bool {
        previous == Self::Generated && self != Self::Generated
    }
}

/// A 16×16×16 band at vertical index `y` within a chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubChunk {
    y: u8,
    storages: Vec<BlockStorage>,
    /// Generation progress of this band.
    pub finalization: Finalization,
}

impl SubChunk {
    /// Creates an empty band with no storage layers.
    pub fn new(y: u8) -> Self {
        Self {
            y,
            storages: Vec::new(),
            finalization: Finalization::NotGenerated,
        }
    }

    /// Creates a band whose primary layer is entirely air.
    pub fn new_air(y: u8) -> Self {
        let mut sub = Self::new(y);
        sub.storages.push(BlockStorage::filled(BlockState::air()));
        sub
    }

    /// Vertical band index.
    pub fn y(&self) -> u8 {
        self.y
    }

    /// All storage layers in order.
    pub fn storages(&self) -> &[BlockStorage] {
        &self.storages
    }

    /// Appends a storage layer and returns its index.
    pub fn push_storage(&mut self, storage: BlockStorage) -> usize {
        self.storages.push(storage);
        self.storages.len() - 1
    }

    /// Resolves a storage layer. Never panics, including for negative indices.
    pub fn get_block_storage(&self, index: isize) -> Option<&BlockStorage> {
        usize::try_from(index).ok().and_then(|i| self.storages.get(i))
    }

    /// Mutable variant of [`get_block_storage`](Self::get_block_storage).
    pub fn get_block_storage_mut(&mut self, index: isize) -> Option<&mut BlockStorage> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.storages.get_mut(i))
    }

    /// Returns the block at local `(x, y, z)` in storage layer `layer`.
    pub fn get_block_at(&self, x: i32, y: i32, z: i32, layer: isize) -> Result<&BlockState, BlockError> {
        self.get_block_storage(layer)
            .ok_or(BlockError::InvalidLayer(layer))?
            .get_block(x, y, z)
    }

    /// Writes a block into storage layer `layer`.
    ///
    /// Missing layers up to and including `layer` are created filled with air.
    /// Layers at or beyond [`MAX_LAYERS`] are rejected with
    /// [`BlockError::InvalidLayer`].
    pub fn set_block_at(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        layer: isize,
        state: BlockState,
    ) -> Result<(), BlockError> {
        let index = usize::try_from(layer)
            .ok()
            .filter(|&i| i < MAX_LAYERS)
            .ok_or(BlockError::InvalidLayer(layer))?;
        crate::block_storage::validate(x, y, z)?;
        while self.storages.len() <= index {
            self.storages.push(BlockStorage::filled(BlockState::air()));
        }
        self.storages[index].set_block(x, y, z, state)
    }
}
