//! Full-height chunk columns.
//!
//! A [`Chunk`] owns the sparse set of [`SubChunk`] bands at one chunk-grid
//! coordinate, plus 256-entry height and biome grids and opaque entity
//! records. Column grids are indexed `z * 16 + x`, matching the storage
//! layout.

use std::collections::BTreeMap;
use std::fmt;

use quartz_nbt::NbtCompound;
use serde::{Deserialize, Serialize};

use crate::block_state::BlockState;
use crate::error::BlockError;
use crate::sub_chunk::{MAX_LAYERS, SubChunk};

/// Number of columns in a chunk (16 × 16).
pub const COLUMN_AREA: usize = 256;

/// Height of one subchunk band in blocks.
pub const BAND_HEIGHT: i32 = 16;

/// Opaque structured record attached to a chunk (entity or block entity).
pub type EntityRecord = NbtCompound;

/// Position of a chunk in chunk-grid space.
///
/// `y` is the grid's second horizontal axis, not a vertical coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    /// Chunk-grid X.
    pub x: i32,
    /// Chunk-grid Y.
    pub y: i32,
}

impl ChunkPos {
    /// Creates a chunk position.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the position offset by `(dx, dy)`.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for ChunkPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Capability set of a chunk column, independent of how it is stored.
pub trait ChunkColumn {
    /// Chunk-grid X.
    fn x(&self) -> i32;
    /// Chunk-grid Y.
    fn y(&self) -> i32;
    /// Height of the highest block in column `(x, z)`.
    fn height(&self, x: i32, z: i32) -> Result<u16, BlockError>;
    /// Sets the height of column `(x, z)`.
    fn set_height(&mut self, x: i32, z: i32, height: u16) -> Result<(), BlockError>;
    /// Biome id of column `(x, z)`.
    fn biome(&self, x: i32, z: i32) -> Result<u8, BlockError>;
    /// Sets the biome id of column `(x, z)`.
    fn set_biome(&mut self, x: i32, z: i32, biome: u8) -> Result<(), BlockError>;
    /// Entity records.
    fn entities(&self) -> &[EntityRecord];
    /// Replaces all entity records.
    fn set_entities(&mut self, entities: Vec<EntityRecord>) -> Result<(), BlockError>;
    /// Block-entity records.
    fn block_entities(&self) -> &[EntityRecord];
    /// Replaces all block-entity records.
    fn set_block_entities(&mut self, block_entities: Vec<EntityRecord>) -> Result<(), BlockError>;
    /// Block at chunk-relative `(x, y, z)` in the primary layer.
    fn get_block(&self, x: i32, y: i32, z: i32) -> Result<&BlockState, BlockError>;
    /// Writes a block at chunk-relative `(x, y, z)` in the primary layer.
    fn set_block(&mut self, x: i32, y: i32, z: i32, state: BlockState) -> Result<(), BlockError>;
}

/// A chunk column at a fixed position.
///
/// The position is fixed at construction; it is the provider's cache key.
/// Once a provider unloads the chunk it is evicted and every mutator fails
/// with [`BlockError::ChunkEvicted`]; fetch a fresh handle instead.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pos: ChunkPos,
    sub_chunks: BTreeMap<u8, SubChunk>,
    heights: Vec<u16>,
    biomes: Vec<u8>,
    entities: Vec<EntityRecord>,
    block_entities: Vec<EntityRecord>,
    dirty: bool,
    version: u64,
    evicted: bool,
}

fn column_index(x: i32, z: i32) -> Result<usize, BlockError> {
    if (0..16).contains(&x) && (0..16).contains(&z) {
        Ok((z * 16 + x) as usize)
    } else {
        Err(BlockError::CoordinateOutOfRange { x, y: 0, z })
    }
}

/// Splits a chunk-relative Y into its band index and the Y inside that band.
fn resolve_band(x: i32, y: i32, z: i32) -> Result<(u8, i32), BlockError> {
    let band = u8::try_from(y.div_euclid(BAND_HEIGHT))
        .map_err(|_| BlockError::CoordinateOutOfRange { x, y, z })?;
    Ok((band, y.rem_euclid(BAND_HEIGHT)))
}

impl Chunk {
    /// Creates an empty chunk with zeroed grids and no subchunks.
    pub fn new(pos: ChunkPos) -> Self {
        Self {
            pos,
            sub_chunks: BTreeMap::new(),
            heights: vec![0; COLUMN_AREA],
            biomes: vec![0; COLUMN_AREA],
            entities: Vec::new(),
            block_entities: Vec::new(),
            dirty: false,
            version: 0,
            evicted: false,
        }
    }

    /// Position of this chunk.
    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    /// Subchunks present, ordered by band.
    pub fn sub_chunks(&self) -> impl Iterator<Item = &SubChunk> {
        self.sub_chunks.values()
    }

    /// Band `y`, if present.
    pub fn sub_chunk(&self, y: u8) -> Option<&SubChunk> {
        self.sub_chunks.get(&y)
    }

    /// Mutable band `y`. Marks the chunk dirty.
    pub fn sub_chunk_mut(&mut self, y: u8) -> Result<&mut SubChunk, BlockError> {
        self.check_live()?;
        let sub = self
            .sub_chunks
            .get_mut(&y)
            .ok_or(BlockError::SubChunkNotLoaded(i32::from(y)))?;
        self.dirty = true;
        self.version += 1;
        Ok(sub)
    }

    /// Inserts a subchunk, replacing any band with the same `y`.
    pub fn insert_sub_chunk(&mut self, sub: SubChunk) -> Result<Option<SubChunk>, BlockError> {
        self.check_live()?;
        self.touch();
        Ok(self.sub_chunks.insert(sub.y(), sub))
    }

    /// Removes band `y`.
    pub fn remove_sub_chunk(&mut self, y: u8) -> Result<Option<SubChunk>, BlockError> {
        self.check_live()?;
        let removed = self.sub_chunks.remove(&y);
        if removed.is_some() {
            self.touch();
        }
        Ok(removed)
    }

    /// Block at chunk-relative `(x, y, z)` in storage layer `layer`.
    pub fn get_block_at_layer(
        &self,
        x: i32,
        y: i32,
        z: i32,
        layer: isize,
    ) -> Result<&BlockState, BlockError> {
        let (band, local_y) = resolve_band(x, y, z)?;
        self.sub_chunks
            .get(&band)
            .ok_or(BlockError::SubChunkNotLoaded(i32::from(band)))?
            .get_block_at(x, local_y, z, layer)
    }

    /// Writes a block in storage layer `layer`, creating the band if absent.
    pub fn set_block_at_layer(
        &mut self,
        x: i32,
        y: i32,
        z: i32,
        layer: isize,
        state: BlockState,
    ) -> Result<(), BlockError> {
        self.check_live()?;
        let (band, local_y) = resolve_band(x, y, z)?;
        crate::block_storage::validate(x, local_y, z)?;
        if !(0..MAX_LAYERS as isize).contains(&layer) {
            return Err(BlockError::InvalidLayer(layer));
        }
        self.sub_chunks
            .entry(band)
            .or_insert_with(|| SubChunk::new_air(band))
            .set_block_at(x, local_y, z, layer, state)?;
        self.touch();
        Ok(())
    }

    /// Height grid, indexed `z * 16 + x`.
    pub fn height_map(&self) -> &[u16] {
        &self.heights
    }

    /// Biome grid, indexed `z * 16 + x`.
    pub fn biome_map(&self) -> &[u8] {
        &self.biomes
    }

    /// Recomputes every column height from the primary layer.
    ///
    /// A column's height is one above its highest non-air block, or 0 if
    /// the column is empty or unreadable.
    pub fn recalculate_height_map(&mut self) -> Result<(), BlockError> {
        self.check_live()?;
        for z in 0..16 {
            for x in 0..16 {
                let mut height = 0u16;
                'bands: for sub in self.sub_chunks.values().rev() {
                    for ly in (0..BAND_HEIGHT).rev() {
                        if let Ok(state) = sub.get_block_at(x, ly, z, 0)
                            && !state.is_air()
                        {
                            let world_y = i32::from(sub.y()) * BAND_HEIGHT + ly;
                            height = (world_y + 1) as u16;
                            break 'bands;
                        }
                    }
                }
                self.heights[(z * 16 + x) as usize] = height;
            }
        }
        self.touch();
        Ok(())
    }

    /// Whether the chunk has changes not yet persisted.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Flags the chunk as needing persistence.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Clears the dirty flag after a successful save.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Mutation counter, incremented on every change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the chunk was unloaded and no longer accepts writes.
    pub fn is_evicted(&self) -> bool {
        self.evicted
    }

    /// Band `y` for persistence fix-ups. Skips the eviction check and
    /// leaves the dirty flag alone.
    pub(crate) fn band_mut(&mut self, y: u8) -> Option<&mut SubChunk> {
        self.sub_chunks.get_mut(&y)
    }

    pub(crate) fn mark_evicted(&mut self) {
        self.evicted = true;
    }

    /// Assembles a clean chunk from decoded parts.
    ///
    /// Grids of the wrong length are resized with zeros; later bands replace
    /// earlier ones with the same `y`.
    pub(crate) fn from_parts(
        pos: ChunkPos,
        subs: Vec<SubChunk>,
        mut heights: Vec<u16>,
        mut biomes: Vec<u8>,
        entities: Vec<EntityRecord>,
        block_entities: Vec<EntityRecord>,
    ) -> Self {
        heights.resize(COLUMN_AREA, 0);
        biomes.resize(COLUMN_AREA, 0);
        Self {
            pos,
            sub_chunks: subs.into_iter().map(|s| (s.y(), s)).collect(),
            heights,
            biomes,
            entities,
            block_entities,
            dirty: false,
            version: 0,
            evicted: false,
        }
    }

    fn check_live(&self) -> Result<(), BlockError> {
        if self.evicted {
            Err(BlockError::ChunkEvicted)
        } else {
            Ok(())
        }
    }

    fn touch(&mut self) {
        self.dirty = true;
        self.version += 1;
    }
}

impl ChunkColumn for Chunk {
    fn x(&self) -> i32 {
        self.pos.x
    }

    fn y(&self) -> i32 {
        self.pos.y
    }

    fn height(&self, x: i32, z: i32) -> Result<u16, BlockError> {
        Ok(self.heights[column_index(x, z)?])
    }

    fn set_height(&mut self, x: i32, z: i32, height: u16) -> Result<(), BlockError> {
        self.check_live()?;
        let i = column_index(x, z)?;
        self.heights[i] = height;
        self.touch();
        Ok(())
    }

    fn biome(&self, x: i32, z: i32) -> Result<u8, BlockError> {
        Ok(self.biomes[column_index(x, z)?])
    }

    fn set_biome(&mut self, x: i32, z: i32, biome: u8) -> Result<(), BlockError> {
        self.check_live()?;
        let i = column_index(x, z)?;
        self.biomes[i] = biome;
        self.touch();
        Ok(())
    }

    fn entities(&self) -> &[EntityRecord] {
        &self.entities
    }

    fn set_entities(&mut self, entities: Vec<EntityRecord>) -> Result<(), BlockError> {
        self.check_live()?;
        self.entities = entities;
        self.touch();
        Ok(())
    }

    fn block_entities(&self) -> &[EntityRecord] {
        &self.block_entities
    }

    fn set_block_entities(&mut self, block_entities: Vec<EntityRecord>) -> Result<(), BlockError> {
        self.check_live()?;
        self.block_entities = block_entities;
        self.touch();
        Ok(())
    }

    fn get_block(&self, x: i32, y: i32, z: i32) -> Result<&BlockState, BlockError> {
        self.get_block_at_layer(x, y, z, 0)
    }

    fn set_block(&mut self, x: i32, y: i32, z: i32, state: BlockState) -> Result<(), BlockError> {
        self.set_block_at_layer(x, y, z, 0, state)
    }
}
