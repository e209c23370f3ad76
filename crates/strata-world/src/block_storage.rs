//! Palette-indexed storage for one 16×16×16 block layer.
//!
//! Each of the 4096 cells holds a small index into a local palette of
//! [`BlockState`] values. Cells are laid out Y-major: the cell for local
//! `(x, y, z)` lives at `y * 256 + z * 16 + x`. Serialized formats depend on
//! that ordering, so it must not change.

use crate::block_state::BlockState;
use crate::error::BlockError;

/// Side length of a storage layer in blocks.
pub const STORAGE_SIZE: i32 = 16;

/// Number of cells in a storage layer (16³).
pub const BLOCK_STORAGE_SIZE: usize = 4096;

/// Checks that a local coordinate triple lies within `[0, 15]`.
pub fn validate(x: i32, y: i32, z: i32) -> Result<(), BlockError> {
    let in_range = |v: i32| (0..STORAGE_SIZE).contains(&v);
    if in_range(x) && in_range(y) && in_range(z) {
        Ok(())
    } else {
        Err(BlockError::CoordinateOutOfRange { x, y, z })
    }
}

/// Cell index of an already validated local coordinate.
pub fn index_of(x: i32, y: i32, z: i32) -> usize {
    ((y << 8) | (z << 4) | x) as usize
}

/// One layer of palette-compressed block data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockStorage {
    /// Palette entries, addressed by the values in `cells`.
    palette: Vec<BlockState>,
    /// Palette index per cell, Y-major.
    cells: Vec<u16>,
}

impl BlockStorage {
    /// Creates a storage with 4096 zeroed cells and an empty palette.
    ///
    /// Reads fail with [`BlockError::PaletteMiss`] until a block is set or a
    /// palette entry is pushed.
    pub fn new() -> Self {
        Self {
            palette: Vec::new(),
            cells: vec![0; BLOCK_STORAGE_SIZE],
        }
    }

    /// Creates a storage where every cell resolves to `state`.
    pub fn filled(state: BlockState) -> Self {
        Self {
            palette: vec![state],
            cells: vec![0; BLOCK_STORAGE_SIZE],
        }
    }

    /// Builds a storage from decoded parts without validating them.
    ///
    /// Malformed input is reported when a cell is read.
    pub fn from_raw_parts(palette: Vec<BlockState>, cells: Vec<u16>) -> Self {
        Self { palette, cells }
    }

    /// Returns the block at local `(x, y, z)`.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<&BlockState, BlockError> {
        validate(x, y, z)?;
        if self.cells.len() != BLOCK_STORAGE_SIZE {
            return Err(BlockError::UninitializedStorage {
                len: self.cells.len(),
            });
        }
        let id = self.cells[index_of(x, y, z)];
        self.palette
            .get(id as usize)
            .ok_or(BlockError::PaletteMiss {
                index: id,
                palette_len: self.palette.len(),
            })
    }

    /// Writes `state` at local `(x, y, z)`, reusing an equal palette entry
    /// or appending a new one.
    ///
    /// When every `u16` index is taken, unreferenced entries are compacted
    /// away before appending.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, state: BlockState) -> Result<(), BlockError> {
        validate(x, y, z)?;
        if self.cells.len() != BLOCK_STORAGE_SIZE {
            return Err(BlockError::UninitializedStorage {
                len: self.cells.len(),
            });
        }
        let id = self.palette_index_or_insert(state)?;
        self.cells[index_of(x, y, z)] = id;
        Ok(())
    }

    /// Palette entries in index order.
    pub fn palette(&self) -> &[BlockState] {
        &self.palette
    }

    /// Raw cell indices, Y-major.
    pub fn cells(&self) -> &[u16] {
        &self.cells
    }

    /// Number of palette entries.
    pub fn palette_len(&self) -> usize {
        self.palette.len()
    }

    /// Returns `true` if every cell resolves to air (or the palette is only air).
    pub fn is_empty(&self) -> bool {
        self.palette.iter().all(BlockState::is_air)
    }

    /// Drops palette entries no cell references and renumbers the cells.
    ///
    /// Scans every cell; call before serialization rather than per write.
    /// Cells that already miss the palette are left untouched.
    pub fn compact(&mut self) {
        if self.cells.len() != BLOCK_STORAGE_SIZE {
            return;
        }
        let mut used = vec![false; self.palette.len()];
        for &id in &self.cells {
            if let Some(slot) = used.get_mut(id as usize) {
                *slot = true;
            }
        }
        if used.iter().all(|&u| u) {
            return;
        }

        let mut old_to_new = vec![0u16; self.palette.len()];
        let mut palette = Vec::with_capacity(self.palette.len());
        for (old, state) in self.palette.drain(..).enumerate() {
            if used[old] {
                // At most 4096 entries are referenced, so the index fits.
                old_to_new[old] = palette.len() as u16;
                palette.push(state);
            }
        }
        for id in &mut self.cells {
            if let Some(&new) = old_to_new.get(*id as usize) {
                *id = new;
            }
        }
        self.palette = palette;
    }

    fn palette_index_or_insert(&mut self, state: BlockState) -> Result<u16, BlockError> {
        if let Some(idx) = self.palette.iter().position(|s| *s == state) {
            // Entries past u16::MAX are never referenced by a cell.
            if let Ok(id) = u16::try_from(idx) {
                return Ok(id);
            }
        }
        if u16::try_from(self.palette.len()).is_err() {
            self.compact();
        }
        let id = u16::try_from(self.palette.len()).map_err(|_| BlockError::PaletteFull {
            len: self.palette.len(),
        })?;
        self.palette.push(state);
        Ok(id)
    }
}

impl Default for BlockStorage {
    fn default() -> Self {
        Self::new()
    }
}
