//! Binary encoding of [`Chunk`] for the bundled stores.
//!
//! The STCK (Strata Chunk) format is versioned and little-endian throughout.
//!
//! ## Layout
//!
//! | Field | Encoding |
//! |-------|----------|
//! | magic | `[0x53, 0x54, 0x43, 0x4B]` ("STCK") |
//! | version | `u8`, currently 1 |
//! | position | `i32` x, `i32` y |
//! | height map | 256 × `u16` |
//! | biomes | 256 × `u8` |
//! | subchunk count | `u16`, then per subchunk: `u8` y, `u8` finalization id (`0xFF` = unsupported), `u8` layer count, layers |
//! | layer | `u16` palette length, palette entries, `u16` cell count, `u8` bits per block, packed words (`u32`) |
//! | palette entry | name string, `u16` property count (`0xFFFF` = none) + key/value strings, `u8` legacy flag [+ `u16` id, `u16` meta] |
//! | entities | `u32` count, then per record `u32` length + uncompressed NBT |
//! | block entities | same as entities |
//!
//! Strings are a `u16` byte length followed by UTF-8.

use std::collections::BTreeMap;
use std::io::Cursor;

use quartz_nbt::io::Flavor;

use crate::block_state::BlockState;
use crate::block_storage::BlockStorage;
use crate::chunk::{COLUMN_AREA, Chunk, ChunkColumn, ChunkPos, EntityRecord};
use crate::error::CodecError;
use crate::sub_chunk::{Finalization, SubChunk, get_finalization};
use crate::word_packed;

/// Magic bytes identifying the STCK format.
const MAGIC: [u8; 4] = [0x53, 0x54, 0x43, 0x4B];

/// Current format version.
const FORMAT_VERSION: u8 = 1;

/// Finalization byte written for [`Finalization::Unsupported`].
const NO_FINALIZATION: u8 = 0xFF;

/// Property count marking a palette entry without a property view.
const NO_PROPERTIES: u16 = u16::MAX;

/// Encodes a chunk to STCK bytes.
pub fn encode_chunk(chunk: &Chunk) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::with_capacity(1024);
    buf.extend_from_slice(&MAGIC);
    buf.push(FORMAT_VERSION);
    buf.extend_from_slice(&chunk.x().to_le_bytes());
    buf.extend_from_slice(&chunk.y().to_le_bytes());

    for h in chunk.height_map() {
        buf.extend_from_slice(&h.to_le_bytes());
    }
    buf.extend_from_slice(chunk.biome_map());

    let subs: Vec<&SubChunk> = chunk.sub_chunks().collect();
    buf.extend_from_slice(&length::<u16>("subchunk count", subs.len())?.to_le_bytes());
    for sub in subs {
        buf.push(sub.y());
        buf.push(sub.finalization.raw_id().unwrap_or(NO_FINALIZATION));
        buf.push(length::<u8>("layer count", sub.storages().len())?);
        for storage in sub.storages() {
            encode_storage(&mut buf, storage)?;
        }
    }

    encode_records(&mut buf, chunk.entities())?;
    encode_records(&mut buf, chunk.block_entities())?;
    Ok(buf)
}

/// Decodes STCK bytes, checking that they describe the chunk at `expected`.
pub fn decode_chunk(expected: ChunkPos, data: &[u8]) -> Result<Chunk, CodecError> {
    let mut r = Reader::new(data);
    if r.take(4).map_err(|_| CodecError::InvalidMagic)? != MAGIC {
        return Err(CodecError::InvalidMagic);
    }
    let version = r.u8()?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let found = ChunkPos::new(r.i32()?, r.i32()?);
    if found != expected {
        return Err(CodecError::PositionMismatch { expected, found });
    }

    let heights = (0..COLUMN_AREA)
        .map(|_| r.u16())
        .collect::<Result<Vec<_>, _>>()?;
    let biomes = r.take(COLUMN_AREA)?.to_vec();

    let sub_count = r.u16()?;
    let mut subs = Vec::with_capacity(sub_count as usize);
    for _ in 0..sub_count {
        let y = r.u8()?;
        let (finalization, _) = get_finalization(i32::from(r.u8()?));
        let layers = r.u8()?;
        let mut sub = SubChunk::new(y);
        sub.finalization = finalization;
        for _ in 0..layers {
            sub.push_storage(decode_storage(&mut r)?);
        }
        subs.push(sub);
    }

    let entities = decode_records(&mut r)?;
    let block_entities = decode_records(&mut r)?;
    Ok(Chunk::from_parts(
        found,
        subs,
        heights,
        biomes,
        entities,
        block_entities,
    ))
}

/// Reads only the per-band finalization states of an encoded chunk.
pub fn peek_finalizations(data: &[u8]) -> Result<Vec<(u8, Finalization)>, CodecError> {
    let mut r = Reader::new(data);
    if r.take(4).map_err(|_| CodecError::InvalidMagic)? != MAGIC {
        return Err(CodecError::InvalidMagic);
    }
    let version = r.u8()?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    r.take(8 + COLUMN_AREA * 3)?;
    let sub_count = r.u16()?;
    let mut out = Vec::with_capacity(sub_count as usize);
    for _ in 0..sub_count {
        let y = r.u8()?;
        let (finalization, _) = get_finalization(i32::from(r.u8()?));
        out.push((y, finalization));
        let layers = r.u8()?;
        for _ in 0..layers {
            decode_storage(&mut r)?;
        }
    }
    Ok(out)
}

fn encode_storage(buf: &mut Vec<u8>, storage: &BlockStorage) -> Result<(), CodecError> {
    let palette = storage.palette();
    buf.extend_from_slice(&length::<u16>("palette length", palette.len())?.to_le_bytes());
    for state in palette {
        encode_state(buf, state)?;
    }
    let cells = storage.cells();
    buf.extend_from_slice(&length::<u16>("cell count", cells.len())?.to_le_bytes());
    let bits = word_packed::bits_for_palette(palette.len());
    buf.push(bits);
    for word in word_packed::pack(cells, bits) {
        buf.extend_from_slice(&word.to_le_bytes());
    }
    Ok(())
}

fn decode_storage(r: &mut Reader<'_>) -> Result<BlockStorage, CodecError> {
    let palette_len = r.u16()?;
    let palette = (0..palette_len)
        .map(|_| decode_state(r))
        .collect::<Result<Vec<_>, _>>()?;
    let cell_count = r.u16()? as usize;
    let bits = r.u8()?;
    if !word_packed::VALID_BITS.contains(&bits) {
        return Err(CodecError::InvalidBitsPerBlock(bits));
    }
    let words = (0..word_packed::word_count(bits, cell_count))
        .map(|_| r.u32())
        .collect::<Result<Vec<_>, _>>()?;
    let cells = word_packed::unpack(&words, bits, cell_count)
        .ok_or(CodecError::InvalidBitsPerBlock(bits))?;
    Ok(BlockStorage::from_raw_parts(palette, cells))
}

fn encode_state(buf: &mut Vec<u8>, state: &BlockState) -> Result<(), CodecError> {
    encode_str(buf, state.name())?;
    match state.properties() {
        Some(props) => {
            let count = length::<u16>("property count", props.len())?;
            if count == NO_PROPERTIES {
                return Err(CodecError::TooLarge {
                    field: "property count",
                    len: props.len(),
                });
            }
            buf.extend_from_slice(&count.to_le_bytes());
            for (k, v) in props {
                encode_str(buf, k)?;
                encode_str(buf, v)?;
            }
        }
        None => buf.extend_from_slice(&NO_PROPERTIES.to_le_bytes()),
    }
    match state.legacy_id() {
        Some(legacy) => {
            buf.push(1);
            buf.extend_from_slice(&legacy.id.to_le_bytes());
            buf.extend_from_slice(&legacy.meta.to_le_bytes());
        }
        None => buf.push(0),
    }
    Ok(())
}

fn decode_state(r: &mut Reader<'_>) -> Result<BlockState, CodecError> {
    let name = r.string("block name")?;
    let prop_count = r.u16()?;
    let mut state = if prop_count == NO_PROPERTIES {
        BlockState::new(name)
    } else {
        let mut props = BTreeMap::new();
        for _ in 0..prop_count {
            let k = r.string("property key")?;
            let v = r.string("property value")?;
            props.insert(k, v);
        }
        BlockState::with_properties(name, props)
    };
    if r.u8()? != 0 {
        let id = r.u16()?;
        let meta = r.u16()?;
        state = state.legacy(id, meta);
    }
    Ok(state)
}

fn encode_str(buf: &mut Vec<u8>, s: &str) -> Result<(), CodecError> {
    buf.extend_from_slice(&length::<u16>("string length", s.len())?.to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Narrows a length to its field width, failing instead of truncating.
fn length<T: TryFrom<usize>>(field: &'static str, len: usize) -> Result<T, CodecError> {
    T::try_from(len).map_err(|_| CodecError::TooLarge { field, len })
}

fn encode_records(buf: &mut Vec<u8>, records: &[EntityRecord]) -> Result<(), CodecError> {
    buf.extend_from_slice(&length::<u32>("record count", records.len())?.to_le_bytes());
    for record in records {
        let mut nbt = Vec::new();
        quartz_nbt::io::write_nbt(&mut nbt, Some(""), record, Flavor::Uncompressed)?;
        buf.extend_from_slice(&length::<u32>("record length", nbt.len())?.to_le_bytes());
        buf.extend_from_slice(&nbt);
    }
    Ok(())
}

fn decode_records(r: &mut Reader<'_>) -> Result<Vec<EntityRecord>, CodecError> {
    let count = r.u32()?;
    let mut out = Vec::new();
    for _ in 0..count {
        let len = r.u32()? as usize;
        let mut cursor = Cursor::new(r.take(len)?);
        let (record, _) = quartz_nbt::io::read_nbt(&mut cursor, Flavor::Uncompressed)?;
        out.push(record);
    }
    Ok(out)
}

/// Bounds-checked little-endian cursor.
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.offset.checked_add(n).filter(|&e| e <= self.data.len());
        let Some(end) = end else {
            return Err(CodecError::Truncated {
                offset: self.offset,
                needed: n - (self.data.len() - self.offset.min(self.data.len())),
            });
        };
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32, CodecError> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidString(field))
    }
}

#[cfg(test)]
mod tests {
    use quartz_nbt::NbtCompound;

    use super::*;

    fn sample_chunk() -> Chunk {
        let mut chunk = Chunk::new(ChunkPos::new(-2, 9));
        let granite = BlockState::new("minecraft:stone").property("variant", "granite");
        let wool = BlockState::with_legacy("minecraft:wool", 35, 3);
        for x in 0..16 {
            chunk.set_block(x, 0, 0, granite.clone()).unwrap();
        }
        chunk.set_block(5, 40, 7, wool).unwrap();
        chunk
            .set_block_at_layer(1, 1, 1, 1, BlockState::new("minecraft:water"))
            .unwrap();
        chunk.set_biome(1, 2, 7).unwrap();
        chunk.set_height(1, 2, 41).unwrap();
        chunk.sub_chunk_mut(2).unwrap().finalization = Finalization::Generated;
        let mut pig = NbtCompound::new();
        pig.insert("id", "minecraft:pig");
        chunk.set_entities(vec![pig]).unwrap();
        chunk
    }

    #[test]
    fn test_encoded_chunk_decodes_to_same_blocks() {
        let chunk = sample_chunk();
        let bytes = encode_chunk(&chunk).unwrap();
        let decoded = decode_chunk(chunk.pos(), &bytes).unwrap();

        assert_eq!(decoded.get_block(3, 0, 0), chunk.get_block(3, 0, 0));
        assert_eq!(decoded.get_block(5, 40, 7).unwrap().to_id_meta(), Some((35, 3)));
        assert_eq!(
            decoded.get_block_at_layer(1, 1, 1, 1).unwrap().name(),
            "minecraft:water"
        );
        assert_eq!(decoded.biome(1, 2).unwrap(), 7);
        assert_eq!(decoded.height(1, 2).unwrap(), 41);
        assert_eq!(decoded.sub_chunk(2).unwrap().finalization, Finalization::Generated);
        assert_eq!(decoded.entities(), chunk.entities());
        assert!(!decoded.is_dirty());
    }

    #[test]
    fn test_unsupported_finalization_stays_unsupported() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        let mut sub = SubChunk::new_air(0);
        sub.finalization = Finalization::Unsupported;
        chunk.insert_sub_chunk(sub).unwrap();
        let bytes = encode_chunk(&chunk).unwrap();
        let decoded = decode_chunk(ChunkPos::new(0, 0), &bytes).unwrap();
        assert_eq!(decoded.sub_chunk(0).unwrap().finalization, Finalization::Unsupported);
    }

    #[test]
    fn test_peek_finalizations() {
        let bytes = encode_chunk(&sample_chunk()).unwrap();
        let states = peek_finalizations(&bytes).unwrap();
        assert_eq!(
            states,
            vec![(0, Finalization::NotGenerated), (2, Finalization::Generated)]
        );
    }

    #[test]
    fn test_invalid_magic() {
        assert!(matches!(
            decode_chunk(ChunkPos::new(0, 0), b"NOPE\x01"),
            Err(CodecError::InvalidMagic)
        ));
        assert!(matches!(
            decode_chunk(ChunkPos::new(0, 0), b"ST"),
            Err(CodecError::InvalidMagic)
        ));
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = encode_chunk(&Chunk::new(ChunkPos::new(0, 0))).unwrap();
        bytes[4] = 9;
        assert!(matches!(
            decode_chunk(ChunkPos::new(0, 0), &bytes),
            Err(CodecError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_truncated_payload() {
        let bytes = encode_chunk(&sample_chunk()).unwrap();
        let cut = &bytes[..bytes.len() / 2];
        assert!(matches!(
            decode_chunk(ChunkPos::new(-2, 9), cut),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_position_mismatch() {
        let bytes = encode_chunk(&Chunk::new(ChunkPos::new(1, 1))).unwrap();
        assert!(matches!(
            decode_chunk(ChunkPos::new(1, 2), &bytes),
            Err(CodecError::PositionMismatch { .. })
        ));
    }

    #[test]
    fn test_too_many_layers_rejected() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        let mut sub = SubChunk::new_air(0);
        for _ in 0..u8::MAX {
            sub.push_storage(BlockStorage::filled(BlockState::air()));
        }
        assert_eq!(sub.storages().len(), 256);
        chunk.insert_sub_chunk(sub).unwrap();
        assert!(matches!(
            encode_chunk(&chunk),
            Err(CodecError::TooLarge {
                field: "layer count",
                len: 256
            })
        ));
    }

    #[test]
    fn test_oversized_block_name_rejected() {
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        let name = "x".repeat(usize::from(u16::MAX) + 1);
        chunk.set_block(0, 0, 0, BlockState::new(name)).unwrap();
        assert!(matches!(
            encode_chunk(&chunk),
            Err(CodecError::TooLarge {
                field: "string length",
                len: 65536
            })
        ));

        let mut fits = Chunk::new(ChunkPos::new(0, 0));
        let name = "x".repeat(usize::from(u16::MAX));
        fits.set_block(0, 0, 0, BlockState::new(name.clone())).unwrap();
        let decoded = decode_chunk(ChunkPos::new(0, 0), &encode_chunk(&fits).unwrap()).unwrap();
        assert_eq!(decoded.get_block(0, 0, 0).unwrap().name(), name);
    }
}
