//! Generation collaborators invoked when a chunk has no persisted data.
//!
//! Deciding what a world looks like is left to implementors of
//! [`ChunkGenerator`]. The two generators here fill chunks with flat layers
//! or nothing at all.

use crate::block_state::BlockState;
use crate::chunk::{Chunk, ChunkColumn, ChunkPos};
use crate::error::GenerateError;

/// Produces a fresh chunk for a position.
///
/// Returned chunks keep their subchunks at `NotGenerated`; later
/// generation stages advance them.
pub trait ChunkGenerator: Send + Sync {
    /// Builds the chunk at `pos`.
    fn generate(&self, pos: ChunkPos) -> Result<Chunk, GenerateError>;
}

impl<F> ChunkGenerator for F
where
    F: Fn(ChunkPos) -> Result<Chunk, GenerateError> + Send + Sync,
{
    fn generate(&self, pos: ChunkPos) -> Result<Chunk, GenerateError> {
        self(pos)
    }
}

/// Generates empty chunks with zeroed grids.
#[derive(Clone, Copy, Debug, Default)]
pub struct VoidGenerator;

impl ChunkGenerator for VoidGenerator {
    fn generate(&self, pos: ChunkPos) -> Result<Chunk, GenerateError> {
        Ok(Chunk::new(pos))
    }
}

/// One horizontal layer of a flat world.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlatLayer {
    /// Block filling the layer.
    pub block: BlockState,
    /// Thickness in blocks.
    pub thickness: u32,
}

/// Generates superflat chunks from a bottom-up list of layers.
#[derive(Clone, Debug)]
pub struct FlatGenerator {
    layers: Vec<FlatLayer>,
    biome: u8,
}

/// Highest world Y a chunk can address.
const MAX_WORLD_Y: u32 = 256 * 16;

impl FlatGenerator {
    /// Creates a generator from layers listed bottom first.
    pub fn new(layers: Vec<FlatLayer>, biome: u8) -> Result<Self, GenerateError> {
        let total = layers
            .iter()
            .try_fold(0u32, |acc, l| acc.checked_add(l.thickness))
            .ok_or_else(|| GenerateError("flat layer thicknesses overflow".into()))?;
        if total > MAX_WORLD_Y {
            return Err(GenerateError(format!(
                "flat layers are {total} blocks tall, limit is {MAX_WORLD_Y}"
            )));
        }
        Ok(Self { layers, biome })
    }

    /// The classic bedrock, two dirt, grass preset in plains.
    pub fn classic() -> Self {
        let layer = |name: &str, thickness| FlatLayer {
            block: BlockState::new(name),
            thickness,
        };
        Self {
            layers: vec![
                layer("minecraft:bedrock", 1),
                layer("minecraft:dirt", 2),
                layer("minecraft:grass", 1),
            ],
            biome: 1,
        }
    }

    /// Layers, bottom first.
    pub fn layers(&self) -> &[FlatLayer] {
        &self.layers
    }

    /// Total height of all layers.
    pub fn surface_height(&self) -> u32 {
        self.layers.iter().map(|l| l.thickness).sum()
    }
}

impl ChunkGenerator for FlatGenerator {
    fn generate(&self, pos: ChunkPos) -> Result<Chunk, GenerateError> {
        let mut chunk = Chunk::new(pos);
        let mut y = 0i32;
        for layer in &self.layers {
            if layer.block.is_air() {
                y += layer.thickness as i32;
                continue;
            }
            for _ in 0..layer.thickness {
                for z in 0..16 {
                    for x in 0..16 {
                        chunk
                            .set_block(x, y, z, layer.block.clone())
                            .map_err(|e| GenerateError(e.to_string()))?;
                    }
                }
                y += 1;
            }
        }

        for z in 0..16 {
            for x in 0..16 {
                chunk
                    .set_biome(x, z, self.biome)
                    .map_err(|e| GenerateError(e.to_string()))?;
            }
        }
        chunk
            .recalculate_height_map()
            .map_err(|e| GenerateError(e.to_string()))?;
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sub_chunk::Finalization;

    #[test]
    fn test_classic_flat_layers() {
        let generator = FlatGenerator::classic();
        let chunk = generator.generate(ChunkPos::new(4, -4)).unwrap();
        assert_eq!(chunk.pos(), ChunkPos::new(4, -4));
        assert_eq!(chunk.get_block(0, 0, 0).unwrap().name(), "minecraft:bedrock");
        assert_eq!(chunk.get_block(7, 2, 9).unwrap().name(), "minecraft:dirt");
        assert_eq!(chunk.get_block(15, 3, 15).unwrap().name(), "minecraft:grass");
        assert!(chunk.get_block(0, 4, 0).unwrap().is_air());
        assert_eq!(chunk.height(5, 5).unwrap(), 4);
        assert_eq!(chunk.biome(5, 5).unwrap(), 1);
        assert!(
            chunk
                .sub_chunks()
                .all(|s| s.finalization == Finalization::NotGenerated)
        );
    }

    #[test]
    fn test_air_layers_leave_gaps() {
        let generator = FlatGenerator::new(
            vec![
                FlatLayer {
                    block: BlockState::new("minecraft:stone"),
                    thickness: 1,
                },
                FlatLayer {
                    block: BlockState::air(),
                    thickness: 20,
                },
                FlatLayer {
                    block: BlockState::new("minecraft:glass"),
                    thickness: 1,
                },
            ],
            0,
        )
        .unwrap();
        let chunk = generator.generate(ChunkPos::new(0, 0)).unwrap();
        assert_eq!(chunk.get_block(0, 21, 0).unwrap().name(), "minecraft:glass");
        assert!(chunk.get_block(0, 10, 0).unwrap().is_air());
        assert_eq!(chunk.height(0, 0).unwrap(), 22);
    }

    #[test]
    fn test_too_tall_rejected() {
        let result = FlatGenerator::new(
            vec![FlatLayer {
                block: BlockState::new("minecraft:stone"),
                thickness: 5000,
            }],
            0,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_overflowing_thickness_rejected() {
        let layer = FlatLayer {
            block: BlockState::new("minecraft:stone"),
            thickness: u32::MAX,
        };
        let result = FlatGenerator::new(vec![layer.clone(), layer], 0);
        assert!(matches!(result, Err(GenerateError(msg)) if msg.contains("overflow")));

        let wraps_to_small = vec![
            FlatLayer {
                block: BlockState::new("minecraft:stone"),
                thickness: u32::MAX,
            },
            FlatLayer {
                block: BlockState::new("minecraft:dirt"),
                thickness: 2,
            },
        ];
        assert!(FlatGenerator::new(wraps_to_small, 0).is_err());
    }

    #[test]
    fn test_void_generator_is_empty() {
        let chunk = VoidGenerator.generate(ChunkPos::new(1, 1)).unwrap();
        assert_eq!(chunk.sub_chunks().count(), 0);
        assert_eq!(chunk.height_map().len(), 256);
    }

    #[test]
    fn test_closure_generator() {
        let generator = |pos: ChunkPos| -> Result<Chunk, GenerateError> { Ok(Chunk::new(pos)) };
        assert_eq!(generator.generate(ChunkPos::new(2, 3)).unwrap().pos(), ChunkPos::new(2, 3));
    }
}
