//! # Generation Collaborator
//!
//! The store calls a [`ChunkGenerator`] for every chunk that is neither
//! resident nor persisted. Generators must be safe to call concurrently for
//! different coordinates; the store guarantees a coordinate is never
//! generated twice at the same time.
//!
//! Two generators ship with the crate:
//! - [`TerrainGenerator`]: heightmap terrain from octaved simplex noise.
//! - [`FlatGenerator`]: a solid slab below a fixed height.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::chunk::Chunk;
use crate::context::WorldContext;
use crate::error::GenerationError;
use crate::noise::{derive_seed, SimplexNoise};
use crate::voxel::{Voxel, VoxelType};

/// Everything a generator needs besides the chunk coordinate.
#[derive(Clone, Debug)]
pub struct GenerationParams {
    /// World seed.
    pub seed: u64,
    /// Horizontal offset applied to noise lookups, derived from the seed.
    pub noise_offset: [f64; 2],
    /// Immutable generation parameters.
    pub context: Arc<WorldContext>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            seed: 0,
            noise_offset: [0.0; 2],
            context: Arc::new(WorldContext::default()),
        }
    }
}

/// Produces chunk payloads on demand.
pub trait ChunkGenerator: Send + Sync {
    /// Checks that the generator can work with `context`.
    ///
    /// Called once when the world initializes.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Bootstrap` if the context is unusable.
    fn bootstrap(&self, context: &WorldContext) -> Result<(), GenerationError> {
        let _ = context;
        Ok(())
    }

    /// Fills `chunk` (all air, coordinate already set).
    ///
    /// Generators write through [`Chunk::fill`] so the result starts clean.
    ///
    /// # Errors
    ///
    /// Returns `GenerationError::Failed` if the chunk cannot be produced. The
    /// store leaves the coordinate absent and retries on the next access.
    fn generate(&self, chunk: &mut Chunk, params: &GenerationParams) -> Result<(), GenerationError>;
}

/// Solid slab: every voxel with `y < height` is `material`.
#[derive(Clone, Copy, Debug)]
pub struct FlatGenerator {
    height: i32,
    material: VoxelType,
}

impl FlatGenerator {
    /// Creates a flat generator.
    #[must_use]
    pub const fn new(height: i32, material: VoxelType) -> Self {
        Self { height, material }
    }

    /// A generator that produces nothing but air.
    #[must_use]
    pub const fn empty() -> Self {
        Self::new(i32::MIN, VoxelType::Air)
    }
}

impl ChunkGenerator for FlatGenerator {
    fn generate(
        &self,
        chunk: &mut Chunk,
        _params: &GenerationParams,
    ) -> Result<(), GenerationError> {
        let origin = chunk.origin();
        let side = chunk.side();
        if origin.y >= self.height || self.material.is_air() {
            return Ok(());
        }
        let voxel = Voxel::of(self.material);
        for y in 0..side {
            if origin.y + y as i32 >= self.height {
                break;
            }
            for z in 0..side {
                for x in 0..side {
                    chunk.fill(x, y, z, voxel);
                }
            }
        }
        Ok(())
    }
}

struct TerrainNoise {
    seed: u64,
    landscape: SimplexNoise,
    mountains: SimplexNoise,
}

impl TerrainNoise {
    fn new(seed: u64) -> Self {
        Self {
            seed,
            landscape: SimplexNoise::new(derive_seed(seed, 1)),
            mountains: SimplexNoise::new(derive_seed(seed, 2)),
        }
    }
}

/// Heightmap terrain: rock, a dirt layer, grass or sand on top, water up to
/// the context's water height.
pub struct TerrainGenerator {
    /// Noise tables for the most recent seed.
    noise: RwLock<Arc<TerrainNoise>>,
}

impl Default for TerrainGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TerrainGenerator {
    /// Creates the generator; noise tables are built lazily per seed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            noise: RwLock::new(Arc::new(TerrainNoise::new(0))),
        }
    }

    fn noise_for(&self, seed: u64) -> Arc<TerrainNoise> {
        {
            let current = self.noise.read();
            if current.seed == seed {
                return Arc::clone(&current);
            }
        }
        let mut current = self.noise.write();
        if current.seed != seed {
            *current = Arc::new(TerrainNoise::new(seed));
        }
        Arc::clone(&current)
    }

    /// Surface height of the column at world `(x, z)`.
    #[must_use]
    pub fn column_height(&self, x: i32, z: i32, params: &GenerationParams) -> i32 {
        let noise = self.noise_for(params.seed);
        Self::height_with(&noise, x, z, params)
    }

    fn height_with(noise: &TerrainNoise, x: i32, z: i32, params: &GenerationParams) -> i32 {
        let ctx = &params.context;
        let fx = f64::from(x) + params.noise_offset[0];
        let fz = f64::from(z) + params.noise_offset[1];

        let land = noise.landscape.fbm(
            fx * ctx.landscape_frequency,
            fz * ctx.landscape_frequency,
            ctx.landscape_octaves,
            ctx.landscape_persistence,
            ctx.landscape_lacunarity,
        );
        let mountain = noise
            .mountains
            .fbm(
                fx * ctx.mountain_frequency,
                fz * ctx.mountain_frequency,
                ctx.mountain_octaves.max(1),
                0.5,
                2.0,
            )
            .max(0.0);

        let height = f64::from(ctx.base_height)
            + land * ctx.landscape_amplitude
            + mountain * mountain * ctx.mountain_amplitude;
        height.round() as i32
    }

    fn material_at(y: i32, surface: i32, ctx: &WorldContext) -> VoxelType {
        let beach = surface <= ctx.water_height + 1;
        if y > surface {
            if y <= ctx.water_height {
                VoxelType::Water
            } else {
                VoxelType::Air
            }
        } else if y == surface {
            if beach {
                VoxelType::Sand
            } else {
                VoxelType::Grass
            }
        } else if y >= surface - ctx.dirt_depth as i32 {
            if beach {
                VoxelType::Sand
            } else {
                VoxelType::Dirt
            }
        } else {
            VoxelType::Rock
        }
    }
}

impl ChunkGenerator for TerrainGenerator {
    fn bootstrap(&self, context: &WorldContext) -> Result<(), GenerationError> {
        context
            .validate()
            .map_err(|e| GenerationError::Bootstrap(e.to_string()))
    }

    fn generate(
        &self,
        chunk: &mut Chunk,
        params: &GenerationParams,
    ) -> Result<(), GenerationError> {
        let noise = self.noise_for(params.seed);
        let ctx = &params.context;
        let origin = chunk.origin();
        let side = chunk.side();

        for z in 0..side {
            for x in 0..side {
                let (wx, wz) = (origin.x + x as i32, origin.z + z as i32);
                let surface = Self::height_with(&noise, wx, wz, params);
                for y in 0..side {
                    let material = Self::material_at(origin.y + y as i32, surface, ctx);
                    if !material.is_air() {
                        chunk.fill(x, y, z, Voxel::of(material));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkCoord;

    #[test]
    fn test_flat_generator_fills_below_height() {
        let generator = FlatGenerator::new(4, VoxelType::Rock);
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0, 0), 3);
        generator.generate(&mut chunk, &GenerationParams::default()).unwrap();
        assert_eq!(chunk.get(0, 3, 0).material(), VoxelType::Rock);
        assert!(chunk.get(0, 4, 0).is_air());
        assert_eq!(chunk.solid_count(), 8 * 8 * 4);
        assert!(!chunk.is_dirty());
    }

    #[test]
    fn test_flat_generator_below_origin_chunk_is_solid() {
        let generator = FlatGenerator::new(0, VoxelType::Dirt);
        let mut chunk = Chunk::new(ChunkCoord::new(0, -1, 0), 3);
        generator.generate(&mut chunk, &GenerationParams::default()).unwrap();
        assert_eq!(chunk.solid_count(), 512);
    }

    #[test]
    fn test_terrain_deterministic() {
        let a = TerrainGenerator::new();
        let b = TerrainGenerator::new();
        let params = GenerationParams {
            seed: 42,
            ..GenerationParams::default()
        };
        let coord = ChunkCoord::new(3, 1, -2);
        let mut ca = Chunk::new(coord, 4);
        let mut cb = Chunk::new(coord, 4);
        a.generate(&mut ca, &params).unwrap();
        b.generate(&mut cb, &params).unwrap();
        assert_eq!(ca.to_compressed(), cb.to_compressed());
    }

    #[test]
    fn test_terrain_layers() {
        let generator = TerrainGenerator::new();
        let params = GenerationParams::default();
        let surface = generator.column_height(0, 0, &params);
        let ctx = WorldContext::default();
        assert_eq!(TerrainGenerator::material_at(surface - 10, surface, &ctx), VoxelType::Rock);
        assert!(TerrainGenerator::material_at(surface + 100, surface, &ctx).is_air());
        assert_eq!(
            TerrainGenerator::material_at(ctx.water_height, ctx.water_height - 5, &ctx),
            VoxelType::Water
        );
    }

    #[test]
    fn test_bootstrap_rejects_bad_context() {
        let ctx = WorldContext {
            landscape_octaves: 0,
            ..WorldContext::default()
        };
        assert!(matches!(
            TerrainGenerator::new().bootstrap(&ctx),
            Err(GenerationError::Bootstrap(_))
        ));
    }

    #[test]
    fn test_noise_offset_changes_terrain() {
        let generator = TerrainGenerator::new();
        let base = GenerationParams::default();
        let shifted = GenerationParams {
            noise_offset: [5000.0, -3000.0],
            ..GenerationParams::default()
        };
        let differs = (0..64).any(|i| {
            let (x, z) = (i * 7, i * 3);
            generator.column_height(x, z, &base) != generator.column_height(x, z, &shifted)
        });
        assert!(differs);
    }
}
