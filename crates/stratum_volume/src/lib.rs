//! # Stratum Volume
//!
//! Paged storage for an effectively unbounded voxel world.
//!
//! ## Design Principles
//!
//! 1. **Bounded**: resident chunks never exceed the memory budget, except
//!    for chunks pinned by live handles
//! 2. **Lazy**: chunks are loaded or generated on first access
//! 3. **Single flight**: one generation per coordinate, however many
//!    threads ask for it
//! 4. **Total reads**: absent data reads as air
//!
//! ## Core Components
//!
//! - `ChunkStore`: paging, creation gates, LRU eviction, flushing
//! - `VoxelVolume`: world-coordinate reads and writes, floor search
//! - `Sampler`: chunk-caching cursor for raycasts and pathfinding
//! - `ChunkGenerator`: generation collaborator (`TerrainGenerator`, `FlatGenerator`)
//! - `ChunkPersistence`: persistence collaborator (files or memory)
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use stratum_volume::{
//!     ChunkStore, FlatGenerator, Voxel, VoxelType, VoxelVolume, WorldContext, WorldPos,
//! };
//!
//! let generator = Arc::new(FlatGenerator::new(8, VoxelType::Rock));
//! let store = ChunkStore::new(4, 8 << 20, WorldContext::default(), generator);
//! let volume = VoxelVolume::new(Arc::new(store)).with_height(128);
//!
//! let pos = WorldPos::new(-3, 20, 7);
//! volume.set_voxel(pos, Voxel::of(VoxelType::Wood)).unwrap();
//! assert_eq!(volume.material(pos), VoxelType::Wood);
//! assert!(volume.voxel_at(WorldPos::new(0, 500, 0)).is_air());
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod chunk;
pub mod context;
pub mod error;
pub mod generator;
pub mod math;
pub mod noise;
pub mod persistence;
pub mod region;
pub mod store;
pub mod voxel;
pub mod volume;

pub use chunk::{side_shift, Chunk, ChunkCoord, MAX_CHUNK_SHIFT};
pub use context::WorldContext;
pub use error::{ContextError, GenerationError, PersistenceError, VolumeError, VolumeResult};
pub use generator::{ChunkGenerator, FlatGenerator, GenerationParams, TerrainGenerator};
pub use math::{Vec3, WorldPos};
pub use noise::SimplexNoise;
pub use persistence::{ChunkPersistence, FileChunkPersistence, MemoryChunkPersistence};
pub use region::Region;
pub use store::{ChunkHandle, ChunkStore, StoreStats};
pub use voxel::{Voxel, VoxelType};
pub use volume::{Sampler, VoxelVolume};
