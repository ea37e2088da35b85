//! # Stratum
//!
//! A paged, chunked voxel world with background mesh extraction.
//!
//! ## Design Principles
//!
//! 1. **Bounded memory**: chunks are generated on demand and evicted under pressure
//! 2. **Eventually consistent meshes**: every write is reflected by a later mesh of its region
//! 3. **Total queries**: reads, picks and raycasts never fail, misses are sentinels
//! 4. **Owned state**: no globals, the world owns store, volume, scheduler and pathfinder
//!
//! ## Core Components
//!
//! - `World`: lifecycle, voxel writes, queries, extraction control
//! - `AStarPathfinder`: weighted A* over the voxel grid
//! - `pick_voxel` / `raycast_with_direction`: voxel traversal along a ray
//! - `WorldConfig`: flat TOML configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use stratum::{Vec3, Voxel, VoxelType, World, WorldConfig, WorldPos};
//!
//! let world = World::from_config(WorldConfig::default())?;
//! world.set_seed(1234);
//!
//! world.set_voxel(WorldPos::new(4, 60, 4), Voxel::of(VoxelType::Wood))?;
//! let hit = world.pick_voxel(Vec3::new(4.5, 80.0, 4.5), Vec3::new(0.0, -40.0, 0.0));
//! assert!(hit.did_hit());
//!
//! for mesh in world.drain_extracted() {
//!     println!("{} triangles at {}", mesh.opaque().triangle_count(), mesh.origin);
//! }
//! world.shutdown();
//! # Ok::<(), stratum::WorldError>(())
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod pathfinder;
pub mod pick;
pub mod world;

pub use config::WorldConfig;
pub use error::{PathError, WorldError, WorldResult};
pub use pathfinder::{AStarPathfinder, Connectivity, PathfindingConfig};
pub use pick::{pick_voxel, raycast_with_direction, PickResult, RaycastResult};
pub use world::{World, WorldStats};

pub use stratum_meshing::{
    ChunkMeshes, CubicSurfaceExtractor, ExtractedMeshResult, ExtractionConfig, Mesh,
    SurfaceExtractor, Vertex,
};
pub use stratum_volume::{
    ChunkGenerator, ChunkPersistence, FileChunkPersistence, FlatGenerator, MemoryChunkPersistence,
    Region, Sampler, TerrainGenerator, Vec3, Voxel, VoxelType, WorldContext, WorldPos,
};
