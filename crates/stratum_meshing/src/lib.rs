//! # Stratum Meshing
//!
//! Background surface extraction for the paged voxel volume.
//!
//! ## Design Principles
//!
//! 1. **Deduplicated**: a region is queued at most once, however often it is requested
//! 2. **Eventually consistent**: a write during extraction earns exactly one more pass
//! 3. **Bounded**: finished meshes wait in a bounded queue; workers block when it is full
//! 4. **Cancellable**: shutdown wakes every blocked worker
//!
//! ## Core Components
//!
//! - `CubicSurfaceExtractor`: one quad per visible face, opaque and water surfaces
//! - `ExtractionScheduler`: region state machine plus worker pool
//! - `Mesh`: indexed triangle mesh with a world offset
//! - `CancellationToken`: cooperative shutdown signal for channel waits
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stratum_meshing::{CubicSurfaceExtractor, ExtractionScheduler, SchedulerConfig};
//!
//! let extractor = Arc::new(CubicSurfaceExtractor::new());
//! let scheduler = ExtractionScheduler::new(volume, extractor, SchedulerConfig::default())?;
//! scheduler.schedule(WorldPos::new(10, 40, 10));
//! while let Some(result) = scheduler.pop_extracted() {
//!     upload(result.origin, result.opaque());
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod cancel;
pub mod cubic;
pub mod error;
pub mod mesh;
pub mod scheduler;

pub use cancel::CancellationToken;
pub use cubic::{
    CubicSurfaceExtractor, Face, OpaqueQuads, QuadPredicate, QuadRules, SurfaceExtractor,
    WaterQuads,
};
pub use error::{ExtractionError, SchedulerError};
pub use mesh::{ChunkMeshes, ExtractedMeshResult, IndexType, Mesh, Vertex};
pub use scheduler::{
    default_worker_count, ExtractionConfig, ExtractionScheduler, RegionState, SchedulerConfig,
    SchedulerStats, MAX_MESH_DIMENSION,
};
