//! # World
//!
//! The facade over paging, extraction and queries.
//!
//! A `World` is created uninitialized from a [`WorldConfig`] and a set of
//! collaborators (generator, surface extractor, optional persistence).
//! [`World::init`] builds the chunk store, the volume and the extraction
//! worker pool; [`World::shutdown`] tears them down again. Every method
//! takes `&self`, so one world can be shared between a game thread writing
//! voxels and a render thread draining meshes.
//!
//! ## Lifecycle
//!
//! ```text
//!   new ──init──► running ──reset──► paused ──resume──► running
//!                    │                  │
//!                    └────shutdown──────┴──► uninitialized (init again)
//! ```
//!
//! Queries on an uninitialized world are total: reads give air, picks miss,
//! scheduling is refused.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use stratum_meshing::{
    CubicSurfaceExtractor, ExtractedMeshResult, ExtractionScheduler, RegionState, SurfaceExtractor,
};
use stratum_volume::{
    side_shift, ChunkGenerator, ChunkPersistence, ChunkStore, FileChunkPersistence, Region, Sampler,
    StoreStats, TerrainGenerator, Vec3, Voxel, VoxelType, VoxelVolume, WorldContext, WorldPos,
};
use tracing::{debug, error, info, warn};

use crate::config::WorldConfig;
use crate::error::{PathError, WorldError, WorldResult};
use crate::pathfinder::AStarPathfinder;
use crate::pick::{pick_voxel, raycast_with_direction, PickResult, RaycastResult};

/// Half extent of the column range `random_pos` uses before anything is paged.
const RANDOM_POS_FALLBACK_EXTENT: i32 = 100;

/// Range of the generator noise offset on each horizontal axis.
const NOISE_OFFSET_RANGE: f64 = 10_000.0;

/// Counters for diagnostics overlays. Never waits on workers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorldStats {
    /// Finished meshes waiting to be drained.
    pub mesh_count: usize,
    /// Regions tracked by the scheduler: pending, in flight or extracted.
    pub extracted_pending_count: usize,
    /// Regions waiting for a worker.
    pub queued_extraction_count: usize,
    /// Regions being extracted right now.
    pub in_flight_count: usize,
    /// Resident chunks.
    pub chunk_count: usize,
}

struct WorldRandom {
    seed: u64,
    rng: ChaCha8Rng,
    noise_offset: [f64; 2],
}

impl WorldRandom {
    fn new(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let noise_offset = [
            rng.gen_range(-NOISE_OFFSET_RANGE..NOISE_OFFSET_RANGE),
            rng.gen_range(-NOISE_OFFSET_RANGE..NOISE_OFFSET_RANGE),
        ];
        Self {
            seed,
            rng,
            noise_offset,
        }
    }
}

struct Runtime {
    context: WorldContext,
    store: Arc<ChunkStore>,
    volume: VoxelVolume,
    scheduler: ExtractionScheduler,
    pathfinder: AStarPathfinder,
}

/// Paged voxel world with background mesh extraction.
pub struct World {
    config: WorldConfig,
    generator: Arc<dyn ChunkGenerator>,
    extractor: Arc<dyn SurfaceExtractor>,
    persistence: Option<Arc<dyn ChunkPersistence>>,
    /// Held only long enough to clone the `Arc`, never across a call into
    /// the runtime. Lock order: `runtime` before `random`.
    runtime: RwLock<Option<Arc<Runtime>>>,
    random: Mutex<WorldRandom>,
}

impl World {
    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    /// Creates an uninitialized world with the terrain generator and the
    /// cubic extractor.
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        let random = WorldRandom::new(config.seed);
        Self {
            config,
            generator: Arc::new(TerrainGenerator::new()),
            extractor: Arc::new(CubicSurfaceExtractor::new()),
            persistence: None,
            runtime: RwLock::new(None),
            random: Mutex::new(random),
        }
    }

    /// Creates a world and initializes it from its configuration.
    ///
    /// # Errors
    ///
    /// See [`World::init`].
    pub fn from_config(config: WorldConfig) -> WorldResult<Self> {
        let world = Self::new(config);
        world.init_from_config()?;
        Ok(world)
    }

    /// Replaces the generation collaborator. Takes effect at the next `init`.
    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn ChunkGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Replaces the surface extraction collaborator. Takes effect at the
    /// next `init`.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Arc<dyn SurfaceExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Sets the persistence collaborator. Overrides `persistence_dir`.
    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn ChunkPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Builds the store, the volume and the worker pool.
    ///
    /// `memory_budget` and `chunk_side` override the configured values.
    ///
    /// # Errors
    ///
    /// - `WorldError::AlreadyInitialized` if the world is running
    /// - `WorldError::Config` / `WorldError::Context` for invalid values
    /// - `WorldError::Generation` if the generator rejects the context
    /// - `WorldError::PersistenceDir` if the chunk directory cannot be opened
    /// - `WorldError::Scheduler` if the worker pool cannot be started
    pub fn init(
        &self,
        context: WorldContext,
        memory_budget: usize,
        chunk_side: u32,
    ) -> WorldResult<()> {
        let mut runtime = self.runtime.write();
        if runtime.is_some() {
            return Err(WorldError::AlreadyInitialized);
        }

        let config = WorldConfig {
            memory_budget_bytes: memory_budget,
            chunk_side_length: chunk_side,
            context: context.clone(),
            ..self.config.clone()
        };
        if let Err(e) = config.validate() {
            error!(error = %e, "invalid world configuration");
            return Err(e);
        }
        let Some(shift) = side_shift(chunk_side) else {
            return Err(WorldError::Config {
                field: "chunk_side_length",
                reason: format!("{chunk_side} is not a power of two"),
            });
        };

        if let Err(e) = self.generator.bootstrap(&context) {
            error!(error = %e, "failed to bootstrap the world generator");
            return Err(e.into());
        }

        let generator = Arc::clone(&self.generator);
        let mut store = ChunkStore::new(shift, memory_budget, context.clone(), generator);
        if let Some(persistence) = self.open_persistence(&config)? {
            store = store.with_persistence(persistence);
        }
        {
            let random = self.random.lock();
            store.set_seed(random.seed, random.noise_offset);
        }
        let store = Arc::new(store);
        let volume = VoxelVolume::new(Arc::clone(&store)).with_height(config.max_height);

        let extractor = Arc::clone(&self.extractor);
        let scheduler_config = config.scheduler_config();
        let scheduler = ExtractionScheduler::new(volume.clone(), extractor, scheduler_config)
            .map_err(|e| {
                error!(error = %e, "failed to start mesh extraction");
                WorldError::from(e)
            })?;

        info!(
            chunk_side,
            memory_budget,
            workers = scheduler.config().workers,
            "world initialized"
        );
        *runtime = Some(Arc::new(Runtime {
            context,
            store,
            volume,
            scheduler,
            pathfinder: AStarPathfinder::new(config.pathfinding),
        }));
        Ok(())
    }

    /// [`init`](Self::init) with the configured context, budget and side.
    ///
    /// # Errors
    ///
    /// See [`World::init`].
    pub fn init_from_config(&self) -> WorldResult<()> {
        self.init(
            self.config.context.clone(),
            self.config.memory_budget_bytes,
            self.config.chunk_side_length,
        )
    }

    fn open_persistence(
        &self,
        config: &WorldConfig,
    ) -> WorldResult<Option<Arc<dyn ChunkPersistence>>> {
        if let Some(persistence) = &self.persistence {
            return Ok(Some(Arc::clone(persistence)));
        }
        let Some(dir) = &config.persistence_dir else {
            return Ok(None);
        };
        let files = FileChunkPersistence::new(dir).map_err(|source| {
            error!(dir = %dir.display(), error = %source, "cannot open chunk directory");
            WorldError::PersistenceDir {
                path: dir.clone(),
                source,
            }
        })?;
        Ok(Some(Arc::new(files)))
    }

    fn running(&self) -> Option<Arc<Runtime>> {
        self.runtime.read().clone()
    }

    /// True between `init` and `shutdown`.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.runtime.read().is_some()
    }

    /// Stops workers, saves dirty chunks, drops the store and resets the
    /// context. Safe to call in any state and more than once.
    ///
    /// Calls already running on other threads finish against the old
    /// runtime; calls made after this returns see an uninitialized world.
    pub fn shutdown(&self) {
        let Some(runtime) = self.runtime.write().take() else {
            return;
        };

        runtime.scheduler.shutdown();
        match runtime.store.flush() {
            Ok(0) => {}
            Ok(saved) => debug!(saved, "dirty chunks saved"),
            Err(e) => warn!(error = %e, "saving dirty chunks at shutdown failed"),
        }
        drop(runtime);
        info!("world shut down");
    }

    /// Stops the current extraction session.
    ///
    /// Queued work and undrained meshes are dropped and scheduling is
    /// refused until [`resume`](Self::resume). The store and the worker
    /// threads stay alive.
    pub fn reset(&self) {
        if let Some(runtime) = self.running() {
            runtime.scheduler.reset();
        }
    }

    /// True after `reset`, and whenever the world is not running.
    #[must_use]
    pub fn is_reset(&self) -> bool {
        self.running()
            .map_or(true, |runtime| runtime.scheduler.is_paused())
    }

    /// Starts a new extraction session after `reset`. False if the world is
    /// not running.
    pub fn resume(&self) -> bool {
        self.running()
            .is_some_and(|runtime| runtime.scheduler.resume())
    }

    // =========================================================================
    // SEED AND CONTEXT
    // =========================================================================

    /// Reseeds the world random source and the generator noise offset.
    ///
    /// Chunks already paged keep their content; only chunks generated
    /// after this call use the new seed.
    pub fn set_seed(&self, seed: u64) {
        info!(seed, "world seed changed");
        let noise_offset = {
            let mut random = self.random.lock();
            *random = WorldRandom::new(seed);
            random.noise_offset
        };
        if let Some(runtime) = self.running() {
            runtime.store.set_seed(seed, noise_offset);
        }
    }

    /// Current seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.random.lock().seed
    }

    /// Generation parameters of the running world, the default when not
    /// running.
    #[must_use]
    pub fn context(&self) -> WorldContext {
        self.running()
            .map(|runtime| runtime.context.clone())
            .unwrap_or_default()
    }

    /// Configuration the world was created with.
    #[must_use]
    pub const fn config(&self) -> &WorldConfig {
        &self.config
    }

    // =========================================================================
    // VOXELS
    // =========================================================================

    /// Writes a voxel and schedules its mesh region for re-extraction.
    ///
    /// Neighbouring regions whose faces or occlusion depend on the voxel
    /// are re-extracted too if they already have a mesh.
    ///
    /// # Errors
    ///
    /// `WorldError::NotInitialized`, or the volume error for out-of-bounds
    /// positions and chunks that cannot be generated.
    pub fn set_voxel(&self, pos: WorldPos, voxel: Voxel) -> WorldResult<()> {
        let runtime = self.running().ok_or(WorldError::NotInitialized)?;
        runtime.volume.set_voxel(pos, voxel)?;

        let scheduler = &runtime.scheduler;
        let own = scheduler.region_origin(pos);
        scheduler.allow_reextraction(own);
        scheduler.schedule(own);

        let mut neighbours: Vec<WorldPos> = Vec::with_capacity(8);
        for dz in -1..=1 {
            for dy in -1..=1 {
                for dx in -1..=1 {
                    let origin = scheduler.region_origin(pos.offset(dx, dy, dz));
                    if origin != own && !neighbours.contains(&origin) {
                        neighbours.push(origin);
                    }
                }
            }
        }
        for origin in neighbours {
            let in_flight = scheduler.region_state(origin) == RegionState::InFlight;
            if scheduler.allow_reextraction(origin) || in_flight {
                scheduler.schedule(origin);
            }
        }
        Ok(())
    }

    /// Voxel at a position. Air outside the world or when not running.
    #[must_use]
    pub fn voxel_at(&self, pos: WorldPos) -> Voxel {
        self.running()
            .map_or(Voxel::AIR, |runtime| runtime.volume.voxel_at(pos))
    }

    /// Material at a position.
    #[must_use]
    pub fn material(&self, pos: WorldPos) -> VoxelType {
        self.voxel_at(pos).material()
    }

    /// Y just above the first voxel from the top of column `(x, z)` whose
    /// material satisfies `accept`.
    #[must_use]
    pub fn find_floor(&self, x: i32, z: i32, accept: impl Fn(VoxelType) -> bool) -> Option<i32> {
        self.running()
            .and_then(|runtime| runtime.volume.find_floor(x, z, accept))
    }

    /// A standable position in a random column of the paged area, or within
    /// ±100 of the origin when nothing is paged.
    #[must_use]
    pub fn random_pos(&self) -> Option<WorldPos> {
        let runtime = self.running()?;
        let (lower, upper) = runtime.volume.enclosing_region().map_or(
            (
                WorldPos::new(-RANDOM_POS_FALLBACK_EXTENT, 0, -RANDOM_POS_FALLBACK_EXTENT),
                WorldPos::new(RANDOM_POS_FALLBACK_EXTENT, 0, RANDOM_POS_FALLBACK_EXTENT),
            ),
            |region| (region.lower(), region.upper()),
        );
        let (x, z) = {
            let mut random = self.random.lock();
            (
                random.rng.gen_range(lower.x..=upper.x),
                random.rng.gen_range(lower.z..=upper.z),
            )
        };
        let y = runtime.volume.find_floor(x, z, VoxelType::is_floor)?;
        Some(WorldPos::new(x, y, z))
    }

    /// Bounding box of the paged chunks.
    #[must_use]
    pub fn enclosing_region(&self) -> Option<Region> {
        self.running()
            .and_then(|runtime| runtime.volume.enclosing_region())
    }

    /// Mesh region size as (width, height, depth).
    #[must_use]
    pub const fn mesh_size(&self) -> [u32; 3] {
        self.config.mesh_dimensions()
    }

    /// Storage chunk side of the running world, the configured side
    /// otherwise.
    #[must_use]
    pub fn chunk_side_length(&self) -> u32 {
        self.running()
            .map_or(self.config.chunk_side_length, |runtime| runtime.store.side())
    }

    /// Saves every dirty chunk without evicting it.
    ///
    /// # Errors
    ///
    /// `WorldError::NotInitialized`, or the first persistence error.
    pub fn flush(&self) -> WorldResult<usize> {
        let runtime = self.running().ok_or(WorldError::NotInitialized)?;
        Ok(runtime.store.flush()?)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// First non-air voxel along `direction_and_length` from `origin`.
    ///
    /// Returns [`PickResult::MISS`] if nothing is hit within the length.
    #[must_use]
    pub fn pick_voxel(&self, origin: Vec3, direction_and_length: Vec3) -> PickResult {
        self.running()
            .map_or(PickResult::MISS, |runtime| {
                pick_voxel(&runtime.volume, origin, direction_and_length)
            })
    }

    /// Walks the voxels along a ray of `max_distance`, handing each to
    /// `callback` until it returns false.
    ///
    /// Visits nothing and reports `Completed` when the world is not running.
    pub fn raycast(
        &self,
        start: Vec3,
        direction: Vec3,
        max_distance: f32,
        callback: impl FnMut(&mut Sampler<'_>) -> bool,
    ) -> RaycastResult {
        let Some(runtime) = self.running() else {
            return RaycastResult::Completed;
        };
        let ray = direction.normalized() * max_distance;
        raycast_with_direction(&runtime.volume, start, ray, callback)
    }

    /// First blocked voxel along a ray, with its position.
    #[must_use]
    pub fn raycast_blocked(
        &self,
        start: Vec3,
        direction: Vec3,
        max_distance: f32,
    ) -> Option<(WorldPos, Voxel)> {
        let mut hit = None;
        self.raycast(start, direction, max_distance, |sampler| {
            let voxel = sampler.voxel();
            if voxel.is_blocked() {
                hit = Some((sampler.position(), voxel));
                return false;
            }
            true
        });
        hit
    }

    /// Shortest path between two positions through non-blocked voxels.
    ///
    /// Runs on the calling thread.
    ///
    /// # Errors
    ///
    /// `PathError::NotInitialized`, or the search failure.
    pub fn find_path(&self, start: WorldPos, end: WorldPos) -> Result<Vec<WorldPos>, PathError> {
        let runtime = self.running().ok_or(PathError::NotInitialized)?;
        runtime
            .pathfinder
            .find_path(&runtime.volume, start, end, |voxel| voxel.is_blocked())
    }

    // =========================================================================
    // MESH EXTRACTION
    // =========================================================================

    /// Requests extraction of the region containing `pos`.
    ///
    /// False if the region is already pending, in flight or extracted, or
    /// the world is reset or not running.
    pub fn schedule_mesh_extraction(&self, pos: WorldPos) -> bool {
        self.running()
            .is_some_and(|runtime| runtime.scheduler.schedule(pos))
    }

    /// Lets the region containing `pos` be extracted again. True if it had
    /// been extracted.
    pub fn allow_reextraction(&self, pos: WorldPos) -> bool {
        self.running()
            .is_some_and(|runtime| runtime.scheduler.allow_reextraction(pos))
    }

    /// Takes one finished mesh without blocking.
    #[must_use]
    pub fn pop_extracted(&self) -> Option<ExtractedMeshResult> {
        self.running()
            .and_then(|runtime| runtime.scheduler.pop_extracted())
    }

    /// Takes every finished mesh currently queued.
    #[must_use]
    pub fn drain_extracted(&self) -> Vec<ExtractedMeshResult> {
        self.running()
            .map(|runtime| runtime.scheduler.drain_extracted())
            .unwrap_or_default()
    }

    /// Blocks until no region is pending or in flight, or `timeout` passes.
    ///
    /// Returns early once the world is shut down.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.running()
            .map_or(true, |runtime| runtime.scheduler.wait_until_idle(timeout))
    }

    /// Current counters, zero when not running.
    #[must_use]
    pub fn stats(&self) -> WorldStats {
        self.running()
            .map(|runtime| {
                let scheduler = runtime.scheduler.stats();
                WorldStats {
                    mesh_count: scheduler.ready,
                    extracted_pending_count: scheduler.tracked,
                    queued_extraction_count: scheduler.queued,
                    in_flight_count: scheduler.in_flight,
                    chunk_count: runtime.store.len(),
                }
            })
            .unwrap_or_default()
    }

    /// Paging counters of the running world.
    #[must_use]
    pub fn store_stats(&self) -> Option<StoreStats> {
        self.running().map(|runtime| runtime.store.stats())
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("initialized", &self.is_initialized())
            .field("seed", &self.seed())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
