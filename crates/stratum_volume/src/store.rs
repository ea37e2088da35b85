//! # Chunk Store
//!
//! Memory-bounded paging of chunk payloads.
//!
//! ## Lifecycle
//!
//! 1. `get_or_create` on a resident chunk bumps its recency and returns a
//!    handle.
//! 2. On a miss the persistence collaborator is asked first, then the
//!    generator. Exactly one caller does the work per coordinate; everyone
//!    else arriving meanwhile waits on the coordinate's creation gate and
//!    receives the same outcome.
//! 3. After every insert the store sweeps least recently used chunks until
//!    it is back under budget. Chunks with a live [`ChunkHandle`] are
//!    skipped, dirty victims are saved first when persistence is present.
//!
//! ## Locking
//!
//! Lock order is `creating` then `chunks`. Voxel payloads have their own
//! `RwLock` per chunk so a write is never observed half applied.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace, warn};

use crate::chunk::{Chunk, ChunkCoord, MAX_CHUNK_SHIFT};
use crate::context::WorldContext;
use crate::error::{GenerationError, PersistenceError};
use crate::generator::{ChunkGenerator, GenerationParams};
use crate::persistence::ChunkPersistence;
use crate::region::Region;

/// A resident chunk plus its paging metadata.
struct ChunkSlot {
    chunk: RwLock<Chunk>,
    /// Store tick of the most recent access.
    last_access: AtomicU64,
}

impl ChunkSlot {
    fn new(chunk: Chunk, tick: u64) -> Self {
        Self {
            chunk: RwLock::new(chunk),
            last_access: AtomicU64::new(tick),
        }
    }

    #[inline]
    fn touch(&self, tick: u64) {
        self.last_access.fetch_max(tick, Ordering::Relaxed);
    }
}

/// Shared reference to a resident chunk.
///
/// While any handle is alive the chunk cannot be evicted. Handles are meant
/// to live for one traversal, not to be stored.
#[derive(Clone)]
pub struct ChunkHandle {
    coord: ChunkCoord,
    slot: Arc<ChunkSlot>,
}

impl ChunkHandle {
    /// Coordinate of the chunk.
    #[inline]
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Shared access to the payload.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Chunk> {
        self.slot.chunk.read()
    }

    /// Exclusive access to the payload.
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, Chunk> {
        self.slot.chunk.write()
    }

    /// Returns true if both handles point at the same resident payload.
    #[must_use]
    pub fn same_chunk(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl std::fmt::Debug for ChunkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkHandle").field("coord", &self.coord).finish()
    }
}

type CreationOutcome = Result<ChunkHandle, GenerationError>;

/// Rendezvous for callers racing on the same absent coordinate.
#[derive(Default)]
struct CreationGate {
    outcome: Mutex<Option<CreationOutcome>>,
    ready: Condvar,
}

impl CreationGate {
    fn publish(&self, outcome: CreationOutcome) {
        *self.outcome.lock() = Some(outcome);
        self.ready.notify_all();
    }

    fn wait(&self) -> CreationOutcome {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            self.ready.wait(&mut outcome);
        }
    }
}

/// Publishes a failure if the leader unwinds before finishing.
struct CreationLeader<'a> {
    store: &'a ChunkStore,
    coord: ChunkCoord,
    gate: Arc<CreationGate>,
    finished: bool,
}

impl CreationLeader<'_> {
    fn finish(mut self, outcome: CreationOutcome) -> CreationOutcome {
        self.store.creating.lock().remove(&self.coord);
        self.gate.publish(outcome.clone());
        self.finished = true;
        outcome
    }
}

impl Drop for CreationLeader<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.store.creating.lock().remove(&self.coord);
            self.gate.publish(Err(GenerationError::Failed {
                coord: self.coord,
                reason: "generation aborted".to_owned(),
            }));
        }
    }
}

/// Paging counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Chunks produced by the generator.
    pub generated: u64,
    /// Chunks restored from persistence.
    pub loaded: u64,
    /// Chunks dropped by eviction sweeps.
    pub evicted: u64,
    /// Failed creation attempts.
    pub failed: u64,
    /// Chunks currently resident.
    pub resident: usize,
}

#[derive(Default)]
struct Counters {
    generated: AtomicU64,
    loaded: AtomicU64,
    evicted: AtomicU64,
    failed: AtomicU64,
}

/// Owns every chunk payload of a world.
pub struct ChunkStore {
    shift: u32,
    memory_budget: usize,
    max_resident: usize,
    chunks: RwLock<HashMap<ChunkCoord, Arc<ChunkSlot>>>,
    creating: Mutex<HashMap<ChunkCoord, Arc<CreationGate>>>,
    generator: Arc<dyn ChunkGenerator>,
    persistence: Option<Arc<dyn ChunkPersistence>>,
    params: RwLock<GenerationParams>,
    tick: AtomicU64,
    counters: Counters,
}

impl ChunkStore {
    /// Creates an empty store for chunks of side `1 << shift`.
    ///
    /// The budget always admits at least one chunk. `shift` is clamped to
    /// [`MAX_CHUNK_SHIFT`].
    #[must_use]
    pub fn new(
        shift: u32,
        memory_budget: usize,
        context: WorldContext,
        generator: Arc<dyn ChunkGenerator>,
    ) -> Self {
        let shift = shift.min(MAX_CHUNK_SHIFT);
        let max_resident = (memory_budget / Chunk::payload_bytes(shift)).max(1);
        Self {
            shift,
            memory_budget,
            max_resident,
            chunks: RwLock::new(HashMap::with_capacity(max_resident.min(4096))),
            creating: Mutex::new(HashMap::new()),
            generator,
            persistence: None,
            params: RwLock::new(GenerationParams {
                context: Arc::new(context),
                ..GenerationParams::default()
            }),
            tick: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// Attaches a persistence collaborator.
    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn ChunkPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// log2 of the chunk side length.
    #[inline]
    #[must_use]
    pub const fn shift(&self) -> u32 {
        self.shift
    }

    /// Chunk side length in voxels.
    #[inline]
    #[must_use]
    pub const fn side(&self) -> u32 {
        1 << self.shift
    }

    /// Configured memory budget in bytes.
    #[must_use]
    pub const fn memory_budget(&self) -> usize {
        self.memory_budget
    }

    /// Number of chunks the budget admits.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.max_resident
    }

    /// Bytes of voxel payload currently resident.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.chunks.read().len() * Chunk::payload_bytes(self.shift)
    }

    /// Number of resident chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    /// Returns true if no chunk is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }

    /// Returns true if the chunk is resident.
    #[must_use]
    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.chunks.read().contains_key(&coord)
    }

    /// Current generation parameters.
    #[must_use]
    pub fn params(&self) -> GenerationParams {
        self.params.read().clone()
    }

    /// Changes the seed used for chunks generated from now on.
    ///
    /// Resident chunks are not regenerated.
    pub fn set_seed(&self, seed: u64, noise_offset: [f64; 2]) {
        let mut params = self.params.write();
        params.seed = seed;
        params.noise_offset = noise_offset;
    }

    #[inline]
    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn handle(coord: ChunkCoord, slot: &Arc<ChunkSlot>) -> ChunkHandle {
        ChunkHandle {
            coord,
            slot: Arc::clone(slot),
        }
    }

    /// Returns a resident chunk without paging anything in.
    #[must_use]
    pub fn get(&self, coord: ChunkCoord) -> Option<ChunkHandle> {
        let chunks = self.chunks.read();
        chunks.get(&coord).map(|slot| {
            slot.touch(self.next_tick());
            Self::handle(coord, slot)
        })
    }

    /// Marks a resident chunk as recently used. Returns false if absent.
    pub fn touch(&self, coord: ChunkCoord) -> bool {
        let tick = self.next_tick();
        if let Some(slot) = self.chunks.read().get(&coord) {
            slot.touch(tick);
            true
        } else {
            false
        }
    }

    /// Returns the chunk at `coord`, loading or generating it on a miss.
    ///
    /// Concurrent callers for the same absent coordinate share one
    /// generation and all receive its outcome.
    ///
    /// # Errors
    ///
    /// Returns the generation (or load) failure. Nothing is cached for the
    /// coordinate, so the next call tries again.
    pub fn get_or_create(&self, coord: ChunkCoord) -> Result<ChunkHandle, GenerationError> {
        if let Some(handle) = self.get(coord) {
            return Ok(handle);
        }

        let gate = {
            let mut creating = self.creating.lock();
            // The leader inserts before removing its gate, so a chunk that
            // finished in the meantime is visible here.
            if let Some(handle) = self.get(coord) {
                return Ok(handle);
            }
            if let Some(gate) = creating.get(&coord) {
                let gate = Arc::clone(gate);
                drop(creating);
                trace!(%coord, "waiting on in-flight chunk creation");
                return gate.wait();
            }
            let gate = Arc::new(CreationGate::default());
            creating.insert(coord, Arc::clone(&gate));
            gate
        };

        let leader = CreationLeader {
            store: self,
            coord,
            gate,
            finished: false,
        };
        let outcome = self.create(coord);
        let outcome = leader.finish(outcome);
        if outcome.is_ok() {
            self.evict_if_over_budget();
        }
        outcome
    }

    fn create(&self, coord: ChunkCoord) -> CreationOutcome {
        let chunk = match self.load_or_generate(coord) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(%coord, error = %e, "chunk creation failed");
                return Err(e);
            }
        };

        let slot = Arc::new(ChunkSlot::new(chunk, self.next_tick()));
        let handle = Self::handle(coord, &slot);
        self.chunks.write().insert(coord, slot);
        Ok(handle)
    }

    fn load_or_generate(&self, coord: ChunkCoord) -> Result<Chunk, GenerationError> {
        if let Some(persistence) = &self.persistence {
            match persistence.load(coord, self.shift) {
                Ok(Some(chunk)) => {
                    self.counters.loaded.fetch_add(1, Ordering::Relaxed);
                    trace!(%coord, "chunk restored");
                    return Ok(chunk);
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(GenerationError::Load {
                        coord,
                        reason: e.to_string(),
                    })
                }
            }
        }

        let params = self.params();
        let mut chunk = Chunk::new(coord, self.shift);
        self.generator.generate(&mut chunk, &params)?;
        chunk.clear_dirty();
        self.counters.generated.fetch_add(1, Ordering::Relaxed);
        trace!(%coord, solid = chunk.solid_count(), "chunk generated");
        Ok(chunk)
    }

    /// Evicts least recently used chunks until the store is within budget.
    ///
    /// Chunks with live handles are never evicted. Dirty victims are saved
    /// first when persistence is configured; a victim that fails to save
    /// stays resident. Returns the number of chunks evicted.
    pub fn evict_if_over_budget(&self) -> usize {
        // Held for the whole sweep so nobody reloads a victim before it is saved.
        let _creating = self.creating.lock();

        let victims: Vec<(ChunkCoord, Arc<ChunkSlot>)> = {
            let mut chunks = self.chunks.write();
            if chunks.len() <= self.max_resident {
                return 0;
            }
            let excess = chunks.len() - self.max_resident;

            // Under the write lock no new handle can be cloned from the map,
            // so a count of one means nobody is reading the chunk.
            let mut candidates: Vec<(u64, ChunkCoord)> = chunks
                .iter()
                .filter(|(_, slot)| Arc::strong_count(slot) == 1)
                .map(|(coord, slot)| (slot.last_access.load(Ordering::Relaxed), *coord))
                .collect();
            candidates.sort_unstable();
            candidates.truncate(excess);

            candidates
                .into_iter()
                .filter_map(|(_, coord)| chunks.remove(&coord).map(|slot| (coord, slot)))
                .collect()
        };

        let mut evicted = 0;
        let mut kept = Vec::new();
        for (coord, slot) in victims {
            let dirty = slot.chunk.read().is_dirty();
            if dirty {
                match &self.persistence {
                    Some(persistence) => {
                        let saved = persistence.save(&slot.chunk.read());
                        if let Err(e) = saved {
                            warn!(
                                %coord,
                                error = %e,
                                "saving evicted chunk failed, keeping it resident"
                            );
                            kept.push((coord, slot));
                            continue;
                        }
                    }
                    None => debug!(%coord, "discarding modifications of evicted chunk"),
                }
            }
            evicted += 1;
        }

        if !kept.is_empty() {
            self.chunks.write().extend(kept);
        }

        if evicted > 0 {
            self.counters.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
            debug!(evicted, resident = self.chunks.read().len(), "eviction sweep");
        }
        evicted
    }

    /// Saves every dirty resident chunk. Returns the number saved.
    ///
    /// Does nothing without a persistence collaborator.
    ///
    /// # Errors
    ///
    /// Stops at the first chunk that fails to save.
    pub fn flush(&self) -> Result<usize, PersistenceError> {
        let Some(persistence) = &self.persistence else {
            return Ok(0);
        };

        let slots: Vec<Arc<ChunkSlot>> = self.chunks.read().values().cloned().collect();
        let mut saved = 0;
        for slot in slots {
            let mut chunk = slot.chunk.write();
            if chunk.is_dirty() {
                persistence.save(&chunk)?;
                chunk.clear_dirty();
                saved += 1;
            }
        }
        if saved > 0 {
            debug!(saved, "flushed dirty chunks");
        }
        Ok(saved)
    }

    /// Drops every resident chunk without saving.
    pub fn clear(&self) {
        let _creating = self.creating.lock();
        self.chunks.write().clear();
    }

    /// Bounding box of every resident chunk, `None` when nothing is paged.
    #[must_use]
    pub fn enclosing_region(&self) -> Option<Region> {
        let chunks = self.chunks.read();
        let mut coords = chunks.keys();
        let mut region = coords.next()?.region(self.shift);
        for coord in coords {
            region.accumulate(&coord.region(self.shift));
        }
        Some(region)
    }

    /// Paging counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            generated: self.counters.generated.load(Ordering::Relaxed),
            loaded: self.counters.loaded.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            resident: self.len(),
        }
    }
}

impl std::fmt::Debug for ChunkStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStore")
            .field("side", &self.side())
            .field("capacity", &self.max_resident)
            .field("resident", &self.len())
            .field("persistent", &self.persistence.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::FlatGenerator;
    use crate::math::WorldPos;
    use crate::persistence::MemoryChunkPersistence;
    use crate::voxel::{Voxel, VoxelType};

    const SHIFT: u32 = 3;

    fn store_with_capacity(chunks: usize) -> ChunkStore {
        ChunkStore::new(
            SHIFT,
            chunks * Chunk::payload_bytes(SHIFT),
            WorldContext::default(),
            Arc::new(FlatGenerator::new(4, VoxelType::Rock)),
        )
    }

    #[test]
    fn test_get_or_create_generates_once() {
        let store = store_with_capacity(8);
        let coord = ChunkCoord::new(0, 0, 0);
        let a = store.get_or_create(coord).unwrap();
        let b = store.get_or_create(coord).unwrap();
        assert!(a.same_chunk(&b));
        assert_eq!(store.stats().generated, 1);
        assert_eq!(a.read().get(0, 0, 0).material(), VoxelType::Rock);
    }

    #[test]
    fn test_budget_admits_one_chunk() {
        let store = store_with_capacity(0);
        assert_eq!(store.capacity(), 1);
    }

    #[test]
    fn test_lru_eviction_order() {
        let store = store_with_capacity(2);
        let a = ChunkCoord::new(0, 0, 0);
        let b = ChunkCoord::new(1, 0, 0);
        let c = ChunkCoord::new(2, 0, 0);
        drop(store.get_or_create(a).unwrap());
        drop(store.get_or_create(b).unwrap());
        assert!(store.touch(a));
        drop(store.get_or_create(c).unwrap());

        assert!(store.contains(a));
        assert!(!store.contains(b));
        assert!(store.contains(c));
        assert_eq!(store.stats().evicted, 1);
    }

    #[test]
    fn test_pinned_chunk_survives_eviction() {
        let store = store_with_capacity(1);
        let pinned = store.get_or_create(ChunkCoord::new(0, 0, 0)).unwrap();
        for x in 1..5 {
            drop(store.get_or_create(ChunkCoord::new(x, 0, 0)).unwrap());
        }
        assert!(store.contains(pinned.coord()));
        assert_eq!(pinned.read().get(1, 1, 1).material(), VoxelType::Rock);
    }

    #[test]
    fn test_dirty_victim_is_saved_and_restored() {
        let persistence = Arc::new(MemoryChunkPersistence::new());
        let store = store_with_capacity(1).with_persistence(persistence.clone());
        let coord = ChunkCoord::new(0, 0, 0);

        {
            let handle = store.get_or_create(coord).unwrap();
            handle.write().set_voxel_at(WorldPos::new(2, 6, 2), Voxel::of(VoxelType::Wood));
        }
        drop(store.get_or_create(ChunkCoord::new(5, 0, 0)).unwrap());
        assert!(!store.contains(coord));
        assert!(persistence.contains(coord, SHIFT));

        let restored = store.get_or_create(coord).unwrap();
        assert_eq!(restored.read().voxel_at(WorldPos::new(2, 6, 2)).material(), VoxelType::Wood);
        assert_eq!(store.stats().loaded, 1);
    }

    /// Rejects every save.
    struct ReadOnlyPersistence;

    impl ChunkPersistence for ReadOnlyPersistence {
        fn load(&self, _coord: ChunkCoord, _shift: u32) -> Result<Option<Chunk>, PersistenceError> {
            Ok(None)
        }

        fn save(&self, chunk: &Chunk) -> Result<(), PersistenceError> {
            Err(PersistenceError::Io {
                coord: chunk.coord(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
    }

    #[test]
    fn test_dirty_victim_stays_resident_when_save_fails() {
        let store = store_with_capacity(1).with_persistence(Arc::new(ReadOnlyPersistence));
        let coord = ChunkCoord::new(0, 0, 0);
        {
            let handle = store.get_or_create(coord).unwrap();
            handle.write().set_voxel_at(WorldPos::new(1, 6, 1), Voxel::of(VoxelType::Wood));
        }
        drop(store.get_or_create(ChunkCoord::new(3, 0, 0)).unwrap());

        assert!(store.contains(coord));
        let kept = store.get_or_create(coord).unwrap();
        assert_eq!(kept.read().voxel_at(WorldPos::new(1, 6, 1)).material(), VoxelType::Wood);
        assert!(kept.read().is_dirty());
    }

    #[test]
    fn test_flush_saves_dirty_only() {
        let persistence = Arc::new(MemoryChunkPersistence::new());
        let store = store_with_capacity(4).with_persistence(persistence.clone());
        let dirty = store.get_or_create(ChunkCoord::new(0, 0, 0)).unwrap();
        let _clean = store.get_or_create(ChunkCoord::new(1, 0, 0)).unwrap();
        dirty.write().set(0, 7, 0, Voxel::of(VoxelType::Flower));

        assert_eq!(store.flush().unwrap(), 1);
        assert_eq!(persistence.len(), 1);
        assert!(!dirty.read().is_dirty());
        assert_eq!(store.flush().unwrap(), 0);
    }

    #[test]
    fn test_enclosing_region() {
        let store = store_with_capacity(8);
        assert!(store.enclosing_region().is_none());
        drop(store.get_or_create(ChunkCoord::new(-1, 0, 0)).unwrap());
        drop(store.get_or_create(ChunkCoord::new(1, 2, 0)).unwrap());
        let region = store.enclosing_region().unwrap();
        assert_eq!(region.lower(), WorldPos::new(-8, 0, 0));
        assert_eq!(region.upper(), WorldPos::new(15, 23, 7));
    }

    #[test]
    fn test_seed_is_visible_to_generation() {
        let store = store_with_capacity(1);
        store.set_seed(99, [1.5, -2.5]);
        let params = store.params();
        assert_eq!(params.seed, 99);
        assert_eq!(params.noise_offset, [1.5, -2.5]);
    }
}
