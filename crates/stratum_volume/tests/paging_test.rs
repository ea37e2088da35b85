//! # Paging Integration Test
//!
//! Proves the chunk store generates each coordinate once under contention,
//! never evicts chunks a sampler is reading, and keeps writes across
//! eviction when persistence is attached.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use stratum_volume::{
    Chunk, ChunkCoord, ChunkGenerator, ChunkStore, FileChunkPersistence, FlatGenerator,
    GenerationError, GenerationParams, MemoryChunkPersistence, Voxel, VoxelType, VoxelVolume,
    WorldContext, WorldPos,
};

const SHIFT: u32 = 4;

/// Slow flat generator that counts calls per run.
struct CountingGenerator {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingGenerator {
    fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
        }
    }
}

impl ChunkGenerator for CountingGenerator {
    fn generate(
        &self,
        chunk: &mut Chunk,
        params: &GenerationParams,
    ) -> Result<(), GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        FlatGenerator::new(8, VoxelType::Rock).generate(chunk, params)
    }
}

/// Fails while `remaining_failures` is positive, then generates sand.
struct FlakyGenerator {
    remaining_failures: AtomicUsize,
}

impl ChunkGenerator for FlakyGenerator {
    fn generate(
        &self,
        chunk: &mut Chunk,
        params: &GenerationParams,
    ) -> Result<(), GenerationError> {
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            thread::sleep(Duration::from_millis(20));
            return Err(GenerationError::Failed {
                coord: chunk.coord(),
                reason: "flaky".to_owned(),
            });
        }
        FlatGenerator::new(8, VoxelType::Sand).generate(chunk, params)
    }
}

fn budget(chunks: usize) -> usize {
    chunks * Chunk::payload_bytes(SHIFT)
}

/// Test: 16 threads asking for the same absent chunk trigger one generation.
#[test]
fn test_concurrent_get_or_create_generates_once() {
    let generator = Arc::new(CountingGenerator::new(Duration::from_millis(50)));
    let store = Arc::new(ChunkStore::new(
        SHIFT,
        budget(64),
        WorldContext::default(),
        generator.clone(),
    ));
    let barrier = Arc::new(Barrier::new(16));
    let coord = ChunkCoord::new(3, 0, -2);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let handle = store.get_or_create(coord).unwrap();
                let material = handle.read().get(0, 0, 0).material();
                material
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), VoxelType::Rock);
    }
    assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.stats().generated, 1);
    assert_eq!(store.len(), 1);
}

/// Test: every waiter sees the failure, nothing is cached, the retry works.
#[test]
fn test_generation_failure_is_shared_then_retried() {
    let generator = Arc::new(FlakyGenerator {
        remaining_failures: AtomicUsize::new(1),
    });
    let store = Arc::new(ChunkStore::new(SHIFT, budget(8), WorldContext::default(), generator));
    let barrier = Arc::new(Barrier::new(8));
    let coord = ChunkCoord::new(0, 0, 0);

    let results: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                store.get_or_create(coord).map(|h| h.coord())
            })
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    // Threads arriving after the failure was published start a fresh
    // attempt; everyone else shares the single failure.
    assert!(results.iter().any(Result::is_err));
    assert_eq!(store.stats().failed, 1);

    let handle = store.get_or_create(coord).unwrap();
    assert_eq!(handle.read().get(1, 1, 1).material(), VoxelType::Sand);
}

/// Test: samplers reading while other threads page chunks through a tiny
/// budget always see the generated data.
#[test]
fn test_eviction_never_touches_pinned_chunks() {
    let store = Arc::new(ChunkStore::new(
        SHIFT,
        budget(4),
        WorldContext::default(),
        Arc::new(FlatGenerator::new(8, VoxelType::Rock)),
    ));
    let volume = Arc::new(VoxelVolume::new(Arc::clone(&store)).with_height(64));
    let barrier = Arc::new(Barrier::new(6));

    let readers: Vec<_> = (0..3)
        .map(|i| {
            let volume = Arc::clone(&volume);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut sampler = volume.sampler();
                for step in 0..2_000 {
                    let x = (i * 1000 + step) % 128 - 64;
                    sampler.set_position(WorldPos::new(x, 7, x / 2));
                    assert_eq!(sampler.voxel().material(), VoxelType::Rock);
                    assert!(sampler.peek(0, 1, 0).is_air());
                }
            })
        })
        .collect();

    let churners: Vec<_> = (0..3)
        .map(|i| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for n in 0..300 {
                    let coord = ChunkCoord::new(100 + i * 300 + n, 0, 0);
                    drop(store.get_or_create(coord).unwrap());
                }
            })
        })
        .collect();

    for t in readers.into_iter().chain(churners) {
        t.join().unwrap();
    }

    assert!(store.stats().evicted > 0);
    // The last sweeps may have run while readers still held pins.
    store.evict_if_over_budget();
    assert!(store.len() <= store.capacity());
}

/// Test: a write survives eviction and a flushed world reloads from disk.
#[test]
fn test_writes_survive_eviction_and_flush() {
    let dir = std::env::temp_dir().join(format!("stratum-paging-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);

    let pos = WorldPos::new(-5, 30, 12);
    {
        let persistence = Arc::new(FileChunkPersistence::new(&dir).unwrap());
        let store = ChunkStore::new(
            SHIFT,
            budget(2),
            WorldContext::default(),
            Arc::new(FlatGenerator::empty()),
        )
        .with_persistence(persistence);
        let volume = VoxelVolume::new(Arc::new(store));

        volume.set_voxel(pos, Voxel::of(VoxelType::Clouds)).unwrap();
        for x in 0..8 {
            let _ = volume.voxel_at(WorldPos::new(x * 16, 0, 0));
        }
        assert!(!volume.store().contains(volume.chunk_coord(pos)));
        assert_eq!(volume.material(pos), VoxelType::Clouds);

        volume.set_voxel(pos.offset(1, 0, 0), Voxel::of(VoxelType::Flower)).unwrap();
        assert_eq!(volume.store().flush().unwrap(), 1);
    }

    let persistence = Arc::new(FileChunkPersistence::new(&dir).unwrap());
    let store = ChunkStore::new(
        SHIFT,
        budget(2),
        WorldContext::default(),
        Arc::new(FlatGenerator::empty()),
    )
    .with_persistence(persistence);
    let volume = VoxelVolume::new(Arc::new(store));
    assert_eq!(volume.material(pos), VoxelType::Clouds);
    assert_eq!(volume.material(pos.offset(1, 0, 0)), VoxelType::Flower);
    assert_eq!(volume.store().stats().generated, 0);

    let _ = std::fs::remove_dir_all(&dir);
}

/// Test: clean chunks are dropped, not saved, and regenerate on return.
#[test]
fn test_clean_chunks_regenerate_after_eviction() {
    let persistence = Arc::new(MemoryChunkPersistence::new());
    let store = ChunkStore::new(
        SHIFT,
        budget(1),
        WorldContext::default(),
        Arc::new(FlatGenerator::new(4, VoxelType::Grass)),
    )
    .with_persistence(persistence.clone());
    let volume = VoxelVolume::new(Arc::new(store));
    let _ = volume.voxel_at(WorldPos::new(0, 0, 0));
    let _ = volume.voxel_at(WorldPos::new(64, 0, 0));
    assert_eq!(volume.material(WorldPos::new(0, 3, 0)), VoxelType::Grass);

    let stats = volume.store().stats();
    assert_eq!(stats.generated, 3);
    assert_eq!(stats.loaded, 0);
    assert_eq!(stats.evicted, 2);
    assert!(persistence.is_empty());
}
