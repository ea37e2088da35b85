//! # World Integration Test
//!
//! Drives the full stack (paging, extraction, queries) through the facade:
//! - writes are visible to reads and eventually to meshes
//! - picks and paths behave at their boundaries
//! - shutdown terminates from any state
//! - a tight memory budget survives concurrent extraction
//! - dirty chunks survive a restart through persistence

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use stratum::{
    Connectivity, FlatGenerator, MemoryChunkPersistence, PathError, PathfindingConfig,
    TerrainGenerator, Vec3, Voxel, VoxelType, World, WorldConfig, WorldPos,
};

const WAIT: Duration = Duration::from_secs(20);

fn config() -> WorldConfig {
    WorldConfig {
        memory_budget_bytes: 16 << 20,
        chunk_side_length: 16,
        mesh_size: 16,
        mesh_height: 32,
        max_height: 32,
        worker_threads: Some(3),
        ..WorldConfig::default()
    }
}

fn flat_world(ground: i32) -> World {
    let world =
        World::new(config()).with_generator(Arc::new(FlatGenerator::new(ground, VoxelType::Rock)));
    world.init_from_config().unwrap();
    world
}

/// Drains meshes until the world is idle and returns the last mesh of `origin`.
fn settle_region(world: &World, origin: WorldPos) -> Option<stratum::ExtractedMeshResult> {
    let deadline = Instant::now() + WAIT;
    let mut last = None;
    loop {
        for result in world.drain_extracted() {
            if result.origin == origin {
                last = Some(result);
            }
        }
        if world.wait_until_idle(Duration::from_millis(20)) {
            for result in world.drain_extracted() {
                if result.origin == origin {
                    last = Some(result);
                }
            }
            return last;
        }
        assert!(Instant::now() < deadline, "extraction never settled");
    }
}

/// Test: a write is visible to the next read on the same thread
#[test]
fn test_write_then_read() {
    let world = flat_world(4);
    for (i, material) in VoxelType::ALL.iter().enumerate() {
        let pos = WorldPos::new(i as i32 * 7 - 30, 10, -(i as i32) * 5);
        world.set_voxel(pos, Voxel::new(*material, i as u8)).unwrap();
        let read = world.voxel_at(pos);
        assert_eq!(read.material(), *material);
        assert_eq!(read.meta(), i as u8);
    }
    assert!(world.set_voxel(WorldPos::new(0, 32, 0), Voxel::of(VoxelType::Rock)).is_err());
    assert!(world.set_voxel(WorldPos::new(0, -1, 0), Voxel::of(VoxelType::Rock)).is_err());
}

/// Test: after draining, the region mesh reflects every write made to it
#[test]
fn test_eventual_mesh_consistency() {
    let world = Arc::new(flat_world(4));
    let writers: Vec<_> = (0..4)
        .map(|i| {
            let world = Arc::clone(&world);
            thread::spawn(move || {
                for y in 4..12 {
                    world
                        .set_voxel(WorldPos::new(2 + i * 3, y, 7), Voxel::of(VoxelType::Wood))
                        .unwrap();
                    thread::sleep(Duration::from_millis(1));
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    let mesh = settle_region(&world, WorldPos::ZERO).expect("region 0 was extracted");
    for i in 0..4 {
        let top = [2.0 + i as f32 * 3.0, 12.0, 7.0];
        assert!(
            mesh.opaque().vertices().iter().any(|v| v.material == VoxelType::Wood as u32
                && v.position[1] == top[1]
                && v.position[0] >= top[0]
                && v.position[0] <= top[0] + 1.0),
            "pillar {i} is missing its top face"
        );
    }
}

/// Test: an all-air ray misses, a ray at a known voxel hits it exactly
#[test]
fn test_pick_voxel_sentinel_and_hit() {
    let world = flat_world(0);
    let miss = world.pick_voxel(Vec3::new(0.5, 20.5, 0.5), Vec3::new(30.0, 0.0, 0.0));
    assert!(!miss.did_hit());
    assert_eq!(miss, stratum::PickResult::MISS);

    world.set_voxel(WorldPos::new(0, 20, 12), Voxel::of(VoxelType::Leaf)).unwrap();
    let hit = world.pick_voxel(Vec3::new(0.5, 20.5, 0.5), Vec3::new(0.0, 0.0, 30.0));
    assert_eq!(hit.hit, Some(WorldPos::new(0, 20, 12)));
    assert_eq!(hit.voxel.material(), VoxelType::Leaf);

    let (pos, voxel) = world
        .raycast_blocked(Vec3::new(0.5, 20.5, 0.5), Vec3::new(0.0, 0.0, 1.0), 30.0)
        .unwrap();
    assert_eq!(pos, WorldPos::new(0, 20, 12));
    assert_eq!(voxel.material(), VoxelType::Leaf);
}

/// Test: trivial path, straight corridor, and a goal sealed in rock
#[test]
fn test_pathfinding_boundaries() {
    let world = flat_world(2);
    let s = WorldPos::new(3, 2, 3);
    assert_eq!(world.find_path(s, s).unwrap(), vec![s]);

    let path = world.find_path(WorldPos::new(0, 2, 0), WorldPos::new(12, 2, 0)).unwrap();
    assert_eq!(path.len(), 13);
    assert_eq!(path.first(), Some(&WorldPos::new(0, 2, 0)));
    assert_eq!(path.last(), Some(&WorldPos::new(12, 2, 0)));

    // Seal the goal in a rock shell.
    let goal = WorldPos::new(20, 6, 20);
    for dz in -1..=1 {
        for dy in -1..=1 {
            for dx in -1..=1 {
                if (dx, dy, dz) != (0, 0, 0) {
                    world
                        .set_voxel(goal.offset(dx, dy, dz), Voxel::of(VoxelType::Rock))
                        .unwrap();
                }
            }
        }
    }
    let err = world.find_path(WorldPos::new(0, 2, 0), goal).unwrap_err();
    assert!(matches!(err, PathError::BudgetExhausted { .. } | PathError::NoPath { .. }));
}

/// Test: six-connected search from configuration takes only face steps
#[test]
fn test_six_connected_from_config() {
    let world = World::new(WorldConfig {
        pathfinding: PathfindingConfig {
            connectivity: Connectivity::Six,
            ..PathfindingConfig::default()
        },
        ..config()
    })
    .with_generator(Arc::new(FlatGenerator::new(2, VoxelType::Rock)));
    world.init_from_config().unwrap();

    let path = world.find_path(WorldPos::new(0, 2, 0), WorldPos::new(3, 4, 3)).unwrap();
    assert_eq!(path.len(), 3 + 2 + 3 + 1);
    assert!(path.windows(2).all(|w| w[0].abs_diff(w[1]).iter().sum::<u32>() == 1));
}

/// Test: shutdown with heavy pending work returns promptly
#[test]
fn test_shutdown_with_pending_work() {
    let world = World::new(config()).with_generator(Arc::new(TerrainGenerator::new()));
    world.init_from_config().unwrap();
    for x in -8..8 {
        for z in -8..8 {
            world.schedule_mesh_extraction(WorldPos::new(x * 16, 0, z * 16));
        }
    }

    let started = Instant::now();
    world.shutdown();
    assert!(started.elapsed() < WAIT);
    assert!(!world.is_initialized());
    assert_eq!(world.stats(), stratum::WorldStats::default());
    world.shutdown();
}

/// Test: a budget of a few chunks holds up under extraction of many regions
#[test]
fn test_tight_budget_under_extraction() {
    let side = 16usize;
    let chunk_bytes = side * side * side * std::mem::size_of::<Voxel>();
    let world = World::new(WorldConfig {
        memory_budget_bytes: chunk_bytes * 12,
        ..config()
    })
    .with_generator(Arc::new(TerrainGenerator::new()));
    world.init_from_config().unwrap();

    for x in 0..6 {
        for z in 0..6 {
            assert!(world.schedule_mesh_extraction(WorldPos::new(x * 16, 0, z * 16)));
        }
    }
    let deadline = Instant::now() + WAIT;
    let mut delivered = 0;
    while !world.wait_until_idle(Duration::from_millis(20)) {
        delivered += world.drain_extracted().len();
        assert!(Instant::now() < deadline);
    }
    delivered += world.drain_extracted().len();

    assert!(delivered > 0);
    let paging = world.store_stats().unwrap();
    assert!(paging.evicted > 0);
    assert_eq!(paging.failed, 0);
}

/// Test: writes survive shutdown and restart through persistence
#[test]
fn test_writes_survive_restart() {
    let persistence = Arc::new(MemoryChunkPersistence::new());
    let pos = WorldPos::new(-7, 9, 40);

    let world = World::new(config())
        .with_generator(Arc::new(FlatGenerator::new(4, VoxelType::Rock)))
        .with_persistence(persistence.clone());
    world.init_from_config().unwrap();
    world.set_voxel(pos, Voxel::of(VoxelType::Flower)).unwrap();
    world.shutdown();
    assert!(!persistence.is_empty());

    world.init_from_config().unwrap();
    assert_eq!(world.material(pos), VoxelType::Flower);
    assert_eq!(world.store_stats().unwrap().loaded, 1);
}

/// Test: reset drops the session, resume starts a new one
#[test]
fn test_reset_and_resume() {
    let world = flat_world(4);
    world.reset();
    assert!(world.is_reset());
    assert!(!world.schedule_mesh_extraction(WorldPos::ZERO));
    assert_eq!(world.stats().extracted_pending_count, 0);

    assert!(world.resume());
    assert!(!world.is_reset());
    assert!(world.schedule_mesh_extraction(WorldPos::ZERO));
    assert!(settle_region(&world, WorldPos::ZERO).is_some());
}

/// Test: random_pos lands on a floor voxel
#[test]
fn test_random_pos_on_floor() {
    let world = flat_world(6);
    world.set_seed(99);
    for _ in 0..8 {
        let pos = world.random_pos().unwrap();
        assert_eq!(pos.y, 6);
        assert!(world.material(pos).is_air());
        assert!(world.material(pos.offset(0, -1, 0)).is_floor());
    }
}
