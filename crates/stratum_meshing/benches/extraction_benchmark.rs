//! Benchmark for cubic surface extraction.
//!
//! Run with: cargo bench --package stratum_meshing --bench extraction_benchmark

use std::sync::Arc;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use stratum_meshing::{
    ChunkMeshes, CubicSurfaceExtractor, ExtractionConfig, ExtractionScheduler, QuadRules,
    SchedulerConfig, SurfaceExtractor,
};
use stratum_volume::{ChunkStore, Region, TerrainGenerator, VoxelVolume, WorldContext, WorldPos};

fn terrain_volume() -> VoxelVolume {
    let store = ChunkStore::new(
        5,
        256 << 20,
        WorldContext::default(),
        Arc::new(TerrainGenerator::new()),
    );
    VoxelVolume::new(Arc::new(store)).with_height(128)
}

fn benchmark_cubic_extraction(c: &mut Criterion) {
    let volume = terrain_volume();
    let region = Region::from_origin(WorldPos::ZERO, [32, 128, 32]);
    let rules = QuadRules::with_water_height(WorldContext::default().water_height);
    let config = ExtractionConfig::default();
    let extractor = CubicSurfaceExtractor::new();

    // Page everything in before measuring.
    let mut warm = ChunkMeshes::default();
    extractor.extract(&volume, region, &rules, &mut warm).unwrap();

    let mut group = c.benchmark_group("extraction");
    group.throughput(Throughput::Elements(region.volume()));
    group.bench_function("terrain_region_32x128x32", |b| {
        b.iter(|| {
            let capacity = config.opaque_capacity(&region);
            let mut out = ChunkMeshes::with_capacity(capacity, capacity, 0, 0);
            extractor.extract(&volume, region, &rules, &mut out).unwrap();
            black_box(out.opaque.triangle_count())
        });
    });
    group.finish();
}

fn benchmark_scheduler_throughput(c: &mut Criterion) {
    let volume = terrain_volume();
    let config = SchedulerConfig {
        mesh_size: [32, 128, 32],
        ..SchedulerConfig::default()
    };
    let scheduler =
        ExtractionScheduler::new(volume, Arc::new(CubicSurfaceExtractor::new()), config).unwrap();

    let mut group = c.benchmark_group("scheduler");
    group.sample_size(10);
    group.bench_function("16_regions_round_trip", |b| {
        let mut base = 0i32;
        b.iter(|| {
            base = base.wrapping_add(4 * 32);
            for x in 0..4 {
                for z in 0..4 {
                    scheduler.schedule(WorldPos::new(base + x * 32, 0, z * 32));
                }
            }
            let mut received = 0;
            while received < 16 {
                if scheduler.pop_extracted_timeout(Duration::from_secs(10)).is_none() {
                    break;
                }
                received += 1;
            }
            black_box(received)
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark_cubic_extraction, benchmark_scheduler_throughput);
criterion_main!(benches);
