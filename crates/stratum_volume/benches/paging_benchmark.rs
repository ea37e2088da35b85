//! Benchmark for chunk paging and voxel addressing.
//!
//! Run with: cargo bench --package stratum_volume --bench paging_benchmark

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use stratum_volume::{
    Chunk, ChunkCoord, ChunkGenerator, ChunkStore, GenerationParams, TerrainGenerator, VoxelVolume,
    WorldContext, WorldPos,
};

fn benchmark_terrain_generation(c: &mut Criterion) {
    let generator = TerrainGenerator::new();
    let params = GenerationParams::default();

    c.bench_function("terrain_chunk_32", |b| {
        let mut x = 0i32;
        b.iter(|| {
            x = x.wrapping_add(1);
            let mut chunk = Chunk::new(ChunkCoord::new(x, 1, x / 3), 5);
            generator.generate(&mut chunk, &params).unwrap();
            black_box(chunk.solid_count())
        });
    });
}

fn benchmark_paging_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("paging");
    group.throughput(Throughput::Elements(64));
    group.bench_function("64_chunks_through_16_chunk_budget", |b| {
        let store = ChunkStore::new(
            4,
            16 * Chunk::payload_bytes(4),
            WorldContext::default(),
            Arc::new(TerrainGenerator::new()),
        );
        let mut base = 0i32;
        b.iter(|| {
            base = base.wrapping_add(64);
            for i in 0..64 {
                black_box(store.get_or_create(ChunkCoord::new(base + i, 3, 0)).unwrap());
            }
        });
    });
    group.finish();
}

fn benchmark_sampler_vs_volume(c: &mut Criterion) {
    let store = ChunkStore::new(
        4,
        64 << 20,
        WorldContext::default(),
        Arc::new(TerrainGenerator::new()),
    );
    let volume = VoxelVolume::new(Arc::new(store)).with_height(128);
    for x in 0..64 {
        let _ = volume.voxel_at(WorldPos::new(x, 48, 0));
    }

    let mut group = c.benchmark_group("voxel_reads");
    group.throughput(Throughput::Elements(4096));
    group.bench_function("volume_voxel_at", |b| {
        b.iter(|| {
            for x in 0..4096 {
                black_box(volume.voxel_at(WorldPos::new(x % 64, 48, x / 64 % 16)));
            }
        });
    });
    group.bench_function("sampler_voxel", |b| {
        b.iter(|| {
            let mut sampler = volume.sampler();
            for x in 0..4096 {
                sampler.set_position(WorldPos::new(x % 64, 48, x / 64 % 16));
                black_box(sampler.voxel());
            }
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_terrain_generation,
    benchmark_paging_churn,
    benchmark_sampler_vs_volume,
);
criterion_main!(benches);
