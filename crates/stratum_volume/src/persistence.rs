//! # Persistence Collaborator
//!
//! Optional backing store consulted by `ChunkStore` before generating a
//! chunk and written to when a dirty chunk is evicted or flushed.
//!
//! ## File layout
//!
//! [`FileChunkPersistence`] keeps one LZ4 block per chunk:
//!
//! ```text
//! <dir>/c.<x>.<y>.<z>.s<shift>.lz4
//! ```
//!
//! The side length is part of the name so worlds with different chunk sizes
//! can share a directory without reading each other's payloads.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::trace;

use crate::chunk::{Chunk, ChunkCoord};
use crate::error::PersistenceError;

/// Loads and saves chunk payloads.
pub trait ChunkPersistence: Send + Sync {
    /// Loads a chunk, `Ok(None)` if it was never saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored payload cannot be read or decoded.
    fn load(&self, coord: ChunkCoord, shift: u32) -> Result<Option<Chunk>, PersistenceError>;

    /// Saves a chunk payload, replacing any earlier version.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be written.
    fn save(&self, chunk: &Chunk) -> Result<(), PersistenceError>;
}

/// Chunks stored as LZ4 files in a directory.
#[derive(Debug, Clone)]
pub struct FileChunkPersistence {
    dir: PathBuf,
}

impl FileChunkPersistence {
    /// Uses `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the chunk files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, coord: ChunkCoord, shift: u32) -> PathBuf {
        self.dir
            .join(format!("c.{}.{}.{}.s{shift}.lz4", coord.x, coord.y, coord.z))
    }
}

impl ChunkPersistence for FileChunkPersistence {
    fn load(&self, coord: ChunkCoord, shift: u32) -> Result<Option<Chunk>, PersistenceError> {
        let path = self.path_for(coord, shift);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PersistenceError::Io { coord, source }),
        };
        trace!(%coord, bytes = bytes.len(), "chunk loaded from disk");
        Chunk::from_compressed(coord, shift, &bytes).map(Some)
    }

    fn save(&self, chunk: &Chunk) -> Result<(), PersistenceError> {
        let coord = chunk.coord();
        let path = self.path_for(coord, chunk.shift());
        let tmp = path.with_extension("tmp");
        let bytes = chunk.to_compressed();

        // Write then rename so a crash never leaves a truncated payload.
        fs::write(&tmp, &bytes).map_err(|source| PersistenceError::Io { coord, source })?;
        fs::rename(&tmp, &path).map_err(|source| PersistenceError::Io { coord, source })?;
        trace!(%coord, bytes = bytes.len(), "chunk saved to disk");
        Ok(())
    }
}

/// Compressed chunks kept in a map. Used by tests and short-lived worlds.
#[derive(Debug, Default)]
pub struct MemoryChunkPersistence {
    chunks: Mutex<HashMap<(ChunkCoord, u32), Vec<u8>>>,
}

impl MemoryChunkPersistence {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saved chunks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    /// Returns true if nothing was saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }

    /// Returns true if a payload exists for the coordinate.
    #[must_use]
    pub fn contains(&self, coord: ChunkCoord, shift: u32) -> bool {
        self.chunks.lock().contains_key(&(coord, shift))
    }
}

impl ChunkPersistence for MemoryChunkPersistence {
    fn load(&self, coord: ChunkCoord, shift: u32) -> Result<Option<Chunk>, PersistenceError> {
        let chunks = self.chunks.lock();
        chunks
            .get(&(coord, shift))
            .map(|bytes| Chunk::from_compressed(coord, shift, bytes))
            .transpose()
    }

    fn save(&self, chunk: &Chunk) -> Result<(), PersistenceError> {
        self.chunks
            .lock()
            .insert((chunk.coord(), chunk.shift()), chunk.to_compressed());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::{Voxel, VoxelType};

    fn sample_chunk(coord: ChunkCoord) -> Chunk {
        let mut chunk = Chunk::new(coord, 3);
        chunk.set(1, 2, 3, Voxel::of(VoxelType::Wood));
        chunk.set(7, 7, 7, Voxel::new(VoxelType::Leaf, 9));
        chunk
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("stratum-persist-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_memory_missing_is_none() {
        let store = MemoryChunkPersistence::new();
        assert!(store.load(ChunkCoord::new(0, 0, 0), 3).unwrap().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_memory_save_load() {
        let store = MemoryChunkPersistence::new();
        let coord = ChunkCoord::new(-4, 1, 9);
        store.save(&sample_chunk(coord)).unwrap();

        assert!(store.contains(coord, 3));
        assert!(!store.contains(coord, 4));
        let loaded = store.load(coord, 3).unwrap().unwrap();
        assert_eq!(loaded.get(1, 2, 3).material(), VoxelType::Wood);
        assert_eq!(loaded.get(7, 7, 7).meta(), 9);
        assert!(!loaded.is_dirty());
    }

    #[test]
    fn test_file_save_load() {
        let dir = scratch_dir("roundtrip");
        let store = FileChunkPersistence::new(&dir).unwrap();
        let coord = ChunkCoord::new(2, -3, 0);

        assert!(store.load(coord, 3).unwrap().is_none());
        store.save(&sample_chunk(coord)).unwrap();
        let loaded = store.load(coord, 3).unwrap().unwrap();
        assert_eq!(loaded.solid_count(), 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_file_corrupt_payload() {
        let dir = scratch_dir("corrupt");
        let store = FileChunkPersistence::new(&dir).unwrap();
        let coord = ChunkCoord::new(0, 0, 0);
        fs::write(store.path_for(coord, 3), [4u8, 0, 0, 0, 0xff]).unwrap();

        assert!(matches!(
            store.load(coord, 3),
            Err(PersistenceError::Corrupt { .. })
        ));

        let _ = fs::remove_dir_all(&dir);
    }
}
