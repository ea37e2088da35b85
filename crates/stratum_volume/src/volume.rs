//! # Voxel Volume
//!
//! World-coordinate addressing on top of [`ChunkStore`].
//!
//! Reads are total: a position outside the configured bounds, or inside a
//! chunk that cannot be generated, reads as air. Writes report failures.
//!
//! For many reads around one spot use a [`Sampler`], which keeps the current
//! chunk handle and only goes back to the store when it crosses a chunk
//! boundary.

use std::sync::Arc;

use tracing::warn;

use crate::chunk::ChunkCoord;
use crate::error::{VolumeError, VolumeResult};
use crate::math::WorldPos;
use crate::region::Region;
use crate::store::{ChunkHandle, ChunkStore};
use crate::voxel::{Voxel, VoxelType};

/// Addressing layer over a shared [`ChunkStore`].
#[derive(Debug, Clone)]
pub struct VoxelVolume {
    store: Arc<ChunkStore>,
    bounds: Option<Region>,
}

impl VoxelVolume {
    /// Unbounded volume over `store`.
    #[must_use]
    pub fn new(store: Arc<ChunkStore>) -> Self {
        Self { store, bounds: None }
    }

    /// Restricts the volume to `bounds`.
    #[must_use]
    pub fn with_bounds(mut self, bounds: Region) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Volume spanning every X/Z with `0 <= y < max_height`.
    #[must_use]
    pub fn with_height(self, max_height: u32) -> Self {
        let top = max_height.max(1).min(i32::MAX as u32) as i32 - 1;
        self.with_bounds(Region::new(
            WorldPos::new(i32::MIN, 0, i32::MIN),
            WorldPos::new(i32::MAX, top, i32::MAX),
        ))
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<ChunkStore> {
        &self.store
    }

    /// Configured bounds, if any.
    #[must_use]
    pub const fn bounds(&self) -> Option<Region> {
        self.bounds
    }

    /// Returns true if `pos` can hold data.
    #[inline]
    #[must_use]
    pub fn in_bounds(&self, pos: WorldPos) -> bool {
        self.bounds.map_or(true, |b| b.contains(pos))
    }

    /// Chunk owning a world position.
    #[inline]
    #[must_use]
    pub fn chunk_coord(&self, pos: WorldPos) -> ChunkCoord {
        ChunkCoord::from_world_pos(pos, self.store.shift())
    }

    /// Voxel at a world position.
    ///
    /// Never fails: out-of-bounds and ungeneratable positions read as air.
    #[must_use]
    pub fn voxel_at(&self, pos: WorldPos) -> Voxel {
        if !self.in_bounds(pos) {
            return Voxel::AIR;
        }
        match self.store.get_or_create(self.chunk_coord(pos)) {
            Ok(handle) => handle.read().voxel_at(pos),
            Err(e) => {
                warn!(%pos, error = %e, "reading voxel from missing chunk");
                Voxel::AIR
            }
        }
    }

    /// Material at a world position.
    #[inline]
    #[must_use]
    pub fn material(&self, pos: WorldPos) -> VoxelType {
        self.voxel_at(pos).material()
    }

    /// Writes a voxel and marks its chunk dirty.
    ///
    /// Mesh extraction is not triggered here.
    ///
    /// # Errors
    ///
    /// `VolumeError::OutOfBounds` outside the bounds, or the generation error
    /// if the owning chunk cannot be created.
    pub fn set_voxel(&self, pos: WorldPos, voxel: Voxel) -> VolumeResult<()> {
        if !self.in_bounds(pos) {
            return Err(VolumeError::OutOfBounds(pos));
        }
        let handle = self.store.get_or_create(self.chunk_coord(pos))?;
        handle.write().set_voxel_at(pos, voxel);
        Ok(())
    }

    /// Bounding box of the paged chunks, clipped to the bounds.
    #[must_use]
    pub fn enclosing_region(&self) -> Option<Region> {
        let paged = self.store.enclosing_region()?;
        match self.bounds {
            None => Some(paged),
            Some(bounds) if bounds.intersects(&paged) => Some(Region::new(
                bounds.clamp(paged.lower()),
                bounds.clamp(paged.upper()),
            )),
            Some(_) => None,
        }
    }

    /// Scans the column at `(x, z)` from the top down and returns the y just
    /// above the first voxel accepted by `accept`.
    ///
    /// The scan starts at the top of the bounds, or of the paged region when
    /// the volume is unbounded. `None` if nothing matches.
    #[must_use]
    pub fn find_floor(&self, x: i32, z: i32, accept: impl Fn(VoxelType) -> bool) -> Option<i32> {
        let (top, bottom) = match (self.bounds, self.store.enclosing_region()) {
            (Some(b), _) if b.upper().y < i32::MAX => (b.upper().y, b.lower().y),
            (_, Some(paged)) => (paged.upper().y, paged.lower().y),
            _ => return None,
        };

        let mut sampler = self.sampler();
        sampler.set_position(WorldPos::new(x, top, z));
        for y in (bottom..=top).rev() {
            if accept(sampler.voxel().material()) {
                return Some(y + 1);
            }
            sampler.move_by(0, -1, 0);
        }
        None
    }

    /// Creates a cursor for sequential reads.
    #[must_use]
    pub fn sampler(&self) -> Sampler<'_> {
        Sampler {
            volume: self,
            pos: WorldPos::ZERO,
            current: None,
        }
    }
}

/// Cursor for neighbourhood reads.
///
/// The chunk under the cursor stays pinned (cannot be evicted) until the
/// cursor moves to another chunk or is dropped. Use one sampler per
/// traversal and do not keep it around.
pub struct Sampler<'a> {
    volume: &'a VoxelVolume,
    pos: WorldPos,
    current: Option<ChunkHandle>,
}

impl Sampler<'_> {
    /// Current cursor position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> WorldPos {
        self.pos
    }

    /// Moves the cursor.
    #[inline]
    pub fn set_position(&mut self, pos: WorldPos) {
        self.pos = pos;
    }

    /// Moves the cursor by a delta.
    #[inline]
    pub fn move_by(&mut self, dx: i32, dy: i32, dz: i32) {
        self.pos = self.pos.offset(dx, dy, dz);
    }

    /// Voxel under the cursor, air on failure.
    #[inline]
    pub fn voxel(&mut self) -> Voxel {
        self.read(self.pos).unwrap_or(Voxel::AIR)
    }

    /// Voxel under the cursor.
    ///
    /// # Errors
    ///
    /// Returns the generation error if the owning chunk cannot be created.
    /// Out-of-bounds positions are not an error; they read as air.
    pub fn try_voxel(&mut self) -> VolumeResult<Voxel> {
        self.read(self.pos)
    }

    /// Voxel at an offset from the cursor, air on failure.
    #[inline]
    pub fn peek(&mut self, dx: i32, dy: i32, dz: i32) -> Voxel {
        self.read(self.pos.offset(dx, dy, dz)).unwrap_or(Voxel::AIR)
    }

    /// Voxel at an absolute position, air on failure.
    #[inline]
    pub fn voxel_at(&mut self, pos: WorldPos) -> Voxel {
        self.read(pos).unwrap_or(Voxel::AIR)
    }

    /// Voxel at an absolute position.
    ///
    /// # Errors
    ///
    /// Returns the generation error if the owning chunk cannot be created.
    pub fn try_voxel_at(&mut self, pos: WorldPos) -> VolumeResult<Voxel> {
        self.read(pos)
    }

    fn read(&mut self, pos: WorldPos) -> VolumeResult<Voxel> {
        if !self.volume.in_bounds(pos) {
            return Ok(Voxel::AIR);
        }
        let coord = self.volume.chunk_coord(pos);
        if !matches!(&self.current, Some(handle) if handle.coord() == coord) {
            // Release the old pin before paging in the next chunk.
            self.current = None;
            self.current = Some(self.volume.store.get_or_create(coord)?);
        }
        Ok(self
            .current
            .as_ref()
            .map_or(Voxel::AIR, |handle| handle.read().voxel_at(pos)))
    }
}

impl std::fmt::Debug for Sampler<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("pos", &self.pos)
            .field("chunk", &self.current.as_ref().map(ChunkHandle::coord))
            .finish()
    }
}
