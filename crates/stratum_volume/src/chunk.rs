//! # Chunk Payloads
//!
//! World data is organized into cubic chunks whose side length is a power
//! of two, so world-to-chunk conversion is a shift and world-to-local is a
//! mask.
//!
//! ## Storage
//!
//! Voxels are stored in Z-Y-X order in one contiguous boxed slice.
//! For persistence the slice is cast to bytes and LZ4-compressed.

use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use crate::error::PersistenceError;
use crate::math::WorldPos;
use crate::region::Region;
use crate::voxel::Voxel;

/// Chunk coordinate (identifies a chunk in the world grid).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkCoord {
    /// X coordinate (in chunks, not voxels).
    pub x: i32,
    /// Y coordinate (in chunks).
    pub y: i32,
    /// Z coordinate (in chunks).
    pub z: i32,
}

impl ChunkCoord {
    /// Creates a new chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk containing a world position, for chunks of side `1 << shift`.
    ///
    /// Arithmetic shift floors toward negative infinity, so `-1` lands in
    /// chunk `-1`.
    #[inline]
    #[must_use]
    pub const fn from_world_pos(pos: WorldPos, shift: u32) -> Self {
        Self::new(pos.x >> shift, pos.y >> shift, pos.z >> shift)
    }

    /// World position of the chunk's lower corner.
    #[inline]
    #[must_use]
    pub const fn origin(self, shift: u32) -> WorldPos {
        WorldPos::new(self.x << shift, self.y << shift, self.z << shift)
    }

    /// World-space region covered by the chunk.
    #[must_use]
    pub fn region(self, shift: u32) -> Region {
        let side = 1u32 << shift;
        Region::from_origin(self.origin(shift), [side; 3])
    }
}

impl std::fmt::Display for ChunkCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.x, self.y, self.z)
    }
}

/// Largest supported chunk side, as a shift (256 voxels).
pub const MAX_CHUNK_SHIFT: u32 = 8;

/// Returns the shift for a power-of-two side length of at most
/// `1 << MAX_CHUNK_SHIFT`, `None` otherwise.
#[must_use]
pub fn side_shift(side: u32) -> Option<u32> {
    let shift = side.trailing_zeros();
    (side.is_power_of_two() && shift <= MAX_CHUNK_SHIFT).then_some(shift)
}

/// A cubic block of voxels.
#[derive(Clone)]
pub struct Chunk {
    /// Chunk position in the world.
    coord: ChunkCoord,
    /// log2 of the side length.
    shift: u32,
    /// Voxel data, indexed as `z * side * side + y * side + x`.
    voxels: Box<[Voxel]>,
    /// Whether this chunk has been modified since it was generated or loaded.
    dirty: bool,
    /// Number of non-air voxels.
    solid_count: u32,
}

impl Chunk {
    /// Creates an all-air chunk.
    ///
    /// `shift` is log2 of the side length.
    #[must_use]
    pub fn new(coord: ChunkCoord, shift: u32) -> Self {
        let side = 1usize << shift;
        Self {
            coord,
            shift,
            voxels: vec![Voxel::AIR; side * side * side].into_boxed_slice(),
            dirty: false,
            solid_count: 0,
        }
    }

    /// Chunk coordinate.
    #[inline]
    #[must_use]
    pub const fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Side length in voxels.
    #[inline]
    #[must_use]
    pub const fn side(&self) -> u32 {
        1 << self.shift
    }

    /// log2 of the side length.
    #[inline]
    #[must_use]
    pub const fn shift(&self) -> u32 {
        self.shift
    }

    /// World position of the lower corner.
    #[inline]
    #[must_use]
    pub const fn origin(&self) -> WorldPos {
        self.coord.origin(self.shift)
    }

    /// Returns true if the chunk was written since generation/load.
    #[inline]
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears the dirty flag (after a successful save).
    #[inline]
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Returns true if the chunk holds nothing but air.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.solid_count == 0
    }

    /// Number of non-air voxels.
    #[inline]
    #[must_use]
    pub const fn solid_count(&self) -> u32 {
        self.solid_count
    }

    /// Bytes of voxel payload held by a chunk of side `1 << shift`.
    #[must_use]
    pub const fn payload_bytes(shift: u32) -> usize {
        (1usize << (3 * shift)) * std::mem::size_of::<Voxel>()
    }

    #[inline]
    fn index(&self, x: u32, y: u32, z: u32) -> usize {
        debug_assert!(x < self.side() && y < self.side() && z < self.side());
        ((z as usize) << (2 * self.shift)) | ((y as usize) << self.shift) | x as usize
    }

    #[inline]
    fn local(&self, pos: WorldPos) -> (u32, u32, u32) {
        let mask = self.side() as i32 - 1;
        ((pos.x & mask) as u32, (pos.y & mask) as u32, (pos.z & mask) as u32)
    }

    /// Gets a voxel at local coordinates; out-of-range yields air.
    #[inline]
    #[must_use]
    pub fn get(&self, x: u32, y: u32, z: u32) -> Voxel {
        let side = self.side();
        if x < side && y < side && z < side {
            self.voxels[self.index(x, y, z)]
        } else {
            Voxel::AIR
        }
    }

    /// Gets the voxel at a world position, which must lie in this chunk.
    #[inline]
    #[must_use]
    pub fn voxel_at(&self, pos: WorldPos) -> Voxel {
        debug_assert_eq!(ChunkCoord::from_world_pos(pos, self.shift), self.coord);
        let (x, y, z) = self.local(pos);
        self.get(x, y, z)
    }

    /// Sets a voxel at local coordinates and marks the chunk dirty.
    ///
    /// Out-of-range coordinates are ignored.
    #[inline]
    pub fn set(&mut self, x: u32, y: u32, z: u32, voxel: Voxel) {
        self.write(x, y, z, voxel);
        self.dirty = true;
    }

    /// Sets the voxel at a world position, which must lie in this chunk.
    #[inline]
    pub fn set_voxel_at(&mut self, pos: WorldPos, voxel: Voxel) {
        debug_assert_eq!(ChunkCoord::from_world_pos(pos, self.shift), self.coord);
        let (x, y, z) = self.local(pos);
        self.set(x, y, z, voxel);
    }

    /// Fills local coordinates without touching the dirty flag.
    ///
    /// Generators use this so a freshly generated chunk starts clean.
    #[inline]
    pub fn fill(&mut self, x: u32, y: u32, z: u32, voxel: Voxel) {
        self.write(x, y, z, voxel);
    }

    fn write(&mut self, x: u32, y: u32, z: u32, voxel: Voxel) {
        let side = self.side();
        if x >= side || y >= side || z >= side {
            return;
        }
        let idx = self.index(x, y, z);
        let old = std::mem::replace(&mut self.voxels[idx], voxel);
        match (old.is_air(), voxel.is_air()) {
            (true, false) => self.solid_count += 1,
            (false, true) => self.solid_count -= 1,
            _ => {}
        }
    }

    /// Serializes the voxel payload into an LZ4 block (size prepended).
    #[must_use]
    pub fn to_compressed(&self) -> Vec<u8> {
        compress_prepend_size(bytemuck::cast_slice::<Voxel, u8>(&self.voxels))
    }

    /// Restores a chunk from an LZ4 block produced by [`Chunk::to_compressed`].
    ///
    /// # Errors
    ///
    /// Returns `PersistenceError::Corrupt` if decompression fails or the
    /// payload size does not match the side length.
    pub fn from_compressed(
        coord: ChunkCoord,
        shift: u32,
        data: &[u8],
    ) -> Result<Self, PersistenceError> {
        let raw = decompress_size_prepended(data).map_err(|e| PersistenceError::Corrupt {
            coord,
            reason: e.to_string(),
        })?;
        if raw.len() != Self::payload_bytes(shift) {
            return Err(PersistenceError::Corrupt {
                coord,
                reason: format!(
                    "payload is {} bytes, expected {}",
                    raw.len(),
                    Self::payload_bytes(shift)
                ),
            });
        }

        let mut chunk = Self::new(coord, shift);
        // Voxel has alignment 1, so the byte slice can be reinterpreted directly.
        let voxels: &[Voxel] = bytemuck::cast_slice(&raw);
        let mut solid = 0;
        for (dst, src) in chunk.voxels.iter_mut().zip(voxels) {
            *dst = *src;
            if !src.is_air() {
                solid += 1;
            }
        }
        chunk.solid_count = solid;
        Ok(chunk)
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("coord", &self.coord)
            .field("side", &self.side())
            .field("dirty", &self.dirty)
            .field("solid_count", &self.solid_count)
            .finish()
    }
}
