//! Axis-aligned integer boxes.
//!
//! A `Region` is the unit of mesh extraction. It is independent of the
//! storage chunk size: one region may cover several chunks.

use crate::math::WorldPos;

/// Inclusive axis-aligned bounding box over voxel positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    lower: WorldPos,
    upper: WorldPos,
}

impl Region {
    /// Creates a region from two corners; the corners are sorted per axis.
    #[must_use]
    pub fn new(a: WorldPos, b: WorldPos) -> Self {
        Self {
            lower: a.min(b),
            upper: a.max(b),
        }
    }

    /// Region of the given size starting at `origin`.
    ///
    /// Sizes of zero are treated as one. The upper corner saturates at the
    /// edge of the coordinate space.
    #[must_use]
    pub fn from_origin(origin: WorldPos, size: [u32; 3]) -> Self {
        let extent = |s: u32| (s.max(1) - 1).min(i32::MAX as u32) as i32;
        Self {
            lower: origin,
            upper: WorldPos::new(
                origin.x.saturating_add(extent(size[0])),
                origin.y.saturating_add(extent(size[1])),
                origin.z.saturating_add(extent(size[2])),
            ),
        }
    }

    /// Snaps a world position onto a fixed-size grid and returns the cell's
    /// lower corner.
    #[inline]
    #[must_use]
    pub fn snap(pos: WorldPos, size: [u32; 3]) -> WorldPos {
        let [sx, sy, sz] = size.map(|s| s.max(1) as i32);
        let cell = pos.div_euclid(sx, sy, sz);
        WorldPos::new(cell.x * sx, cell.y * sy, cell.z * sz)
    }

    /// Lower corner (inclusive).
    #[inline]
    #[must_use]
    pub const fn lower(&self) -> WorldPos {
        self.lower
    }

    /// Upper corner (inclusive).
    #[inline]
    #[must_use]
    pub const fn upper(&self) -> WorldPos {
        self.upper
    }

    /// Width along X in voxels.
    #[inline]
    #[must_use]
    pub fn width_in_voxels(&self) -> u32 {
        self.upper.x.abs_diff(self.lower.x) + 1
    }

    /// Height along Y in voxels.
    #[inline]
    #[must_use]
    pub fn height_in_voxels(&self) -> u32 {
        self.upper.y.abs_diff(self.lower.y) + 1
    }

    /// Depth along Z in voxels.
    #[inline]
    #[must_use]
    pub fn depth_in_voxels(&self) -> u32 {
        self.upper.z.abs_diff(self.lower.z) + 1
    }

    /// Total voxel count.
    #[must_use]
    pub fn volume(&self) -> u64 {
        u64::from(self.width_in_voxels())
            * u64::from(self.height_in_voxels())
            * u64::from(self.depth_in_voxels())
    }

    /// Returns true if the position lies inside the region.
    #[inline]
    #[must_use]
    pub fn contains(&self, pos: WorldPos) -> bool {
        pos.x >= self.lower.x
            && pos.y >= self.lower.y
            && pos.z >= self.lower.z
            && pos.x <= self.upper.x
            && pos.y <= self.upper.y
            && pos.z <= self.upper.z
    }

    /// Returns true if the two regions share at least one voxel.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.lower.x <= other.upper.x
            && self.upper.x >= other.lower.x
            && self.lower.y <= other.upper.y
            && self.upper.y >= other.lower.y
            && self.lower.z <= other.upper.z
            && self.upper.z >= other.lower.z
    }

    /// Grows the region so it also covers `other`.
    pub fn accumulate(&mut self, other: &Self) {
        self.lower = self.lower.min(other.lower);
        self.upper = self.upper.max(other.upper);
    }

    /// Clamps a position into the region.
    #[must_use]
    pub fn clamp(&self, pos: WorldPos) -> WorldPos {
        pos.max(self.lower).min(self.upper)
    }

    /// Iterates every position, X fastest, then Z, then Y.
    pub fn positions(&self) -> impl Iterator<Item = WorldPos> + '_ {
        let (lo, hi) = (self.lower, self.upper);
        (lo.y..=hi.y).flat_map(move |y| {
            (lo.z..=hi.z).flat_map(move |z| (lo.x..=hi.x).map(move |x| WorldPos::new(x, y, z)))
        })
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} .. {}]", self.lower, self.upper)
    }
}
