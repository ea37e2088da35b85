//! Voxel value type.
//!
//! A voxel is two bytes: the material tag and a free metadata byte
//! (ambient occlusion hint, colour variant). It is `Pod` so chunk payloads
//! can be cast straight to bytes for persistence.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Material tag of a voxel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum VoxelType {
    /// Empty space.
    #[default]
    Air = 0,
    /// Water - visible, not blocking.
    Water = 1,
    /// Grass surface.
    Grass = 2,
    /// Dirt below the surface.
    Dirt = 3,
    /// Sand (beaches, sea floor).
    Sand = 4,
    /// Rock / stone.
    Rock = 5,
    /// Tree trunk.
    Wood = 6,
    /// Foliage.
    Leaf = 7,
    /// Flowers and small plants.
    Flower = 8,
    /// Cloud volume.
    Clouds = 9,
    /// Anything placed by tools without a dedicated material.
    Generic = 10,
}

impl VoxelType {
    /// Every material, in tag order.
    pub const ALL: [Self; 11] = [
        Self::Air,
        Self::Water,
        Self::Grass,
        Self::Dirt,
        Self::Sand,
        Self::Rock,
        Self::Wood,
        Self::Leaf,
        Self::Flower,
        Self::Clouds,
        Self::Generic,
    ];

    /// Converts a raw tag; unknown tags map to `Generic`.
    #[inline]
    #[must_use]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Air,
            1 => Self::Water,
            2 => Self::Grass,
            3 => Self::Dirt,
            4 => Self::Sand,
            5 => Self::Rock,
            6 => Self::Wood,
            7 => Self::Leaf,
            8 => Self::Flower,
            9 => Self::Clouds,
            _ => Self::Generic,
        }
    }

    /// Returns true for empty space.
    #[inline]
    #[must_use]
    pub const fn is_air(self) -> bool {
        matches!(self, Self::Air)
    }

    /// Returns true for water.
    #[inline]
    #[must_use]
    pub const fn is_water(self) -> bool {
        matches!(self, Self::Water)
    }

    /// Returns true if the material stops movement and rays.
    #[inline]
    #[must_use]
    pub const fn is_blocked(self) -> bool {
        !matches!(self, Self::Air | Self::Water)
    }

    /// Returns true if something can stand on top of this material.
    #[inline]
    #[must_use]
    pub const fn is_floor(self) -> bool {
        self.is_blocked() && !matches!(self, Self::Leaf | Self::Clouds)
    }
}

/// A single voxel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct Voxel {
    /// Raw material tag, see [`VoxelType`].
    material: u8,
    /// Metadata byte (ambient occlusion hint, colour index).
    meta: u8,
}

impl Voxel {
    /// Empty voxel.
    pub const AIR: Self = Self::new(VoxelType::Air, 0);

    /// Creates a voxel with the given material and metadata.
    #[inline]
    #[must_use]
    pub const fn new(material: VoxelType, meta: u8) -> Self {
        Self {
            material: material as u8,
            meta,
        }
    }

    /// Creates a voxel of the given material with zero metadata.
    #[inline]
    #[must_use]
    pub const fn of(material: VoxelType) -> Self {
        Self::new(material, 0)
    }

    /// Material tag.
    #[inline]
    #[must_use]
    pub const fn material(self) -> VoxelType {
        VoxelType::from_u8(self.material)
    }

    /// Metadata byte.
    #[inline]
    #[must_use]
    pub const fn meta(self) -> u8 {
        self.meta
    }

    /// Returns true if this is empty space.
    #[inline]
    #[must_use]
    pub const fn is_air(self) -> bool {
        self.material().is_air()
    }

    /// Returns true if this voxel blocks movement.
    #[inline]
    #[must_use]
    pub const fn is_blocked(self) -> bool {
        self.material().is_blocked()
    }
}
