//! Grid and ray math shared by every layer.
//!
//! `WorldPos` is the canonical integer voxel coordinate. `Vec3` is only used
//! for ray origins and directions.

use serde::{Deserialize, Serialize};

/// Integer voxel position in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorldPos {
    /// X component
    pub x: i32,
    /// Y component (up)
    pub y: i32,
    /// Z component
    pub z: i32,
}

impl WorldPos {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// The origin.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// Converts to array.
    #[inline]
    #[must_use]
    pub const fn to_array(self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }

    /// Creates from array.
    #[inline]
    #[must_use]
    pub const fn from_array(arr: [i32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    /// Offsets the position by the given deltas.
    #[inline]
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Component-wise Euclidean division (floors toward negative infinity).
    #[inline]
    #[must_use]
    pub const fn div_euclid(self, x: i32, y: i32, z: i32) -> Self {
        Self::new(self.x.div_euclid(x), self.y.div_euclid(y), self.z.div_euclid(z))
    }

    /// Component-wise minimum.
    #[inline]
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Component-wise maximum.
    #[inline]
    #[must_use]
    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    /// Largest absolute component difference (chessboard distance).
    #[inline]
    #[must_use]
    pub fn chebyshev_distance(self, other: Self) -> u32 {
        let d = self.abs_diff(other);
        d[0].max(d[1]).max(d[2])
    }

    /// Absolute per-axis differences.
    #[inline]
    #[must_use]
    pub fn abs_diff(self, other: Self) -> [u32; 3] {
        [
            self.x.abs_diff(other.x),
            self.y.abs_diff(other.y),
            self.z.abs_diff(other.z),
        ]
    }

    /// Center of the voxel as a float vector.
    #[inline]
    #[must_use]
    pub fn center(self) -> Vec3 {
        Vec3::new(self.x as f32 + 0.5, self.y as f32 + 0.5, self.z as f32 + 0.5)
    }
}

impl std::ops::Add for WorldPos {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for WorldPos {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::fmt::Display for WorldPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.x, self.y, self.z)
    }
}

impl From<[i32; 3]> for WorldPos {
    fn from(arr: [i32; 3]) -> Self {
        Self::from_array(arr)
    }
}

/// 3D float vector - ray origins and directions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit vector in the same direction, or zero for a zero vector.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON {
            Self::ZERO
        } else {
            self * (1.0 / len)
        }
    }

    /// The voxel containing this point.
    #[must_use]
    pub fn floor(self) -> WorldPos {
        WorldPos::new(self.x.floor() as i32, self.y.floor() as i32, self.z.floor() as i32)
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(arr: [f32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_div_euclid_negative() {
        let p = WorldPos::new(-1, -16, -17);
        assert_eq!(p.div_euclid(16, 16, 16), WorldPos::new(-1, -1, -2));
    }

    #[test]
    fn test_chebyshev() {
        let a = WorldPos::new(0, 0, 0);
        let b = WorldPos::new(3, -7, 2);
        assert_eq!(a.chebyshev_distance(b), 7);
    }

    #[test]
    fn test_vec_floor() {
        assert_eq!(Vec3::new(-0.5, 1.2, 3.99).floor(), WorldPos::new(-1, 1, 3));
    }
}
