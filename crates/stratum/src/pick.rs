//! # Ray Picking
//!
//! Voxel traversal (Amanatides and Woo) through a [`VoxelVolume`]. The walk
//! visits every voxel the ray passes through, in order, and hands each one
//! to a callback through a [`Sampler`] positioned on it.

use stratum_volume::{Sampler, Vec3, Voxel, VoxelVolume, WorldPos};

/// How a raycast ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RaycastResult {
    /// The ray reached its full length.
    Completed,
    /// The callback stopped the walk.
    Interrupted,
}

/// Outcome of [`pick_voxel`].
///
/// A miss is [`PickResult::MISS`]; check [`PickResult::did_hit`] before
/// using the positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PickResult {
    /// First non-air voxel on the ray.
    pub hit: Option<WorldPos>,
    /// The voxel visited just before the hit, where a new voxel would go.
    pub previous: Option<WorldPos>,
    /// Content of the hit voxel, air on a miss.
    pub voxel: Voxel,
}

impl PickResult {
    /// Nothing was hit.
    pub const MISS: Self = Self {
        hit: None,
        previous: None,
        voxel: Voxel::AIR,
    };

    /// True if the ray hit something.
    #[inline]
    #[must_use]
    pub const fn did_hit(&self) -> bool {
        self.hit.is_some()
    }
}

/// Walks the ray from `start` along `direction_and_length`.
///
/// The callback sees each voxel in traversal order, starting with the one
/// containing `start`, and returns false to stop. A zero or non-finite
/// direction visits only the start voxel.
pub fn raycast_with_direction(
    volume: &VoxelVolume,
    start: Vec3,
    direction_and_length: Vec3,
    mut callback: impl FnMut(&mut Sampler<'_>) -> bool,
) -> RaycastResult {
    let mut sampler = volume.sampler();
    let mut cell = start.floor();
    sampler.set_position(cell);
    if !callback(&mut sampler) {
        return RaycastResult::Interrupted;
    }

    let length = direction_and_length.length();
    if !length.is_finite() || length <= f32::EPSILON || !start.length().is_finite() {
        return RaycastResult::Completed;
    }

    let dir = direction_and_length.normalized().to_array();
    let origin = start.to_array();
    let mut pos = cell.to_array();
    let mut step = [0i32; 3];
    let mut t_max = [f32::INFINITY; 3];
    let mut t_delta = [f32::INFINITY; 3];

    for axis in 0..3 {
        if dir[axis] > 0.0 {
            step[axis] = 1;
            t_delta[axis] = 1.0 / dir[axis];
            t_max[axis] = (pos[axis] as f32 + 1.0 - origin[axis]) * t_delta[axis];
        } else if dir[axis] < 0.0 {
            step[axis] = -1;
            t_delta[axis] = -1.0 / dir[axis];
            t_max[axis] = (origin[axis] - pos[axis] as f32) * t_delta[axis];
        }
    }

    loop {
        let axis = if t_max[0] < t_max[1] {
            if t_max[0] < t_max[2] {
                0
            } else {
                2
            }
        } else if t_max[1] < t_max[2] {
            1
        } else {
            2
        };
        if t_max[axis] > length {
            return RaycastResult::Completed;
        }

        pos[axis] += step[axis];
        t_max[axis] += t_delta[axis];
        cell = WorldPos::from_array(pos);
        sampler.set_position(cell);
        if !callback(&mut sampler) {
            return RaycastResult::Interrupted;
        }
    }
}

/// Returns the first non-air voxel along the ray, or [`PickResult::MISS`].
#[must_use]
pub fn pick_voxel(volume: &VoxelVolume, origin: Vec3, direction_and_length: Vec3) -> PickResult {
    let mut result = PickResult::MISS;
    let mut previous = None;
    raycast_with_direction(volume, origin, direction_and_length, |sampler| {
        let voxel = sampler.voxel();
        if voxel.is_air() {
            previous = Some(sampler.position());
            return true;
        }
        result = PickResult {
            hit: Some(sampler.position()),
            previous,
            voxel,
        };
        false
    });
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stratum_volume::{ChunkStore, FlatGenerator, VoxelType, WorldContext};

    fn volume(ground: i32) -> VoxelVolume {
        let generator = Arc::new(FlatGenerator::new(ground, VoxelType::Rock));
        let store = ChunkStore::new(4, 1 << 24, WorldContext::default(), generator);
        VoxelVolume::new(Arc::new(store)).with_height(64)
    }

    #[test]
    fn test_all_air_is_a_miss() {
        let result = pick_voxel(&volume(0), Vec3::new(0.5, 10.5, 0.5), Vec3::new(20.0, 0.0, 0.0));
        assert_eq!(result, PickResult::MISS);
        assert!(!result.did_hit());
    }

    #[test]
    fn test_hits_known_voxel() {
        let volume = volume(0);
        volume.set_voxel(WorldPos::new(7, 10, 0), Voxel::of(VoxelType::Wood)).unwrap();

        let result = pick_voxel(&volume, Vec3::new(0.5, 10.5, 0.5), Vec3::new(20.0, 0.0, 0.0));
        assert_eq!(result.hit, Some(WorldPos::new(7, 10, 0)));
        assert_eq!(result.previous, Some(WorldPos::new(6, 10, 0)));
        assert_eq!(result.voxel.material(), VoxelType::Wood);
    }

    #[test]
    fn test_stops_at_length() {
        let volume = volume(0);
        volume.set_voxel(WorldPos::new(7, 10, 0), Voxel::of(VoxelType::Wood)).unwrap();
        let result = pick_voxel(&volume, Vec3::new(0.5, 10.5, 0.5), Vec3::new(5.0, 0.0, 0.0));
        assert!(!result.did_hit());
    }

    #[test]
    fn test_looking_down_hits_ground() {
        let result = pick_voxel(&volume(4), Vec3::new(-3.5, 20.5, 8.5), Vec3::new(0.0, -30.0, 0.0));
        assert_eq!(result.hit, Some(WorldPos::new(-4, 3, 8)));
    }

    #[test]
    fn test_traversal_is_face_connected() {
        let volume = volume(0);
        let mut visited = Vec::new();
        let start = Vec3::new(0.2, 0.7, 0.4);
        let result = raycast_with_direction(&volume, start, Vec3::new(6.0, 3.0, -2.0), |s| {
            visited.push(s.position());
            true
        });
        assert_eq!(result, RaycastResult::Completed);
        assert_eq!(visited[0], WorldPos::new(0, 0, 0));
        assert!(visited.windows(2).all(|w| {
            let d = w[0].abs_diff(w[1]);
            d.iter().sum::<u32>() == 1
        }));
    }

    #[test]
    fn test_callback_interrupts() {
        let volume = volume(0);
        let mut count = 0;
        let result = raycast_with_direction(&volume, Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), |_| {
            count += 1;
            count < 3
        });
        assert_eq!(result, RaycastResult::Interrupted);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_zero_direction_visits_start_only() {
        let volume = volume(0);
        let mut count = 0;
        raycast_with_direction(&volume, Vec3::new(1.5, 1.5, 1.5), Vec3::ZERO, |_| {
            count += 1;
            true
        });
        assert_eq!(count, 1);
    }
}
