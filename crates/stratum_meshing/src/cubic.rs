//! # Cubic Surface Extraction
//!
//! Emits one quad per visible voxel face. Which faces are visible is decided
//! by a [`QuadPredicate`] looking at the voxel behind the face and the voxel
//! in front of it, so the same walk produces the opaque terrain surface and
//! the water surface with different rules.
//!
//! Every vertex carries an ambient occlusion level computed from the three
//! voxels touching its corner on the open side of the face. Quads are split
//! along the diagonal that keeps the occlusion gradient symmetric.
//!
//! Neighbours outside the region are sampled from the volume, so seams
//! between regions are closed.

use std::sync::Arc;

use stratum_volume::{Region, Sampler, Voxel, VoxelVolume, WorldPos};

use crate::error::ExtractionError;
use crate::mesh::{ChunkMeshes, Mesh, Vertex};

// =============================================================================
// FACES
// =============================================================================

/// The six axis-aligned face directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    /// -X
    NegativeX,
    /// +X
    PositiveX,
    /// -Y
    NegativeY,
    /// +Y
    PositiveY,
    /// -Z
    NegativeZ,
    /// +Z
    PositiveZ,
}

impl Face {
    /// All faces.
    pub const ALL: [Self; 6] = [
        Self::NegativeX,
        Self::PositiveX,
        Self::NegativeY,
        Self::PositiveY,
        Self::NegativeZ,
        Self::PositiveZ,
    ];

    /// Axis index (0 = X, 1 = Y, 2 = Z).
    #[inline]
    #[must_use]
    pub const fn axis(self) -> usize {
        match self {
            Self::NegativeX | Self::PositiveX => 0,
            Self::NegativeY | Self::PositiveY => 1,
            Self::NegativeZ | Self::PositiveZ => 2,
        }
    }

    /// True for the +X, +Y and +Z faces.
    #[inline]
    #[must_use]
    pub const fn is_positive(self) -> bool {
        matches!(self, Self::PositiveX | Self::PositiveY | Self::PositiveZ)
    }

    /// Unit normal.
    #[inline]
    #[must_use]
    pub const fn normal(self) -> [i32; 3] {
        match self {
            Self::NegativeX => [-1, 0, 0],
            Self::PositiveX => [1, 0, 0],
            Self::NegativeY => [0, -1, 0],
            Self::PositiveY => [0, 1, 0],
            Self::NegativeZ => [0, 0, -1],
            Self::PositiveZ => [0, 0, 1],
        }
    }
}

// =============================================================================
// QUAD RULES
// =============================================================================

/// Decides whether the face between `back` and `front` gets a quad.
pub trait QuadPredicate: Send + Sync {
    /// `back` owns the face, `front` is the neighbour it faces.
    fn is_quad_needed(&self, back: Voxel, front: Voxel, face: Face) -> bool;
}

/// Solid terrain: a blocked voxel facing air or water.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpaqueQuads;

impl QuadPredicate for OpaqueQuads {
    fn is_quad_needed(&self, back: Voxel, front: Voxel, _face: Face) -> bool {
        back.is_blocked() && !front.is_blocked()
    }
}

/// Water surface: water facing air.
#[derive(Clone, Copy, Debug, Default)]
pub struct WaterQuads;

impl QuadPredicate for WaterQuads {
    fn is_quad_needed(&self, back: Voxel, front: Voxel, _face: Face) -> bool {
        back.material().is_water() && front.is_air()
    }
}

/// Predicates and limits for one extraction pass.
#[derive(Clone)]
pub struct QuadRules {
    /// Rule for the opaque mesh.
    pub opaque: Arc<dyn QuadPredicate>,
    /// Rule for the water mesh.
    pub water: Arc<dyn QuadPredicate>,
    /// Water faces are only emitted for voxels at or below this height.
    pub water_height: i32,
}

impl QuadRules {
    /// Default rules with the given water height.
    #[must_use]
    pub fn with_water_height(water_height: i32) -> Self {
        Self {
            opaque: Arc::new(OpaqueQuads),
            water: Arc::new(WaterQuads),
            water_height,
        }
    }
}

impl std::fmt::Debug for QuadRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuadRules")
            .field("water_height", &self.water_height)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// EXTRACTOR
// =============================================================================

/// Surface extraction collaborator.
///
/// Must be a pure function of the sampled voxels: no shared state is
/// written, so several workers can run it at once.
pub trait SurfaceExtractor: Send + Sync {
    /// Appends the surfaces of `region` to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the volume cannot be sampled.
    fn extract(
        &self,
        volume: &VoxelVolume,
        region: Region,
        rules: &QuadRules,
        out: &mut ChunkMeshes,
    ) -> Result<(), ExtractionError>;
}

/// One quad per visible face, with per-vertex ambient occlusion.
#[derive(Clone, Copy, Debug, Default)]
pub struct CubicSurfaceExtractor;

impl CubicSurfaceExtractor {
    /// Creates the extractor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Reads through a sampler and turns failures into extraction errors.
struct RegionReader<'s, 'v> {
    sampler: &'s mut Sampler<'v>,
    region: Region,
}

impl RegionReader<'_, '_> {
    #[inline]
    fn voxel(&mut self, pos: WorldPos) -> Result<Voxel, ExtractionError> {
        self.sampler
            .try_voxel_at(pos)
            .map_err(|source| ExtractionError::Volume {
                region: self.region,
                source,
            })
    }

    #[inline]
    fn blocked(&mut self, pos: WorldPos) -> Result<u32, ExtractionError> {
        Ok(u32::from(self.voxel(pos)?.is_blocked()))
    }
}

/// Offsets a position by an axis vector scaled by `k`.
#[inline]
fn step(pos: WorldPos, axis: usize, k: i32) -> WorldPos {
    let mut a = pos.to_array();
    a[axis] += k;
    WorldPos::from_array(a)
}

/// Classic vertex occlusion: 0 when both sides are solid, else 3 minus the
/// number of solid neighbours.
#[inline]
const fn occlusion(side1: u32, side2: u32, corner: u32) -> u32 {
    if side1 == 1 && side2 == 1 {
        0
    } else {
        3 - (side1 + side2 + corner)
    }
}

impl CubicSurfaceExtractor {
    fn emit_quad(
        reader: &mut RegionReader<'_, '_>,
        mesh: &mut Mesh,
        pos: WorldPos,
        back: Voxel,
        face: Face,
    ) -> Result<(), ExtractionError> {
        let axis = face.axis();
        let u = (axis + 1) % 3;
        let v = (axis + 2) % 3;
        let normal = face.normal();
        let front = WorldPos::new(pos.x + normal[0], pos.y + normal[1], pos.z + normal[2]);
        let origin = reader.region.lower();

        // Corners in (u, v) order, counter-clockwise seen from outside.
        let mut corners = [(0, 0), (1, 0), (1, 1), (0, 1)];
        if !face.is_positive() {
            corners.reverse();
        }

        let mut ao = [0u32; 4];
        let mut vertices = [Vertex::default(); 4];
        for (i, &(cu, cv)) in corners.iter().enumerate() {
            let du = if cu == 1 { 1 } else { -1 };
            let dv = if cv == 1 { 1 } else { -1 };
            let side1 = reader.blocked(step(front, u, du))?;
            let side2 = reader.blocked(step(front, v, dv))?;
            let corner = reader.blocked(step(step(front, u, du), v, dv))?;
            ao[i] = occlusion(side1, side2, corner);

            let mut p = [
                (pos.x - origin.x) as f32,
                (pos.y - origin.y) as f32,
                (pos.z - origin.z) as f32,
            ];
            if face.is_positive() {
                p[axis] += 1.0;
            }
            p[u] += cu as f32;
            p[v] += cv as f32;

            vertices[i] = Vertex {
                position: p,
                normal: normal.map(|n| n as f32),
                material: u32::from(back.material() as u8),
                ambient_occlusion: ao[i],
            };
        }

        let base = vertices.map(|vertex| mesh.add_vertex(vertex));
        if ao[0] + ao[2] >= ao[1] + ao[3] {
            mesh.add_triangle(base[0], base[1], base[2]);
            mesh.add_triangle(base[0], base[2], base[3]);
        } else {
            mesh.add_triangle(base[1], base[2], base[3]);
            mesh.add_triangle(base[1], base[3], base[0]);
        }
        Ok(())
    }
}

impl SurfaceExtractor for CubicSurfaceExtractor {
    fn extract(
        &self,
        volume: &VoxelVolume,
        region: Region,
        rules: &QuadRules,
        out: &mut ChunkMeshes,
    ) -> Result<(), ExtractionError> {
        let mut sampler = volume.sampler();
        let mut reader = RegionReader {
            sampler: &mut sampler,
            region,
        };

        for pos in region.positions() {
            let back = reader.voxel(pos)?;
            if back.is_air() {
                continue;
            }
            let water_pass = pos.y <= rules.water_height;
            for face in Face::ALL {
                let n = face.normal();
                let front = reader.voxel(pos.offset(n[0], n[1], n[2]))?;
                if rules.opaque.is_quad_needed(back, front, face) {
                    Self::emit_quad(&mut reader, &mut out.opaque, pos, back, face)?;
                }
                if water_pass && rules.water.is_quad_needed(back, front, face) {
                    Self::emit_quad(&mut reader, &mut out.water, pos, back, face)?;
                }
            }
        }

        out.set_offset(region.lower());
        Ok(())
    }
}
