//! Mesh containers handed to the renderer.
//!
//! Positions are relative to the mesh offset (the region's lower corner),
//! so a region's mesh can be uploaded once and translated on the GPU.

use bytemuck::{Pod, Zeroable};
use stratum_volume::WorldPos;

/// Index type of every mesh.
pub type IndexType = u32;

// =============================================================================
// VERTEX FORMAT
// =============================================================================

/// One mesh vertex, tightly packed for upload.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position relative to the mesh offset.
    pub position: [f32; 3],
    /// Face normal.
    pub normal: [f32; 3],
    /// Material tag of the voxel the face belongs to.
    pub material: u32,
    /// Ambient occlusion level, 0 (fully occluded) to 3 (open).
    pub ambient_occlusion: u32,
}

// =============================================================================
// MESH
// =============================================================================

/// Indexed triangle mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<IndexType>,
    offset: WorldPos,
}

impl Mesh {
    /// Creates an empty mesh.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty mesh with reserved storage.
    #[must_use]
    pub fn with_capacity(vertices: usize, indices: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertices),
            indices: Vec::with_capacity(indices),
            offset: WorldPos::ZERO,
        }
    }

    /// Appends a vertex and returns its index.
    pub fn add_vertex(&mut self, vertex: Vertex) -> IndexType {
        debug_assert!(self.vertices.len() < IndexType::MAX as usize);
        self.vertices.push(vertex);
        (self.vertices.len() - 1) as IndexType
    }

    /// Appends a triangle. All indices must refer to existing vertices.
    pub fn add_triangle(&mut self, i0: IndexType, i1: IndexType, i2: IndexType) {
        debug_assert!(
            [i0, i1, i2].iter().all(|&i| (i as usize) < self.vertices.len()),
            "index points at an invalid vertex"
        );
        self.indices.extend_from_slice(&[i0, i1, i2]);
    }

    /// Vertex data.
    #[inline]
    #[must_use]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Index data.
    #[inline]
    #[must_use]
    pub fn indices(&self) -> &[IndexType] {
        &self.indices
    }

    /// Number of vertices.
    #[inline]
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of indices.
    #[inline]
    #[must_use]
    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Number of triangles.
    #[inline]
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// World offset all positions are relative to.
    #[inline]
    #[must_use]
    pub const fn offset(&self) -> WorldPos {
        self.offset
    }

    /// Sets the world offset.
    #[inline]
    pub fn set_offset(&mut self, offset: WorldPos) {
        self.offset = offset;
    }

    /// A mesh without vertices or without indices draws nothing.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    /// Removes all geometry, keeps the offset and the allocation.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    /// Drops vertices no triangle refers to and remaps the indices.
    pub fn remove_unused_vertices(&mut self) {
        let mut remap = vec![IndexType::MAX; self.vertices.len()];
        for &i in &self.indices {
            remap[i as usize] = 0;
        }

        let mut kept = 0;
        for (old, slot) in remap.iter_mut().enumerate() {
            if *slot == 0 {
                *slot = kept;
                self.vertices[kept as usize] = self.vertices[old];
                kept += 1;
            }
        }
        self.vertices.truncate(kept as usize);

        for i in &mut self.indices {
            *i = remap[*i as usize];
        }
    }

    /// Raw vertex bytes for upload.
    #[must_use]
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Raw index bytes for upload.
    #[must_use]
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

// =============================================================================
// EXTRACTION OUTPUT
// =============================================================================

/// The two surfaces extracted from one region.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkMeshes {
    /// Solid terrain.
    pub opaque: Mesh,
    /// Water surface.
    pub water: Mesh,
}

impl ChunkMeshes {
    /// Empty meshes with reserved storage.
    #[must_use]
    pub fn with_capacity(
        opaque_vertices: usize,
        opaque_indices: usize,
        water_vertices: usize,
        water_indices: usize,
    ) -> Self {
        Self {
            opaque: Mesh::with_capacity(opaque_vertices, opaque_indices),
            water: Mesh::with_capacity(water_vertices, water_indices),
        }
    }

    /// True if neither surface has geometry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.opaque.is_empty() && self.water.is_empty()
    }

    /// Sets the offset of both meshes.
    pub fn set_offset(&mut self, offset: WorldPos) {
        self.opaque.set_offset(offset);
        self.water.set_offset(offset);
    }
}

/// A finished extraction pass, ready for the renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractedMeshResult {
    /// Lower corner of the extracted region.
    pub origin: WorldPos,
    /// Opaque and water surfaces.
    pub meshes: ChunkMeshes,
}

impl ExtractedMeshResult {
    /// Solid terrain mesh.
    #[must_use]
    pub fn opaque(&self) -> &Mesh {
        &self.meshes.opaque
    }

    /// Water mesh.
    #[must_use]
    pub fn water(&self) -> &Mesh {
        &self.meshes.water
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32) -> Vertex {
        Vertex {
            position: [x, 0.0, 0.0],
            ..Vertex::default()
        }
    }

    #[test]
    fn test_vertex_layout() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn test_empty_needs_indices() {
        let mut mesh = Mesh::new();
        assert!(mesh.is_empty());
        mesh.add_vertex(vertex(0.0));
        assert!(mesh.is_empty());
        mesh.add_vertex(vertex(1.0));
        mesh.add_vertex(vertex(2.0));
        mesh.add_triangle(0, 1, 2);
        assert!(!mesh.is_empty());
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn test_remove_unused_vertices() {
        let mut mesh = Mesh::new();
        for x in 0..6 {
            mesh.add_vertex(vertex(x as f32));
        }
        mesh.add_triangle(1, 3, 5);
        mesh.add_triangle(5, 3, 1);

        mesh.remove_unused_vertices();

        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.indices(), &[0, 1, 2, 2, 1, 0]);
        assert_eq!(mesh.vertices()[2].position[0], 5.0);
    }

    #[test]
    fn test_clear_keeps_offset() {
        let mut mesh = Mesh::with_capacity(8, 8);
        mesh.set_offset(WorldPos::new(32, 0, -32));
        mesh.add_vertex(vertex(0.0));
        mesh.clear();
        assert_eq!(mesh.vertex_count(), 0);
        assert_eq!(mesh.offset(), WorldPos::new(32, 0, -32));
    }

    #[test]
    fn test_upload_bytes() {
        let mut mesh = Mesh::new();
        mesh.add_vertex(vertex(1.0));
        mesh.add_triangle(0, 0, 0);
        assert_eq!(mesh.vertex_bytes().len(), 32);
        assert_eq!(mesh.index_bytes().len(), 12);
    }
}
