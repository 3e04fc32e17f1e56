//! Mesh Data
//!
//! CPU-side vertex/index arrays as delivered by the mesh loader. Decoding is the
//! loader's business; the renderer only checks that the arrays are consistent.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::errors::{PrismError, Result};

/// Interleaved vertex as consumed by the scene and skybox pipelines.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
    pub texcoord: [f32; 2],
}

impl Vertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 5] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
        2 => Float32x3,
        3 => Float32x3,
        4 => Float32x2,
    ];

    pub const STRIDE: u64 = std::mem::size_of::<Self>() as u64;

    #[must_use]
    pub fn new(position: Vec3, normal: Vec3, tangent: Vec3, bitangent: Vec3, texcoord: Vec2) -> Self {
        Self {
            position: position.to_array(),
            normal: normal.to_array(),
            tangent: tangent.to_array(),
            bitangent: bitangent.to_array(),
            texcoord: texcoord.to_array(),
        }
    }
}

/// A flat triangle list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    #[must_use]
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Rejects empty meshes, partial triangles and out-of-range indices.
    pub fn validate(&self, name: &str) -> Result<()> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(PrismError::invalid_asset(name, "mesh has no geometry"));
        }
        if self.indices.len() % 3 != 0 {
            return Err(PrismError::invalid_asset(
                name,
                format!("{} indices do not form whole triangles", self.indices.len()),
            ));
        }
        let count = self.vertices.len() as u32;
        if let Some(bad) = self.indices.iter().find(|&&i| i >= count) {
            return Err(PrismError::invalid_asset(
                name,
                format!("index {bad} out of range for {count} vertices"),
            ));
        }
        Ok(())
    }

    /// A unit cube centred on the origin, faces wound to be seen from inside
    /// and outside alike when culling is disabled.
    #[must_use]
    pub fn unit_cube() -> Self {
        // (normal, tangent) per face
        const FACES: [(Vec3, Vec3); 6] = [
            (Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_X, Vec3::Z),
            (Vec3::Y, Vec3::X),
            (Vec3::NEG_Y, Vec3::X),
            (Vec3::Z, Vec3::X),
            (Vec3::NEG_Z, Vec3::NEG_X),
        ];
        const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (normal, tangent) in FACES {
            let bitangent = normal.cross(tangent);
            let base = vertices.len() as u32;
            for (u, v) in CORNERS {
                let position = normal + tangent * u + bitangent * v;
                let texcoord = Vec2::new((u + 1.0) * 0.5, 1.0 - (v + 1.0) * 0.5);
                vertices.push(Vertex::new(position, normal, tangent, bitangent, texcoord));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self { vertices, indices }
    }

    #[inline]
    #[must_use]
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    #[inline]
    #[must_use]
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(Vertex::STRIDE, 56);
    }

    #[test]
    fn unit_cube_is_valid() {
        let cube = MeshData::unit_cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        cube.validate("cube").unwrap();
        for v in &cube.vertices {
            assert!(v.position.iter().all(|c| c.abs() == 1.0));
        }
    }

    #[test]
    fn out_of_range_index_is_an_asset_error() {
        let mesh = MeshData::new(vec![Vertex::default(); 3], vec![0, 1, 3]);
        assert!(matches!(mesh.validate("tri"), Err(PrismError::InvalidAsset { .. })));
    }

    #[test]
    fn partial_triangle_is_an_asset_error() {
        let mesh = MeshData::new(vec![Vertex::default(); 3], vec![0, 1]);
        assert!(mesh.validate("tri").is_err());
    }
}
