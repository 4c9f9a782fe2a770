//! Mesh data and its device-local upload.

use std::sync::Arc;

use glam::{Vec2, Vec3};
use renderer_rhi::{Backend, BufferId, BufferUsage, GpuBuffer, Vertex};
use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Vertices plus a `u32` triangle list, as handed over by a mesh parser.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Reject empty meshes, partial triangles and out-of-range indices.
    pub fn validate(&self) -> ResourceResult<()> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(ResourceError::Decode("mesh has no geometry".to_string()));
        }
        if self.indices.len() % 3 != 0 {
            return Err(ResourceError::Decode(format!(
                "index count {} is not a triangle list",
                self.indices.len()
            )));
        }
        let count = self.vertices.len() as u32;
        if let Some(index) = self.indices.iter().find(|&&i| i >= count) {
            return Err(ResourceError::Decode(format!(
                "index {} out of range for {} vertices",
                index, count
            )));
        }
        Ok(())
    }

    /// Mean of the vertex positions; the origin for an empty mesh.
    pub fn centroid(&self) -> Vec3 {
        if self.vertices.is_empty() {
            return Vec3::ZERO;
        }
        let sum: Vec3 = self.vertices.iter().map(|v| v.position).sum();
        sum / self.vertices.len() as f32
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// A `size`×`size` quad in the XY plane facing +Z.
    pub fn quad(size: f32) -> Self {
        let h = size * 0.5;
        let n = Vec3::Z;
        let vertices = vec![
            Vertex::new(Vec3::new(-h, -h, 0.0), n, Vec2::new(0.0, 1.0)),
            Vertex::new(Vec3::new(h, -h, 0.0), n, Vec2::new(1.0, 1.0)),
            Vertex::new(Vec3::new(h, h, 0.0), n, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(-h, h, 0.0), n, Vec2::new(0.0, 0.0)),
        ];
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }

    /// An axis-aligned cube with per-face normals and UVs.
    pub fn cube(size: f32) -> Self {
        let h = size * 0.5;
        // (normal, right, up) per face
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, right, up) in faces {
            let base = vertices.len() as u32;
            let center = normal * h;
            for (u, v) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let position = center + right * (u * h) + up * (v * h);
                let uv = Vec2::new((u + 1.0) * 0.5, 1.0 - (v + 1.0) * 0.5);
                vertices.push(Vertex::new(position, normal, uv));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        Self::new(vertices, indices)
    }
}

/// Device-local vertex and index buffers for one mesh.
pub struct GpuMesh<B: Backend> {
    vertex_buffer: GpuBuffer<B>,
    index_buffer: GpuBuffer<B>,
    index_count: u32,
}

impl<B: Backend> GpuMesh<B> {
    /// Validate `mesh` and upload it through staging buffers.
    pub fn upload(backend: &Arc<B>, mesh: &MeshData) -> ResourceResult<Self> {
        mesh.validate()?;
        let vertex_buffer = GpuBuffer::device_local_with_data(
            backend,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let index_buffer = GpuBuffer::device_local_with_data(
            backend,
            BufferUsage::Index,
            bytemuck::cast_slice(&mesh.indices),
        )?;
        debug!(
            "Uploaded mesh: {} vertices, {} indices",
            mesh.vertices.len(),
            mesh.indices.len()
        );
        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.index_count(),
        })
    }

    #[inline]
    pub fn vertex_buffer(&self) -> BufferId {
        self.vertex_buffer.id()
    }

    #[inline]
    pub fn index_buffer(&self) -> BufferId {
        self.index_buffer.id()
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}
