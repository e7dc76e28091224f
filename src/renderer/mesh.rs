use glam::Mat4;
use wgpu::util::DeviceExt;

use crate::renderer::Vertex;

/// GPU buffers backing a sub-mesh. Optional so meshes can be described
/// without a device, which keeps batching logic testable on the CPU.
pub struct SubMeshBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
}

impl SubMeshBuffers {
    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &wgpu::Buffer {
        &self.index_buffer
    }

    pub fn index_format(&self) -> wgpu::IndexFormat {
        wgpu::IndexFormat::Uint32
    }
}

/// One drawable piece of a [`Mesh`]. Each sub-mesh carries its own local
/// transform relative to the mesh origin and names the material slot the
/// draw request should fill.
pub struct SubMesh {
    pub local_transform: Mat4,
    pub material_slot: u32,
    vertex_count: u32,
    index_count: u32,
    gpu: Option<SubMeshBuffers>,
}

impl SubMesh {
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        vertices: &[Vertex],
        indices: &[u32],
        local_transform: Mat4,
        material_slot: u32,
    ) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}VertexBuffer")),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}IndexBuffer")),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        Self {
            local_transform,
            material_slot,
            vertex_count: vertices.len() as u32,
            index_count: indices.len() as u32,
            gpu: Some(SubMeshBuffers {
                vertex_buffer,
                index_buffer,
            }),
        }
    }

    /// Geometry metadata without GPU buffers. Units built from such
    /// sub-meshes batch normally but are skipped at draw time.
    pub fn with_layout(
        local_transform: Mat4,
        material_slot: u32,
        vertex_count: u32,
        index_count: u32,
    ) -> Self {
        Self {
            local_transform,
            material_slot,
            vertex_count,
            index_count,
            gpu: None,
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn buffers(&self) -> Option<&SubMeshBuffers> {
        self.gpu.as_ref()
    }
}

pub struct Mesh {
    submeshes: Vec<SubMesh>,
}

impl Mesh {
    pub fn new(submeshes: Vec<SubMesh>) -> Self {
        Self { submeshes }
    }

    pub fn submeshes(&self) -> &[SubMesh] {
        &self.submeshes
    }

    pub fn submesh(&self, index: u32) -> Option<&SubMesh> {
        self.submeshes.get(index as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_only_submesh_has_no_buffers() {
        let sub = SubMesh::with_layout(Mat4::IDENTITY, 0, 24, 36);
        assert!(sub.buffers().is_none());
        assert_eq!(sub.vertex_count(), 24);
        assert_eq!(sub.index_count(), 36);
    }
}
