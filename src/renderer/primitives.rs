use glam::Mat4;

use crate::renderer::mesh::{Mesh, SubMesh};
use crate::renderer::vertex::{v, Vertex};

/// Unit cube centered on the origin, 24 vertices with per-face normals.
/// Also used (positions only) by the sky pass.
pub fn cube_vertices() -> (Vec<Vertex>, Vec<u32>) {
    let vertices = vec![
        // +Z
        v([-0.5, -0.5, 0.5], [0.0, 0.0, 1.0], [0.0, 1.0]),
        v([0.5, -0.5, 0.5], [0.0, 0.0, 1.0], [1.0, 1.0]),
        v([0.5, 0.5, 0.5], [0.0, 0.0, 1.0], [1.0, 0.0]),
        v([-0.5, 0.5, 0.5], [0.0, 0.0, 1.0], [0.0, 0.0]),
        // -Z
        v([0.5, -0.5, -0.5], [0.0, 0.0, -1.0], [0.0, 1.0]),
        v([-0.5, -0.5, -0.5], [0.0, 0.0, -1.0], [1.0, 1.0]),
        v([-0.5, 0.5, -0.5], [0.0, 0.0, -1.0], [1.0, 0.0]),
        v([0.5, 0.5, -0.5], [0.0, 0.0, -1.0], [0.0, 0.0]),
        // +X
        v([0.5, -0.5, 0.5], [1.0, 0.0, 0.0], [0.0, 1.0]),
        v([0.5, -0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 1.0]),
        v([0.5, 0.5, -0.5], [1.0, 0.0, 0.0], [1.0, 0.0]),
        v([0.5, 0.5, 0.5], [1.0, 0.0, 0.0], [0.0, 0.0]),
        // -X
        v([-0.5, -0.5, -0.5], [-1.0, 0.0, 0.0], [0.0, 1.0]),
        v([-0.5, -0.5, 0.5], [-1.0, 0.0, 0.0], [1.0, 1.0]),
        v([-0.5, 0.5, 0.5], [-1.0, 0.0, 0.0], [1.0, 0.0]),
        v([-0.5, 0.5, -0.5], [-1.0, 0.0, 0.0], [0.0, 0.0]),
        // +Y
        v([-0.5, 0.5, 0.5], [0.0, 1.0, 0.0], [0.0, 1.0]),
        v([0.5, 0.5, 0.5], [0.0, 1.0, 0.0], [1.0, 1.0]),
        v([0.5, 0.5, -0.5], [0.0, 1.0, 0.0], [1.0, 0.0]),
        v([-0.5, 0.5, -0.5], [0.0, 1.0, 0.0], [0.0, 0.0]),
        // -Y
        v([-0.5, -0.5, -0.5], [0.0, -1.0, 0.0], [0.0, 1.0]),
        v([0.5, -0.5, -0.5], [0.0, -1.0, 0.0], [1.0, 1.0]),
        v([0.5, -0.5, 0.5], [0.0, -1.0, 0.0], [1.0, 0.0]),
        v([-0.5, -0.5, 0.5], [0.0, -1.0, 0.0], [0.0, 0.0]),
    ];

    let mut indices = Vec::with_capacity(36);
    for face in 0..6u32 {
        let base = face * 4;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    (vertices, indices)
}

pub fn cube_mesh(device: &wgpu::Device) -> Mesh {
    let (vertices, indices) = cube_vertices();
    Mesh::new(vec![SubMesh::new(
        device,
        "Cube",
        &vertices,
        &indices,
        Mat4::IDENTITY,
        0,
    )])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_expected_counts() {
        let (vertices, indices) = cube_vertices();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
    }

    #[test]
    fn cube_normals_are_unit_length() {
        let (vertices, _) = cube_vertices();
        for vertex in vertices {
            let n = glam::Vec3::from_array(vertex.normal);
            assert!((n.length() - 1.0).abs() < 1e-6);
        }
    }
}
