use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Shading model written into the per-instance pixel id so the deferred
/// pass can skip lighting for unlit surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadingModel {
    #[default]
    Lit,
    Unlit,
}

impl ShadingModel {
    pub fn id(self) -> i32 {
        match self {
            ShadingModel::Lit => 0,
            ShadingModel::Unlit => 1,
        }
    }
}

/// Surface description referenced by draw requests. Scalar parameters are
/// uploaded to the per-frame material table; the albedo texture binds as a
/// regular sampled texture in the geometry pass.
#[derive(Clone)]
pub struct Material {
    pub albedo: Vec3,
    pub emission: Vec3,
    pub metallic: f32,
    pub roughness: f32,
    pub texture_tiling: Vec2,
    pub shading_model: ShadingModel,
    pub albedo_texture: Option<wgpu::TextureView>,
}

impl Material {
    pub fn default_white() -> Self {
        Self::default()
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            albedo: Vec3::ONE,
            emission: Vec3::ZERO,
            metallic: 0.0,
            roughness: 0.5,
            texture_tiling: Vec2::ONE,
            shading_model: ShadingModel::Lit,
            albedo_texture: None,
        }
    }
}

/// GPU layout of one material table entry.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct MaterialData {
    pub albedo: [f32; 3],
    pub metallic: f32,
    pub emission: [f32; 3],
    pub roughness: f32,
    pub texture_tiling: [f32; 2],
    pub _padding: [f32; 2],
}

impl MaterialData {
    pub fn from_material(material: &Material) -> Self {
        Self {
            albedo: material.albedo.to_array(),
            metallic: material.metallic,
            emission: material.emission.to_array(),
            roughness: material.roughness,
            texture_tiling: material.texture_tiling.to_array(),
            _padding: [0.0; 2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn material_data_is_48_bytes() {
        // Matches the WGSL struct stride in the materials storage buffer.
        assert_eq!(std::mem::size_of::<MaterialData>(), 48);
    }

    #[test]
    fn shading_model_ids_are_stable() {
        assert_eq!(ShadingModel::Lit.id(), 0);
        assert_eq!(ShadingModel::Unlit.id(), 1);
    }
}
