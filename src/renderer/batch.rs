use std::collections::{BTreeMap, HashMap};

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4};

use crate::asset::{Assets, Handle};
use crate::renderer::material::Material;
use crate::renderer::mesh::Mesh;

/// One mesh submission. Materials are matched to sub-meshes through the
/// sub-mesh material slot; a missing or `None` entry falls back to the
/// renderer's default material.
#[derive(Debug, Clone)]
pub struct DrawRequest {
    pub mesh: Handle<Mesh>,
    pub materials: Vec<Option<Handle<Material>>>,
    pub transform: Mat4,
    pub entity_id: i32,
    pub cast_shadow: bool,
}

/// Per-instance GPU record. `pixel_id` packs (entity id, shading model,
/// material table index, 0); the first two flow through the G-buffer id
/// attachment for picking and deferred shading.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, PartialEq)]
pub struct InstanceParameter {
    pub transform: [[f32; 4]; 4],
    pub normal_matrix: [[f32; 4]; 4],
    pub pixel_id: [i32; 4],
}

impl InstanceParameter {
    fn new(transform: Mat4, entity_id: i32, shading_model: i32, material_index: i32) -> Self {
        let normal = Mat3::from_mat4(transform).inverse().transpose();
        Self {
            transform: transform.to_cols_array_2d(),
            normal_matrix: Mat4::from_mat3(normal).to_cols_array_2d(),
            pixel_id: [entity_id, shading_model, material_index, 0],
        }
    }
}

/// Batching key. Shadow units leave `material` as `None` so instances of
/// the same geometry collapse into one depth-only draw regardless of
/// surface parameters. Ordered so map iteration, and therefore instance
/// offsets, are deterministic across frames and runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitKey {
    pub mesh: Handle<Mesh>,
    pub submesh: u32,
    pub material: Option<Handle<Material>>,
}

/// Accumulated instances for one (mesh, sub-mesh, material) combination.
/// `offset` is assigned during flattening and names the first slot this
/// unit occupies in the flattened instance array.
#[derive(Debug)]
pub struct InstancingUnit {
    pub parameters: Vec<InstanceParameter>,
    pub offset: u32,
    pub index_count: u32,
    pub vertex_count: u32,
    pub material: Option<Handle<Material>>,
}

/// Collects draw requests into instancing units and flattens them into
/// fixed-capacity instance arrays, one for the geometry pass and one for
/// the shadow pass.
pub struct InstanceBatcher {
    geometry: BTreeMap<UnitKey, InstancingUnit>,
    shadow: BTreeMap<UnitKey, InstancingUnit>,
    material_slots: Vec<Handle<Material>>,
    material_lookup: HashMap<Handle<Material>, u32>,
    max_instances: u32,
    geometry_len: u32,
    shadow_len: u32,
    geometry_dropped: u32,
    shadow_dropped: u32,
}

impl InstanceBatcher {
    pub fn new(max_instances: u32) -> Self {
        Self {
            geometry: BTreeMap::new(),
            shadow: BTreeMap::new(),
            material_slots: Vec::new(),
            material_lookup: HashMap::new(),
            max_instances,
            geometry_len: 0,
            shadow_len: 0,
            geometry_dropped: 0,
            shadow_dropped: 0,
        }
    }

    pub fn clear(&mut self) {
        self.geometry.clear();
        self.shadow.clear();
        self.material_slots.clear();
        self.material_lookup.clear();
        self.geometry_len = 0;
        self.shadow_len = 0;
        self.geometry_dropped = 0;
        self.shadow_dropped = 0;
    }

    /// Expand a request into per-sub-mesh instances. Invalid mesh handles
    /// are skipped with a warning; materials fall back to `default_material`.
    pub fn add_request(
        &mut self,
        request: &DrawRequest,
        assets: &Assets,
        default_material: Handle<Material>,
    ) {
        let Some(mesh) = assets.meshes.get(request.mesh) else {
            log::warn!(
                "Draw request for entity {} references an invalid mesh handle",
                request.entity_id
            );
            return;
        };

        for (submesh_index, submesh) in mesh.submeshes().iter().enumerate() {
            let material = request
                .materials
                .get(submesh.material_slot as usize)
                .copied()
                .flatten()
                .unwrap_or(default_material);

            let shading_model = assets
                .materials
                .get(material)
                .map(|m| m.shading_model.id())
                .unwrap_or(0);

            let material_index = self.index_for_material(material);
            let transform = request.transform * submesh.local_transform;
            let parameter = InstanceParameter::new(
                transform,
                request.entity_id,
                shading_model,
                material_index as i32,
            );

            let geometry_key = UnitKey {
                mesh: request.mesh,
                submesh: submesh_index as u32,
                material: Some(material),
            };
            if self.geometry_len < self.max_instances {
                self.geometry_len += 1;
                self.geometry
                    .entry(geometry_key)
                    .or_insert_with(|| InstancingUnit {
                        parameters: Vec::new(),
                        offset: 0,
                        index_count: submesh.index_count(),
                        vertex_count: submesh.vertex_count(),
                        material: Some(material),
                    })
                    .parameters
                    .push(parameter);
            } else {
                self.geometry_dropped += 1;
            }

            if request.cast_shadow {
                let shadow_key = UnitKey {
                    mesh: request.mesh,
                    submesh: submesh_index as u32,
                    material: None,
                };
                if self.shadow_len < self.max_instances {
                    self.shadow_len += 1;
                    self.shadow
                        .entry(shadow_key)
                        .or_insert_with(|| InstancingUnit {
                            parameters: Vec::new(),
                            offset: 0,
                            index_count: submesh.index_count(),
                            vertex_count: submesh.vertex_count(),
                            material: None,
                        })
                        .parameters
                        .push(parameter);
                } else {
                    self.shadow_dropped += 1;
                }
            }
        }
    }

    fn index_for_material(&mut self, material: Handle<Material>) -> u32 {
        if let Some(&index) = self.material_lookup.get(&material) {
            return index;
        }
        let index = self.material_slots.len() as u32;
        self.material_slots.push(material);
        self.material_lookup.insert(material, index);
        index
    }

    /// Flatten geometry units into `scratch`, assigning each unit the
    /// offset of its first instance. Slices never overlap and preserve
    /// insertion order within a unit.
    pub fn flatten_geometry(&mut self, scratch: &mut Vec<InstanceParameter>) {
        if self.geometry_dropped > 0 {
            log::warn!(
                "Geometry instance capacity {} exceeded; dropped {} instances this frame",
                self.max_instances,
                self.geometry_dropped
            );
        }
        Self::flatten(&mut self.geometry, scratch);
        debug_assert!(scratch.len() <= self.max_instances as usize);
    }

    pub fn flatten_shadow(&mut self, scratch: &mut Vec<InstanceParameter>) {
        if self.shadow_dropped > 0 {
            log::warn!(
                "Shadow instance capacity {} exceeded; dropped {} instances this frame",
                self.max_instances,
                self.shadow_dropped
            );
        }
        Self::flatten(&mut self.shadow, scratch);
        debug_assert!(scratch.len() <= self.max_instances as usize);
    }

    fn flatten(units: &mut BTreeMap<UnitKey, InstancingUnit>, scratch: &mut Vec<InstanceParameter>) {
        scratch.clear();
        for unit in units.values_mut() {
            unit.offset = scratch.len() as u32;
            scratch.extend_from_slice(&unit.parameters);
        }
    }

    pub fn geometry_batches(&self) -> impl Iterator<Item = (&UnitKey, &InstancingUnit)> {
        self.geometry.iter()
    }

    pub fn shadow_batches(&self) -> impl Iterator<Item = (&UnitKey, &InstancingUnit)> {
        self.shadow.iter()
    }

    /// Material handles referenced this frame, in pixel-id index order.
    pub fn frame_materials(&self) -> &[Handle<Material>] {
        &self.material_slots
    }

    pub fn geometry_instance_count(&self) -> u32 {
        self.geometry_len
    }

    pub fn shadow_instance_count(&self) -> u32 {
        self.shadow_len
    }

    pub fn geometry_unit_count(&self) -> usize {
        self.geometry.len()
    }

    pub fn shadow_unit_count(&self) -> usize {
        self.shadow.len()
    }

    pub fn dropped_counts(&self) -> (u32, u32) {
        (self.geometry_dropped, self.shadow_dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::mesh::SubMesh;
    use crate::renderer::material::ShadingModel;
    use glam::Vec3;

    fn test_assets(submesh_count: usize) -> (Assets, Handle<Mesh>, Handle<Material>) {
        let mut assets = Assets::new();
        let submeshes = (0..submesh_count)
            .map(|i| SubMesh::with_layout(Mat4::IDENTITY, i as u32, 24, 36))
            .collect();
        let mesh = assets.meshes.insert(Mesh::new(submeshes));
        let default_material = assets.materials.insert(Material::default_white());
        (assets, mesh, default_material)
    }

    fn request(mesh: Handle<Mesh>, entity_id: i32) -> DrawRequest {
        DrawRequest {
            mesh,
            materials: Vec::new(),
            transform: Mat4::from_translation(Vec3::new(entity_id as f32, 0.0, 0.0)),
            entity_id,
            cast_shadow: true,
        }
    }

    #[test]
    fn instance_parameter_is_144_bytes() {
        assert_eq!(std::mem::size_of::<InstanceParameter>(), 144);
    }

    #[test]
    fn same_geometry_and_material_share_a_unit() {
        let (assets, mesh, default) = test_assets(1);
        let mut batcher = InstanceBatcher::new(64);

        batcher.add_request(&request(mesh, 1), &assets, default);
        batcher.add_request(&request(mesh, 2), &assets, default);

        assert_eq!(batcher.geometry_unit_count(), 1);
        assert_eq!(batcher.geometry_instance_count(), 2);
    }

    #[test]
    fn different_materials_split_geometry_units() {
        let (mut assets, mesh, default) = test_assets(1);
        let red = assets.materials.insert(Material {
            albedo: Vec3::new(1.0, 0.0, 0.0),
            ..Material::default()
        });
        let mut batcher = InstanceBatcher::new(64);

        batcher.add_request(&request(mesh, 1), &assets, default);
        let mut req = request(mesh, 2);
        req.materials = vec![Some(red)];
        batcher.add_request(&req, &assets, default);

        assert_eq!(batcher.geometry_unit_count(), 2);
        // The shadow map does not care about materials.
        assert_eq!(batcher.shadow_unit_count(), 1);
        assert_eq!(batcher.shadow_instance_count(), 2);
    }

    #[test]
    fn missing_material_falls_back_to_default() {
        let (assets, mesh, default) = test_assets(1);
        let mut batcher = InstanceBatcher::new(64);

        let mut req = request(mesh, 1);
        req.materials = vec![None];
        batcher.add_request(&req, &assets, default);

        let (key, _) = batcher.geometry_batches().next().unwrap();
        assert_eq!(key.material, Some(default));
        assert_eq!(batcher.frame_materials(), &[default]);
    }

    #[test]
    fn non_casters_are_excluded_from_the_shadow_map() {
        let (assets, mesh, default) = test_assets(1);
        let mut batcher = InstanceBatcher::new(64);

        let mut req = request(mesh, 1);
        req.cast_shadow = false;
        batcher.add_request(&req, &assets, default);
        batcher.add_request(&request(mesh, 2), &assets, default);

        assert_eq!(batcher.geometry_instance_count(), 2);
        assert_eq!(batcher.shadow_instance_count(), 1);
    }

    #[test]
    fn flatten_offsets_are_contiguous_and_non_overlapping() {
        let (mut assets, mesh, default) = test_assets(2);
        let other = assets.materials.insert(Material {
            metallic: 1.0,
            ..Material::default()
        });
        let mut batcher = InstanceBatcher::new(64);

        for entity in 0..3 {
            batcher.add_request(&request(mesh, entity), &assets, default);
        }
        let mut req = request(mesh, 9);
        req.materials = vec![Some(other), Some(other)];
        batcher.add_request(&req, &assets, default);

        let mut scratch = Vec::new();
        batcher.flatten_geometry(&mut scratch);

        let mut covered = 0u32;
        for (_, unit) in batcher.geometry_batches() {
            assert_eq!(unit.offset, covered, "unit slices must be contiguous");
            let start = unit.offset as usize;
            let end = start + unit.parameters.len();
            assert_eq!(&scratch[start..end], unit.parameters.as_slice());
            covered = end as u32;
        }
        assert_eq!(covered as usize, scratch.len());
    }

    #[test]
    fn flatten_order_is_deterministic() {
        let (mut assets, mesh, default) = test_assets(1);
        let other = assets.materials.insert(Material {
            roughness: 1.0,
            ..Material::default()
        });

        let build = |first_other: bool| {
            let mut batcher = InstanceBatcher::new(64);
            let mut with_other = request(mesh, 1);
            with_other.materials = vec![Some(other)];
            let plain = request(mesh, 2);
            if first_other {
                batcher.add_request(&with_other, &assets, default);
                batcher.add_request(&plain, &assets, default);
            } else {
                batcher.add_request(&plain, &assets, default);
                batcher.add_request(&with_other, &assets, default);
            }
            let keys: Vec<UnitKey> = batcher.geometry_batches().map(|(k, _)| *k).collect();
            keys
        };

        assert_eq!(build(true), build(false));
    }

    #[test]
    fn capacity_overflow_drops_instead_of_growing() {
        let (assets, mesh, default) = test_assets(1);
        let mut batcher = InstanceBatcher::new(2);

        for entity in 0..5 {
            batcher.add_request(&request(mesh, entity), &assets, default);
        }

        assert_eq!(batcher.geometry_instance_count(), 2);
        assert_eq!(batcher.shadow_instance_count(), 2);
        assert_eq!(batcher.dropped_counts(), (3, 3));

        let mut scratch = Vec::new();
        batcher.flatten_geometry(&mut scratch);
        assert_eq!(scratch.len(), 2);
    }

    #[test]
    fn unlit_shading_model_reaches_pixel_id() {
        let (mut assets, mesh, default) = test_assets(1);
        let unlit = assets.materials.insert(Material {
            shading_model: ShadingModel::Unlit,
            ..Material::default()
        });
        let mut batcher = InstanceBatcher::new(8);

        let mut req = request(mesh, 7);
        req.materials = vec![Some(unlit)];
        batcher.add_request(&req, &assets, default);

        let (_, unit) = batcher.geometry_batches().next().unwrap();
        assert_eq!(unit.parameters[0].pixel_id[0], 7);
        assert_eq!(unit.parameters[0].pixel_id[1], ShadingModel::Unlit.id());
    }

    #[test]
    fn clear_resets_all_frame_state() {
        let (assets, mesh, default) = test_assets(1);
        let mut batcher = InstanceBatcher::new(2);
        for entity in 0..5 {
            batcher.add_request(&request(mesh, entity), &assets, default);
        }

        batcher.clear();

        assert_eq!(batcher.geometry_instance_count(), 0);
        assert_eq!(batcher.shadow_instance_count(), 0);
        assert_eq!(batcher.geometry_unit_count(), 0);
        assert_eq!(batcher.dropped_counts(), (0, 0));
        assert!(batcher.frame_materials().is_empty());
    }
}
