use glam::{Mat4, Vec3};
use wgpu_deferred::renderer::batch::{DrawRequest, InstanceBatcher};
use wgpu_deferred::renderer::{Material, Mesh, ShadingModel, SubMesh};
use wgpu_deferred::{Assets, Handle};

fn scene() -> (Assets, Handle<Mesh>, Handle<Mesh>, Handle<Material>) {
    let mut assets = Assets::new();

    // A two-piece mesh where each sub-mesh uses its own material slot.
    let lamp = assets.meshes.insert(Mesh::new(vec![
        SubMesh::with_layout(Mat4::IDENTITY, 0, 128, 192),
        SubMesh::with_layout(Mat4::from_translation(Vec3::Y), 1, 64, 96),
    ]));
    let rock = assets
        .meshes
        .insert(Mesh::new(vec![SubMesh::with_layout(Mat4::IDENTITY, 0, 24, 36)]));
    let default_material = assets.materials.insert(Material::default_white());

    (assets, lamp, rock, default_material)
}

fn request(mesh: Handle<Mesh>, entity_id: i32, cast_shadow: bool) -> DrawRequest {
    DrawRequest {
        mesh,
        materials: Vec::new(),
        transform: Mat4::from_translation(Vec3::new(entity_id as f32, 0.0, 0.0)),
        entity_id,
        cast_shadow,
    }
}

#[test]
fn mixed_scene_batches_by_geometry_and_material() {
    let (mut assets, lamp, rock, default_material) = scene();
    let glowing = assets.materials.insert(Material {
        emission: Vec3::splat(4.0),
        shading_model: ShadingModel::Unlit,
        ..Material::default()
    });

    let mut batcher = InstanceBatcher::new(1024);

    // Three rocks, two lamps, one lamp with a custom shade material.
    for entity in 0..3 {
        batcher.add_request(&request(rock, entity, true), &assets, default_material);
    }
    batcher.add_request(&request(lamp, 10, true), &assets, default_material);
    batcher.add_request(&request(lamp, 11, true), &assets, default_material);
    let mut fancy = request(lamp, 12, false);
    fancy.materials = vec![None, Some(glowing)];
    batcher.add_request(&fancy, &assets, default_material);

    // Rock, lamp base, lamp shade (default), lamp shade (glowing).
    assert_eq!(batcher.geometry_unit_count(), 4);
    assert_eq!(batcher.geometry_instance_count(), 3 + 3 * 2);

    // The non-caster lamp is missing from the shadow units, and shadow
    // units ignore materials entirely.
    assert_eq!(batcher.shadow_unit_count(), 3);
    assert_eq!(batcher.shadow_instance_count(), 3 + 2 * 2);
}

#[test]
fn geometry_and_shadow_arrays_flatten_independently() {
    let (assets, lamp, rock, default_material) = scene();
    let mut batcher = InstanceBatcher::new(1024);

    batcher.add_request(&request(rock, 1, true), &assets, default_material);
    batcher.add_request(&request(lamp, 2, false), &assets, default_material);
    batcher.add_request(&request(rock, 3, true), &assets, default_material);

    let mut geometry = Vec::new();
    batcher.flatten_geometry(&mut geometry);
    assert_eq!(geometry.len(), 4);
    for (_, unit) in batcher.geometry_batches() {
        let start = unit.offset as usize;
        let end = start + unit.parameters.len();
        assert_eq!(&geometry[start..end], unit.parameters.as_slice());
    }

    let mut shadow = Vec::new();
    batcher.flatten_shadow(&mut shadow);
    assert_eq!(shadow.len(), 2);
    for (key, unit) in batcher.shadow_batches() {
        assert!(key.material.is_none());
        let start = unit.offset as usize;
        assert_eq!(&shadow[start..start + unit.parameters.len()], unit.parameters.as_slice());
    }
}

#[test]
fn material_table_indices_match_pixel_ids() {
    let (mut assets, lamp, _, default_material) = scene();
    let red = assets.materials.insert(Material {
        albedo: Vec3::new(1.0, 0.0, 0.0),
        ..Material::default()
    });

    let mut batcher = InstanceBatcher::new(64);
    let mut req = request(lamp, 5, true);
    req.materials = vec![Some(red), None];
    batcher.add_request(&req, &assets, default_material);

    let table = batcher.frame_materials();
    for (_, unit) in batcher.geometry_batches() {
        let material = unit.material.expect("geometry units carry a material");
        let index = unit.parameters[0].pixel_id[2] as usize;
        assert_eq!(table[index], material);
    }
}

#[test]
fn entity_ids_survive_instancing() {
    let (assets, _, rock, default_material) = scene();
    let mut batcher = InstanceBatcher::new(64);

    for entity in [7, 9, 11] {
        batcher.add_request(&request(rock, entity, true), &assets, default_material);
    }

    let (_, unit) = batcher.geometry_batches().next().expect("one unit");
    let ids: Vec<i32> = unit.parameters.iter().map(|p| p.pixel_id[0]).collect();
    assert_eq!(ids, vec![7, 9, 11]);
}
