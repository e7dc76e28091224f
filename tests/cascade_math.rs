use glam::{Mat4, Vec3, Vec4Swizzles};
use wgpu_deferred::renderer::cascade::{
    cascade_matrices, frustum_corners_world, light_space_matrix,
};
use wgpu_deferred::renderer::Camera;

fn camera_at(position: Vec3, target: Vec3) -> Camera {
    Camera {
        position,
        view: Mat4::look_at_rh(position, target, Vec3::Y),
        projection: Mat4::perspective_rh(60f32.to_radians(), 16.0 / 9.0, 0.1, 1000.0),
        fov_y_degrees: 60.0,
        near: 0.1,
        far: 1000.0,
    }
}

#[test]
fn every_cascade_covers_its_camera_sub_frustum() {
    let camera = camera_at(Vec3::new(3.0, 5.0, 12.0), Vec3::ZERO);
    let splits = [10.0, 40.0, 100.0, 200.0];
    let light_dir = Vec3::new(0.5, 1.0, 0.25).normalize();

    let matrices = cascade_matrices(&camera, &splits, light_dir);

    let mut near = camera.near;
    for (matrix, &far) in matrices.iter().zip(splits.iter()) {
        let sub_projection = Mat4::perspective_rh(
            camera.fov_y_degrees.to_radians(),
            camera.aspect_ratio(),
            near,
            far,
        );
        for corner in frustum_corners_world(sub_projection, camera.view) {
            let clip = *matrix * corner.extend(1.0);
            let ndc = clip.xyz() / clip.w;
            assert!(ndc.x.abs() <= 1.0 + 1e-3, "x out of light box: {}", ndc.x);
            assert!(ndc.y.abs() <= 1.0 + 1e-3, "y out of light box: {}", ndc.y);
            assert!(
                ndc.z >= -1e-3 && ndc.z <= 1.0 + 1e-3,
                "z out of light box: {}",
                ndc.z
            );
        }
        near = far;
    }
}

#[test]
fn stretched_depth_range_keeps_room_for_casters_behind_the_frustum() {
    let camera = camera_at(Vec3::new(0.0, 2.0, 8.0), Vec3::ZERO);
    let light_dir = Vec3::new(0.2, 1.0, 0.1).normalize();
    let projection = Mat4::perspective_rh(
        camera.fov_y_degrees.to_radians(),
        camera.aspect_ratio(),
        camera.near,
        10.0,
    );

    let matrix = light_space_matrix(light_dir, projection, camera.view);

    // A caster well above the frustum, between it and the light, must
    // still land inside the shadow depth range.
    let corners = frustum_corners_world(projection, camera.view);
    let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
    let caster = center + light_dir * 50.0;

    let clip = matrix * caster.extend(1.0);
    let ndc = clip.xyz() / clip.w;
    assert!(ndc.z >= 0.0 && ndc.z <= 1.0, "caster depth clipped: {}", ndc.z);
}

#[test]
fn cascades_are_stable_across_light_directions() {
    let camera = camera_at(Vec3::new(-4.0, 1.5, 6.0), Vec3::new(0.0, 0.0, -5.0));
    let splits = [5.0, 20.0, 60.0, 150.0];

    for direction in [
        Vec3::Y,
        Vec3::NEG_Y,
        Vec3::new(1.0, 0.01, 0.0).normalize(),
        Vec3::new(-0.3, 0.9, 0.5).normalize(),
    ] {
        let matrices = cascade_matrices(&camera, &splits, direction);
        for matrix in matrices {
            assert!(matrix.is_finite(), "degenerate matrix for light {direction}");
            assert!(matrix.determinant().abs() > 0.0);
        }
    }
}
