use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

use crate::renderer::Camera;
use crate::settings::CASCADE_COUNT;

/// Depth range multiplier for the orthographic light box. Stretching the
/// near and far planes keeps casters outside the camera frustum from
/// being clipped out of the shadow map.
const DEPTH_RANGE_MULTIPLIER: f32 = 10.0;

/// World-space corners of the frustum described by `projection * view`,
/// using the z in [0, 1] clip convention.
pub fn frustum_corners_world(projection: Mat4, view: Mat4) -> [Vec3; 8] {
    let inverse = (projection * view).inverse();
    let mut corners = [Vec3::ZERO; 8];
    let mut index = 0;

    for x in [-1.0f32, 1.0] {
        for y in [-1.0f32, 1.0] {
            for z in [0.0f32, 1.0] {
                let corner = inverse * Vec4::new(x, y, z, 1.0);
                corners[index] = corner.xyz() / corner.w;
                index += 1;
            }
        }
    }

    corners
}

/// Light-space transform covering one camera sub-frustum: a look-at view
/// from the light direction through the frustum center, then a tight
/// orthographic box around the transformed corners with its depth range
/// stretched by [`DEPTH_RANGE_MULTIPLIER`].
pub fn light_space_matrix(light_direction: Vec3, projection: Mat4, view: Mat4) -> Mat4 {
    let corners = frustum_corners_world(projection, view);

    let center = corners.iter().copied().sum::<Vec3>() / corners.len() as f32;
    let direction = light_direction.normalize_or_zero();

    // Near-vertical lights degenerate against the default up axis.
    let up = if direction.dot(Vec3::Y).abs() > 0.95 {
        Vec3::Z
    } else {
        Vec3::Y
    };
    let light_view = Mat4::look_at_rh(center + direction, center, up);

    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);
    for corner in corners {
        let transformed = light_view.transform_point3(corner);
        min = min.min(transformed);
        max = max.max(transformed);
    }

    if min.z < 0.0 {
        min.z *= DEPTH_RANGE_MULTIPLIER;
    } else {
        min.z /= DEPTH_RANGE_MULTIPLIER;
    }
    if max.z < 0.0 {
        max.z /= DEPTH_RANGE_MULTIPLIER;
    } else {
        max.z *= DEPTH_RANGE_MULTIPLIER;
    }

    let light_projection = Mat4::orthographic_rh(min.x, max.x, min.y, max.y, min.z, max.z);
    light_projection * light_view
}

/// One light-space matrix per cascade. Cascade `i` covers camera depth
/// `[previous split, splits[i]]`, with the first cascade starting at the
/// camera near plane.
pub fn cascade_matrices(
    camera: &Camera,
    splits: &[f32; CASCADE_COUNT],
    light_direction: Vec3,
) -> [Mat4; CASCADE_COUNT] {
    let fov_y = camera.fov_y_degrees.to_radians();
    let aspect = camera.aspect_ratio();

    let mut matrices = [Mat4::IDENTITY; CASCADE_COUNT];
    let mut near = camera.near;
    for (matrix, &far) in matrices.iter_mut().zip(splits.iter()) {
        let projection = Mat4::perspective_rh(fov_y, aspect, near, far);
        *matrix = light_space_matrix(light_direction, projection, camera.view);
        near = far;
    }

    matrices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera() -> Camera {
        Camera::default()
    }

    #[test]
    fn frustum_has_eight_distinct_corners() {
        let camera = test_camera();
        let corners = frustum_corners_world(camera.projection, camera.view);
        for i in 0..corners.len() {
            for j in (i + 1)..corners.len() {
                assert!(
                    corners[i].distance(corners[j]) > 1e-3,
                    "corners {i} and {j} coincide"
                );
            }
        }
    }

    #[test]
    fn light_box_contains_the_frustum() {
        let camera = test_camera();
        let light_dir = Vec3::new(0.4, 0.8, 0.2).normalize();
        let matrix = light_space_matrix(light_dir, camera.projection, camera.view);

        for corner in frustum_corners_world(camera.projection, camera.view) {
            let clip = matrix * corner.extend(1.0);
            let ndc = clip.xyz() / clip.w;
            assert!(ndc.x >= -1.0 - 1e-3 && ndc.x <= 1.0 + 1e-3, "x: {}", ndc.x);
            assert!(ndc.y >= -1.0 - 1e-3 && ndc.y <= 1.0 + 1e-3, "y: {}", ndc.y);
            assert!(ndc.z >= -1e-3 && ndc.z <= 1.0 + 1e-3, "z: {}", ndc.z);
        }
    }

    #[test]
    fn vertical_light_does_not_degenerate() {
        let camera = test_camera();
        let matrix = light_space_matrix(Vec3::Y, camera.projection, camera.view);
        assert!(matrix.is_finite());
        assert!(matrix.determinant().abs() > 0.0);
    }

    #[test]
    fn identical_inputs_give_identical_matrices() {
        let camera = test_camera();
        let splits = [10.0, 40.0, 100.0, 200.0];
        let dir = Vec3::new(0.3, 1.0, 0.3).normalize();

        let a = cascade_matrices(&camera, &splits, dir);
        let b = cascade_matrices(&camera, &splits, dir);

        for (ma, mb) in a.iter().zip(b.iter()) {
            assert_eq!(ma.to_cols_array(), mb.to_cols_array());
        }
    }
}
