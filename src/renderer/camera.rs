use glam::{Mat4, Vec3};

/// View state captured by [`begin_frame`](crate::renderer::SceneRenderer::begin_frame).
///
/// The renderer never derives camera matrices itself; the caller supplies
/// both matrices along with the perspective parameters the cascade math
/// needs to rebuild per-cascade sub-frusta.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Aspect ratio recovered from the projection matrix.
    pub fn aspect_ratio(&self) -> f32 {
        self.projection.y_axis.y / self.projection.x_axis.x
    }
}

impl Default for Camera {
    fn default() -> Self {
        let position = Vec3::new(0.0, 2.0, 8.0);
        let view = Mat4::look_at_rh(position, Vec3::ZERO, Vec3::Y);
        let fov_y_degrees = 60.0f32;
        let near = 0.1;
        let far = 1000.0;
        let projection =
            Mat4::perspective_rh(fov_y_degrees.to_radians(), 16.0 / 9.0, near, far);
        Self {
            position,
            view,
            projection,
            fov_y_degrees,
            near,
            far,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aspect_ratio_round_trips_through_projection() {
        let camera = Camera::default();
        let aspect = camera.aspect_ratio();
        assert!((aspect - 16.0 / 9.0).abs() < 1e-5);
    }
}
