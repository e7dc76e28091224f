use glam::Vec3;

/// Fixed multiplier applied to light and sky intensities before shading,
/// so editor-facing values stay in a small friendly range.
pub const INTENSITY_SCALE: f32 = 10.0;

/// Single directional light slot. Re-submitting within a frame replaces
/// the previous value.
#[derive(Debug, Clone, Copy)]
pub struct DirectionalLight {
    /// Points from the scene toward the light.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub cast_shadows: bool,
    pub shadow_depth_bias: f32,
    pub soft_shadows: bool,
    pub show_cascades: bool,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.3, 1.0, 0.3).normalize(),
            color: Vec3::ONE,
            intensity: 1.0,
            cast_shadows: true,
            shadow_depth_bias: 0.002,
            soft_shadows: true,
            show_cascades: false,
        }
    }
}

/// Environment textures for the sky pass and image-based lighting. All
/// views are supplied by the caller; the renderer does not filter or
/// convolve environments itself.
#[derive(Clone)]
pub struct SkyEnvironment {
    pub cubemap: wgpu::TextureView,
    pub irradiance: wgpu::TextureView,
    pub prefilter: wgpu::TextureView,
    pub brdf_lut: wgpu::TextureView,
}

#[derive(Clone)]
pub struct SkyLight {
    pub intensity: f32,
    pub render_sky: bool,
    pub use_ibl: bool,
    pub environment: Option<SkyEnvironment>,
}

impl Default for SkyLight {
    fn default() -> Self {
        Self {
            intensity: 1.0,
            render_sky: true,
            use_ibl: true,
            environment: None,
        }
    }
}
