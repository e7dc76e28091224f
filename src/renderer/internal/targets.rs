/// Fixed attachment formats for the whole pipeline. Changing any of these
/// requires matching shader and pipeline updates, so they are compile-time
/// constants rather than configuration.
pub(crate) const ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub(crate) const NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub(crate) const POSITION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;
pub(crate) const EMISSION_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub(crate) const ID_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Sint;
pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
pub(crate) const LIT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

pub(crate) const BLOOM_MIP_COUNT: usize = 6;

/// Half-resolution chain used by the bloom blur. Sizes never reach zero
/// so the mip textures stay valid for tiny viewports.
pub(crate) fn bloom_mip_sizes(width: u32, height: u32) -> Vec<(u32, u32)> {
    let mut sizes = Vec::with_capacity(BLOOM_MIP_COUNT);
    let mut w = (width.max(2) / 2).max(1);
    let mut h = (height.max(2) / 2).max(1);
    for _ in 0..BLOOM_MIP_COUNT {
        sizes.push((w, h));
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }
    sizes
}

pub(crate) struct TextureBundle {
    pub(crate) texture: wgpu::Texture,
    pub(crate) view: wgpu::TextureView,
}

impl TextureBundle {
    fn new(
        device: &wgpu::Device,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Multi-target G-buffer plus a shared depth-stencil attachment. The id
/// attachment doubles as the picking source and carries COPY_SRC for the
/// single-pixel readback.
pub(crate) struct GBufferTargets {
    pub(crate) albedo: TextureBundle,
    pub(crate) normal: TextureBundle,
    pub(crate) position: TextureBundle,
    pub(crate) emission: TextureBundle,
    pub(crate) id: TextureBundle,
    pub(crate) depth_texture: wgpu::Texture,
    pub(crate) depth_stencil_view: wgpu::TextureView,
    pub(crate) depth_only_view: wgpu::TextureView,
}

impl GBufferTargets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let attach = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;

        let albedo = TextureBundle::new(device, "GBufferAlbedo", width, height, ALBEDO_FORMAT, attach);
        let normal = TextureBundle::new(device, "GBufferNormal", width, height, NORMAL_FORMAT, attach);
        let position =
            TextureBundle::new(device, "GBufferPosition", width, height, POSITION_FORMAT, attach);
        let emission =
            TextureBundle::new(device, "GBufferEmission", width, height, EMISSION_FORMAT, attach);
        let id = TextureBundle::new(
            device,
            "GBufferEntityId",
            width,
            height,
            ID_FORMAT,
            attach | wgpu::TextureUsages::COPY_SRC,
        );

        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("GBufferDepth"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let depth_stencil_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_only_view = depth_texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("GBufferDepthOnly"),
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });

        Self {
            albedo,
            normal,
            position,
            emission,
            id,
            depth_texture,
            depth_stencil_view,
            depth_only_view,
        }
    }
}

/// Deferred lighting output. Owns its own depth-stencil texture that
/// receives a copy of the G-buffer depth so the lighting and sky passes
/// can run their stencil tests against the geometry tags.
pub(crate) struct LitTargets {
    pub(crate) color: TextureBundle,
    pub(crate) depth_texture: wgpu::Texture,
    pub(crate) depth_stencil_view: wgpu::TextureView,
}

impl LitTargets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let color = TextureBundle::new(
            device,
            "DeferredLit",
            width,
            height,
            LIT_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
        );

        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("DeferredLitDepth"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let depth_stencil_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            color,
            depth_texture,
            depth_stencil_view,
        }
    }
}

pub(crate) struct BloomTargets {
    pub(crate) prefilter: TextureBundle,
    pub(crate) mips: Vec<TextureBundle>,
    pub(crate) mip_sizes: Vec<(u32, u32)>,
}

impl BloomTargets {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let attach = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let prefilter =
            TextureBundle::new(device, "BloomPrefilter", width, height, LIT_FORMAT, attach);

        let mip_sizes = bloom_mip_sizes(width, height);
        let mips = mip_sizes
            .iter()
            .enumerate()
            .map(|(level, &(w, h))| {
                TextureBundle::new(device, &format!("BloomMip{level}"), w, h, LIT_FORMAT, attach)
            })
            .collect();

        Self {
            prefilter,
            mips,
            mip_sizes,
        }
    }
}

/// All viewport-sized render targets. Recreated as a unit on resize; the
/// shadow map array lives with the shadow pass and is never resized.
pub(crate) struct RenderTargets {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) gbuffer: GBufferTargets,
    pub(crate) lit: LitTargets,
    pub(crate) temporary: TextureBundle,
    pub(crate) final_pass: TextureBundle,
    pub(crate) bloom: BloomTargets,
}

impl RenderTargets {
    pub(crate) fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let ping_pong = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST;

        Self {
            width,
            height,
            gbuffer: GBufferTargets::new(device, width, height),
            lit: LitTargets::new(device, width, height),
            temporary: TextureBundle::new(
                device,
                "PostProcessTemporary",
                width,
                height,
                LIT_FORMAT,
                ping_pong,
            ),
            final_pass: TextureBundle::new(
                device,
                "PostProcessFinal",
                width,
                height,
                LIT_FORMAT,
                ping_pong,
            ),
            bloom: BloomTargets::new(device, width, height),
        }
    }

    pub(crate) fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        log::info!("Resizing render targets to {}x{}", width, height);
        *self = Self::new(device, width, height);
    }

    pub(crate) fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width,
            height: self.height,
            depth_or_array_layers: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bloom_mips_halve_each_level() {
        let sizes = bloom_mip_sizes(1280, 720);
        assert_eq!(sizes.len(), BLOOM_MIP_COUNT);
        assert_eq!(sizes[0], (640, 360));
        for window in sizes.windows(2) {
            let (w0, h0) = window[0];
            let (w1, h1) = window[1];
            assert_eq!(w1, (w0 / 2).max(1));
            assert_eq!(h1, (h0 / 2).max(1));
        }
    }

    #[test]
    fn bloom_mips_never_reach_zero() {
        for (w, h) in bloom_mip_sizes(3, 2) {
            assert!(w >= 1);
            assert!(h >= 1);
        }
    }
}
