use std::mem;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::renderer::internal::targets::{RenderTargets, DEPTH_FORMAT, LIT_FORMAT};
use crate::renderer::internal::ShadowPass;
use crate::renderer::lights::{DirectionalLight, SkyEnvironment, SkyLight, INTENSITY_SCALE};
use crate::renderer::{Camera, PipelineBuilder};
use crate::settings::CASCADE_COUNT;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct LightingUniform {
    cascade_view_proj: [[[f32; 4]; 4]; CASCADE_COUNT],
    view: [[f32; 4]; 4],
    /// xyz: direction toward the light, w: 1 when the shadow map is valid.
    light_direction: [f32; 4],
    /// rgb: color premultiplied by intensity, w: shadow depth bias.
    light_color: [f32; 4],
    /// xyz: camera position, w: IBL intensity.
    camera_position: [f32; 4],
    cascade_splits: [f32; 4],
    /// soft shadows, cascade debug tint, IBL enabled, light enabled.
    flags: [f32; 4],
}

/// Full-screen deferred shading pass. Restricted by stencil to pixels the
/// geometry pass tagged, so the background is left for the sky pass.
pub(crate) struct LightingPass {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    gbuffer_layout: wgpu::BindGroupLayout,
    gbuffer_bind_group: Option<wgpu::BindGroup>,
    shadow_bind_group: wgpu::BindGroup,
    environment_layout: wgpu::BindGroupLayout,
    environment_bind_group: wgpu::BindGroup,
    placeholder: PlaceholderEnvironment,
    environment_sampler: wgpu::Sampler,
}

impl LightingPass {
    pub(crate) fn new(device: &wgpu::Device, shadows: &ShadowPass) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LightingUniformLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(mem::size_of::<LightingUniform>() as u64),
                },
                count: None,
            }],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("LightingUniformBuffer"),
            size: mem::size_of::<LightingUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("LightingUniformBindGroup"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let unfiltered = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let gbuffer_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LightingGBufferLayout"),
            entries: &[
                unfiltered(0),
                unfiltered(1),
                unfiltered(2),
                unfiltered(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Sint,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let shadow_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LightingShadowLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        let shadow_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("LightingShadowBindGroup"),
            layout: &shadow_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(shadows.array_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(shadows.sampler()),
                },
            ],
        });

        let environment_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("LightingEnvironmentLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let environment_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("EnvironmentSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let placeholder = PlaceholderEnvironment::new(device);
        let environment_bind_group = placeholder.bind_group(
            device,
            &environment_layout,
            &environment_sampler,
        );

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("DeferredLightingShader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!("../../shader/deferred_lighting.wgsl").into(),
            ),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("DeferredLightingPipelineLayout"),
            bind_group_layouts: &[
                &uniform_layout,
                &gbuffer_layout,
                &shadow_layout,
                &environment_layout,
            ],
            push_constant_ranges: &[],
        });

        let stencil_match = wgpu::StencilFaceState {
            compare: wgpu::CompareFunction::Equal,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op: wgpu::StencilOperation::Keep,
        };

        let pipeline = PipelineBuilder::new(device, &pipeline_layout, &shader)
            .with_label("DeferredLightingPipeline")
            .with_vertex_entry("vs_fullscreen")
            .with_fragment_entry("fs_lighting")
            .with_color_target(LIT_FORMAT, None)
            .with_depth_stencil_state(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState {
                    front: stencil_match,
                    back: stencil_match,
                    read_mask: 0xFF,
                    write_mask: 0,
                },
                bias: wgpu::DepthBiasState::default(),
            })
            .with_no_culling()
            .build();

        Self {
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            gbuffer_layout,
            gbuffer_bind_group: None,
            shadow_bind_group,
            environment_layout,
            environment_bind_group,
            placeholder,
            environment_sampler,
        }
    }

    /// Drop the cached G-buffer bind group after the targets are recreated.
    pub(crate) fn invalidate_gbuffer(&mut self) {
        self.gbuffer_bind_group = None;
    }

    pub(crate) fn set_environment(
        &mut self,
        device: &wgpu::Device,
        environment: Option<&SkyEnvironment>,
    ) {
        self.environment_bind_group = match environment {
            Some(env) => device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("LightingEnvironmentBindGroup"),
                layout: &self.environment_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&env.irradiance),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&env.prefilter),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&env.brdf_lut),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&self.environment_sampler),
                    },
                ],
            }),
            None => self.placeholder.bind_group(
                device,
                &self.environment_layout,
                &self.environment_sampler,
            ),
        };
    }

    pub(crate) fn update(
        &self,
        queue: &wgpu::Queue,
        camera: &Camera,
        light: Option<&DirectionalLight>,
        sky: Option<&SkyLight>,
        cascades: &[Mat4; CASCADE_COUNT],
        splits: &[f32; CASCADE_COUNT],
        shadow_map_valid: bool,
    ) {
        let mut cascade_view_proj = [[[0.0f32; 4]; 4]; CASCADE_COUNT];
        for (out, matrix) in cascade_view_proj.iter_mut().zip(cascades.iter()) {
            *out = matrix.to_cols_array_2d();
        }

        let (direction, color, bias, soft, debug) = match light {
            Some(light) => (
                light.direction.normalize_or_zero(),
                light.color * light.intensity * INTENSITY_SCALE,
                light.shadow_depth_bias,
                light.soft_shadows,
                light.show_cascades,
            ),
            None => (glam::Vec3::Y, glam::Vec3::ZERO, 0.0, false, false),
        };

        let (use_ibl, ibl_intensity) = match sky {
            Some(sky) => (
                sky.use_ibl && sky.environment.is_some(),
                sky.intensity * INTENSITY_SCALE,
            ),
            None => (false, 0.0),
        };

        let uniform = LightingUniform {
            cascade_view_proj,
            view: camera.view.to_cols_array_2d(),
            light_direction: direction.extend(if shadow_map_valid { 1.0 } else { 0.0 }).to_array(),
            light_color: color.extend(bias).to_array(),
            camera_position: camera.position.extend(ibl_intensity).to_array(),
            cascade_splits: *splits,
            flags: [
                if soft { 1.0 } else { 0.0 },
                if debug { 1.0 } else { 0.0 },
                if use_ibl { 1.0 } else { 0.0 },
                if light.is_some() { 1.0 } else { 0.0 },
            ],
        };

        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    pub(crate) fn render(
        &mut self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        targets: &RenderTargets,
    ) {
        // The lit depth-stencil receives the geometry depth so the stencil
        // test below can see the tags, and the sky pass can depth-test.
        encoder.copy_texture_to_texture(
            targets.gbuffer.depth_texture.as_image_copy(),
            targets.lit.depth_texture.as_image_copy(),
            targets.extent(),
        );

        let gbuffer_bind_group = self.gbuffer_bind_group.get_or_insert_with(|| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("LightingGBufferBindGroup"),
                layout: &self.gbuffer_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&targets.gbuffer.albedo.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&targets.gbuffer.normal.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(
                            &targets.gbuffer.position.view,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(
                            &targets.gbuffer.emission.view,
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(&targets.gbuffer.id.view),
                    },
                ],
            })
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("DeferredLightingPass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &targets.lit.color.view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &targets.lit.depth_stencil_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_stencil_reference(1);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        pass.set_bind_group(1, &*gbuffer_bind_group, &[]);
        pass.set_bind_group(2, &self.shadow_bind_group, &[]);
        pass.set_bind_group(3, &self.environment_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

/// 1x1 zero textures standing in for an absent sky environment so the
/// pipeline layout never changes.
struct PlaceholderEnvironment {
    _cube: wgpu::Texture,
    cube_view: wgpu::TextureView,
    _lut: wgpu::Texture,
    lut_view: wgpu::TextureView,
}

impl PlaceholderEnvironment {
    fn new(device: &wgpu::Device) -> Self {
        let cube = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("PlaceholderEnvironmentCube"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let cube_view = cube.create_view(&wgpu::TextureViewDescriptor {
            label: Some("PlaceholderEnvironmentCubeView"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });

        let lut = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("PlaceholderBrdfLut"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let lut_view = lut.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            _cube: cube,
            cube_view,
            _lut: lut,
            lut_view,
        }
    }

    fn bind_group(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("PlaceholderEnvironmentBindGroup"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&self.cube_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.cube_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&self.lut_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lighting_uniform_size_matches_wgsl_layout() {
        assert_eq!(mem::size_of::<LightingUniform>(), 400);
    }
}
