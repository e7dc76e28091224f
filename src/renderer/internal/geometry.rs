use crate::asset::Assets;
use crate::renderer::batch::InstanceBatcher;
use crate::renderer::internal::targets::{
    GBufferTargets, ALBEDO_FORMAT, DEPTH_FORMAT, EMISSION_FORMAT, ID_FORMAT, NORMAL_FORMAT,
    POSITION_FORMAT,
};
use crate::renderer::internal::{CameraBuffer, FrameMaterialsBuffer, InstanceBuffer};
use crate::renderer::{PipelineBuilder, Vertex};

/// Entity-id attachment clear value. The entity channel reads back as -1
/// anywhere no geometry was written.
const ID_CLEAR: wgpu::Color = wgpu::Color {
    r: -1.0,
    g: 0.0,
    b: 0.0,
    a: 0.0,
};

/// MRT pass filling the G-buffer. Every covered pixel is tagged with
/// stencil reference 1 so the lighting and sky passes can split shaded
/// surface from background.
pub(crate) struct GeometryPass {
    pipeline: wgpu::RenderPipeline,
    albedo_layout: wgpu::BindGroupLayout,
    default_albedo: wgpu::BindGroup,
    _default_texture: wgpu::Texture,
    sampler: wgpu::Sampler,
}

impl GeometryPass {
    pub(crate) fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        camera: &CameraBuffer,
        instances: &InstanceBuffer,
        materials: &FrameMaterialsBuffer,
    ) -> Self {
        let albedo_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("GeometryAlbedoLayout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("GeometryAlbedoSampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let default_texture = create_white_texture(device, queue);
        let default_view = default_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let default_albedo = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("GeometryDefaultAlbedo"),
            layout: &albedo_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&default_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("GBufferShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shader/gbuffer.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("GBufferPipelineLayout"),
            bind_group_layouts: &[
                &camera.bind_layout,
                &instances.bind_layout,
                &materials.bind_layout,
                &albedo_layout,
            ],
            push_constant_ranges: &[],
        });

        let stencil_tag = wgpu::StencilFaceState {
            compare: wgpu::CompareFunction::Always,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op: wgpu::StencilOperation::Replace,
        };

        let pipeline = PipelineBuilder::new(device, &pipeline_layout, &shader)
            .with_label("GBufferPipeline")
            .with_vertex_buffer(Vertex::layout())
            .with_color_target(ALBEDO_FORMAT, None)
            .with_color_target(NORMAL_FORMAT, None)
            .with_color_target(POSITION_FORMAT, None)
            .with_color_target(EMISSION_FORMAT, None)
            .with_color_target(ID_FORMAT, None)
            .with_depth_stencil_state(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState {
                    front: stencil_tag,
                    back: stencil_tag,
                    read_mask: 0xFF,
                    write_mask: 0xFF,
                },
                bias: wgpu::DepthBiasState::default(),
            })
            .build();

        Self {
            pipeline,
            albedo_layout,
            default_albedo,
            _default_texture: default_texture,
            sampler,
        }
    }

    pub(crate) fn render(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        targets: &GBufferTargets,
        assets: &Assets,
        batcher: &InstanceBatcher,
        camera: &CameraBuffer,
        instances: &InstanceBuffer,
        materials: &FrameMaterialsBuffer,
    ) -> u32 {
        // Bind groups for units with their own albedo texture have to be
        // created before the pass borrows the encoder.
        let unit_albedos: Vec<Option<wgpu::BindGroup>> = batcher
            .geometry_batches()
            .map(|(_, unit)| {
                let texture = unit
                    .material
                    .and_then(|handle| assets.materials.get(handle))
                    .and_then(|material| material.albedo_texture.as_ref())?;
                Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("GeometryUnitAlbedo"),
                    layout: &self.albedo_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(texture),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                    ],
                }))
            })
            .collect();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("GeometryPass"),
            color_attachments: &[
                color_attachment(&targets.albedo.view, wgpu::Color::BLACK),
                color_attachment(&targets.normal.view, wgpu::Color::TRANSPARENT),
                color_attachment(&targets.position.view, wgpu::Color::TRANSPARENT),
                color_attachment(&targets.emission.view, wgpu::Color::BLACK),
                color_attachment(&targets.id.view, ID_CLEAR),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &targets.depth_stencil_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0),
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_stencil_reference(1);
        pass.set_bind_group(0, &camera.bind_group, &[]);
        pass.set_bind_group(1, &instances.bind_group, &[]);
        pass.set_bind_group(2, &materials.bind_group, &[]);

        let mut draw_calls = 0;
        for ((key, unit), albedo) in batcher.geometry_batches().zip(unit_albedos.iter()) {
            let Some(buffers) = assets
                .meshes
                .get(key.mesh)
                .and_then(|mesh| mesh.submesh(key.submesh))
                .and_then(|submesh| submesh.buffers())
            else {
                log::warn!(
                    "Geometry unit references mesh {} submesh {} without GPU buffers",
                    key.mesh.index(),
                    key.submesh
                );
                continue;
            };

            pass.set_bind_group(3, albedo.as_ref().unwrap_or(&self.default_albedo), &[]);

            let count = unit.parameters.len() as u32;
            pass.set_vertex_buffer(0, buffers.vertex_buffer().slice(..));
            pass.set_index_buffer(buffers.index_buffer().slice(..), buffers.index_format());
            pass.draw_indexed(0..unit.index_count, 0, unit.offset..unit.offset + count);
            draw_calls += 1;
        }

        draw_calls
    }
}

fn color_attachment<'a>(
    view: &'a wgpu::TextureView,
    clear: wgpu::Color,
) -> Option<wgpu::RenderPassColorAttachment<'a>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        depth_slice: None,
        ops: wgpu::Operations {
            load: wgpu::LoadOp::Clear(clear),
            store: wgpu::StoreOp::Store,
        },
    })
}

fn create_white_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> wgpu::Texture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("DefaultAlbedoTexture"),
        size: wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &[255u8; 4],
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4),
            rows_per_image: Some(1),
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );

    texture
}
