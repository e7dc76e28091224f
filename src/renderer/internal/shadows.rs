use std::mem;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::asset::Assets;
use crate::renderer::batch::InstanceBatcher;
use crate::renderer::internal::InstanceBuffer;
use crate::renderer::{PipelineBuilder, Vertex};
use crate::settings::CASCADE_COUNT;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct ShadowViewUniform {
    view_proj: [[f32; 4]; 4],
}

/// Cascaded shadow map: one `Depth32Float` array with a layer per
/// cascade, rendered with a depth-only pipeline. The per-cascade matrix is
/// staged once per frame and copied into the view uniform between layer
/// passes, since queued buffer writes all land before the first pass of a
/// submission.
pub(crate) struct ShadowPass {
    _texture: wgpu::Texture,
    array_view: wgpu::TextureView,
    layer_views: Vec<wgpu::TextureView>,
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    staging_buffer: wgpu::Buffer,
    pipeline: wgpu::RenderPipeline,
}

impl ShadowPass {
    pub(crate) fn new(device: &wgpu::Device, instances: &InstanceBuffer, size: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("CascadeShadowMap"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: CASCADE_COUNT as u32,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let array_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("CascadeShadowMapArrayView"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        });

        let layer_views = (0..CASCADE_COUNT as u32)
            .map(|layer| {
                texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some(&format!("CascadeShadowMapLayer{layer}")),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ShadowSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 1.0,
            ..Default::default()
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("ShadowUniformLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(
                        mem::size_of::<ShadowViewUniform>() as u64
                    ),
                },
                count: None,
            }],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ShadowUniformBuffer"),
            size: mem::size_of::<ShadowViewUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("ShadowStagingBuffer"),
            size: mem::size_of::<ShadowViewUniform>() as u64 * CASCADE_COUNT as u64,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ShadowUniformBindGroup"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("ShadowShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shader/shadow.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("ShadowPipelineLayout"),
            bind_group_layouts: &[&uniform_layout, &instances.bind_layout],
            push_constant_ranges: &[],
        });

        let pipeline = PipelineBuilder::new(device, &pipeline_layout, &shader)
            .with_label("ShadowPipeline")
            .depth_only()
            .with_vertex_buffer(Vertex::layout())
            .with_depth_stencil_biased(
                wgpu::TextureFormat::Depth32Float,
                true,
                wgpu::CompareFunction::LessEqual,
                2,
                2.0,
            )
            .build();

        Self {
            _texture: texture,
            array_view,
            layer_views,
            sampler,
            uniform_buffer,
            uniform_bind_group,
            staging_buffer,
            pipeline,
        }
    }

    pub(crate) fn array_view(&self) -> &wgpu::TextureView {
        &self.array_view
    }

    pub(crate) fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    /// Clear every cascade layer, then draw the shadow units into each one
    /// when `draw` is set. Layers are always cleared so a frame without a
    /// shadow-casting light leaves no stale depth behind.
    pub(crate) fn render(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        matrices: &[Mat4; CASCADE_COUNT],
        assets: &Assets,
        batcher: &InstanceBatcher,
        instances: &InstanceBuffer,
        draw: bool,
    ) -> u32 {
        let uniform_size = mem::size_of::<ShadowViewUniform>() as u64;

        let staged: Vec<ShadowViewUniform> = matrices
            .iter()
            .map(|matrix| ShadowViewUniform {
                view_proj: matrix.to_cols_array_2d(),
            })
            .collect();
        queue.write_buffer(&self.staging_buffer, 0, bytemuck::cast_slice(&staged));

        let mut draw_calls = 0;
        for (layer, view) in self.layer_views.iter().enumerate() {
            encoder.copy_buffer_to_buffer(
                &self.staging_buffer,
                layer as u64 * uniform_size,
                &self.uniform_buffer,
                0,
                uniform_size,
            );

            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("ShadowPass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if !draw {
                continue;
            }

            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.uniform_bind_group, &[]);
            pass.set_bind_group(1, &instances.bind_group, &[]);

            for (key, unit) in batcher.shadow_batches() {
                let Some(buffers) = assets
                    .meshes
                    .get(key.mesh)
                    .and_then(|mesh| mesh.submesh(key.submesh))
                    .and_then(|submesh| submesh.buffers())
                else {
                    log::warn!(
                        "Shadow unit references mesh {} submesh {} without GPU buffers",
                        key.mesh.index(),
                        key.submesh
                    );
                    continue;
                };

                let count = unit.parameters.len() as u32;
                pass.set_vertex_buffer(0, buffers.vertex_buffer().slice(..));
                pass.set_index_buffer(buffers.index_buffer().slice(..), buffers.index_format());
                pass.draw_indexed(0..unit.index_count, 0, unit.offset..unit.offset + count);
                draw_calls += 1;
            }
        }

        draw_calls
    }
}
