use std::mem;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4};
use wgpu::util::DeviceExt;

use crate::renderer::internal::targets::{RenderTargets, DEPTH_FORMAT, LIT_FORMAT};
use crate::renderer::lights::{SkyEnvironment, SkyLight, INTENSITY_SCALE};
use crate::renderer::primitives::cube_vertices;
use crate::renderer::{Camera, PipelineBuilder, Vertex};

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SkyUniform {
    projection: [[f32; 4]; 4],
    /// View with the translation stripped so the sky stays at infinity.
    view_rotation: [[f32; 4]; 4],
    /// x: intensity, rest unused.
    params: [f32; 4],
}

/// Cubemap background drawn after lighting. Stencil reference 0 restricts
/// it to pixels the geometry pass left untouched, and the `xyww` trick in
/// the shader pins it to the far plane.
pub(crate) struct SkyPass {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    environment_layout: wgpu::BindGroupLayout,
    environment_bind_group: Option<wgpu::BindGroup>,
    sampler: wgpu::Sampler,
    pipeline: wgpu::RenderPipeline,
}

impl SkyPass {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let (vertices, indices) = cube_vertices();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("SkyCubeVertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("SkyCubeIndices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SkyUniformLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(mem::size_of::<SkyUniform>() as u64),
                },
                count: None,
            }],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("SkyUniformBuffer"),
            size: mem::size_of::<SkyUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("SkyUniformBindGroup"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let environment_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("SkyEnvironmentLayout"),
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
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("SkySampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("SkyShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shader/sky.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("SkyPipelineLayout"),
            bind_group_layouts: &[&uniform_layout, &environment_layout],
            push_constant_ranges: &[],
        });

        let stencil_background = wgpu::StencilFaceState {
            compare: wgpu::CompareFunction::Equal,
            fail_op: wgpu::StencilOperation::Keep,
            depth_fail_op: wgpu::StencilOperation::Keep,
            pass_op: wgpu::StencilOperation::Keep,
        };

        // The camera sits inside the cube, so the front faces get culled
        // and the back faces are drawn.
        let pipeline = PipelineBuilder::new(device, &pipeline_layout, &shader)
            .with_label("SkyPipeline")
            .with_vertex_buffer(Vertex::layout())
            .with_color_target(LIT_FORMAT, None)
            .with_depth_stencil_state(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState {
                    front: stencil_background,
                    back: stencil_background,
                    read_mask: 0xFF,
                    write_mask: 0,
                },
                bias: wgpu::DepthBiasState::default(),
            })
            .with_front_culling()
            .build();

        Self {
            vertex_buffer,
            index_buffer,
            index_count: 36,
            uniform_buffer,
            uniform_bind_group,
            environment_layout,
            environment_bind_group: None,
            sampler,
            pipeline,
        }
    }

    pub(crate) fn set_environment(
        &mut self,
        device: &wgpu::Device,
        environment: Option<&SkyEnvironment>,
    ) {
        self.environment_bind_group = environment.map(|env| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("SkyEnvironmentBindGroup"),
                layout: &self.environment_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&env.cubemap),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&self.sampler),
                    },
                ],
            })
        });
    }

    /// Draws into the lit target, skipped entirely when no environment
    /// cubemap has been set.
    pub(crate) fn render(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        targets: &RenderTargets,
        camera: &Camera,
        sky: &SkyLight,
    ) {
        let Some(environment_bind_group) = &self.environment_bind_group else {
            return;
        };

        let rotation = Mat4::from_mat3(Mat3::from_mat4(camera.view));
        let uniform = SkyUniform {
            projection: camera.projection.to_cols_array_2d(),
            view_rotation: rotation.to_cols_array_2d(),
            params: [sky.intensity * INTENSITY_SCALE, 0.0, 0.0, 0.0],
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("SkyPass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &targets.lit.color.view,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
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
        pass.set_stencil_reference(0);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        pass.set_bind_group(1, environment_bind_group, &[]);
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}
