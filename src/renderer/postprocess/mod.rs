use std::mem;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use crate::renderer::internal::targets::{RenderTargets, BLOOM_MIP_COUNT, LIT_FORMAT};
use crate::renderer::PipelineBuilder;

/// Toggles and tuning for the post-process chain. The chain runs in a
/// fixed order; each stage can be switched off independently.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessOptions {
    pub outline: bool,
    pub chromatic_aberration: bool,
    pub bloom: bool,
    pub fxaa: bool,
    pub tonemap: bool,
    pub outline_width: f32,
    pub outline_color: Vec3,
    pub aberration_strength: f32,
    pub bloom_threshold: f32,
    pub bloom_intensity: f32,
    pub bloom_filter_radius: f32,
    pub exposure: f32,
    pub gamma: f32,
}

impl Default for PostProcessOptions {
    fn default() -> Self {
        Self {
            outline: false,
            chromatic_aberration: false,
            bloom: true,
            fxaa: true,
            tonemap: true,
            outline_width: 2.0,
            outline_color: Vec3::new(1.0, 0.5, 0.0),
            aberration_strength: 0.005,
            bloom_threshold: 1.0,
            bloom_intensity: 0.1,
            bloom_filter_radius: 0.005,
            exposure: 1.0,
            gamma: 2.2,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PostProcessUniform {
    resolution: [f32; 2],
    outline_width: f32,
    aberration_strength: f32,
    outline_color: [f32; 3],
    bloom_intensity: f32,
    /// x: threshold, y: filter radius.
    bloom_params: [f32; 4],
    /// x: exposure, y: gamma.
    tonemap_params: [f32; 4],
}

impl PostProcessUniform {
    fn new(options: &PostProcessOptions, width: u32, height: u32) -> Self {
        Self {
            resolution: [width as f32, height as f32],
            outline_width: options.outline_width,
            aberration_strength: options.aberration_strength,
            outline_color: options.outline_color.to_array(),
            bloom_intensity: options.bloom_intensity,
            bloom_params: [options.bloom_threshold, options.bloom_filter_radius, 0.0, 0.0],
            tonemap_params: [options.exposure, options.gamma, 0.0, 0.0],
        }
    }
}

/// Bind groups tied to the current render targets. Rebuilt from scratch
/// whenever the targets are recreated.
struct TargetBindGroups {
    temporary_input: wgpu::BindGroup,
    outline: wgpu::BindGroup,
    prefilter_input: wgpu::BindGroup,
    mip_inputs: Vec<wgpu::BindGroup>,
    composite: wgpu::BindGroup,
}

/// Screen-space effect chain over the lit image. Effects ping-pong
/// between the temporary and final targets: each stage reads temporary,
/// writes final, and the result is copied back for the next stage.
pub(crate) struct PostProcessChain {
    sampler: wgpu::Sampler,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    input_layout: wgpu::BindGroupLayout,
    outline_layout: wgpu::BindGroupLayout,
    composite_layout: wgpu::BindGroupLayout,
    outline_pipeline: wgpu::RenderPipeline,
    aberration_pipeline: wgpu::RenderPipeline,
    fxaa_pipeline: wgpu::RenderPipeline,
    tonemap_pipeline: wgpu::RenderPipeline,
    bloom_prefilter_pipeline: wgpu::RenderPipeline,
    bloom_downsample_pipeline: wgpu::RenderPipeline,
    bloom_upsample_pipeline: wgpu::RenderPipeline,
    bloom_composite_pipeline: wgpu::RenderPipeline,
    bind_groups: Option<TargetBindGroups>,
}

impl PostProcessChain {
    pub(crate) fn new(device: &wgpu::Device) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("PostProcessSampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("PostProcessUniformLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(
                        mem::size_of::<PostProcessUniform>() as u64
                    ),
                },
                count: None,
            }],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("PostProcessUniformBuffer"),
            size: mem::size_of::<PostProcessUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("PostProcessUniformBindGroup"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let texture_entry = |binding, filterable| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };

        let input_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("PostProcessInputLayout"),
            entries: &[texture_entry(0, true), sampler_entry(1)],
        });

        // The outline shader reads everything with textureLoad, so the
        // layout carries no sampler.
        let outline_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("PostProcessOutlineLayout"),
            entries: &[
                texture_entry(0, true),
                texture_entry(2, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let composite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("PostProcessCompositeLayout"),
            entries: &[texture_entry(0, true), sampler_entry(1), texture_entry(4, true)],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("PostProcessShader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../../shader/postprocess.wgsl").into()),
        });

        let input_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("PostProcessInputPipelineLayout"),
                bind_group_layouts: &[&uniform_layout, &input_layout],
                push_constant_ranges: &[],
            });
        let outline_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("PostProcessOutlinePipelineLayout"),
                bind_group_layouts: &[&uniform_layout, &outline_layout],
                push_constant_ranges: &[],
            });
        let composite_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("PostProcessCompositePipelineLayout"),
                bind_group_layouts: &[&uniform_layout, &composite_layout],
                push_constant_ranges: &[],
            });

        let effect = |layout: &wgpu::PipelineLayout, label, entry| {
            PipelineBuilder::new(device, layout, &shader)
                .with_label(label)
                .with_vertex_entry("vs_fullscreen")
                .with_fragment_entry(entry)
                .with_color_target(LIT_FORMAT, None)
                .with_no_culling()
                .build()
        };

        let outline_pipeline = effect(&outline_pipeline_layout, "OutlinePipeline", "fs_outline");
        let aberration_pipeline = effect(
            &input_pipeline_layout,
            "ChromaticAberrationPipeline",
            "fs_chromatic_aberration",
        );
        let fxaa_pipeline = effect(&input_pipeline_layout, "FxaaPipeline", "fs_fxaa");
        let tonemap_pipeline = effect(&input_pipeline_layout, "TonemapPipeline", "fs_tonemap");
        let bloom_prefilter_pipeline = effect(
            &input_pipeline_layout,
            "BloomPrefilterPipeline",
            "fs_bloom_prefilter",
        );
        let bloom_downsample_pipeline = effect(
            &input_pipeline_layout,
            "BloomDownsamplePipeline",
            "fs_bloom_downsample",
        );
        let bloom_composite_pipeline = effect(
            &composite_pipeline_layout,
            "BloomCompositePipeline",
            "fs_bloom_composite",
        );

        // Upsample accumulates into the next larger mip additively.
        let additive = wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
            alpha: wgpu::BlendComponent {
                src_factor: wgpu::BlendFactor::One,
                dst_factor: wgpu::BlendFactor::One,
                operation: wgpu::BlendOperation::Add,
            },
        };
        let bloom_upsample_pipeline = PipelineBuilder::new(device, &input_pipeline_layout, &shader)
            .with_label("BloomUpsamplePipeline")
            .with_vertex_entry("vs_fullscreen")
            .with_fragment_entry("fs_bloom_upsample")
            .with_color_target(LIT_FORMAT, Some(additive))
            .with_no_culling()
            .build();

        Self {
            sampler,
            uniform_buffer,
            uniform_bind_group,
            input_layout,
            outline_layout,
            composite_layout,
            outline_pipeline,
            aberration_pipeline,
            fxaa_pipeline,
            tonemap_pipeline,
            bloom_prefilter_pipeline,
            bloom_downsample_pipeline,
            bloom_upsample_pipeline,
            bloom_composite_pipeline,
            bind_groups: None,
        }
    }

    /// Drop the cached target bind groups after a resize.
    pub(crate) fn invalidate(&mut self) {
        self.bind_groups = None;
    }

    fn input_group(&self, device: &wgpu::Device, view: &wgpu::TextureView) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("PostProcessInput"),
            layout: &self.input_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        })
    }

    fn build_bind_groups(
        &self,
        device: &wgpu::Device,
        targets: &RenderTargets,
    ) -> TargetBindGroups {
        let outline = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("PostProcessOutlineBindGroup"),
            layout: &self.outline_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.temporary.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&targets.gbuffer.normal.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&targets.gbuffer.depth_only_view),
                },
            ],
        });

        let composite = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("PostProcessCompositeBindGroup"),
            layout: &self.composite_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.temporary.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&targets.bloom.mips[0].view),
                },
            ],
        });

        TargetBindGroups {
            temporary_input: self.input_group(device, &targets.temporary.view),
            outline,
            prefilter_input: self.input_group(device, &targets.bloom.prefilter.view),
            mip_inputs: targets
                .bloom
                .mips
                .iter()
                .map(|mip| self.input_group(device, &mip.view))
                .collect(),
            composite,
        }
    }

    /// Runs the enabled effects over the lit image and leaves the result
    /// in the final target. Copies the lit image into both ping-pong
    /// targets first so a fully disabled chain still produces the frame.
    pub(crate) fn execute(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        options: &PostProcessOptions,
        targets: &RenderTargets,
    ) {
        let extent = targets.extent();
        encoder.copy_texture_to_texture(
            targets.lit.color.texture.as_image_copy(),
            targets.temporary.texture.as_image_copy(),
            extent,
        );
        encoder.copy_texture_to_texture(
            targets.lit.color.texture.as_image_copy(),
            targets.final_pass.texture.as_image_copy(),
            extent,
        );

        let uniform = PostProcessUniform::new(options, targets.width, targets.height);
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));

        if self.bind_groups.is_none() {
            self.bind_groups = Some(self.build_bind_groups(device, targets));
        }
        let Some(groups) = &self.bind_groups else {
            return;
        };

        if options.outline {
            self.fullscreen(
                encoder,
                &self.outline_pipeline,
                &groups.outline,
                &targets.final_pass.view,
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            );
            Self::feed_back(encoder, targets);
        }

        if options.chromatic_aberration {
            self.fullscreen(
                encoder,
                &self.aberration_pipeline,
                &groups.temporary_input,
                &targets.final_pass.view,
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            );
            Self::feed_back(encoder, targets);
        }

        if options.bloom {
            self.fullscreen(
                encoder,
                &self.bloom_prefilter_pipeline,
                &groups.temporary_input,
                &targets.bloom.prefilter.view,
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            );

            for level in 0..BLOOM_MIP_COUNT {
                let input = if level == 0 {
                    &groups.prefilter_input
                } else {
                    &groups.mip_inputs[level - 1]
                };
                self.fullscreen(
                    encoder,
                    &self.bloom_downsample_pipeline,
                    input,
                    &targets.bloom.mips[level].view,
                    wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                );
            }

            for level in (0..BLOOM_MIP_COUNT - 1).rev() {
                self.fullscreen(
                    encoder,
                    &self.bloom_upsample_pipeline,
                    &groups.mip_inputs[level + 1],
                    &targets.bloom.mips[level].view,
                    wgpu::LoadOp::Load,
                );
            }

            self.fullscreen(
                encoder,
                &self.bloom_composite_pipeline,
                &groups.composite,
                &targets.final_pass.view,
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            );
            Self::feed_back(encoder, targets);
        }

        if options.fxaa {
            self.fullscreen(
                encoder,
                &self.fxaa_pipeline,
                &groups.temporary_input,
                &targets.final_pass.view,
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            );
            Self::feed_back(encoder, targets);
        }

        if options.tonemap {
            self.fullscreen(
                encoder,
                &self.tonemap_pipeline,
                &groups.temporary_input,
                &targets.final_pass.view,
                wgpu::LoadOp::Clear(wgpu::Color::BLACK),
            );
            Self::feed_back(encoder, targets);
        }
    }

    fn fullscreen(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::RenderPipeline,
        input: &wgpu::BindGroup,
        output: &wgpu::TextureView,
        load: wgpu::LoadOp<wgpu::Color>,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("PostProcessPass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                depth_slice: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        pass.set_bind_group(1, input, &[]);
        pass.draw(0..3, 0..1);
    }

    /// Copy final back into temporary so the next stage reads this
    /// stage's output.
    fn feed_back(encoder: &mut wgpu::CommandEncoder, targets: &RenderTargets) {
        encoder.copy_texture_to_texture(
            targets.final_pass.texture.as_image_copy(),
            targets.temporary.texture.as_image_copy(),
            targets.extent(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_size_matches_wgsl_layout() {
        assert_eq!(mem::size_of::<PostProcessUniform>(), 64);
    }

    #[test]
    fn defaults_enable_the_standard_chain() {
        let options = PostProcessOptions::default();
        assert!(options.bloom);
        assert!(options.fxaa);
        assert!(options.tonemap);
        assert!(!options.outline);
        assert!(!options.chromatic_aberration);
    }
}
