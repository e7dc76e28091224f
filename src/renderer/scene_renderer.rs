use glam::Mat4;

use crate::asset::{Assets, Handle};
use crate::renderer::batch::{DrawRequest, InstanceBatcher, InstanceParameter};
use crate::renderer::cascade::cascade_matrices;
use crate::renderer::internal::{
    CameraBuffer, FrameMaterialsBuffer, GeometryPass, InstanceBuffer, LightingPass, RenderContext,
    RenderTargets, ShadowPass, SkyPass,
};
use crate::renderer::lights::{DirectionalLight, SkyLight};
use crate::renderer::material::Material;
use crate::renderer::postprocess::{PostProcessChain, PostProcessOptions};
use crate::renderer::{Camera, RendererError};
use crate::settings::{RenderSettings, CASCADE_COUNT};

/// Counters for the most recently rendered frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub mesh_count: u32,
    pub geometry_draw_calls: u32,
    pub shadow_draw_calls: u32,
}

/// Everything submitted between `begin_frame` and `end_frame`.
struct FrameState {
    camera: Camera,
    draw_list: Vec<DrawRequest>,
    directional_light: Option<DirectionalLight>,
    sky_light: Option<SkyLight>,
    should_render_geometry: bool,
    options: PostProcessOptions,
    stats: RenderStats,
}

impl FrameState {
    fn new() -> Self {
        Self {
            camera: Camera::default(),
            draw_list: Vec::new(),
            directional_light: None,
            sky_light: None,
            should_render_geometry: false,
            options: PostProcessOptions::default(),
            stats: RenderStats::default(),
        }
    }

    /// Per-frame option overrides and statistics reset along with the rest
    /// of the frame, so callers re-apply overrides after `begin_frame`.
    fn reset(&mut self, camera: &Camera) {
        self.camera = *camera;
        self.draw_list.clear();
        self.directional_light = None;
        self.sky_light = None;
        self.should_render_geometry = false;
        self.options = PostProcessOptions::default();
        self.stats = RenderStats::default();
    }

    /// The mesh-drawn counter advances at submission time, so stats read
    /// mid-frame already reflect what has been queued.
    fn record_draw_request(&mut self, request: DrawRequest) {
        self.should_render_geometry = true;
        self.stats.mesh_count += 1;
        self.draw_list.push(request);
    }
}

/// What a requested viewport size means for the current targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewportChange {
    Minimize,
    Unchanged,
    Resize,
}

fn classify_viewport_change(current: (u32, u32), requested: (u32, u32)) -> ViewportChange {
    if requested.0 == 0 || requested.1 == 0 {
        ViewportChange::Minimize
    } else if requested == current {
        ViewportChange::Unchanged
    } else {
        ViewportChange::Resize
    }
}

/// Which target holds the finished frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinalOutput {
    PostProcess,
    GBufferAlbedo,
}

fn final_output(post_process_enabled: bool) -> FinalOutput {
    if post_process_enabled {
        FinalOutput::PostProcess
    } else {
        FinalOutput::GBufferAlbedo
    }
}

/// Pick coordinates validated against the target size; out-of-bounds
/// requests resolve to the background sentinel without touching the GPU.
fn pick_coordinates(x: u32, y: u32, width: u32, height: u32) -> Option<(u32, u32)> {
    if x < width && y < height {
        Some((x, y))
    } else {
        None
    }
}

fn decode_entity(data: &[u8]) -> i32 {
    bytemuck::pod_read_unaligned::<i32>(&data[0..4])
}

/// Retained-free scene renderer. Callers resubmit the camera, lights and
/// draw requests every frame; `end_frame` batches them and runs the full
/// pass pipeline into offscreen targets.
pub struct SceneRenderer {
    context: RenderContext,
    settings: RenderSettings,
    targets: RenderTargets,
    camera_buffer: CameraBuffer,
    geometry_instances: InstanceBuffer,
    shadow_instances: InstanceBuffer,
    frame_materials: FrameMaterialsBuffer,
    shadow_pass: ShadowPass,
    geometry_pass: GeometryPass,
    lighting_pass: LightingPass,
    sky_pass: SkyPass,
    postprocess: PostProcessChain,
    batcher: InstanceBatcher,
    frame: FrameState,
    scratch: Vec<InstanceParameter>,
    post_process_enabled: bool,
    default_material: Handle<Material>,
    minimized: bool,
    pick_buffer: wgpu::Buffer,
}

impl SceneRenderer {
    pub async fn new(
        settings: RenderSettings,
        assets: &mut Assets,
    ) -> Result<Self, RendererError> {
        let context = RenderContext::new().await?;
        let device = &context.device;

        let targets = RenderTargets::new(
            device,
            settings.resolution.width,
            settings.resolution.height,
        );

        let camera_buffer = CameraBuffer::new(device);
        let geometry_instances =
            InstanceBuffer::new(device, "GeometryInstances", settings.max_instances);
        let shadow_instances =
            InstanceBuffer::new(device, "ShadowInstances", settings.max_instances);
        let frame_materials = FrameMaterialsBuffer::new(device, settings.max_instances);

        let shadow_pass = ShadowPass::new(device, &shadow_instances, settings.shadow_map_size);
        let geometry_pass = GeometryPass::new(
            device,
            &context.queue,
            &camera_buffer,
            &geometry_instances,
            &frame_materials,
        );
        let lighting_pass = LightingPass::new(device, &shadow_pass);
        let sky_pass = SkyPass::new(device);
        let postprocess = PostProcessChain::new(device);

        let default_material = assets.materials.insert(Material::default_white());
        let batcher = InstanceBatcher::new(settings.max_instances);

        log::info!(
            "Scene renderer ready: {}x{}, {} instance slots, {}px shadow cascades",
            settings.resolution.width,
            settings.resolution.height,
            settings.max_instances,
            settings.shadow_map_size
        );

        let pick_buffer = context.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("EntityPickBuffer"),
            size: 256,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(Self {
            context,
            settings,
            targets,
            camera_buffer,
            geometry_instances,
            shadow_instances,
            frame_materials,
            shadow_pass,
            geometry_pass,
            lighting_pass,
            sky_pass,
            postprocess,
            batcher,
            frame: FrameState::new(),
            scratch: Vec::new(),
            post_process_enabled: true,
            default_material,
            minimized: false,
            pick_buffer,
        })
    }

    pub fn new_blocking(
        settings: RenderSettings,
        assets: &mut Assets,
    ) -> Result<Self, RendererError> {
        pollster::block_on(Self::new(settings, assets))
    }

    pub fn begin_frame(&mut self, camera: &Camera) {
        self.frame.reset(camera);
        self.batcher.clear();
    }

    pub fn add_draw_request(&mut self, request: DrawRequest) {
        self.frame.record_draw_request(request);
    }

    pub fn set_directional_light(&mut self, light: DirectionalLight) {
        self.frame.directional_light = Some(light);
    }

    pub fn set_sky_light(&mut self, sky: &SkyLight) {
        self.lighting_pass
            .set_environment(&self.context.device, sky.environment.as_ref());
        self.sky_pass
            .set_environment(&self.context.device, sky.environment.as_ref());
        self.frame.sky_light = Some(sky.clone());
    }

    /// Batch the submitted frame and run the pass pipeline. A minimized
    /// viewport skips rendering entirely but keeps the frame state valid.
    pub fn end_frame(&mut self, assets: &Assets) {
        if self.minimized {
            return;
        }

        let queue = &self.context.queue;

        for request in &self.frame.draw_list {
            self.batcher
                .add_request(request, assets, self.default_material);
        }

        self.batcher.flatten_shadow(&mut self.scratch);
        self.shadow_instances.upload(queue, &self.scratch);
        self.batcher.flatten_geometry(&mut self.scratch);
        self.geometry_instances.upload(queue, &self.scratch);
        self.frame_materials.upload(
            queue,
            self.batcher.frame_materials(),
            assets,
            self.default_material,
        );
        self.camera_buffer.update(queue, &self.frame.camera);

        let light = self.frame.directional_light;
        let splits = self.settings.cascade_splits;
        let draw_shadows = light.map_or(false, |l| l.cast_shadows)
            && self.frame.should_render_geometry
            && self.batcher.shadow_instance_count() > 0;
        let matrices = match light {
            Some(light) => cascade_matrices(&self.frame.camera, &splits, light.direction),
            None => [Mat4::IDENTITY; CASCADE_COUNT],
        };

        self.lighting_pass.update(
            queue,
            &self.frame.camera,
            light.as_ref(),
            self.frame.sky_light.as_ref(),
            &matrices,
            &splits,
            draw_shadows,
        );

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("FrameEncoder"),
                });

        let shadow_draw_calls = self.shadow_pass.render(
            queue,
            &mut encoder,
            &matrices,
            assets,
            &self.batcher,
            &self.shadow_instances,
            draw_shadows,
        );

        let geometry_draw_calls = self.geometry_pass.render(
            &self.context.device,
            &mut encoder,
            &self.targets.gbuffer,
            assets,
            &self.batcher,
            &self.camera_buffer,
            &self.geometry_instances,
            &self.frame_materials,
        );

        self.lighting_pass
            .render(&self.context.device, &mut encoder, &self.targets);

        if let Some(sky) = &self.frame.sky_light {
            if sky.render_sky {
                self.sky_pass
                    .render(queue, &mut encoder, &self.targets, &self.frame.camera, sky);
            }
        }

        if self.post_process_enabled {
            self.postprocess.execute(
                &self.context.device,
                queue,
                &mut encoder,
                &self.frame.options,
                &self.targets,
            );
        }

        queue.submit(Some(encoder.finish()));

        self.frame.stats.geometry_draw_calls = geometry_draw_calls;
        self.frame.stats.shadow_draw_calls = shadow_draw_calls;
    }

    /// A zero-sized viewport marks the renderer minimized until the next
    /// non-zero resize.
    pub fn set_viewport_size(&mut self, width: u32, height: u32) {
        match classify_viewport_change(
            (self.targets.width, self.targets.height),
            (width, height),
        ) {
            ViewportChange::Minimize => {
                self.minimized = true;
            }
            ViewportChange::Unchanged => {
                self.minimized = false;
            }
            ViewportChange::Resize => {
                self.minimized = false;
                self.targets.resize(&self.context.device, width, height);
                self.lighting_pass.invalidate_gbuffer();
                self.postprocess.invalidate();
            }
        }
    }

    /// View holding the finished frame: the post-process output, or the
    /// raw G-buffer albedo when the chain is disabled.
    pub fn final_render_view(&self) -> &wgpu::TextureView {
        match final_output(self.post_process_enabled) {
            FinalOutput::PostProcess => &self.targets.final_pass.view,
            FinalOutput::GBufferAlbedo => &self.targets.gbuffer.albedo.view,
        }
    }

    /// Entity id under the given pixel, or -1 for background or failure.
    /// Blocks on a single-pixel readback of the id attachment.
    pub fn read_entity_id(&self, x: u32, y: u32) -> i32 {
        let Some((x, y)) = pick_coordinates(x, y, self.targets.width, self.targets.height) else {
            return -1;
        };

        let mut encoder =
            self.context
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("EntityPickEncoder"),
                });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.targets.gbuffer.id.texture,
                mip_level: 0,
                origin: wgpu::Origin3d { x, y, z: 0 },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &self.pick_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(256),
                    rows_per_image: None,
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        self.context.queue.submit(Some(encoder.finish()));

        let slice = self.pick_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        if let Err(err) = self.context.device.poll(wgpu::PollType::wait_indefinitely()) {
            log::warn!("Device poll failed during entity pick: {err:?}");
            return -1;
        }

        match receiver.recv() {
            Ok(Ok(())) => {
                let entity = {
                    let data = slice.get_mapped_range();
                    decode_entity(&data)
                };
                self.pick_buffer.unmap();
                entity
            }
            Ok(Err(err)) => {
                log::warn!("Entity pick readback failed: {err}");
                -1
            }
            Err(_) => {
                log::warn!("Entity pick readback callback was dropped");
                -1
            }
        }
    }

    pub fn stats(&self) -> RenderStats {
        self.frame.stats
    }

    /// Post-process overrides for the current frame. Reset to defaults by
    /// `begin_frame`.
    pub fn options(&self) -> &PostProcessOptions {
        &self.frame.options
    }

    pub fn options_mut(&mut self) -> &mut PostProcessOptions {
        &mut self.frame.options
    }

    pub fn post_process_enabled(&self) -> bool {
        self.post_process_enabled
    }

    pub fn set_post_process_enabled(&mut self, enabled: bool) {
        self.post_process_enabled = enabled;
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn default_material(&self) -> Handle<Material> {
        self.default_material
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(entity_id: i32) -> DrawRequest {
        DrawRequest {
            mesh: Handle::new(0),
            materials: Vec::new(),
            transform: Mat4::IDENTITY,
            entity_id,
            cast_shadow: true,
        }
    }

    #[test]
    fn frame_state_reset_is_idempotent() {
        let mut frame = FrameState::new();
        let camera = Camera::default();

        frame.record_draw_request(request(1));
        frame.directional_light = Some(DirectionalLight::default());
        frame.sky_light = Some(SkyLight::default());
        frame.options.bloom = false;

        frame.reset(&camera);
        assert!(frame.draw_list.is_empty());
        assert!(frame.directional_light.is_none());
        assert!(frame.sky_light.is_none());
        assert!(!frame.should_render_geometry);
        assert!(frame.options.bloom);
        assert_eq!(frame.stats, RenderStats::default());

        frame.reset(&camera);
        assert!(frame.draw_list.is_empty());
    }

    #[test]
    fn recording_requests_counts_meshes_immediately() {
        let mut frame = FrameState::new();

        frame.record_draw_request(request(1));
        assert_eq!(frame.stats.mesh_count, 1);
        assert!(frame.should_render_geometry);

        frame.record_draw_request(request(2));
        assert_eq!(frame.stats.mesh_count, 2);
        assert_eq!(frame.draw_list.len(), 2);

        frame.reset(&Camera::default());
        assert_eq!(frame.stats.mesh_count, 0);
    }

    #[test]
    fn stats_default_to_zero() {
        assert_eq!(RenderStats::default(), RenderStats {
            mesh_count: 0,
            geometry_draw_calls: 0,
            shadow_draw_calls: 0,
        });
    }

    #[test]
    fn zero_sized_viewport_minimizes_instead_of_resizing() {
        let current = (1920, 1080);
        assert_eq!(
            classify_viewport_change(current, (0, 1080)),
            ViewportChange::Minimize
        );
        assert_eq!(
            classify_viewport_change(current, (1920, 0)),
            ViewportChange::Minimize
        );
        assert_eq!(
            classify_viewport_change(current, (0, 0)),
            ViewportChange::Minimize
        );
    }

    #[test]
    fn matching_viewport_size_skips_target_rebuild() {
        assert_eq!(
            classify_viewport_change((1280, 720), (1280, 720)),
            ViewportChange::Unchanged
        );
        assert_eq!(
            classify_viewport_change((1280, 720), (1280, 721)),
            ViewportChange::Resize
        );
        assert_eq!(
            classify_viewport_change((1280, 720), (640, 360)),
            ViewportChange::Resize
        );
    }

    #[test]
    fn final_output_follows_post_process_toggle() {
        assert_eq!(final_output(true), FinalOutput::PostProcess);
        assert_eq!(final_output(false), FinalOutput::GBufferAlbedo);
    }

    #[test]
    fn out_of_bounds_picks_are_rejected() {
        assert_eq!(pick_coordinates(0, 0, 800, 600), Some((0, 0)));
        assert_eq!(pick_coordinates(799, 599, 800, 600), Some((799, 599)));
        assert_eq!(pick_coordinates(800, 0, 800, 600), None);
        assert_eq!(pick_coordinates(0, 600, 800, 600), None);
        assert_eq!(pick_coordinates(0, 0, 0, 0), None);
    }

    #[test]
    fn pick_readback_decodes_background_sentinel() {
        let background = (-1i32).to_ne_bytes();
        assert_eq!(decode_entity(&background), -1);

        let mut texel = [0u8; 16];
        texel[0..4].copy_from_slice(&42i32.to_ne_bytes());
        assert_eq!(decode_entity(&texel), 42);
    }
}
