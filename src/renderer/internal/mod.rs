//! GPU-side plumbing behind [`crate::renderer::SceneRenderer`]. Nothing in
//! here is part of the public API.

mod buffers;
mod context;
mod geometry;
mod lighting;
mod shadows;
mod sky;
pub(crate) mod targets;

pub(crate) use buffers::{CameraBuffer, FrameMaterialsBuffer, InstanceBuffer};
pub(crate) use context::RenderContext;
pub(crate) use geometry::GeometryPass;
pub(crate) use lighting::LightingPass;
pub(crate) use shadows::ShadowPass;
pub(crate) use sky::SkyPass;
pub(crate) use targets::RenderTargets;
