//! Deferred scene renderer: cascaded shadow maps, an instanced G-buffer
//! pass, stencil-partitioned lighting and sky passes, and a screen-space
//! post-process chain, all drawing into offscreen targets.

pub mod batch;
pub mod camera;
pub mod cascade;
pub mod error;
pub mod lights;
pub mod material;
pub mod mesh;
pub mod pipeline_builder;
pub mod postprocess;
pub mod primitives;
pub mod scene_renderer;
pub mod vertex;

mod internal;

pub use batch::{DrawRequest, InstanceBatcher, InstanceParameter, InstancingUnit, UnitKey};
pub use camera::Camera;
pub use error::RendererError;
pub use lights::{DirectionalLight, SkyEnvironment, SkyLight, INTENSITY_SCALE};
pub use material::{Material, MaterialData, ShadingModel};
pub use mesh::{Mesh, SubMesh, SubMeshBuffers};
pub use pipeline_builder::PipelineBuilder;
pub use postprocess::PostProcessOptions;
pub use scene_renderer::{RenderStats, SceneRenderer};
pub use vertex::Vertex;
