pub mod asset;
pub mod renderer;
pub mod settings;

pub use asset::{AssetCache, Assets, Handle};
pub use renderer::{
    Camera, DirectionalLight, DrawRequest, Material, Mesh, PostProcessOptions, RenderStats,
    RendererError, SceneRenderer, ShadingModel, SkyEnvironment, SkyLight, SubMesh,
};
pub use settings::RenderSettings;

pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .try_init();
}
