pub mod cache;
pub mod handle;

pub use cache::AssetCache;
pub use handle::Handle;

use crate::renderer::{Material, Mesh};

/// Caller-owned asset storage. The renderer borrows this during
/// [`end_frame`](crate::renderer::SceneRenderer::end_frame) to resolve
/// mesh and material handles carried by draw requests.
pub struct Assets {
    pub meshes: AssetCache<Mesh>,
    pub materials: AssetCache<Material>,
}

impl Assets {
    pub fn new() -> Self {
        Self {
            meshes: AssetCache::new(),
            materials: AssetCache::new(),
        }
    }
}

impl Default for Assets {
    fn default() -> Self {
        Self::new()
    }
}
