use thiserror::Error;

/// Failures raised while bringing up the GPU context. Everything after
/// initialization degrades per frame (log and skip) instead of erroring.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("no compatible GPU adapter found: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("failed to create GPU device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}
