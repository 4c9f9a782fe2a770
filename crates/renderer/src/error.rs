//! Error types for the frame engine.

use renderer_resources::ResourceError;
use renderer_rhi::RhiError;
use renderer_scene::SceneError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Renderer settings outside the supported range.
    #[error("Invalid renderer configuration: {0}")]
    Config(String),

    /// Rendering was attempted with no swapchain built.
    #[error("Surface is not built")]
    NoSurface,

    /// A worker thread could not be started.
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

pub type RendererResult<T> = Result<T, RendererError>;
