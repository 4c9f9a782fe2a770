//! Error types for resource loading.

use std::path::PathBuf;

use renderer_rhi::RhiError;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// GPU-side failure while creating or filling a resource.
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A video source produced no first frame.
    #[error("Could not load first frame of {0}")]
    EmptyStream(String),

    /// Decoded data does not match what the source announced.
    #[error("Decode error: {0}")]
    Decode(String),

    /// File not found.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The resource has not finished loading.
    #[error("Resource not loaded: {0}")]
    NotLoaded(String),

    /// A one-time handoff was requested twice.
    #[error("Already taken: {0}")]
    AlreadyTaken(String),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
