//! Error types for scene construction and updates.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    /// The scene was finished without a camera.
    #[error("Scene has no camera")]
    NoCamera,

    /// More lights than the shader's light array holds.
    #[error("Too many lights (at most {max})")]
    TooManyLights { max: usize },

    /// A projection parameter outside its valid range.
    #[error("Invalid projection: {0}")]
    InvalidProjection(String),

    /// A delta named a model or object that does not exist.
    #[error("Unknown scene node: {0}")]
    UnknownNode(String),

    /// The render side of the scene queue is gone.
    #[error("Scene queue disconnected")]
    Disconnected,
}

pub type SceneResult<T> = Result<T, SceneError>;
