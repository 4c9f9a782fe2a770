//! Scene description for the renderer.
//!
//! This crate provides:
//! - Change-tracked transform nodes in a model/object hierarchy
//! - Camera, projection and a keyboard controller
//! - Light definitions
//! - One-shot scene registration and the update queue to the render thread

mod error;

pub mod builder;
pub mod camera;
pub mod controller;
pub mod delta;
pub mod light;
pub mod model;
pub mod transform;

pub use builder::{ModelId, Scene, SceneBuilder};
pub use camera::{Camera, CameraState, CameraView, Projection};
pub use controller::FpsController;
pub use delta::{NodeRef, SceneMessage, SceneReceiver, SceneSender, scene_channel};
pub use error::{SceneError, SceneResult};
pub use light::{Light, LightKind, LightSet, LightingModel};
pub use model::{Model, Object, ObjectKind};
pub use transform::TransformNode;
