//! One-shot scene registration.

use tracing::debug;

use crate::camera::Camera;
use crate::error::{SceneError, SceneResult};
use crate::light::{Light, LightSet};
use crate::model::Model;

/// Index of a model in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelId(pub usize);

/// Collects models, lights and the camera before rendering starts.
///
/// The frame scheduler consumes the builder, so nothing can be added later.
#[derive(Debug, Default)]
pub struct SceneBuilder {
    models: Vec<Model>,
    lights: LightSet,
    camera: Option<Camera>,
}

impl SceneBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_model(&mut self, model: Model) -> ModelId {
        let id = ModelId(self.models.len());
        debug!(model = model.name(), objects = model.len(), "Registered model");
        self.models.push(model);
        id
    }

    pub fn add_light(&mut self, light: Light) -> SceneResult<()> {
        self.lights.push(light)
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = Some(camera);
    }

    /// Access a registered model, e.g. to set its initial pose.
    pub fn model_mut(&mut self, id: ModelId) -> Option<&mut Model> {
        self.models.get_mut(id.0)
    }

    pub fn build(self) -> SceneResult<Scene> {
        let camera = self.camera.ok_or(SceneError::NoCamera)?;
        Ok(Scene {
            models: self.models,
            lights: self.lights,
            camera,
        })
    }
}

/// A finished scene, ready to hand to the renderer.
#[derive(Debug)]
pub struct Scene {
    pub models: Vec<Model>,
    pub lights: LightSet,
    pub camera: Camera,
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use renderer_resources::MAX_LIGHTS;

    #[test]
    fn test_build_without_camera_fails() {
        let mut builder = SceneBuilder::new();
        builder.add_model(Model::new("m"));
        assert!(matches!(builder.build(), Err(SceneError::NoCamera)));
    }

    #[test]
    fn test_model_ids_follow_registration_order() {
        let mut builder = SceneBuilder::new();
        let a = builder.add_model(Model::new("a"));
        let b = builder.add_model(Model::new("b"));
        assert_eq!(a, ModelId(0));
        assert_eq!(b, ModelId(1));

        builder
            .model_mut(b)
            .unwrap()
            .translate(Vec3::new(1.0, 0.0, 0.0));
        builder.set_camera(Camera::default());

        let scene = builder.build().unwrap();
        assert_eq!(scene.models[1].name(), "b");
        assert_eq!(scene.models[1].transform().version(), 1);
    }

    #[test]
    fn test_light_limit() {
        let mut builder = SceneBuilder::new();
        for _ in 0..MAX_LIGHTS {
            builder.add_light(Light::ambient(Vec3::ONE)).unwrap();
        }
        assert!(matches!(
            builder.add_light(Light::ambient(Vec3::ONE)),
            Err(SceneError::TooManyLights { .. })
        ));
    }
}
