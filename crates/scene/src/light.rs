//! Light definitions and the bounded scene light set.

use glam::Vec3;

use renderer_resources::{GpuLight, MAX_LIGHTS};

use crate::error::{SceneError, SceneResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightKind {
    Ambient = 0,
    Point = 1,
    Directional = 2,
}

/// Shading model the fragment shader applies for a light.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LightingModel {
    #[default]
    Lambert = 0,
    BlinnPhong = 1,
    Phong = 2,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub position: Vec3,
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
    pub model: LightingModel,
}

impl Light {
    pub fn ambient(color: Vec3) -> Self {
        Self {
            kind: LightKind::Ambient,
            position: Vec3::ZERO,
            direction: Vec3::ZERO,
            color,
            intensity: 1.0,
            model: LightingModel::Lambert,
        }
    }

    pub fn point(position: Vec3, color: Vec3) -> Self {
        Self {
            kind: LightKind::Point,
            position,
            direction: Vec3::ZERO,
            color,
            intensity: 250.0,
            model: LightingModel::Phong,
        }
    }

    pub fn directional(direction: Vec3, color: Vec3) -> Self {
        Self {
            kind: LightKind::Directional,
            position: Vec3::ZERO,
            direction,
            color,
            intensity: 1.0,
            model: LightingModel::Lambert,
        }
    }

    pub fn with_intensity(mut self, intensity: f32) -> Self {
        self.intensity = intensity;
        self
    }

    pub fn with_model(mut self, model: LightingModel) -> Self {
        self.model = model;
        self
    }

    pub fn to_gpu(&self) -> GpuLight {
        GpuLight::new(
            self.kind as u32,
            self.position,
            self.direction,
            self.color,
            self.intensity,
            self.model as u32,
        )
    }
}

/// Ordered lights, at most [`MAX_LIGHTS`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LightSet {
    lights: Vec<Light>,
}

impl LightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lights(lights: Vec<Light>) -> SceneResult<Self> {
        if lights.len() > MAX_LIGHTS {
            return Err(SceneError::TooManyLights { max: MAX_LIGHTS });
        }
        Ok(Self { lights })
    }

    pub fn push(&mut self, light: Light) -> SceneResult<()> {
        if self.lights.len() >= MAX_LIGHTS {
            return Err(SceneError::TooManyLights { max: MAX_LIGHTS });
        }
        self.lights.push(light);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Light> {
        self.lights.iter()
    }

    pub fn to_gpu(&self) -> renderer_resources::LightsUbo {
        renderer_resources::LightsUbo::from_lights(self.lights.iter().map(Light::to_gpu))
    }
}
