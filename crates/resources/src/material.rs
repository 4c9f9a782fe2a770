//! Surface materials as a mesh parser describes them.

use std::path::PathBuf;

use glam::Vec3;

use crate::texture::TextureSource;

/// Phong-style material.
///
/// Only the diffuse term feeds a texture: a diffuse map when one is given,
/// otherwise a 1×1 image of the diffuse color.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub specular: Vec3,
    pub specular_exponent: f32,
    /// Image file used instead of the flat diffuse color.
    pub diffuse_map: Option<PathBuf>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            ambient: Vec3::ONE,
            diffuse: Vec3::ONE,
            specular: Vec3::ONE,
            specular_exponent: 10.0,
            diffuse_map: None,
        }
    }
}

impl Material {
    /// A flat-colored material.
    pub fn solid(name: impl Into<String>, diffuse: Vec3) -> Self {
        Self {
            name: name.into(),
            diffuse,
            ..Self::default()
        }
    }

    /// A material whose diffuse term comes from an image file.
    pub fn textured(name: impl Into<String>, diffuse_map: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            diffuse_map: Some(diffuse_map.into()),
            ..Self::default()
        }
    }

    /// Where this material's texture comes from.
    pub fn texture_source(&self) -> TextureSource {
        match &self.diffuse_map {
            Some(path) => TextureSource::Image(path.clone()),
            None => TextureSource::Color(linear_to_rgba(self.diffuse)),
        }
    }
}

/// Scale a linear [0, 1] color to RGBA bytes with opaque alpha.
///
/// Channels are clamped first, so out-of-range input saturates.
pub fn linear_to_rgba(linear: Vec3) -> [u8; 4] {
    let channel = |c: f32| (c.clamp(0.0, 1.0) * 255.0) as u8;
    [channel(linear.x), channel(linear.y), channel(linear.z), 255]
}
