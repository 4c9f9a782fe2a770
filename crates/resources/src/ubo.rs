//! Uniform Buffer Object (UBO) structures for shader data.
//!
//! All structures use `#[repr(C)]` and implement `bytemuck::Pod` so they can be
//! written into host-visible uniform buffers with `bytemuck::bytes_of`.
//!
//! # Overview
//!
//! - [`CameraUbo`]: view/projection matrices and eye position (set 0, binding 0)
//! - [`LightsUbo`]: fixed-size light array plus count (set 0, binding 1)
//! - [`NodeUbo`]: accumulated translation and rotation of one scene node
//!   (set 1 for models, set 2 for objects)
//!
//! # GPU Memory Layout
//!
//! All structures follow std140 layout rules for uniform buffers:
//! - `Mat4` is 64 bytes (16 floats)
//! - `Vec3` is 12 bytes but must be aligned to 16 bytes
//! - Arrays of structs have a 16-byte stride
//!
//! # Example
//!
//! ```
//! use renderer_resources::ubo::{CameraUbo, NodeUbo};
//! use glam::{Mat4, Vec3};
//!
//! let camera = CameraUbo::new(
//!     Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y),
//!     Mat4::perspective_rh(45.0_f32.to_radians(), 16.0 / 9.0, 0.1, 100.0),
//!     Vec3::new(0.0, 0.0, 5.0),
//! );
//! let node = NodeUbo::new(Mat4::IDENTITY, Mat4::IDENTITY);
//!
//! let camera_bytes: &[u8] = bytemuck::bytes_of(&camera);
//! let node_bytes: &[u8] = bytemuck::bytes_of(&node);
//! assert_eq!(camera_bytes.len(), CameraUbo::size());
//! assert_eq!(node_bytes.len(), NodeUbo::size());
//! ```

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

/// Upper bound on lights in a scene; the shader array has this many entries.
pub const MAX_LIGHTS: usize = 16;

/// Camera uniform buffer object.
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | view |
/// | 64     | 64   | projection |
/// | 128    | 64   | view_projection |
/// | 192    | 12   | camera_position |
/// | 204    | 4    | _padding |
///
/// Total size: 208 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CameraUbo {
    /// World space to camera space.
    pub view: Mat4,
    /// Camera space to clip space, Y already flipped for Vulkan.
    pub projection: Mat4,
    /// Pre-computed `projection * view`.
    pub view_projection: Mat4,
    /// Eye position in world space, used for specular terms.
    pub camera_position: Vec3,
    pub _padding: f32,
}

impl CameraUbo {
    /// Creates a camera UBO; the view-projection matrix is derived.
    #[inline]
    pub fn new(view: Mat4, projection: Mat4, camera_position: Vec3) -> Self {
        Self {
            view,
            projection,
            view_projection: projection * view,
            camera_position,
            _padding: 0.0,
        }
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// One light as the fragment shader sees it.
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 16   | position (w unused) |
/// | 16     | 16   | direction (w unused) |
/// | 32     | 16   | color (w unused) |
/// | 48     | 16   | data: kind, intensity, lighting model, unused |
///
/// Total size: 64 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    pub position: Vec4,
    pub direction: Vec4,
    pub color: Vec4,
    /// `[kind, intensity, model, 0]`, with kind and model stored as floats.
    pub data: Vec4,
}

impl GpuLight {
    pub fn new(
        kind: u32,
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        intensity: f32,
        model: u32,
    ) -> Self {
        Self {
            position: position.extend(1.0),
            direction: direction.normalize_or_zero().extend(0.0),
            color: color.extend(1.0),
            data: Vec4::new(kind as f32, intensity, model as f32, 0.0),
        }
    }

    #[inline]
    pub fn kind(&self) -> u32 {
        self.data.x as u32
    }

    #[inline]
    pub fn intensity(&self) -> f32 {
        self.data.y
    }

    #[inline]
    pub fn model(&self) -> u32 {
        self.data.z as u32
    }
}

/// The scene's light array.
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 16   | count (x), rest unused |
/// | 16     | 1024 | lights[16] |
///
/// Total size: 1040 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct LightsUbo {
    pub count: [u32; 4],
    pub lights: [GpuLight; MAX_LIGHTS],
}

impl Default for LightsUbo {
    fn default() -> Self {
        Self::zeroed()
    }
}

impl LightsUbo {
    /// Pack up to [`MAX_LIGHTS`] lights; extras are ignored.
    pub fn from_lights(lights: impl IntoIterator<Item = GpuLight>) -> Self {
        let mut ubo = Self::default();
        for (slot, light) in ubo.lights.iter_mut().zip(lights) {
            *slot = light;
            ubo.count[0] += 1;
        }
        ubo
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count[0] as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count[0] == 0
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// Accumulated transform of one model or object.
///
/// Translation and rotation are kept apart so the vertex shader can rotate
/// about a pivot before translating.
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | translation |
/// | 64     | 64   | rotation |
///
/// Total size: 128 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct NodeUbo {
    pub translation: Mat4,
    pub rotation: Mat4,
}

impl Default for NodeUbo {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

impl NodeUbo {
    #[inline]
    pub fn new(translation: Mat4, rotation: Mat4) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    /// The combined model matrix, translation applied last.
    #[inline]
    pub fn model_matrix(&self) -> Mat4 {
        self.translation * self.rotation
    }

    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn test_camera_ubo_size() {
        // 64 + 64 + 64 + 12 + 4 = 208 bytes
        assert_eq!(size_of::<CameraUbo>(), 208);
        assert_eq!(CameraUbo::size(), 208);
        assert!(align_of::<CameraUbo>() >= 4);
    }

    #[test]
    fn test_camera_ubo_new() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let projection = Mat4::perspective_rh(45.0_f32.to_radians(), 1.0, 0.1, 100.0);
        let position = Vec3::new(0.0, 0.0, 5.0);

        let ubo = CameraUbo::new(view, projection, position);

        assert_eq!(ubo.view, view);
        assert_eq!(ubo.projection, projection);
        assert_eq!(ubo.view_projection, projection * view);
        assert_eq!(ubo.camera_position, position);
    }

    #[test]
    fn test_gpu_light_layout() {
        assert_eq!(size_of::<GpuLight>(), 64);

        let light = GpuLight::new(1, Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, Vec3::ONE, 250.0, 2);
        assert_eq!(light.kind(), 1);
        assert_eq!(light.intensity(), 250.0);
        assert_eq!(light.model(), 2);
        assert_eq!(light.data.w, 0.0);
        // Zero-length direction must not turn into NaN.
        assert_eq!(light.direction, Vec4::ZERO);
    }

    #[test]
    fn test_lights_ubo_size() {
        // 16 + 16 * 64 = 1040 bytes
        assert_eq!(size_of::<LightsUbo>(), 1040);
        assert_eq!(LightsUbo::size(), 1040);
    }

    #[test]
    fn test_lights_ubo_truncates_to_capacity() {
        let light = GpuLight::new(0, Vec3::ZERO, Vec3::Y, Vec3::ONE, 1.0, 0);
        let ubo = LightsUbo::from_lights(std::iter::repeat_n(light, MAX_LIGHTS + 4));
        assert_eq!(ubo.len(), MAX_LIGHTS);

        let empty = LightsUbo::from_lights([]);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_node_ubo_size_and_default() {
        // Two Mat4s = 128 bytes
        assert_eq!(size_of::<NodeUbo>(), 128);
        assert_eq!(NodeUbo::size(), 128);

        let node = NodeUbo::default();
        assert_eq!(node.translation, Mat4::IDENTITY);
        assert_eq!(node.rotation, Mat4::IDENTITY);
    }

    #[test]
    fn test_node_ubo_model_matrix_translates_after_rotating() {
        let node = NodeUbo::new(
            Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)),
            Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2),
        );
        let p = node.model_matrix().transform_point3(Vec3::X);
        assert!((p - Vec3::new(10.0, 0.0, -1.0)).length() < 1e-5);
    }

    #[test]
    fn test_bytemuck_cast() {
        let camera = CameraUbo::default();
        assert_eq!(bytemuck::bytes_of(&camera).len(), CameraUbo::size());

        let lights = LightsUbo::default();
        assert_eq!(bytemuck::bytes_of(&lights).len(), LightsUbo::size());

        let node = NodeUbo::default();
        assert_eq!(bytemuck::bytes_of(&node).len(), NodeUbo::size());
    }
}
