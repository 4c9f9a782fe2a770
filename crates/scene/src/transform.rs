//! Change-tracked transforms.
//!
//! A [`TransformNode`] accumulates a translation matrix and a rotation matrix.
//! Every mutation bumps its version and marks it dirty. The renderer copies
//! the node into each frame slot's uniform buffer in turn and only calls
//! [`TransformNode::mark_clean`] once every slot holds the current version.

use glam::{Mat4, Vec3};

use renderer_resources::NodeUbo;

#[derive(Clone, Debug, PartialEq)]
pub struct TransformNode {
    translation: Mat4,
    rotation: Mat4,
    version: u64,
    dirty: bool,
}

impl Default for TransformNode {
    fn default() -> Self {
        Self {
            translation: Mat4::IDENTITY,
            rotation: Mat4::IDENTITY,
            version: 0,
            // Nothing has been uploaded yet.
            dirty: true,
        }
    }
}

impl TransformNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rotate by Euler `angles` (radians, applied X then Y then Z) about `pivot`.
    pub fn rotate_about(&mut self, angles: Vec3, pivot: Vec3) {
        let about = Mat4::from_translation(pivot)
            * Mat4::from_rotation_x(angles.x)
            * Mat4::from_rotation_y(angles.y)
            * Mat4::from_rotation_z(angles.z)
            * Mat4::from_translation(-pivot);
        self.rotation *= about;
        self.touch();
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.translation *= Mat4::from_translation(offset);
        self.touch();
    }

    fn touch(&mut self) {
        self.version += 1;
        self.dirty = true;
    }

    #[inline]
    pub fn translation(&self) -> Mat4 {
        self.translation
    }

    #[inline]
    pub fn rotation(&self) -> Mat4 {
        self.rotation
    }

    /// Combined model matrix: rotate, then translate.
    pub fn matrix(&self) -> Mat4 {
        self.translation * self.rotation
    }

    /// The uniform block for the current state.
    pub fn ubo(&self) -> NodeUbo {
        NodeUbo::new(self.translation, self.rotation)
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag if `version` is still current.
    ///
    /// A mutation made after `version` was uploaded keeps the node dirty.
    pub fn mark_clean(&mut self, version: u64) -> bool {
        if version == self.version {
            self.dirty = false;
        }
        !self.dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn approx_eq_vec3(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-5
    }

    #[test]
    fn test_new_node_is_dirty_identity() {
        let node = TransformNode::new();
        assert!(node.is_dirty());
        assert_eq!(node.matrix(), Mat4::IDENTITY);
        assert_eq!(node.version(), 0);
    }

    #[test]
    fn test_rotate_about_origin() {
        let mut node = TransformNode::new();
        node.rotate_about(Vec3::new(0.0, FRAC_PI_2, 0.0), Vec3::ZERO);

        let p = node.matrix().transform_point3(Vec3::X);
        assert!(approx_eq_vec3(p, Vec3::new(0.0, 0.0, -1.0)), "got {:?}", p);
        assert!(node.is_dirty());
        assert_eq!(node.version(), 1);
    }

    #[test]
    fn test_rotate_about_pivot_keeps_pivot_fixed() {
        let mut node = TransformNode::new();
        let pivot = Vec3::new(2.0, 0.0, 0.0);
        node.rotate_about(Vec3::new(0.3, 1.1, -0.7), pivot);
        assert!(approx_eq_vec3(node.matrix().transform_point3(pivot), pivot));
    }

    #[test]
    fn test_rotations_accumulate() {
        let mut node = TransformNode::new();
        node.rotate_about(Vec3::new(0.0, FRAC_PI_2, 0.0), Vec3::ZERO);
        node.rotate_about(Vec3::new(0.0, FRAC_PI_2, 0.0), Vec3::ZERO);
        let p = node.matrix().transform_point3(Vec3::X);
        assert!(approx_eq_vec3(p, Vec3::NEG_X));
    }

    #[test]
    fn test_translate_marks_dirty() {
        let mut node = TransformNode::new();
        node.mark_clean(node.version());
        assert!(!node.is_dirty());

        node.translate(Vec3::new(1.0, 2.0, 3.0));
        assert!(node.is_dirty());
        assert!(approx_eq_vec3(
            node.matrix().transform_point3(Vec3::ZERO),
            Vec3::new(1.0, 2.0, 3.0)
        ));
    }

    #[test]
    fn test_translation_applies_after_rotation() {
        let mut node = TransformNode::new();
        node.translate(Vec3::new(10.0, 0.0, 0.0));
        node.rotate_about(Vec3::new(0.0, FRAC_PI_2, 0.0), Vec3::ZERO);
        let p = node.matrix().transform_point3(Vec3::X);
        assert!(approx_eq_vec3(p, Vec3::new(10.0, 0.0, -1.0)));
    }

    #[test]
    fn test_mark_clean_ignores_stale_version() {
        let mut node = TransformNode::new();
        node.translate(Vec3::X);
        let uploaded = node.version();
        node.translate(Vec3::X);

        assert!(!node.mark_clean(uploaded));
        assert!(node.is_dirty());
        assert!(node.mark_clean(node.version()));
    }

    #[test]
    fn test_ubo_matches_matrices() {
        let mut node = TransformNode::new();
        node.translate(Vec3::Y);
        let ubo = node.ubo();
        assert_eq!(ubo.translation, node.translation());
        assert_eq!(ubo.rotation, node.rotation());
    }
}
