//! Models and their objects: the two-level transform hierarchy.
//!
//! A [`Model`] groups [`Object`]s. Both levels carry their own
//! [`TransformNode`]; the vertex shader composes model and object transforms.

use glam::Vec3;
use tracing::warn;

use renderer_resources::{Material, MeshData, VideoDecoder};

use crate::transform::TransformNode;

/// Where an object's texture comes from.
pub enum ObjectKind {
    Image(Material),
    Video(Box<dyn VideoDecoder>),
}

impl std::fmt::Debug for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Image(material) => f.debug_tuple("Image").field(material).finish(),
            Self::Video(decoder) => f.debug_tuple("Video").field(&decoder.name()).finish(),
        }
    }
}

/// A leaf node: one mesh with one texture source.
#[derive(Debug)]
pub struct Object {
    name: String,
    mesh: MeshData,
    kind: Option<ObjectKind>,
    transform: TransformNode,
    centroid: Vec3,
}

impl Object {
    pub fn new(name: impl Into<String>, mesh: MeshData, kind: ObjectKind) -> Self {
        let centroid = mesh.centroid();
        Self {
            name: name.into(),
            mesh,
            kind: Some(kind),
            transform: TransformNode::new(),
            centroid,
        }
    }

    pub fn with_material(name: impl Into<String>, mesh: MeshData, material: Material) -> Self {
        Self::new(name, mesh, ObjectKind::Image(material))
    }

    pub fn with_video(
        name: impl Into<String>,
        mesh: MeshData,
        decoder: Box<dyn VideoDecoder>,
    ) -> Self {
        Self::new(name, mesh, ObjectKind::Video(decoder))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn mesh(&self) -> &MeshData {
        &self.mesh
    }

    /// The texture source, until the renderer takes it.
    #[inline]
    pub fn kind(&self) -> Option<&ObjectKind> {
        self.kind.as_ref()
    }

    /// Hand the texture source to the renderer. Returns `None` after the first call.
    pub fn take_kind(&mut self) -> Option<ObjectKind> {
        self.kind.take()
    }

    #[inline]
    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }

    #[inline]
    pub fn transform(&self) -> &TransformNode {
        &self.transform
    }

    #[inline]
    pub fn transform_mut(&mut self) -> &mut TransformNode {
        &mut self.transform
    }

    /// Rotate about the object's own centroid.
    pub fn rotate(&mut self, angles: Vec3) {
        self.transform.rotate_about(angles, self.centroid);
    }

    pub fn rotate_about(&mut self, angles: Vec3, pivot: Vec3) {
        self.transform.rotate_about(angles, pivot);
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.transform.translate(offset);
    }
}

/// A group node. Objects keep their insertion order.
#[derive(Debug)]
pub struct Model {
    name: String,
    objects: Vec<Object>,
    transform: TransformNode,
    centroid: Vec3,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
            transform: TransformNode::new(),
            centroid: Vec3::ZERO,
        }
    }

    /// Builder-style [`Model::add_object`].
    pub fn with_object(mut self, object: Object) -> Self {
        self.add_object(object);
        self
    }

    /// Add an object, replacing any object with the same name.
    pub fn add_object(&mut self, object: Object) {
        if let Some(existing) = self.objects.iter_mut().find(|o| o.name == object.name) {
            warn!(model = %self.name, object = %object.name, "Replacing object with same name");
            *existing = object;
        } else {
            self.objects.push(object);
        }
        self.recompute_centroid();
    }

    fn recompute_centroid(&mut self) {
        let sum: Vec3 = self.objects.iter().map(|o| o.centroid).sum();
        self.centroid = sum / self.objects.len().max(1) as f32;
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn centroid(&self) -> Vec3 {
        self.centroid
    }

    pub fn object(&self, name: &str) -> Option<&Object> {
        self.objects.iter().find(|o| o.name == name)
    }

    pub fn object_mut(&mut self, name: &str) -> Option<&mut Object> {
        self.objects.iter_mut().find(|o| o.name == name)
    }

    /// Object names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|o| o.name.as_str())
    }

    pub fn objects(&self) -> impl Iterator<Item = &Object> {
        self.objects.iter()
    }

    pub fn objects_mut(&mut self) -> impl Iterator<Item = &mut Object> {
        self.objects.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    #[inline]
    pub fn transform(&self) -> &TransformNode {
        &self.transform
    }

    #[inline]
    pub fn transform_mut(&mut self) -> &mut TransformNode {
        &mut self.transform
    }

    /// Rotate about the model centroid.
    pub fn rotate(&mut self, angles: Vec3) {
        self.transform.rotate_about(angles, self.centroid);
    }

    pub fn rotate_about(&mut self, angles: Vec3, pivot: Vec3) {
        self.transform.rotate_about(angles, pivot);
    }

    pub fn translate(&mut self, offset: Vec3) {
        self.transform.translate(offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer_resources::MemoryDecoder;
    use renderer_rhi::Vertex;

    fn triangle_at(offset: Vec3) -> MeshData {
        let v = |p: Vec3| Vertex::new(p + offset, Vec3::Z, glam::Vec2::ZERO);
        MeshData::new(
            vec![
                v(Vec3::new(-1.0, 0.0, 0.0)),
                v(Vec3::new(1.0, 0.0, 0.0)),
                v(Vec3::new(0.0, 3.0, 0.0)),
            ],
            vec![0, 1, 2],
        )
    }

    #[test]
    fn test_object_centroid_is_vertex_mean() {
        let object = Object::with_material("tri", triangle_at(Vec3::ZERO), Material::default());
        assert!((object.centroid() - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_model_centroid_is_mean_of_objects() {
        let mut model = Model::new("pair");
        assert_eq!(model.centroid(), Vec3::ZERO);

        model.add_object(Object::with_material(
            "a",
            triangle_at(Vec3::new(-4.0, 0.0, 0.0)),
            Material::default(),
        ));
        assert!((model.centroid() - Vec3::new(-4.0, 1.0, 0.0)).length() < 1e-6);

        model.add_object(Object::with_material(
            "b",
            triangle_at(Vec3::new(4.0, 0.0, 2.0)),
            Material::default(),
        ));
        assert!((model.centroid() - Vec3::new(0.0, 1.0, 1.0)).length() < 1e-6);
    }

    #[test]
    fn test_keys_in_insertion_order() {
        let model = Model::new("m")
            .with_object(Object::with_material("zeta", MeshData::quad(1.0), Material::default()))
            .with_object(Object::with_material("alpha", MeshData::quad(1.0), Material::default()));
        assert_eq!(model.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
        assert!(model.object("alpha").is_some());
        assert!(model.object("missing").is_none());
    }

    #[test]
    fn test_add_object_replaces_same_name() {
        let mut model = Model::new("m");
        model.add_object(Object::with_material("a", MeshData::quad(1.0), Material::default()));
        model.add_object(Object::with_material("a", MeshData::cube(1.0), Material::default()));
        assert_eq!(model.len(), 1);
        assert_eq!(model.object("a").map(|o| o.mesh().index_count()), Some(36));
    }

    #[test]
    fn test_object_rotate_uses_own_centroid() {
        let mut model = Model::new("m").with_object(Object::with_material(
            "tri",
            triangle_at(Vec3::new(5.0, 0.0, 0.0)),
            Material::default(),
        ));
        let object = model.object_mut("tri").unwrap();
        let centroid = object.centroid();
        object.rotate(Vec3::new(0.4, 0.2, 0.9));

        let moved = object.transform().matrix().transform_point3(centroid);
        assert!((moved - centroid).length() < 1e-4);
        assert!(object.transform().is_dirty());
    }

    #[test]
    fn test_video_object_debug() {
        let decoder = MemoryDecoder::solid_frames("clip", 2, 2, 30.0, &[[0, 0, 255]]);
        let mut object = Object::with_video("screen", MeshData::quad(1.0), Box::new(decoder));
        assert!(format!("{:?}", object.kind()).contains("clip"));
        assert!(matches!(object.take_kind(), Some(ObjectKind::Video(_))));
        assert!(object.take_kind().is_none());
    }
}
