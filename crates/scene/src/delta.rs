//! Scene updates posted from the update thread to the render thread.
//!
//! Transforms live on the render thread only. Other threads describe what
//! should change as [`SceneMessage`]s, and the frame scheduler applies them
//! once per tick with [`SceneMessage::apply`].

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use glam::Vec3;

use crate::builder::ModelId;
use crate::camera::CameraState;
use crate::error::{SceneError, SceneResult};
use crate::light::Light;
use crate::model::Model;
use crate::transform::TransformNode;

/// Addresses a transform node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeRef {
    Model(ModelId),
    Object(ModelId, String),
}

impl NodeRef {
    pub fn object(model: ModelId, name: impl Into<String>) -> Self {
        Self::Object(model, name.into())
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model(id) => write!(f, "model #{}", id.0),
            Self::Object(id, name) => write!(f, "object '{name}' of model #{}", id.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SceneMessage {
    /// Rotate about the node's own centroid.
    Rotate { node: NodeRef, angles: Vec3 },
    RotateAbout {
        node: NodeRef,
        angles: Vec3,
        pivot: Vec3,
    },
    Translate { node: NodeRef, offset: Vec3 },
    Camera(CameraState),
    Lights(Vec<Light>),
}

impl SceneMessage {
    /// Apply a transform delta to `models`.
    ///
    /// Camera and light messages are not transform deltas and return `Ok(false)`
    /// so the caller can handle them.
    pub fn apply(&self, models: &mut [Model]) -> SceneResult<bool> {
        match self {
            Self::Rotate { node, angles } => {
                let (transform, centroid) = resolve(models, node)?;
                transform.rotate_about(*angles, centroid);
            }
            Self::RotateAbout {
                node,
                angles,
                pivot,
            } => resolve(models, node)?.0.rotate_about(*angles, *pivot),
            Self::Translate { node, offset } => resolve(models, node)?.0.translate(*offset),
            Self::Camera(_) | Self::Lights(_) => return Ok(false),
        }
        Ok(true)
    }
}

fn resolve<'a>(models: &'a mut [Model], node: &NodeRef) -> SceneResult<(&'a mut TransformNode, Vec3)> {
    let unknown = || SceneError::UnknownNode(node.to_string());
    match node {
        NodeRef::Model(id) => {
            let model = models.get_mut(id.0).ok_or_else(unknown)?;
            let centroid = model.centroid();
            Ok((model.transform_mut(), centroid))
        }
        NodeRef::Object(id, name) => {
            let object = models
                .get_mut(id.0)
                .and_then(|m| m.object_mut(name))
                .ok_or_else(unknown)?;
            let centroid = object.centroid();
            Ok((object.transform_mut(), centroid))
        }
    }
}

/// Producer half of the scene queue. Deliberately not `Clone`: one writer.
#[derive(Debug)]
pub struct SceneSender {
    tx: Sender<SceneMessage>,
}

impl SceneSender {
    pub fn send(&self, message: SceneMessage) -> SceneResult<()> {
        self.tx.send(message).map_err(|_| SceneError::Disconnected)
    }

    pub fn rotate(&self, node: NodeRef, angles: Vec3) -> SceneResult<()> {
        self.send(SceneMessage::Rotate { node, angles })
    }

    pub fn rotate_about(&self, node: NodeRef, angles: Vec3, pivot: Vec3) -> SceneResult<()> {
        self.send(SceneMessage::RotateAbout {
            node,
            angles,
            pivot,
        })
    }

    pub fn translate(&self, node: NodeRef, offset: Vec3) -> SceneResult<()> {
        self.send(SceneMessage::Translate { node, offset })
    }
}

#[derive(Debug)]
pub struct SceneReceiver {
    rx: Receiver<SceneMessage>,
}

impl SceneReceiver {
    /// Everything queued so far, without blocking.
    pub fn drain(&self) -> impl Iterator<Item = SceneMessage> + '_ {
        std::iter::from_fn(move || match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

pub fn scene_channel() -> (SceneSender, SceneReceiver) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (SceneSender { tx }, SceneReceiver { rx })
}
