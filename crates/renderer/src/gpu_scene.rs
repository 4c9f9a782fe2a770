//! GPU-side mirror of the registered scene.
//!
//! [`GpuScene`] owns the model/object hierarchy on the render thread together
//! with everything uploaded for it: meshes, textures, and one uniform buffer
//! plus binding set per transform node per frame slot.

use std::sync::Arc;

use tracing::{debug, info, warn};

use renderer_resources::{
    CameraUbo, GpuMesh, LightsUbo, PLACEHOLDER_COLOR, Texture, TextureSource, VideoSource,
};
use renderer_rhi::backend::tag;
use renderer_rhi::{
    Backend, Binding, BindingLayout, BindingSetId, BufferId, BufferUsage, DrawCommand, Extent2D,
    GpuBuffer, Owned, PipelineId,
};
use renderer_scene::{
    CameraState, LightSet, Model, ModelId, ObjectKind, Scene, SceneMessage, TransformNode,
};

use crate::error::RendererResult;

/// Per-slot uniform state of one transform node.
struct NodeSlots<B: Backend> {
    sets: Vec<Owned<B, tag::BindingSet>>,
    buffers: Vec<GpuBuffer<B>>,
    /// Node version held by each slot's buffer.
    written: Vec<u64>,
}

impl<B: Backend> NodeSlots<B> {
    /// Every slot starts out holding the node's current matrices.
    fn new(
        backend: &Arc<B>,
        layout: BindingLayout,
        transform: &TransformNode,
        slots: usize,
    ) -> RendererResult<Self> {
        let ubo = transform.ubo();
        let mut sets = Vec::with_capacity(slots);
        let mut buffers = Vec::with_capacity(slots);
        for _ in 0..slots {
            let buffer =
                GpuBuffer::with_data(backend, BufferUsage::Uniform, bytemuck::bytes_of(&ubo))?;
            let set = backend.create_binding_set(layout, &[Binding::Uniform(buffer.id())])?;
            sets.push(Owned::new(backend, set));
            buffers.push(buffer);
        }
        Ok(Self {
            sets,
            buffers,
            written: vec![transform.version(); slots],
        })
    }

    /// Bring `slot` up to date with a dirty node. Clears the dirty flag once
    /// every slot holds the current version. Returns whether it uploaded.
    fn sync(&mut self, slot: usize, transform: &mut TransformNode) -> RendererResult<bool> {
        if !transform.is_dirty() {
            return Ok(false);
        }
        let version = transform.version();
        let mut uploaded = false;
        if self.written[slot] != version {
            self.buffers[slot].upload(bytemuck::bytes_of(&transform.ubo()))?;
            self.written[slot] = version;
            uploaded = true;
        }
        if self.written.iter().all(|&v| v == version) {
            transform.mark_clean(version);
        }
        Ok(uploaded)
    }

    fn set(&self, slot: usize) -> BindingSetId {
        self.sets[slot].handle()
    }
}

struct GpuObject<B: Backend> {
    slots: NodeSlots<B>,
    mesh: GpuMesh<B>,
    texture: usize,
}

struct GpuModel<B: Backend> {
    slots: NodeSlots<B>,
    objects: Vec<GpuObject<B>>,
}

pub struct GpuScene<B: Backend> {
    models: Vec<Model>,
    gpu: Vec<GpuModel<B>>,
    textures: Vec<Texture<B>>,
    lights: LightSet,
    camera: CameraState,
}

impl<B: Backend> GpuScene<B> {
    /// Upload `scene` for `slots` frame slots.
    ///
    /// Also returns the producer half of every video texture, for the video
    /// producer thread.
    pub fn new(
        backend: &Arc<B>,
        scene: Scene,
        slots: usize,
    ) -> RendererResult<(Self, Vec<VideoSource>)> {
        let Scene {
            mut models,
            lights,
            camera,
        } = scene;
        let mut gpu = Vec::with_capacity(models.len());
        let mut textures = Vec::new();
        let mut videos = Vec::new();

        for model in &mut models {
            let model_name = model.name().to_string();
            let model_slots = NodeSlots::new(backend, BindingLayout::Model, model.transform(), slots)?;
            let mut objects = Vec::with_capacity(model.len());

            for object in model.objects_mut() {
                let mesh = GpuMesh::upload(backend, object.mesh())?;
                let source = match object.take_kind() {
                    Some(ObjectKind::Image(material)) => material.texture_source(),
                    Some(ObjectKind::Video(decoder)) => TextureSource::Video(decoder),
                    None => {
                        warn!("Object '{}' has no texture source", object.name());
                        TextureSource::Color(PLACEHOLDER_COLOR)
                    }
                };
                let mut texture = Texture::new(format!("{}/{}", model_name, object.name()), source);
                texture.load(backend)?;
                if texture.is_video() {
                    videos.push(texture.take_video_source()?);
                }

                objects.push(GpuObject {
                    slots: NodeSlots::new(backend, BindingLayout::Object, object.transform(), slots)?,
                    mesh,
                    texture: textures.len(),
                });
                textures.push(texture);
            }
            debug!("Uploaded model '{}' ({} objects)", model_name, objects.len());
            gpu.push(GpuModel {
                slots: model_slots,
                objects,
            });
        }

        info!(
            "Scene uploaded: {} models, {} textures ({} video), {} lights",
            models.len(),
            textures.len(),
            videos.len(),
            lights.len()
        );
        let scene = Self {
            models,
            gpu,
            textures,
            lights,
            camera: camera.state(),
        };
        Ok((scene, videos))
    }

    /// Apply one queued update. Unknown nodes are logged and dropped.
    pub fn apply(&mut self, message: SceneMessage) {
        match message {
            SceneMessage::Camera(state) => self.camera = state,
            SceneMessage::Lights(lights) => match LightSet::from_lights(lights) {
                Ok(lights) => self.lights = lights,
                Err(e) => warn!("Dropping light update: {}", e),
            },
            delta => {
                if let Err(e) = delta.apply(&mut self.models) {
                    warn!("Dropping scene update: {}", e);
                }
            }
        }
    }

    /// Copy every new video frame to its texture. Returns how many changed.
    pub fn publish_videos(&mut self) -> RendererResult<usize> {
        let mut published = 0;
        for texture in self.textures.iter_mut().filter(|t| t.is_video()) {
            if texture.publish_frame()? {
                published += 1;
            }
        }
        Ok(published)
    }

    /// Upload dirty transforms into `slot`. Returns the number of uploads.
    pub fn sync_transforms(&mut self, slot: usize) -> RendererResult<usize> {
        let mut uploads = 0;
        for (model, gpu) in self.models.iter_mut().zip(&mut self.gpu) {
            uploads += usize::from(gpu.slots.sync(slot, model.transform_mut())?);
            for (object, gpu_object) in model.objects_mut().zip(&mut gpu.objects) {
                uploads += usize::from(gpu_object.slots.sync(slot, object.transform_mut())?);
            }
        }
        Ok(uploads)
    }

    /// Camera and light uniforms for a target of `extent`.
    pub fn globals(&self, extent: Extent2D) -> (CameraUbo, LightsUbo) {
        let camera = CameraUbo::new(
            self.camera.view,
            self.camera.projection_for(extent.aspect()),
            self.camera.position,
        );
        (camera, self.lights.to_gpu())
    }

    /// The draw sequence for one frame recorded into `slot`.
    pub fn commands(
        &self,
        slot: usize,
        pipeline: PipelineId,
        global_set: BindingSetId,
    ) -> RendererResult<Vec<DrawCommand>> {
        let mut commands = vec![
            DrawCommand::BindPipeline(pipeline),
            DrawCommand::BindSet {
                layout: BindingLayout::Global,
                set: global_set,
            },
        ];
        for model in &self.gpu {
            commands.push(DrawCommand::BindSet {
                layout: BindingLayout::Model,
                set: model.slots.set(slot),
            });
            for object in &model.objects {
                commands.push(DrawCommand::BindSet {
                    layout: BindingLayout::Object,
                    set: object.slots.set(slot),
                });
                commands.push(DrawCommand::BindSet {
                    layout: BindingLayout::Texture,
                    set: self.textures[object.texture].binding_set()?,
                });
                commands.push(DrawCommand::BindVertexBuffer(object.mesh.vertex_buffer()));
                commands.push(DrawCommand::BindIndexBuffer(object.mesh.index_buffer()));
                commands.push(DrawCommand::DrawIndexed {
                    index_count: object.mesh.index_count(),
                    first_index: 0,
                });
            }
        }
        Ok(commands)
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    pub fn model(&self, id: ModelId) -> Option<&Model> {
        self.models.get(id.0)
    }

    pub fn textures(&self) -> &[Texture<B>] {
        &self.textures
    }

    pub fn camera(&self) -> &CameraState {
        &self.camera
    }

    pub fn lights(&self) -> &LightSet {
        &self.lights
    }

    /// Uniform buffer backing a model's transform in `slot`.
    pub fn model_buffer(&self, id: ModelId, slot: usize) -> Option<BufferId> {
        self.gpu
            .get(id.0)
            .and_then(|m| m.slots.buffers.get(slot))
            .map(GpuBuffer::id)
    }

    /// Uniform buffer backing an object's transform in `slot`.
    pub fn object_buffer(&self, id: ModelId, object: &str, slot: usize) -> Option<BufferId> {
        let index = self.models.get(id.0)?.keys().position(|k| k == object)?;
        self.gpu
            .get(id.0)?
            .objects
            .get(index)?
            .slots
            .buffers
            .get(slot)
            .map(GpuBuffer::id)
    }
}
