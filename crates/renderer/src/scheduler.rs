//! The frame scheduler: one presented frame per tick.
//!
//! A tick runs, in order:
//!
//! 1. Drain queued scene updates
//! 2. Wait on the current slot's fence (never-submitted slots skip this)
//! 3. Acquire a swapchain image; an out-of-date surface rebuilds and ends the tick
//! 4. Publish new video frames
//! 5. Upload dirty transforms and the slot's globals
//! 6. Record, reset the fence, submit
//! 7. Present; rebuild if the surface is stale or a resize is pending
//! 8. Advance to the next slot
//!
//! A slot's context is recorded again only after its fence signalled, so at
//! most N frames are ever in flight.

use std::sync::Arc;

use tracing::{debug, error, info, trace};

use renderer_core::RendererConfig;
use renderer_resources::VideoSource;
use renderer_rhi::{
    AcquireOutcome, Backend, CullMode, Extent2D, PipelineId, PresentOutcome, ShaderCode,
    SwapchainId,
};
use renderer_scene::{SceneBuilder, SceneReceiver, SceneSender, scene_channel};

use crate::error::{RendererError, RendererResult};
use crate::frame::FrameRing;
use crate::gpu_scene::GpuScene;
use crate::surface::{RebuildOutcome, SwapchainManager};

/// Settings the scheduler is built with.
#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    pub vertex: ShaderCode,
    pub fragment: ShaderCode,
    pub cull_mode: CullMode,
}

impl SchedulerConfig {
    pub fn new(vertex: ShaderCode, fragment: ShaderCode) -> Self {
        Self::from_renderer_config(&RendererConfig::default(), vertex, fragment)
    }

    pub fn from_renderer_config(
        config: &RendererConfig,
        vertex: ShaderCode,
        fragment: ShaderCode,
    ) -> Self {
        Self {
            frames_in_flight: config.frames_in_flight,
            clear_color: config.clear_color,
            vertex,
            fragment,
            cull_mode: CullMode::Back,
        }
    }

    pub fn with_frames_in_flight(mut self, frames_in_flight: usize) -> Self {
        self.frames_in_flight = frames_in_flight;
        self
    }
}

/// What one call to [`FrameScheduler::tick`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Presented { slot: usize, image_index: u32 },
    /// The surface was stale; it was rebuilt and nothing was presented.
    SurfaceRebuilt,
    /// The window has no area. Nothing was done.
    Suspended,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub ticks: u64,
    pub presented: u64,
    pub rebuilds: u64,
    pub suspended: u64,
    /// Transform uniform writes.
    pub uploads: u64,
    /// Video frames copied to textures.
    pub video_frames: u64,
}

pub struct FrameScheduler<B: Backend> {
    backend: Arc<B>,
    scene: GpuScene<B>,
    ring: FrameRing<B>,
    surface: SwapchainManager<B>,
    receiver: SceneReceiver,
    sender: Option<SceneSender>,
    video_sources: Vec<VideoSource>,
    clear_color: [f32; 4],
    window_extent: Extent2D,
    resized: bool,
    rebuild_pending: bool,
    stats: FrameStats,
}

impl<B: Backend> FrameScheduler<B> {
    /// Upload the scene and build the surface for `extent`.
    ///
    /// Consumes the builder: no nodes can be added once rendering starts.
    pub fn new(
        backend: Arc<B>,
        builder: SceneBuilder,
        config: SchedulerConfig,
        extent: Extent2D,
    ) -> RendererResult<Self> {
        let scene = builder.build()?;
        let ring = FrameRing::new(&backend, config.frames_in_flight)?;
        let (scene, video_sources) = GpuScene::new(&backend, scene, ring.len())?;
        let mut surface =
            SwapchainManager::new(&backend, config.vertex, config.fragment, config.cull_mode);
        let rebuild_pending = surface.rebuild(extent)? == RebuildOutcome::Deferred;
        let (sender, receiver) = scene_channel();

        info!(
            "Frame scheduler ready on {} backend ({} frames in flight)",
            backend.name(),
            ring.len()
        );
        Ok(Self {
            backend,
            scene,
            ring,
            surface,
            receiver,
            sender: Some(sender),
            video_sources,
            clear_color: config.clear_color,
            window_extent: extent,
            resized: false,
            rebuild_pending,
            stats: FrameStats::default(),
        })
    }

    /// The single producer handle for scene updates. `None` after the first call.
    pub fn take_sender(&mut self) -> Option<SceneSender> {
        self.sender.take()
    }

    /// Producer halves of the video textures, for [`VideoProducer`](crate::VideoProducer).
    pub fn take_video_sources(&mut self) -> Vec<VideoSource> {
        std::mem::take(&mut self.video_sources)
    }

    /// Record a new window size. The surface is rebuilt on a later tick.
    pub fn resize(&mut self, width: u32, height: u32) {
        let extent = Extent2D::new(width, height);
        if extent != self.window_extent {
            debug!(
                "Resize: {}x{} -> {}x{}",
                self.window_extent.width, self.window_extent.height, width, height
            );
            self.window_extent = extent;
            self.resized = true;
        }
    }

    pub fn tick(&mut self) -> RendererResult<TickOutcome> {
        self.stats.ticks += 1;
        for message in self.receiver.drain() {
            self.scene.apply(message);
        }

        if self.window_extent.is_zero() {
            self.stats.suspended += 1;
            return Ok(TickOutcome::Suspended);
        }
        if (self.rebuild_pending || !self.surface.is_built()) && !self.rebuild()? {
            self.stats.suspended += 1;
            return Ok(TickOutcome::Suspended);
        }
        let (Some(swapchain), Some(pipeline)) = (self.surface.swapchain(), self.surface.pipeline())
        else {
            return Err(RendererError::NoSurface);
        };

        let slot_index = self.ring.current_index();
        self.ring.current().wait(&self.backend)?;

        let (image_index, suboptimal) = match self
            .backend
            .acquire_next_image(swapchain, self.ring.current().image_available())?
        {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date during acquire");
                return Ok(if self.rebuild()? {
                    TickOutcome::SurfaceRebuilt
                } else {
                    self.stats.suspended += 1;
                    TickOutcome::Suspended
                });
            }
        };

        let presented = match self.render(slot_index, image_index, swapchain, pipeline) {
            Ok(presented) => presented,
            Err(e) => {
                self.recover_failed_frame();
                return Err(e);
            }
        };
        self.ring.advance();
        self.stats.presented += 1;
        trace!("Presented image {} from slot {}", image_index, slot_index);

        if presented.needs_rebuild() || suboptimal || self.resized {
            debug!("Rebuilding surface after present ({:?})", presented);
            self.rebuild()?;
        }

        Ok(TickOutcome::Presented {
            slot: slot_index,
            image_index,
        })
    }

    /// Steps 4 to 7 for an acquired image.
    fn render(
        &mut self,
        slot_index: usize,
        image_index: u32,
        swapchain: SwapchainId,
        pipeline: PipelineId,
    ) -> RendererResult<PresentOutcome> {
        self.stats.video_frames += self.scene.publish_videos()? as u64;
        self.stats.uploads += self.scene.sync_transforms(slot_index)? as u64;

        let extent = self.surface.extent();
        let (camera, lights) = self.scene.globals(extent);
        let slot = self.ring.current();
        slot.write_globals(&camera, &lights)?;

        let target = self
            .surface
            .target(image_index, self.clear_color)
            .ok_or(RendererError::NoSurface)?;
        let render_finished = self
            .surface
            .render_finished(image_index)
            .ok_or(RendererError::NoSurface)?;
        let commands = self.scene.commands(slot_index, pipeline, slot.global_set())?;
        self.backend.record(slot.context(), &target, &commands)?;

        self.ring
            .current_mut()
            .submit(&self.backend, render_finished)?;

        Ok(self
            .backend
            .present(swapchain, image_index, render_finished)?)
    }

    /// Put the sync objects back in a known state after a frame failed
    /// between acquire and present.
    ///
    /// The acquired image is released by rebuilding the surface on the next
    /// tick; until then the slot's image-available semaphore may still be
    /// signalled, so it is replaced.
    fn recover_failed_frame(&mut self) {
        error!("Frame on slot {} failed after acquire", self.ring.current_index());
        if let Err(e) = self.backend.wait_idle() {
            error!("Failed to wait for device idle: {}", e);
            return;
        }
        if let Err(e) = self.ring.reset_semaphores(&self.backend) {
            error!("Failed to replace frame semaphores: {}", e);
        }
        self.rebuild_pending = true;
    }

    /// Returns whether the surface was rebuilt; `false` means deferred.
    fn rebuild(&mut self) -> RendererResult<bool> {
        match self.surface.rebuild(self.window_extent)? {
            RebuildOutcome::Rebuilt => {
                // Semaphores may be left signalled by an abandoned acquire or present.
                self.ring.reset_semaphores(&self.backend)?;
                self.resized = false;
                self.rebuild_pending = false;
                self.stats.rebuilds += 1;
                Ok(true)
            }
            RebuildOutcome::Deferred => {
                self.rebuild_pending = true;
                Ok(false)
            }
        }
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn window_extent(&self) -> Extent2D {
        self.window_extent
    }

    pub fn surface(&self) -> &SwapchainManager<B> {
        &self.surface
    }

    pub fn ring(&self) -> &FrameRing<B> {
        &self.ring
    }

    pub fn scene(&self) -> &GpuScene<B> {
        &self.scene
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }
}

impl<B: Backend> Drop for FrameScheduler<B> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.wait_idle() {
            error!("Failed to wait for device idle: {}", e);
        }
        info!(
            "Frame scheduler stopped after {} ticks ({} presented, {} rebuilds)",
            self.stats.ticks, self.stats.presented, self.stats.rebuilds
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use renderer_resources::{Material, MeshData};
    use renderer_rhi::HeadlessBackend;
    use renderer_scene::{Camera, Model, Object, SceneError};

    use crate::surface::tests::test_shader;

    fn config(frames: usize) -> SchedulerConfig {
        SchedulerConfig::new(test_shader(), test_shader()).with_frames_in_flight(frames)
    }

    fn builder() -> SceneBuilder {
        let mut builder = SceneBuilder::new();
        builder.add_model(Model::new("m").with_object(Object::with_material(
            "cube",
            MeshData::cube(1.0),
            Material::solid("grey", Vec3::splat(0.5)),
        )));
        builder.set_camera(Camera::default());
        builder
    }

    fn extent(backend: &HeadlessBackend) -> Extent2D {
        backend.window_extent()
    }

    #[test]
    fn test_missing_camera_is_rejected() {
        let backend = Arc::new(HeadlessBackend::new());
        let result = FrameScheduler::new(
            Arc::clone(&backend),
            SceneBuilder::new(),
            config(2),
            extent(&backend),
        );
        assert!(matches!(
            result,
            Err(RendererError::Scene(SceneError::NoCamera))
        ));
    }

    #[test]
    fn test_ticks_cycle_through_slots() {
        let backend = Arc::new(HeadlessBackend::new());
        let mut scheduler =
            FrameScheduler::new(Arc::clone(&backend), builder(), config(3), extent(&backend))
                .unwrap();

        let slots: Vec<usize> = (0..5)
            .map(|_| match scheduler.tick().unwrap() {
                TickOutcome::Presented { slot, .. } => slot,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(slots, vec![0, 1, 2, 0, 1]);
        assert_eq!(scheduler.stats().presented, 5);
        assert_eq!(backend.stats().submissions, 5);
    }

    #[test]
    fn test_sender_is_handed_out_once() {
        let backend = Arc::new(HeadlessBackend::new());
        let mut scheduler =
            FrameScheduler::new(Arc::clone(&backend), builder(), config(2), extent(&backend))
                .unwrap();
        assert!(scheduler.take_sender().is_some());
        assert!(scheduler.take_sender().is_none());
    }

    #[test]
    fn test_zero_extent_suspends() {
        let backend = Arc::new(HeadlessBackend::new());
        let mut scheduler =
            FrameScheduler::new(Arc::clone(&backend), builder(), config(2), extent(&backend))
                .unwrap();
        scheduler.resize(0, 0);
        backend.set_window_extent(Extent2D::new(0, 0));
        assert_eq!(scheduler.tick().unwrap(), TickOutcome::Suspended);
        assert_eq!(backend.stats().acquires, 0);

        scheduler.resize(320, 200);
        backend.set_window_extent(Extent2D::new(320, 200));
        assert!(matches!(
            scheduler.tick().unwrap(),
            TickOutcome::SurfaceRebuilt
        ));
        assert!(matches!(
            scheduler.tick().unwrap(),
            TickOutcome::Presented { .. }
        ));
        assert_eq!(scheduler.surface().extent(), Extent2D::new(320, 200));
    }

    #[test]
    fn test_deferred_at_startup_builds_on_first_real_tick() {
        let backend = Arc::new(HeadlessBackend::with_window_extent(Extent2D::new(0, 0)));
        let mut scheduler =
            FrameScheduler::new(Arc::clone(&backend), builder(), config(2), Extent2D::new(0, 0))
                .unwrap();
        assert!(!scheduler.surface().is_built());
        assert_eq!(scheduler.tick().unwrap(), TickOutcome::Suspended);

        backend.set_window_extent(Extent2D::new(100, 100));
        scheduler.resize(100, 100);
        assert!(matches!(
            scheduler.tick().unwrap(),
            TickOutcome::Presented { .. }
        ));
        assert_eq!(scheduler.stats().rebuilds, 1);
    }

    #[test]
    fn test_drop_waits_idle_and_releases_everything() {
        let backend = Arc::new(HeadlessBackend::new());
        let mut scheduler =
            FrameScheduler::new(Arc::clone(&backend), builder(), config(2), extent(&backend))
                .unwrap();
        scheduler.tick().unwrap();
        scheduler.tick().unwrap();
        drop(scheduler);

        assert_eq!(backend.in_flight(), 0);
        assert_eq!(backend.stats().destroyed_while_in_flight, 0);
        assert_eq!(backend.live_counts(), Default::default());
    }
}
