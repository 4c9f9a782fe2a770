//! Per-frame resource ring.
//!
//! Each [`FrameSlot`] owns everything one frame in flight touches: a command
//! context, its synchronization primitives and the global uniform buffers.
//! The ring hands slots out round-robin; a slot is reused only after its
//! fence has signalled.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on in_flight (skipped if the slot was never submitted)
//! 2. Acquire swapchain image (signals image_available)
//! 3. Record commands into context
//! 4. Reset in_flight, submit:
//!    - wait on image_available
//!    - signal the acquired image's render_finished and in_flight
//! 5. Present (waits on render_finished)
//! ```
//!
//! `render_finished` belongs to the swapchain image, not the slot, and lives
//! in [`SwapchainManager`](crate::SwapchainManager).

use std::sync::Arc;

use tracing::{debug, info};

use renderer_resources::{CameraUbo, LightsUbo};
use renderer_rhi::backend::tag;
use renderer_rhi::{
    Backend, Binding, BindingLayout, BufferUsage, GpuBuffer, Owned, SemaphoreId, SubmitDesc,
    WAIT_FOREVER,
};

use crate::error::{RendererError, RendererResult};

pub struct FrameSlot<B: Backend> {
    index: usize,
    context: Owned<B, tag::CommandContext>,
    image_available: Owned<B, tag::Semaphore>,
    in_flight: Owned<B, tag::Fence>,
    // The set refers to both buffers, so it goes first.
    global_set: Owned<B, tag::BindingSet>,
    camera: GpuBuffer<B>,
    lights: GpuBuffer<B>,
    submitted: bool,
}

impl<B: Backend> FrameSlot<B> {
    fn new(backend: &Arc<B>, index: usize) -> RendererResult<Self> {
        let context = Owned::new(backend, backend.create_command_context()?);
        let image_available = Owned::new(backend, backend.create_semaphore()?);
        // Unsignalled: the first use of a slot never waits on it.
        let in_flight = Owned::new(backend, backend.create_fence(false)?);

        let camera = GpuBuffer::with_data(
            backend,
            BufferUsage::Uniform,
            bytemuck::bytes_of(&CameraUbo::default()),
        )?;
        let lights = GpuBuffer::with_data(
            backend,
            BufferUsage::Uniform,
            bytemuck::bytes_of(&LightsUbo::default()),
        )?;
        let global_set = Owned::new(
            backend,
            backend.create_binding_set(
                BindingLayout::Global,
                &[Binding::Uniform(camera.id()), Binding::Uniform(lights.id())],
            )?,
        );

        debug!("Created frame slot {}", index);
        Ok(Self {
            index,
            context,
            image_available,
            in_flight,
            global_set,
            camera,
            lights,
            submitted: false,
        })
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Whether this slot has ever been submitted.
    #[inline]
    pub fn is_submitted(&self) -> bool {
        self.submitted
    }

    pub fn context(&self) -> renderer_rhi::CommandContextId {
        self.context.handle()
    }

    pub fn image_available(&self) -> renderer_rhi::SemaphoreId {
        self.image_available.handle()
    }

    pub fn fence(&self) -> renderer_rhi::FenceId {
        self.in_flight.handle()
    }

    pub fn global_set(&self) -> renderer_rhi::BindingSetId {
        self.global_set.handle()
    }

    pub fn camera_buffer(&self) -> &GpuBuffer<B> {
        &self.camera
    }

    pub fn lights_buffer(&self) -> &GpuBuffer<B> {
        &self.lights
    }

    /// Block until the GPU has retired this slot's previous frame.
    pub fn wait(&self, backend: &B) -> RendererResult<()> {
        if self.submitted {
            backend.wait_fence(self.fence(), WAIT_FOREVER)?;
        }
        Ok(())
    }

    /// Write the per-frame globals. Only valid after [`FrameSlot::wait`].
    pub fn write_globals(&self, camera: &CameraUbo, lights: &LightsUbo) -> RendererResult<()> {
        self.camera.upload(bytemuck::bytes_of(camera))?;
        self.lights.upload(bytemuck::bytes_of(lights))?;
        Ok(())
    }

    fn replace_semaphores(&mut self, backend: &Arc<B>) -> RendererResult<()> {
        self.image_available = Owned::new(backend, backend.create_semaphore()?);
        Ok(())
    }

    /// Reset the fence and submit whatever was recorded into the context,
    /// signalling `render_finished` when the GPU is done.
    pub fn submit(&mut self, backend: &B, render_finished: SemaphoreId) -> RendererResult<()> {
        backend.reset_fence(self.fence())?;
        let submitted = backend.submit(&SubmitDesc {
            context: self.context(),
            wait: self.image_available(),
            signal: render_finished,
            fence: self.fence(),
        });
        // An unsignalled fence nothing will signal must not be waited on.
        self.submitted = submitted.is_ok();
        submitted?;
        Ok(())
    }
}

/// N frame slots used round-robin.
pub struct FrameRing<B: Backend> {
    slots: Vec<FrameSlot<B>>,
    current: usize,
}

impl<B: Backend> FrameRing<B> {
    pub fn new(backend: &Arc<B>, frames_in_flight: usize) -> RendererResult<Self> {
        if !(1..=renderer_core::config::MAX_FRAMES_IN_FLIGHT).contains(&frames_in_flight) {
            return Err(RendererError::Config(format!(
                "frames in flight must be in 1..={}, got {}",
                renderer_core::config::MAX_FRAMES_IN_FLIGHT,
                frames_in_flight
            )));
        }
        let slots = (0..frames_in_flight)
            .map(|i| FrameSlot::new(backend, i))
            .collect::<RendererResult<Vec<_>>>()?;
        info!("Frame ring created with {} frames in flight", slots.len());
        Ok(Self { slots, current: 0 })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn current(&self) -> &FrameSlot<B> {
        &self.slots[self.current]
    }

    #[inline]
    pub fn current_mut(&mut self) -> &mut FrameSlot<B> {
        &mut self.slots[self.current]
    }

    pub fn slots(&self) -> impl Iterator<Item = &FrameSlot<B>> {
        self.slots.iter()
    }

    /// Give every slot a fresh image-available semaphore. The GPU must be idle.
    pub fn reset_semaphores(&mut self, backend: &Arc<B>) -> RendererResult<()> {
        for slot in &mut self.slots {
            slot.replace_semaphores(backend)?;
        }
        debug!("Reset semaphores for {} frame slots", self.slots.len());
        Ok(())
    }

    /// Move to the next slot.
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer_rhi::HeadlessBackend;

    #[test]
    fn test_ring_rejects_bad_sizes() {
        let backend = Arc::new(HeadlessBackend::new());
        assert!(matches!(
            FrameRing::new(&backend, 0),
            Err(RendererError::Config(_))
        ));
        assert!(FrameRing::new(&backend, 9).is_err());
    }

    #[test]
    fn test_ring_round_robin() {
        let backend = Arc::new(HeadlessBackend::new());
        let mut ring = FrameRing::new(&backend, 3).unwrap();
        let order: Vec<usize> = (0..7)
            .map(|_| {
                let i = ring.current_index();
                ring.advance();
                i
            })
            .collect();
        assert_eq!(order, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_fresh_slot_is_not_waited_on() {
        let backend = Arc::new(HeadlessBackend::new());
        let ring = FrameRing::new(&backend, 2).unwrap();
        ring.current().wait(&backend).unwrap();
        assert_eq!(backend.stats().fence_waits, 0);
        assert!(!ring.current().is_submitted());
    }

    #[test]
    fn test_slots_own_distinct_objects() {
        let backend = Arc::new(HeadlessBackend::new());
        let ring = FrameRing::new(&backend, 2).unwrap();
        let live = backend.live_counts();
        assert_eq!(live.contexts, 2);
        assert_eq!(live.fences, 2);
        assert_eq!(live.semaphores, 2);
        assert_eq!(live.buffers, 4);
        assert_eq!(backend.binding_sets_created(BindingLayout::Global), 2);

        let a = ring.slots().next().unwrap();
        let b = ring.slots().nth(1).unwrap();
        assert_ne!(a.context(), b.context());
        assert_ne!(a.fence(), b.fence());
    }

    #[test]
    fn test_reset_semaphores_replaces_handles() {
        let backend = Arc::new(HeadlessBackend::new());
        let mut ring = FrameRing::new(&backend, 2).unwrap();
        let before = ring.current().image_available();
        ring.reset_semaphores(&backend).unwrap();
        assert_ne!(ring.current().image_available(), before);
        assert_eq!(backend.live_counts().semaphores, 2);
    }

    #[test]
    fn test_failed_submit_is_not_waited_on() {
        let backend = Arc::new(HeadlessBackend::new());
        let mut ring = FrameRing::new(&backend, 1).unwrap();
        let gone = backend.create_semaphore().unwrap();
        backend.destroy_semaphore(gone);

        assert!(ring.current_mut().submit(&backend, gone).is_err());
        assert!(!ring.current().is_submitted());
        ring.current().wait(&backend).unwrap();
        assert_eq!(backend.stats().fence_waits, 0);

        let signal = backend.create_semaphore().unwrap();
        ring.current_mut().submit(&backend, signal).unwrap();
        assert!(ring.current().is_submitted());
        ring.current().wait(&backend).unwrap();
        assert_eq!(backend.stats().fence_waits, 1);
    }

    #[test]
    fn test_drop_releases_everything() {
        let backend = Arc::new(HeadlessBackend::new());
        drop(FrameRing::new(&backend, 4).unwrap());
        assert_eq!(backend.live_counts(), Default::default());
    }
}
