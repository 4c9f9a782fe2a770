//! The device abstraction the engine is written against.
//!
//! [`Backend`] is the explicit-API surface the frame engine needs: memory,
//! one-shot transfers, binding sets, fences and semaphores, command contexts,
//! the swapchain and the mesh pipeline. Every object is named by a
//! generation-counted [`Handle`]; the backend owns the object itself.
//!
//! Two implementations ship with the crate:
//! - [`VulkanBackend`](crate::vulkan::VulkanBackend), the real device.
//! - [`HeadlessBackend`](crate::headless::HeadlessBackend), an in-memory device
//!   that tracks fence and submission state so the frame lifecycle can be
//!   exercised without a GPU.

use crate::desc::{
    AcquireOutcome, Binding, BindingLayout, BufferDesc, DrawCommand, Extent2D, ImageDesc,
    PipelineDesc, PresentOutcome, RenderTarget, SwapchainInfo,
};
use crate::error::RhiResult;
use crate::handle::Handle;

/// Marker types naming each kind of backend object.
pub mod tag {
    pub enum Buffer {}
    pub enum Image {}
    pub enum Sampler {}
    pub enum BindingSet {}
    pub enum Fence {}
    pub enum Semaphore {}
    pub enum CommandContext {}
    pub enum Swapchain {}
    pub enum Pipeline {}
}

pub type BufferId = Handle<tag::Buffer>;
pub type ImageId = Handle<tag::Image>;
pub type SamplerId = Handle<tag::Sampler>;
pub type BindingSetId = Handle<tag::BindingSet>;
pub type FenceId = Handle<tag::Fence>;
pub type SemaphoreId = Handle<tag::Semaphore>;
pub type CommandContextId = Handle<tag::CommandContext>;
pub type SwapchainId = Handle<tag::Swapchain>;
pub type PipelineId = Handle<tag::Pipeline>;

/// Timeout meaning "wait as long as it takes".
pub const WAIT_FOREVER: u64 = u64::MAX;

/// Synchronization for one queue submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitDesc {
    pub context: CommandContextId,
    /// Waited on before color output.
    pub wait: SemaphoreId,
    /// Signalled when the commands finish.
    pub signal: SemaphoreId,
    /// Signalled when the commands finish.
    pub fence: FenceId,
}

/// An explicit, synchronization-heavy GPU device.
///
/// All methods take `&self`; implementations serialize internally. Destroy
/// methods ignore stale handles so RAII owners can drop in any order.
pub trait Backend: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    // --- memory ---

    fn create_buffer(&self, desc: &BufferDesc) -> RhiResult<BufferId>;
    fn destroy_buffer(&self, buffer: BufferId);
    /// Host write into a host-visible buffer.
    fn write_buffer(&self, buffer: BufferId, offset: u64, data: &[u8]) -> RhiResult<()>;
    /// One-shot device copy. Waits for previously submitted work, then blocks
    /// until the transfer completes.
    fn copy_buffer(&self, src: BufferId, dst: BufferId, size: u64) -> RhiResult<()>;

    fn create_image(&self, desc: &ImageDesc) -> RhiResult<ImageId>;
    fn destroy_image(&self, image: ImageId);
    /// One-shot buffer-to-image copy, transitioning the image
    /// undefined → transfer-dst → shader-read. Ordered after previously
    /// submitted work; blocks until complete.
    fn copy_buffer_to_image(
        &self,
        src: BufferId,
        dst: ImageId,
        width: u32,
        height: u32,
    ) -> RhiResult<()>;

    // --- binding ---

    fn create_sampler(&self) -> RhiResult<SamplerId>;
    fn destroy_sampler(&self, sampler: SamplerId);
    fn create_binding_set(
        &self,
        layout: BindingLayout,
        bindings: &[Binding],
    ) -> RhiResult<BindingSetId>;
    fn destroy_binding_set(&self, set: BindingSetId);

    // --- synchronization and commands ---

    fn create_fence(&self, signaled: bool) -> RhiResult<FenceId>;
    fn destroy_fence(&self, fence: FenceId);
    fn wait_fence(&self, fence: FenceId, timeout_ns: u64) -> RhiResult<()>;
    fn reset_fence(&self, fence: FenceId) -> RhiResult<()>;

    fn create_semaphore(&self) -> RhiResult<SemaphoreId>;
    fn destroy_semaphore(&self, semaphore: SemaphoreId);

    fn create_command_context(&self) -> RhiResult<CommandContextId>;
    fn destroy_command_context(&self, context: CommandContextId);
    /// Reset `context` and record one frame into it.
    fn record(
        &self,
        context: CommandContextId,
        target: &RenderTarget,
        commands: &[DrawCommand],
    ) -> RhiResult<()>;
    fn submit(&self, submit: &SubmitDesc) -> RhiResult<()>;
    /// Block until all submitted work has retired.
    fn wait_idle(&self) -> RhiResult<()>;

    // --- surface-dependent state ---

    fn create_swapchain(&self, extent: Extent2D) -> RhiResult<(SwapchainId, SwapchainInfo)>;
    fn destroy_swapchain(&self, swapchain: SwapchainId);
    fn create_pipeline(&self, desc: &PipelineDesc) -> RhiResult<PipelineId>;
    fn destroy_pipeline(&self, pipeline: PipelineId);

    /// Acquire the next presentable image, signalling `signal` when it is ready.
    fn acquire_next_image(
        &self,
        swapchain: SwapchainId,
        signal: SemaphoreId,
    ) -> RhiResult<AcquireOutcome>;
    fn present(
        &self,
        swapchain: SwapchainId,
        image_index: u32,
        wait: SemaphoreId,
    ) -> RhiResult<PresentOutcome>;
}
