//! Render hardware interface.
//!
//! The frame engine talks to the GPU only through the [`Backend`] trait:
//! generation-counted handles for every device object, RAII owners for
//! memory-backed resources, and plain-data descriptions for everything else.
//!
//! - [`vulkan`] drives a real device through `ash`.
//! - [`headless`] keeps the same contract in memory for tests and tooling.

mod error;

pub mod backend;
pub mod desc;
pub mod handle;
pub mod headless;
pub mod resource;
pub mod vertex;
pub mod vulkan;

pub use backend::{
    Backend, BindingSetId, BufferId, CommandContextId, FenceId, ImageId, PipelineId, SamplerId,
    SemaphoreId, SubmitDesc, SwapchainId, WAIT_FOREVER,
};
pub use desc::{
    AcquireOutcome, Binding, BindingLayout, BufferDesc, BufferUsage, CullMode, DEPTH_FORMAT,
    DrawCommand, Extent2D, Format, ImageDesc, ImageLayout, ImageUsage, MemoryVisibility,
    PipelineDesc, PresentOutcome, RenderTarget, ShaderCode, SwapchainInfo,
};
pub use error::{RhiError, RhiResult};
pub use handle::{Handle, ResourceArena};
pub use headless::HeadlessBackend;
pub use resource::{BackendObject, GpuBuffer, GpuImage, Owned};
pub use vertex::Vertex;
