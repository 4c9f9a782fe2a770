//! Vulkan 1.3 implementation of [`Backend`](crate::Backend).
//!
//! Rendering uses dynamic rendering and synchronization2, so there are no
//! render pass or framebuffer objects to rebuild with the swapchain.

mod backend;
mod command;
mod descriptor;
mod device;
mod instance;
mod memory;
mod physical_device;
mod pipeline;
mod swapchain;

pub use backend::{VulkanBackend, VulkanBackendDesc};
pub use swapchain::PresentMode;
