//! RHI error types.

use thiserror::Error;

/// Error type for every backend operation.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error not covered by a more specific variant
    #[error("Vulkan error: {0}")]
    Vulkan(ash::vk::Result),

    /// Failed to load the Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// GPU allocator error other than exhaustion
    #[error("Allocator error: {0}")]
    Allocator(gpu_allocator::AllocationError),

    /// Device or host memory for a GPU resource is exhausted
    #[error("Out of device memory while allocating {what} ({size} bytes)")]
    OutOfDeviceMemory { what: &'static str, size: u64 },

    /// Host access to memory that is not host-visible, or outside its bounds
    #[error("Invalid access: {0}")]
    InvalidAccess(String),

    /// A resource was used before it finished loading
    #[error("Resource not loaded: {0}")]
    NotLoaded(String),

    /// A handle whose resource has already been destroyed
    #[error("Stale {kind} handle {handle}")]
    StaleHandle { kind: &'static str, handle: String },

    /// No GPU meets the renderer's requirements
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Shader module rejected
    #[error("Shader error: {0}")]
    Shader(String),

    /// Surface creation or query error
    #[error("Surface error: {0}")]
    Surface(String),

    /// Swapchain creation error
    #[error("Swapchain error: {0}")]
    Swapchain(String),

    /// Descriptor or pipeline setup error
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl From<ash::vk::Result> for RhiError {
    fn from(result: ash::vk::Result) -> Self {
        match result {
            ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                RhiError::OutOfDeviceMemory {
                    what: "Vulkan object",
                    size: 0,
                }
            }
            other => RhiError::Vulkan(other),
        }
    }
}

impl From<gpu_allocator::AllocationError> for RhiError {
    fn from(error: gpu_allocator::AllocationError) -> Self {
        match error {
            gpu_allocator::AllocationError::OutOfMemory => RhiError::OutOfDeviceMemory {
                what: "allocation",
                size: 0,
            },
            other => RhiError::Allocator(other),
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
