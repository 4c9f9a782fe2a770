//! GPU-facing resources built on top of the RHI.
//!
//! - Mesh data and its device-local upload
//! - Materials and the texture each one needs
//! - The texture state machine (solid color, still image, video stream)
//! - Video decode sources and the frame handoff buffer
//! - Uniform buffer layouts shared with the shaders

mod error;

pub mod image;
pub mod material;
pub mod mesh;
pub mod texture;
pub mod ubo;
pub mod video;

pub use error::{ResourceError, ResourceResult};
pub use material::{Material, linear_to_rgba};
pub use mesh::{GpuMesh, MeshData};
pub use texture::{PLACEHOLDER_COLOR, Texture, TextureSource, TextureState};
pub use ubo::{CameraUbo, GpuLight, LightsUbo, MAX_LIGHTS, NodeUbo};
pub use video::{
    FrameSequenceDecoder, MemoryDecoder, SharedFrame, StreamInfo, VideoDecoder, VideoSource,
};
