//! Plain-data descriptions passed across the [`Backend`](crate::Backend) seam.

use std::sync::Arc;

use crate::backend::{BindingSetId, BufferId, ImageId, PipelineId, SamplerId, SwapchainId};
use crate::error::{RhiError, RhiResult};

/// Width and height in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A minimized window reports a zero-area extent.
    #[inline]
    pub fn is_zero(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Width over height; 1.0 for a zero extent.
    pub fn aspect(self) -> f32 {
        if self.is_zero() {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Pixel formats the engine creates images with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    Bgra8Srgb,
    Bgra8Unorm,
    Rgba8Srgb,
    Rgba8Unorm,
    D32Float,
}

impl Format {
    pub fn bytes_per_pixel(self) -> u32 {
        4
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Format::D32Float)
    }

    pub fn to_vk(self) -> ash::vk::Format {
        use ash::vk;
        match self {
            Format::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
            Format::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            Format::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
            Format::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            Format::D32Float => vk::Format::D32_SFLOAT,
        }
    }

    pub fn from_vk(format: ash::vk::Format) -> Option<Self> {
        use ash::vk;
        match format {
            vk::Format::B8G8R8A8_SRGB => Some(Format::Bgra8Srgb),
            vk::Format::B8G8R8A8_UNORM => Some(Format::Bgra8Unorm),
            vk::Format::R8G8B8A8_SRGB => Some(Format::Rgba8Srgb),
            vk::Format::R8G8B8A8_UNORM => Some(Format::Rgba8Unorm),
            vk::Format::D32_SFLOAT => Some(Format::D32Float),
            _ => None,
        }
    }
}

/// Depth format used for every depth target.
pub const DEPTH_FORMAT: Format = Format::D32Float;

/// What a buffer is bound as.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    /// Source of transfer operations
    Staging,
}

impl BufferUsage {
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// Where a resource's memory lives, and so whether the host may write it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemoryVisibility {
    /// Mapped and writable from the CPU.
    HostVisible,
    /// Device memory, reachable only through transfers.
    DeviceLocal,
}

impl MemoryVisibility {
    #[inline]
    pub fn is_host_visible(self) -> bool {
        matches!(self, MemoryVisibility::HostVisible)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub visibility: MemoryVisibility,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageUsage {
    /// Transfer destination, sampled in shaders.
    Sampled,
    DepthAttachment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDesc {
    pub extent: Extent2D,
    pub format: Format,
    pub usage: ImageUsage,
}

impl ImageDesc {
    pub fn sampled_rgba(width: u32, height: u32) -> Self {
        Self {
            extent: Extent2D::new(width, height),
            format: Format::Rgba8Srgb,
            usage: ImageUsage::Sampled,
        }
    }

    pub fn depth(extent: Extent2D) -> Self {
        Self {
            extent,
            format: DEPTH_FORMAT,
            usage: ImageUsage::DepthAttachment,
        }
    }

    pub fn byte_size(&self) -> u64 {
        self.extent.width as u64 * self.extent.height as u64 * self.format.bytes_per_pixel() as u64
    }
}

/// Image layouts a texture passes through during an upload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    TransferDst,
    ShaderReadOnly,
}

/// The four binding-set layouts of the mesh pipeline, by set index.
///
/// | set | layout | contents |
/// |-----|--------|----------|
/// | 0 | Global | camera uniform, light array uniform |
/// | 1 | Model | model transform uniform |
/// | 2 | Object | object transform uniform |
/// | 3 | Texture | combined image sampler |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindingLayout {
    Global,
    Model,
    Object,
    Texture,
}

impl BindingLayout {
    pub const ALL: [BindingLayout; 4] = [
        BindingLayout::Global,
        BindingLayout::Model,
        BindingLayout::Object,
        BindingLayout::Texture,
    ];

    #[inline]
    pub fn set_index(self) -> u32 {
        match self {
            BindingLayout::Global => 0,
            BindingLayout::Model => 1,
            BindingLayout::Object => 2,
            BindingLayout::Texture => 3,
        }
    }

    /// Number of bindings the layout declares.
    pub fn binding_count(self) -> usize {
        match self {
            BindingLayout::Global => 2,
            BindingLayout::Model | BindingLayout::Object | BindingLayout::Texture => 1,
        }
    }

    /// Check that `bindings` fill every slot of the layout with the right kind.
    pub fn validate(self, bindings: &[Binding]) -> RhiResult<()> {
        if bindings.len() != self.binding_count() {
            return Err(RhiError::Pipeline(format!(
                "{:?} layout takes {} binding(s), got {}",
                self,
                self.binding_count(),
                bindings.len()
            )));
        }
        let texture_layout = self == BindingLayout::Texture;
        if let Some(binding) = bindings
            .iter()
            .find(|b| matches!(b, Binding::Texture { .. }) != texture_layout)
        {
            return Err(RhiError::Pipeline(format!(
                "{:?} layout cannot hold {:?}",
                self, binding
            )));
        }
        Ok(())
    }
}

/// One resource bound into a binding set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Binding {
    Uniform(BufferId),
    Texture { image: ImageId, sampler: SamplerId },
}

/// SPIR-V bytecode, checked for alignment and magic number.
#[derive(Clone, Debug)]
pub struct ShaderCode {
    words: Arc<[u32]>,
}

impl ShaderCode {
    const SPIRV_MAGIC: u32 = 0x0723_0203;

    pub fn from_bytes(bytes: &[u8]) -> RhiResult<Self> {
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return Err(RhiError::Shader(format!(
                "SPIR-V size must be a nonzero multiple of 4, got {} bytes",
                bytes.len()
            )));
        }
        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if words[0] != Self::SPIRV_MAGIC {
            return Err(RhiError::Shader(format!(
                "bad SPIR-V magic number {:#010x}",
                words[0]
            )));
        }
        Ok(Self {
            words: words.into(),
        })
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> RhiResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| RhiError::Shader(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_bytes(&bytes)
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    #[default]
    Back,
    Front,
}

/// Everything needed to build the mesh pipeline for one surface configuration.
#[derive(Clone, Debug)]
pub struct PipelineDesc {
    pub vertex: ShaderCode,
    pub fragment: ShaderCode,
    pub color_format: Format,
    pub depth_format: Format,
    pub cull_mode: CullMode,
}

/// The attachments one frame renders into.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderTarget {
    pub swapchain: SwapchainId,
    pub image_index: u32,
    pub depth: ImageId,
    pub extent: Extent2D,
    pub clear_color: [f32; 4],
}

/// One step of a recorded frame. Backends wrap the list in render-pass
/// begin/end and the attachment layout transitions.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrawCommand {
    BindPipeline(PipelineId),
    BindSet { layout: BindingLayout, set: BindingSetId },
    BindVertexBuffer(BufferId),
    BindIndexBuffer(BufferId),
    DrawIndexed { index_count: u32, first_index: u32 },
}

/// Result of asking the surface for an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32, suboptimal: bool },
    OutOfDate,
}

/// Result of presenting an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the surface must be rebuilt before the next frame.
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// What a freshly created swapchain looks like.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainInfo {
    pub extent: Extent2D,
    pub format: Format,
    pub image_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_zero_and_aspect() {
        assert!(Extent2D::new(0, 600).is_zero());
        assert!(!Extent2D::new(800, 600).is_zero());
        assert_eq!(Extent2D::new(0, 0).aspect(), 1.0);
        assert!((Extent2D::new(1600, 900).aspect() - 16.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn test_binding_layout_set_indices_are_distinct() {
        let mut indices: Vec<u32> = BindingLayout::ALL.iter().map(|l| l.set_index()).collect();
        indices.dedup();
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_layout_validation_checks_kind_and_count() {
        let mut arena: crate::handle::ResourceArena<crate::backend::tag::Buffer, ()> =
            crate::handle::ResourceArena::new();
        let buffer = arena.insert(());
        assert!(BindingLayout::Model.validate(&[Binding::Uniform(buffer)]).is_ok());
        assert!(BindingLayout::Global.validate(&[Binding::Uniform(buffer)]).is_err());
        assert!(BindingLayout::Texture.validate(&[Binding::Uniform(buffer)]).is_err());
    }

    #[test]
    fn test_shader_code_rejects_misaligned() {
        assert!(matches!(
            ShaderCode::from_bytes(&[1, 2, 3]),
            Err(RhiError::Shader(_))
        ));
        assert!(matches!(ShaderCode::from_bytes(&[]), Err(RhiError::Shader(_))));
    }

    #[test]
    fn test_shader_code_checks_magic() {
        let mut bytes = 0x0723_0203u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0; 4]);
        let code = ShaderCode::from_bytes(&bytes).unwrap();
        assert_eq!(code.words().len(), 2);

        assert!(ShaderCode::from_bytes(&[0; 8]).is_err());
    }

    #[test]
    fn test_unknown_vk_format_is_rejected() {
        assert_eq!(Format::from_vk(ash::vk::Format::R16G16B16A16_SFLOAT), None);
        assert!(DEPTH_FORMAT.is_depth());
    }

    #[test]
    fn test_present_outcome_rebuild() {
        assert!(!PresentOutcome::Presented.needs_rebuild());
        assert!(PresentOutcome::Suboptimal.needs_rebuild());
        assert!(PresentOutcome::OutOfDate.needs_rebuild());
    }
}
