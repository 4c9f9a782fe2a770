//! Textures: one image, its sampler and its binding set.
//!
//! A [`Texture`] moves `Unloaded → Loading → Ready` exactly once; a failed
//! load drops back to `Unloaded`. What gets uploaded depends on the
//! [`TextureSource`]:
//!
//! - `Color`: a 1×1 image of one RGBA color
//! - `Image`: a decoded still image, or a magenta placeholder if decoding fails
//! - `Video`: the stream's first frame, followed by one copy per
//!   [`Texture::publish_frame`] whenever the decode thread produced a new one

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use renderer_rhi::backend::tag;
use renderer_rhi::{
    Backend, Binding, BindingLayout, BindingSetId, BufferUsage, Extent2D, GpuBuffer, GpuImage,
    ImageDesc, ImageId, MemoryVisibility, Owned,
};
use tracing::{debug, info, warn};

use crate::error::{ResourceError, ResourceResult};
use crate::image::{RgbaImage, load_rgba};
use crate::video::{SharedFrame, VideoDecoder, VideoSource};

/// Color shown in place of an image that failed to decode.
pub const PLACEHOLDER_COLOR: [u8; 4] = [255, 0, 255, 255];

/// Where a texture's pixels come from.
pub enum TextureSource {
    Color([u8; 4]),
    Image(PathBuf),
    Video(Box<dyn VideoDecoder>),
}

impl fmt::Debug for TextureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureSource::Color(rgba) => f.debug_tuple("Color").field(rgba).finish(),
            TextureSource::Image(path) => f.debug_tuple("Image").field(path).finish(),
            TextureSource::Video(decoder) => f.debug_tuple("Video").field(&decoder.name()).finish(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureState {
    Unloaded,
    Loading,
    Ready,
}

#[derive(Clone, Debug)]
enum Kind {
    Color([u8; 4]),
    Image(PathBuf),
    Video,
}

// Field order is drop order: the binding set goes before what it references.
struct GpuTexture<B: Backend> {
    binding_set: Owned<B, tag::BindingSet>,
    sampler: Owned<B, tag::Sampler>,
    image: GpuImage<B>,
}

struct VideoState<B: Backend> {
    staging: GpuBuffer<B>,
    shared: SharedFrame,
    published: u64,
    /// Decode half, until the producer thread takes it.
    source: Option<VideoSource>,
}

pub struct Texture<B: Backend> {
    name: String,
    kind: Kind,
    decoder: Option<Box<dyn VideoDecoder>>,
    state: TextureState,
    video: Option<VideoState<B>>,
    gpu: Option<GpuTexture<B>>,
}

impl<B: Backend> Texture<B> {
    pub fn new(name: impl Into<String>, source: TextureSource) -> Self {
        let (kind, decoder) = match source {
            TextureSource::Color(rgba) => (Kind::Color(rgba), None),
            TextureSource::Image(path) => (Kind::Image(path), None),
            TextureSource::Video(decoder) => (Kind::Video, Some(decoder)),
        };
        Self {
            name: name.into(),
            kind,
            decoder,
            state: TextureState::Unloaded,
            video: None,
            gpu: None,
        }
    }

    /// Upload the texture and build its sampler and binding set.
    ///
    /// A no-op once the texture is `Ready`. On failure the texture returns to
    /// `Unloaded` and may be loaded again.
    pub fn load(&mut self, backend: &Arc<B>) -> ResourceResult<()> {
        if self.state == TextureState::Ready {
            return Ok(());
        }
        self.state = TextureState::Loading;

        let result = match self.kind.clone() {
            Kind::Color(rgba) => self.load_still(backend, RgbaImage::solid(1, 1, rgba)),
            Kind::Image(path) => {
                let pixels = load_rgba(&path).unwrap_or_else(|e| {
                    warn!(
                        "Texture '{}': cannot load {} ({}), using placeholder",
                        self.name,
                        path.display(),
                        e
                    );
                    RgbaImage::solid(1, 1, PLACEHOLDER_COLOR)
                });
                self.load_still(backend, pixels)
            }
            Kind::Video => self.load_video(backend),
        };

        match result {
            Ok(()) => {
                self.state = TextureState::Ready;
                debug!("Texture '{}' ready", self.name);
                Ok(())
            }
            Err(e) => {
                self.state = TextureState::Unloaded;
                Err(e)
            }
        }
    }

    fn load_still(&mut self, backend: &Arc<B>, pixels: RgbaImage) -> ResourceResult<()> {
        let staging = GpuBuffer::with_data(backend, BufferUsage::Staging, &pixels.pixels)?;
        self.gpu = Some(build_gpu_texture(
            backend,
            &staging,
            pixels.width,
            pixels.height,
        )?);
        Ok(())
    }

    fn load_video(&mut self, backend: &Arc<B>) -> ResourceResult<()> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| ResourceError::AlreadyTaken(format!("decoder of '{}'", self.name)))?;
        let (info, rgba) = VideoSource::open_first_frame(&mut **decoder)?;

        let staging = GpuBuffer::allocate(
            backend,
            rgba.len() as u64,
            BufferUsage::Staging,
            MemoryVisibility::HostVisible,
        )?;
        staging.upload(&rgba)?;
        let gpu = build_gpu_texture(backend, &staging, info.width, info.height)?;

        // Only now is the load certain to succeed; hand the decoder over.
        let Some(decoder) = self.decoder.take() else {
            return Err(ResourceError::AlreadyTaken(format!(
                "decoder of '{}'",
                self.name
            )));
        };
        let source = VideoSource::from_opened(decoder, info, rgba);
        self.video = Some(VideoState {
            staging,
            shared: source.shared().clone(),
            published: source.shared().sequence(),
            source: Some(source),
        });
        self.gpu = Some(gpu);
        Ok(())
    }

    /// Copy the newest decoded frame to the GPU image, if there is one.
    ///
    /// The shared frame is locked only while its pixels are copied into the
    /// staging buffer; the buffer-to-image transfer runs after the lock is
    /// released. Returns whether a frame was copied. Textures without a
    /// video stream never have anything to publish.
    pub fn publish_frame(&mut self) -> ResourceResult<bool> {
        let gpu = self.gpu.as_ref().ok_or_else(|| self.not_loaded())?;
        let Some(video) = self.video.as_mut() else {
            return Ok(false);
        };

        let staging = &video.staging;
        let Some((sequence, copied)) = video
            .shared
            .read_if_newer(video.published, |rgba| staging.upload(rgba))
        else {
            return Ok(false);
        };
        copied?;

        let extent = gpu.image.desc().extent;
        staging.as_image_copy(&gpu.image, extent.width, extent.height)?;
        video.published = sequence;
        Ok(true)
    }

    /// Hand the decode half of a video texture to the producer thread.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::NotLoaded`] before the texture is loaded, or if it
    ///   has no video stream
    /// - [`ResourceError::AlreadyTaken`] on the second call
    pub fn take_video_source(&mut self) -> ResourceResult<VideoSource> {
        if self.state != TextureState::Ready {
            return Err(self.not_loaded());
        }
        let Some(video) = self.video.as_mut() else {
            return Err(ResourceError::NotLoaded(format!(
                "texture '{}' has no video stream",
                self.name
            )));
        };
        let source = video
            .source
            .take()
            .ok_or_else(|| ResourceError::AlreadyTaken(format!("video source of '{}'", self.name)))?;
        info!("Video source of texture '{}' handed off", self.name);
        Ok(source)
    }

    /// The set bound at the texture slot when drawing with this texture.
    pub fn binding_set(&self) -> ResourceResult<BindingSetId> {
        self.gpu
            .as_ref()
            .map(|gpu| gpu.binding_set.handle())
            .ok_or_else(|| self.not_loaded())
    }

    pub fn image(&self) -> Option<ImageId> {
        self.gpu.as_ref().map(|gpu| gpu.image.id())
    }

    pub fn extent(&self) -> Option<Extent2D> {
        self.gpu.as_ref().map(|gpu| gpu.image.desc().extent)
    }

    #[inline]
    pub fn state(&self) -> TextureState {
        self.state
    }

    #[inline]
    pub fn is_video(&self) -> bool {
        matches!(self.kind, Kind::Video)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn not_loaded(&self) -> ResourceError {
        ResourceError::NotLoaded(format!("texture '{}' is {:?}", self.name, self.state))
    }
}

impl<B: Backend> fmt::Debug for Texture<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .finish()
    }
}

fn build_gpu_texture<B: Backend>(
    backend: &Arc<B>,
    staging: &GpuBuffer<B>,
    width: u32,
    height: u32,
) -> ResourceResult<GpuTexture<B>> {
    let image = GpuImage::allocate(backend, ImageDesc::sampled_rgba(width, height))?;
    staging.as_image_copy(&image, width, height)?;
    let sampler = Owned::new(backend, backend.create_sampler()?);
    let binding_set = Owned::new(
        backend,
        backend.create_binding_set(
            BindingLayout::Texture,
            &[Binding::Texture {
                image: image.id(),
                sampler: sampler.handle(),
            }],
        )?,
    );
    Ok(GpuTexture {
        binding_set,
        sampler,
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::MemoryDecoder;
    use renderer_rhi::{HeadlessBackend, ImageLayout, RhiError};

    fn headless() -> Arc<HeadlessBackend> {
        Arc::new(HeadlessBackend::new())
    }

    #[test]
    fn test_color_texture_uploads_one_pixel() {
        let backend = headless();
        let mut texture = Texture::new("red", TextureSource::Color([255, 0, 0, 255]));
        assert_eq!(texture.state(), TextureState::Unloaded);

        texture.load(&backend).unwrap();
        assert_eq!(texture.state(), TextureState::Ready);
        assert_eq!(texture.extent(), Some(Extent2D::new(1, 1)));

        let image = texture.image().unwrap();
        assert_eq!(backend.image_pixels(image).unwrap(), vec![255, 0, 0, 255]);
        assert_eq!(
            backend.image_layout_history(image).unwrap(),
            vec![
                ImageLayout::Undefined,
                ImageLayout::TransferDst,
                ImageLayout::ShaderReadOnly
            ]
        );
    }

    #[test]
    fn test_load_is_idempotent() {
        let backend = headless();
        let mut texture = Texture::new("once", TextureSource::Color([1, 2, 3, 4]));
        texture.load(&backend).unwrap();
        let before = backend.live_counts();
        let set = texture.binding_set().unwrap();

        texture.load(&backend).unwrap();
        assert_eq!(backend.live_counts(), before);
        assert_eq!(backend.binding_sets_created(BindingLayout::Texture), 1);
        assert_eq!(texture.binding_set().unwrap(), set);
    }

    #[test]
    fn test_binding_set_before_load_is_not_loaded() {
        let texture: Texture<HeadlessBackend> =
            Texture::new("pending", TextureSource::Color([0; 4]));
        assert!(matches!(
            texture.binding_set(),
            Err(ResourceError::NotLoaded(_))
        ));
    }

    #[test]
    fn test_missing_image_falls_back_to_placeholder() {
        let backend = headless();
        let mut texture = Texture::new("missing", TextureSource::Image("nope/missing.png".into()));
        texture.load(&backend).unwrap();

        assert_eq!(texture.state(), TextureState::Ready);
        let pixels = backend.image_pixels(texture.image().unwrap()).unwrap();
        assert_eq!(pixels, PLACEHOLDER_COLOR.to_vec());
    }

    #[test]
    fn test_image_texture_uses_decoded_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        image::RgbaImage::from_pixel(4, 2, image::Rgba([9, 8, 7, 255]))
            .save(&path)
            .unwrap();

        let backend = headless();
        let mut texture = Texture::new("wide", TextureSource::Image(path));
        texture.load(&backend).unwrap();
        assert_eq!(texture.extent(), Some(Extent2D::new(4, 2)));
    }

    #[test]
    fn test_failed_load_returns_to_unloaded() {
        // Room for the staging buffer but not for the image.
        let backend = Arc::new(HeadlessBackend::with_memory_budget(4));
        let mut texture = Texture::new("tight", TextureSource::Color([0, 0, 0, 255]));

        let err = texture.load(&backend).unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Rhi(RhiError::OutOfDeviceMemory { .. })
        ));
        assert_eq!(texture.state(), TextureState::Unloaded);
        assert_eq!(backend.live_counts().buffers, 0);
    }

    #[test]
    fn test_empty_video_fails_and_keeps_decoder() {
        let backend = headless();
        let decoder = MemoryDecoder::new("blank", 2, 2, 30.0, Vec::new());
        let mut texture = Texture::new("blank", TextureSource::Video(Box::new(decoder)));

        for _ in 0..2 {
            let err = texture.load(&backend).unwrap_err();
            assert!(matches!(err, ResourceError::EmptyStream(_)));
            assert_eq!(texture.state(), TextureState::Unloaded);
        }
    }

    #[test]
    fn test_video_publish_copies_only_new_frames() {
        let backend = headless();
        let decoder = MemoryDecoder::solid_frames("clip", 1, 1, 1000.0, &[[0, 0, 255], [0, 255, 0]]);
        let mut texture = Texture::new("clip", TextureSource::Video(Box::new(decoder)));
        texture.load(&backend).unwrap();
        let image = texture.image().unwrap();
        assert_eq!(backend.image_pixels(image).unwrap(), vec![255, 0, 0, 255]);

        // Nothing decoded since the load.
        let copies = backend.stats().one_shot_submits;
        assert!(!texture.publish_frame().unwrap());
        assert_eq!(backend.stats().one_shot_submits, copies);

        let mut source = texture.take_video_source().unwrap();
        let due = source.next_due();
        assert!(source.produce_next_frame_at(due).unwrap());

        assert!(texture.publish_frame().unwrap());
        assert_eq!(backend.image_pixels(image).unwrap(), vec![0, 255, 0, 255]);
        assert!(!texture.publish_frame().unwrap());
    }

    #[test]
    fn test_video_source_is_taken_once() {
        let backend = headless();
        let decoder = MemoryDecoder::solid_frames("once", 1, 1, 30.0, &[[0, 0, 0]]);
        let mut texture = Texture::new("once", TextureSource::Video(Box::new(decoder)));

        assert!(matches!(
            texture.take_video_source(),
            Err(ResourceError::NotLoaded(_))
        ));
        texture.load(&backend).unwrap();
        assert!(texture.take_video_source().is_ok());
        assert!(matches!(
            texture.take_video_source(),
            Err(ResourceError::AlreadyTaken(_))
        ));
    }

    #[test]
    fn test_still_texture_has_no_video_source() {
        let backend = headless();
        let mut texture = Texture::new("flat", TextureSource::Color([0; 4]));
        texture.load(&backend).unwrap();
        assert!(!texture.is_video());
        assert!(!texture.publish_frame().unwrap());
        assert!(matches!(
            texture.take_video_source(),
            Err(ResourceError::NotLoaded(_))
        ));
    }

    #[test]
    fn test_drop_releases_everything() {
        let backend = headless();
        {
            let mut texture = Texture::new("temp", TextureSource::Color([0; 4]));
            texture.load(&backend).unwrap();
            assert_eq!(backend.live_counts().binding_sets, 1);
        }
        let live = backend.live_counts();
        assert_eq!(
            (live.images, live.samplers, live.binding_sets, live.buffers),
            (0, 0, 0, 0)
        );
    }
}
