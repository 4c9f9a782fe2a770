//! Video frame sources and the decode-side half of a video texture.
//!
//! A [`VideoDecoder`] yields BGR frames. [`VideoSource`] paces it at the
//! stream's frame rate and converts each frame to RGBA inside a
//! [`SharedFrame`], which the render thread later copies to the GPU. The
//! mutex inside `SharedFrame` only ever guards memory copies.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{ResourceError, ResourceResult};
use crate::image::load_rgba;

/// What an opened stream produces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl StreamInfo {
    /// Minimum time between two decoded frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps)
    }

    #[inline]
    pub fn bgr_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    #[inline]
    pub fn rgba_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    fn validate(&self, name: &str) -> ResourceResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ResourceError::Decode(format!(
                "{} reports a {}x{} stream",
                name, self.width, self.height
            )));
        }
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(ResourceError::Decode(format!(
                "{} reports {} fps",
                name, self.fps
            )));
        }
        Ok(())
    }
}

/// A stream of BGR8 frames.
pub trait VideoDecoder: Send + 'static {
    /// Human-readable name for logs and errors.
    fn name(&self) -> String;

    /// Open the stream, or rewind it to the first frame if already open.
    fn open(&mut self) -> ResourceResult<StreamInfo>;

    /// Decode the next frame into `bgr`, resizing it as needed.
    ///
    /// Returns `false` at end of stream.
    fn read_frame(&mut self, bgr: &mut Vec<u8>) -> ResourceResult<bool>;
}

/// Expand packed BGR8 into RGBA8 with opaque alpha.
///
/// Converts as many whole pixels as both slices hold.
pub fn bgr_to_rgba(bgr: &[u8], rgba: &mut [u8]) {
    for (src, dst) in bgr.chunks_exact(3).zip(rgba.chunks_exact_mut(4)) {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
        dst[3] = 255;
    }
}

struct FrameBuffer {
    rgba: Vec<u8>,
    sequence: u64,
}

/// The RGBA frame handed from the decode thread to the render thread.
///
/// `sequence` increases by one per decoded frame, so a reader can tell
/// whether anything changed since it last looked.
#[derive(Clone)]
pub struct SharedFrame {
    inner: Arc<Mutex<FrameBuffer>>,
}

impl SharedFrame {
    fn new(rgba: Vec<u8>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FrameBuffer { rgba, sequence: 1 })),
        }
    }

    pub fn sequence(&self) -> u64 {
        self.inner.lock().sequence
    }

    /// Run `read` on the pixels if the sequence moved past `seen`.
    ///
    /// Returns the sequence that was read alongside `read`'s result. The lock
    /// is held only for the duration of `read`.
    pub fn read_if_newer<R>(&self, seen: u64, read: impl FnOnce(&[u8]) -> R) -> Option<(u64, R)> {
        let frame = self.inner.lock();
        if frame.sequence == seen {
            return None;
        }
        Some((frame.sequence, read(&frame.rgba)))
    }

    fn store_bgr(&self, bgr: &[u8]) {
        let mut frame = self.inner.lock();
        bgr_to_rgba(bgr, &mut frame.rgba);
        frame.sequence += 1;
    }
}

impl fmt::Debug for SharedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedFrame")
            .field("sequence", &self.sequence())
            .finish()
    }
}

/// Decode side of a loaded video texture, driven by the producer thread.
pub struct VideoSource {
    name: String,
    decoder: Box<dyn VideoDecoder>,
    info: StreamInfo,
    interval: Duration,
    last_frame: Instant,
    bgr: Vec<u8>,
    shared: SharedFrame,
    restarts: u64,
}

impl VideoSource {
    /// Open `decoder` and decode its first frame.
    ///
    /// Returns the first frame already converted to RGBA. The caller owns the
    /// decoder until the GPU side is ready, so a failed load can be retried.
    pub(crate) fn open_first_frame(
        decoder: &mut dyn VideoDecoder,
    ) -> ResourceResult<(StreamInfo, Vec<u8>)> {
        let name = decoder.name();
        let info = decoder.open()?;
        info.validate(&name)?;

        let mut bgr = Vec::with_capacity(info.bgr_len());
        if !decoder.read_frame(&mut bgr)? {
            return Err(ResourceError::EmptyStream(name));
        }
        check_frame_len(&name, &info, &bgr)?;

        let mut rgba = vec![0; info.rgba_len()];
        bgr_to_rgba(&bgr, &mut rgba);
        Ok((info, rgba))
    }

    /// Wrap an opened decoder whose first frame is `first_rgba`.
    pub(crate) fn from_opened(
        decoder: Box<dyn VideoDecoder>,
        info: StreamInfo,
        first_rgba: Vec<u8>,
    ) -> Self {
        let name = decoder.name();
        info!(
            "Video source '{}' opened: {}x{} at {:.2} fps",
            name, info.width, info.height, info.fps
        );
        Self {
            name,
            decoder,
            info,
            interval: info.frame_interval(),
            last_frame: Instant::now(),
            bgr: Vec::with_capacity(info.bgr_len()),
            shared: SharedFrame::new(first_rgba),
            restarts: 0,
        }
    }

    /// Decode the next frame if one is due. See [`VideoSource::produce_next_frame_at`].
    pub fn produce_next_frame(&mut self) -> ResourceResult<bool> {
        self.produce_next_frame_at(Instant::now())
    }

    /// Decode the next frame if at least one frame interval has passed since
    /// the last one, as of `now`.
    ///
    /// At end of stream the decoder is rewound and its first frame used.
    /// Returns whether a new frame was published to the shared buffer.
    pub fn produce_next_frame_at(&mut self, now: Instant) -> ResourceResult<bool> {
        if now.saturating_duration_since(self.last_frame) < self.interval {
            return Ok(false);
        }
        self.last_frame = now;

        if !self.decoder.read_frame(&mut self.bgr)? {
            let info = self.decoder.open()?;
            if (info.width, info.height) != (self.info.width, self.info.height) {
                return Err(ResourceError::Decode(format!(
                    "{} changed size on restart: {}x{} -> {}x{}",
                    self.name, self.info.width, self.info.height, info.width, info.height
                )));
            }
            if !self.decoder.read_frame(&mut self.bgr)? {
                return Err(ResourceError::EmptyStream(self.name.clone()));
            }
            self.restarts += 1;
            debug!("Video source '{}' restarted ({})", self.name, self.restarts);
        }
        check_frame_len(&self.name, &self.info, &self.bgr)?;

        self.shared.store_bgr(&self.bgr);
        Ok(true)
    }

    /// When the next frame becomes due.
    pub fn next_due(&self) -> Instant {
        self.last_frame + self.interval
    }

    pub fn last_frame(&self) -> Instant {
        self.last_frame
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info(&self) -> StreamInfo {
        self.info
    }

    /// Number of times the stream wrapped around to its first frame.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    pub fn shared(&self) -> &SharedFrame {
        &self.shared
    }
}

impl fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoSource")
            .field("name", &self.name)
            .field("info", &self.info)
            .field("restarts", &self.restarts)
            .finish()
    }
}

fn check_frame_len(name: &str, info: &StreamInfo, bgr: &[u8]) -> ResourceResult<()> {
    if bgr.len() != info.bgr_len() {
        return Err(ResourceError::Decode(format!(
            "{} produced a {}-byte frame, expected {}",
            name,
            bgr.len(),
            info.bgr_len()
        )));
    }
    Ok(())
}

/// Plays in-memory BGR frames in a loop.
#[derive(Clone, Debug)]
pub struct MemoryDecoder {
    name: String,
    info: StreamInfo,
    frames: Arc<[Vec<u8>]>,
    cursor: usize,
}

impl MemoryDecoder {
    pub fn new(
        name: impl Into<String>,
        width: u32,
        height: u32,
        fps: f64,
        frames: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            name: name.into(),
            info: StreamInfo { width, height, fps },
            frames: frames.into(),
            cursor: 0,
        }
    }

    /// One flat-colored frame per entry of `colors`, given as BGR.
    pub fn solid_frames(
        name: impl Into<String>,
        width: u32,
        height: u32,
        fps: f64,
        colors: &[[u8; 3]],
    ) -> Self {
        let pixels = width as usize * height as usize;
        let frames = colors
            .iter()
            .map(|bgr| bgr.iter().copied().cycle().take(pixels * 3).collect())
            .collect();
        Self::new(name, width, height, fps, frames)
    }
}

impl VideoDecoder for MemoryDecoder {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open(&mut self) -> ResourceResult<StreamInfo> {
        self.cursor = 0;
        Ok(self.info)
    }

    fn read_frame(&mut self, bgr: &mut Vec<u8>) -> ResourceResult<bool> {
        let Some(frame) = self.frames.get(self.cursor) else {
            return Ok(false);
        };
        bgr.clear();
        bgr.extend_from_slice(frame);
        self.cursor += 1;
        Ok(true)
    }
}

/// Plays a directory of still images (PNG or JPEG) in file-name order.
#[derive(Debug)]
pub struct FrameSequenceDecoder {
    dir: PathBuf,
    fps: f64,
    files: Vec<PathBuf>,
    size: (u32, u32),
    cursor: usize,
}

impl FrameSequenceDecoder {
    pub fn new(dir: impl Into<PathBuf>, fps: f64) -> Self {
        Self {
            dir: dir.into(),
            fps,
            files: Vec::new(),
            size: (0, 0),
            cursor: 0,
        }
    }

    fn list_frames(dir: &Path) -> ResourceResult<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(ResourceError::FileNotFound(dir.to_path_buf()));
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_frame = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg")
                });
            if is_frame {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl VideoDecoder for FrameSequenceDecoder {
    fn name(&self) -> String {
        self.dir.display().to_string()
    }

    fn open(&mut self) -> ResourceResult<StreamInfo> {
        if self.files.is_empty() {
            self.files = Self::list_frames(&self.dir)?;
            let first = self
                .files
                .first()
                .ok_or_else(|| ResourceError::EmptyStream(self.name()))?;
            self.size = image::image_dimensions(first)?;
        }
        self.cursor = 0;
        Ok(StreamInfo {
            width: self.size.0,
            height: self.size.1,
            fps: self.fps,
        })
    }

    fn read_frame(&mut self, bgr: &mut Vec<u8>) -> ResourceResult<bool> {
        let Some(path) = self.files.get(self.cursor) else {
            return Ok(false);
        };
        let frame = load_rgba(path)?;
        if (frame.width, frame.height) != self.size {
            return Err(ResourceError::Decode(format!(
                "{} is {}x{}, stream is {}x{}",
                path.display(),
                frame.width,
                frame.height,
                self.size.0,
                self.size.1
            )));
        }
        *bgr = frame.to_bgr();
        self.cursor += 1;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLUE: [u8; 3] = [255, 0, 0];
    const GREEN: [u8; 3] = [0, 255, 0];
    const RED: [u8; 3] = [0, 0, 255];

    fn open_source(decoder: MemoryDecoder) -> VideoSource {
        let mut decoder: Box<dyn VideoDecoder> = Box::new(decoder);
        let (info, rgba) = VideoSource::open_first_frame(&mut *decoder).unwrap();
        VideoSource::from_opened(decoder, info, rgba)
    }

    fn first_pixel(shared: &SharedFrame) -> [u8; 4] {
        let (_, pixel) = shared
            .read_if_newer(0, |rgba| [rgba[0], rgba[1], rgba[2], rgba[3]])
            .unwrap();
        pixel
    }

    #[test]
    fn test_bgr_to_rgba_swaps_and_sets_alpha() {
        let bgr = [1, 2, 3, 4, 5, 6];
        let mut rgba = [0; 8];
        bgr_to_rgba(&bgr, &mut rgba);
        assert_eq!(rgba, [3, 2, 1, 255, 6, 5, 4, 255]);
    }

    #[test]
    fn test_empty_stream_is_rejected() {
        let mut decoder = MemoryDecoder::new("empty", 2, 2, 30.0, Vec::new());
        let err = VideoSource::open_first_frame(&mut decoder).unwrap_err();
        assert!(matches!(err, ResourceError::EmptyStream(name) if name == "empty"));
    }

    #[test]
    fn test_zero_fps_is_rejected() {
        let mut decoder = MemoryDecoder::solid_frames("still", 1, 1, 0.0, &[RED]);
        let err = VideoSource::open_first_frame(&mut decoder).unwrap_err();
        assert!(matches!(err, ResourceError::Decode(_)));
    }

    #[test]
    fn test_short_frame_is_decode_error() {
        let mut decoder = MemoryDecoder::new("short", 2, 2, 30.0, vec![vec![0; 5]]);
        assert!(matches!(
            VideoSource::open_first_frame(&mut decoder),
            Err(ResourceError::Decode(_))
        ));
    }

    #[test]
    fn test_frame_rate_gating() {
        let mut source = open_source(MemoryDecoder::solid_frames(
            "gated",
            1,
            1,
            10.0,
            &[RED, GREEN, BLUE],
        ));
        let start = source.last_frame();
        let interval = source.info().frame_interval();
        assert_eq!(source.shared().sequence(), 1);

        // Less than one interval later: nothing happens.
        assert!(!source.produce_next_frame_at(start + interval / 2).unwrap());
        assert_eq!(source.shared().sequence(), 1);

        // One full interval later: exactly one frame.
        assert!(source.produce_next_frame_at(start + interval).unwrap());
        assert_eq!(source.shared().sequence(), 2);
        assert_eq!(first_pixel(source.shared()), [0, 255, 0, 255]);

        // The timestamp was reset, so an immediate second call is gated again.
        assert!(!source.produce_next_frame_at(start + interval).unwrap());
        assert_eq!(source.next_due(), start + interval * 2);
    }

    #[test]
    fn test_end_of_stream_restarts_from_first_frame() {
        let mut source = open_source(MemoryDecoder::solid_frames("loop", 1, 1, 100.0, &[RED, GREEN]));
        let interval = source.info().frame_interval();
        let mut now = source.last_frame();

        now += interval;
        assert!(source.produce_next_frame_at(now).unwrap());
        assert_eq!(first_pixel(source.shared()), [0, 255, 0, 255]);
        assert_eq!(source.restarts(), 0);

        now += interval;
        assert!(source.produce_next_frame_at(now).unwrap());
        assert_eq!(first_pixel(source.shared()), [255, 0, 0, 255]);
        assert_eq!(source.restarts(), 1);
    }

    #[test]
    fn test_read_if_newer_skips_seen_sequence() {
        let source = open_source(MemoryDecoder::solid_frames("seen", 1, 1, 30.0, &[RED]));
        let shared = source.shared();
        let (seen, len) = shared.read_if_newer(0, |rgba| rgba.len()).unwrap();
        assert_eq!((seen, len), (1, 4));
        assert!(shared.read_if_newer(seen, |_| ()).is_none());
    }

    #[test]
    fn test_frame_sequence_decoder_plays_directory() {
        let dir = tempfile::tempdir().unwrap();
        for (i, color) in [[255u8, 0, 0], [0, 0, 255]].iter().enumerate() {
            let mut img = image::RgbImage::new(2, 2);
            for pixel in img.pixels_mut() {
                *pixel = image::Rgb(*color);
            }
            img.save(dir.path().join(format!("frame_{:03}.png", i))).unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

        let mut decoder = FrameSequenceDecoder::new(dir.path(), 24.0);
        let info = decoder.open().unwrap();
        assert_eq!((info.width, info.height, info.fps), (2, 2, 24.0));

        let mut bgr = Vec::new();
        assert!(decoder.read_frame(&mut bgr).unwrap());
        assert_eq!(&bgr[..3], &[0, 0, 255]);
        assert!(decoder.read_frame(&mut bgr).unwrap());
        assert_eq!(&bgr[..3], &[255, 0, 0]);
        assert!(!decoder.read_frame(&mut bgr).unwrap());

        decoder.open().unwrap();
        assert!(decoder.read_frame(&mut bgr).unwrap());
        assert_eq!(&bgr[..3], &[0, 0, 255]);
    }

    #[test]
    fn test_frame_sequence_decoder_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut decoder = FrameSequenceDecoder::new(dir.path(), 24.0);
        assert!(matches!(decoder.open(), Err(ResourceError::EmptyStream(_))));

        let mut missing = FrameSequenceDecoder::new(dir.path().join("nope"), 24.0);
        assert!(matches!(missing.open(), Err(ResourceError::FileNotFound(_))));
    }
}
