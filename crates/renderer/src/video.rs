//! The video producer thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, warn};

use renderer_resources::VideoSource;

use crate::error::{RendererError, RendererResult};

/// Longest the thread sleeps when there is nothing to decode.
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Decodes frames for every video texture on a background thread.
///
/// The thread sleeps until the nearest source is due, decodes, and publishes
/// into each source's shared frame. The render thread picks the pixels up in
/// its next tick. Dropping the handle stops and joins the thread.
pub struct VideoProducer {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<Vec<VideoSource>>>,
    frames_produced: Arc<AtomicU64>,
}

impl VideoProducer {
    pub fn spawn(sources: Vec<VideoSource>) -> RendererResult<Self> {
        let (stop, stopped) = crossbeam_channel::bounded(1);
        let frames_produced = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&frames_produced);
        info!("Starting video producer for {} source(s)", sources.len());

        let handle = thread::Builder::new()
            .name("video".to_string())
            .spawn(move || run(sources, stopped, counter))
            .map_err(|source| RendererError::Spawn {
                name: "video",
                source,
            })?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
            frames_produced,
        })
    }

    /// Frames decoded and published since the thread started.
    pub fn frames_produced(&self) -> u64 {
        self.frames_produced.load(Ordering::Relaxed)
    }

    /// Stop the thread and hand back the sources that were still healthy.
    pub fn stop(mut self) -> Vec<VideoSource> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Vec<VideoSource> {
        self.stop.take();
        match self.handle.take().map(JoinHandle::join) {
            Some(Ok(sources)) => sources,
            Some(Err(_)) => {
                error!("Video producer thread panicked");
                Vec::new()
            }
            None => Vec::new(),
        }
    }
}

impl Drop for VideoProducer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    mut sources: Vec<VideoSource>,
    stopped: Receiver<()>,
    frames_produced: Arc<AtomicU64>,
) -> Vec<VideoSource> {
    loop {
        let now = Instant::now();
        sources.retain_mut(|source| match source.produce_next_frame_at(now) {
            Ok(true) => {
                frames_produced.fetch_add(1, Ordering::Relaxed);
                true
            }
            Ok(false) => true,
            Err(e) => {
                warn!("Video source '{}' stopped: {}", source.name(), e);
                false
            }
        });

        let wait = sources
            .iter()
            .map(|s| s.next_due().saturating_duration_since(Instant::now()))
            .min()
            .unwrap_or(IDLE_WAIT);
        match stopped.recv_timeout(wait) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!(
        "Video producer stopped after {} frames",
        frames_produced.load(Ordering::Relaxed)
    );
    sources
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderer_resources::{MemoryDecoder, Texture, TextureSource};
    use renderer_rhi::HeadlessBackend;

    fn loaded_source(backend: &Arc<HeadlessBackend>, fps: f64) -> (Texture<HeadlessBackend>, VideoSource) {
        let decoder =
            MemoryDecoder::solid_frames("clip", 2, 2, fps, &[[0, 0, 255], [0, 255, 0], [255, 0, 0]]);
        let mut texture = Texture::new("clip", TextureSource::Video(Box::new(decoder)));
        texture.load(backend).unwrap();
        let source = texture.take_video_source().unwrap();
        (texture, source)
    }

    #[test]
    fn test_produces_frames_until_stopped() {
        let backend = Arc::new(HeadlessBackend::new());
        let (mut texture, source) = loaded_source(&backend, 500.0);
        let producer = VideoProducer::spawn(vec![source]).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while producer.frames_produced() < 4 {
            assert!(Instant::now() < deadline, "producer stalled");
            thread::sleep(Duration::from_millis(1));
        }
        assert!(texture.publish_frame().unwrap());

        let sources = producer.stop();
        assert_eq!(sources.len(), 1);
        // Three frames per pass, so at least one restart happened.
        assert!(sources[0].restarts() >= 1);
    }

    #[test]
    fn test_slow_source_is_throttled() {
        let backend = Arc::new(HeadlessBackend::new());
        let (_texture, source) = loaded_source(&backend, 1.0);
        let producer = VideoProducer::spawn(vec![source]).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(producer.frames_produced(), 0);
    }

    #[test]
    fn test_stop_without_sources() {
        let producer = VideoProducer::spawn(Vec::new()).unwrap();
        assert!(producer.stop().is_empty());
    }
}
