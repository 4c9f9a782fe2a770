//! Engine configuration.
//!
//! Configuration is read from a RON file. Every field has a default, so a
//! partial file (or no file at all) is valid:
//!
//! ```ron
//! (
//!     window: (title: "Viewer", width: 1600, height: 900),
//!     renderer: (frames_in_flight: 3, present_mode: Fifo),
//! )
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Largest frames-in-flight count accepted by [`EngineConfig::validate`].
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Renderer".to_string(),
            width: 1280,
            height: 720,
        }
    }
}

/// Preferred presentation mode. FIFO is used when the preference is unsupported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PresentPreference {
    #[default]
    Mailbox,
    Fifo,
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of frame slots the CPU may run ahead of the GPU.
    pub frames_in_flight: usize,
    /// Enable the Khronos validation layer when available.
    pub validation: bool,
    pub present_mode: PresentPreference,
    pub clear_color: [f32; 4],
    /// Capacity of the descriptor pool backing binding sets.
    pub max_binding_sets: u32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            validation: cfg!(debug_assertions),
            present_mode: PresentPreference::default(),
            clear_color: [0.02, 0.02, 0.03, 1.0],
            max_binding_sets: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/mesh.vert.spv"),
            fragment: PathBuf::from("shaders/mesh.frag.spv"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Directory of still frames played back as a video texture.
    pub frames_dir: Option<PathBuf>,
    /// Playback rate for sources that carry no rate of their own.
    pub fps: f64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            frames_dir: None,
            fps: 30.0,
        }
    }
}

/// Root configuration for the engine and the viewer binary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub shaders: ShaderConfig,
    pub video: VideoConfig,
    /// `tracing` filter used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl EngineConfig {
    /// Parse and validate a configuration from RON text.
    pub fn from_ron_str(text: &str) -> Result<Self> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            debug!("No configuration at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let frames = self.renderer.frames_in_flight;
        if frames == 0 || frames > MAX_FRAMES_IN_FLIGHT {
            return Err(Error::Config(format!(
                "frames_in_flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, frames
            )));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be nonzero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if !(self.video.fps > 0.0) {
            return Err(Error::Config(format!(
                "video fps must be positive, got {}",
                self.video.fps
            )));
        }
        if self.renderer.max_binding_sets == 0 {
            return Err(Error::Config("max_binding_sets must be nonzero".to_string()));
        }
        Ok(())
    }
}
