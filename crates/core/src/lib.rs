//! Core utilities shared by every renderer crate.
//!
//! - Error type and result alias
//! - Logging initialization
//! - Frame timer
//! - Engine configuration loaded from RON

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{EngineConfig, PresentPreference, RendererConfig, ShaderConfig, VideoConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::{init_logging, init_logging_with};
pub use timer::Timer;
