//! Frame lifecycle for the renderer.
//!
//! This crate turns a [`SceneBuilder`](renderer_scene::SceneBuilder) into
//! presented frames:
//! - [`FrameRing`]: per-slot command context, sync objects and uniforms
//! - [`SwapchainManager`]: everything sized by the surface, rebuilt as one
//! - [`GpuScene`]: uploaded meshes, textures and node uniforms
//! - [`FrameScheduler`]: the per-tick wait, acquire, record, submit, present loop
//! - [`UpdateThread`] and [`VideoProducer`]: the two background threads

mod error;

pub mod frame;
pub mod gpu_scene;
pub mod scheduler;
pub mod surface;
pub mod update;
pub mod video;

pub use error::{RendererError, RendererResult};
pub use frame::{FrameRing, FrameSlot};
pub use gpu_scene::GpuScene;
pub use scheduler::{FrameScheduler, FrameStats, SchedulerConfig, TickOutcome};
pub use surface::{RebuildOutcome, SwapchainManager};
pub use update::{MIN_UPDATE_INTERVAL, UpdateThread};
pub use video::VideoProducer;
