//! Viewer binary: a lit, spinning scene with an optional video panel.
//!
//! Reads `renderer.ron` from the working directory when present. WASD/QE
//! move the camera, ESC quits.
//!
//! Shaders are SPIR-V. When the configured `.spv` files do not exist, the
//! ones the build script compiled from `shaders/` with `glslc` are used.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use glam::Vec3;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use renderer_core::{EngineConfig, PresentPreference};
use renderer_platform::{KeyCode, KeyEvent, Window};
use renderer_renderer::{FrameScheduler, SchedulerConfig, UpdateThread, VideoProducer};
use renderer_resources::{FrameSequenceDecoder, Material, MeshData};
use renderer_rhi::vulkan::{PresentMode, VulkanBackend, VulkanBackendDesc};
use renderer_rhi::{Extent2D, ShaderCode};
use renderer_scene::{
    Camera, CameraView, FpsController, Light, LightingModel, Model, ModelId, NodeRef, Object,
    SceneBuilder, SceneSender,
};

const CONFIG_PATH: &str = "renderer.ron";

/// Radians per second the demo cube turns.
const SPIN_SPEED: f32 = 0.8;

/// Everything alive while the window is open. Fields drop in order, so the
/// threads stop before the scheduler and the window goes last.
struct Running {
    update: UpdateThread,
    video: Option<VideoProducer>,
    scheduler: FrameScheduler<VulkanBackend>,
    window: Window,
}

struct Viewer {
    config: EngineConfig,
    running: Option<Running>,
}

impl Viewer {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            running: None,
        }
    }

    fn start(&self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let window = Window::new(event_loop, &self.config.window)?;

        let desc = VulkanBackendDesc {
            validation: self.config.renderer.validation,
            present_mode: present_mode(self.config.renderer.present_mode),
            max_binding_sets: self.config.renderer.max_binding_sets,
        };
        let backend = std::sync::Arc::new(VulkanBackend::new(
            &desc,
            window.display_handle()?.as_raw(),
            window.window_handle()?.as_raw(),
        )?);

        let vertex = load_shader(&self.config.shaders.vertex)?;
        let fragment = load_shader(&self.config.shaders.fragment)?;
        let scheduler_config =
            SchedulerConfig::from_renderer_config(&self.config.renderer, vertex, fragment);

        let (builder, spinner) = demo_scene(&self.config)?;
        let mut scheduler = FrameScheduler::new(
            backend,
            builder,
            scheduler_config,
            Extent2D::new(window.width(), window.height()),
        )?;

        let sources = scheduler.take_video_sources();
        let video = if sources.is_empty() {
            None
        } else {
            Some(VideoProducer::spawn(sources)?)
        };

        let sender = scheduler
            .take_sender()
            .context("scene queue already taken")?;
        let camera = Camera::controlled(
            CameraView::at(Vec3::new(0.0, 0.5, 4.0)),
            FpsController::default(),
        );
        let update = UpdateThread::spawn(sender, camera, move |tx, delta| spin(tx, spinner, delta))?;

        Ok(Running {
            update,
            video,
            scheduler,
            window,
        })
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.start(event_loop) {
            Ok(running) => {
                info!("Initialization complete, entering main loop");
                self.running = Some(running);
            }
            Err(e) => {
                error!("Failed to start: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                running.window.resize(size.width, size.height);
                running.scheduler.resize(size.width, size.height);
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let Some(key) = KeyEvent::from_winit(&event) else {
                    return;
                };
                if key.key == KeyCode::Escape && key.pressed {
                    info!("Escape pressed, shutting down");
                    event_loop.exit();
                    return;
                }
                running.update.send_key(key);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = running.scheduler.tick() {
                    error!("Frame failed: {}", e);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = &self.running {
            running.window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = self.running.take() {
            let stats = running.scheduler.stats();
            if let Some(video) = &running.video {
                info!("Decoded {} video frames", video.frames_produced());
            }
            info!(
                "Presented {} frames, {} surface rebuilds",
                stats.presented, stats.rebuilds
            );
        }
    }
}

fn present_mode(preference: PresentPreference) -> PresentMode {
    match preference {
        PresentPreference::Mailbox => PresentMode::Mailbox,
        PresentPreference::Fifo => PresentMode::Fifo,
        PresentPreference::Immediate => PresentMode::Immediate,
    }
}

fn load_shader(configured: &Path) -> Result<ShaderCode> {
    let path = resolve_shader(configured, option_env!("RENDERER_SHADER_DIR"));
    let bytes = std::fs::read(&path).with_context(|| {
        format!(
            "failed to read shader {} (compile shaders/ with glslc or install the Vulkan SDK and rebuild)",
            path.display()
        )
    })?;
    ShaderCode::from_bytes(&bytes).with_context(|| format!("invalid shader {}", path.display()))
}

/// The configured path if it exists, else the same file name in `built`.
fn resolve_shader(configured: &Path, built: Option<&str>) -> PathBuf {
    if configured.exists() {
        return configured.to_path_buf();
    }
    match (built, configured.file_name()) {
        (Some(dir), Some(name)) => Path::new(dir).join(name),
        _ => configured.to_path_buf(),
    }
}

/// A floor, a spinning cube and, when configured, a video panel behind them.
fn demo_scene(config: &EngineConfig) -> Result<(SceneBuilder, ModelId)> {
    let mut builder = SceneBuilder::new();

    let floor = builder.add_model(Model::new("floor").with_object(Object::with_material(
        "tiles",
        MeshData::quad(6.0),
        Material::solid("slate", Vec3::new(0.25, 0.27, 0.3)),
    )));
    if let Some(model) = builder.model_mut(floor) {
        model.translate(Vec3::new(0.0, -1.0, 0.0));
        model.rotate(Vec3::new(-std::f32::consts::FRAC_PI_2, 0.0, 0.0));
    }

    let spinner = builder.add_model(Model::new("spinner").with_object(Object::with_material(
        "cube",
        MeshData::cube(1.0),
        Material::solid("amber", Vec3::new(0.9, 0.55, 0.1)),
    )));

    match &config.video.frames_dir {
        Some(dir) => {
            let decoder = FrameSequenceDecoder::new(dir.clone(), config.video.fps);
            let screen = builder.add_model(Model::new("screen").with_object(Object::with_video(
                "panel",
                MeshData::quad(3.0),
                Box::new(decoder),
            )));
            if let Some(model) = builder.model_mut(screen) {
                model.translate(Vec3::new(0.0, 0.5, -3.0));
            }
        }
        None => warn!("No video.frames_dir configured, skipping the video panel"),
    }

    builder.add_light(Light::ambient(Vec3::ONE))?;
    builder.add_light(
        Light::point(Vec3::new(2.0, 3.0, 3.0), Vec3::ONE).with_model(LightingModel::BlinnPhong),
    )?;
    builder.add_light(Light::directional(
        Vec3::new(-0.3, -1.0, -0.5),
        Vec3::new(0.6, 0.6, 0.7),
    ))?;
    builder.set_camera(Camera::fixed(CameraView::default()));

    Ok((builder, spinner))
}

fn spin(tx: &SceneSender, model: ModelId, delta: Duration) -> renderer_scene::SceneResult<()> {
    let angle = SPIN_SPEED * delta.as_secs_f32();
    tx.rotate(NodeRef::object(model, "cube"), Vec3::new(0.0, angle, 0.0))?;
    tx.rotate(NodeRef::object(model, "cube"), Vec3::new(angle * 0.3, 0.0, 0.0))
}

fn main() -> Result<()> {
    let config = match EngineConfig::load_or_default(CONFIG_PATH) {
        Ok(config) => config,
        Err(e) => {
            renderer_core::init_logging();
            error!("Invalid {}: {}", CONFIG_PATH, e);
            return Err(e.into());
        }
    };
    match config.log_filter.as_deref() {
        Some(filter) => renderer_core::init_logging_with(filter),
        None => renderer_core::init_logging(),
    }
    info!("Starting viewer");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut viewer = Viewer::new(config);
    event_loop.run_app(&mut viewer)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_shader_wins_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh.vert.spv");
        std::fs::write(&path, 0x0723_0203u32.to_le_bytes()).unwrap();

        assert_eq!(resolve_shader(&path, Some("/built")), path);
        assert!(load_shader(&path).is_ok());
    }

    #[test]
    fn test_missing_shader_falls_back_to_built_dir() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("mesh.frag.spv");

        assert_eq!(
            resolve_shader(&missing, Some("/built")),
            Path::new("/built").join("mesh.frag.spv")
        );
        assert_eq!(resolve_shader(&missing, None), missing);
    }
}
