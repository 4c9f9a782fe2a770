//! The update and video threads feeding a live scheduler.

use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::Vec3;

use renderer_renderer::{FrameScheduler, SchedulerConfig, UpdateThread, VideoProducer};
use renderer_resources::{Material, MemoryDecoder, MeshData};
use renderer_rhi::{HeadlessBackend, ShaderCode};
use renderer_scene::{Camera, CameraView, FpsController, Model, NodeRef, Object, SceneBuilder};
use renderer_platform::{KeyCode, KeyEvent};

fn shader() -> ShaderCode {
    ShaderCode::from_bytes(&0x0723_0203u32.to_le_bytes()).unwrap()
}

fn tick_until(scheduler: &mut FrameScheduler<HeadlessBackend>, mut done: impl FnMut(&FrameScheduler<HeadlessBackend>) -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done(scheduler) {
        assert!(Instant::now() < deadline, "condition never reached");
        scheduler.tick().unwrap();
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn test_video_frames_reach_the_texture() {
    let backend = Arc::new(HeadlessBackend::new());
    let mut builder = SceneBuilder::new();
    builder.add_model(
        Model::new("screen")
            .with_object(Object::with_video(
                "panel",
                MeshData::quad(2.0),
                Box::new(MemoryDecoder::solid_frames(
                    "clip",
                    2,
                    2,
                    200.0,
                    &[[0, 0, 255], [0, 255, 0]],
                )),
            ))
            .with_object(Object::with_material(
                "frame",
                MeshData::cube(0.1),
                Material::solid("grey", Vec3::splat(0.5)),
            )),
    );
    builder.set_camera(Camera::default());
    let mut scheduler = FrameScheduler::new(
        Arc::clone(&backend),
        builder,
        SchedulerConfig::new(shader(), shader()),
        backend.window_extent(),
    )
    .unwrap();

    let sources = scheduler.take_video_sources();
    assert_eq!(sources.len(), 1);
    assert!(scheduler.take_video_sources().is_empty());

    let image = scheduler
        .scene()
        .textures()
        .iter()
        .find(|t| t.is_video())
        .and_then(|t| t.image())
        .unwrap();
    // First frame is uploaded at load, BGR swizzled to RGBA.
    assert_eq!(&backend.image_pixels(image).unwrap()[..4], &[255, 0, 0, 255]);

    let producer = VideoProducer::spawn(sources).unwrap();
    tick_until(&mut scheduler, |s| s.stats().video_frames >= 2);
    assert!(producer.frames_produced() >= 2);
    drop(producer);

    let stats = backend.stats();
    assert_eq!(stats.context_reuse_violations, 0);
    assert_eq!(stats.destroyed_while_in_flight, 0);
}

#[test]
fn test_update_thread_drives_scene_and_camera() {
    let backend = Arc::new(HeadlessBackend::new());
    let mut builder = SceneBuilder::new();
    let id = builder.add_model(Model::new("spinner").with_object(Object::with_material(
        "cube",
        MeshData::cube(1.0),
        Material::solid("blue", Vec3::Z),
    )));
    builder.set_camera(Camera::default());
    let mut scheduler = FrameScheduler::new(
        Arc::clone(&backend),
        builder,
        SchedulerConfig::new(shader(), shader()),
        backend.window_extent(),
    )
    .unwrap();

    let camera = Camera::controlled(CameraView::at(Vec3::new(0.0, 0.0, 5.0)), FpsController::default());
    let update = UpdateThread::spawn(scheduler.take_sender().unwrap(), camera, move |tx, delta| {
        tx.rotate(NodeRef::Model(id), Vec3::new(0.0, delta.as_secs_f32(), 0.0))
    })
    .unwrap();
    update.send_key(KeyEvent::pressed(KeyCode::KeyS));

    tick_until(&mut scheduler, |s| {
        s.scene().model(id).unwrap().transform().version() >= 3 && s.scene().camera().position.z > 5.0
    });
    update.send_key(KeyEvent::released(KeyCode::KeyS));
    drop(update);

    // Whatever was still queued lands on the next tick.
    scheduler.tick().unwrap();
    assert_eq!(backend.stats().context_reuse_violations, 0);
}

#[test]
fn test_update_thread_exits_when_scheduler_is_gone() {
    let backend = Arc::new(HeadlessBackend::new());
    let mut builder = SceneBuilder::new();
    let id = builder.add_model(Model::new("empty"));
    builder.set_camera(Camera::default());
    let mut scheduler = FrameScheduler::new(
        Arc::clone(&backend),
        builder,
        SchedulerConfig::new(shader(), shader()),
        backend.window_extent(),
    )
    .unwrap();
    // The thread notices the closed queue on its next post.
    let update = UpdateThread::spawn(scheduler.take_sender().unwrap(), Camera::default(), move |tx, _| {
        tx.translate(NodeRef::Model(id), Vec3::ZERO)
    })
    .unwrap();
    drop(scheduler);

    let deadline = Instant::now() + Duration::from_secs(5);
    while update.is_running() {
        assert!(Instant::now() < deadline, "update thread kept running");
        std::thread::sleep(Duration::from_millis(1));
    }
}
