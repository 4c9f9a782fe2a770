//! Frame scheduling against the headless backend.

use std::collections::HashSet;
use std::sync::Arc;

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use renderer_renderer::{FrameScheduler, SchedulerConfig, TickOutcome};
use renderer_resources::{Material, MeshData, NodeUbo};
use renderer_rhi::{Backend, BindingLayout, Extent2D, HeadlessBackend, ShaderCode};
use renderer_scene::{Camera, CameraView, Light, Model, ModelId, NodeRef, Object, SceneBuilder};

fn shader() -> ShaderCode {
    ShaderCode::from_bytes(&0x0723_0203u32.to_le_bytes()).unwrap()
}

fn config(frames: usize) -> SchedulerConfig {
    SchedulerConfig::new(shader(), shader()).with_frames_in_flight(frames)
}

fn quad_scene() -> (SceneBuilder, ModelId) {
    let mut builder = SceneBuilder::new();
    let id = builder.add_model(Model::new("board").with_object(Object::with_material(
        "quad",
        MeshData::quad(1.0),
        Material::solid("red", Vec3::X),
    )));
    builder.add_light(Light::ambient(Vec3::ONE)).unwrap();
    builder.set_camera(Camera::fixed(CameraView::at(Vec3::new(0.0, 0.0, 3.0))));
    (builder, id)
}

fn scheduler(backend: &Arc<HeadlessBackend>, frames: usize) -> (FrameScheduler<HeadlessBackend>, ModelId) {
    let (builder, id) = quad_scene();
    let scheduler =
        FrameScheduler::new(Arc::clone(backend), builder, config(frames), backend.window_extent())
            .unwrap();
    (scheduler, id)
}

fn slot_ubo(backend: &HeadlessBackend, scheduler: &FrameScheduler<HeadlessBackend>, id: ModelId, slot: usize) -> NodeUbo {
    let buffer = scheduler.scene().model_buffer(id, slot).unwrap();
    bytemuck::pod_read_unaligned(&backend.buffer_contents(buffer).unwrap())
}

#[test]
fn test_quad_scenario() {
    let backend = Arc::new(HeadlessBackend::new());
    let (mut scheduler, _) = scheduler(&backend, 2);

    for _ in 0..3 {
        assert!(matches!(
            scheduler.tick().unwrap(),
            TickOutcome::Presented { .. }
        ));
    }

    let stats = backend.stats();
    assert_eq!(stats.unsubmitted_fence_waits, 0);
    assert_eq!(stats.writes_while_in_flight, 0);
    assert_eq!(stats.submissions, 3);
    assert_eq!(backend.binding_sets_created(BindingLayout::Texture), 1);

    let image = scheduler.scene().textures()[0].image().unwrap();
    assert_eq!(backend.image_pixels(image).unwrap(), vec![255, 0, 0, 255]);
}

#[test]
fn test_frames_in_flight_bounded_under_random_retirement() {
    for frames in 1..=4 {
        let mut rng = StdRng::seed_from_u64(0x5eed + frames as u64);
        let backend = Arc::new(HeadlessBackend::new());
        let (mut scheduler, id) = scheduler(&backend, frames);
        let sender = scheduler.take_sender().unwrap();

        for _ in 0..200 {
            for _ in 0..rng.gen_range(0..=2) {
                backend.retire_oldest();
            }
            if rng.gen_bool(0.2) {
                sender
                    .rotate(NodeRef::Model(id), Vec3::new(0.0, rng.gen_range(-0.1..0.1), 0.0))
                    .unwrap();
            }
            scheduler.tick().unwrap();
            assert!(backend.in_flight() <= frames);
        }

        let stats = backend.stats();
        assert!(stats.max_in_flight <= frames, "N={}: {:?}", frames, stats);
        assert_eq!(stats.context_reuse_violations, 0, "N={}", frames);
        assert_eq!(stats.unsubmitted_fence_waits, 0, "N={}", frames);
        assert_eq!(stats.pending_fence_resets, 0, "N={}", frames);
        assert_eq!(stats.destroyed_while_in_flight, 0, "N={}", frames);
        assert_eq!(stats.writes_while_in_flight, 0, "N={}", frames);
        assert_eq!(stats.semaphore_resignals, 0, "N={}", frames);
        assert_eq!(stats.unsignaled_semaphore_waits, 0, "N={}", frames);
    }
}

#[test]
fn test_writing_a_pending_slot_is_detected() {
    let backend = Arc::new(HeadlessBackend::new());
    let (mut scheduler, id) = scheduler(&backend, 2);
    scheduler.tick().unwrap();
    assert_eq!(backend.in_flight(), 1);

    // Slot 0 is still on the GPU; slot 1 is free.
    let free = scheduler.scene().model_buffer(id, 1).unwrap();
    backend.write_buffer(free, 0, &[0xAB; 16]).unwrap();
    assert_eq!(backend.stats().writes_while_in_flight, 0);

    let pending = scheduler.scene().model_buffer(id, 0).unwrap();
    backend.write_buffer(pending, 0, &[0xAB; 16]).unwrap();
    assert_eq!(backend.stats().writes_while_in_flight, 1);
}

#[test]
fn test_failed_record_leaves_sync_objects_usable() {
    let backend = Arc::new(HeadlessBackend::new());
    let (mut scheduler, _) = scheduler(&backend, 2);
    assert!(matches!(
        scheduler.tick().unwrap(),
        TickOutcome::Presented { slot: 0, .. }
    ));

    backend.fail_next_record();
    assert!(scheduler.tick().is_err());
    let stuck = scheduler.ring().current();
    assert_eq!(stuck.index(), 1);
    assert!(!stuck.is_submitted());
    assert!(!backend.is_semaphore_signaled(stuck.image_available()));

    for expected_slot in [1, 0, 1] {
        assert!(matches!(
            scheduler.tick().unwrap(),
            TickOutcome::Presented { slot, .. } if slot == expected_slot
        ));
    }
    assert_eq!(scheduler.surface().generation(), 2);

    let stats = backend.stats();
    assert_eq!(stats.semaphore_resignals, 0);
    assert_eq!(stats.unsignaled_semaphore_waits, 0);
    assert_eq!(stats.unsubmitted_fence_waits, 0);
    assert_eq!(stats.context_reuse_violations, 0);
    assert_eq!(stats.submissions, 4);

    let images = scheduler.surface().info().unwrap().image_count as usize;
    assert_eq!(backend.live_counts().semaphores, 2 + images);
}

#[test]
fn test_dirty_transforms_converge_after_n_ticks() {
    let frames = 3;
    let backend = Arc::new(HeadlessBackend::new());
    let (mut scheduler, id) = scheduler(&backend, frames);
    let sender = scheduler.take_sender().unwrap();
    scheduler.tick().unwrap();
    assert!(!scheduler.scene().model(id).unwrap().transform().is_dirty());

    sender
        .rotate_about(NodeRef::Model(id), Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0), Vec3::ZERO)
        .unwrap();
    sender
        .translate(NodeRef::object(id, "quad"), Vec3::new(1.0, 0.0, 0.0))
        .unwrap();

    scheduler.tick().unwrap();
    let model = scheduler.scene().model(id).unwrap();
    assert!(model.transform().is_dirty());
    assert!(model.object("quad").unwrap().transform().is_dirty());

    for _ in 1..frames {
        scheduler.tick().unwrap();
    }
    let model = scheduler.scene().model(id).unwrap();
    assert!(!model.transform().is_dirty());
    assert!(!model.object("quad").unwrap().transform().is_dirty());

    let expected = model.transform().ubo();
    for slot in 0..frames {
        assert_eq!(slot_ubo(&backend, &scheduler, id, slot), expected);
    }
    let object_expected = model.object("quad").unwrap().transform().ubo();
    let buffer = scheduler.scene().object_buffer(id, "quad", 0).unwrap();
    let object_ubo: NodeUbo = bytemuck::pod_read_unaligned(&backend.buffer_contents(buffer).unwrap());
    assert_eq!(object_ubo, object_expected);
}

#[test]
fn test_rotation_scenario() {
    let backend = Arc::new(HeadlessBackend::new());
    let (mut scheduler, id) = scheduler(&backend, 2);
    let sender = scheduler.take_sender().unwrap();
    scheduler.tick().unwrap();

    sender
        .rotate_about(NodeRef::Model(id), Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0), Vec3::ZERO)
        .unwrap();
    scheduler.tick().unwrap();
    assert!(scheduler.scene().model(id).unwrap().transform().is_dirty());
    scheduler.tick().unwrap();

    let transform = scheduler.scene().model(id).unwrap().transform();
    assert!(!transform.is_dirty());
    let p = transform.matrix().transform_point3(Vec3::X);
    assert!((p - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
}

#[test]
fn test_unknown_node_delta_is_dropped() {
    let backend = Arc::new(HeadlessBackend::new());
    let (mut scheduler, id) = scheduler(&backend, 2);
    let sender = scheduler.take_sender().unwrap();

    sender.translate(NodeRef::Model(ModelId(7)), Vec3::X).unwrap();
    sender.translate(NodeRef::object(id, "missing"), Vec3::X).unwrap();
    assert!(matches!(
        scheduler.tick().unwrap(),
        TickOutcome::Presented { .. }
    ));
    assert_eq!(scheduler.scene().model(id).unwrap().transform().version(), 0);
}

#[test]
fn test_resize_rebuilds_atomically() {
    let backend = Arc::new(HeadlessBackend::new());
    let (mut scheduler, _) = scheduler(&backend, 2);
    scheduler.tick().unwrap();
    scheduler.tick().unwrap();

    let surface = scheduler.surface();
    let old_swapchain = surface.swapchain().unwrap();
    let old_pipeline = surface.pipeline().unwrap();
    let old_depth = surface.depth().unwrap();
    let generation = surface.generation();

    let mut seen_swapchains = HashSet::from([old_swapchain]);
    for (w, h) in [(800, 600), (1024, 768), (640, 480)] {
        backend.set_window_extent(Extent2D::new(w, h));
        scheduler.resize(w, h);
        // The pending resize is noticed at acquire or right after present.
        let mut outcome = scheduler.tick().unwrap();
        while !matches!(outcome, TickOutcome::Presented { .. })
            || scheduler.surface().extent() != Extent2D::new(w, h)
        {
            outcome = scheduler.tick().unwrap();
        }

        let surface = scheduler.surface();
        assert_eq!(surface.extent(), Extent2D::new(w, h));
        let swapchain = surface.swapchain().unwrap();
        assert!(seen_swapchains.insert(swapchain), "handle {} reused", swapchain);
        assert_eq!(
            backend.swapchain_info(swapchain).unwrap().extent,
            Extent2D::new(w, h)
        );
        let depth = surface.depth().unwrap();
        assert_eq!(backend.image_desc(depth).unwrap().extent, Extent2D::new(w, h));
    }

    assert!(!backend.is_swapchain_live(old_swapchain));
    assert!(!backend.is_pipeline_live(old_pipeline));
    assert!(!backend.is_image_live(old_depth));
    assert_ne!(scheduler.surface().pipeline(), Some(old_pipeline));
    assert_ne!(scheduler.surface().depth(), Some(old_depth));
    assert_eq!(scheduler.surface().generation(), generation + 3);
    assert_eq!(backend.stats().destroyed_while_in_flight, 0);
    assert_eq!(backend.stats().context_reuse_violations, 0);
}

#[test]
fn test_suboptimal_present_rebuilds_after_presenting() {
    let backend = Arc::new(HeadlessBackend::new());
    let (mut scheduler, _) = scheduler(&backend, 2);
    backend.force_suboptimal_present();

    assert!(matches!(
        scheduler.tick().unwrap(),
        TickOutcome::Presented { .. }
    ));
    assert_eq!(scheduler.stats().rebuilds, 1);
    assert_eq!(scheduler.surface().generation(), 2);
}

#[test]
fn test_minimized_window_suspends_until_restored() {
    let backend = Arc::new(HeadlessBackend::new());
    let (mut scheduler, _) = scheduler(&backend, 2);
    scheduler.tick().unwrap();
    let presents = backend.stats().presents;

    backend.set_window_extent(Extent2D::new(0, 0));
    scheduler.resize(0, 0);
    for _ in 0..3 {
        assert_eq!(scheduler.tick().unwrap(), TickOutcome::Suspended);
    }
    assert_eq!(backend.stats().presents, presents);

    backend.set_window_extent(Extent2D::new(400, 300));
    scheduler.resize(400, 300);
    let mut presented = false;
    for _ in 0..3 {
        if let TickOutcome::Presented { .. } = scheduler.tick().unwrap() {
            presented = true;
            break;
        }
    }
    assert!(presented);
    assert_eq!(scheduler.surface().extent(), Extent2D::new(400, 300));
}

#[test]
fn test_drop_releases_every_gpu_object() {
    let backend = Arc::new(HeadlessBackend::new());
    {
        let (mut scheduler, _) = scheduler(&backend, 3);
        for _ in 0..5 {
            scheduler.tick().unwrap();
        }
    }
    let live = backend.live_counts();
    assert_eq!(live.buffers, 0);
    assert_eq!(live.images, 0);
    assert_eq!(live.samplers, 0);
    assert_eq!(live.binding_sets, 0);
    assert_eq!(live.fences, 0);
    assert_eq!(live.semaphores, 0);
    assert_eq!(live.contexts, 0);
    assert_eq!(live.swapchains, 0);
    assert_eq!(live.pipelines, 0);
    assert_eq!(backend.stats().destroyed_while_in_flight, 0);
}
