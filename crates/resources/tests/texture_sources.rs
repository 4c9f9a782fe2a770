//! Integration tests for textures built from materials and video decoders.

use std::sync::Arc;
use std::time::Duration;

use glam::Vec3;
use renderer_resources::{
    FrameSequenceDecoder, Material, MemoryDecoder, PLACEHOLDER_COLOR, ResourceError, Texture,
    TextureSource, TextureState,
};
use renderer_rhi::{BindingLayout, HeadlessBackend};

#[test]
fn test_material_textures_share_nothing() {
    let backend = Arc::new(HeadlessBackend::new());
    let materials = [
        Material::solid("red", Vec3::new(1.0, 0.0, 0.0)),
        Material::solid("green", Vec3::new(0.0, 1.0, 0.0)),
        Material::textured("lost", "missing/diffuse.png"),
    ];

    let mut textures: Vec<Texture<HeadlessBackend>> = materials
        .iter()
        .map(|m| Texture::new(m.name.clone(), m.texture_source()))
        .collect();
    for texture in &mut textures {
        texture.load(&backend).expect("Texture should load");
    }

    assert_eq!(backend.binding_sets_created(BindingLayout::Texture), 3);
    let pixels: Vec<Vec<u8>> = textures
        .iter()
        .map(|t| backend.image_pixels(t.image().unwrap()).unwrap())
        .collect();
    assert_eq!(pixels[0], vec![255, 0, 0, 255]);
    assert_eq!(pixels[1], vec![0, 255, 0, 255]);
    assert_eq!(pixels[2], PLACEHOLDER_COLOR.to_vec());

    let sets: Vec<_> = textures.iter().map(|t| t.binding_set().unwrap()).collect();
    assert_ne!(sets[0], sets[1]);
    assert_ne!(sets[1], sets[2]);
}

#[test]
fn test_frame_directory_plays_through_texture() {
    let dir = tempfile::tempdir().unwrap();
    for (i, rgb) in [[10u8, 20, 30], [40, 50, 60]].iter().enumerate() {
        image::RgbImage::from_pixel(3, 2, image::Rgb(*rgb))
            .save(dir.path().join(format!("{:02}.png", i)))
            .unwrap();
    }

    let backend = Arc::new(HeadlessBackend::new());
    let decoder = FrameSequenceDecoder::new(dir.path(), 50.0);
    let mut texture = Texture::new("frames", TextureSource::Video(Box::new(decoder)));
    texture.load(&backend).unwrap();
    assert!(texture.is_video());

    let image = texture.image().unwrap();
    assert_eq!(&backend.image_pixels(image).unwrap()[..4], &[10, 20, 30, 255]);

    let mut source = texture.take_video_source().unwrap();
    let interval = source.info().frame_interval();
    assert!(interval.abs_diff(Duration::from_millis(20)) < Duration::from_micros(1));

    // Second frame, then wrap around to the first.
    let mut now = source.next_due();
    assert!(source.produce_next_frame_at(now).unwrap());
    assert!(texture.publish_frame().unwrap());
    assert_eq!(&backend.image_pixels(image).unwrap()[..4], &[40, 50, 60, 255]);

    now += source.info().frame_interval();
    assert!(source.produce_next_frame_at(now).unwrap());
    assert!(texture.publish_frame().unwrap());
    assert_eq!(&backend.image_pixels(image).unwrap()[..4], &[10, 20, 30, 255]);
    assert_eq!(source.restarts(), 1);
}

#[test]
fn test_producer_on_another_thread() {
    let backend = Arc::new(HeadlessBackend::new());
    let decoder = MemoryDecoder::solid_frames("threaded", 2, 2, 500.0, &[[0, 0, 0], [255, 255, 255]]);
    let mut texture = Texture::new("threaded", TextureSource::Video(Box::new(decoder)));
    texture.load(&backend).unwrap();
    let source = texture.take_video_source().unwrap();
    let shared = source.shared().clone();

    let handle = std::thread::spawn(move || {
        let mut source = source;
        let mut produced = 0;
        while produced < 5 {
            std::thread::sleep(source.next_due().saturating_duration_since(std::time::Instant::now()));
            if source.produce_next_frame().unwrap() {
                produced += 1;
            }
        }
        source
    });
    let source = handle.join().unwrap();

    assert_eq!(shared.sequence(), 6);
    assert!(texture.publish_frame().unwrap());
    assert!(!texture.publish_frame().unwrap());
    assert!(source.restarts() >= 2);
    assert_eq!(texture.state(), TextureState::Ready);
}

#[test]
fn test_empty_directory_is_empty_stream() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(HeadlessBackend::new());
    let decoder = FrameSequenceDecoder::new(dir.path(), 30.0);
    let mut texture = Texture::new("nothing", TextureSource::Video(Box::new(decoder)));
    assert!(matches!(
        texture.load(&backend),
        Err(ResourceError::EmptyStream(_))
    ));
    assert_eq!(texture.state(), TextureState::Unloaded);
}
