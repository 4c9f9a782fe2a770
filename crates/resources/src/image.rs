//! Still-image decoding to tightly packed RGBA8.

use std::path::Path;

use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Decoded pixels, row-major, four bytes per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbaImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl RgbaImage {
    /// A `width`×`height` image filled with one color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let pixels = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Pixels reordered to BGR, three bytes per pixel.
    pub fn to_bgr(&self) -> Vec<u8> {
        self.pixels
            .chunks_exact(4)
            .flat_map(|p| [p[2], p[1], p[0]])
            .collect()
    }
}

/// Decode the file at `path` into RGBA8.
///
/// # Errors
///
/// - [`ResourceError::FileNotFound`] when nothing exists at `path`
/// - [`ResourceError::Image`] when the file cannot be decoded
pub fn load_rgba(path: impl AsRef<Path>) -> ResourceResult<RgbaImage> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ResourceError::FileNotFound(path.to_path_buf()));
    }
    let decoded = image::open(path)?.into_rgba8();
    let (width, height) = decoded.dimensions();
    debug!("Decoded {} ({}x{})", path.display(), width, height);
    Ok(RgbaImage {
        width,
        height,
        pixels: decoded.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_file_not_found() {
        let err = load_rgba("does/not/exist.png").unwrap_err();
        assert!(matches!(err, ResourceError::FileNotFound(_)));
    }

    #[test]
    fn test_load_png_roundtrips_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let mut img = image::RgbaImage::new(2, 1);
        img.put_pixel(0, 0, image::Rgba([10, 20, 30, 255]));
        img.put_pixel(1, 0, image::Rgba([40, 50, 60, 255]));
        img.save(&path).unwrap();

        let loaded = load_rgba(&path).unwrap();
        assert_eq!((loaded.width, loaded.height), (2, 1));
        assert_eq!(loaded.pixels, vec![10, 20, 30, 255, 40, 50, 60, 255]);
        assert_eq!(loaded.to_bgr(), vec![30, 20, 10, 60, 50, 40]);
    }

    #[test]
    fn test_garbage_file_is_image_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        assert!(matches!(load_rgba(&path), Err(ResourceError::Image(_))));
    }

    #[test]
    fn test_solid_fills_every_pixel() {
        let img = RgbaImage::solid(2, 2, [1, 2, 3, 4]);
        assert_eq!(img.pixels.len(), 16);
        assert!(img.pixels.chunks_exact(4).all(|p| p == [1, 2, 3, 4]));
    }
}
