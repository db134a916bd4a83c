use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::{CameraError, CameraSource};

/// Replays a fixed on-disk image at the configured cadence.
///
/// Selected via `BALROG_USE_NULL_CAMERA`, so the pipeline runs end to end
/// (and in tests) without a live stream.
pub struct DebugCameraSource {
    path: PathBuf,
    frame: Option<RgbImage>,
}

impl DebugCameraSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame: None,
        }
    }

    /// Builds a source around an already-decoded frame, skipping disk I/O —
    /// used by tests and by `open`'s decode-failure fallback.
    pub fn from_image(frame: RgbImage) -> Self {
        Self {
            path: PathBuf::new(),
            frame: Some(frame),
        }
    }

    fn synthetic_frame() -> RgbImage {
        RgbImage::from_pixel(320, 240, image::Rgb([60, 90, 60]))
    }
}

impl CameraSource for DebugCameraSource {
    fn open(&mut self) -> Result<(), CameraError> {
        if self.frame.is_some() {
            return Ok(());
        }
        self.frame = Some(load_or_synthetic(&self.path));
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RgbImage, CameraError> {
        Ok(self
            .frame
            .clone()
            .unwrap_or_else(Self::synthetic_frame))
    }

    fn close(&mut self) {}
}

fn load_or_synthetic(path: &Path) -> RgbImage {
    match std::fs::read(path) {
        Ok(bytes) => match image::load_from_memory(&bytes) {
            Ok(dynamic) => dynamic.to_rgb8(),
            Err(_) => DebugCameraSource::synthetic_frame(),
        },
        Err(_) => DebugCameraSource::synthetic_frame(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;

    #[test]
    fn falls_back_to_a_synthetic_frame_when_no_file_is_present() {
        let mut source = DebugCameraSource::new("/nonexistent/path/warmup.jpg");
        source.open().unwrap();
        let frame = source.read_frame().unwrap();
        assert_eq!(frame.dimensions(), (320, 240));
    }

    #[test]
    fn from_image_replays_the_given_frame() {
        let original = RgbImage::from_pixel(4, 4, image::Rgb([1, 2, 3]));
        let mut source = DebugCameraSource::from_image(original.clone());
        source.open().unwrap();
        assert_eq!(source.read_frame().unwrap(), original);
    }

    #[test]
    fn read_frame_is_repeatable() {
        let mut source = DebugCameraSource::from_image(RgbImage::from_pixel(2, 2, image::Rgb([9, 9, 9])));
        source.open().unwrap();
        let a = source.read_frame().unwrap();
        let b = source.read_frame().unwrap();
        assert_eq!(a, b);
    }
}
