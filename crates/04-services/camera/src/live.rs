use image::RgbImage;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio;

use crate::{CameraError, CameraSource};

/// Opens `CAMERA_STREAM_URI` via OpenCV's `VideoCapture`, the direct
/// translation of `original_source/camera_class.py`'s `cv2.VideoCapture`
/// usage, decoding each frame into an [`image::RgbImage`].
pub struct LiveCameraSource {
    stream_uri: String,
    capture: Option<videoio::VideoCapture>,
}

impl LiveCameraSource {
    pub fn new(stream_uri: impl Into<String>) -> Self {
        Self {
            stream_uri: stream_uri.into(),
            capture: None,
        }
    }
}

impl CameraSource for LiveCameraSource {
    fn open(&mut self) -> Result<(), CameraError> {
        let capture =
            videoio::VideoCapture::from_file(&self.stream_uri, videoio::CAP_ANY)
                .map_err(|e| CameraError::Open(e.to_string()))?;
        let opened = capture.is_opened().map_err(|e| CameraError::Open(e.to_string()))?;
        if !opened {
            return Err(CameraError::Open(format!(
                "VideoCapture::from_file did not open {}",
                self.stream_uri
            )));
        }
        self.capture = Some(capture);
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RgbImage, CameraError> {
        let capture = self
            .capture
            .as_mut()
            .ok_or_else(|| CameraError::Read("camera not open".to_owned()))?;
        let mut frame = Mat::default();
        capture
            .read(&mut frame)
            .map_err(|e| CameraError::Read(e.to_string()))?;
        if frame.empty() {
            return Err(CameraError::Read("empty frame".to_owned()));
        }
        mat_to_rgb_image(&frame)
    }

    fn close(&mut self) {
        self.capture = None;
    }
}

/// Converts an OpenCV BGR `Mat` into an owned `image::RgbImage`.
fn mat_to_rgb_image(mat: &Mat) -> Result<RgbImage, CameraError> {
    let width = mat.cols();
    let height = mat.rows();
    if width <= 0 || height <= 0 {
        return Err(CameraError::Read("frame has non-positive dimensions".to_owned()));
    }
    let data = mat.data_bytes().map_err(|e| CameraError::Read(e.to_string()))?;
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in data.chunks_exact(3) {
        // OpenCV decodes in BGR order.
        rgb.push(chunk[2]);
        rgb.push(chunk[1]);
        rgb.push(chunk[0]);
    }
    RgbImage::from_raw(width as u32, height as u32, rgb)
        .ok_or_else(|| CameraError::Read("pixel buffer size mismatch".to_owned()))
}
