//! Camera producer: the thread that turns a video source into ring claims.
//!
//! `CameraSource` is the seam the cat-flap camera attaches to — narrow on
//! purpose, mirroring `original_source/camera_class.py`'s `cv2.VideoCapture`
//! usage (`open`/`read`/`release`) without carrying any of OpenCV's surface
//! into the pipeline's own types. [`run_producer`] is the thread body: claim
//! a frame slot, read a frame, write it, publish it, sleep for the
//! configured frame interval, repeat until the stop signal fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use image::RgbImage;
use ring::FrameRing;
use thiserror::Error;
use tracing::{debug, info, warn};

mod debug_source;
#[cfg(feature = "live-camera")]
mod live;

pub use debug_source::DebugCameraSource;
#[cfg(feature = "live-camera")]
pub use live::LiveCameraSource;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to open camera stream: {0}")]
    Open(String),
    #[error("failed to read a frame: {0}")]
    Read(String),
}

/// A camera feed: open once, read frames repeatedly, close on teardown.
pub trait CameraSource: Send {
    fn open(&mut self) -> Result<(), CameraError>;
    fn read_frame(&mut self) -> Result<RgbImage, CameraError>;
    fn close(&mut self);
}

/// Runs the camera producer loop until `stop` is set.
///
/// Reopens the source every `cleanup_frames_threshold` frames (the direct
/// translation of `original_source/camera_class.py`'s periodic
/// `camera.release()` + reopen, there worked around CPython refcounting
/// pressure on `cv2` buffers; here it is kept only because long-lived
/// hardware/RTSP sources can wedge and a periodic reopen is cheap insurance
/// against that, not because Rust needs it for memory reasons).
pub fn run_producer(
    mut source: Box<dyn CameraSource>,
    ring: Arc<FrameRing>,
    frame_interval: Duration,
    cleanup_frames_threshold: u32,
    stop: Arc<AtomicBool>,
) {
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        if let Err(err) = source.open() {
            warn!(target: "balrog::camera", %err, "failed to open camera stream, retrying");
            thread::sleep(Duration::from_secs(1));
            continue;
        }

        let mut frames_since_reopen = 0u32;
        loop {
            if stop.load(Ordering::Relaxed) {
                source.close();
                return;
            }

            match source.read_frame() {
                Ok(frame) => {
                    if let Some(id) = ring.claim_for_frame() {
                        ring.write_capture(id, frame, Utc::now());
                        ring.publish_frame(id);
                    } else {
                        debug!(target: "balrog::camera", "ring saturated, dropping frame");
                    }
                }
                Err(err) => {
                    warn!(target: "balrog::camera", %err, "frame read failed");
                }
            }

            frames_since_reopen += 1;
            if frames_since_reopen >= cleanup_frames_threshold {
                info!(target: "balrog::camera", "reached cleanup threshold, reopening stream");
                break;
            }
            thread::sleep(frame_interval);
        }
        source.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingSource {
        opens: Arc<AtomicU32>,
        frames_served: u32,
        frame: RgbImage,
    }

    impl CameraSource for CountingSource {
        fn open(&mut self) -> Result<(), CameraError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn read_frame(&mut self) -> Result<RgbImage, CameraError> {
            self.frames_served += 1;
            Ok(self.frame.clone())
        }

        fn close(&mut self) {}
    }

    #[test]
    fn producer_publishes_frames_until_stopped() {
        let ring = Arc::new(FrameRing::new(4));
        let stop = Arc::new(AtomicBool::new(false));
        let opens = Arc::new(AtomicU32::new(0));
        let source = Box::new(CountingSource {
            opens: Arc::clone(&opens),
            frames_served: 0,
            frame: RgbImage::new(2, 2),
        });

        let ring_for_thread = Arc::clone(&ring);
        let stop_for_thread = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            run_producer(
                source,
                ring_for_thread,
                Duration::from_millis(1),
                1000,
                stop_for_thread,
            );
        });

        thread::sleep(Duration::from_millis(30));
        stop.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        assert!(opens.load(Ordering::SeqCst) >= 1);
        let counts = ring.snapshot_counts();
        assert!(counts.cascade > 0, "at least one frame should have been published");
    }

    #[test]
    fn producer_reopens_after_cleanup_threshold() {
        let ring = Arc::new(FrameRing::new(4));
        let stop = Arc::new(AtomicBool::new(false));
        let opens_counter = Arc::new(AtomicU32::new(0));
        let source = Box::new(CountingSource {
            opens: Arc::clone(&opens_counter),
            frames_served: 0,
            frame: RgbImage::new(1, 1),
        });

        let ring_for_thread = Arc::clone(&ring);
        let stop_for_thread = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            run_producer(source, ring_for_thread, Duration::from_millis(1), 3, stop_for_thread);
        });

        thread::sleep(Duration::from_millis(50));
        stop.store(true, Ordering::SeqCst);
        handle.join().unwrap();

        assert!(opens_counter.load(Ordering::SeqCst) >= 2, "should have reopened at least once");
    }
}
