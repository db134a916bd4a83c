//! Cascade worker pool: `max_frame_processor_threads` workers draining
//! `WaitingCascade` slots.
//!
//! Each worker loops `claim_for_cascade -> run cascade -> publish_cascade`,
//! backing off when the ring offers no work. A cascade panic is treated the
//! same as the original's Python exception path: persist the offending
//! frame for postmortem, log, and `clear_all()` the ring rather than try to
//! recover the one slot — a single bad frame should not wedge the pipeline,
//! but a corrupted cascade state should not silently keep running either.

use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use cascade::Cascade;
use chrono::Utc;
use ring::FrameRing;
use tracing::{error, info, warn};

const WARMUP_IMAGE_BYTES: &[u8] =
    include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../../assets/warmup_frame.jpg"));

/// Back-off between empty `claim_for_cascade` polls.
pub const WORKER_BACKOFF: Duration = Duration::from_millis(250);

/// Runs the cascade once against a bundled frame to amortize model
/// initialization before the pool admits live frames. Falls back to a
/// synthetic in-memory frame if the bundled JPEG can't be decoded, since the
/// point is to pay the first-call cost, not to validate the asset.
pub fn warm_up(cascade: &dyn Cascade) {
    let frame = image::load_from_memory(WARMUP_IMAGE_BYTES)
        .map(|dynamic| dynamic.to_rgb8())
        .unwrap_or_else(|_| image::RgbImage::from_pixel(64, 64, image::Rgb([30, 30, 30])));
    let start = Instant::now();
    let _ = cascade.run(&frame);
    info!(target: "balrog::cascade", elapsed_ms = start.elapsed().as_millis() as u64, "cascade warm-up complete");
}

/// Spawns the pool's worker threads. Callers should call [`warm_up`] once
/// before this so the first live frame doesn't pay initialization cost.
pub fn spawn_pool(
    cascade: Arc<dyn Cascade>,
    ring: Arc<FrameRing>,
    num_workers: usize,
    debug_frame_dir: Option<PathBuf>,
    timestamp_format: String,
    stop: Arc<AtomicBool>,
) -> Vec<JoinHandle<()>> {
    (0..num_workers)
        .map(|worker_id| {
            let cascade = Arc::clone(&cascade);
            let ring = Arc::clone(&ring);
            let debug_frame_dir = debug_frame_dir.clone();
            let timestamp_format = timestamp_format.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                worker_loop(
                    worker_id,
                    &*cascade,
                    &ring,
                    debug_frame_dir.as_deref(),
                    &timestamp_format,
                    &stop,
                )
            })
        })
        .collect()
}

fn worker_loop(
    worker_id: usize,
    cascade: &dyn Cascade,
    ring: &FrameRing,
    debug_frame_dir: Option<&Path>,
    timestamp_format: &str,
    stop: &AtomicBool,
) {
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let Some(id) = ring.claim_for_cascade() else {
            thread::sleep(WORKER_BACKOFF);
            continue;
        };

        let capture_timestamp = ring.capture(id).captured_at;
        let frame = ring.capture(id).image.clone();

        let run_start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| cascade.run(&frame)));

        match outcome {
            Ok(result) => {
                let runtime = run_start.elapsed();
                let overhead = Utc::now()
                    .signed_duration_since(capture_timestamp)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                ring.publish_cascade(id, result, runtime, overhead);
            }
            Err(panic_payload) => {
                let reason = panic_message(&panic_payload);
                error!(target: "balrog::cascade", worker_id, %reason, "cascade panicked, clearing ring");
                if let Some(dir) = debug_frame_dir {
                    persist_offending_frame(dir, &frame, capture_timestamp, timestamp_format);
                }
                ring.clear_all();
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

fn persist_offending_frame(
    dir: &Path,
    frame: &image::RgbImage,
    captured_at: chrono::DateTime<Utc>,
    timestamp_format: &str,
) {
    if let Err(err) = std::fs::create_dir_all(dir) {
        warn!(target: "balrog::cascade", %err, "failed to create debug frame directory");
        return;
    }
    let filename = format!("{}.jpg", captured_at.format(timestamp_format));
    let path = dir.join(filename);
    if let Err(err) = frame.save(&path) {
        warn!(target: "balrog::cascade", %err, path = %path.display(), "failed to persist offending frame");
    }
}
