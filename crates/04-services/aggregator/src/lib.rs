//! The aggregator: a single-threaded consumer folding cascade outputs into
//! event-level verdicts.
//!
//! [`run_aggregator`] owns the accumulator and the ring's aggregation
//! cursor; verdict delivery is handed off to [`dispatch::spawn_senders`] so
//! notification I/O latency never stalls the fold loop.

pub mod accumulator;
pub mod dispatch;
pub mod event_sink;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::Sender;
use ring::FrameRing;
use sender::{Diagnostics, MessageSender};

pub use accumulator::{AggregatorConfig, FrameJudgement, Verdict};
pub use dispatch::VerdictJob;
pub use event_sink::EventSink;

use accumulator::Accumulator;

/// Polling back-off when the ring hasn't reached `min_aggregation_frames_threshold`.
pub const STARTUP_BACKOFF: Duration = Duration::from_millis(250);

/// Runs the aggregator loop until `stop` is set.
///
/// `clean_queue` is checked once per fold and, when set, clears the
/// accumulator, but never touches the ring beyond slots already released.
#[allow(clippy::too_many_arguments)]
pub fn run_aggregator(
    ring: Arc<FrameRing>,
    config: AggregatorConfig,
    message_sender: Arc<dyn MessageSender>,
    verdict_tx: Sender<VerdictJob>,
    event_sink: Arc<dyn EventSink>,
    stop: Arc<AtomicBool>,
    clean_queue: Arc<AtomicBool>,
) {
    let mut accumulator = Accumulator::new(config);

    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }

        let counts = ring.snapshot_counts();
        if counts.aggregation < config.min_aggregation_frames_threshold {
            thread::sleep(STARTUP_BACKOFF);
            continue;
        }

        let Some(id) = ring.claim_for_aggregation() else {
            thread::sleep(STARTUP_BACKOFF);
            continue;
        };

        let capture = ring.capture(id).clone();
        let outcome = ring.outcome(id).clone();
        ring.release(id);

        message_sender.set_live_image(capture.image.clone());
        message_sender.set_last_cascade_image(outcome.result.output_image.clone());
        message_sender.set_diagnostics(Diagnostics {
            queue_length: ring.snapshot_counts().aggregation,
            overhead_seconds: outcome.overhead.as_secs_f64(),
        });

        let judgement = FrameJudgement {
            cat_present: outcome.result.cat_present,
            face_present: outcome.result.face_present,
            prey_score: outcome.result.prey_score(),
            image: capture.image.clone(),
        };
        let fold_outcome = accumulator.fold(judgement);

        if let Some(verdict) = fold_outcome.verdict {
            event_sink.record(Utc::now(), &verdict, fold_outcome.event_frames.len());
            let live_frame = matches!(verdict, Verdict::CatIncoming).then(|| capture.image.clone());
            let job = VerdictJob {
                verdict,
                frames: fold_outcome.event_frames,
                live_frame,
            };
            verdict_tx
                .send(job)
                .expect("verdict channel is unbounded and outlives every sender worker");
        }

        if clean_queue.swap(false, Ordering::Relaxed) {
            accumulator.reset();
        }
    }
}
