//! End-to-end smoke test: wires a `DebugCameraSource`, the bundled
//! `StubCascade`, and a `NullMessageSender` through the real ring, cascade
//! pool, and aggregator for a few ticks, confirming frames flow camera ->
//! ring -> cascade -> ring -> aggregator -> sender without deadlocking or
//! losing the whole stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use aggregator::{dispatch, event_sink, run_aggregator, AggregatorConfig};
use camera::{run_producer, DebugCameraSource};
use cascade::StubCascade;
use cascade_pool::{spawn_pool, warm_up};
use image::{Rgb, RgbImage};
use ring::FrameRing;
use sender::{MessageSender, NullMessageSender};

#[test]
fn frames_flow_end_to_end_through_the_real_pipeline() {
    let ring = Arc::new(FrameRing::new(4));
    let stop = Arc::new(AtomicBool::new(false));
    let clean_queue = Arc::new(AtomicBool::new(false));

    let camera_source = Box::new(DebugCameraSource::from_image(RgbImage::from_pixel(
        32,
        32,
        Rgb([220, 220, 220]),
    )));
    let camera_handle = {
        let ring = Arc::clone(&ring);
        let stop = Arc::clone(&stop);
        std::thread::spawn(move || {
            run_producer(camera_source, ring, Duration::from_millis(5), 1000, stop);
        })
    };

    let cascade = Arc::new(StubCascade::new());
    warm_up(&*cascade);
    let cascade_handles = spawn_pool(
        cascade,
        Arc::clone(&ring),
        2,
        None,
        "%Y%m%dT%H%M%S%.3f".to_owned(),
        Arc::clone(&stop),
    );

    let message_sender: Arc<dyn MessageSender> = Arc::new(NullMessageSender::new());
    let (verdict_tx, verdict_rx) = dispatch::channel();
    let sender_handles = dispatch::spawn_senders(Arc::clone(&message_sender), verdict_rx, 1);

    let aggregator_config = AggregatorConfig {
        min_aggregation_frames_threshold: 0,
        event_reset_threshold: 6,
        cat_counter_threshold: 6,
        cumulus_prey_threshold: 20.0,
        cumulus_no_prey_threshold: 40.0,
    };
    let aggregator_handle = {
        let ring = Arc::clone(&ring);
        let message_sender = Arc::clone(&message_sender);
        let stop = Arc::clone(&stop);
        let clean_queue = Arc::clone(&clean_queue);
        std::thread::spawn(move || {
            run_aggregator(
                ring,
                aggregator_config,
                message_sender,
                verdict_tx,
                Arc::new(event_sink::NoopEventSink),
                stop,
                clean_queue,
            );
        })
    };

    let deadline = Instant::now() + Duration::from_secs(3);
    while message_sender.live_image().is_none() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }

    stop.store(true, Ordering::SeqCst);
    camera_handle.join().unwrap();
    for h in cascade_handles {
        h.join().unwrap();
    }
    aggregator_handle.join().unwrap();
    for h in sender_handles {
        h.join().unwrap();
    }

    assert!(
        message_sender.live_image().is_some(),
        "aggregator should have drained at least one frame through the whole pipeline"
    );
}
