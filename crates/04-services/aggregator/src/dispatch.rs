use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use image::RgbImage;
use sender::MessageSender;

use crate::accumulator::{pick_attachment, EventFrame, Verdict};

/// One verdict queued for notification delivery.
pub struct VerdictJob {
    pub verdict: Verdict,
    pub frames: Vec<EventFrame>,
    pub live_frame: Option<RgbImage>,
}

/// Spawns `max_message_sender_threads` workers draining `receiver` and
/// calling `MessageSender::send_text`/`send_image`, so the aggregator's own
/// loop never blocks on notification I/O latency.
pub fn spawn_senders(
    message_sender: Arc<dyn MessageSender>,
    receiver: Receiver<VerdictJob>,
    num_workers: usize,
) -> Vec<JoinHandle<()>> {
    (0..num_workers)
        .map(|_| {
            let message_sender = Arc::clone(&message_sender);
            let receiver = receiver.clone();
            thread::spawn(move || {
                for job in receiver {
                    deliver(&*message_sender, job);
                }
            })
        })
        .collect()
}

fn deliver(message_sender: &dyn MessageSender, job: VerdictJob) {
    let VerdictJob {
        verdict,
        frames,
        live_frame,
    } = job;
    let caption = caption_for(&verdict);
    message_sender.send_text(&caption);

    match &verdict {
        Verdict::CatIncoming => {
            if let Some(frame) = live_frame {
                message_sender.send_image(&frame, &caption, false);
            }
        }
        _ => {
            if let Some(image) = pick_attachment(&verdict, &frames) {
                message_sender.send_image(image, &caption, false);
            }
        }
    }
}

fn caption_for(verdict: &Verdict) -> String {
    match verdict {
        Verdict::CatIncoming => "Cat incoming.".to_owned(),
        Verdict::Prey { avg } => format!("Prey detected (cumulative score {avg:.1})."),
        Verdict::NoPrey { avg } => format!("No prey (cumulative score {avg:.1})."),
        Verdict::DontKnow { avg } => format!("Don't know (cumulative score {avg:.1})."),
    }
}

/// Unbounded so a verdict enqueue never fails or drops a notification;
/// backpressure against a stalled sender pool is not this channel's job.
pub fn channel() -> (Sender<VerdictJob>, Receiver<VerdictJob>) {
    crossbeam_channel::unbounded()
}
