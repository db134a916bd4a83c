//! Outbound notification contract and its two implementations.
//!
//! `MessageSender` is a narrow interface over whatever chat backend delivers
//! operator notifications. Diagnostic state the aggregator writes and the
//! bot listener reads (live image, last cascade image, queue length,
//! overhead) is kept behind internal synchronization rather than exposed as
//! plain fields, so no caller needs a lock of its own: whole-image slots use
//! `arc_swap::ArcSwap` (a single atomic pointer swap), scalars use one
//! `parking_lot::Mutex`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use image::RgbImage;
use parking_lot::Mutex;
use thiserror::Error;

mod null;
mod telegram;

pub use null::NullMessageSender;
pub use telegram::TelegramMessageSender;

#[derive(Debug, Error)]
pub enum SenderError {
    #[error("telegram API request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("telegram API returned an error: {0}")]
    Api(String),
}

/// Scalar diagnostics written by the aggregator, read by operator commands.
#[derive(Clone, Copy, Debug, Default)]
pub struct Diagnostics {
    pub queue_length: usize,
    pub overhead_seconds: f64,
}

/// Contract for delivering operator notifications.
///
/// `send_image` drops silently while muted unless `force` is set, matching
/// the `/sendlivepic` and `/sendlastcascpic` commands' need to bypass a mute.
/// Delivery failures are logged by the implementation, never propagated —
/// a notification failure must not stall the pipeline.
pub trait MessageSender: Send + Sync {
    fn send_text(&self, text: &str);
    fn send_image(&self, image: &RgbImage, caption: &str, force: bool);

    fn set_live_image(&self, image: RgbImage);
    fn set_last_cascade_image(&self, image: RgbImage);
    fn set_diagnostics(&self, diagnostics: Diagnostics);

    fn live_image(&self) -> Option<Arc<RgbImage>>;
    fn last_cascade_image(&self) -> Option<Arc<RgbImage>>;
    fn diagnostics(&self) -> Diagnostics;

    /// Suppresses `send_image` (absent `force`) for `duration`.
    fn mute_for(&self, duration: Duration);
    fn is_muted(&self) -> bool;
}

/// Shared diagnostic state, common to every `MessageSender` implementation.
struct SharedState {
    live_image: ArcSwapOption<RgbImage>,
    last_cascade_image: ArcSwapOption<RgbImage>,
    diagnostics: Mutex<Diagnostics>,
    muted_until: Mutex<Option<Instant>>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            live_image: ArcSwapOption::from(None),
            last_cascade_image: ArcSwapOption::from(None),
            diagnostics: Mutex::new(Diagnostics::default()),
            muted_until: Mutex::new(None),
        }
    }

    fn set_live_image(&self, image: RgbImage) {
        self.live_image.store(Some(Arc::new(image)));
    }

    fn set_last_cascade_image(&self, image: RgbImage) {
        self.last_cascade_image.store(Some(Arc::new(image)));
    }

    fn set_diagnostics(&self, diagnostics: Diagnostics) {
        *self.diagnostics.lock() = diagnostics;
    }

    fn live_image(&self) -> Option<Arc<RgbImage>> {
        self.live_image.load_full()
    }

    fn last_cascade_image(&self) -> Option<Arc<RgbImage>> {
        self.last_cascade_image.load_full()
    }

    fn diagnostics(&self) -> Diagnostics {
        *self.diagnostics.lock()
    }

    fn mute_for(&self, duration: Duration) {
        *self.muted_until.lock() = Some(Instant::now() + duration);
    }

    fn is_muted(&self) -> bool {
        match *self.muted_until.lock() {
            Some(until) => Instant::now() < until,
            None => false,
        }
    }
}
