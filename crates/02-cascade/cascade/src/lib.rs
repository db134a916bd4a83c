//! The detection cascade contract and a bundled, dependency-free stub cascade.
//!
//! The cascade is a pure, per-frame computation: cat-presence, face
//! localization, a face-filter pass, and a prey classifier, each producing
//! a partial verdict and a timing sample. Its internal CV models are an
//! external contract — this crate defines the contract ([`Cascade`],
//! [`CascadeResult`]) and ships [`StubCascade`], a
//! deterministic stand-in used for warm-up and tests so the workspace
//! builds without a real model file.

use std::time::Duration;

use image::RgbImage;

/// Per-stage inference timings, diagnostic only.
///
/// Generalizes the source system's seven stage timers (cat classifier, cat
/// region classifier, bounding-box search, HAAR cascade, two face-filter
/// variants, prey classifier) into the four logical stages this cascade
/// exposes publicly.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StageTimings {
    pub cat_classifier: Option<Duration>,
    pub face_localizer: Option<Duration>,
    pub face_filter: Option<Duration>,
    pub prey_classifier: Option<Duration>,
}

impl StageTimings {
    /// Sums every populated stage timing; stages that did not run (e.g. the
    /// face localizer when no cat was present) are skipped, not zeroed.
    pub fn total(&self) -> Duration {
        [
            self.cat_classifier,
            self.face_localizer,
            self.face_filter,
            self.prey_classifier,
        ]
        .into_iter()
        .flatten()
        .sum()
    }
}

/// Structured output of one cascade invocation over one frame.
#[derive(Clone, Debug)]
pub struct CascadeResult {
    pub cat_present: bool,
    pub face_present: bool,
    prey_score: Option<f32>,
    pub output_image: RgbImage,
    pub stage_timings: StageTimings,
}

impl CascadeResult {
    /// Builds a result, clamping `prey_score` into `[0.0, 1.0]` if present.
    ///
    /// The scoring model assumes a probability-like value in this range but
    /// never validates it; clamping keeps one bad stage output from
    /// discarding an otherwise-usable frame rather than rejecting it outright.
    pub fn new(
        cat_present: bool,
        face_present: bool,
        prey_score: Option<f32>,
        output_image: RgbImage,
        stage_timings: StageTimings,
    ) -> Self {
        Self {
            cat_present,
            face_present,
            prey_score: prey_score.map(|s| s.clamp(0.0, 1.0)),
            output_image,
            stage_timings,
        }
    }

    /// The model's is-prey probability-like value; lower means more prey-like.
    pub fn prey_score(&self) -> Option<f32> {
        self.prey_score
    }
}

/// Pure per-frame detector: cat present? face present? how prey-like?
///
/// Implementations must not block on I/O beyond the model invocation itself;
/// the cascade worker pool treats one call to [`run`](Cascade::run) as the
/// entire unit of work claimed for a slot.
pub trait Cascade: Send + Sync {
    fn run(&self, frame: &RgbImage) -> CascadeResult;
}

mod stub;
pub use stub::StubCascade;
