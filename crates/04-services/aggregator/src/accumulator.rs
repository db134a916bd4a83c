use image::RgbImage;

/// One event-retained frame: enough of a cascade result to build a verdict
/// caption and pick an attachment image later.
#[derive(Clone)]
pub struct EventFrame {
    pub image: RgbImage,
    pub face_present: bool,
    pub prey_score: Option<f32>,
}

/// The outcome of folding one frame into the accumulator, if it crossed a
/// threshold worth telling the operator about.
#[derive(Clone, Debug)]
pub enum Verdict {
    /// `cat_frame_count` crossed `cat_counter_threshold` for the first time
    /// this event.
    CatIncoming,
    Prey { avg: f32 },
    NoPrey { avg: f32 },
    DontKnow { avg: f32 },
}

/// Tunables driving the event-state-machine fold.
#[derive(Clone, Copy, Debug)]
pub struct AggregatorConfig {
    pub min_aggregation_frames_threshold: usize,
    pub event_reset_threshold: u32,
    pub cat_counter_threshold: u32,
    pub cumulus_prey_threshold: f32,
    pub cumulus_no_prey_threshold: f32,
}

/// One frame's cat/face/prey judgement, as handed to `fold`.
pub struct FrameJudgement {
    pub cat_present: bool,
    pub face_present: bool,
    pub prey_score: Option<f32>,
    pub image: RgbImage,
}

/// The event-state-machine accumulator.
///
/// `patience_reached` is a one-way latch: once true for an event it stays
/// true, per the "at least three (`in_event && face_seen_once`) frames ...
/// OR `face_frame_count > 1`" rule — this is deliberately not re-derived
/// from the other counters every iteration, it is latched the moment either
/// condition first holds.
pub struct Accumulator {
    config: AggregatorConfig,
    in_event: bool,
    cat_announced: bool,
    face_seen_once: bool,
    patience_reached: bool,
    miss_streak: u32,
    cat_frame_count: u32,
    face_frame_count: u32,
    patience_counter: u32,
    cumulative_score: f32,
    event_frames: Vec<EventFrame>,
}

/// Result of folding one frame: whether a verdict fired, and (always) the
/// retained frames and live image so the caller can maintain diagnostics.
pub struct FoldOutcome {
    pub verdict: Option<Verdict>,
    pub event_frames: Vec<EventFrame>,
}

impl Accumulator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            config,
            in_event: false,
            cat_announced: false,
            face_seen_once: false,
            patience_reached: false,
            miss_streak: 0,
            cat_frame_count: 0,
            face_frame_count: 0,
            patience_counter: 0,
            cumulative_score: 0.0,
            event_frames: Vec::new(),
        }
    }

    pub fn in_event(&self) -> bool {
        self.in_event
    }

    /// Folds one frame's judgement into the accumulator, returning any
    /// verdict that fired.
    pub fn fold(&mut self, judgement: FrameJudgement) -> FoldOutcome {
        if !judgement.cat_present {
            return self.fold_miss();
        }
        self.fold_cat_present(judgement)
    }

    /// Advances the patience latch for any frame where an event is open and
    /// a face has been seen at least once, regardless of whether this
    /// particular frame saw a cat. Runs on both miss and cat-present frames.
    fn bump_patience(&mut self) {
        if self.in_event && self.face_seen_once {
            self.patience_counter += 1;
            if self.patience_counter >= 3 || self.face_frame_count > 1 {
                self.patience_reached = true;
            }
        }
    }

    fn fold_miss(&mut self) -> FoldOutcome {
        self.miss_streak += 1;
        self.bump_patience();
        if self.miss_streak >= self.config.event_reset_threshold && self.in_event {
            let avg = self.cumulative_score / self.face_frame_count.max(1) as f32;
            let frames = self.event_frames.clone();
            self.reset();
            return FoldOutcome {
                verdict: Some(Verdict::DontKnow { avg }),
                event_frames: frames,
            };
        }
        FoldOutcome {
            verdict: None,
            event_frames: Vec::new(),
        }
    }

    fn fold_cat_present(&mut self, judgement: FrameJudgement) -> FoldOutcome {
        self.in_event = true;
        self.miss_streak = 0;
        self.cat_frame_count += 1;
        self.event_frames.push(EventFrame {
            image: judgement.image,
            face_present: judgement.face_present,
            prey_score: judgement.prey_score,
        });

        let mut verdict = None;
        if self.cat_frame_count >= self.config.cat_counter_threshold && !self.cat_announced {
            self.cat_announced = true;
            verdict = Some(Verdict::CatIncoming);
        }

        if judgement.face_present {
            self.face_frame_count += 1;
            let prey_score = judgement.prey_score.unwrap_or(0.0);
            self.cumulative_score += 50.0 - (100.0 * prey_score).round();
            self.face_seen_once = true;
        }

        self.bump_patience();

        if verdict.is_none() && self.face_frame_count > 0 && self.patience_reached {
            let avg = self.cumulative_score / self.face_frame_count as f32;
            if avg > self.config.cumulus_no_prey_threshold {
                verdict = Some(Verdict::NoPrey { avg });
            } else if avg < self.config.cumulus_prey_threshold {
                verdict = Some(Verdict::Prey { avg });
            }
        }

        let frames = match &verdict {
            Some(Verdict::CatIncoming) | None => Vec::new(),
            Some(_) => self.event_frames.clone(),
        };
        let should_reset = matches!(verdict, Some(Verdict::Prey { .. }) | Some(Verdict::NoPrey { .. }));
        if should_reset {
            self.reset();
        }

        FoldOutcome {
            verdict,
            event_frames: frames,
        }
    }

    /// All boolean/counter fields return to their initial values;
    /// `event_frames` is cleared. Does not touch the ring.
    pub fn reset(&mut self) {
        self.in_event = false;
        self.cat_announced = false;
        self.face_seen_once = false;
        self.patience_reached = false;
        self.miss_streak = 0;
        self.cat_frame_count = 0;
        self.face_frame_count = 0;
        self.patience_counter = 0;
        self.cumulative_score = 0.0;
        self.event_frames.clear();
    }
}

/// Picks the attachment image for a fired verdict:
/// `Prey` -> minimum prey_score (most prey-like); `NoPrey` -> maximum
/// prey_score (least prey-like); `DontKnow` -> first face-bearing frame,
/// falling back to the most recent frame.
pub fn pick_attachment<'a>(verdict: &Verdict, frames: &'a [EventFrame]) -> Option<&'a RgbImage> {
    match verdict {
        Verdict::Prey { .. } => frames
            .iter()
            .min_by(|a, b| score_key(a).total_cmp(&score_key(b)))
            .map(|f| &f.image),
        Verdict::NoPrey { .. } => frames
            .iter()
            .max_by(|a, b| score_key(a).total_cmp(&score_key(b)))
            .map(|f| &f.image),
        Verdict::DontKnow { .. } => frames
            .iter()
            .find(|f| f.face_present)
            .or_else(|| frames.last())
            .map(|f| &f.image),
        Verdict::CatIncoming => None,
    }
}

fn score_key(frame: &EventFrame) -> f32 {
    frame.prey_score.unwrap_or(f32::INFINITY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb};

    fn config() -> AggregatorConfig {
        AggregatorConfig {
            min_aggregation_frames_threshold: 1,
            event_reset_threshold: 3,
            cat_counter_threshold: 2,
            cumulus_prey_threshold: 20.0,
            cumulus_no_prey_threshold: 40.0,
        }
    }

    fn frame(cat: bool, face: bool, score: Option<f32>) -> FrameJudgement {
        FrameJudgement {
            cat_present: cat,
            face_present: face,
            prey_score: score,
            image: RgbImage::from_pixel(2, 2, Rgb([1, 1, 1])),
        }
    }

    #[test]
    fn no_cat_stream_never_enters_an_event() {
        let mut acc = Accumulator::new(config());
        for _ in 0..20 {
            let out = acc.fold(frame(false, false, None));
            assert!(out.verdict.is_none());
        }
        assert!(!acc.in_event());
    }

    #[test]
    fn cat_incoming_fires_exactly_once_per_event() {
        let mut acc = Accumulator::new(config());
        assert!(acc.fold(frame(true, false, None)).verdict.is_none());
        let second = acc.fold(frame(true, false, None));
        assert!(matches!(second.verdict, Some(Verdict::CatIncoming)));
        let third = acc.fold(frame(true, false, None));
        assert!(third.verdict.is_none());
    }

    #[test]
    fn brief_cat_no_face_emits_dont_know_after_event_reset_threshold_misses() {
        let mut acc = Accumulator::new(config());
        for _ in 0..6 {
            acc.fold(frame(true, false, None));
        }
        let mut fired = None;
        for _ in 0..6 {
            let out = acc.fold(frame(false, false, None));
            if out.verdict.is_some() {
                fired = out.verdict;
                break;
            }
        }
        assert!(matches!(fired, Some(Verdict::DontKnow { .. })));
        assert!(!acc.in_event());
    }

    // With cat_counter_threshold = 2, the CatIncoming verdict fires on the
    // second cat-present frame and the second face-bearing frame already
    // satisfies `face_frame_count > 1`, so a strong enough average fires a
    // prey/no-prey verdict on the third frame.

    #[test]
    fn strongly_prey_like_scores_emit_a_prey_verdict() {
        let mut acc = Accumulator::new(config());
        acc.fold(frame(true, false, None));
        let cat_incoming = acc.fold(frame(true, true, Some(0.9)));
        assert!(matches!(cat_incoming.verdict, Some(Verdict::CatIncoming)));
        let out = acc.fold(frame(true, true, Some(0.9)));
        assert!(matches!(out.verdict, Some(Verdict::Prey { .. })));
        assert!(!acc.in_event());
    }

    #[test]
    fn miss_frames_after_a_face_sighting_still_advance_the_patience_latch() {
        let mut acc = Accumulator::new(config());
        acc.fold(frame(true, false, None));
        acc.fold(frame(true, true, Some(0.9)));
        // Two miss frames below event_reset_threshold: event stays open and
        // patience_counter keeps climbing even though no cat is present.
        assert!(acc.fold(frame(false, false, None)).verdict.is_none());
        assert!(acc.fold(frame(false, false, None)).verdict.is_none());
        // patience_counter has now reached 3 purely from miss frames; the
        // next cat-present face-bearing frame should fire a verdict off the
        // latched patience rather than needing a second face-bearing frame.
        let out = acc.fold(frame(true, true, Some(0.9)));
        assert!(matches!(out.verdict, Some(Verdict::Prey { .. })));
    }

    #[test]
    fn strongly_non_prey_scores_emit_a_no_prey_verdict() {
        let mut acc = Accumulator::new(config());
        acc.fold(frame(true, false, None));
        acc.fold(frame(true, true, Some(0.05)));
        let out = acc.fold(frame(true, true, Some(0.05)));
        assert!(matches!(out.verdict, Some(Verdict::NoPrey { .. })));
        assert!(!acc.in_event());
    }

    #[test]
    fn reset_after_a_verdict_allows_a_fresh_event_to_start() {
        let mut acc = Accumulator::new(config());
        acc.fold(frame(true, false, None));
        acc.fold(frame(true, true, Some(0.9)));
        let out = acc.fold(frame(true, true, Some(0.9)));
        assert!(out.verdict.is_some());
        assert!(!acc.in_event());

        assert!(acc.fold(frame(true, false, None)).verdict.is_none());
        let second = acc.fold(frame(true, false, None));
        assert!(matches!(second.verdict, Some(Verdict::CatIncoming)));
    }

    #[test]
    fn pick_attachment_selects_min_score_for_prey() {
        let frames = vec![
            EventFrame { image: RgbImage::new(1, 1), face_present: true, prey_score: Some(0.8) },
            EventFrame { image: RgbImage::new(2, 2), face_present: true, prey_score: Some(0.1) },
        ];
        let verdict = Verdict::Prey { avg: 10.0 };
        let picked = pick_attachment(&verdict, &frames).unwrap();
        assert_eq!(picked.dimensions(), (2, 2));
    }

    #[test]
    fn pick_attachment_selects_max_score_for_no_prey() {
        let frames = vec![
            EventFrame { image: RgbImage::new(1, 1), face_present: true, prey_score: Some(0.8) },
            EventFrame { image: RgbImage::new(2, 2), face_present: true, prey_score: Some(0.1) },
        ];
        let verdict = Verdict::NoPrey { avg: 45.0 };
        let picked = pick_attachment(&verdict, &frames).unwrap();
        assert_eq!(picked.dimensions(), (1, 1));
    }

    #[test]
    fn pick_attachment_falls_back_to_last_frame_for_dont_know_without_a_face() {
        let frames = vec![
            EventFrame { image: RgbImage::new(1, 1), face_present: false, prey_score: None },
            EventFrame { image: RgbImage::new(3, 3), face_present: false, prey_score: None },
        ];
        let verdict = Verdict::DontKnow { avg: 0.0 };
        let picked = pick_attachment(&verdict, &frames).unwrap();
        assert_eq!(picked.dimensions(), (3, 3));
    }
}
