//! A deterministic, model-free cascade used for warm-up and tests.
//!
//! Each stage derives its verdict from simple pixel statistics instead of a
//! trained model, so the crate has no native dependency and produces the
//! same output for the same input frame. Production deployments swap this
//! for a real multi-stage detector behind the same [`Cascade`] trait.

use std::time::Instant;

use image::{GenericImageView, RgbImage};

use crate::{CascadeResult, StageTimings};

/// Brightness threshold above which the cat-presence stage fires.
const CAT_PRESENCE_LUMA_THRESHOLD: f64 = 40.0;
/// Contrast (std-dev of luma) threshold above which a face is considered localized.
const FACE_CONTRAST_THRESHOLD: f64 = 18.0;

/// Bundled stub cascade: pixel-statistics heuristics standing in for a real model.
#[derive(Clone, Copy, Debug, Default)]
pub struct StubCascade;

impl StubCascade {
    pub fn new() -> Self {
        Self
    }
}

impl crate::Cascade for StubCascade {
    fn run(&self, frame: &RgbImage) -> CascadeResult {
        let start = Instant::now();
        let (mean_luma, std_luma) = luma_stats(frame);
        let cat_classifier = Some(start.elapsed());

        let cat_present = mean_luma > CAT_PRESENCE_LUMA_THRESHOLD;

        let mut face_localizer = None;
        let mut face_filter = None;
        let mut prey_classifier = None;
        let mut face_present = false;
        let mut prey_score = None;

        if cat_present {
            let t = Instant::now();
            let face_present_candidate = std_luma > FACE_CONTRAST_THRESHOLD;
            face_localizer = Some(t.elapsed());

            let t = Instant::now();
            face_present = face_present_candidate;
            face_filter = Some(t.elapsed());

            if face_present {
                let t = Instant::now();
                // Deterministic pseudo-score from the frame's contrast: higher
                // contrast reads as a sharper, more "alert" face and is mapped
                // to a lower (more prey-like) score, purely as a stand-in rule.
                let normalized = (std_luma / 128.0).clamp(0.0, 1.0);
                prey_score = Some(1.0 - normalized as f32);
                prey_classifier = Some(t.elapsed());
            }
        }

        CascadeResult::new(
            cat_present,
            face_present,
            prey_score,
            frame.clone(),
            StageTimings {
                cat_classifier,
                face_localizer,
                face_filter,
                prey_classifier,
            },
        )
    }
}

/// Mean and (population) standard deviation of the luma channel.
fn luma_stats(frame: &RgbImage) -> (f64, f64) {
    let (w, h) = frame.dimensions();
    if w == 0 || h == 0 {
        return (0.0, 0.0);
    }
    let n = (w * h) as f64;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for (_, _, px) in frame.pixels() {
        let luma = 0.299 * px[0] as f64 + 0.587 * px[1] as f64 + 0.114 * px[2] as f64;
        sum += luma;
        sum_sq += luma * luma;
    }
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    (mean, variance.sqrt())
}
