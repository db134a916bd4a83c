//! A bounded, lossy, state-machine-enforced handoff between the camera
//! producer, the cascade worker pool, and the aggregator.
//!
//! [`FrameRing`] is the coordination fabric: a fixed set of slots cycling
//! through `WaitingFrame -> InFrame ->
//! WaitingCascade -> InCascade -> WaitingAggregation -> InAggregation ->
//! WaitingFrame`. A single [`std::sync::Mutex`] guards the cursors, the
//! per-state counters, and each slot's [`SlotState`]; the large capture and
//! cascade-result payloads are written directly into a slot's cell outside
//! that critical section, relying on the `In*` states to grant the calling
//! thread exclusive ownership of the payload for as long as it holds the
//! slot. This supersedes the per-slot binary-semaphore design the original
//! system used — a semaphore conflates "lock" with "phase" and is easy to
//! desynchronize on an error path, where a single state enum plus one mutex
//! composes cleanly with a coarse [`FrameRing::clear_all`].

use std::sync::Mutex;
use std::time::Duration;

use cascade::CascadeResult;
use chrono::{DateTime, Utc};
use image::RgbImage;
use tracing::trace;

mod payload;
use payload::PayloadCell;

/// Identifies one slot in a [`FrameRing`]. Opaque outside this crate except
/// for the index it wraps, which callers may use for logging.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(u32);

impl SlotId {
    /// The slot's position in the ring, in `[0, capacity())`.
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Lifecycle state of one slot. `Used` from the governing design is
/// intentionally not modeled: [`FrameRing::release`] returns a slot straight
/// to `WaitingFrame`, there is no terminal post-mortem state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    WaitingFrame,
    InFrame,
    WaitingCascade,
    InCascade,
    WaitingAggregation,
    InAggregation,
}

/// A captured frame and the time it was captured.
#[derive(Clone)]
pub struct Capture {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

/// A cascade result plus its runtime and staleness ("overhead": the wall-clock
/// lag between capture and the cascade finishing).
#[derive(Clone)]
pub struct CascadeOutcome {
    pub result: CascadeResult,
    pub runtime: Duration,
    pub overhead: Duration,
}

/// Snapshot of the three availability counters, for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingCounts {
    pub frame: usize,
    pub cascade: usize,
    pub aggregation: usize,
}

struct Cursors {
    n: usize,
    states: Vec<SlotState>,
    next_empty: usize,
    next_pending_cascade: usize,
    next_pending_aggregation: usize,
    available_for_frame: usize,
    available_for_cascade: usize,
    available_for_aggregation: usize,
}

impl Cursors {
    fn new(n: usize) -> Self {
        Self {
            n,
            states: vec![SlotState::WaitingFrame; n],
            next_empty: 0,
            next_pending_cascade: 0,
            next_pending_aggregation: 0,
            available_for_frame: n,
            available_for_cascade: 0,
            available_for_aggregation: 0,
        }
    }

    fn reset(&mut self) {
        for state in &mut self.states {
            *state = SlotState::WaitingFrame;
        }
        self.next_empty = 0;
        self.next_pending_cascade = 0;
        self.next_pending_aggregation = 0;
        self.available_for_frame = self.n;
        self.available_for_cascade = 0;
        self.available_for_aggregation = 0;
    }
}

/// Fixed-size ring of frame slots; `capacity() == 2 * max_frame_buffers`.
pub struct FrameRing {
    payloads: Vec<PayloadCell>,
    cursors: Mutex<Cursors>,
}

impl FrameRing {
    /// Creates a ring with `2 * max_frame_buffers` slots, all `WaitingFrame`.
    pub fn new(max_frame_buffers: usize) -> Self {
        let n = max_frame_buffers.saturating_mul(2).max(2);
        Self {
            payloads: (0..n).map(|_| PayloadCell::new()).collect(),
            cursors: Mutex::new(Cursors::new(n)),
        }
    }

    /// Total number of slots in the ring.
    pub fn capacity(&self) -> usize {
        self.payloads.len()
    }

    /// Claims the next empty slot for the camera producer, or `None` if the
    /// ring is saturated downstream of the producer — the caller must treat
    /// `None` as "drop this frame", never retry within the same tick.
    pub fn claim_for_frame(&self) -> Option<SlotId> {
        let mut cursors = self.cursors.lock().unwrap();
        if cursors.available_for_frame == 0 {
            trace!(target: "balrog::ring", "claim_for_frame: ring saturated");
            return None;
        }
        let idx = cursors.next_empty;
        debug_assert_eq!(cursors.states[idx], SlotState::WaitingFrame);
        cursors.states[idx] = SlotState::InFrame;
        cursors.next_empty = (idx + 1) % cursors.n;
        cursors.available_for_frame -= 1;
        trace!(target: "balrog::ring", slot = idx, "claim_for_frame");
        Some(SlotId(idx as u32))
    }

    /// Writes the capture payload for a slot claimed via
    /// [`claim_for_frame`](Self::claim_for_frame). Must be called before
    /// [`publish_frame`](Self::publish_frame) and exactly once per claim.
    pub fn write_capture(&self, id: SlotId, image: RgbImage, captured_at: DateTime<Utc>) {
        // SAFETY: the caller holds `id` exclusively while its slot is
        // `InFrame` — no other thread touches this slot's payload until
        // `publish_frame` transitions it onward.
        let payload = unsafe { self.payloads[id.0 as usize].get_mut() };
        payload.capture = Some(Capture { image, captured_at });
    }

    /// Publishes a frame slot for cascade processing. Precondition: the slot
    /// is `InFrame` (i.e. was returned by `claim_for_frame` and not yet
    /// published).
    pub fn publish_frame(&self, id: SlotId) {
        let mut cursors = self.cursors.lock().unwrap();
        let idx = id.0 as usize;
        debug_assert_eq!(cursors.states[idx], SlotState::InFrame);
        cursors.states[idx] = SlotState::WaitingCascade;
        cursors.available_for_cascade += 1;
    }

    /// Claims the next `WaitingCascade` slot for a cascade worker, FIFO with
    /// respect to every prior `publish_frame` call.
    pub fn claim_for_cascade(&self) -> Option<SlotId> {
        let mut cursors = self.cursors.lock().unwrap();
        if cursors.available_for_cascade == 0 {
            return None;
        }
        let idx = cursors.next_pending_cascade;
        debug_assert_eq!(cursors.states[idx], SlotState::WaitingCascade);
        cursors.states[idx] = SlotState::InCascade;
        cursors.next_pending_cascade = (idx + 1) % cursors.n;
        cursors.available_for_cascade -= 1;
        trace!(target: "balrog::ring", slot = idx, "claim_for_cascade");
        Some(SlotId(idx as u32))
    }

    /// Borrows the capture written for a slot currently owned (`InCascade` or
    /// `InAggregation`) by the calling thread.
    pub fn capture(&self, id: SlotId) -> &Capture {
        // SAFETY: see `write_capture`; the caller owns `id` exclusively.
        let payload = unsafe { self.payloads[id.0 as usize].get() };
        payload
            .capture
            .as_ref()
            .expect("capture missing for a claimed slot")
    }

    /// Writes the cascade result for a slot claimed via
    /// [`claim_for_cascade`](Self::claim_for_cascade) and publishes it for
    /// aggregation. Precondition: the slot is `InCascade`.
    pub fn publish_cascade(
        &self,
        id: SlotId,
        result: CascadeResult,
        runtime: Duration,
        overhead: Duration,
    ) {
        {
            // SAFETY: the caller holds `id` exclusively while `InCascade`.
            let payload = unsafe { self.payloads[id.0 as usize].get_mut() };
            payload.outcome = Some(CascadeOutcome {
                result,
                runtime,
                overhead,
            });
        }
        let mut cursors = self.cursors.lock().unwrap();
        let idx = id.0 as usize;
        debug_assert_eq!(cursors.states[idx], SlotState::InCascade);
        cursors.states[idx] = SlotState::WaitingAggregation;
        cursors.available_for_aggregation += 1;
    }

    /// Claims the next `WaitingAggregation` slot for the aggregator, FIFO
    /// with respect to every prior `publish_cascade` call.
    pub fn claim_for_aggregation(&self) -> Option<SlotId> {
        let mut cursors = self.cursors.lock().unwrap();
        if cursors.available_for_aggregation == 0 {
            return None;
        }
        let idx = cursors.next_pending_aggregation;
        debug_assert_eq!(cursors.states[idx], SlotState::WaitingAggregation);
        cursors.states[idx] = SlotState::InAggregation;
        cursors.next_pending_aggregation = (idx + 1) % cursors.n;
        cursors.available_for_aggregation -= 1;
        trace!(target: "balrog::ring", slot = idx, "claim_for_aggregation");
        Some(SlotId(idx as u32))
    }

    /// Borrows the cascade outcome written for a slot currently owned
    /// (`InAggregation`) by the calling thread.
    pub fn outcome(&self, id: SlotId) -> &CascadeOutcome {
        // SAFETY: see `write_capture`; the caller owns `id` exclusively.
        let payload = unsafe { self.payloads[id.0 as usize].get() };
        payload
            .outcome
            .as_ref()
            .expect("outcome missing for a claimed slot")
    }

    /// Releases a slot claimed via
    /// [`claim_for_aggregation`](Self::claim_for_aggregation) back to
    /// `WaitingFrame`, clearing its payload. Precondition: the slot is
    /// `InAggregation`.
    pub fn release(&self, id: SlotId) {
        {
            // SAFETY: the caller holds `id` exclusively while `InAggregation`.
            let payload = unsafe { self.payloads[id.0 as usize].get_mut() };
            payload.capture = None;
            payload.outcome = None;
        }
        let mut cursors = self.cursors.lock().unwrap();
        let idx = id.0 as usize;
        debug_assert_eq!(cursors.states[idx], SlotState::InAggregation);
        cursors.states[idx] = SlotState::WaitingFrame;
        cursors.available_for_frame += 1;
    }

    /// Force-resets every slot to `WaitingFrame`, clearing all payloads and
    /// rewinding every cursor and counter. Coarse by design: a worker that
    /// fails mid-stage calls this instead of trying to unwind only its own
    /// slot, at the cost of discarding whatever any other slot currently
    /// holds. Callers must treat every previously claimed [`SlotId`] as
    /// invalid after this returns; the `publish_*`/`release` methods use
    /// `debug_assert!` to catch stale claims made before a concurrent
    /// `clear_all` in debug builds.
    pub fn clear_all(&self) {
        trace!(target: "balrog::ring", "clear_all");
        let mut cursors = self.cursors.lock().unwrap();
        for (idx, payload) in self.payloads.iter().enumerate() {
            let _ = idx;
            // SAFETY: holding `cursors` serializes `clear_all` against other
            // calls to `clear_all`; a slot whose owning thread is still
            // mid-flight racing this reset is the accepted coarseness this
            // method trades for simplicity on the fatal-error path.
            let payload = unsafe { payload.get_mut() };
            payload.capture = None;
            payload.outcome = None;
        }
        cursors.reset();
    }

    /// Current values of the three availability counters.
    pub fn snapshot_counts(&self) -> RingCounts {
        let cursors = self.cursors.lock().unwrap();
        RingCounts {
            frame: cursors.available_for_frame,
            cascade: cursors.available_for_cascade,
            aggregation: cursors.available_for_aggregation,
        }
    }
}

#[cfg(test)]
mod tests;
