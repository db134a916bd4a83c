use std::cell::UnsafeCell;

use crate::{Capture, CascadeOutcome};

#[derive(Default)]
pub(crate) struct SlotPayload {
    pub(crate) capture: Option<Capture>,
    pub(crate) outcome: Option<CascadeOutcome>,
}

/// Holds one slot's capture/outcome payload behind an `UnsafeCell`.
///
/// Grounded on the kernel crate's `SingleThreadCell`: access outside the
/// ring's own mutex is sound only because `FrameRing`'s public API hands out
/// a given `SlotId` to exactly one caller at a time (enforced by the
/// `claim_for_*` cursor protocol), never because of any property of this
/// type itself.
pub(crate) struct PayloadCell(UnsafeCell<SlotPayload>);

// SAFETY: PayloadCell is shared across threads inside `FrameRing::payloads`,
// but `FrameRing`'s claim/publish/release protocol guarantees only the
// thread currently holding a slot's `SlotId` calls `get`/`get_mut` on it.
unsafe impl Send for PayloadCell {}
// SAFETY: see above.
unsafe impl Sync for PayloadCell {}

impl PayloadCell {
    pub(crate) fn new() -> Self {
        Self(UnsafeCell::new(SlotPayload::default()))
    }

    /// # Safety
    /// Caller must hold exclusive ownership of this slot (its `SlotId` was
    /// returned by a `claim_for_*` call and not yet released/published past
    /// the stage that granted ownership).
    pub(crate) unsafe fn get(&self) -> &SlotPayload {
        unsafe { &*self.0.get() }
    }

    /// # Safety
    /// Same contract as [`get`](Self::get).
    pub(crate) unsafe fn get_mut(&self) -> &mut SlotPayload {
        unsafe { &mut *self.0.get() }
    }
}
