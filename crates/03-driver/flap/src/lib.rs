//! Cat-flap lock control contract and its two implementations.
//!
//! Grounded on `original_source/flap_locker.py`, which wraps the Sure
//! Petcare `surepy` client: list pets/devices, read and set one lock state,
//! and a timed unlock that restores whatever state preceded it. This crate
//! expresses that as a narrow, idempotent [`FlapController`] trait so the
//! aggregator's `letin` handling never has to know whether it is talking to
//! the vendor API or a test double.

use std::time::Duration;

use thiserror::Error;

mod null;
mod surepet;

pub use null::NullFlapController;
pub use surepet::SurepetFlapController;

#[derive(Debug, Error)]
pub enum FlapError {
    #[error("surepet API request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("surepet API returned an error: {0}")]
    Api(String),
    #[error("no cat flap device found on this account")]
    NoFlapDevice,
}

/// A pet known to the flap account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pet {
    pub id: u64,
    pub name: String,
    pub location: PetLocation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PetLocation {
    Inside,
    Outside,
    Unknown,
}

/// A hub device (typically the cat flap itself) known to the account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    pub id: u64,
    pub name: String,
    pub serial: String,
    pub battery_level: Option<u8>,
}

/// Lock state of a Sure Petcare cat flap. Variants and ordering mirror
/// `surepy.enums.LockState`: `Curfew` and the curfew variants compare
/// greater than the plain lock states, matching the original's
/// `old_state >= LockState::Curfew` check in `unlock_for_seconds`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockState {
    UnlockedAll,
    LockedIn,
    LockedOut,
    LockedAll,
    Curfew,
    CurfewLocked,
    CurfewUnlocked,
}

/// Contract for controlling and querying one cat flap.
pub trait FlapController: Send + Sync {
    fn get_pets(&self) -> Result<Vec<Pet>, FlapError>;
    fn get_devices(&self) -> Result<Vec<Device>, FlapError>;
    fn get_lock_state(&self) -> Result<LockState, FlapError>;
    fn set_lock_state(&self, state: LockState) -> Result<(), FlapError>;
    fn switch_pet_location(&self, pet_id: u64, location: PetLocation) -> Result<(), FlapError>;

    /// Unlocks the flap for `duration`, restoring whatever state preceded
    /// the call. Picks `CurfewUnlocked` when the prior state was already
    /// `>= Curfew`, else `UnlockedAll` — exactly
    /// `original_source/flap_locker.py::unlock_for_seconds`'s rule.
    fn unlock_for(&self, duration: Duration) -> Result<(), FlapError> {
        let old_state = self.get_lock_state()?;
        let new_state = if old_state >= LockState::Curfew {
            LockState::CurfewUnlocked
        } else {
            LockState::UnlockedAll
        };
        self.set_lock_state(new_state)?;
        std::thread::sleep(duration);
        self.set_lock_state(old_state)
    }
}
