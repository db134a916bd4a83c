use parking_lot::Mutex;

use crate::{Device, FlapController, FlapError, LockState, Pet, PetLocation};

/// In-memory lock state, no network calls.
///
/// Used when `SUREPET_USER`/`SUREPET_PASSWORD` are absent, but only in
/// debug/test builds — production startup still treats missing vendor
/// credentials as a fatal configuration error.
pub struct NullFlapController {
    state: Mutex<LockState>,
    pets: Vec<Pet>,
    devices: Vec<Device>,
}

impl Default for NullFlapController {
    fn default() -> Self {
        Self::new()
    }
}

impl NullFlapController {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState::LockedOut),
            pets: vec![Pet {
                id: 1,
                name: "Moria".to_owned(),
                location: PetLocation::Unknown,
            }],
            devices: vec![Device {
                id: 1,
                name: "Front flap".to_owned(),
                serial: "DEBUG-0001".to_owned(),
                battery_level: Some(100),
            }],
        }
    }
}

impl FlapController for NullFlapController {
    fn get_pets(&self) -> Result<Vec<Pet>, FlapError> {
        Ok(self.pets.clone())
    }

    fn get_devices(&self) -> Result<Vec<Device>, FlapError> {
        Ok(self.devices.clone())
    }

    fn get_lock_state(&self) -> Result<LockState, FlapError> {
        Ok(*self.state.lock())
    }

    fn set_lock_state(&self, state: LockState) -> Result<(), FlapError> {
        *self.state.lock() = state;
        Ok(())
    }

    fn switch_pet_location(&self, _pet_id: u64, _location: PetLocation) -> Result<(), FlapError> {
        Ok(())
    }
}
