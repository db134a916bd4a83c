use parking_lot::Mutex;
use serde::Deserialize;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::{Device, FlapController, FlapError, LockState, Pet, PetLocation};

const API_BASE: &str = "https://app-api.production.surehub.io/api";
const CAT_FLAP_PRODUCT_ID: u32 = 6;

/// Talks to the Sure Petcare vendor API over `reqwest`.
///
/// Translates `original_source/flap_locker.py`'s `surepy`-based calls
/// (`get_pets`, `get_devices`, `get_lock_state`/`_set_lock_state`,
/// `unlock_for_seconds`) into direct HTTP calls against the same endpoints
/// `surepy` wraps. Holds a handle into the process's one shared `tokio`
/// runtime and uses `Handle::block_on` for each request, so
/// `FlapController`'s trait methods stay synchronous for callers while only
/// ever borrowing (never blocking) a runtime worker thread.
pub struct SurepetFlapController {
    runtime: Handle,
    client: reqwest::Client,
    token: Mutex<String>,
}

#[derive(Deserialize)]
struct LoginResponse {
    data: LoginData,
}

#[derive(Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Deserialize)]
struct PetsResponse {
    data: Vec<PetPayload>,
}

#[derive(Deserialize)]
struct PetPayload {
    id: u64,
    name: String,
    status: Option<PetStatus>,
}

#[derive(Deserialize)]
struct PetStatus {
    activity: Option<PetActivity>,
}

#[derive(Deserialize)]
struct PetActivity {
    #[serde(rename = "where")]
    where_field: Option<u8>,
}

#[derive(Deserialize)]
struct DevicesResponse {
    data: Vec<DevicePayload>,
}

#[derive(Deserialize)]
struct DevicePayload {
    id: u64,
    name: String,
    serial_number: String,
    product_id: u32,
    status: Option<DeviceStatus>,
}

#[derive(Deserialize)]
struct DeviceStatus {
    battery: Option<f32>,
    locking: Option<LockingStatus>,
}

#[derive(Deserialize)]
struct LockingStatus {
    mode: u8,
}

impl SurepetFlapController {
    /// Logs in with `email`/`password`, matching `Surepy(email=..., password=...)`.
    pub fn new(runtime: Handle, email: String, password: String) -> Result<Self, FlapError> {
        let client = reqwest::Client::new();
        let token = runtime.block_on(login(&client, &email, &password))?;
        Ok(Self {
            runtime,
            client,
            token: Mutex::new(token),
        })
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.token.lock())
    }

    fn find_flap_device(devices: &[DevicePayload]) -> Result<&DevicePayload, FlapError> {
        devices
            .iter()
            .find(|d| d.product_id == CAT_FLAP_PRODUCT_ID)
            .ok_or(FlapError::NoFlapDevice)
    }
}

impl FlapController for SurepetFlapController {
    fn get_pets(&self) -> Result<Vec<Pet>, FlapError> {
        let auth = self.auth_header();
        let client = self.client.clone();
        let body: PetsResponse = self
            .runtime
            .block_on(async move { get_json(&client, "/pet", &auth).await })?;
        Ok(body
            .data
            .into_iter()
            .map(|p| Pet {
                id: p.id,
                name: p.name,
                location: p
                    .status
                    .and_then(|s| s.activity)
                    .and_then(|a| a.where_field)
                    .map(pet_location_from_code)
                    .unwrap_or(PetLocation::Unknown),
            })
            .collect())
    }

    fn get_devices(&self) -> Result<Vec<Device>, FlapError> {
        let auth = self.auth_header();
        let client = self.client.clone();
        let body: DevicesResponse = self
            .runtime
            .block_on(async move { get_json(&client, "/device", &auth).await })?;
        Ok(body
            .data
            .into_iter()
            .map(|d| Device {
                id: d.id,
                name: d.name,
                serial: d.serial_number,
                battery_level: d
                    .status
                    .and_then(|s| s.battery)
                    .map(|v| v.clamp(0.0, 100.0) as u8),
            })
            .collect())
    }

    fn get_lock_state(&self) -> Result<LockState, FlapError> {
        let auth = self.auth_header();
        let client = self.client.clone();
        let result = self
            .runtime
            .block_on(async move { get_json::<DevicesResponse>(&client, "/device", &auth).await });
        let body = match result {
            Ok(body) => body,
            Err(err) => {
                warn!(target: "balrog::flap", %err, "failed to read lock state, assuming LockedOut");
                return Ok(LockState::LockedOut);
            }
        };
        let flap = Self::find_flap_device(&body.data)?;
        let mode = flap
            .status
            .as_ref()
            .and_then(|s| s.locking.as_ref())
            .map(|l| l.mode)
            .unwrap_or(2);
        Ok(lock_state_from_code(mode))
    }

    fn set_lock_state(&self, state: LockState) -> Result<(), FlapError> {
        let auth = self.auth_header();
        let client = self.client.clone();
        let devices: DevicesResponse = self
            .runtime
            .block_on(async move { get_json(&client, "/device", &auth).await })?;
        let flap = Self::find_flap_device(&devices.data)?;
        let flap_id = flap.id;
        let auth = self.auth_header();
        let client = self.client.clone();
        let code = lock_state_to_code(state);
        self.runtime.block_on(async move {
            let url = format!("{API_BASE}/device/{flap_id}/control");
            let resp = client
                .put(url)
                .header("Authorization", auth)
                .json(&serde_json::json!({ "locking": { "mode": code } }))
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(FlapError::Api(format!(
                    "device control returned {}",
                    resp.status()
                )));
            }
            debug!(target: "balrog::flap", ?state, "set lock state");
            Ok(())
        })
    }

    fn switch_pet_location(&self, pet_id: u64, location: PetLocation) -> Result<(), FlapError> {
        let auth = self.auth_header();
        let client = self.client.clone();
        let code = pet_location_to_code(location);
        self.runtime.block_on(async move {
            let url = format!("{API_BASE}/pet/{pet_id}/position");
            let resp = client
                .post(url)
                .header("Authorization", auth)
                .json(&serde_json::json!({ "where": code }))
                .send()
                .await?;
            if !resp.status().is_success() {
                return Err(FlapError::Api(format!(
                    "pet position update returned {}",
                    resp.status()
                )));
            }
            Ok(())
        })
    }
}

async fn login(
    client: &reqwest::Client,
    email: &str,
    password: &str,
) -> Result<String, FlapError> {
    let url = format!("{API_BASE}/auth/login");
    let resp = client
        .post(url)
        .json(&serde_json::json!({
            "email_address": email,
            "password": password,
            "device_id": "balrogd",
        }))
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(FlapError::Api(format!("login returned {}", resp.status())));
    }
    let body: LoginResponse = resp.json().await?;
    Ok(body.data.token)
}

async fn get_json<T: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    path: &str,
    auth: &str,
) -> Result<T, FlapError> {
    let url = format!("{API_BASE}{path}");
    let resp = client.get(url).header("Authorization", auth).send().await?;
    if !resp.status().is_success() {
        return Err(FlapError::Api(format!(
            "{path} returned {}",
            resp.status()
        )));
    }
    Ok(resp.json().await?)
}

fn lock_state_from_code(code: u8) -> LockState {
    match code {
        0 => LockState::UnlockedAll,
        1 => LockState::LockedIn,
        2 => LockState::LockedOut,
        3 => LockState::LockedAll,
        4 => LockState::Curfew,
        5 => LockState::CurfewLocked,
        6 => LockState::CurfewUnlocked,
        _ => LockState::LockedOut,
    }
}

fn lock_state_to_code(state: LockState) -> u8 {
    match state {
        LockState::UnlockedAll => 0,
        LockState::LockedIn => 1,
        LockState::LockedOut => 2,
        LockState::LockedAll => 3,
        LockState::Curfew => 4,
        LockState::CurfewLocked => 5,
        LockState::CurfewUnlocked => 6,
    }
}

fn pet_location_from_code(code: u8) -> PetLocation {
    match code {
        1 => PetLocation::Inside,
        2 => PetLocation::Outside,
        _ => PetLocation::Unknown,
    }
}

fn pet_location_to_code(location: PetLocation) -> u8 {
    match location {
        PetLocation::Inside => 1,
        PetLocation::Outside => 2,
        PetLocation::Unknown => 0,
    }
}
