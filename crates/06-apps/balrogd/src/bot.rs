//! The operator chat bot: long-polls Telegram's `getUpdates` and dispatches
//! the operator command surface.
//!
//! Runs on a dedicated OS thread (not a spawned `tokio` task) so each
//! `Handle::block_on` call here — one for `getUpdates`, and whichever ones
//! `FlapController`'s synchronous methods make internally — is a top-level
//! call on this thread rather than a nested one.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flap::{FlapController, LockState, PetLocation};
use sender::MessageSender;
use serde::Deserialize;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::logging;

pub struct BotConfig {
    pub token: String,
    pub chat_id: String,
    pub let_in_open_seconds: u64,
    pub log_base_folder: PathBuf,
    pub log_file_name: String,
    pub log_dbg_file_name: String,
    pub max_log_files_kept: u32,
}

pub struct BotListener {
    config: BotConfig,
    client: reqwest::Client,
    message_sender: Arc<dyn MessageSender>,
    flap: Arc<dyn FlapController>,
    stop: Arc<AtomicBool>,
    clean_queue: Arc<AtomicBool>,
    pets_by_name: HashMap<String, u64>,
    devices_by_name: HashMap<String, u64>,
}

#[derive(Deserialize)]
struct GetUpdatesResponse {
    result: Vec<Update>,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Deserialize)]
struct Message {
    text: Option<String>,
    chat: Chat,
}

#[derive(Deserialize)]
struct Chat {
    id: i64,
}

impl BotListener {
    pub fn new(
        config: BotConfig,
        message_sender: Arc<dyn MessageSender>,
        flap: Arc<dyn FlapController>,
        stop: Arc<AtomicBool>,
        clean_queue: Arc<AtomicBool>,
    ) -> Self {
        let pets_by_name = flap
            .get_pets()
            .unwrap_or_default()
            .into_iter()
            .map(|p| (p.name.to_lowercase(), p.id))
            .collect();
        let devices_by_name = flap
            .get_devices()
            .unwrap_or_default()
            .into_iter()
            .map(|d| (d.name.to_lowercase(), d.id))
            .collect();

        Self {
            config,
            client: reqwest::Client::new(),
            message_sender,
            flap,
            stop,
            clean_queue,
            pets_by_name,
            devices_by_name,
        }
    }

    /// Runs the long-poll loop until the stop signal fires. Meant to be
    /// spawned on its own `std::thread`.
    pub fn run(mut self, runtime: Handle) {
        let mut offset: i64 = 0;
        info!(target: "balrog::bot", "bot listener starting, online");
        self.message_sender.send_text("online");

        while !self.stop.load(Ordering::Relaxed) {
            let updates = runtime.block_on(self.fetch_updates(offset));
            let updates = match updates {
                Ok(updates) => updates,
                Err(err) => {
                    warn!(target: "balrog::bot", %err, "getUpdates failed, retrying");
                    std::thread::sleep(Duration::from_secs(2));
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else { continue };
                if message.chat.id.to_string() != self.config.chat_id {
                    continue;
                }
                let Some(text) = message.text else { continue };
                self.dispatch(&text);
            }
        }
        info!(target: "balrog::bot", "bot listener stopping");
    }

    async fn fetch_updates(&self, offset: i64) -> Result<Vec<Update>, reqwest::Error> {
        let url = format!(
            "https://api.telegram.org/bot{}/getUpdates",
            self.config.token
        );
        let resp = self
            .client
            .get(url)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", "20".to_owned()),
            ])
            .timeout(Duration::from_secs(25))
            .send()
            .await?;
        let body: GetUpdatesResponse = resp.json().await?;
        Ok(body.result)
    }

    fn dispatch(&self, text: &str) {
        let text = text.trim();
        let Some(command) = text.strip_prefix('/') else {
            return;
        };
        let mut parts = command.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or("").to_lowercase();
        let arg = parts.next().map(str::trim);

        debug!(target: "balrog::bot", %name, "dispatching command");

        match name.as_str() {
            "help" => self.reply_help(),
            "clean" => self.handle_clean(),
            "restart" | "reboot" => self.handle_restart(),
            "nodestatus" => self.handle_nodestatus(),
            "sendlivepic" => self.handle_sendlivepic(),
            "sendlastcascpic" => self.handle_sendlastcascpic(),
            "letin" => self.handle_letin(),
            "lock" => self.handle_set_lock(LockState::LockedAll),
            "lockin" => self.handle_set_lock(LockState::LockedIn),
            "lockout" => self.handle_set_lock(LockState::LockedOut),
            "unlock" => self.handle_set_lock(LockState::UnlockedAll),
            "curfew" => self.handle_set_lock(LockState::Curfew),
            "mute" => self.handle_mute(arg),
            "statuspets" => self.handle_status_pets(),
            _ if name.starts_with("switch") => self.handle_switch_pet(&name["switch".len()..]),
            _ if name.starts_with("status") => self.handle_status_device(&name["status".len()..]),
            _ => {
                self.message_sender
                    .send_text(&format!("unknown command: /{name}"));
            }
        }
    }

    fn reply_help(&self) {
        let mut lines = vec![
            "help, clean, restart/reboot, nodestatus, sendlivepic, sendlastcascpic, letin,"
                .to_owned(),
            "lock, lockin, lockout, unlock, curfew, mute [minutes], statusPets".to_owned(),
        ];
        for pet in self.pets_by_name.keys() {
            lines.push(format!("switch{pet}"));
        }
        for device in self.devices_by_name.keys() {
            lines.push(format!("status{device}"));
        }
        self.message_sender.send_text(&lines.join("\n"));
    }

    fn handle_clean(&self) {
        let keep = [
            self.config.log_file_name.as_str(),
            self.config.log_dbg_file_name.as_str(),
        ];
        match logging::clean_old_logs(&self.config.log_base_folder, &keep, self.config.max_log_files_kept) {
            Ok(removed) => self
                .message_sender
                .send_text(&format!("removed {removed} old log file(s)")),
            Err(err) => {
                error!(target: "balrog::bot", %err, "clean command failed");
                self.message_sender.send_text("failed to clean log files");
            }
        }
    }

    fn handle_restart(&self) {
        self.message_sender.send_text("restarting");
        self.stop.store(true, Ordering::SeqCst);
    }

    fn handle_nodestatus(&self) {
        let diagnostics = self.message_sender.diagnostics();
        self.message_sender.send_text(&format!(
            "queue_length={} overhead_seconds={:.3}",
            diagnostics.queue_length, diagnostics.overhead_seconds
        ));
    }

    fn handle_sendlivepic(&self) {
        match self.message_sender.live_image() {
            Some(image) => self.message_sender.send_image(&image, "live", true),
            None => self.message_sender.send_text("no live image yet"),
        }
    }

    fn handle_sendlastcascpic(&self) {
        match self.message_sender.last_cascade_image() {
            Some(image) => self.message_sender.send_image(&image, "last cascade", true),
            None => self.message_sender.send_text("no cascade image yet"),
        }
    }

    fn handle_letin(&self) {
        let duration = Duration::from_secs(self.config.let_in_open_seconds);
        match self.flap.unlock_for(duration) {
            Ok(()) => {
                self.clean_queue.store(true, Ordering::SeqCst);
                self.message_sender
                    .send_text(&format!("unlocked for {}s", self.config.let_in_open_seconds));
            }
            Err(err) => {
                error!(target: "balrog::bot", %err, "letin failed");
                self.message_sender.send_text("letin failed");
            }
        }
    }

    fn handle_set_lock(&self, state: LockState) {
        match self.flap.set_lock_state(state) {
            Ok(()) => self
                .message_sender
                .send_text(&format!("lock state set to {state:?}")),
            Err(err) => {
                error!(target: "balrog::bot", %err, "set_lock_state failed");
                self.message_sender.send_text("failed to set lock state");
            }
        }
    }

    fn handle_mute(&self, arg: Option<&str>) {
        const DEFAULT_MUTE_MINUTES: u64 = 30;
        let minutes = arg.and_then(|a| a.parse::<u64>().ok()).unwrap_or(DEFAULT_MUTE_MINUTES);
        self.message_sender.mute_for(Duration::from_secs(minutes * 60));
        self.message_sender
            .send_text(&format!("muted images for {minutes} minute(s)"));
    }

    fn handle_status_pets(&self) {
        match self.flap.get_pets() {
            Ok(pets) => {
                let text = pets
                    .iter()
                    .map(|p| format!("{}: {:?}", p.name, p.location))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.message_sender.send_text(&text);
            }
            Err(err) => {
                error!(target: "balrog::bot", %err, "get_pets failed");
                self.message_sender.send_text("failed to read pet status");
            }
        }
    }

    fn handle_switch_pet(&self, pet_name: &str) {
        let Some(&pet_id) = self.pets_by_name.get(pet_name) else {
            self.message_sender
                .send_text(&format!("unknown pet: {pet_name}"));
            return;
        };
        let pets = self.flap.get_pets().unwrap_or_default();
        let current = pets
            .iter()
            .find(|p| p.id == pet_id)
            .map(|p| p.location)
            .unwrap_or(PetLocation::Unknown);
        let next = match current {
            PetLocation::Inside => PetLocation::Outside,
            _ => PetLocation::Inside,
        };
        match self.flap.switch_pet_location(pet_id, next) {
            Ok(()) => self
                .message_sender
                .send_text(&format!("{pet_name} is now {next:?}")),
            Err(err) => {
                error!(target: "balrog::bot", %err, "switch_pet_location failed");
                self.message_sender.send_text("failed to switch pet location");
            }
        }
    }

    fn handle_status_device(&self, device_name: &str) {
        let Some(&device_id) = self.devices_by_name.get(device_name) else {
            self.message_sender
                .send_text(&format!("unknown device: {device_name}"));
            return;
        };
        match self.flap.get_devices() {
            Ok(devices) => {
                if let Some(device) = devices.iter().find(|d| d.id == device_id) {
                    self.message_sender.send_text(&format!(
                        "{}: battery={:?}",
                        device.name, device.battery_level
                    ));
                } else {
                    self.message_sender.send_text("device not found");
                }
            }
            Err(err) => {
                error!(target: "balrog::bot", %err, "get_devices failed");
                self.message_sender.send_text("failed to read device status");
            }
        }
    }
}
