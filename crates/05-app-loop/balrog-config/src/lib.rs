//! TOML configuration tree and environment variable loading for `balrogd`.
//!
//! Grounded on `original_source/config.py`'s `tomllib`-backed dataclasses,
//! generalized into one struct tree (the original split `general`/`model`
//! across two dataclasses reading the same file twice; this loads the whole
//! document once). A missing file or field is fatal at startup —
//! `anyhow::Error` carries context up to `balrogd::main`, matching
//! `dev_server`'s own startup style.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BalrogConfig {
    pub general: GeneralConfig,
    pub logging: LoggingConfig,
    pub camera: CameraConfig,
    pub model: ModelConfig,
    pub flap: FlapConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub max_message_sender_threads: usize,
    pub max_frame_processor_threads: usize,
    pub min_aggregation_frames_threshold: usize,
    pub max_frame_buffers: usize,
    pub local_timezone: String,
    pub timestamp_format: String,
}

impl GeneralConfig {
    /// Parses `local_timezone` (an IANA name, e.g. `"Europe/Zurich"`) into a
    /// `chrono_tz::Tz`, so a typo is a fatal startup error rather than a
    /// silent fallback to UTC discovered later in a log timestamp.
    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.local_timezone
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid local_timezone: {}", self.local_timezone))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub log_base_folder: String,
    pub log_file_name: String,
    pub log_dbg_file_name: String,
    pub stdout_debug_level: String,
    pub enable_cascade_logging: bool,
    pub enable_circular_buffer_logging: bool,
    pub max_log_file_size_mb: u64,
    pub max_log_files_kept: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    pub camera_fps: u32,
    pub camera_cleanup_frames_threshold: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub event_reset_threshold: u32,
    pub cat_counter_threshold: u32,
    pub cumulus_prey_threshold: f32,
    pub cumulus_no_prey_threshold: f32,
    pub prey_val_hard_threshold: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlapConfig {
    pub let_in_open_seconds: u64,
}

impl BalrogConfig {
    /// Loads and parses the TOML document at `path`. A missing file or an
    /// unparseable/incomplete document is a fatal startup error.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("failed to parse config file at {}", path.display()))
    }
}

/// Required environment variables, read once at startup. Missing required
/// values are fatal, turned into the same `anyhow::Error` path as a bad
/// config file.
#[derive(Debug, Clone)]
pub struct Env {
    pub camera_stream_uri: Option<String>,
    pub surepet_user: Option<String>,
    pub surepet_password: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub use_null_camera: bool,
    pub use_null_telegram: bool,
    pub log_folder_override: Option<String>,
}

impl Env {
    pub fn load() -> Self {
        Self {
            camera_stream_uri: non_empty_var("CAMERA_STREAM_URI"),
            surepet_user: non_empty_var("SUREPET_USER"),
            surepet_password: non_empty_var("SUREPET_PASSWORD"),
            telegram_chat_id: non_empty_var("TELEGRAM_CHAT_ID"),
            telegram_bot_token: non_empty_var("TELEGRAM_BOT_TOKEN"),
            use_null_camera: bool_var("BALROG_USE_NULL_CAMERA"),
            use_null_telegram: bool_var("BALROG_USE_NULL_TELEGRAM"),
            log_folder_override: non_empty_var("BALROG_LOG_FOLDER"),
        }
    }

    /// Fails unless every credential/URI a live (non-null) backend needs is
    /// present. Debug-mode substitutes are exempt from their own variable.
    pub fn require_live_backends(&self) -> Result<()> {
        if !self.use_null_camera && self.camera_stream_uri.is_none() {
            anyhow::bail!("CAMERA_STREAM_URI is required unless BALROG_USE_NULL_CAMERA is set");
        }
        if self.surepet_user.is_none() || self.surepet_password.is_none() {
            anyhow::bail!("SUREPET_USER and SUREPET_PASSWORD are required");
        }
        if !self.use_null_telegram
            && (self.telegram_chat_id.is_none() || self.telegram_bot_token.is_none())
        {
            anyhow::bail!(
                "TELEGRAM_CHAT_ID and TELEGRAM_BOT_TOKEN are required unless BALROG_USE_NULL_TELEGRAM is set"
            );
        }
        Ok(())
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn bool_var(key: &str) -> bool {
    non_empty_var(key).is_some()
}
