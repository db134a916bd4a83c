//! Tracing setup: a stdout layer filtered by `stdout_debug_level`/`--log-level`,
//! plus two unconditional file layers (info, debug) rotated by size per
//! `[logging]`'s `max_log_file_size_mb`/`max_log_files_kept`, plus two
//! optional target-scoped stdout layers for `balrog::cascade`/`balrog::ring`
//! gated by `enable_cascade_logging`/`enable_circular_buffer_logging` — the
//! Rust equivalent of `original_source/cascade.py`'s multi-handler logger
//! (stdout, an INFO file handler via `RotatingFileHandler`, a DEBUG file
//! handler, and the two optional verbose channels it conditionally attaches).

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use balrog_config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Holds the non-blocking writer guards; must stay alive for the process
/// lifetime or buffered log lines are lost on drop.
pub struct LoggingGuards {
    _info_guard: WorkerGuard,
    _debug_guard: WorkerGuard,
}

/// `std::io::Write` over a single log file that rolls itself into numbered
/// backups (`name.1`, `name.2`, ...) once it would exceed `max_bytes`,
/// pruning beyond `max_backups` — the Rust equivalent of Python's
/// `logging.handlers.RotatingFileHandler(maxBytes=..., backupCount=...)`.
/// `max_bytes == 0` disables rotation entirely (the file grows unbounded).
struct SizeRotatingWriter {
    base_folder: PathBuf,
    file_name: String,
    max_bytes: u64,
    max_backups: u32,
    current: File,
    current_size: u64,
}

impl SizeRotatingWriter {
    fn open(base_folder: &Path, file_name: &str, max_bytes: u64, max_backups: u32) -> std::io::Result<Self> {
        let path = base_folder.join(file_name);
        let current = OpenOptions::new().create(true).append(true).open(&path)?;
        let current_size = current.metadata()?.len();
        Ok(Self {
            base_folder: base_folder.to_owned(),
            file_name: file_name.to_owned(),
            max_bytes,
            max_backups,
            current,
            current_size,
        })
    }

    fn live_path(&self) -> PathBuf {
        self.base_folder.join(&self.file_name)
    }

    fn backup_path(&self, n: u32) -> PathBuf {
        self.base_folder.join(format!("{}.{n}", self.file_name))
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        if self.max_backups == 0 {
            let _ = std::fs::remove_file(self.live_path());
        } else {
            for n in (1..self.max_backups).rev() {
                let src = self.backup_path(n);
                if src.exists() {
                    let _ = std::fs::rename(&src, self.backup_path(n + 1));
                }
            }
            let _ = std::fs::rename(self.live_path(), self.backup_path(1));
        }
        self.current = OpenOptions::new().create(true).append(true).open(self.live_path())?;
        self.current_size = 0;
        Ok(())
    }
}

impl Write for SizeRotatingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.max_bytes > 0 && self.current_size + buf.len() as u64 > self.max_bytes {
            self.rotate()?;
        }
        let written = self.current.write(buf)?;
        self.current_size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.current.flush()
    }
}

pub fn init(config: &LoggingConfig, level_override: Option<&str>, log_folder_override: Option<&str>) -> Result<LoggingGuards> {
    let base_folder = log_folder_override.unwrap_or(&config.log_base_folder);
    std::fs::create_dir_all(base_folder)
        .with_context(|| format!("failed to create log folder {base_folder}"))?;

    let stdout_filter = EnvFilter::try_new(level_override.unwrap_or(&config.stdout_debug_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(true).with_filter(stdout_filter);

    let max_bytes = config.max_log_file_size_mb.saturating_mul(1024 * 1024);

    let info_writer_inner =
        SizeRotatingWriter::open(Path::new(base_folder), &config.log_file_name, max_bytes, config.max_log_files_kept)
            .with_context(|| format!("failed to open info log file in {base_folder}"))?;
    let (info_writer, info_guard) = tracing_appender::non_blocking(info_writer_inner);
    let info_layer = fmt::layer()
        .with_writer(info_writer)
        .with_ansi(false)
        .with_filter(EnvFilter::new("info"));

    let debug_writer_inner = SizeRotatingWriter::open(
        Path::new(base_folder),
        &config.log_dbg_file_name,
        max_bytes,
        config.max_log_files_kept,
    )
    .with_context(|| format!("failed to open debug log file in {base_folder}"))?;
    let (debug_writer, debug_guard) = tracing_appender::non_blocking(debug_writer_inner);
    let debug_layer = fmt::layer()
        .with_writer(debug_writer)
        .with_ansi(false)
        .with_filter(EnvFilter::new("debug"));

    // `balrog::cascade`/`balrog::ring` are filtered independently of the
    // global stdout level: enabling one of these surfaces that target's
    // trace-level chatter on stdout even when `stdout_debug_level` is info
    // or coarser, without affecting any other target.
    let cascade_layer = config.enable_cascade_logging.then(|| {
        fmt::layer()
            .with_ansi(false)
            .with_filter(Targets::new().with_target("balrog::cascade", tracing::Level::TRACE))
    });
    let ring_layer = config.enable_circular_buffer_logging.then(|| {
        fmt::layer()
            .with_ansi(false)
            .with_filter(Targets::new().with_target("balrog::ring", tracing::Level::TRACE))
    });

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(info_layer)
        .with(debug_layer)
        .with(cascade_layer)
        .with(ring_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LoggingGuards {
        _info_guard: info_guard,
        _debug_guard: debug_guard,
    })
}

/// Implements the `clean` operator command: deletes rotated log files,
/// keeping the live `log_file_name`/`log_dbg_file_name` and the
/// `max_log_files_kept` most recent rotations of each.
pub fn clean_old_logs(base_folder: &Path, keep_names: &[&str], max_files_kept: u32) -> Result<usize> {
    let mut entries: Vec<_> = std::fs::read_dir(base_folder)
        .with_context(|| format!("failed to read log folder {}", base_folder.display()))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut removed = 0usize;
    let keep_count = max_files_kept as usize;
    let rotated: Vec<_> = entries
        .iter()
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            keep_names.iter().any(|k| name.starts_with(*k)) && !keep_names.contains(&name.as_ref())
        })
        .collect();

    if rotated.len() > keep_count {
        for entry in &rotated[..rotated.len() - keep_count] {
            if std::fs::remove_file(entry.path()).is_ok() {
                removed += 1;
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_old_logs_keeps_the_configured_count() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("balrog.log.{i}")), b"x").unwrap();
        }
        std::fs::write(dir.path().join("balrog.log"), b"live").unwrap();

        let removed = clean_old_logs(dir.path(), &["balrog.log"], 2).unwrap();
        assert_eq!(removed, 3);
        assert!(dir.path().join("balrog.log").exists());
    }

    #[test]
    fn clean_old_logs_is_a_noop_under_the_keep_threshold() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("balrog.log.0"), b"x").unwrap();
        let removed = clean_old_logs(dir.path(), &["balrog.log"], 5).unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn size_rotating_writer_rolls_into_a_numbered_backup_past_max_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SizeRotatingWriter::open(dir.path(), "test.log", 10, 2).unwrap();

        writer.write_all(b"01234").unwrap();
        writer.write_all(b"56789").unwrap();
        // Exactly 10 bytes written so far; the next write pushes past 10 and
        // should roll the current content into test.log.1 first.
        writer.write_all(b"abcde").unwrap();

        let live = std::fs::read_to_string(dir.path().join("test.log")).unwrap();
        let backup = std::fs::read_to_string(dir.path().join("test.log.1")).unwrap();
        assert_eq!(live, "abcde");
        assert_eq!(backup, "0123456789");
    }

    #[test]
    fn size_rotating_writer_prunes_beyond_max_backups() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SizeRotatingWriter::open(dir.path(), "test.log", 1, 1).unwrap();

        writer.write_all(b"a").unwrap();
        writer.write_all(b"b").unwrap();
        writer.write_all(b"c").unwrap();

        assert!(dir.path().join("test.log.1").exists());
        assert!(!dir.path().join("test.log.2").exists());
    }
}
