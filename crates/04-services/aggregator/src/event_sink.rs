use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::accumulator::Verdict;

/// Hook called once per verdict, for operator-facing export. Default no-op;
/// not wired into the default binary. Grounded on
/// `original_source/cascade.py::log_event_to_csv`, which writes one CSV row
/// per retained frame on every verdict.
pub trait EventSink: Send + Sync {
    fn record(&self, at: DateTime<Utc>, verdict: &Verdict, frame_count: usize);
}

pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn record(&self, _at: DateTime<Utc>, _verdict: &Verdict, _frame_count: usize) {}
}

/// Appends one row per verdict to a CSV file. Off by default; enabled only
/// when the operator explicitly configures an export path.
pub struct CsvEventSink {
    path: PathBuf,
    file: Mutex<()>,
}

impl CsvEventSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(()),
        }
    }

    fn verdict_row(verdict: &Verdict) -> (&'static str, f32) {
        match verdict {
            Verdict::CatIncoming => ("cat_incoming", 0.0),
            Verdict::Prey { avg } => ("prey", *avg),
            Verdict::NoPrey { avg } => ("no_prey", *avg),
            Verdict::DontKnow { avg } => ("dont_know", *avg),
        }
    }
}

impl EventSink for CsvEventSink {
    fn record(&self, at: DateTime<Utc>, verdict: &Verdict, frame_count: usize) {
        let _guard = self.file.lock().unwrap();
        let (kind, avg) = Self::verdict_row(verdict);
        let row = format!(
            "{},{},{},{}\n",
            at.format("%Y-%m-%dT%H:%M:%S%.3f"),
            kind,
            avg,
            frame_count
        );
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(row.as_bytes()));
        if let Err(err) = result {
            warn!(target: "balrog::aggregator", %err, path = %self.path.display(), "failed to append event CSV row");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_sink_appends_one_row_per_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");
        let sink = CsvEventSink::new(&path);

        let at = DateTime::parse_from_rfc3339("2024-01-02T03:04:05.678Z")
            .unwrap()
            .with_timezone(&Utc);
        sink.record(at, &Verdict::CatIncoming, 1);
        sink.record(at, &Verdict::Prey { avg: 12.5 }, 4);
        sink.record(at, &Verdict::NoPrey { avg: 45.0 }, 2);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "2024-01-02T03:04:05.678,cat_incoming,0,1");
        assert_eq!(lines[1], "2024-01-02T03:04:05.678,prey,12.5,4");
        assert_eq!(lines[2], "2024-01-02T03:04:05.678,no_prey,45,2");
    }

    #[test]
    fn csv_sink_creates_the_file_if_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("events.csv");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let sink = CsvEventSink::new(&path);

        sink.record(Utc::now(), &Verdict::DontKnow { avg: 0.0 }, 0);

        assert!(path.exists());
    }
}
