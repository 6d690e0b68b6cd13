//! Operational log sink
//!
//! Appends timestamped lines to date-keyed daily files, duplicates error
//! records into a parallel error log, and sweeps files past retention.
//! Every record is also mirrored as a tracing event.

use chrono::{Local, NaiveDate};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

const LOG_PREFIX: &str = "etl_load_";
const ERROR_PREFIX: &str = "etl_errors_";

/// Record severity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

/// Date-keyed append-only file sink
///
/// A new file begins at local-date rollover; there is no size-based
/// rotation. Lines are written with a single `write` call each, so
/// concurrent appenders never interleave partial lines.
pub struct LogSink {
    dir: PathBuf,
    retention_days: u32,
}

impl LogSink {
    pub fn new(dir: impl Into<PathBuf>, retention_days: u32) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "Could not create log directory");
        }
        Self {
            dir,
            retention_days,
        }
    }

    /// Append a record to today's log file
    ///
    /// Error records are additionally appended, with an `ERROR:` marker, to
    /// today's error log. Write failures are reported via tracing only; the
    /// sink never takes the process down.
    pub fn record(&self, level: LogLevel, message: &str) {
        let now = Local::now();
        let stamp = now.format("%Y-%m-%d %H:%M:%S");
        let date = now.date_naive();

        let line = format!("{} - {}\n", stamp, message);
        if let Err(e) = append_line(&self.log_path_for(date), &line) {
            warn!(error = %e, "Failed to append to log file");
        }

        if level == LogLevel::Error {
            let line = format!("{} - ERROR: {}\n", stamp, message);
            if let Err(e) = append_line(&self.error_path_for(date), &line) {
                warn!(error = %e, "Failed to append to error log file");
            }
        }

        match level {
            LogLevel::Info => info!("{}", message),
            LogLevel::Warning => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }
    }

    pub fn log_path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}{}.log", LOG_PREFIX, date.format("%Y%m%d")))
    }

    pub fn error_path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{}{}.log", ERROR_PREFIX, date.format("%Y%m%d")))
    }

    /// Delete log files whose filename date is older than the retention
    /// window. Files dated within the window (today included) are never
    /// touched. Deletion failures are ignored.
    pub fn sweep(&self) {
        let cutoff = Local::now().date_naive() - chrono::Duration::days(self.retention_days as i64);
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };

        let mut removed = 0usize;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(date) = file_date(name) else { continue };
            if date < cutoff {
                if std::fs::remove_file(entry.path()).is_ok() {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!(removed, retention_days = self.retention_days, "Swept expired log files");
        }
    }
}

/// Append one line with a single write call
fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())
}

/// Date encoded in a sink-owned filename, if any
fn file_date(name: &str) -> Option<NaiveDate> {
    let stem = name
        .strip_prefix(LOG_PREFIX)
        .or_else(|| name.strip_prefix(ERROR_PREFIX))?;
    let stem = stem.strip_suffix(".log")?;
    NaiveDate::parse_from_str(stem, "%Y%m%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn temp_sink(retention_days: u32) -> LogSink {
        let dir = std::env::temp_dir().join(format!("logsink-test-{}", uuid::Uuid::new_v4()));
        LogSink::new(dir, retention_days)
    }

    #[test]
    fn test_record_appends_timestamped_line() {
        let sink = temp_sink(7);
        sink.record(LogLevel::Info, "probe attempt 1/30");

        let today = Local::now().date_naive();
        let content = std::fs::read_to_string(sink.log_path_for(today)).unwrap();
        assert!(content.ends_with("- probe attempt 1/30\n"));
        // no error log for info records
        assert!(!sink.error_path_for(today).exists());
    }

    #[test]
    fn test_error_record_duplicated_to_error_log() {
        let sink = temp_sink(7);
        sink.record(LogLevel::Error, "database not ready");

        let today = Local::now().date_naive();
        let main = std::fs::read_to_string(sink.log_path_for(today)).unwrap();
        let errors = std::fs::read_to_string(sink.error_path_for(today)).unwrap();
        assert!(main.contains("- database not ready"));
        assert!(errors.contains("- ERROR: database not ready"));
    }

    #[test]
    fn test_sweep_respects_retention_window() {
        let sink = temp_sink(7);
        let today = Local::now().date_naive();

        sink.record(LogLevel::Info, "current");
        let recent = sink.log_path_for(today - Duration::days(6));
        let boundary = sink.log_path_for(today - Duration::days(7));
        let expired = sink.log_path_for(today - Duration::days(8));
        std::fs::write(&recent, "recent\n").unwrap();
        std::fs::write(&boundary, "boundary\n").unwrap();
        std::fs::write(&expired, "expired\n").unwrap();

        sink.sweep();
        // repeated sweeps must stay safe
        sink.sweep();

        assert!(sink.log_path_for(today).exists());
        assert!(recent.exists());
        assert!(boundary.exists());
        assert!(!expired.exists());
    }

    #[test]
    fn test_sweep_ignores_foreign_files() {
        let sink = temp_sink(7);
        let foreign = sink.log_path_for(Local::now().date_naive()).with_file_name("notes.txt");
        std::fs::write(&foreign, "keep me\n").unwrap();

        sink.sweep();
        assert!(foreign.exists());
    }

    #[test]
    fn test_file_date_parsing() {
        assert_eq!(
            file_date("etl_load_20260807.log"),
            NaiveDate::from_ymd_opt(2026, 8, 7)
        );
        assert_eq!(
            file_date("etl_errors_20260101.log"),
            NaiveDate::from_ymd_opt(2026, 1, 1)
        );
        assert_eq!(file_date("etl_load_garbage.log"), None);
        assert_eq!(file_date("unrelated.log"), None);
    }
}
