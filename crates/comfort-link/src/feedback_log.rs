//! Append-only persistence for feedback-button events
//!
//! Every `USER_FEEDBACK` frame is recorded as one CSV row so a later
//! retraining pass can fold real user reactions back into the datasets.
//! Writes go through a trait seam so tests and alternative stores can
//! swap in their own sink.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::codec::FeedbackFrame;

const HEADER: &str = "timestamp,temperature,humidity,feeling";

/// Error type for feedback persistence
#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error("feedback log i/o failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for feedback persistence
pub type FeedbackResult<T> = Result<T, FeedbackError>;

/// One persisted feedback record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackEntry {
    pub recorded_at: DateTime<Utc>,
    pub temperature: f64,
    pub humidity: f64,
    pub feeling: String,
}

impl FeedbackEntry {
    /// Stamp a decoded frame with the current time
    pub fn from_frame(frame: &FeedbackFrame) -> Self {
        Self {
            recorded_at: Utc::now(),
            temperature: frame.temperature,
            humidity: frame.humidity,
            feeling: frame.feeling.clone(),
        }
    }
}

/// Destination for feedback records
pub trait FeedbackSink: Send + Sync {
    fn record(&self, entry: &FeedbackEntry) -> FeedbackResult<()>;
}

/// CSV-file sink, one row per record
///
/// The header row is written once when the file is created; every record
/// is appended and flushed immediately so a crash loses at most the row
/// being written.
pub struct FeedbackLog {
    path: PathBuf,
}

impl FeedbackLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every record in the log, oldest first.
    ///
    /// A missing file reads as empty. Rows that fail to parse are skipped;
    /// the log is append-only and a torn final row is expected after a
    /// crash.
    pub fn read_all(&self) -> FeedbackResult<Vec<FeedbackEntry>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| self.io_error(e))?;
            if line.is_empty() || line == HEADER {
                continue;
            }
            match parse_row(&line) {
                Some(entry) => entries.push(entry),
                None => debug!(row = %line, "Skipping unparseable feedback row"),
            }
        }
        Ok(entries)
    }

    fn io_error(&self, source: std::io::Error) -> FeedbackError {
        FeedbackError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl FeedbackSink for FeedbackLog {
    fn record(&self, entry: &FeedbackEntry) -> FeedbackResult<()> {
        let fresh = !self.path.exists();

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        if fresh {
            writeln!(file, "{HEADER}").map_err(|e| self.io_error(e))?;
        }

        writeln!(
            file,
            "{},{},{},{}",
            entry.recorded_at.to_rfc3339(),
            entry.temperature,
            entry.humidity,
            entry.feeling
        )
        .map_err(|e| self.io_error(e))?;
        file.flush().map_err(|e| self.io_error(e))?;

        info!(
            feeling = %entry.feeling,
            temperature = entry.temperature,
            humidity = entry.humidity,
            "Feedback recorded"
        );
        Ok(())
    }
}

fn parse_row(row: &str) -> Option<FeedbackEntry> {
    let mut fields = row.splitn(4, ',');
    let recorded_at = DateTime::parse_from_rfc3339(fields.next()?)
        .ok()?
        .with_timezone(&Utc);
    let temperature = fields.next()?.parse().ok()?;
    let humidity = fields.next()?.parse().ok()?;
    let feeling = fields.next()?.to_string();

    Some(FeedbackEntry {
        recorded_at,
        temperature,
        humidity,
        feeling,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(feeling: &str) -> FeedbackEntry {
        FeedbackEntry {
            recorded_at: Utc::now(),
            temperature: 23.4,
            humidity: 51.0,
            feeling: feeling.to_string(),
        }
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempdir().unwrap();
        let log = FeedbackLog::new(dir.path().join("feedback.csv"));

        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn test_records_round_trip_in_order() {
        let dir = tempdir().unwrap();
        let log = FeedbackLog::new(dir.path().join("feedback.csv"));

        log.record(&entry("hot")).unwrap();
        log.record(&entry("comfortable")).unwrap();

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].feeling, "hot");
        assert_eq!(entries[1].feeling, "comfortable");
        assert_eq!(entries[0].temperature, 23.4);
    }

    #[test]
    fn test_header_is_written_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feedback.csv");
        let log = FeedbackLog::new(&path);

        log.record(&entry("hot")).unwrap();
        log.record(&entry("cold")).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches(HEADER).count(), 1);
        assert!(text.starts_with(HEADER));
    }

    #[test]
    fn test_torn_row_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feedback.csv");
        let log = FeedbackLog::new(&path);

        log.record(&entry("hot")).unwrap();
        // Simulate a crash mid-write.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "2026-01-01T00:00:00Z,21.0").unwrap();
        drop(file);

        let entries = log.read_all().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].feeling, "hot");
    }
}
