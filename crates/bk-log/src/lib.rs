//! bk-log
//!
//! Append-only billing log. One entry per billing event, each prefixed with
//! a timestamp header; the host UI renders the accumulated text verbatim.
//!
//! Two sinks: an in-memory buffer (the on-screen log) and an append-only
//! file (the persisted log). Formatting lives here so every sink renders
//! entries identically.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only consumer of rendered log entries.
pub trait LogSink: Send {
    /// Append one rendered entry. Entries may span multiple lines.
    fn append(&mut self, entry: &str) -> Result<()>;
}

/// Render one log entry: timestamp header followed by the message, e.g.
/// `<< Sep 4, 1:07:05pm >>` on the first line.
pub fn format_entry(ts: DateTime<Utc>, msg: &str) -> String {
    format!("<< {} >>\n{}", format_timestamp(ts), msg)
}

/// 12-hour `Mon D, H:MM:SSam/pm` timestamp used in entry headers.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%b %-d, %-I:%M:%S%P").to_string()
}

// ---------------------------------------------------------------------------
// Memory sink
// ---------------------------------------------------------------------------

/// In-memory sink backing the on-screen log.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    entries: Vec<String>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full log text, entries separated by blank lines. This is the payload
    /// the host hands to the clipboard.
    pub fn contents(&self) -> String {
        self.entries.join("\n\n")
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LogSink for MemoryLogSink {
    fn append(&mut self, entry: &str) -> Result<()> {
        self.entries.push(entry.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File sink
// ---------------------------------------------------------------------------

/// Append-only file sink: one entry block followed by a blank line, so the
/// persisted file reads the same as the on-screen buffer.
pub struct FileLogSink {
    path: PathBuf,
}

impl FileLogSink {
    /// Creates the sink and ensures parent dirs exist. The file itself is
    /// created lazily on first append.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn append(&mut self, entry: &str) -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open billing log {:?}", self.path))?;
        f.write_all(entry.as_bytes())
            .context("write billing log entry failed")?;
        f.write_all(b"\n\n").context("write entry separator failed")?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_renders_twelve_hour_clock() {
        let ts = Utc.with_ymd_and_hms(2020, 9, 4, 13, 7, 5).unwrap();
        assert_eq!(format_timestamp(ts), "Sep 4, 1:07:05pm");
    }

    #[test]
    fn timestamp_renders_morning_without_leading_zero() {
        let ts = Utc.with_ymd_and_hms(2020, 1, 31, 9, 30, 0).unwrap();
        assert_eq!(format_timestamp(ts), "Jan 31, 9:30:00am");
    }

    #[test]
    fn entry_carries_header_and_message() {
        let ts = Utc.with_ymd_and_hms(2020, 9, 4, 13, 7, 5).unwrap();
        let entry = format_entry(ts, "Connection: true");
        assert_eq!(entry, "<< Sep 4, 1:07:05pm >>\nConnection: true");
    }

    #[test]
    fn memory_sink_appends_and_clears() {
        let mut sink = MemoryLogSink::new();
        sink.append("first").unwrap();
        sink.append("second").unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.contents(), "first\n\nsecond");

        sink.clear();
        assert!(sink.is_empty());
        assert_eq!(sink.contents(), "");
    }

    #[test]
    fn file_sink_appends_entry_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("billing.log");

        let mut sink = FileLogSink::new(&path).unwrap();
        sink.append("one").unwrap();
        sink.append("two\nlines").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "one\n\ntwo\nlines\n\n");
    }

    #[test]
    fn file_sink_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("billing.log");
        let mut sink = FileLogSink::new(&path).unwrap();
        sink.append("entry").unwrap();
        assert!(path.exists());
    }
}
