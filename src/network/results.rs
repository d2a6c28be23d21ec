//! Match Results
//!
//! Where finished matches are recorded. The arbiter hands every report to
//! one [`ResultSink`] exactly once, right after the match reaches game over.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::game::report::MatchReport;

/// Errors from recording a report.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Report could not be serialized.
    #[error("serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Output could not be written.
    #[error("write {path}: {source}")]
    Io {
        /// Output file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The writer thread has stopped.
    #[error("result writer stopped")]
    Closed,
}

/// Consumer of finished match reports.
pub trait ResultSink: Send + Sync {
    /// Record one finished match. Called while the session is locked, so
    /// implementations must not block on I/O.
    fn record(&self, report: &MatchReport) -> Result<(), SinkError>;
}

/// Writes a summary line to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn record(&self, report: &MatchReport) -> Result<(), SinkError> {
        let scores: Vec<String> = report.players.iter()
            .map(|p| format!("{}={}", p.player_id.short(), p.score))
            .collect();
        info!(
            session = %report.session_id,
            match_type = report.match_type.as_str(),
            outcome = report.outcome.label(),
            rounds = report.rounds.len(),
            duration_secs = report.duration_secs(),
            "match result: {}",
            scores.join(" ")
        );
        Ok(())
    }
}

/// Appends each report as one JSON line.
///
/// Lines are written and flushed by a dedicated thread; dropping the sink
/// waits for queued lines to reach the file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    tx: Option<mpsc::UnboundedSender<String>>,
    writer: Option<JoinHandle<()>>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SinkError::Io { path: path.clone(), source })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let writer_path = path.clone();
        let writer = std::thread::Builder::new()
            .name("results-writer".into())
            .spawn(move || write_lines(writer_path, file, rx))
            .map_err(|source| SinkError::Io { path: path.clone(), source })?;

        Ok(Self {
            path,
            tx: Some(tx),
            writer: Some(writer),
        })
    }

    /// Output file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn write_lines(path: PathBuf, mut file: File, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.blocking_recv() {
        if let Err(e) = writeln!(file, "{}", line).and_then(|_| file.flush()) {
            error!(path = %path.display(), "failed to write result: {}", e);
        }
    }
}

impl ResultSink for JsonLinesSink {
    fn record(&self, report: &MatchReport) -> Result<(), SinkError> {
        let line = report.to_json_line()?;
        let tx = self.tx.as_ref().ok_or(SinkError::Closed)?;
        tx.send(line).map_err(|_| SinkError::Closed)
    }
}

impl Drop for JsonLinesSink {
    fn drop(&mut self) {
        // Closing the channel ends the writer once the queue is drained
        self.tx = None;
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                error!(path = %self.path.display(), "result writer panicked");
            }
        }
    }
}
