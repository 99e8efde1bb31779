// ABOUTME: Tracing subscriber setup with a per-session error log file
// ABOUTME: Also provides the file-backed transcript of accepted inbound messages

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use switchboard_core::Transcript;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Keeps the non-blocking log writers flushing; hold until shutdown
pub struct LogGuards {
    _error_log: WorkerGuard,
}

pub fn error_log_path(log_dir: &Path, name: &str) -> PathBuf {
    log_dir.join(format!("error_log_{}.log", name))
}

pub fn transcript_path(log_dir: &Path, name: &str) -> PathBuf {
    log_dir.join(format!("text_log_{}.log", name))
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Install the global subscriber: console output filtered by `RUST_LOG`
/// (default `info`) plus ERROR events appended to `error_log_<name>.log`.
pub fn init(name: &str, log_dir: &Path) -> Result<LogGuards> {
    let file = open_append(&error_log_path(log_dir, name))?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    let console_layer = fmt::layer()
        .with_target(true)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()));

    let error_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::LevelFilter::ERROR);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(error_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(LogGuards { _error_log: guard })
}

pub fn format_transcript_line(timestamp: &str, channel: &str, user: &str, text: &str) -> String {
    format!("{} - #{} | {}: {}\n", timestamp, channel, user, text)
}

/// Appends every accepted inbound message to a text log
pub struct FileTranscript {
    writer: NonBlocking,
    _guard: WorkerGuard,
}

impl FileTranscript {
    pub fn open(path: &Path) -> Result<Self> {
        let file = open_append(path)?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        Ok(Self {
            writer,
            _guard: guard,
        })
    }
}

impl Transcript for FileTranscript {
    fn record(&mut self, channel: &str, user: &str, text: &str) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let line = format_transcript_line(&timestamp, channel, user, text);
        if let Err(e) = self.writer.write_all(line.as_bytes()) {
            tracing::warn!(error = %e, "Failed to write transcript line");
        }
    }
}
