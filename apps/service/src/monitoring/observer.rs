//! Sinks for probe outcomes.
//!
//! Observers are passive: `record` is called once per completed probe, its
//! result is never inspected and it must not block for long.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};

use chrono::Local;
use tracing::{info, warn};

use super::types::CheckOutcome;

pub trait CheckObserver: Send + Sync {
    fn record(&self, outcome: &CheckOutcome);
}

/// Appends one line per outcome to `checks_YYYY-MM-DD.log` and mirrors it as
/// a tracing event.
///
/// File I/O happens on a dedicated writer thread, so `record` never blocks
/// the async runtime on the filesystem. Dropping the log drains pending
/// lines and joins the writer.
pub struct FileCheckLog {
    path: PathBuf,
    sender: Option<Sender<WriterCommand>>,
    writer: Option<JoinHandle<()>>,
}

enum WriterCommand {
    Line(String),
    Flush(SyncSender<()>),
}

impl FileCheckLog {
    /// Open (or create) today's log file under `dir`.
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(format!("checks_{}.log", Local::now().format("%Y-%m-%d")));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let (sender, receiver) = mpsc::channel();
        let writer_path = path.clone();
        let writer = thread::Builder::new()
            .name("check-log".into())
            .spawn(move || write_lines(&writer_path, file, receiver))?;

        Ok(Self { path, sender: Some(sender), writer: Some(writer) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until every line recorded so far is on disk.
    pub fn flush(&self) {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if self.send(WriterCommand::Flush(ack_tx)) {
            let _ = ack_rx.recv();
        }
    }

    fn send(&self, command: WriterCommand) -> bool {
        let sent = self.sender.as_ref().is_some_and(|sender| sender.send(command).is_ok());
        if !sent {
            warn!(path = %self.path.display(), "Check log writer has stopped");
        }
        sent
    }
}

impl CheckObserver for FileCheckLog {
    fn record(&self, outcome: &CheckOutcome) {
        emit_event(outcome);
        self.send(WriterCommand::Line(format_line(outcome)));
    }
}

impl Drop for FileCheckLog {
    fn drop(&mut self) {
        // closing the channel ends the writer loop once it has drained
        self.sender.take();
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
    }
}

fn write_lines(path: &Path, file: File, commands: Receiver<WriterCommand>) {
    let mut file = BufWriter::new(file);
    while let Ok(command) = commands.recv() {
        let result = match command {
            WriterCommand::Line(line) => writeln!(file, "{line}").and_then(|()| file.flush()),
            WriterCommand::Flush(ack) => {
                let result = file.flush();
                let _ = ack.send(());
                result
            }
        };
        if let Err(e) = result {
            warn!(path = %path.display(), "Failed to write check log: {}", e);
        }
    }
}

fn emit_event(outcome: &CheckOutcome) {
    let latency_ms = outcome.latency.as_millis() as u64;
    match &outcome.error {
        None => info!(
            monitor_id = %outcome.monitor_id,
            url = %outcome.url,
            status_code = outcome.status_code,
            latency_ms,
            "Check completed"
        ),
        Some(error) => warn!(
            monitor_id = %outcome.monitor_id,
            url = %outcome.url,
            latency_ms,
            error = %error,
            "Check failed"
        ),
    }
}

fn format_line(outcome: &CheckOutcome) -> String {
    let timestamp = outcome.checked_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
    match &outcome.error {
        None => format!(
            "[{}] [{}] {} - Status: {}, Time: {}ms",
            timestamp,
            outcome.monitor_id,
            outcome.url,
            outcome.status_code,
            outcome.latency.as_millis()
        ),
        Some(error) => {
            format!("[{}] [{}] {} - ERROR: {}", timestamp, outcome.monitor_id, outcome.url, error)
        }
    }
}
