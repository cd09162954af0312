//! Shared helpers for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::monitoring::checker::{CheckError, Checker};
use crate::monitoring::observer::CheckObserver;
use crate::monitoring::types::CheckOutcome;

/// Serve `status` with an empty body to every connection. Returns the base URL.
pub async fn serve_status(status: u16) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {status} Test\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{addr}/")
}

/// Accept connections but never answer.
pub async fn serve_silence() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("http://{addr}/")
}

/// A local URL nothing listens on.
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}

/// Observer that keeps every outcome.
#[derive(Default)]
pub struct RecordingObserver {
    outcomes: Mutex<Vec<CheckOutcome>>,
}

impl RecordingObserver {
    pub fn outcomes(&self) -> Vec<CheckOutcome> {
        self.outcomes.lock().unwrap().clone()
    }
}

impl CheckObserver for RecordingObserver {
    fn record(&self, outcome: &CheckOutcome) {
        self.outcomes.lock().unwrap().push(outcome.clone());
    }
}

/// Checker with a fixed answer that counts calls and concurrency.
pub struct ScriptedChecker {
    status: Option<u16>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    targets: Mutex<Vec<String>>,
}

impl ScriptedChecker {
    pub fn status(status: u16) -> Self {
        Self::new(Some(status))
    }

    pub fn failing() -> Self {
        Self::new(None)
    }

    fn new(status: Option<u16>) -> Self {
        Self {
            status,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            targets: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Checker for ScriptedChecker {
    async fn check(&self, target: &str) -> Result<u16, CheckError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(target.to_string());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.status.ok_or_else(|| CheckError::Connect("connection refused".into()))
    }
}
