use std::time::Duration;

use thiserror::Error;

/// Why a probe produced no response. Recorded in the outcome, never retried.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP request failed: {0}")]
    Request(String),
}

/// One outbound liveness check.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform the check and return the response status code. Any status
    /// code, including 4xx and 5xx, is a successful check.
    async fn check(&self, target: &str) -> Result<u16, CheckError>;
}

/// HTTP GET checker with a fixed client-level timeout
pub struct HttpChecker {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpChecker {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("urlwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, timeout })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &str) -> Result<u16, CheckError> {
        let response = self.client.get(target).send().await.map_err(|e| {
            if e.is_timeout() {
                CheckError::Timeout(self.timeout)
            } else if e.is_connect() {
                CheckError::Connect(error_chain(&e))
            } else {
                CheckError::Request(error_chain(&e))
            }
        })?;

        Ok(response.status().as_u16())
    }
}

/// reqwest's top-level message hides the interesting part (DNS, refused,
/// TLS), so flatten the source chain.
fn error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
