//! ReportingClient — delivers a buffered batch to the server.
//!
//! The batch is encoded once as a gzip-compressed JSON array and posted to
//! `/updates/` over a fresh HTTP/1 connection per attempt. Only timeouts
//! are retried, with a doubling delay; every other failure ends the send at
//! once.

use std::io::{Read, Write};
use std::time::Duration;

use bytes::Bytes;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use http::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use meter_core::{AgentConfig, Metric, MetricPayload};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{ReportError, ReportResult};

const UPDATES_PATH: &str = "/updates/";

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Delay after the `attempt`-th failure: base, 2×base, 4×base, … capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1))
    }
}

/// Encode a batch as gzip-compressed JSON.
pub fn encode_batch(metrics: &[Metric]) -> ReportResult<Bytes> {
    let payloads: Vec<MetricPayload> = metrics.iter().cloned().map(MetricPayload::from).collect();
    let json = serde_json::to_vec(&payloads).map_err(|e| ReportError::Encode(e.to_string()))?;

    let mut encoder = GzEncoder::new(Vec::with_capacity(json.len() / 4), Compression::default());
    encoder
        .write_all(&json)
        .map_err(|e| ReportError::Encode(e.to_string()))?;
    let compressed = encoder
        .finish()
        .map_err(|e| ReportError::Encode(e.to_string()))?;
    Ok(Bytes::from(compressed))
}

/// Strip an optional `http://` scheme and trailing slash, leaving `host:port`.
fn parse_authority(address: &str) -> ReportResult<String> {
    if address.starts_with("https://") {
        return Err(ReportError::Request(format!(
            "{address}: only plain http is supported"
        )));
    }
    let authority = address
        .strip_prefix("http://")
        .unwrap_or(address)
        .trim_end_matches('/');
    if authority.is_empty() || authority.contains('/') {
        return Err(ReportError::Request(format!(
            "{address}: expected host:port"
        )));
    }
    Ok(authority.to_string())
}

fn response_text(raw: &[u8], gzipped: bool) -> String {
    if gzipped {
        let mut text = String::new();
        if GzDecoder::new(raw).read_to_string(&mut text).is_ok() {
            return text;
        }
    }
    String::from_utf8_lossy(raw).into_owned()
}

#[derive(Debug, Clone)]
pub struct ReportingClient {
    authority: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ReportingClient {
    pub fn new(address: &str, timeout: Duration, retry: RetryPolicy) -> ReportResult<Self> {
        Ok(Self {
            authority: parse_authority(address)?,
            timeout,
            retry,
        })
    }

    pub fn from_config(config: &AgentConfig) -> ReportResult<Self> {
        Self::new(
            &config.address,
            Duration::from_millis(config.request_timeout_ms),
            RetryPolicy::new(config.max_attempts, Duration::from_millis(config.retry_delay_ms)),
        )
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Deliver `metrics` as one request. Returns the number of attempts used.
    pub async fn report(&self, metrics: &[Metric]) -> ReportResult<u32> {
        let body = encode_batch(metrics)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            debug!(attempt, bytes = body.len(), metrics = metrics.len(), "sending batch");
            match self.send_once(body.clone(), attempt).await {
                Ok(()) => return Ok(attempt),
                Err(e) if e.is_retryable() => {
                    if attempt >= self.retry.max_attempts {
                        return Err(ReportError::Exhausted {
                            attempts: attempt,
                            last: e.to_string(),
                        });
                    }
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "send failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, body: Bytes, attempt: u32) -> ReportResult<()> {
        match tokio::time::timeout(self.timeout, self.exchange(body, attempt)).await {
            Ok(result) => result,
            Err(_) => Err(ReportError::Timeout { attempt }),
        }
    }

    async fn exchange(&self, body: Bytes, attempt: u32) -> ReportResult<()> {
        let stream = TcpStream::connect(&self.authority).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                ReportError::Timeout { attempt }
            } else {
                ReportError::Transport(format!("connect {}: {e}", self.authority))
            }
        })?;

        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ReportError::Transport(format!("handshake: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "connection closed with error");
            }
        });

        let req = Request::builder()
            .method(Method::POST)
            .uri(UPDATES_PATH)
            .header(HOST, self.authority.as_str())
            .header(USER_AGENT, "meter-agent/0.1")
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .header(ACCEPT_ENCODING, "gzip")
            .body(Full::new(body))
            .map_err(|e| ReportError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| ReportError::Transport(format!("request: {e}")))?;

        let status = resp.status();
        let gzipped = resp
            .headers()
            .get(CONTENT_ENCODING)
            .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"gzip"));
        let raw = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| ReportError::Transport(format!("response body: {e}")))?
            .to_bytes();

        if status.is_success() {
            Ok(())
        } else {
            Err(ReportError::Status {
                status: status.as_u16(),
                body: response_text(&raw, gzipped),
            })
        }
    }
}
