//! Remote delegation: POST a context/prompt pair to the compression service.
//!
//! This is the only stage with network I/O. It never fails a request: every
//! transport error, non-2xx status and timeout is turned into a
//! [`StageError::Delegation`] and the caller moves on to its local fallback.
//! There is no retry; the request timeout bounds the whole attempt.
//!
//! The response body is returned as an opaque [`serde_json::Value`]. Making
//! sense of it is [`crate::pipeline::extract`]'s job.

use crate::config::CompressionConfig;
use crate::error::{CompressError, StageError};
use crate::prompts::{truncate_chars, PROBE_CONTEXT, PROBE_PROMPT, RATE_AUTO};
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Characters of a response body kept in logs and error details.
const LOG_SNIPPET_CHARS: usize = 300;

/// JSON body of a compression request.
#[derive(Debug, Serialize)]
struct RemoteRequest<'a> {
    context: &'a str,
    prompt: &'a str,
    scaledown: RateOptions<'a>,
}

#[derive(Debug, Serialize)]
struct RateOptions<'a> {
    rate: &'a str,
}

/// A successful (2xx) remote response.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponseEnvelope {
    pub status: u16,
    /// Decoded JSON, or `Value::String` holding the raw text when the body
    /// was not JSON.
    pub body: Value,
}

/// HTTP client for the remote compression endpoint.
///
/// Cheap to share behind an `Arc`; the underlying `reqwest::Client` pools
/// connections.
pub struct RemoteClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout_secs: u64,
    first_response_logged: AtomicBool,
}

impl fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RemoteClient {
    /// Client for compression calls, using `config.request_timeout_secs`.
    ///
    /// Fails with [`CompressError::InvalidConfig`] when no API key is set.
    pub fn new(config: &CompressionConfig) -> Result<Self, CompressError> {
        Self::with_timeout(config, config.request_timeout_secs)
    }

    /// Client with an explicit timeout (the health probe uses a shorter one).
    pub fn with_timeout(config: &CompressionConfig, timeout_secs: u64) -> Result<Self, CompressError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CompressError::InvalidConfig("remote delegation requires an API key".into()))?
            .to_string();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| CompressError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key,
            timeout_secs,
            first_response_logged: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send one compression request.
    pub async fn delegate(
        &self,
        context: &str,
        prompt: &str,
    ) -> Result<RemoteResponseEnvelope, StageError> {
        debug!(
            endpoint = %self.endpoint,
            prompt_len = prompt.len(),
            "Delegating to remote compression service"
        );

        match self.send(context, prompt).await {
            Ok(envelope) => {
                if !self.first_response_logged.swap(true, Ordering::Relaxed) {
                    info!(
                        status = envelope.status,
                        body = %snippet(&envelope.body.to_string()),
                        "First remote response"
                    );
                }
                Ok(envelope)
            }
            Err(e) => {
                warn!("Remote delegation failed: {}", e);
                Err(e)
            }
        }
    }

    async fn send(&self, context: &str, prompt: &str) -> Result<RemoteResponseEnvelope, StageError> {
        let body = RemoteRequest {
            context,
            prompt,
            scaledown: RateOptions { rate: RATE_AUTO },
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StageError::from_transport(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StageError::from_transport(&e))?;

        if !status.is_success() {
            return Err(StageError::Delegation {
                status: Some(status.as_u16()),
                timed_out: false,
                detail: snippet(&text).to_string(),
            });
        }

        let body = match serde_json::from_str::<Value>(&text) {
            Ok(v) => v,
            Err(_) => Value::String(text),
        };
        Ok(RemoteResponseEnvelope {
            status: status.as_u16(),
            body,
        })
    }
}

fn snippet(s: &str) -> &str {
    truncate_chars(s, LOG_SNIPPET_CHARS)
}

// ── Health probe ─────────────────────────────────────────────────────────

/// Result of the start-up health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// The endpoint accepted the key.
    Connected,
    /// HTTP 403: the API key was rejected.
    InvalidCredential,
    /// HTTP 404: nothing is listening at the configured path.
    WrongEndpoint,
    /// Any other status, a transport error or a timeout.
    Unreachable { status: Option<u16>, detail: String },
    /// No API key or delegation switched off; the probe was not sent.
    NotConfigured,
}

impl ConnectionStatus {
    /// `true` when the endpoint is known to be misconfigured, so further
    /// delegation attempts would only add latency.
    pub fn is_misconfigured(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::InvalidCredential | ConnectionStatus::WrongEndpoint
        )
    }

    fn from_status(status: StatusCode, body: &str) -> Self {
        match status {
            s if s.is_success() => ConnectionStatus::Connected,
            StatusCode::FORBIDDEN => ConnectionStatus::InvalidCredential,
            StatusCode::NOT_FOUND => ConnectionStatus::WrongEndpoint,
            s => ConnectionStatus::Unreachable {
                status: Some(s.as_u16()),
                detail: snippet(body).to_string(),
            },
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connected => f.write_str("connected"),
            ConnectionStatus::InvalidCredential => f.write_str("invalid API key (HTTP 403)"),
            ConnectionStatus::WrongEndpoint => f.write_str("endpoint not found (HTTP 404)"),
            ConnectionStatus::Unreachable {
                status: Some(code),
                detail,
            } => write!(f, "unreachable (HTTP {code}): {detail}"),
            ConnectionStatus::Unreachable { status: None, detail } => {
                write!(f, "unreachable: {detail}")
            }
            ConnectionStatus::NotConfigured => f.write_str("not configured"),
        }
    }
}

/// Send a `ping` to the endpoint and classify the answer.
///
/// Uses `config.probe_timeout_secs`. Never fails: errors are folded into
/// [`ConnectionStatus::Unreachable`].
pub async fn probe(config: &CompressionConfig) -> ConnectionStatus {
    if !config.delegation_configured() {
        info!("Remote compression not configured; running offline");
        return ConnectionStatus::NotConfigured;
    }
    let client = match RemoteClient::with_timeout(config, config.probe_timeout_secs) {
        Ok(c) => c,
        Err(e) => {
            return ConnectionStatus::Unreachable {
                status: None,
                detail: e.to_string(),
            }
        }
    };

    let body = RemoteRequest {
        context: PROBE_CONTEXT,
        prompt: PROBE_PROMPT,
        scaledown: RateOptions { rate: RATE_AUTO },
    };
    let sent = client
        .http
        .post(&client.endpoint)
        .header(API_KEY_HEADER, &client.api_key)
        .json(&body)
        .send()
        .await;

    let status = match sent {
        Ok(response) => {
            let code = response.status();
            let text = response.text().await.unwrap_or_default();
            ConnectionStatus::from_status(code, &text)
        }
        Err(e) => ConnectionStatus::Unreachable {
            status: e.status().map(|s| s.as_u16()),
            detail: if e.is_timeout() {
                format!("timed out after {}s", config.probe_timeout_secs)
            } else {
                e.to_string()
            },
        },
    };

    match &status {
        ConnectionStatus::Connected => info!(endpoint = %config.endpoint, "Remote compression connected"),
        other => warn!(endpoint = %config.endpoint, "Remote compression probe: {}", other),
    }
    status
}
