//! Push gateways: where device notifications are actually sent.

use std::time::Duration;

use {
    async_trait::async_trait,
    reqwest::StatusCode,
    secrecy::{ExposeSecret, Secret},
    serde::Serialize,
    tracing::{debug, info},
};

use crate::{error::PushError, payload::PushPayload};

#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Send one notification to one device token.
    async fn send(&self, token: &str, payload: &PushPayload) -> Result<(), PushError>;
}

// ── Wire format ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    token: &'a str,
    data: &'a PushPayload,
    android: AndroidConfig,
    apns: ApnsConfig<'a>,
}

#[derive(Debug, Serialize)]
struct AndroidConfig {
    priority: &'static str,
}

#[derive(Debug, Serialize)]
struct ApnsConfig<'a> {
    payload: ApnsPayload<'a>,
}

#[derive(Debug, Serialize)]
struct ApnsPayload<'a> {
    aps: Aps<'a>,
}

#[derive(Debug, Serialize)]
struct Aps<'a> {
    alert: ApsAlert<'a>,
    sound: &'static str,
    #[serde(rename = "thread-id")]
    thread_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ApsAlert<'a> {
    title: &'a str,
    body: &'a str,
}

impl<'a> SendRequest<'a> {
    fn new(token: &'a str, payload: &'a PushPayload) -> Self {
        Self {
            token,
            data: payload,
            android: AndroidConfig { priority: "high" },
            apns: ApnsConfig {
                payload: ApnsPayload {
                    aps: Aps {
                        alert: ApsAlert {
                            title: &payload.title,
                            body: &payload.body,
                        },
                        sound: "default",
                        thread_id: &payload.tag,
                    },
                },
            },
        }
    }
}

// ── HTTP relay ──────────────────────────────────────────────────────────────

/// Posts notifications as JSON to a push relay that speaks FCM-style errors.
pub struct HttpPushGateway {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<Secret<String>>,
}

impl HttpPushGateway {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<&str>,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.map(|k| Secret::new(k.to_owned())),
        })
    }
}

#[async_trait]
impl PushGateway for HttpPushGateway {
    async fn send(&self, token: &str, payload: &PushPayload) -> Result<(), PushError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&SendRequest::new(token, payload));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                PushError::Timeout
            } else if e.is_connect() {
                PushError::internal(e.to_string())
            } else {
                PushError::other(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), body = %body, "push relay rejected send");
        Err(classify_response(status, &body))
    }
}

/// Map an error response onto a [`PushError`]. The FCM error code in the body
/// wins over the HTTP status.
pub fn classify_response(status: StatusCode, body: &str) -> PushError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));
    let message = error
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or(status.as_str())
        .to_owned();
    let detail_code = error
        .and_then(|e| e.get("details"))
        .and_then(|d| d.as_array())
        .and_then(|details| {
            details
                .iter()
                .find_map(|d| d.get("errorCode").and_then(|c| c.as_str()))
        });
    let code = detail_code.or_else(|| error.and_then(|e| e.get("status")).and_then(|s| s.as_str()));

    match code {
        Some("UNREGISTERED" | "NOT_FOUND") => PushError::NotRegistered,
        Some("INVALID_ARGUMENT") => PushError::InvalidArgument(message),
        Some("INTERNAL" | "UNAVAILABLE") => PushError::Internal(message),
        Some(other) => PushError::Other(format!("{other}: {message}")),
        None => match status {
            StatusCode::NOT_FOUND | StatusCode::GONE => PushError::NotRegistered,
            StatusCode::BAD_REQUEST => PushError::InvalidArgument(message),
            s if s.is_server_error() => PushError::Internal(message),
            _ => PushError::Other(message),
        },
    }
}

// ── Dry run ─────────────────────────────────────────────────────────────────

/// Logs every notification and reports success.
#[derive(Debug, Default)]
pub struct DryRunGateway;

#[async_trait]
impl PushGateway for DryRunGateway {
    async fn send(&self, token: &str, payload: &PushPayload) -> Result<(), PushError> {
        info!(
            token = %token_hint(token),
            title = %payload.title,
            body = %payload.body,
            path = %payload.path,
            "dry-run push notification"
        );
        Ok(())
    }
}

/// Enough of a device token to tell devices apart in logs.
fn token_hint(token: &str) -> String {
    const SHOWN: usize = 6;
    if token.chars().count() <= SHOWN * 2 {
        return "***".into();
    }
    let head: String = token.chars().take(SHOWN).collect();
    format!("{head}...")
}
