//! Instagram API client used for login, outbound sends, and the realtime
//! event subscription.

use std::{sync::Mutex, time::Duration};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::events::{Credentials, InboundComment, InboundMessage, LinkEvent};

#[derive(Debug, Error)]
/// Failure modes of the platform boundary.
pub enum TransportError {
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    #[error("persisted session failed validation")]
    SessionInvalid,
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("platform returned status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("realtime connection error: {0}")]
    Realtime(String),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

#[async_trait]
/// Outbound half of the platform boundary, the only part the dispatcher sees.
pub trait OutboundSender: Send + Sync {
    async fn send_direct_message(&self, thread_id: &str, text: &str)
        -> Result<(), TransportError>;
    async fn reply_to_comment(
        &self,
        media_id: &str,
        comment_id: &str,
        text: &str,
    ) -> Result<(), TransportError>;
}

#[async_trait]
/// Full platform boundary consumed by the connection supervisor.
pub trait PlatformTransport: OutboundSender {
    /// Fresh login; returns the opaque session payload to persist.
    async fn login(&self, credentials: &Credentials) -> Result<Value, TransportError>;
    /// Adopts a persisted session and validates it with a live call.
    async fn restore_session(&self, session: &Value) -> Result<(), TransportError>;
    /// Opens the realtime subscription; events arrive on the returned channel
    /// until an error or disconnect terminates it.
    async fn subscribe(&self) -> Result<mpsc::Receiver<LinkEvent>, TransportError>;
    /// Best-effort teardown of the realtime session.
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
/// Connection settings for the Instagram private API.
pub struct InstagramApiConfig {
    pub api_base: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub event_channel_capacity: usize,
}

impl Default for InstagramApiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://i.instagram.com/api/v1".to_string(),
            request_timeout_ms: 15_000,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
            event_channel_capacity: 256,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    status: String,
    #[serde(default)]
    session: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CurrentUserResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
struct RealtimeConnectResponse {
    status: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RealtimeEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    payload: Value,
}

/// HTTP + websocket client for the Instagram private API.
pub struct InstagramApiClient {
    http: reqwest::Client,
    config: InstagramApiConfig,
    session_token: Mutex<Option<String>>,
}

impl InstagramApiClient {
    pub fn new(config: InstagramApiConfig) -> Result<Self, TransportError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("Arta-tax-bot"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self {
            http,
            config,
            session_token: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.api_base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn current_token(&self) -> Result<String, TransportError> {
        self.session_token
            .lock()
            .ok()
            .and_then(|token| token.clone())
            .ok_or(TransportError::NotAuthenticated)
    }

    fn adopt_token(&self, token: String) {
        if let Ok(mut guard) = self.session_token.lock() {
            *guard = Some(token);
        }
    }

    fn drop_token(&self) {
        if let Ok(mut guard) = self.session_token.lock() {
            *guard = None;
        }
    }

    async fn request_json<T, F>(&self, operation: &str, mut builder: F) -> Result<T, TransportError>
    where
        T: serde::de::DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = builder().send().await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<T>().await.map_err(|error| {
                            TransportError::InvalidPayload(format!(
                                "failed to decode {operation}: {error}"
                            ))
                        });
                    }
                    if attempt < self.config.retry_max_attempts.max(1)
                        && is_retryable_status(status.as_u16())
                    {
                        let delay = retry_delay(self.config.retry_base_delay_ms, attempt);
                        tracing::warn!(
                            operation,
                            attempt,
                            status = status.as_u16(),
                            "platform call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    let body = response.text().await.unwrap_or_default();
                    return Err(TransportError::HttpStatus {
                        status: status.as_u16(),
                        body: truncate_for_error(&body, 320),
                    });
                }
                Err(error) => {
                    if attempt < self.config.retry_max_attempts.max(1)
                        && is_retryable_transport_error(&error)
                    {
                        let delay = retry_delay(self.config.retry_base_delay_ms, attempt);
                        tracing::warn!(operation, attempt, error = %error, "transport error, retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(TransportError::Http(error));
                }
            }
        }
    }
}

#[async_trait]
impl OutboundSender for InstagramApiClient {
    async fn send_direct_message(
        &self,
        thread_id: &str,
        text: &str,
    ) -> Result<(), TransportError> {
        let token = self.current_token()?;
        let url = self.endpoint(&format!("direct_v2/threads/{thread_id}/broadcast_text"));
        let payload = json!({ "text": text });
        let response: Value = self
            .request_json("direct send", || {
                self.http
                    .post(&url)
                    .bearer_auth(&token)
                    .json(&payload)
            })
            .await?;
        ensure_ok_status(&response, "direct send")
    }

    async fn reply_to_comment(
        &self,
        media_id: &str,
        comment_id: &str,
        text: &str,
    ) -> Result<(), TransportError> {
        let token = self.current_token()?;
        let url = self.endpoint(&format!("media/{media_id}/comment"));
        let payload = json!({ "text": text, "replied_to_comment_id": comment_id });
        let response: Value = self
            .request_json("comment reply", || {
                self.http
                    .post(&url)
                    .bearer_auth(&token)
                    .json(&payload)
            })
            .await?;
        ensure_ok_status(&response, "comment reply")
    }
}

#[async_trait]
impl PlatformTransport for InstagramApiClient {
    async fn login(&self, credentials: &Credentials) -> Result<Value, TransportError> {
        let url = self.endpoint("accounts/login");
        let payload = json!({
            "username": credentials.username,
            "password": credentials.password,
        });
        let response: LoginResponse = self
            .request_json("login", || self.http.post(&url).json(&payload))
            .await?;
        if response.status != "ok" {
            return Err(TransportError::AuthFailed(
                response
                    .message
                    .unwrap_or_else(|| "login rejected".to_string()),
            ));
        }
        let session = response
            .session
            .ok_or_else(|| TransportError::InvalidPayload("login returned no session".to_string()))?;
        let token = session_token_of(&session)?;
        self.adopt_token(token);
        tracing::info!(username = %credentials.username, "fresh login succeeded");
        Ok(session)
    }

    async fn restore_session(&self, session: &Value) -> Result<(), TransportError> {
        let token = session_token_of(session)?;
        let url = self.endpoint("accounts/current_user");
        let probe = self
            .request_json::<CurrentUserResponse, _>("session validation", || {
                self.http.get(&url).bearer_auth(&token)
            })
            .await;
        match probe {
            Ok(response) if response.status == "ok" => {
                self.adopt_token(token);
                tracing::info!("persisted session validated");
                Ok(())
            }
            Ok(_) => Err(TransportError::SessionInvalid),
            Err(TransportError::HttpStatus { status, .. }) if status == 401 || status == 403 => {
                Err(TransportError::SessionInvalid)
            }
            Err(error) => Err(error),
        }
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<LinkEvent>, TransportError> {
        let token = self.current_token()?;
        let url = self.endpoint("realtime/connect");
        let response: RealtimeConnectResponse = self
            .request_json("realtime connect", || {
                self.http.post(&url).bearer_auth(&token)
            })
            .await?;
        if response.status != "ok" {
            return Err(TransportError::Realtime(
                "realtime connect was rejected".to_string(),
            ));
        }
        let socket_url = response
            .url
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| TransportError::Realtime("realtime connect returned no url".to_string()))?;

        let (stream, _response) = connect_async(socket_url.as_str())
            .await
            .map_err(|error| TransportError::Realtime(error.to_string()))?;

        let (events_tx, events_rx) = mpsc::channel(self.config.event_channel_capacity.max(1));
        tokio::spawn(async move {
            let (_sink, mut source) = stream.split();
            loop {
                match source.next().await {
                    Some(Ok(message)) => {
                        let Some(event) = parse_realtime_message(message) else {
                            continue;
                        };
                        if events_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Some(Err(error)) => {
                        let _ = events_tx
                            .send(LinkEvent::SubscriptionError {
                                detail: error.to_string(),
                            })
                            .await;
                        return;
                    }
                    None => {
                        let _ = events_tx.send(LinkEvent::Disconnected).await;
                        return;
                    }
                }
            }
        });

        tracing::info!("realtime subscription established");
        Ok(events_rx)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Ok(token) = self.current_token() else {
            return Ok(());
        };
        let url = self.endpoint("realtime/disconnect");
        let result: Result<Value, TransportError> = self
            .request_json("realtime disconnect", || {
                self.http.post(&url).bearer_auth(&token)
            })
            .await;
        self.drop_token();
        // Teardown is best-effort; the session is gone either way.
        if let Err(error) = result {
            tracing::warn!(error = %error, "realtime disconnect failed");
        }
        Ok(())
    }
}

fn ensure_ok_status(response: &Value, operation: &str) -> Result<(), TransportError> {
    match response.get("status").and_then(Value::as_str) {
        Some("ok") => Ok(()),
        other => Err(TransportError::InvalidPayload(format!(
            "{operation} returned status {:?}",
            other.unwrap_or("missing")
        ))),
    }
}

fn session_token_of(session: &Value) -> Result<String, TransportError> {
    session
        .get("token")
        .and_then(Value::as_str)
        .filter(|token| !token.trim().is_empty())
        .map(|token| token.to_string())
        .ok_or_else(|| TransportError::InvalidPayload("session payload has no token".to_string()))
}

fn parse_realtime_message(message: WsMessage) -> Option<LinkEvent> {
    let text = match message {
        WsMessage::Text(text) => text.to_string(),
        WsMessage::Binary(bytes) => String::from_utf8(bytes.to_vec()).ok()?,
        WsMessage::Close(_) => return Some(LinkEvent::Disconnected),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => return None,
    };
    parse_realtime_envelope(&text)
}

fn parse_realtime_envelope(text: &str) -> Option<LinkEvent> {
    let envelope = match serde_json::from_str::<RealtimeEnvelope>(text) {
        Ok(envelope) => envelope,
        Err(error) => {
            tracing::warn!(error = %error, "dropping undecodable realtime envelope");
            return None;
        }
    };
    match envelope.event_type.as_str() {
        "message" => serde_json::from_value::<InboundMessage>(envelope.payload)
            .ok()
            .map(LinkEvent::DirectMessage),
        "comment" => serde_json::from_value::<InboundComment>(envelope.payload)
            .ok()
            .map(LinkEvent::Comment),
        "error" => Some(LinkEvent::SubscriptionError {
            detail: envelope
                .payload
                .get("detail")
                .and_then(Value::as_str)
                .unwrap_or("unknown realtime error")
                .to_string(),
        }),
        "disconnect" => Some(LinkEvent::Disconnected),
        _ => None,
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn is_retryable_transport_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
}

fn retry_delay(base_delay_ms: u64, attempt: usize) -> Duration {
    let exponent = attempt.saturating_sub(1).min(6) as u32;
    Duration::from_millis(base_delay_ms.max(1).saturating_mul(2_u64.pow(exponent)))
}

fn truncate_for_error(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut truncated = value.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
