//! Google Gemini GenerateContent client.
//!
//! One request, one bounded event channel. Both response modes normalize to
//! the same [`StreamEvent`] vocabulary: a streamed request emits incremental
//! `TextDelta`s, a single-shot JSON request emits exactly one, and every
//! failure arrives as `StreamEvent::Error` on the channel rather than a
//! `Result` so the consumer has a single place to react.

use std::sync::OnceLock;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::mpsc;

use glance_types::{GenerateError, RequestParams, ResponseMode, StreamEvent};

mod sse;

pub use sse::process_sse_stream;

/// Canonical Gemini API base URL.
pub const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const CONNECT_TIMEOUT_SECS: u64 = 30;
const TCP_KEEPALIVE_SECS: u64 = 60;
const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;
const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

const API_CLIENT_HEADER: &str = concat!("glance/", env!("CARGO_PKG_VERSION"));

fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::none())
            .https_only(true)
            .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build hardened HTTP client: {e}. Falling back.");
                reqwest::Client::builder()
                    .https_only(true)
                    .redirect(reqwest::redirect::Policy::none())
                    .build()
                    .expect("Minimal hardened HTTP client must build; cannot proceed without TLS")
            })
    })
}

fn stream_idle_timeout() -> Duration {
    static TIMEOUT: OnceLock<Duration> = OnceLock::new();
    *TIMEOUT.get_or_init(|| {
        let timeout = std::env::var("GLANCE_STREAM_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_STREAM_IDLE_TIMEOUT_SECS);
        Duration::from_secs(timeout)
    })
}

/// A Gemini endpoint to send requests to.
///
/// [`GeminiClient::new`] talks to the production API over the shared hardened
/// TLS client. Tests point at a local server with [`GeminiClient::with_base_url`].
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: String,
    http: reqwest::Client,
}

impl Default for GeminiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GeminiClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            base_url: API_BASE.to_string(),
            http: http_client().clone(),
        }
    }

    /// Point at an alternate endpoint. TLS enforcement is keyed off the
    /// scheme so plain-HTTP test servers work.
    #[must_use]
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        let http = if base_url.starts_with("https://") {
            http_client().clone()
        } else {
            reqwest::Client::new()
        };
        Self { base_url, http }
    }

    /// Send one generation request, delivering everything through `events`.
    ///
    /// The call runs until the stream finishes or fails; dropping the
    /// receiver (or aborting the task driving this future) ends it early.
    pub async fn generate(&self, params: RequestParams, events: mpsc::Sender<StreamEvent>) {
        let verb = match params.mode {
            ResponseMode::Stream => "streamGenerateContent?alt=sse",
            ResponseMode::Json => "generateContent",
        };
        let url = format!("{}/models/{}:{}", self.base_url, params.model, verb);
        let body = build_request_body(&params.prompt);

        tracing::debug!(model = %params.model, mode = ?params.mode, "sending generation request");

        let result = self
            .http
            .post(&url)
            .header("x-goog-api-key", params.api_key.expose_secret())
            .header("x-goog-api-client", API_CLIENT_HEADER)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let _ = events
                    .send(StreamEvent::Error(GenerateError::Transport(e.to_string())))
                    .await;
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = read_capped_error_body(response).await;
            tracing::warn!(%status, "generation request rejected");
            let _ = events
                .send(StreamEvent::Error(GenerateError::Transport(format!(
                    "API error {status}: {error_text}"
                ))))
                .await;
            return;
        }

        match params.mode {
            ResponseMode::Stream => {
                sse::process_sse_stream(response, &events, stream_idle_timeout()).await;
            }
            ResponseMode::Json => {
                single_shot(response, &events).await;
            }
        }
    }
}

/// Reduce a non-streamed response body to one `TextDelta` plus `Done`.
async fn single_shot(response: reqwest::Response, events: &mpsc::Sender<StreamEvent>) {
    let body = match response.json::<Value>().await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(%e, "failed to read generation response body");
            let _ = events
                .send(StreamEvent::Error(GenerateError::UnknownResponse))
                .await;
            return;
        }
    };

    match sse::collect_response_text(&body) {
        Ok(text) => {
            if events.send(StreamEvent::TextDelta(text)).await.is_ok() {
                let _ = events.send(StreamEvent::Done).await;
            }
        }
        Err(err) => {
            let _ = events.send(StreamEvent::Error(err)).await;
        }
    }
}

/// Build the GenerateContent request body.
///
/// Gemini mixes casing: `contents` is lowercase, `generationConfig` and
/// `safetySettings` are camelCase.
fn build_request_body(prompt: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt }]
        }],
        "generationConfig": {
            "temperature": 0.7,
            "topP": 0.95
        },
        "safetySettings": [
            { "category": "HARM_CATEGORY_HARASSMENT", "threshold": "BLOCK_ONLY_HIGH" },
            { "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": "BLOCK_ONLY_HIGH" },
            { "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": "BLOCK_ONLY_HIGH" },
            { "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": "BLOCK_ONLY_HIGH" }
        ]
    })
}

async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}
