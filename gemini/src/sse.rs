//! SSE decoding for the `streamGenerateContent` response.
//!
//! The byte stream is buffered until a blank-line event boundary appears,
//! each event's `data:` payload is parsed as JSON, and the typed frame is
//! reduced to [`StreamEvent`]s. Gemini frames carry no event type: every
//! chunk is a complete response object with candidates.

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;

use glance_types::{GenerateError, StreamEvent};

/// Frames larger than this indicate a broken or hostile stream.
const MAX_SSE_BUFFER_BYTES: usize = 4 * 1024 * 1024;

fn find_sse_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a <= b { (a, 2) } else { (b, 4) }),
        (Some(a), None) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

fn drain_next_sse_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (pos, delim_len) = find_sse_event_boundary(buffer)?;
    let event = buffer[..pos].to_vec();
    buffer.drain(..pos + delim_len);
    Some(event)
}

fn extract_sse_data(event: &str) -> Option<String> {
    let mut data = String::new();
    let mut found = false;

    for line in event.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(mut rest) = line.strip_prefix("data:") {
            if let Some(stripped) = rest.strip_prefix(' ') {
                rest = stripped;
            }

            if found {
                data.push('\n');
            }
            data.push_str(rest);
            found = true;
        }
    }

    if found { Some(data) } else { None }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Response {
    candidates: Option<Vec<Candidate>>,
    error: Option<ErrorInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorInfo {
    message: Option<String>,
    #[allow(dead_code)]
    code: Option<i32>,
}

impl ErrorInfo {
    fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or("Unknown error")
    }
}

/// Known Gemini finish reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinishReason {
    Stop,
    MaxTokens,
    Safety,
    Recitation,
    Language,
    Blocklist,
    ProhibitedContent,
    Spii,
    Other,
    Unknown,
}

impl FinishReason {
    fn parse(s: &str) -> Self {
        match s {
            "STOP" => Self::Stop,
            "MAX_TOKENS" => Self::MaxTokens,
            "SAFETY" => Self::Safety,
            "RECITATION" => Self::Recitation,
            "LANGUAGE" => Self::Language,
            "BLOCKLIST" => Self::Blocklist,
            "PROHIBITED_CONTENT" => Self::ProhibitedContent,
            "SPII" => Self::Spii,
            "OTHER" => Self::Other,
            _ => Self::Unknown,
        }
    }

    /// `None` means generation can finish normally; `Some` is the reason the
    /// model refused to continue. Reasons this client does not recognize are
    /// refusals too, not silent success.
    fn rejection(self, raw: &str) -> Option<String> {
        match self {
            Self::Stop => None,
            Self::MaxTokens => Some("MAX_TOKENS: output limit reached".to_string()),
            _ => Some(raw.to_string()),
        }
    }
}

enum FrameAction {
    Emit(Vec<StreamEvent>),
    Done,
    Error(GenerateError),
}

/// Reduce one parsed frame to its stream events.
///
/// A frame that deserializes but carries neither text nor a finish reason
/// nor an error object is itself an error: the protocol has no empty
/// keep-alive frames.
fn reduce_frame(json: &Value) -> FrameAction {
    let response: Response = match serde_json::from_value(json.clone()) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(%e, "unrecognized stream frame shape");
            return FrameAction::Error(GenerateError::UnknownResponse);
        }
    };

    if let Some(error) = response.error {
        return FrameAction::Error(GenerateError::Transport(
            error.message_or_default().to_string(),
        ));
    }

    let mut events = Vec::new();
    let mut finish: Option<FrameAction> = None;

    if let Some(candidates) = response.candidates {
        for candidate in candidates {
            // Content first, so a frame that carries both final text and a
            // finish reason does not drop the text.
            if let Some(content) = candidate.content
                && let Some(parts) = content.parts
            {
                for part in parts {
                    if let Some(text) = part.text
                        && !text.is_empty()
                    {
                        events.push(StreamEvent::TextDelta(text));
                    }
                }
            }

            if let Some(raw) = candidate.finish_reason {
                let reason = FinishReason::parse(&raw);
                finish = Some(match reason.rejection(&raw) {
                    None => FrameAction::Done,
                    Some(reason) => {
                        FrameAction::Error(GenerateError::ModelRejected { reason })
                    }
                });
            }
        }
    }

    if let Some(action) = finish {
        if events.is_empty() {
            return action;
        }
        match action {
            FrameAction::Done => events.push(StreamEvent::Done),
            FrameAction::Error(err) => events.push(StreamEvent::Error(err)),
            _ => {}
        }
        return FrameAction::Emit(events);
    }

    if events.is_empty() {
        FrameAction::Error(GenerateError::UnknownResponse)
    } else {
        FrameAction::Emit(events)
    }
}

/// Extract the full text of a non-streamed response body.
pub(crate) fn collect_response_text(json: &Value) -> Result<String, GenerateError> {
    let response: Response =
        serde_json::from_value(json.clone()).map_err(|_| GenerateError::UnknownResponse)?;

    if let Some(error) = response.error {
        return Err(GenerateError::Transport(
            error.message_or_default().to_string(),
        ));
    }

    let mut text = String::new();
    let mut rejection: Option<String> = None;
    for candidate in response.candidates.unwrap_or_default() {
        if let Some(content) = candidate.content
            && let Some(parts) = content.parts
        {
            for part in parts {
                if let Some(chunk) = part.text {
                    text.push_str(&chunk);
                }
            }
        }
        if let Some(raw) = candidate.finish_reason {
            rejection = FinishReason::parse(&raw).rejection(&raw);
        }
    }

    if text.is_empty() {
        return match rejection {
            Some(reason) => Err(GenerateError::ModelRejected { reason }),
            None => Err(GenerateError::UnknownResponse),
        };
    }
    Ok(text)
}

async fn send_event(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

/// Drive an SSE response body to completion, emitting [`StreamEvent`]s.
///
/// Handles idle-timeout, buffer caps, UTF-8 validation, event boundary
/// detection, and the `[DONE]` marker. A malformed payload fails the stream
/// immediately. The channel closing ends processing silently: the consumer
/// already moved on.
pub async fn process_sse_stream(
    response: reqwest::Response,
    tx: &mpsc::Sender<StreamEvent>,
    idle_timeout: std::time::Duration,
) {
    use futures_util::StreamExt;

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();

    loop {
        let Ok(next) = tokio::time::timeout(idle_timeout, stream.next()).await else {
            let _ = send_event(
                tx,
                StreamEvent::Error(GenerateError::Transport("stream idle timeout".to_string())),
            )
            .await;
            return;
        };

        let Some(chunk) = next else { break };
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = send_event(
                    tx,
                    StreamEvent::Error(GenerateError::Transport(e.to_string())),
                )
                .await;
                return;
            }
        };
        buffer.extend_from_slice(&chunk);

        // Security: prevent unbounded buffer growth
        if buffer.len() > MAX_SSE_BUFFER_BYTES {
            let _ = send_event(
                tx,
                StreamEvent::Error(GenerateError::Transport(
                    "SSE buffer exceeded maximum size (4 MiB)".to_string(),
                )),
            )
            .await;
            return;
        }

        while let Some(event) = drain_next_sse_event(&mut buffer) {
            if event.is_empty() {
                continue;
            }

            let Ok(event) = std::str::from_utf8(&event) else {
                let _ =
                    send_event(tx, StreamEvent::Error(GenerateError::UnknownResponse)).await;
                return;
            };

            let Some(data) = extract_sse_data(event) else {
                continue;
            };

            if data == "[DONE]" {
                let _ = send_event(tx, StreamEvent::Done).await;
                return;
            }

            let json = match serde_json::from_str::<Value>(&data) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(%e, payload_bytes = data.len(), "invalid SSE JSON payload");
                    let _ =
                        send_event(tx, StreamEvent::Error(GenerateError::UnknownResponse)).await;
                    return;
                }
            };

            match reduce_frame(&json) {
                FrameAction::Emit(events) => {
                    for event in events {
                        let is_terminal =
                            matches!(&event, StreamEvent::Done | StreamEvent::Error(_));
                        if !send_event(tx, event).await {
                            return;
                        }
                        if is_terminal {
                            return;
                        }
                    }
                }
                FrameAction::Done => {
                    let _ = send_event(tx, StreamEvent::Done).await;
                    return;
                }
                FrameAction::Error(err) => {
                    let _ = send_event(tx, StreamEvent::Error(err)).await;
                    return;
                }
            }
        }
    }

    // The server stopped sending without a finish reason; everything that
    // arrived was well-formed, so the response is simply over.
    let _ = send_event(tx, StreamEvent::Done).await;
}
