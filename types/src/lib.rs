//! Core domain types for Glance.
//!
//! This crate holds the chat-transcript data model, the streaming event
//! vocabulary, and the error taxonomy shared by every other crate. It has no
//! IO and no async: the provider and session crates own all side effects.
//!
//! # Transcript state machine
//!
//! The last turn of a [`Transcript`] moves through
//! `Loading → Chatting → Done`, with `Suspend` as the alternate terminal
//! state reached by cancellation or a recoverable failure. All earlier turns
//! are always `Done` — [`Transcript`] enforces that invariant.

use std::fmt;

use serde::{Deserialize, Serialize};

mod sanitize;
mod transcript;

pub use sanitize::sanitize_terminal_text;
pub use transcript::Transcript;

/// Who a transcript turn belongs to.
///
/// `Summary` and `User` turns carry input content (the page markdown or a
/// follow-up question); `Ai` turns carry model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    Summary,
    User,
    Ai,
}

/// Lifecycle state of a single transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    /// Request issued, no content received yet.
    Loading,
    /// At least one text delta applied; more may follow.
    Chatting,
    /// Completed normally.
    Done,
    /// Paused with partial content retained; resumable via regenerate.
    Suspend,
}

impl ChatStatus {
    /// `Done` and `Suspend` are terminal; a turn in either state will not
    /// mutate again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, ChatStatus::Done | ChatStatus::Suspend)
    }
}

/// One entry of the chat transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    role: ChatRole,
    content: String,
    status: ChatStatus,
}

impl ChatTurn {
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>, status: ChatStatus) -> Self {
        Self {
            role,
            content: content.into(),
            status,
        }
    }

    #[must_use]
    pub fn role(&self) -> ChatRole {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn status(&self) -> ChatStatus {
        self.status
    }

    pub(crate) fn push_content(&mut self, delta: &str) {
        self.content.push_str(delta);
    }

    pub(crate) fn set_status(&mut self, status: ChatStatus) {
        self.status = status;
    }
}

/// How the generation endpoint should deliver its response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    /// Server-sent-event stream of incremental frames.
    #[default]
    Stream,
    /// Single-shot JSON body with the full text.
    Json,
}

/// API credential with a redacting `Debug` so it never leaks into logs.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    #[must_use]
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey(<redacted>)")
    }
}

/// Immutable snapshot of everything one generation request needs.
///
/// Built once per user action by the config resolver, never mutated, and
/// discarded after the request resolves, errors, or is aborted.
#[derive(Debug, Clone)]
pub struct RequestParams {
    pub prompt: String,
    pub api_key: ApiKey,
    pub model: String,
    pub mode: ResponseMode,
}

/// Normalized event vocabulary between the stream decoder and the reducer.
///
/// Both response modes reduce to this: a streamed request emits many
/// `TextDelta`s before `Done`, a single-shot request exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental text content from the model.
    TextDelta(String),
    /// Stream completed successfully.
    Done,
    /// Request failed; the payload decides the transcript transition.
    Error(GenerateError),
}

/// Everything that can go wrong between resolving a request and finishing
/// the stream.
///
/// Each variant maps to exactly one user-visible notice and one transcript
/// transition at the session-controller boundary; nothing here is retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    /// No API key configured. Fatal to the session: the transcript is
    /// discarded and the panel returns to its welcome state.
    #[error("no API key configured")]
    MissingCredential,

    /// Network or HTTP failure; the in-flight turn is suspended.
    #[error("request failed: {0}")]
    Transport(String),

    /// Payload shape not understood; the in-flight turn is suspended.
    #[error("response payload not understood")]
    UnknownResponse,

    /// The endpoint stopped generation without producing content, e.g.
    /// safety filtering. The reason string comes from the wire.
    #[error("generation stopped: {reason}")]
    ModelRejected { reason: String },

    /// User cancelled. Not a failure: the turn suspends silently.
    #[error("request aborted")]
    Aborted,
}

/// A user-facing message and the channel it should be delivered on.
///
/// `Toast` is transient inline feedback; `System` is an OS-level
/// notification for session-fatal conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Toast(String),
    System(String),
}

impl Notice {
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Notice::Toast(msg) | Notice::System(msg) => msg,
        }
    }
}
