//! The per-panel session controller.

use futures_util::future::{AbortHandle, Abortable};
use tokio::sync::mpsc;

use glance_config::Settings;
use glance_extract::SensitiveFilter;
use glance_gemini::GeminiClient;
use glance_types::{
    ChatRole, GenerateError, Notice, StreamEvent, Transcript, sanitize_terminal_text,
};

const STREAM_EVENT_CHANNEL_CAPACITY: usize = 1024;

/// What the panel is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageView {
    /// No session yet, or the session was discarded.
    #[default]
    Welcome,
    /// A transcript is being displayed.
    Answer,
}

struct ActiveRequest {
    events: mpsc::Receiver<StreamEvent>,
    abort: AbortHandle,
}

/// One page's chat session.
///
/// Owns the transcript, the view state, and at most one in-flight request.
/// A second request while one is running is refused with a toast; explicit
/// cancellation and navigation abort the running task instead.
pub struct PanelSession {
    settings: Settings,
    client: GeminiClient,
    page: PageView,
    transcript: Transcript,
    active: Option<ActiveRequest>,
    notices: Vec<Notice>,
}

impl PanelSession {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self::with_client(settings, GeminiClient::new())
    }

    #[must_use]
    pub fn with_client(settings: Settings, client: GeminiClient) -> Self {
        Self {
            settings,
            client,
            page: PageView::default(),
            transcript: Transcript::new(),
            active: None,
            notices: Vec::new(),
        }
    }

    #[must_use]
    pub fn page(&self) -> PageView {
        self.page
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// True while a request is running.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    /// Drain accumulated user-facing notices.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Swap in updated settings. The request in flight keeps the parameters
    /// it was resolved with.
    pub fn update_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    /// Start a page summary.
    pub fn summarize(&mut self, content: &str) {
        self.start(ChatRole::Summary, content);
    }

    /// Ask a follow-up question about the page.
    pub fn ask(&mut self, question: &str) {
        self.start(ChatRole::User, question);
    }

    /// Re-run the exchange that produced the Ai turn at `index`, appending a
    /// fresh pair of turns. The original exchange stays in the transcript.
    pub fn regenerate(&mut self, index: usize) {
        if self.transcript.has_unfinished() {
            self.notices.push(Notice::Toast(
                "Please wait for the current response to finish".to_string(),
            ));
            return;
        }
        let Some(input) = index
            .checked_sub(1)
            .and_then(|i| self.transcript.turn(i))
            .filter(|turn| turn.role() != ChatRole::Ai)
        else {
            tracing::warn!(index, "regenerate target has no input turn");
            return;
        };
        let role = input.role();
        let content = input.content().to_string();
        self.start(role, &content);
    }

    fn start(&mut self, role: ChatRole, content: &str) {
        if self.transcript.has_unfinished() {
            self.notices.push(Notice::Toast(
                "Please wait for the current response to finish".to_string(),
            ));
            return;
        }

        let content = content.trim();
        if content.is_empty() {
            self.notices
                .push(Notice::Toast("Nothing to send".to_string()));
            return;
        }

        // Masking applies to everything that leaves the machine, page content
        // and questions alike.
        let content = match SensitiveFilter::new(&self.settings.sensitive_filters) {
            Ok(filter) => filter.apply(content),
            Err(err) => {
                self.notices.push(Notice::Toast(err.to_string()));
                return;
            }
        };

        let params = match self.settings.resolve_request(role, &content) {
            Ok(params) => params,
            Err(err) => {
                self.fail(err);
                return;
            }
        };

        // A finished request may still hold its drained channel.
        self.abort_active();

        self.transcript.begin_exchange(role, content);
        self.page = PageView::Answer;

        let (tx, rx) = mpsc::channel(STREAM_EVENT_CHANNEL_CAPACITY);
        let (abort_handle, abort_registration) = AbortHandle::new_pair();
        self.active = Some(ActiveRequest {
            events: rx,
            abort: abort_handle,
        });

        let client = self.client.clone();
        let task = async move {
            client.generate(params, tx).await;
        };
        tokio::spawn(async move {
            let _ = Abortable::new(task, abort_registration).await;
        });
    }

    /// User-initiated cancel: abort the task, suspend the turn, no notice.
    pub fn cancel(&mut self) {
        if self.active.is_none() && !self.transcript.has_unfinished() {
            return;
        }
        self.abort_active();
        self.transcript.suspend();
    }

    /// The page navigated away: the session it belonged to is gone.
    pub fn page_changed(&mut self) {
        self.abort_active();
        self.transcript.reset();
        self.page = PageView::Welcome;
    }

    /// Await the next stream event and fold it into the transcript.
    ///
    /// Returns the event for display, or `None` when there is nothing left to
    /// wait for. A channel that closes without a terminal event suspends the
    /// turn silently.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        let received = self.active.as_mut()?.events.recv().await;
        match received {
            Some(event) => {
                let event = self.apply(event);
                Some(event)
            }
            None => {
                self.abort_active();
                self.transcript.suspend();
                None
            }
        }
    }

    /// Drain every event currently queued, without waiting. Consecutive text
    /// deltas are coalesced before they touch the transcript.
    pub fn process_pending(&mut self) {
        let mut carried: Option<StreamEvent> = None;
        loop {
            let event = match carried.take() {
                Some(event) => event,
                None => {
                    let Some(active) = self.active.as_mut() else {
                        return;
                    };
                    match active.events.try_recv() {
                        Ok(event) => event,
                        Err(mpsc::error::TryRecvError::Empty) => return,
                        Err(mpsc::error::TryRecvError::Disconnected) => {
                            self.abort_active();
                            self.transcript.suspend();
                            return;
                        }
                    }
                }
            };

            let event = match event {
                StreamEvent::TextDelta(mut text) => {
                    while let Some(active) = self.active.as_mut() {
                        match active.events.try_recv() {
                            Ok(StreamEvent::TextDelta(more)) => text.push_str(&more),
                            Ok(other) => {
                                carried = Some(other);
                                break;
                            }
                            Err(_) => break,
                        }
                    }
                    StreamEvent::TextDelta(text)
                }
                other => other,
            };

            self.apply(event);
            if self.active.is_none() {
                return;
            }
        }
    }

    /// Fold one event into the transcript, returning the (sanitized) event.
    fn apply(&mut self, event: StreamEvent) -> StreamEvent {
        match event {
            StreamEvent::TextDelta(text) => {
                // Model output is untrusted; strip escapes before it can
                // reach a terminal or log.
                let clean = sanitize_terminal_text(&text).into_owned();
                self.transcript.append_delta(&clean);
                StreamEvent::TextDelta(clean)
            }
            StreamEvent::Done => {
                self.abort_active();
                self.transcript.finish();
                StreamEvent::Done
            }
            StreamEvent::Error(err) => {
                self.abort_active();
                self.fail(err.clone());
                StreamEvent::Error(err)
            }
        }
    }

    /// Map a failure to its notice and transcript transition.
    fn fail(&mut self, err: GenerateError) {
        match err {
            GenerateError::MissingCredential => {
                // Session-fatal: nothing sensible to resume.
                self.transcript.reset();
                self.page = PageView::Welcome;
                self.notices.push(Notice::System(err.to_string()));
            }
            GenerateError::Aborted => {
                self.transcript.suspend();
            }
            GenerateError::Transport(_)
            | GenerateError::UnknownResponse
            | GenerateError::ModelRejected { .. } => {
                self.transcript.suspend();
                let message = sanitize_terminal_text(&err.to_string()).into_owned();
                self.notices.push(Notice::Toast(message));
            }
        }
    }

    fn abort_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.abort.abort();
        }
    }

    #[cfg(test)]
    fn attach_test_stream(
        &mut self,
        role: ChatRole,
        content: &str,
    ) -> mpsc::Sender<StreamEvent> {
        let (tx, rx) = mpsc::channel(16);
        let (abort, _registration) = AbortHandle::new_pair();
        self.transcript.begin_exchange(role, content);
        self.page = PageView::Answer;
        self.active = Some(ActiveRequest { events: rx, abort });
        tx
    }
}
