//! Ordered chat transcript with the last-turn invariant.

use crate::{ChatRole, ChatStatus, ChatTurn};

/// Ordered sequence of chat turns for one summarization session.
///
/// Invariant: at most the last turn has a non-terminal status; every earlier
/// turn is `Done`. Mutation goes through the methods here, which each
/// preserve it. The transcript lives only as long as the page; it is reset on
/// navigation and never persisted.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
}

impl Transcript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    #[must_use]
    pub fn turn(&self, index: usize) -> Option<&ChatTurn> {
        self.turns.get(index)
    }

    #[must_use]
    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    /// True while any turn is still in flight. The session controller uses
    /// this as the guard against starting a second request.
    #[must_use]
    pub fn has_unfinished(&self) -> bool {
        self.turns.iter().any(|turn| !turn.status().is_terminal())
    }

    /// Start a new exchange: the input turn (already complete) followed by a
    /// placeholder Ai turn in `Loading` with empty content.
    ///
    /// # Panics
    ///
    /// Panics if a turn is still in flight; callers must check
    /// [`Transcript::has_unfinished`] first.
    pub fn begin_exchange(&mut self, role: ChatRole, content: impl Into<String>) {
        assert!(
            !self.has_unfinished(),
            "cannot begin an exchange while a turn is in flight"
        );
        self.turns
            .push(ChatTurn::new(role, content, ChatStatus::Done));
        self.turns
            .push(ChatTurn::new(ChatRole::Ai, "", ChatStatus::Loading));
    }

    /// Append a text delta to the in-flight turn and move it to `Chatting`.
    ///
    /// Ignored if the last turn is already terminal (a frame decoded after
    /// cancellation lands here).
    pub fn append_delta(&mut self, delta: &str) {
        if let Some(turn) = self.turns.last_mut()
            && !turn.status().is_terminal()
        {
            turn.push_content(delta);
            turn.set_status(ChatStatus::Chatting);
        }
    }

    /// Mark the in-flight turn `Done`.
    pub fn finish(&mut self) {
        if let Some(turn) = self.turns.last_mut()
            && !turn.status().is_terminal()
        {
            turn.set_status(ChatStatus::Done);
        }
    }

    /// Suspend the last turn, retaining whatever partial content accumulated.
    ///
    /// Earlier turns are force-normalized to `Done`. With the one-in-flight
    /// guard in place only the last turn can ever be non-terminal, so the
    /// normalization is defensive invariant restoration, not an expected
    /// path.
    pub fn suspend(&mut self) {
        let Some((last, earlier)) = self.turns.split_last_mut() else {
            return;
        };
        for turn in earlier {
            turn.set_status(ChatStatus::Done);
        }
        last.set_status(ChatStatus::Suspend);
    }

    /// Drop every turn. Used on navigation and on session-fatal errors.
    pub fn reset(&mut self) {
        self.turns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::Transcript;
    use crate::{ChatRole, ChatStatus};

    fn assert_invariant(transcript: &Transcript) {
        let turns = transcript.turns();
        for turn in &turns[..turns.len().saturating_sub(1)] {
            assert_eq!(turn.status(), ChatStatus::Done);
        }
    }

    #[test]
    fn begin_exchange_appends_input_and_placeholder() {
        let mut transcript = Transcript::new();
        transcript.begin_exchange(ChatRole::Summary, "page text");

        assert_eq!(transcript.len(), 2);
        let input = transcript.turn(0).unwrap();
        assert_eq!(input.role(), ChatRole::Summary);
        assert_eq!(input.status(), ChatStatus::Done);
        let placeholder = transcript.turn(1).unwrap();
        assert_eq!(placeholder.role(), ChatRole::Ai);
        assert_eq!(placeholder.content(), "");
        assert_eq!(placeholder.status(), ChatStatus::Loading);
        assert!(transcript.has_unfinished());
    }

    #[test]
    #[should_panic(expected = "in flight")]
    fn begin_exchange_rejects_concurrent_request() {
        let mut transcript = Transcript::new();
        transcript.begin_exchange(ChatRole::Summary, "a");
        transcript.begin_exchange(ChatRole::User, "b");
    }

    #[test]
    fn deltas_accumulate_in_order() {
        let mut transcript = Transcript::new();
        transcript.begin_exchange(ChatRole::Summary, "page");
        transcript.append_delta("Hi");
        transcript.append_delta(" there");

        let last = transcript.last().unwrap();
        assert_eq!(last.content(), "Hi there");
        assert_eq!(last.status(), ChatStatus::Chatting);

        transcript.finish();
        assert_eq!(transcript.last().unwrap().status(), ChatStatus::Done);
        assert!(!transcript.has_unfinished());
        assert_invariant(&transcript);
    }

    #[test]
    fn suspend_retains_partial_content_exactly() {
        let mut transcript = Transcript::new();
        transcript.begin_exchange(ChatRole::Summary, "page");
        transcript.append_delta("partial answ");

        transcript.suspend();

        let last = transcript.last().unwrap();
        assert_eq!(last.status(), ChatStatus::Suspend);
        assert_eq!(last.content(), "partial answ");

        // No further mutation after suspend.
        transcript.append_delta("er");
        assert_eq!(transcript.last().unwrap().content(), "partial answ");
        assert_invariant(&transcript);
    }

    #[test]
    fn suspend_normalizes_earlier_turns() {
        let mut transcript = Transcript::new();
        transcript.begin_exchange(ChatRole::Summary, "page");
        transcript.suspend();

        transcript.begin_exchange(ChatRole::User, "follow-up");
        transcript.append_delta("x");
        transcript.suspend();

        assert_invariant(&transcript);
        assert_eq!(transcript.last().unwrap().status(), ChatStatus::Suspend);
    }

    #[test]
    fn suspended_turn_allows_new_exchange() {
        let mut transcript = Transcript::new();
        transcript.begin_exchange(ChatRole::Summary, "page");
        transcript.suspend();
        assert!(!transcript.has_unfinished());

        transcript.begin_exchange(ChatRole::Summary, "page");
        assert_eq!(transcript.len(), 4);
    }

    #[test]
    fn finish_on_empty_transcript_is_noop() {
        let mut transcript = Transcript::new();
        transcript.finish();
        transcript.suspend();
        transcript.append_delta("ignored");
        assert!(transcript.is_empty());
    }

    #[test]
    fn reset_discards_everything() {
        let mut transcript = Transcript::new();
        transcript.begin_exchange(ChatRole::Summary, "page");
        transcript.reset();
        assert!(transcript.is_empty());
    }
}
