//! Cross-tab panel bookkeeping.
//!
//! One registry entry per tab tracks whether that tab's panel is connected
//! and whether speech output is playing. Events funnel through a single
//! dispatch method that returns the directives the host should carry out, so
//! there is exactly one place where the per-tab state can change.

use std::collections::HashMap;

/// Opaque tab identifier assigned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(pub u64);

#[derive(Debug, Default)]
struct PanelEntry {
    panel_open: bool,
    speaking: bool,
}

/// Everything that can happen to a tab's panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelEvent {
    PanelConnected,
    PanelDisconnected,
    /// The user asked for a summary of this tab.
    CreateSummary,
    /// The tab navigated; `complete` is set once the new page finished
    /// loading.
    TabUpdated { complete: bool },
    TabClosed,
    SpeechStarted,
    SpeechStopped,
}

/// What the host should do in response to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDirective {
    /// Open the panel for this tab; it will connect and request its summary.
    OpenPanel,
    /// The panel is already connected; start summarizing now.
    BeginSummary,
    /// The page is gone; discard the tab's session state.
    ResetSession,
    /// Stop any speech output for this tab.
    StopSpeech,
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    entries: HashMap<TabId, PanelEntry>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn panel_open(&self, tab: TabId) -> bool {
        self.entries.get(&tab).is_some_and(|e| e.panel_open)
    }

    #[must_use]
    pub fn speaking(&self, tab: TabId) -> bool {
        self.entries.get(&tab).is_some_and(|e| e.speaking)
    }

    /// Apply one event and return the directives it triggers, in order.
    pub fn dispatch(&mut self, tab: TabId, event: PanelEvent) -> Vec<SessionDirective> {
        let mut directives = Vec::new();
        match event {
            PanelEvent::PanelConnected => {
                self.entries.entry(tab).or_default().panel_open = true;
            }
            PanelEvent::PanelDisconnected => {
                if let Some(entry) = self.entries.get_mut(&tab) {
                    entry.panel_open = false;
                    if entry.speaking {
                        entry.speaking = false;
                        directives.push(SessionDirective::StopSpeech);
                    }
                }
            }
            PanelEvent::CreateSummary => {
                if self.panel_open(tab) {
                    directives.push(SessionDirective::BeginSummary);
                } else {
                    directives.push(SessionDirective::OpenPanel);
                }
            }
            PanelEvent::TabUpdated { complete } => {
                if let Some(entry) = self.entries.get_mut(&tab) {
                    if entry.speaking {
                        entry.speaking = false;
                        directives.push(SessionDirective::StopSpeech);
                    }
                    // Intermediate loading states pass by; the session resets
                    // once the new page is actually there.
                    if complete && entry.panel_open {
                        directives.push(SessionDirective::ResetSession);
                    }
                }
            }
            PanelEvent::TabClosed => {
                if let Some(entry) = self.entries.remove(&tab)
                    && entry.speaking
                {
                    directives.push(SessionDirective::StopSpeech);
                }
            }
            PanelEvent::SpeechStarted => {
                self.entries.entry(tab).or_default().speaking = true;
            }
            PanelEvent::SpeechStopped => {
                if let Some(entry) = self.entries.get_mut(&tab) {
                    entry.speaking = false;
                }
            }
        }
        directives
    }
}

#[cfg(test)]
mod tests {
    use super::{PanelEvent, SessionDirective, SessionRegistry, TabId};

    const TAB: TabId = TabId(7);
    const OTHER: TabId = TabId(8);

    #[test]
    fn summary_request_opens_panel_first() {
        let mut registry = SessionRegistry::new();

        let directives = registry.dispatch(TAB, PanelEvent::CreateSummary);
        assert_eq!(directives, vec![SessionDirective::OpenPanel]);

        registry.dispatch(TAB, PanelEvent::PanelConnected);
        let directives = registry.dispatch(TAB, PanelEvent::CreateSummary);
        assert_eq!(directives, vec![SessionDirective::BeginSummary]);
    }

    #[test]
    fn navigation_resets_only_completed_loads() {
        let mut registry = SessionRegistry::new();
        registry.dispatch(TAB, PanelEvent::PanelConnected);

        let loading = registry.dispatch(TAB, PanelEvent::TabUpdated { complete: false });
        assert!(loading.is_empty());

        let complete = registry.dispatch(TAB, PanelEvent::TabUpdated { complete: true });
        assert_eq!(complete, vec![SessionDirective::ResetSession]);
    }

    #[test]
    fn navigation_without_panel_does_nothing() {
        let mut registry = SessionRegistry::new();
        registry.dispatch(TAB, PanelEvent::PanelConnected);

        let directives = registry.dispatch(OTHER, PanelEvent::TabUpdated { complete: true });
        assert!(directives.is_empty());
    }

    #[test]
    fn speech_stops_on_navigation_and_close() {
        let mut registry = SessionRegistry::new();
        registry.dispatch(TAB, PanelEvent::PanelConnected);
        registry.dispatch(TAB, PanelEvent::SpeechStarted);
        assert!(registry.speaking(TAB));

        let directives = registry.dispatch(TAB, PanelEvent::TabUpdated { complete: true });
        assert_eq!(
            directives,
            vec![SessionDirective::StopSpeech, SessionDirective::ResetSession]
        );
        assert!(!registry.speaking(TAB));

        registry.dispatch(TAB, PanelEvent::SpeechStarted);
        let directives = registry.dispatch(TAB, PanelEvent::TabClosed);
        assert_eq!(directives, vec![SessionDirective::StopSpeech]);
        assert!(!registry.panel_open(TAB));
    }

    #[test]
    fn disconnect_clears_panel_and_speech() {
        let mut registry = SessionRegistry::new();
        registry.dispatch(TAB, PanelEvent::PanelConnected);
        registry.dispatch(TAB, PanelEvent::SpeechStarted);

        let directives = registry.dispatch(TAB, PanelEvent::PanelDisconnected);
        assert_eq!(directives, vec![SessionDirective::StopSpeech]);
        assert!(!registry.panel_open(TAB));
    }

    #[test]
    fn tabs_are_independent() {
        let mut registry = SessionRegistry::new();
        registry.dispatch(TAB, PanelEvent::PanelConnected);

        assert!(registry.panel_open(TAB));
        assert!(!registry.panel_open(OTHER));
    }
}
