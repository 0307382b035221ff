//! Session layer: one [`PanelSession`] per page, a [`SessionRegistry`] to
//! track panels across tabs.
//!
//! The controller owns the transcript state machine and the lifecycle of the
//! single in-flight generation request. All request failures funnel through
//! one place so each error maps to exactly one user-visible notice and one
//! transcript transition.

mod controller;
mod registry;

pub use controller::{PageView, PanelSession};
pub use registry::{PanelEvent, SessionDirective, SessionRegistry, TabId};
