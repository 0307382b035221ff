//! Page content pipeline: fetch, extract, filter.
//!
//! This crate turns a web page into summarization input:
//!
//! 1. [`fetch_html`] - HTTP fetch with content-type and size guards
//! 2. [`readable_markdown`] - boilerplate removal, HTML-to-Markdown conversion
//! 3. [`SensitiveFilter`] - user-configured term replacement before any text
//!    leaves the machine
//! 4. [`UrlRule`] / [`is_forbidden`] - per-site allow/deny rules
//!
//! The [`ContentScript`] trait is the seam for per-site extraction overrides.
//! The shipped implementation deliberately refuses to interpret user scripts;
//! it only honors an explicit text selection.

mod fetch;
mod filter;
mod readable;
mod rules;

pub use fetch::fetch_html;
pub use filter::{FilterPair, SensitiveFilter};
pub use readable::readable_markdown;
pub use rules::{UrlRule, is_forbidden};

/// Errors from the content pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("page fetch failed: {0}")]
    Fetch(String),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("page body exceeded {max_bytes} bytes")]
    TooLarge { max_bytes: usize },

    #[error("no readable content found")]
    EmptyContent,

    #[error("invalid URL rule {rule:?}: {message}")]
    InvalidRule { rule: String, message: String },

    #[error("user script evaluation is not supported")]
    ScriptUnsupported,
}

/// Per-site extraction override seam.
///
/// `source` is the stored script text for the matching rule; `selection` is
/// the user's current text selection, possibly empty. Implementations return
/// the content to summarize or fail.
pub trait ContentScript {
    fn evaluate(&self, source: &str, selection: &str) -> Result<String, ExtractError>;
}

/// Default [`ContentScript`]: honors a non-empty selection and refuses to
/// interpret script text. Running user-supplied code requires a sandbox this
/// crate does not provide.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectionOnly;

impl ContentScript for SelectionOnly {
    fn evaluate(&self, _source: &str, selection: &str) -> Result<String, ExtractError> {
        let trimmed = selection.trim();
        if trimmed.is_empty() {
            return Err(ExtractError::ScriptUnsupported);
        }
        Ok(trimmed.to_string())
    }
}
