//! URL blocking rules.
//!
//! A rule is either an exact URL or, with an `R:` prefix, a regular
//! expression matched against the full URL string.

use regex::Regex;
use url::Url;

use crate::ExtractError;

const REGEX_PREFIX: &str = "R:";

/// A single parsed blocking rule.
#[derive(Debug, Clone)]
pub enum UrlRule {
    Exact(Url),
    Pattern(Regex),
}

impl UrlRule {
    /// Parse a rule from its configured text form.
    pub fn parse(raw: &str) -> Result<Self, ExtractError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ExtractError::InvalidRule {
                rule: raw.to_string(),
                message: "rule must not be empty".into(),
            });
        }
        if let Some(pattern) = raw.strip_prefix(REGEX_PREFIX) {
            let regex = Regex::new(pattern).map_err(|err| ExtractError::InvalidRule {
                rule: raw.to_string(),
                message: err.to_string(),
            })?;
            return Ok(Self::Pattern(regex));
        }
        let url = Url::parse(raw).map_err(|err| ExtractError::InvalidRule {
            rule: raw.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self::Exact(url))
    }

    /// Whether this rule matches `url`.
    pub fn matches(&self, url: &Url) -> bool {
        match self {
            // Url equality is over the normalized form, so trailing-slash and
            // default-port variants of the same address compare equal.
            Self::Exact(rule) => rule == url,
            Self::Pattern(regex) => regex.is_match(url.as_str()),
        }
    }
}

/// Whether summarizing `url` is disallowed.
///
/// Non-HTTP(S) schemes are always refused regardless of configured rules.
pub fn is_forbidden(url: &Url, rules: &[UrlRule]) -> bool {
    if !matches!(url.scheme(), "http" | "https") {
        return true;
    }
    rules.iter().any(|rule| rule.matches(url))
}
