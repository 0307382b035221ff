//! Sensitive-term masking applied to page content before it leaves the
//! machine.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};
use serde::{Deserialize, Serialize};

use crate::ExtractError;

/// Replacement used when a [`FilterPair`] does not name one.
pub const DEFAULT_REPLACEMENT: &str = "*****";

/// One configured term and its optional replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPair {
    pub sensitive: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

impl FilterPair {
    pub fn new(sensitive: impl Into<String>) -> Self {
        Self {
            sensitive: sensitive.into(),
            replacement: None,
        }
    }

    pub fn with_replacement(sensitive: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            sensitive: sensitive.into(),
            replacement: Some(replacement.into()),
        }
    }
}

/// Compiled multi-pattern matcher over all configured terms.
///
/// Uses leftmost-longest matching so that overlapping terms ("secret" and
/// "secret key") replace the longer one.
#[derive(Debug)]
pub struct SensitiveFilter {
    automaton: Option<AhoCorasick>,
    replacements: Vec<String>,
}

impl SensitiveFilter {
    /// Compile the filter. Pairs with an empty `sensitive` term are rejected.
    pub fn new(pairs: &[FilterPair]) -> Result<Self, ExtractError> {
        if let Some(bad) = pairs.iter().find(|p| p.sensitive.is_empty()) {
            return Err(ExtractError::InvalidRule {
                rule: bad.sensitive.clone(),
                message: "sensitive term must not be empty".into(),
            });
        }
        if pairs.is_empty() {
            return Ok(Self {
                automaton: None,
                replacements: Vec::new(),
            });
        }

        let automaton = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostLongest)
            .build(pairs.iter().map(|p| p.sensitive.as_str()))
            .map_err(|err| ExtractError::InvalidRule {
                rule: "sensitive filters".into(),
                message: err.to_string(),
            })?;
        let replacements = pairs
            .iter()
            .map(|p| {
                p.replacement
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REPLACEMENT.to_string())
            })
            .collect();
        Ok(Self {
            automaton: Some(automaton),
            replacements,
        })
    }

    /// Replace every configured term in `text`.
    pub fn apply(&self, text: &str) -> String {
        match &self.automaton {
            Some(automaton) => {
                let replacements: Vec<&str> =
                    self.replacements.iter().map(String::as_str).collect();
                automaton.replace_all(text, &replacements)
            }
            None => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DEFAULT_REPLACEMENT, FilterPair, SensitiveFilter};
    use crate::ExtractError;

    #[test]
    fn masks_with_default_replacement() {
        let filter = SensitiveFilter::new(&[FilterPair::new("hunter2")]).unwrap();
        assert_eq!(
            filter.apply("password is hunter2 ok"),
            format!("password is {DEFAULT_REPLACEMENT} ok")
        );
    }

    #[test]
    fn masks_with_custom_replacement() {
        let filter =
            SensitiveFilter::new(&[FilterPair::with_replacement("Alice", "the user")]).unwrap();
        assert_eq!(filter.apply("Alice logged in"), "the user logged in");
    }

    #[test]
    fn longest_match_wins() {
        let filter = SensitiveFilter::new(&[
            FilterPair::with_replacement("secret", "S"),
            FilterPair::with_replacement("secret key", "SK"),
        ])
        .unwrap();
        assert_eq!(filter.apply("the secret key"), "the SK");
    }

    #[test]
    fn empty_filter_is_identity() {
        let filter = SensitiveFilter::new(&[]).unwrap();
        assert_eq!(filter.apply("unchanged"), "unchanged");
    }

    #[test]
    fn empty_term_is_rejected() {
        assert!(matches!(
            SensitiveFilter::new(&[FilterPair::new("")]),
            Err(ExtractError::InvalidRule { .. })
        ));
    }
}
