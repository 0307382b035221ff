//! Settings mutation with validation.
//!
//! All user edits go through these methods so an invalid value never reaches
//! disk. Validation is on entry only; `load` trusts the file.

use glance_extract::{FilterPair, UrlRule};

use crate::{MAX_PROMPT_LENGTH, Settings};

/// Minimum plausible length for a literal API key.
const MIN_API_KEY_LENGTH: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("could not determine home directory")]
    NoHomeDir,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config file is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("{field}: {message}")]
    Invalid { field: String, message: String },

    #[error("{field}: entry already exists")]
    Duplicate { field: String },
}

fn invalid(field: &str, message: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        field: field.to_string(),
        message: message.into(),
    }
}

impl Settings {
    /// Set the API key. A `${VAR}` reference is accepted as-is; a literal key
    /// must look like one.
    pub fn set_api_key(&mut self, key: &str) -> Result<(), SettingsError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(invalid("api_key", "must not be empty"));
        }
        if !key.starts_with("${") && key.len() <= MIN_API_KEY_LENGTH {
            return Err(invalid("api_key", "too short to be a valid key"));
        }
        self.api_key = key.to_string();
        Ok(())
    }

    /// Set or clear the custom summary prompt.
    pub fn set_summary_prompt(&mut self, prompt: Option<&str>) -> Result<(), SettingsError> {
        match prompt {
            None => self.summary_prompt = None,
            Some(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Err(invalid("summary_prompt", "must not be empty"));
                }
                if text.chars().count() > MAX_PROMPT_LENGTH {
                    return Err(invalid(
                        "summary_prompt",
                        format!("longer than {MAX_PROMPT_LENGTH} characters"),
                    ));
                }
                self.summary_prompt = Some(text.to_string());
            }
        }
        Ok(())
    }

    pub fn add_sensitive_filter(&mut self, pair: FilterPair) -> Result<(), SettingsError> {
        if pair.sensitive.is_empty() {
            return Err(invalid("sensitive_filters", "term must not be empty"));
        }
        if self
            .sensitive_filters
            .iter()
            .any(|p| p.sensitive == pair.sensitive)
        {
            return Err(SettingsError::Duplicate {
                field: "sensitive_filters".to_string(),
            });
        }
        self.sensitive_filters.push(pair);
        Ok(())
    }

    pub fn remove_sensitive_filter(&mut self, term: &str) -> bool {
        let before = self.sensitive_filters.len();
        self.sensitive_filters.retain(|p| p.sensitive != term);
        self.sensitive_filters.len() != before
    }

    /// Add a forbidden-URL rule after checking that it parses.
    pub fn add_forbidden_url(&mut self, raw: &str) -> Result<(), SettingsError> {
        let raw = raw.trim();
        UrlRule::parse(raw).map_err(|err| invalid("forbidden_urls", err.to_string()))?;
        if self.forbidden_urls.iter().any(|r| r == raw) {
            return Err(SettingsError::Duplicate {
                field: "forbidden_urls".to_string(),
            });
        }
        self.forbidden_urls.push(raw.to_string());
        Ok(())
    }

    pub fn remove_forbidden_url(&mut self, raw: &str) -> bool {
        let before = self.forbidden_urls.len();
        self.forbidden_urls.retain(|r| r != raw);
        self.forbidden_urls.len() != before
    }

    pub fn add_advanced_rule(&mut self, rule: crate::AdvancedRule) -> Result<(), SettingsError> {
        let trimmed = rule.url.trim();
        UrlRule::parse(trimmed).map_err(|err| invalid("advanced_rules", err.to_string()))?;
        if rule.script.trim().is_empty() {
            return Err(invalid("advanced_rules", "script must not be empty"));
        }
        if self.advanced_rules.iter().any(|r| r.url == trimmed) {
            return Err(SettingsError::Duplicate {
                field: "advanced_rules".to_string(),
            });
        }
        self.advanced_rules.push(crate::AdvancedRule {
            url: trimmed.to_string(),
            script: rule.script,
        });
        Ok(())
    }

    pub fn remove_advanced_rule(&mut self, url: &str) -> bool {
        let before = self.advanced_rules.len();
        self.advanced_rules.retain(|r| r.url != url);
        self.advanced_rules.len() != before
    }
}
