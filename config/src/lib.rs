//! Persistent user settings and per-request resolution.
//!
//! Settings live in `~/.glance/config.toml`. Every generation request starts
//! from [`Settings::resolve_request`], which snapshots the stored values into
//! an immutable [`RequestParams`] so that edits made while a response is
//! streaming never affect the request in flight.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use glance_extract::{FilterPair, UrlRule};
use glance_types::{ApiKey, ChatRole, GenerateError, RequestParams, ResponseMode};

mod validate;

pub use validate::SettingsError;

/// Model used when the user has not picked one.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Prompt prefix for page summaries when the user has not customized it.
pub const DEFAULT_PROMPT: &str =
    "Summarize the following page content concisely, in the language the page is written in:";

/// Upper bound on a custom summary prompt.
pub const MAX_PROMPT_LENGTH: usize = 500;

/// A URL paired with a content-selection script to run on matching pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvancedRule {
    pub url: String,
    pub script: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub api_key: String,
    pub model: Option<String>,
    pub summary_prompt: Option<String>,
    pub response_mode: ResponseMode,
    pub sensitive_filters: Vec<FilterPair>,
    pub forbidden_urls: Vec<String>,
    pub advanced_rules: Vec<AdvancedRule>,
}

impl Settings {
    /// Load settings from disk. `Ok(None)` means no config file exists yet.
    pub fn load() -> Result<Option<Self>, SettingsError> {
        Self::load_from(&Self::path()?)
    }

    fn load_from(path: &Path) -> Result<Option<Self>, SettingsError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let settings = toml::from_str(&content)?;
        Ok(Some(settings))
    }

    /// Load settings, falling back to defaults when missing or unreadable.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(Some(settings)) => settings,
            Ok(None) => Self::default(),
            Err(err) => {
                tracing::warn!("failed to load settings, using defaults: {err}");
                Self::default()
            }
        }
    }

    /// Persist settings, creating `~/.glance/` if needed.
    ///
    /// Writes to a temp file and renames it over the config so a crash
    /// mid-write never leaves a truncated file.
    pub fn save(&self) -> Result<(), SettingsError> {
        self.save_to(&Self::path()?)
    }

    fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        let tmp = path.with_extension("toml.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn path() -> Result<PathBuf, SettingsError> {
        dirs::home_dir()
            .map(|home| home.join(".glance").join("config.toml"))
            .ok_or(SettingsError::NoHomeDir)
    }

    /// The model to request, after defaulting.
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// The summary prompt prefix, after defaulting.
    pub fn summary_prompt(&self) -> &str {
        self.summary_prompt.as_deref().unwrap_or(DEFAULT_PROMPT)
    }

    /// Parse the stored forbidden-URL rules, skipping ones that no longer
    /// parse (they are validated on entry, so this covers hand-edited files).
    pub fn url_rules(&self) -> Vec<UrlRule> {
        self.forbidden_urls
            .iter()
            .filter_map(|raw| match UrlRule::parse(raw) {
                Ok(rule) => Some(rule),
                Err(err) => {
                    tracing::warn!("ignoring unparseable URL rule: {err}");
                    None
                }
            })
            .collect()
    }

    /// Snapshot the settings into the parameters for one generation request.
    ///
    /// For [`ChatRole::Summary`] the prompt is the configured prefix followed
    /// by the page content; for follow-up questions the content is sent
    /// verbatim. Fails fast with [`GenerateError::MissingCredential`] when no
    /// API key is configured, before any network work starts.
    pub fn resolve_request(
        &self,
        role: ChatRole,
        content: &str,
    ) -> Result<RequestParams, GenerateError> {
        let key = expand_env_vars(self.api_key.trim());
        if key.is_empty() {
            return Err(GenerateError::MissingCredential);
        }

        let prompt = match role {
            ChatRole::Summary => format!("{}\n\n{}", self.summary_prompt(), content),
            ChatRole::User | ChatRole::Ai => content.to_string(),
        };

        Ok(RequestParams {
            prompt,
            api_key: ApiKey::new(key),
            model: self.model().to_string(),
            mode: self.response_mode,
        })
    }
}

/// Expand `${VAR}` references from the environment. Unknown variables expand
/// to the empty string.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut i = 0;

    while i < value.len() {
        if value[i..].starts_with("${") {
            let start = i + 2;
            if let Some(end_rel) = value[start..].find('}') {
                let end = start + end_rel;
                let var = &value[start..end];
                if !var.is_empty() {
                    let replacement = env::var(var).unwrap_or_default();
                    out.push_str(&replacement);
                }
                i = end + 1;
                continue;
            }
        }

        let ch = value[i..].chars().next().unwrap_or_default();
        out.push(ch);
        i += ch.len_utf8();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let settings = Settings::default();
        assert_eq!(settings.model(), DEFAULT_MODEL);
        assert_eq!(settings.summary_prompt(), DEFAULT_PROMPT);
        assert_eq!(settings.response_mode, ResponseMode::Stream);
    }

    #[test]
    fn resolve_fails_without_api_key() {
        let settings = Settings::default();
        assert!(matches!(
            settings.resolve_request(ChatRole::Summary, "page"),
            Err(GenerateError::MissingCredential)
        ));
    }

    #[test]
    fn summary_request_prefixes_prompt() {
        let settings = Settings {
            api_key: "k-0123456789".into(),
            ..Settings::default()
        };
        let params = settings
            .resolve_request(ChatRole::Summary, "page body")
            .unwrap();
        assert!(params.prompt.starts_with(DEFAULT_PROMPT));
        assert!(params.prompt.ends_with("page body"));
        assert_eq!(params.model, DEFAULT_MODEL);
    }

    #[test]
    fn followup_request_is_verbatim() {
        let settings = Settings {
            api_key: "k-0123456789".into(),
            ..Settings::default()
        };
        let params = settings
            .resolve_request(ChatRole::User, "what about rust?")
            .unwrap();
        assert_eq!(params.prompt, "what about rust?");
    }

    #[test]
    fn custom_prompt_and_model_are_used() {
        let settings = Settings {
            api_key: "k-0123456789".into(),
            model: Some("gemini-1.5-pro".into()),
            summary_prompt: Some("TL;DR:".into()),
            ..Settings::default()
        };
        let params = settings.resolve_request(ChatRole::Summary, "text").unwrap();
        assert_eq!(params.prompt, "TL;DR:\n\ntext");
        assert_eq!(params.model, "gemini-1.5-pro");
    }

    #[test]
    fn expands_env_vars_in_api_key() {
        // Env mutation is process-global; the var name is unique to the test.
        unsafe { env::set_var("GLANCE_TEST_KEY_VAR", "k-from-env-12345") };
        let settings = Settings {
            api_key: "${GLANCE_TEST_KEY_VAR}".into(),
            ..Settings::default()
        };
        let params = settings.resolve_request(ChatRole::User, "q").unwrap();
        assert_eq!(params.api_key.expose_secret(), "k-from-env-12345");
    }

    #[test]
    fn unknown_env_var_expands_empty() {
        assert_eq!(expand_env_vars("${GLANCE_DOES_NOT_EXIST_XYZ}"), "");
        assert_eq!(expand_env_vars("plain"), "plain");
        assert_eq!(expand_env_vars("a${}b"), "ab");
    }

    #[test]
    fn roundtrips_through_toml() {
        let settings = Settings {
            api_key: "k-0123456789".into(),
            model: Some("gemini-1.5-pro".into()),
            summary_prompt: None,
            response_mode: ResponseMode::Json,
            sensitive_filters: vec![FilterPair::with_replacement("secret", "x")],
            forbidden_urls: vec!["https://example.com/".into(), r"R:\.bank\.".into()],
            advanced_rules: vec![AdvancedRule {
                url: "https://docs.example.com/".into(),
                script: "selection".into(),
            }],
        };
        let text = toml::to_string_pretty(&settings).unwrap();
        let back: Settings = toml::from_str(&text).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn saves_and_reloads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".glance").join("config.toml");
        let settings = Settings {
            api_key: "k-0123456789".into(),
            forbidden_urls: vec!["https://example.com/".into()],
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        let back = Settings::load_from(&path).unwrap().unwrap();
        assert_eq!(back, settings);
        // No leftover temp file after the rename.
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(Settings::load_from(&path).unwrap().is_none());
    }

    #[test]
    fn unparseable_stored_rules_are_skipped() {
        let settings = Settings {
            forbidden_urls: vec!["R:[unclosed".into(), "https://ok.test/".into()],
            ..Settings::default()
        };
        assert_eq!(settings.url_rules().len(), 1);
    }
}
