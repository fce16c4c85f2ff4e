//! Configuration loading, validation, and management for fnrouter.
//!
//! Loads configuration from `~/.fnrouter/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.fnrouter/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Router loop settings
    #[serde(default)]
    pub router: RouterConfig,

    /// Routing hints appended after specific capabilities run
    #[serde(default)]
    pub hints: Vec<HintConfig>,

    /// Built-in capability settings
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "mistral".into()
}
fn default_model() -> String {
    "mistral-small-latest".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("router", &self.router)
            .field("hints", &self.hints)
            .field("capabilities", &self.capabilities)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Settings for the action-router loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Step ceiling: the run stops after this many steps without `done`
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,

    /// Query the model in streaming mode
    #[serde(default)]
    pub stream: bool,

    /// Extra workflow rules appended to the system prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_rules: Option<String>,

    /// Label prepended to every folded step result
    #[serde(default = "default_result_prefix")]
    pub result_prefix: String,
}

fn default_max_steps() -> u32 {
    15
}
fn default_result_prefix() -> String {
    "Result: ".into()
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            stream: false,
            workflow_rules: None,
            result_prefix: default_result_prefix(),
        }
    }
}

/// A routing hint rule.
///
/// After `capability` runs, one of the templates is appended as an extra user
/// turn depending on whether the result text was empty. Templates may refer to
/// run variables as `{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintConfig {
    pub capability: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_empty: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub when_present: Option<String>,
}

/// Settings for the built-in capabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    /// Which built-in capabilities to register
    #[serde(default = "default_enabled")]
    pub enabled: Vec<String>,

    /// Allowlist for `runCommand`. Empty = all commands allowed.
    #[serde(default)]
    pub allowed_commands: Vec<String>,

    /// Roots file capabilities may write under. Empty = anywhere not forbidden.
    #[serde(default)]
    pub allowed_roots: Vec<String>,

    /// Path prefixes file capabilities must never touch
    #[serde(default = "default_forbidden_paths")]
    pub forbidden_paths: Vec<String>,

    /// How long `openApp` waits after launching before returning
    #[serde(default = "default_launch_delay_ms")]
    pub launch_delay_ms: u64,

    /// Upper bound for `sleep`
    #[serde(default = "default_max_sleep_ms")]
    pub max_sleep_ms: u64,

    /// Timeout for `fetchUrl`
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Model used by `describeAndSummarise` (defaults to the router model)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_model: Option<String>,
}

fn default_enabled() -> Vec<String> {
    [
        "createFolder",
        "createFile",
        "openApp",
        "runCommand",
        "sleep",
        "fetchUrl",
        "describeAndSummarise",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_forbidden_paths() -> Vec<String> {
    vec![
        "/etc".into(),
        "/proc".into(),
        "/sys".into(),
        "~/.ssh".into(),
        "~/.gnupg".into(),
        "~/.aws".into(),
    ]
}
fn default_launch_delay_ms() -> u64 {
    2000
}
fn default_max_sleep_ms() -> u64 {
    60_000
}
fn default_fetch_timeout_secs() -> u64 {
    30
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            allowed_commands: vec![],
            allowed_roots: vec![],
            forbidden_paths: default_forbidden_paths(),
            launch_delay_ms: default_launch_delay_ms(),
            max_sleep_ms: default_max_sleep_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            summary_model: None,
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.fnrouter/config.toml).
    ///
    /// Environment variables override the file:
    /// - `FNROUTER_API_KEY`, then `MISTRAL_API_KEY`, then `OPENAI_API_KEY`
    /// - `FNROUTER_API_URL`: base URL of the default provider
    /// - `FNROUTER_PROVIDER`, `FNROUTER_MODEL`, `FNROUTER_MAX_STEPS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("FNROUTER_API_KEY")
                .or_else(|| lookup("MISTRAL_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("FNROUTER_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("FNROUTER_MODEL") {
            self.override_model(model);
        }

        if let Some(url) = lookup("FNROUTER_API_URL") {
            self.providers
                .entry(self.default_provider.clone())
                .or_default()
                .api_url = Some(url);
        }

        if let Some(steps) = lookup("FNROUTER_MAX_STEPS") {
            self.router.max_steps = steps.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "FNROUTER_MAX_STEPS must be a positive integer, got '{steps}'"
                ))
            })?;
        }

        self.validate()
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".fnrouter")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.router.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "router.max_steps must be at least 1".into(),
            ));
        }

        for hint in &self.hints {
            if hint.capability.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "hints.capability must not be empty".into(),
                ));
            }
            if hint.when_empty.is_none() && hint.when_present.is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "hint for '{}' needs when_empty or when_present",
                    hint.capability
                )));
            }
        }

        Ok(())
    }

    /// The model a run uses: the default provider's `default_model`, else the top-level one.
    pub fn active_model(&self) -> &str {
        self.providers
            .get(&self.default_provider)
            .and_then(|p| p.default_model.as_deref())
            .unwrap_or(&self.default_model)
    }

    /// Force `model` for the default provider, shadowing any per-provider model.
    pub fn override_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        if let Some(provider) = self.providers.get_mut(&self.default_provider) {
            provider.default_model = None;
        }
        self.default_model = model;
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            router: RouterConfig::default(),
            hints: vec![],
            capabilities: CapabilitiesConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
