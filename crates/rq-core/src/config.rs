use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::types::MAX_WINDOW_SECONDS;

/// Top-level configuration loaded from `~/.rhythmiq/config.toml`.
///
/// **Security**: This struct NEVER stores API keys. Each backend names the
/// environment variable holding its key; see [`CredentialProvider`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub chaos: ChaosConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            chaos: ChaosConfig::default(),
            routing: RoutingConfig::default(),
            backends: default_backends(),
        }
    }
}

impl Config {
    /// Load config from `~/.rhythmiq/config.toml`, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chaos.validate()?;
        self.routing.validate()?;
        validate_backends(&self.backends)
    }

    /// Look up a backend section by name.
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        self.backends.iter().find(|b| b.name == name)
    }

    pub fn default_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// Configured database file, or `rhythmiq.db` beside the default config.
    pub fn database_path(&self) -> PathBuf {
        match &self.general.database_path {
            Some(path) => PathBuf::from(path),
            None => Self::data_dir().join("rhythmiq.db"),
        }
    }

    fn data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rhythmiq")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("missing credential: environment variable {0} is not set")]
    MissingCredential(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    /// SQLite database file; `~/.rhythmiq/rhythmiq.db` when unset.
    #[serde(default)]
    pub database_path: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            database_path: None,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChaosConfig {
    /// Trailing window for activity metrics (`RAPID_CAPTURE_WINDOW`).
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    /// Ideas per window that trigger the rapid-capture nudge.
    #[serde(default = "default_rapid_capture_threshold")]
    pub rapid_capture_threshold: u32,
    #[serde(default = "default_task_switch_threshold")]
    pub task_switch_threshold: u32,
    #[serde(default = "default_task_creation_threshold")]
    pub task_creation_threshold: u32,
    #[serde(default = "default_urgency_keywords")]
    pub urgency_keywords: Vec<String>,
    #[serde(default)]
    pub thresholds: ChaosThresholds,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            window_seconds: default_window_seconds(),
            rapid_capture_threshold: default_rapid_capture_threshold(),
            task_switch_threshold: default_task_switch_threshold(),
            task_creation_threshold: default_task_creation_threshold(),
            urgency_keywords: default_urgency_keywords(),
            thresholds: ChaosThresholds::default(),
        }
    }
}

impl ChaosConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_seconds == 0 || self.window_seconds > MAX_WINDOW_SECONDS {
            return Err(ConfigError::Validation(format!(
                "chaos.window_seconds must be in 1..={MAX_WINDOW_SECONDS}, got {}",
                self.window_seconds
            )));
        }
        if self.urgency_keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "chaos.urgency_keywords must contain at least one keyword".to_string(),
            ));
        }
        self.thresholds.validate()
    }
}

fn default_window_seconds() -> u64 {
    600
}
fn default_rapid_capture_threshold() -> u32 {
    3
}
fn default_task_switch_threshold() -> u32 {
    5
}
fn default_task_creation_threshold() -> u32 {
    3
}

pub fn default_urgency_keywords() -> Vec<String> {
    [
        "urgent",
        "asap",
        "immediately",
        "need to",
        "should",
        "must",
        "critical",
        "important",
        "deadline",
        "rush",
        "quick",
        "fast",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// One band of the OR-of-thresholds rule. A signal strictly above a `max_*`
/// value (or strictly below `min_completion_ratio`) puts the user in the band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub max_capture_velocity: u32,
    pub max_task_switches: u32,
    pub max_urgency_keywords: u32,
    pub min_completion_ratio: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaosThresholds {
    #[serde(default = "default_spinning")]
    pub spinning: LevelThresholds,
    #[serde(default = "default_scattered")]
    pub scattered: LevelThresholds,
}

impl Default for ChaosThresholds {
    fn default() -> Self {
        Self {
            spinning: default_spinning(),
            scattered: default_scattered(),
        }
    }
}

impl ChaosThresholds {
    /// The spinning band must be at least as strict as the scattered band,
    /// otherwise the scattered check could never be reached for some signal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (sp, sc) = (&self.spinning, &self.scattered);
        let ordered = sp.max_capture_velocity >= sc.max_capture_velocity
            && sp.max_task_switches >= sc.max_task_switches
            && sp.max_urgency_keywords >= sc.max_urgency_keywords
            && sp.min_completion_ratio <= sc.min_completion_ratio;
        if !ordered {
            return Err(ConfigError::Validation(
                "chaos.thresholds.spinning must not be looser than chaos.thresholds.scattered"
                    .to_string(),
            ));
        }
        if sc.min_completion_ratio > 100 {
            return Err(ConfigError::Validation(
                "chaos.thresholds.scattered.min_completion_ratio must be <= 100".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_spinning() -> LevelThresholds {
    LevelThresholds {
        max_capture_velocity: 5,
        max_task_switches: 5,
        max_urgency_keywords: 10,
        min_completion_ratio: 50,
    }
}

fn default_scattered() -> LevelThresholds {
    LevelThresholds {
        max_capture_velocity: 2,
        max_task_switches: 2,
        max_urgency_keywords: 5,
        min_completion_ratio: 80,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Substrings that send an unaddressed message to the technical backend.
    #[serde(default = "default_technical_keywords")]
    pub technical_keywords: Vec<String>,
    /// Upper bound on a single backend call.
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,
    #[serde(default = "default_max_mits")]
    pub max_mits: usize,
    #[serde(default = "default_max_recent_ideas")]
    pub max_recent_ideas: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            technical_keywords: default_technical_keywords(),
            backend_timeout_secs: default_backend_timeout_secs(),
            max_mits: default_max_mits(),
            max_recent_ideas: default_max_recent_ideas(),
        }
    }
}

impl RoutingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "routing.backend_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn default_technical_keywords() -> Vec<String> {
    [
        "implement",
        "code",
        "function",
        "api",
        "database",
        "algorithm",
        "debug",
        "error",
        "technical",
        "architecture",
        "deploy",
        "build",
        "sql",
        "python",
        "javascript",
        "docker",
        "server",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_backend_timeout_secs() -> u64 {
    60
}
fn default_max_mits() -> usize {
    3
}
fn default_max_recent_ideas() -> usize {
    5
}

/// Which API a backend speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    OpenAi,
}

/// Prompt framing a backend receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    /// Engineering: implementation, code review, debugging.
    Technical,
    /// Brainstorming, planning, writing, strategy.
    Creative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Lower-case mention token, e.g. `claude` for `@claude`.
    pub name: String,
    pub provider: ProviderKind,
    pub persona: Persona,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Env var holding the API key.
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_max_tokens() -> u32 {
    1000
}
fn default_temperature() -> f32 {
    0.7
}

pub fn default_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig {
            name: "claude".into(),
            provider: ProviderKind::Anthropic,
            persona: Persona::Technical,
            aliases: Vec::new(),
            model: "claude-3-5-sonnet-20241022".into(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_key_env: "ANTHROPIC_API_KEY".into(),
            base_url: None,
        },
        BackendConfig {
            name: "chatgpt".into(),
            provider: ProviderKind::OpenAi,
            persona: Persona::Creative,
            aliases: vec!["gpt".into()],
            model: "gpt-4-turbo-preview".into(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            api_key_env: "OPENAI_API_KEY".into(),
            base_url: None,
        },
    ]
}

/// Names and aliases must be unique lower-case word tokens (so `@name` can
/// address them) and `all` is reserved.
fn validate_backends(backends: &[BackendConfig]) -> Result<(), ConfigError> {
    if backends.is_empty() {
        return Err(ConfigError::Validation(
            "at least one [[backends]] entry is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for backend in backends {
        for token in std::iter::once(&backend.name).chain(backend.aliases.iter()) {
            let valid = !token.is_empty()
                && token
                    .chars()
                    .all(|c| c.is_lowercase() || c.is_ascii_digit() || c == '_');
            if !valid {
                return Err(ConfigError::Validation(format!(
                    "backend token '{token}' must be a non-empty lower-case word"
                )));
            }
            if token == "all" {
                return Err(ConfigError::Validation(
                    "backend token 'all' is reserved".to_string(),
                ));
            }
            if !seen.insert(token.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "backend token '{token}' is declared more than once"
                )));
            }
        }
        if backend.max_tokens == 0 {
            return Err(ConfigError::Validation(format!(
                "backends.{}.max_tokens must be greater than zero",
                backend.name
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CredentialProvider
// ---------------------------------------------------------------------------

/// Reads credentials from environment variables at runtime.
///
/// Config stores env var *names*; this provider resolves them on demand.
pub struct CredentialProvider;

impl CredentialProvider {
    /// Read a credential from a named env var.
    pub fn from_env(var_name: &str) -> Option<String> {
        std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
    }

    /// Like [`from_env`](Self::from_env) but fails with
    /// [`ConfigError::MissingCredential`] when the variable is unset or blank.
    pub fn require(var_name: &str) -> Result<String, ConfigError> {
        Self::from_env(var_name).ok_or_else(|| ConfigError::MissingCredential(var_name.to_string()))
    }

    /// Backends in `config` whose key is present in the environment.
    pub fn available_backends(config: &Config) -> Vec<&str> {
        config
            .backends
            .iter()
            .filter(|b| Self::from_env(&b.api_key_env).is_some())
            .map(|b| b.name.as_str())
            .collect()
    }
}
