//! Mention-driven fan-out to chat backends.
//!
//! Unaddressed messages go to a single backend chosen by a keyword
//! heuristic; `@name` mentions pick backends explicitly and `@all` picks
//! every one. Selected backends are called concurrently, each under its own
//! timeout, and a failing backend never fails the whole route.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use rq_core::config::{BackendConfig, Config, ConfigError, Persona, RoutingConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::context::RoutingContext;
use super::prompts::build_system_prompt;
use crate::llm::{build_provider, LlmConfig, LlmError, LlmMessage, LlmProvider};

/// Mention token addressing every backend.
pub const ALL_MENTION: &str = "all";

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// A named chat backend with its persona and generation settings.
pub struct Backend {
    pub name: String,
    pub persona: Persona,
    pub aliases: Vec<String>,
    pub config: LlmConfig,
    provider: Arc<dyn LlmProvider>,
}

impl Backend {
    pub fn new(
        name: impl Into<String>,
        persona: Persona,
        provider: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            persona,
            aliases: Vec::new(),
            config: LlmConfig::default(),
            provider,
        }
    }

    /// Build from a `[[backends]]` section, resolving its API key.
    pub fn from_config(section: &BackendConfig) -> Result<Self, ConfigError> {
        let provider = build_provider(section)?;
        Ok(Self::new(section.name.clone(), section.persona, provider)
            .with_aliases(section.aliases.iter().cloned())
            .with_config(LlmConfig::from_backend(section)))
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    pub fn with_config(mut self, config: LlmConfig) -> Self {
        self.config = config;
        self
    }

    fn addressed_by(&self, mentions: &BTreeSet<String>) -> bool {
        mentions.contains(&self.name) || self.aliases.iter().any(|a| mentions.contains(a))
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("persona", &self.persona)
            .field("aliases", &self.aliases)
            .field("model", &self.config.model)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendResponse {
    pub backend: String,
    pub content: String,
    pub model: String,
    /// Input plus output tokens.
    pub tokens_used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendFailure {
    pub backend: String,
    pub error: String,
}

/// Successful responses in completion order, plus the backends that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOutcome {
    pub responses: Vec<BackendResponse>,
    pub failures: Vec<BackendFailure>,
}

// ---------------------------------------------------------------------------
// ModelRouter
// ---------------------------------------------------------------------------

pub struct ModelRouter {
    backends: Vec<Backend>,
    technical_keywords: Vec<String>,
    timeout: Duration,
}

impl ModelRouter {
    pub fn new(config: &RoutingConfig) -> Self {
        Self {
            backends: Vec::new(),
            technical_keywords: config
                .technical_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
            timeout: Duration::from_secs(config.backend_timeout_secs),
        }
    }

    /// Router with every configured backend. Fails on the first backend whose
    /// credential is missing.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let mut router = Self::new(&config.routing);
        for section in &config.backends {
            router.register(Backend::from_config(section)?);
        }
        Ok(router)
    }

    pub fn register(&mut self, backend: Backend) {
        debug!(backend = %backend.name, persona = ?backend.persona, "registered backend");
        self.backends.push(backend);
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.register(backend);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// Case-insensitive substring scan for technical keywords.
    pub fn is_technical_query(&self, message: &str) -> bool {
        let lower = message.to_lowercase();
        self.technical_keywords
            .iter()
            .any(|k| !k.is_empty() && lower.contains(k.as_str()))
    }

    /// Backends a message is dispatched to, in registration order.
    pub fn select_targets(&self, message: &str, mentions: &BTreeSet<String>) -> Vec<&Backend> {
        if mentions.is_empty() {
            let persona = if self.is_technical_query(message) {
                Persona::Technical
            } else {
                Persona::Creative
            };
            return self
                .backends
                .iter()
                .find(|b| b.persona == persona)
                .or_else(|| self.backends.first())
                .into_iter()
                .collect();
        }
        if mentions.contains(ALL_MENTION) {
            return self.backends.iter().collect();
        }
        self.backends
            .iter()
            .filter(|b| b.addressed_by(mentions))
            .collect()
    }

    /// Dispatch `message` to every selected backend concurrently.
    pub async fn route(
        &self,
        message: &str,
        mentions: &BTreeSet<String>,
        ctx: &RoutingContext,
    ) -> RouteOutcome {
        let targets = self.select_targets(message, mentions);
        let target_names: Vec<&str> = targets.iter().map(|b| b.name.as_str()).collect();
        info!(targets = ?target_names, ?mentions, "routing message");

        let timeout = self.timeout;
        let mut pending: FuturesUnordered<_> = targets
            .into_iter()
            .map(|backend| {
                let config = backend
                    .config
                    .clone()
                    .with_system_prompt(build_system_prompt(backend.persona, ctx));
                let messages = vec![LlmMessage::user(message)];
                async move {
                    let result =
                        tokio::time::timeout(timeout, backend.provider.complete(&messages, &config))
                            .await
                            .unwrap_or_else(|_elapsed| Err(LlmError::Timeout));
                    (backend, result)
                }
            })
            .collect();

        let mut outcome = RouteOutcome::default();
        while let Some((backend, result)) = pending.next().await {
            match result {
                Ok(resp) => outcome.responses.push(BackendResponse {
                    backend: backend.name.clone(),
                    tokens_used: resp.total_tokens(),
                    content: resp.content,
                    model: resp.model,
                }),
                Err(err) => {
                    warn!(backend = %backend.name, error = %err, "backend call failed");
                    outcome.failures.push(BackendFailure {
                        backend: backend.name.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockProvider;

    fn mentions(tokens: &[&str]) -> BTreeSet<String> {
        tokens.iter().map(|s| s.to_string()).collect()
    }

    fn router() -> ModelRouter {
        ModelRouter::new(&RoutingConfig::default())
            .with_backend(Backend::new(
                "claude",
                Persona::Technical,
                Arc::new(MockProvider::new()),
            ))
            .with_backend(
                Backend::new("chatgpt", Persona::Creative, Arc::new(MockProvider::new()))
                    .with_aliases(["gpt"]),
            )
    }

    fn names(targets: Vec<&Backend>) -> Vec<&str> {
        targets.into_iter().map(|b| b.name.as_str()).collect()
    }

    #[test]
    fn technical_heuristic_is_case_insensitive_substring() {
        let r = router();
        assert!(r.is_technical_query("Debug the API"));
        assert!(r.is_technical_query("rebuild everything")); // contains "build"
        assert!(!r.is_technical_query("plan my weekend"));
    }

    #[test]
    fn unaddressed_technical_goes_to_technical_backend_only() {
        let r = router();
        assert_eq!(names(r.select_targets("debug the api", &mentions(&[]))), vec!["claude"]);
    }

    #[test]
    fn unaddressed_other_goes_to_creative_backend() {
        let r = router();
        assert_eq!(
            names(r.select_targets("write a haiku", &mentions(&[]))),
            vec!["chatgpt"]
        );
    }

    #[test]
    fn all_selects_every_backend() {
        let r = router();
        assert_eq!(
            names(r.select_targets("hi", &mentions(&["all", "claude"]))),
            vec!["claude", "chatgpt"]
        );
    }

    #[test]
    fn alias_and_name_fold_to_one_dispatch() {
        let r = router();
        assert_eq!(
            names(r.select_targets("hi", &mentions(&["gpt", "chatgpt"]))),
            vec!["chatgpt"]
        );
    }

    #[test]
    fn unknown_mentions_select_nothing() {
        let r = router();
        assert!(r.select_targets("hi", &mentions(&["gemini"])).is_empty());
    }

    #[test]
    fn missing_persona_falls_back_to_first_backend() {
        let r = ModelRouter::new(&RoutingConfig::default()).with_backend(Backend::new(
            "local",
            Persona::Technical,
            Arc::new(MockProvider::new()),
        ));
        assert_eq!(names(r.select_targets("write a poem", &mentions(&[]))), vec!["local"]);
    }

    #[tokio::test]
    async fn no_targets_yields_empty_outcome() {
        let outcome = router()
            .route("hi", &mentions(&["nobody"]), &RoutingContext::default())
            .await;
        assert_eq!(outcome, RouteOutcome::default());
    }

    #[tokio::test]
    async fn tokens_used_sums_input_and_output() {
        let r = ModelRouter::new(&RoutingConfig::default()).with_backend(Backend::new(
            "claude",
            Persona::Technical,
            Arc::new(MockProvider::new().with_text("ok", 120, 30)),
        ));
        let outcome = r
            .route("hi", &mentions(&["claude"]), &RoutingContext::default())
            .await;
        assert_eq!(outcome.responses.len(), 1);
        assert_eq!(outcome.responses[0].tokens_used, 150);
        assert_eq!(outcome.responses[0].backend, "claude");
    }

    #[tokio::test]
    async fn slow_backend_times_out_into_failure() {
        let r = ModelRouter::new(&RoutingConfig::default())
            .with_backend(Backend::new(
                "claude",
                Persona::Technical,
                Arc::new(MockProvider::new().with_delay(Duration::from_secs(5))),
            ))
            .with_backend(Backend::new(
                "chatgpt",
                Persona::Creative,
                Arc::new(MockProvider::new()),
            ))
            .with_timeout(Duration::from_millis(50));

        let outcome = r
            .route("hi", &mentions(&["all"]), &RoutingContext::default())
            .await;
        assert_eq!(outcome.responses.len(), 1);
        assert_eq!(outcome.responses[0].backend, "chatgpt");
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].backend, "claude");
        assert!(outcome.failures[0].error.contains("timed out"));
    }
}
