//! Chat-completion backends.
//!
//! One async trait with Anthropic and OpenAI implementations, plus a scripted
//! [`MockProvider`] used by the router and assistant tests.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rq_core::config::{BackendConfig, ConfigError, CredentialProvider, ProviderKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_BASE_URL: &str = "https://api.openai.com";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failure of a single backend call.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Connection failure, DNS, TLS, etc.
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("request timed out")]
    Timeout,
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::HttpError(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Core data types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for LlmRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmRole::System => write!(f, "system"),
            LlmRole::User => write!(f, "user"),
            LlmRole::Assistant => write!(f, "assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
}

impl LlmMessage {
    pub fn new(role: LlmRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(LlmRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(LlmRole::User, content)
    }
}

/// Per-request generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: Option<String>,
}

impl LlmConfig {
    /// Generation settings declared in a `[[backends]]` section.
    pub fn from_backend(backend: &BackendConfig) -> Self {
        Self {
            model: backend.model.clone(),
            max_tokens: backend.max_tokens,
            temperature: backend.temperature,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-sonnet-20241022".to_string(),
            max_tokens: 1000,
            temperature: 0.7,
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub finish_reason: String,
}

impl LlmResponse {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

// ---------------------------------------------------------------------------
// LlmProvider trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a completion request and return the full response.
    async fn complete(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<LlmResponse, LlmError>;
}

/// Construct the provider a backend section asks for. Fails with
/// [`ConfigError::MissingCredential`] when its key variable is unset.
pub fn build_provider(backend: &BackendConfig) -> Result<Arc<dyn LlmProvider>, ConfigError> {
    let provider: Arc<dyn LlmProvider> = match backend.provider {
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::from_backend(backend)?),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::from_backend(backend)?),
    };
    Ok(provider)
}

/// Map 429 and other non-2xx statuses to [`LlmError`].
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, LlmError> {
    let status = resp.status();
    if status.as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        return Err(LlmError::RateLimited {
            retry_after_secs: retry_after,
        });
    }
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        return Err(LlmError::ApiError {
            status: status.as_u16(),
            message: text,
        });
    }
    Ok(resp)
}

// ---------------------------------------------------------------------------
// AnthropicProvider
// ---------------------------------------------------------------------------

/// Anthropic Messages API.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: ANTHROPIC_BASE_URL.to_string(),
        }
    }

    pub fn from_backend(backend: &BackendConfig) -> Result<Self, ConfigError> {
        let key = CredentialProvider::require(&backend.api_key_env)?;
        let provider = Self::new(key);
        Ok(match &backend.base_url {
            Some(url) => provider.with_base_url(url.clone()),
            None => provider,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// System text goes in the top-level `system` field; system-role
    /// messages are folded into it.
    pub fn build_request_body(messages: &[LlmMessage], config: &LlmConfig) -> serde_json::Value {
        let mut system_text = config.system_prompt.clone();
        let mut api_messages = Vec::with_capacity(messages.len());

        for msg in messages {
            if msg.role == LlmRole::System {
                match system_text.as_mut() {
                    Some(s) => {
                        s.push('\n');
                        s.push_str(&msg.content);
                    }
                    None => system_text = Some(msg.content.clone()),
                }
            } else {
                api_messages.push(serde_json::json!({
                    "role": msg.role.to_string(),
                    "content": msg.content,
                }));
            }
        }

        let mut body = serde_json::json!({
            "model": config.model,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "messages": api_messages,
        });
        if let Some(system) = system_text {
            body["system"] = serde_json::Value::String(system);
        }
        body
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct AnthropicContentBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<LlmResponse, LlmError> {
        let body = Self::build_request_body(messages, config);
        let url = format!("{}/v1/messages", self.base_url);

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let api_resp: AnthropicResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        // Only the first text block is surfaced.
        let content = api_resp
            .content
            .iter()
            .find_map(|block| block.text.clone())
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: api_resp.model,
            input_tokens: api_resp.usage.input_tokens,
            output_tokens: api_resp.usage.output_tokens,
            finish_reason: api_resp.stop_reason.unwrap_or_else(|| "unknown".into()),
        })
    }
}

// ---------------------------------------------------------------------------
// OpenAiProvider
// ---------------------------------------------------------------------------

/// OpenAI Chat Completions API (and compatible servers via `base_url`).
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: OPENAI_BASE_URL.to_string(),
        }
    }

    pub fn from_backend(backend: &BackendConfig) -> Result<Self, ConfigError> {
        let key = CredentialProvider::require(&backend.api_key_env)?;
        let provider = Self::new(key);
        Ok(match &backend.base_url {
            Some(url) => provider.with_base_url(url.clone()),
            None => provider,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// System prompt is prepended inline as the first message.
    pub fn build_request_body(messages: &[LlmMessage], config: &LlmConfig) -> serde_json::Value {
        let api_messages: Vec<serde_json::Value> = config
            .system_prompt
            .iter()
            .map(|system| serde_json::json!({ "role": "system", "content": system }))
            .chain(messages.iter().map(|msg| {
                serde_json::json!({
                    "role": msg.role.to_string(),
                    "content": msg.content,
                })
            }))
            .collect();

        serde_json::json!({
            "model": config.model,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "messages": api_messages,
        })
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
    model: String,
    usage: OpenAiUsage,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessageResp,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiMessageResp {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<LlmResponse, LlmError> {
        let body = Self::build_request_body(messages, config);
        let url = format!("{}/v1/chat/completions", self.base_url);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let api_resp: OpenAiResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let choice = api_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ParseError("no choices in response".into()))?;

        Ok(LlmResponse {
            content: choice.message.content.unwrap_or_default(),
            model: api_resp.model,
            input_tokens: api_resp.usage.prompt_tokens,
            output_tokens: api_resp.usage.completion_tokens,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "unknown".into()),
        })
    }
}

// ---------------------------------------------------------------------------
// MockProvider
// ---------------------------------------------------------------------------

type CapturedRequest = (Vec<LlmMessage>, LlmConfig);

/// Scripted provider for tests.
///
/// Each call to `complete` pops the next queued result; an empty queue yields
/// a default response. An optional delay simulates a slow backend.
pub struct MockProvider {
    responses: Arc<Mutex<VecDeque<Result<LlmResponse, LlmError>>>>,
    captured_requests: Arc<Mutex<Vec<CapturedRequest>>>,
    delay: Option<Duration>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            captured_requests: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    pub fn with_response(self, response: LlmResponse) -> Self {
        lock(&self.responses).push_back(Ok(response));
        self
    }

    /// Queue a response with the given text and token counts.
    pub fn with_text(self, content: impl Into<String>, input: u64, output: u64) -> Self {
        self.with_response(LlmResponse {
            content: content.into(),
            model: "mock-model".to_string(),
            input_tokens: input,
            output_tokens: output,
            finish_reason: "end_turn".to_string(),
        })
    }

    pub fn with_error(self, error: LlmError) -> Self {
        lock(&self.responses).push_back(Err(error));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn captured_requests(&self) -> Vec<CapturedRequest> {
        lock(&self.captured_requests).clone()
    }

    fn default_response(model: &str) -> LlmResponse {
        LlmResponse {
            content: "Mock response".to_string(),
            model: model.to_string(),
            input_tokens: 10,
            output_tokens: 5,
            finish_reason: "end_turn".to_string(),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(
        &self,
        messages: &[LlmMessage],
        config: &LlmConfig,
    ) -> Result<LlmResponse, LlmError> {
        lock(&self.captured_requests).push((messages.to_vec(), config.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Ok(Self::default_response(&config.model)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rq_core::config::{default_backends, Persona};

    fn test_config() -> LlmConfig {
        LlmConfig {
            model: "test-model".to_string(),
            max_tokens: 512,
            temperature: 0.5,
            system_prompt: None,
        }
    }

    #[tokio::test]
    async fn mock_provider_returns_default_response() {
        let provider = MockProvider::new();
        let resp = provider
            .complete(&[LlmMessage::user("Hello")], &test_config())
            .await
            .unwrap();
        assert_eq!(resp.content, "Mock response");
        assert_eq!(resp.model, "test-model");
        assert_eq!(resp.total_tokens(), 15);
    }

    #[tokio::test]
    async fn mock_provider_pops_queue_in_order() {
        let provider = MockProvider::new()
            .with_text("first", 1, 2)
            .with_error(LlmError::Timeout);
        let config = test_config();

        let first = provider.complete(&[], &config).await.unwrap();
        assert_eq!(first.content, "first");
        assert!(matches!(
            provider.complete(&[], &config).await,
            Err(LlmError::Timeout)
        ));
        // Queue drained: default again.
        let third = provider.complete(&[], &config).await.unwrap();
        assert_eq!(third.content, "Mock response");
    }

    #[tokio::test]
    async fn mock_provider_captures_requests() {
        let provider = MockProvider::new();
        let config = test_config().with_system_prompt("be brief");
        provider
            .complete(&[LlmMessage::user("Hello")], &config)
            .await
            .unwrap();

        let captured = provider.captured_requests();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].0[0].content, "Hello");
        assert_eq!(captured[0].1.system_prompt.as_deref(), Some("be brief"));
    }

    #[test]
    fn llm_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&LlmRole::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&LlmRole::Assistant).unwrap(), "\"assistant\"");
    }

    #[test]
    fn config_from_backend_section() {
        let backends = default_backends();
        let claude = &backends[0];
        assert_eq!(claude.persona, Persona::Technical);
        let cfg = LlmConfig::from_backend(claude);
        assert_eq!(cfg.model, "claude-3-5-sonnet-20241022");
        assert_eq!(cfg.max_tokens, 1000);
        assert!((cfg.temperature - 0.7).abs() < f32::EPSILON);
        assert!(cfg.system_prompt.is_none());
    }

    #[test]
    fn anthropic_body_puts_system_at_top_level() {
        let messages = vec![
            LlmMessage::system("extra rule"),
            LlmMessage::user("What is Rust?"),
        ];
        let config = test_config().with_system_prompt("You are helpful");
        let body = AnthropicProvider::build_request_body(&messages, &config);

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["max_tokens"], 512);
        assert_eq!(body["system"], "You are helpful\nextra rule");
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0]["role"], "user");
    }

    #[test]
    fn anthropic_body_without_system_omits_field() {
        let body =
            AnthropicProvider::build_request_body(&[LlmMessage::user("hi")], &test_config());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn openai_body_prepends_system_message() {
        let config = test_config().with_system_prompt("You are creative");
        let body = OpenAiProvider::build_request_body(&[LlmMessage::user("Plan my day")], &config);

        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[0]["content"], "You are creative");
        assert_eq!(msgs[1]["content"], "Plan my day");
        let temp = body["temperature"].as_f64().unwrap();
        assert!((temp - 0.5).abs() < 0.01);
    }

    #[test]
    fn build_provider_requires_credential() {
        let mut backend = default_backends().remove(1);
        backend.api_key_env = "RQ_TEST_NO_SUCH_OPENAI_KEY".into();
        match build_provider(&backend) {
            Err(ConfigError::MissingCredential(var)) => {
                assert_eq!(var, "RQ_TEST_NO_SUCH_OPENAI_KEY")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected missing credential"),
        }
    }
}
