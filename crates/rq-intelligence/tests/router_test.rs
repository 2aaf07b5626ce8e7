use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rq_core::config::{Persona, RoutingConfig};
use rq_intelligence::llm::{LlmError, LlmRole, MockProvider};
use rq_intelligence::routing::{parse_mentions, Backend, ModelRouter, RoutingContext};

fn pair(claude: Arc<MockProvider>, chatgpt: Arc<MockProvider>) -> ModelRouter {
    ModelRouter::new(&RoutingConfig::default())
        .with_backend(Backend::new("claude", Persona::Technical, claude))
        .with_backend(Backend::new("chatgpt", Persona::Creative, chatgpt).with_aliases(["gpt"]))
}

#[tokio::test]
async fn all_with_one_failing_backend_returns_the_other() {
    let claude = Arc::new(MockProvider::new().with_error(LlmError::ApiError {
        status: 401,
        message: "bad key".into(),
    }));
    let chatgpt = Arc::new(MockProvider::new().with_text("Here is a plan", 20, 40));
    let router = pair(claude, chatgpt);

    let parsed = parse_mentions("@all help me plan");
    let outcome = router
        .route(&parsed.cleaned, &parsed.mentions, &RoutingContext::default())
        .await;

    assert_eq!(outcome.responses.len(), 1);
    assert_eq!(outcome.responses[0].backend, "chatgpt");
    assert_eq!(outcome.responses[0].content, "Here is a plan");
    assert_eq!(outcome.responses[0].tokens_used, 60);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].backend, "claude");
    assert!(outcome.failures[0].error.contains("401"));
}

#[tokio::test]
async fn all_backends_failing_is_not_an_error() {
    let router = pair(
        Arc::new(MockProvider::new().with_error(LlmError::Timeout)),
        Arc::new(MockProvider::new().with_error(LlmError::RateLimited {
            retry_after_secs: Some(3),
        })),
    );
    let outcome = router
        .route("hi", &BTreeSet::from(["all".to_string()]), &RoutingContext::default())
        .await;
    assert!(outcome.responses.is_empty());
    assert_eq!(outcome.failures.len(), 2);
}

#[tokio::test]
async fn technical_message_reaches_only_technical_backend_with_its_prompt() {
    let claude = Arc::new(MockProvider::new());
    let chatgpt = Arc::new(MockProvider::new());
    let router = pair(claude.clone(), chatgpt.clone());

    let parsed = parse_mentions("debug the api");
    let outcome = router
        .route(&parsed.cleaned, &parsed.mentions, &RoutingContext::default())
        .await;
    assert_eq!(outcome.responses.len(), 1);
    assert_eq!(outcome.responses[0].backend, "claude");

    assert!(chatgpt.captured_requests().is_empty());
    let captured = claude.captured_requests();
    assert_eq!(captured.len(), 1);
    let (messages, config) = &captured[0];
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, LlmRole::User);
    assert_eq!(messages[0].content, "debug the api");
    let system = config.system_prompt.as_deref().unwrap();
    assert!(system.contains("engineering AI assistant"));
}

#[tokio::test]
async fn alias_mention_reaches_creative_backend_with_cleaned_text() {
    let claude = Arc::new(MockProvider::new());
    let chatgpt = Arc::new(MockProvider::new());
    let router = pair(claude.clone(), chatgpt.clone());

    let parsed = parse_mentions("@GPT write the deploy announcement");
    router
        .route(&parsed.cleaned, &parsed.mentions, &RoutingContext::default())
        .await;

    // An explicit mention overrides the technical keyword.
    assert!(claude.captured_requests().is_empty());
    let captured = chatgpt.captured_requests();
    assert_eq!(captured[0].0[0].content, "write the deploy announcement");
    assert!(captured[0]
        .1
        .system_prompt
        .as_deref()
        .unwrap()
        .starts_with("You are the creative AI assistant"));
}

#[tokio::test]
async fn all_dispatches_backends_concurrently() {
    let delay = Duration::from_millis(300);
    let router = pair(
        Arc::new(MockProvider::new().with_delay(delay)),
        Arc::new(MockProvider::new().with_delay(delay)),
    );

    let started = Instant::now();
    let outcome = router
        .route("hi", &BTreeSet::from(["all".to_string()]), &RoutingContext::default())
        .await;
    let elapsed = started.elapsed();

    assert_eq!(outcome.responses.len(), 2);
    assert!(outcome.failures.is_empty());
    // Sequential dispatch would take at least twice the delay.
    assert!(elapsed < delay * 2, "took {elapsed:?}");
}
