use rq_core::config::{Config, ConfigError, CredentialProvider, Persona, ProviderKind};

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.general.log_level, "info");
    assert!(!cfg.general.json_logs);
    assert_eq!(cfg.chaos.window_seconds, 600);
    assert_eq!(cfg.chaos.rapid_capture_threshold, 3);
    assert_eq!(cfg.chaos.urgency_keywords.len(), 12);
    assert_eq!(cfg.chaos.thresholds.spinning.max_capture_velocity, 5);
    assert_eq!(cfg.chaos.thresholds.scattered.min_completion_ratio, 80);
    assert_eq!(cfg.routing.backend_timeout_secs, 60);
    assert!(cfg.routing.technical_keywords.contains(&"debug".to_string()));

    let claude = cfg.backend("claude").expect("claude backend");
    assert_eq!(claude.provider, ProviderKind::Anthropic);
    assert_eq!(claude.persona, Persona::Technical);
    let chatgpt = cfg.backend("chatgpt").expect("chatgpt backend");
    assert_eq!(chatgpt.aliases, vec!["gpt".to_string()]);
    assert_eq!(chatgpt.persona, Persona::Creative);
    cfg.validate().expect("defaults validate");
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("claude"));

    let parsed: Config = toml::from_str(&toml_str).expect("parse toml back");
    assert_eq!(parsed.chaos.window_seconds, cfg.chaos.window_seconds);
    assert_eq!(parsed.backends.len(), 2);
    parsed.validate().expect("config validates");
}

#[test]
fn config_partial_toml() {
    let partial = r#"
[general]
log_level = "debug"

[chaos]
window_seconds = 300
"#;
    let cfg: Config = toml::from_str(partial).expect("parse partial");
    assert_eq!(cfg.general.log_level, "debug");
    assert_eq!(cfg.chaos.window_seconds, 300);
    // defaults fill in the rest
    assert_eq!(cfg.chaos.rapid_capture_threshold, 3);
    assert_eq!(cfg.backends.len(), 2);
    cfg.validate().expect("config validates");
}

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[[backends]]
name = "local"
provider = "openai"
persona = "technical"
model = "llama-3"
api_key_env = "LOCAL_KEY"
base_url = "http://localhost:8000"
"#,
    )
    .unwrap();

    let cfg = Config::load_from(&path).expect("load");
    assert_eq!(cfg.backends.len(), 1);
    assert_eq!(cfg.backends[0].max_tokens, 1000);
    assert_eq!(cfg.backends[0].base_url.as_deref(), Some("http://localhost:8000"));
}

#[test]
fn load_from_missing_file_is_io_error() {
    let err = Config::load_from("/definitely/not/here.toml").unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn zero_window_fails_validation() {
    let mut cfg = Config::default();
    cfg.chaos.window_seconds = 0;
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("window_seconds"));
}

#[test]
fn inverted_thresholds_fail_validation() {
    let mut cfg = Config::default();
    cfg.chaos.thresholds.spinning.max_task_switches = 1;
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("thresholds"));
}

#[test]
fn reserved_and_duplicate_backend_tokens_rejected() {
    let mut cfg = Config::default();
    cfg.backends[0].aliases.push("all".into());
    assert!(cfg.validate().unwrap_err().to_string().contains("reserved"));

    let mut cfg = Config::default();
    cfg.backends[1].aliases.push("claude".into());
    assert!(cfg.validate().unwrap_err().to_string().contains("more than once"));

    let mut cfg = Config::default();
    cfg.backends[0].name = "Claude".into();
    assert!(cfg.validate().unwrap_err().to_string().contains("lower-case"));
}

#[test]
fn credential_provider_requires_set_variable() {
    let err = CredentialProvider::require("RQ_TEST_SURELY_UNSET_VAR").unwrap_err();
    assert!(matches!(err, ConfigError::MissingCredential(ref v) if v == "RQ_TEST_SURELY_UNSET_VAR"));
    assert!(CredentialProvider::from_env("RQ_TEST_SURELY_UNSET_VAR").is_none());
}

#[test]
fn empty_backend_list_rejected() {
    let cfg: Config = toml::from_str("backends = []").expect("parse");
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("at least one"));
}

#[test]
fn database_path_prefers_config() {
    let mut cfg = Config::default();
    assert!(cfg.database_path().ends_with(".rhythmiq/rhythmiq.db"));
    cfg.general.database_path = Some("/tmp/custom.db".into());
    assert_eq!(cfg.database_path(), std::path::PathBuf::from("/tmp/custom.db"));
}
