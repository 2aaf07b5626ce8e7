use rq_core::config::GeneralConfig;
use tracing_subscriber::{fmt, EnvFilter};

/// Output format for the global subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            LogFormat::Json
        } else {
            LogFormat::Human
        }
    }
}

/// `RUST_LOG` if set and valid, otherwise `default_level`
/// (e.g. "info" or "rq_intelligence=debug,warn").
pub fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Human-readable logging. Later calls are no-ops.
pub fn init_logging(service_name: &str, default_level: &str) {
    fmt()
        .with_env_filter(build_filter(default_level))
        .with_target(true)
        .with_thread_ids(false)
        .with_level(true)
        .try_init()
        .ok();

    tracing::debug!(service = service_name, "logging initialised (human-readable)");
}

/// JSON lines, one object per event. Later calls are no-ops.
pub fn init_logging_json(service_name: &str, default_level: &str) {
    fmt()
        .json()
        .with_env_filter(build_filter(default_level))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .try_init()
        .ok();

    tracing::debug!(service = service_name, "logging initialised (json)");
}

pub fn init(service_name: &str, default_level: &str, format: LogFormat) {
    match format {
        LogFormat::Human => init_logging(service_name, default_level),
        LogFormat::Json => init_logging_json(service_name, default_level),
    }
}

/// Initialise from the `[general]` config section. `force_json` overrides
/// `general.json_logs`.
pub fn init_from_config(service_name: &str, general: &GeneralConfig, force_json: bool) -> LogFormat {
    let format = LogFormat::from_json_flag(force_json || general.json_logs);
    init(service_name, &general.log_level, format);
    format
}
