pub mod assistant;
pub mod chaos;
pub mod llm;
pub mod routing;

pub use assistant::{Assistant, ProcessedMessage};
pub use chaos::{ChaosReport, ChaosService, PatternSuggestion};
pub use llm::{
    AnthropicProvider, LlmConfig, LlmError, LlmMessage, LlmProvider, LlmResponse, LlmRole,
    MockProvider, OpenAiProvider,
};
pub use routing::{ModelRouter, RouteOutcome};

use rq_core::config::ConfigError;
use rq_core::store::StoreError;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Crate-level error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum IntelligenceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
