//! Context-aware routing of chat messages to LLM backends.

pub mod context;
pub mod mentions;
pub mod prompts;
pub mod router;

pub use context::{ContextGatherer, ContextItem, RoutingContext};
pub use mentions::{parse_mentions, ParsedMessage};
pub use prompts::build_system_prompt;
pub use router::{Backend, BackendFailure, BackendResponse, ModelRouter, RouteOutcome};
