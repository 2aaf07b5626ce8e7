//! Logging setup shared by the `rq` binary and tests.
//!
//! Human-readable or JSON output through `tracing-subscriber`, with
//! `RUST_LOG` taking precedence over the configured level.

pub mod logging;
