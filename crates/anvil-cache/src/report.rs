//! Progress and failure reporting for cache operations.

use tracing::{info, warn};

/// Receives the human-facing messages of a cache operation.
///
/// Cache failures never abort a run, so `error` is where they end up.
pub trait CacheReporter: Send + Sync {
    fn info(&self, message: &str);

    fn error(&self, message: &str);
}

/// Reporter that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl CacheReporter for TracingReporter {
    fn info(&self, message: &str) {
        info!(target: "anvil::cache", "{}", message);
    }

    fn error(&self, message: &str) {
        warn!(target: "anvil::cache", "{}", message);
    }
}
