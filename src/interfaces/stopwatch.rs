//! Timing subsystem interfaces.
//!
//! The timing subsystem is optional. Hosts choose an implementation once, at
//! configuration time, and inject it; a no-op implementation satisfies the
//! same traits when timing is disabled.

use std::sync::Arc;

/// Process-wide stopwatch handing out per-request sections.
pub trait Stopwatch: Send + Sync {
    /// The timing section for one request.
    fn scope_for_request(&self, request_id: &str) -> Arc<dyn StopwatchSection>;
}

/// Timing scope bound to a single request.
pub trait StopwatchSection: Send + Sync {
    /// Start a named span in `category`.
    fn start(&self, name: &str, category: &str) -> Arc<dyn StopwatchEvent>;
}

/// A running span.
pub trait StopwatchEvent: Send + Sync {
    /// Stop the span. Only the first call has an effect.
    fn stop(&self);

    /// Close the current period and open a new one.
    fn lap(&self);
}

/// Time source for call record timestamps.
pub trait Clock: Send + Sync {
    /// Microseconds since the Unix epoch.
    fn now_micros(&self) -> u64;
}
