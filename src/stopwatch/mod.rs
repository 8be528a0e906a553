//! Timing subsystem implementations.
//!
//! - [`NoopStopwatch`] - timing disabled; every call is a no-op
//! - [`ProfilerStopwatch`] - keeps per-request span summaries and records
//!   span durations through the `metrics` facade
//!
//! The choice is made once, from configuration, via [`from_config`]. The
//! profiler handle is kept alongside so its sections can be reported.

mod profiler;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::ProfilerConfig;
use crate::interfaces::{Clock, Stopwatch, StopwatchEvent, StopwatchSection};

pub use profiler::{EventSummary, ProfilerEvent, ProfilerSection, ProfilerStopwatch};

/// Select the stopwatch implementation for the configured profiler.
///
/// Returns the stopwatch to hand to request proxies and, when profiling is
/// enabled, the same instance as a [`ProfilerStopwatch`].
pub fn from_config(
    config: &ProfilerConfig,
) -> (Arc<dyn Stopwatch>, Option<Arc<ProfilerStopwatch>>) {
    if config.enabled {
        let profiler = Arc::new(ProfilerStopwatch::new());
        (Arc::clone(&profiler) as Arc<dyn Stopwatch>, Some(profiler))
    } else {
        (Arc::new(NoopStopwatch), None)
    }
}

/// Stopwatch used when the timing subsystem is not configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStopwatch;

impl Stopwatch for NoopStopwatch {
    fn scope_for_request(&self, _request_id: &str) -> Arc<dyn StopwatchSection> {
        Arc::new(NoopStopwatch)
    }
}

impl StopwatchSection for NoopStopwatch {
    fn start(&self, _name: &str, _category: &str) -> Arc<dyn StopwatchEvent> {
        Arc::new(NoopStopwatch)
    }
}

impl StopwatchEvent for NoopStopwatch {
    fn stop(&self) {}

    fn lap(&self) {}
}

/// Wall clock in microseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_stopwatch_never_fails() {
        let section = NoopStopwatch.scope_for_request("req-1");
        let event = section.start("bass.find", "bass");
        event.lap();
        event.stop();
        event.stop();
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock.now_micros() > 1_577_836_800_000_000);
    }

    #[test]
    fn test_from_config_selects_profiler_when_enabled() {
        let (stopwatch, profiler) = from_config(&ProfilerConfig { enabled: true });
        let section = stopwatch.scope_for_request("req-1");
        section.start("bass.find", "bass").stop();
        assert_eq!(profiler.unwrap().request_ids(), vec!["req-1"]);

        let (disabled, profiler) = from_config(&ProfilerConfig { enabled: false });
        disabled.scope_for_request("req-1").start("x", "y").stop();
        assert!(profiler.is_none());
    }
}
