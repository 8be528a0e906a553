//! In-process profiler stopwatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::histogram;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::debug;

use crate::interfaces::{Stopwatch, StopwatchEvent, StopwatchSection};

/// Stopwatch that keeps every span of every request until removed.
///
/// Stopped spans are also recorded in the
/// `data_scope_span_duration_seconds` histogram, labelled by category.
#[derive(Default)]
pub struct ProfilerStopwatch {
    sections: RwLock<HashMap<String, Arc<ProfilerSection>>>,
}

impl ProfilerStopwatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// The section for a request, if any span was started for it.
    pub fn section(&self, request_id: &str) -> Option<Arc<ProfilerSection>> {
        self.sections.read().get(request_id).cloned()
    }

    /// Drop a request's section once it has been reported.
    pub fn remove_section(&self, request_id: &str) -> Option<Arc<ProfilerSection>> {
        self.sections.write().remove(request_id)
    }

    /// Request ids with a live section.
    pub fn request_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sections.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Stopwatch for ProfilerStopwatch {
    fn scope_for_request(&self, request_id: &str) -> Arc<dyn StopwatchSection> {
        if let Some(section) = self.section(request_id) {
            return section;
        }
        let mut sections = self.sections.write();
        let section = sections
            .entry(request_id.to_string())
            .or_insert_with(|| Arc::new(ProfilerSection::new(request_id)));
        Arc::clone(section) as Arc<dyn StopwatchSection>
    }
}

/// All spans started for one request.
pub struct ProfilerSection {
    request_id: String,
    events: Mutex<Vec<Arc<ProfilerEvent>>>,
}

impl ProfilerSection {
    fn new(request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Summaries of every span, in start order.
    pub fn events(&self) -> Vec<EventSummary> {
        self.events.lock().iter().map(|e| e.summary()).collect()
    }
}

impl StopwatchSection for ProfilerSection {
    fn start(&self, name: &str, category: &str) -> Arc<dyn StopwatchEvent> {
        let event = Arc::new(ProfilerEvent::start(name, category));
        self.events.lock().push(Arc::clone(&event));
        event
    }
}

struct EventState {
    period_start: Instant,
    periods: Vec<Duration>,
    laps: usize,
    stopped: bool,
}

/// A span started through a [`ProfilerSection`].
pub struct ProfilerEvent {
    name: String,
    category: String,
    state: Mutex<EventState>,
}

impl ProfilerEvent {
    fn start(name: &str, category: &str) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            state: Mutex::new(EventState {
                period_start: Instant::now(),
                periods: Vec::new(),
                laps: 0,
                stopped: false,
            }),
        }
    }

    pub fn summary(&self) -> EventSummary {
        let state = self.state.lock();
        let mut duration: Duration = state.periods.iter().sum();
        if !state.stopped {
            duration += state.period_start.elapsed();
        }
        EventSummary {
            name: self.name.clone(),
            category: self.category.clone(),
            laps: state.laps,
            duration_micros: duration.as_micros() as u64,
            stopped: state.stopped,
        }
    }
}

impl StopwatchEvent for ProfilerEvent {
    fn stop(&self) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        let period = state.period_start.elapsed();
        state.periods.push(period);
        state.stopped = true;

        let total: Duration = state.periods.iter().sum();
        drop(state);

        histogram!(
            "data_scope_span_duration_seconds",
            "category" => self.category.clone()
        )
        .record(total.as_secs_f64());

        debug!(
            span = %self.name,
            category = %self.category,
            duration_us = total.as_micros() as u64,
            "Span stopped"
        );
    }

    fn lap(&self) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        let now = Instant::now();
        let period = now.duration_since(state.period_start);
        state.periods.push(period);
        state.period_start = now;
        state.laps += 1;
    }
}

/// Reporting view of one span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventSummary {
    pub name: String,
    pub category: String,
    pub laps: usize,
    pub duration_micros: u64,
    pub stopped: bool,
}
