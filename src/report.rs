//! Operator reporting payloads.
//!
//! Everything here serializes with `serde` so a host can hand it straight to
//! a JSON response or a log line.

use serde::Serialize;

use crate::collector::{CollectedData, QueryCollector};
use crate::config::Config;
use crate::proxy::DEFAULT_ADAPTER_NAME;
use crate::stopwatch::{EventSummary, ProfilerStopwatch};

/// Every collected call, as `{ "queries": [...] }`.
pub fn queries_report(collector: &QueryCollector) -> CollectedData {
    collector.collect_data()
}

/// One configured manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerSummary {
    pub name: String,
    pub adapter: String,
    pub documents: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ManagersReport {
    pub managers: Vec<ManagerSummary>,
}

/// Configured managers in name order, with their adapter and documents.
pub fn managers_report(config: &Config) -> ManagersReport {
    let managers = config
        .data
        .managers
        .iter()
        .map(|(name, manager)| ManagerSummary {
            name: name.clone(),
            adapter: if manager.adapter.is_empty() {
                DEFAULT_ADAPTER_NAME.to_string()
            } else {
                manager.adapter.clone()
            },
            documents: manager.documents.clone(),
        })
        .collect();
    ManagersReport { managers }
}

/// Timing spans of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionReport {
    pub request_id: String,
    pub events: Vec<EventSummary>,
}

/// Spans recorded for `request_id`, if the profiler saw that request.
pub fn section_report(profiler: &ProfilerStopwatch, request_id: &str) -> Option<SectionReport> {
    profiler.section(request_id).map(|section| SectionReport {
        request_id: section.request_id().to_string(),
        events: section.events(),
    })
}
