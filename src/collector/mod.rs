//! Process-wide store of data-access call records.
//!
//! Every instrumented call made through a request proxy registers one
//! [`CallRecord`] here, grouped by adapter name. The reporting surface reads
//! the flattened, display-ready view from [`QueryCollector::collect_data`].

mod escape;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::interfaces::Clock;
use crate::stopwatch::SystemClock;

pub use escape::{
    escape_keys, has_placeholder_keys, has_reserved_keys, restore_reserved, DOLLAR_PLACEHOLDER,
    DOT_PLACEHOLDER,
};

/// Timing and metadata for one instrumented call.
///
/// `finished` stays `0` until the call settles, then holds a timestamp no
/// earlier than `started`. Both are microseconds since the Unix epoch.
#[derive(Debug)]
pub struct CallRecord {
    adapter: String,
    operation_name: String,
    data: Value,
    started: u64,
    finished: AtomicU64,
}

impl CallRecord {
    pub fn adapter(&self) -> &str {
        &self.adapter
    }

    pub fn operation_name(&self) -> &str {
        &self.operation_name
    }

    /// Recorded call arguments, with reserved key characters escaped.
    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn started(&self) -> u64 {
        self.started
    }

    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::Acquire)
    }

    pub fn is_pending(&self) -> bool {
        self.finished() == 0
    }

    /// Elapsed microseconds, or `None` while the call is still pending.
    pub fn process_time(&self) -> Option<u64> {
        match self.finished() {
            0 => None,
            finished => Some(finished - self.started),
        }
    }

    /// Stamp completion. Only the first call has an effect.
    pub fn finish(&self, at: u64) {
        let at = at.max(self.started).max(1);
        let _ = self
            .finished
            .compare_exchange(0, at, Ordering::AcqRel, Ordering::Acquire);
    }
}

/// One entry of the reporting view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectedQuery {
    pub adapter: String,
    /// Document type the call targeted, when the call named one.
    pub document: Option<String>,
    pub operation_name: String,
    pub date: DateTime<Utc>,
    pub started: u64,
    pub finished: u64,
    pub process_time: Option<u64>,
    /// Call arguments without the document name, keys still escaped.
    pub data: Value,
    /// Pretty-printed `data` with reserved characters restored.
    pub pretty: String,
}

/// Reporting payload: `{ "queries": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CollectedData {
    pub queries: Vec<CollectedQuery>,
}

/// Call records grouped by adapter name.
pub struct QueryCollector {
    adapters: RwLock<BTreeMap<String, Vec<Arc<CallRecord>>>>,
    clock: Arc<dyn Clock>,
}

impl Default for QueryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCollector {
    /// Create an empty collector using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty collector with a custom time source.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            adapters: RwLock::new(BTreeMap::new()),
            clock,
        }
    }

    /// Current timestamp from the collector's clock.
    pub fn now(&self) -> u64 {
        self.clock.now_micros()
    }

    /// Records saved for an adapter, creating the adapter entry if absent.
    pub fn get_adapter(&self, name: &str) -> Vec<Arc<CallRecord>> {
        if let Some(records) = self.adapters.read().get(name) {
            return records.clone();
        }
        self.adapters
            .write()
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// Register a new pending record and return the shared reference.
    pub fn save_query(&self, adapter: &str, operation_name: &str, data: Value) -> Arc<CallRecord> {
        if has_placeholder_keys(&data) {
            warn!(
                adapter = %adapter,
                operation = %operation_name,
                "Query data keys already contain escape placeholders; rendered keys are ambiguous"
            );
        }

        let record = Arc::new(CallRecord {
            adapter: adapter.to_string(),
            operation_name: operation_name.to_string(),
            data: escape_keys(data),
            started: self.now(),
            finished: AtomicU64::new(0),
        });

        self.adapters
            .write()
            .entry(adapter.to_string())
            .or_default()
            .push(Arc::clone(&record));

        debug!(adapter = %adapter, operation = %operation_name, "Call record saved");
        record
    }

    /// Stamp a record as finished now.
    pub fn complete(&self, record: &CallRecord) {
        record.finish(self.now());
    }

    /// Flatten all records into the display-ready view.
    pub fn collect_data(&self) -> CollectedData {
        let adapters = self.adapters.read();
        let queries = adapters
            .iter()
            .flat_map(|(adapter, records)| records.iter().map(move |r| collect_one(adapter, r)))
            .collect();
        CollectedData { queries }
    }

    /// Adapter names with at least one entry.
    pub fn adapter_names(&self) -> Vec<String> {
        self.adapters.read().keys().cloned().collect()
    }

    /// Total number of records across adapters.
    pub fn len(&self) -> usize {
        self.adapters.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.adapters.write().clear();
    }
}

fn collect_one(adapter: &str, record: &CallRecord) -> CollectedQuery {
    let mut data = record.data().clone();
    let document = match &mut data {
        Value::Object(map) => match map.remove("name") {
            Some(Value::String(name)) => Some(name),
            _ => None,
        },
        _ => None,
    };

    let pretty = serde_json::to_string_pretty(&data)
        .map(|text| restore_reserved(&text))
        .unwrap_or_default();

    CollectedQuery {
        adapter: adapter.to_string(),
        document,
        operation_name: record.operation_name().to_string(),
        date: DateTime::from_timestamp_micros(record.started() as i64).unwrap_or_default(),
        started: record.started(),
        finished: record.finished(),
        process_time: record.process_time(),
        data,
        pretty,
    }
}
