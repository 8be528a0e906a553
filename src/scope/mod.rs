//! Request scoping.
//!
//! A [`RequestContext`] pairs an inbound request with the scoped service
//! container and is threaded through every proxy of one request's tree.
//! [`DataLayer`] is the host hook that decides, per request, whether callers
//! get a fresh proxy tree or the shared data service.

mod data_layer;

use std::sync::Arc;

use uuid::Uuid;

use crate::collector::QueryCollector;
use crate::interfaces::Stopwatch;

pub use data_layer::DataLayer;

/// The inbound request a proxy tree serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestInfo {
    pub id: String,
    pub method: String,
    pub path: String,
}

impl RequestInfo {
    /// Describe a request, assigning it a fresh id.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            method: method.into(),
            path: path.into(),
        }
    }

    /// Describe a request with a caller-supplied id.
    pub fn with_id(id: impl Into<String>, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            path: path.into(),
        }
    }
}

/// Scoped dependencies resolved by request proxies.
pub struct ServiceContainer {
    collector: Arc<QueryCollector>,
    stopwatch: Arc<dyn Stopwatch>,
}

impl ServiceContainer {
    pub fn new(collector: Arc<QueryCollector>, stopwatch: Arc<dyn Stopwatch>) -> Self {
        Self {
            collector,
            stopwatch,
        }
    }

    /// The process-wide query collector.
    pub fn collector(&self) -> &Arc<QueryCollector> {
        &self.collector
    }

    /// The configured timing subsystem.
    pub fn stopwatch(&self) -> &Arc<dyn Stopwatch> {
        &self.stopwatch
    }
}

/// A request paired with its scoped container.
#[derive(Clone)]
pub struct RequestContext {
    request: Arc<RequestInfo>,
    container: Arc<ServiceContainer>,
}

impl RequestContext {
    pub fn new(request: RequestInfo, container: Arc<ServiceContainer>) -> Self {
        Self {
            request: Arc::new(request),
            container,
        }
    }

    pub fn request(&self) -> &RequestInfo {
        &self.request
    }

    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stopwatch::NoopStopwatch;

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestInfo::new("GET", "/articles");
        let b = RequestInfo::new("GET", "/articles");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_context_clones_share_container() {
        let collector = Arc::new(QueryCollector::new());
        let container = Arc::new(ServiceContainer::new(
            Arc::clone(&collector),
            Arc::new(NoopStopwatch),
        ));
        let context = RequestContext::new(RequestInfo::with_id("req-1", "GET", "/"), container);
        let clone = context.clone();

        assert_eq!(clone.request().id, "req-1");
        assert!(Arc::ptr_eq(clone.container().collector(), &collector));
    }
}
