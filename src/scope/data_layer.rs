//! Host-facing entry point deciding, per request, which data service callers get.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::{RequestContext, RequestInfo, ServiceContainer};
use crate::collector::QueryCollector;
use crate::config::{Config, ConfigError};
use crate::interfaces::{DataService, Stopwatch};
use crate::proxy::RootServiceProxy;
use crate::stopwatch::{self, ProfilerStopwatch};

/// The booted data layer: shared service plus the request-scoping switch.
///
/// When scoping is enabled every request gets its own [`RootServiceProxy`]
/// tree over the shared service; otherwise callers get the shared service
/// itself and nothing is recorded.
pub struct DataLayer {
    config: Config,
    service: Arc<dyn DataService>,
    container: Arc<ServiceContainer>,
    profiler: Option<Arc<ProfilerStopwatch>>,
    scope_enabled: bool,
}

impl DataLayer {
    /// Validate `config` and wire the shared collaborators around `service`.
    pub fn boot(config: Config, service: Arc<dyn DataService>) -> Result<Self, ConfigError> {
        if let Err(err) = config.validate() {
            error!(error = %err, "Data layer configuration rejected");
            return Err(err);
        }

        let (stopwatch, profiler) = stopwatch::from_config(&config.profiler);
        let container = Arc::new(ServiceContainer::new(
            Arc::new(QueryCollector::new()),
            stopwatch,
        ));
        let scope_enabled = config.request_scope_enabled();

        info!(
            adapters = ?config.data.adapters,
            managers = config.data.managers.len(),
            scope_enabled,
            profiler = profiler.is_some(),
            "Data layer booted"
        );

        Ok(Self {
            config,
            service,
            container,
            profiler,
            scope_enabled,
        })
    }

    /// Whether requests get their own proxy tree.
    pub fn scope_enabled(&self) -> bool {
        self.scope_enabled
    }

    /// The data service to use while serving `request`.
    pub fn for_request(&self, request: RequestInfo) -> Arc<dyn DataService> {
        if !self.scope_enabled {
            return Arc::clone(&self.service);
        }

        debug!(
            request_id = %request.id,
            method = %request.method,
            path = %request.path,
            "Scoping data service to request"
        );
        let context = RequestContext::new(request, Arc::clone(&self.container));
        Arc::new(RootServiceProxy::new(Arc::clone(&self.service), context))
    }

    /// Release what the profiler kept for `request` once it has been reported.
    ///
    /// Profiler sections are otherwise held until removed, so long-running
    /// hosts call this at the end of every request. Call records stay in the
    /// collector until [`QueryCollector::clear`].
    pub fn finish_request(&self, request: &RequestInfo) {
        if let Some(section) = self
            .profiler
            .as_ref()
            .and_then(|profiler| profiler.remove_section(&request.id))
        {
            debug!(
                request_id = %request.id,
                spans = section.events().len(),
                "Released request profiler section"
            );
        }
    }

    /// The shared, unscoped data service.
    pub fn service(&self) -> &Arc<dyn DataService> {
        &self.service
    }

    pub fn collector(&self) -> &Arc<QueryCollector> {
        self.container.collector()
    }

    pub fn stopwatch(&self) -> &Arc<dyn Stopwatch> {
        self.container.stopwatch()
    }

    /// The profiler, when the timing subsystem is enabled.
    pub fn profiler(&self) -> Option<&Arc<ProfilerStopwatch>> {
        self.profiler.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The logger the data layer was configured with, if any.
    pub fn logger(&self) -> Option<&str> {
        self.config.logger().ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScopeFlag;
    use crate::interfaces::{Manager, Session};
    use crate::mock::MockDataService;
    use serde_json::json;

    fn boot(config: Config) -> Result<DataLayer, ConfigError> {
        let service = Arc::new(MockDataService::new(&config.data));
        DataLayer::boot(config, service)
    }

    #[test]
    fn test_boot_rejects_missing_adapters() {
        let err = boot(Config::default()).err().unwrap();
        assert!(matches!(err, ConfigError::NoAdapters));
    }

    #[test]
    fn test_boot_rejects_unknown_logger() {
        let mut config = Config::for_test();
        config.data.logging.logger = Some("@logger.audit".to_string());

        let err = boot(config).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownComponent(ref r) if r == "@logger.audit"));
    }

    #[test]
    fn test_unscoped_layer_hands_out_shared_service() {
        let layer = boot(Config::for_test()).unwrap();
        assert!(!layer.scope_enabled());

        let service = layer.for_request(RequestInfo::new("GET", "/"));
        assert!(Arc::ptr_eq(&service, layer.service()));
    }

    #[tokio::test]
    async fn test_scoped_layer_records_request_calls() {
        let mut config = Config::for_test();
        config.data.request_scope = Some(true);
        let layer = boot(config).unwrap();
        assert!(layer.scope_enabled());

        let service = layer.for_request(RequestInfo::new("GET", "/docs"));
        assert!(!Arc::ptr_eq(&service, layer.service()));

        let manager = service.create_session().get_manager("default").unwrap();
        manager.find("Doc", &json!(1)).await.unwrap();

        assert_eq!(layer.collector().len(), 1);
        assert!(layer.profiler().is_none());
    }

    #[tokio::test]
    async fn test_profiler_enables_scope_and_records_spans() {
        let mut config = Config::for_test();
        config.profiler.enabled = true;
        let layer = boot(config).unwrap();
        assert!(layer.scope_enabled());

        let request = RequestInfo::with_id("req-9", "GET", "/docs");
        let service = layer.for_request(request);
        let manager = service.create_session().get_manager("default").unwrap();
        manager.find_count_by("Doc", &json!({})).await.unwrap();

        let section = layer.profiler().unwrap().section("req-9").unwrap();
        assert_eq!(section.events()[0].name, "Doc.findCountBy");
    }

    #[tokio::test]
    async fn test_finish_request_releases_profiler_section() {
        let mut config = Config::for_test();
        config.profiler.enabled = true;
        let layer = boot(config).unwrap();

        let done = RequestInfo::with_id("req-1", "GET", "/docs");
        let open = RequestInfo::with_id("req-2", "GET", "/docs");
        for request in [&done, &open] {
            let manager = layer
                .for_request(request.clone())
                .create_session()
                .get_manager("default")
                .unwrap();
            manager.find_count_by("Doc", &json!({})).await.unwrap();
        }

        layer.finish_request(&done);
        layer.finish_request(&done);

        let profiler = layer.profiler().unwrap();
        assert!(profiler.section("req-1").is_none());
        assert_eq!(profiler.request_ids(), vec!["req-2"]);
        assert_eq!(layer.collector().len(), 2);
    }

    #[test]
    fn test_finish_request_without_profiler_is_noop() {
        let layer = boot(Config::for_test()).unwrap();
        layer.finish_request(&RequestInfo::new("GET", "/"));
        assert!(layer.profiler().is_none());
    }

    #[test]
    fn test_framework_switch_overrides_data_layer() {
        let mut config = Config::for_test();
        config.data.request_scope = Some(true);
        config.framework.scope.request = Some(ScopeFlag::Text("false".into()));

        let layer = boot(config).unwrap();
        assert!(!layer.scope_enabled());
    }

    #[test]
    fn test_logger_resolves_registered_component() {
        let mut config = Config::for_test();
        config.data.logging.logger = Some("@logger.default".to_string());

        let layer = boot(config).unwrap();
        assert_eq!(layer.logger(), Some("default"));
    }
}
