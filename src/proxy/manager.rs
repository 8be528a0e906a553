//! Request-scoped instrumentation of a manager.
//!
//! Wraps a shared manager so that every query-like call made during a
//! request leaves a call record in the [`QueryCollector`] and a timing span in
//! the request's stopwatch section, without altering arguments, results or
//! errors.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::debug;
use trivial_delegation::trivial_delegation;

use super::delegate::Delegate;
use crate::collector::QueryCollector;
use crate::interfaces::{
    Manager, MapProgress, Query, Repository, Result, StopwatchEvent, StopwatchSection,
};
use crate::scope::RequestContext;

/// Adapter name used when a manager has no configured adapter.
pub const DEFAULT_ADAPTER_NAME: &str = "bass";

/// Wraps one manager for one request.
///
/// Instrumented operations (call record + span): `find`, `findBy`,
/// `findOneBy`, `findByQuery`, `findCountBy`, `findCountByQuery`,
/// `findWhereIn`, `updateBy`, `removeBy`, `createSqlQuery` and the three
/// transaction calls. `flush`, connection handling and the mapping calls get
/// a span only. Everything else is forwarded untouched.
///
/// Repositories obtained through the proxy are rebound to it, so queries a
/// repository issues are instrumented too. They are cached per proxy.
pub struct ManagerProxy {
    delegate: Delegate<dyn Manager>,
    this: Weak<ManagerProxy>,
    section: Arc<dyn StopwatchSection>,
    collector: Arc<QueryCollector>,
    repositories: Mutex<HashMap<String, Arc<dyn Repository>>>,
}

impl ManagerProxy {
    /// Wrap `manager` for the request in `context`.
    pub fn new(manager: Arc<dyn Manager>, context: RequestContext) -> Arc<Self> {
        let section = context
            .container()
            .stopwatch()
            .scope_for_request(&context.request().id);
        let collector = Arc::clone(context.container().collector());

        debug!(
            request_id = %context.request().id,
            manager = %manager.name(),
            "Wrapping manager for request"
        );

        Arc::new_cyclic(|this| Self {
            delegate: Delegate::new(manager, context),
            this: this.clone(),
            section,
            collector,
            repositories: Mutex::new(HashMap::new()),
        })
    }

    /// The wrapped manager.
    pub fn inner(&self) -> &Arc<dyn Manager> {
        self.delegate.target_arc()
    }

    pub fn context(&self) -> &RequestContext {
        self.delegate.context()
    }

    /// The manager's configured adapter, or [`DEFAULT_ADAPTER_NAME`].
    pub fn adapter_name(&self) -> &str {
        self.delegate
            .target()
            .adapter()
            .filter(|adapter| !adapter.is_empty())
            .unwrap_or(DEFAULT_ADAPTER_NAME)
    }

    /// Names of the repositories cached by this proxy.
    pub fn repository_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.repositories.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Start a span named `<scope>.<operation>`, where the scope is the
    /// targeted document/repository or else the adapter.
    fn stopwatch(&self, scope: Option<&str>, operation: &str) -> Arc<dyn StopwatchEvent> {
        let adapter = self.adapter_name();
        let name = format!("{}.{}", scope.unwrap_or(adapter), operation);
        self.section.start(&name, adapter)
    }

    /// Record, time and forward one call.
    async fn observe<T, F, Fut>(
        &self,
        operation: &str,
        scope: Option<&str>,
        data: Value,
        call: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let record = self
            .collector
            .save_query(self.adapter_name(), operation, data);
        let event = self.stopwatch(scope, operation);

        let result = call().await;

        event.stop();
        self.collector.complete(&record);
        result
    }

    /// Time and forward one call without recording it.
    async fn timed<T, F, Fut>(&self, scope: Option<&str>, operation: &str, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let event = self.stopwatch(scope, operation);
        let result = call().await;
        event.stop();
        result
    }
}

/// Progress callback that laps the outer span for every item after the first.
struct LapProgress<'a> {
    event: &'a dyn StopwatchEvent,
    walk: Option<&'a dyn MapProgress>,
}

impl MapProgress for LapProgress<'_> {
    fn on_item(&self, index: usize, model: &Value) {
        if index > 0 {
            self.event.lap();
        }
        if let Some(walk) = self.walk {
            walk.on_item(index, model);
        }
    }
}

#[async_trait]
impl Manager for ManagerProxy {
    #[trivial_delegation]
    fn name(&self) -> &str {
        self.delegate.target().name()
    }

    #[trivial_delegation]
    fn adapter(&self) -> Option<&str> {
        self.delegate.target().adapter()
    }

    fn get_repository(&self, name: &str) -> Result<Arc<dyn Repository>> {
        if let Some(repository) = self.repositories.lock().get(name) {
            return Ok(Arc::clone(repository));
        }

        let this: Weak<dyn Manager> = self.this.clone();
        let repository = self.delegate.target().get_repository(name)?.rebind(this);

        let mut repositories = self.repositories.lock();
        Ok(Arc::clone(
            repositories.entry(name.to_string()).or_insert(repository),
        ))
    }

    #[trivial_delegation]
    fn create_document(&self, name: &str, data: Value) -> Result<Value> {
        self.delegate.target().create_document(name, data)
    }

    async fn find(&self, name: &str, id: &Value) -> Result<Option<Value>> {
        let data = json!({ "name": name, "criteria": { "id": id } });
        self.observe("find", Some(name), data, || {
            self.delegate.target().find(name, id)
        })
        .await
    }

    async fn find_by(
        &self,
        name: &str,
        criteria: &Value,
        sort: Option<&Value>,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<Value>> {
        let data = json!({
            "name": name,
            "criteria": criteria,
            "sort": sort,
            "skip": skip,
            "limit": limit,
        });
        self.observe("findBy", Some(name), data, || {
            self.delegate
                .target()
                .find_by(name, criteria, sort, skip, limit)
        })
        .await
    }

    async fn find_one_by(
        &self,
        name: &str,
        criteria: &Value,
        sort: Option<&Value>,
    ) -> Result<Option<Value>> {
        let data = json!({ "name": name, "criteria": criteria, "sort": sort });
        self.observe("findOneBy", Some(name), data, || {
            self.delegate.target().find_one_by(name, criteria, sort)
        })
        .await
    }

    async fn find_by_query(&self, name: &str, query: &Query) -> Result<Vec<Value>> {
        let data = json!({ "name": name, "query": query });
        self.observe("findByQuery", Some(name), data, || {
            self.delegate.target().find_by_query(name, query)
        })
        .await
    }

    async fn find_count_by(&self, name: &str, criteria: &Value) -> Result<u64> {
        let data = json!({ "name": name, "criteria": criteria });
        self.observe("findCountBy", Some(name), data, || {
            self.delegate.target().find_count_by(name, criteria)
        })
        .await
    }

    async fn find_count_by_query(&self, name: &str, query: &Query) -> Result<u64> {
        let data = json!({ "name": name, "query": query });
        self.observe("findCountByQuery", Some(name), data, || {
            self.delegate.target().find_count_by_query(name, query)
        })
        .await
    }

    async fn find_where_in(
        &self,
        name: &str,
        field: &str,
        values: &[Value],
        sort: Option<&Value>,
        limit: Option<u64>,
    ) -> Result<Vec<Value>> {
        let data = json!({
            "name": name,
            "field": field,
            "values": values,
            "sort": sort,
            "limit": limit,
        });
        self.observe("findWhereIn", Some(name), data, || {
            self.delegate
                .target()
                .find_where_in(name, field, values, sort, limit)
        })
        .await
    }

    async fn update_by(&self, name: &str, criteria: &Value, data: &Value) -> Result<u64> {
        let record = json!({ "name": name, "criteria": criteria, "data": data });
        self.observe("updateBy", Some(name), record, || {
            self.delegate.target().update_by(name, criteria, data)
        })
        .await
    }

    async fn remove_by(&self, name: &str, criteria: &Value) -> Result<u64> {
        let data = json!({ "name": name, "criteria": criteria });
        self.observe("removeBy", Some(name), data, || {
            self.delegate.target().remove_by(name, criteria)
        })
        .await
    }

    #[trivial_delegation]
    async fn persist(&self, name: &str, document: Value) -> Result<()> {
        self.delegate.target().persist(name, document).await
    }

    #[trivial_delegation]
    async fn remove(&self, name: &str, document: Value) -> Result<()> {
        self.delegate.target().remove(name, document).await
    }

    async fn flush(&self, document: Option<&Value>) -> Result<()> {
        self.timed(None, "flush", || self.delegate.target().flush(document))
            .await
    }

    async fn create_sql_query(
        &self,
        sql: &str,
        params: &[Value],
        repository_name: Option<&str>,
    ) -> Result<Vec<Value>> {
        let data = json!({ "sql": sql, "params": params, "repositoryName": repository_name });
        self.observe("createSqlQuery", repository_name, data, || {
            self.delegate
                .target()
                .create_sql_query(sql, params, repository_name)
        })
        .await
    }

    async fn start_transaction(&self) -> Result<()> {
        self.observe("startTransaction", None, json!({}), || {
            self.delegate.target().start_transaction()
        })
        .await
    }

    async fn commit_transaction(&self) -> Result<()> {
        self.observe("commitTransaction", None, json!({}), || {
            self.delegate.target().commit_transaction()
        })
        .await
    }

    async fn rollback_transaction(&self) -> Result<()> {
        self.observe("rollbackTransaction", None, json!({}), || {
            self.delegate.target().rollback_transaction()
        })
        .await
    }

    async fn connect_with_config(&self, config: &Value) -> Result<()> {
        self.timed(None, "connectWithConfig", || {
            self.delegate.target().connect_with_config(config)
        })
        .await
    }

    async fn close_connection(&self) -> Result<()> {
        self.timed(None, "closeConnection", || {
            self.delegate.target().close_connection()
        })
        .await
    }

    async fn map_to_model(&self, model: &str, data: &Value, populate: bool) -> Result<Value> {
        self.timed(Some(model), "mapToModel", || {
            self.delegate.target().map_to_model(model, data, populate)
        })
        .await
    }

    async fn map_data_to_model(
        &self,
        model: &str,
        data: &Value,
        walk: Option<&dyn MapProgress>,
    ) -> Result<Value> {
        let event = self.stopwatch(Some(model), "mapDataToModel");
        let progress = LapProgress {
            event: event.as_ref(),
            walk,
        };

        let result = self
            .delegate
            .target()
            .map_data_to_model(model, data, Some(&progress))
            .await;

        event.stop();
        result
    }

    async fn map_data_to_models(
        &self,
        model: &str,
        data: &[Value],
        walk: Option<&dyn MapProgress>,
    ) -> Result<Vec<Value>> {
        let event = self.stopwatch(Some(model), "mapDataToModels");
        let progress = LapProgress {
            event: event.as_ref(),
            walk,
        };

        let result = self
            .delegate
            .target()
            .map_data_to_models(model, data, Some(&progress))
            .await;

        event.stop();
        result
    }

    async fn map_model_to_data(&self, model: &str, document: &Value) -> Result<Value> {
        self.timed(Some(model), "mapModelToData", || {
            self.delegate.target().map_model_to_data(model, document)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, DataConfig, ManagerConfig};
    use crate::interfaces::{DataError, DataService, Session, Stopwatch};
    use crate::mock::MockDataService;
    use crate::scope::{RequestInfo, ServiceContainer};
    use crate::stopwatch::{NoopStopwatch, ProfilerStopwatch};
    use tokio_test::{assert_pending, assert_ready, task};

    struct Harness {
        service: MockDataService,
        collector: Arc<QueryCollector>,
        profiler: Arc<ProfilerStopwatch>,
        proxy: Arc<ManagerProxy>,
    }

    fn context(
        request_id: &str,
        collector: &Arc<QueryCollector>,
        stopwatch: Arc<dyn Stopwatch>,
    ) -> RequestContext {
        let container = ServiceContainer::new(Arc::clone(collector), stopwatch);
        RequestContext::new(
            RequestInfo::with_id(request_id, "GET", "/users"),
            Arc::new(container),
        )
    }

    fn harness_with(config: &DataConfig) -> Harness {
        let service = MockDataService::new(config);
        let collector = Arc::new(QueryCollector::new());
        let profiler = Arc::new(ProfilerStopwatch::new());
        let manager = service.create_session().get_manager("default").unwrap();
        let proxy = ManagerProxy::new(
            manager,
            context("req-1", &collector, profiler.clone() as Arc<dyn Stopwatch>),
        );
        Harness {
            service,
            collector,
            profiler,
            proxy,
        }
    }

    fn harness() -> Harness {
        harness_with(&Config::for_test().data)
    }

    fn span_names(harness: &Harness) -> Vec<String> {
        harness
            .profiler
            .section("req-1")
            .map(|section| section.events().into_iter().map(|e| e.name).collect())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_result_passes_through_unchanged() {
        let h = harness();
        h.service
            .backend()
            .insert("Doc", vec![json!({"id": 1, "a": 1}), json!({"id": 2, "a": 2})])
            .await;
        let criteria = json!({"a": 2});

        let proxied = h
            .proxy
            .find_by("Doc", &criteria, None, None, Some(5))
            .await
            .unwrap();
        let direct = h
            .proxy
            .inner()
            .find_by("Doc", &criteria, None, None, Some(5))
            .await
            .unwrap();

        assert_eq!(proxied, direct);
        assert_eq!(proxied, vec![json!({"id": 2, "a": 2})]);
    }

    #[tokio::test]
    async fn test_each_call_leaves_one_finished_record() {
        let h = harness();

        h.proxy.find("Doc", &json!(7)).await.unwrap();

        let records = h.collector.get_adapter("memory");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation_name(), "find");
        assert_eq!(
            records[0].data(),
            &json!({"name": "Doc", "criteria": {"id": 7}})
        );
        assert!(!records[0].is_pending());
        assert!(records[0].finished() >= records[0].started());
        assert_eq!(span_names(&h), vec!["Doc.find"]);
    }

    #[tokio::test]
    async fn test_find_forwards_once_and_records_once() {
        let h = harness();
        h.service
            .backend()
            .insert("Doc", vec![json!({"id": 3, "title": "third"})])
            .await;
        let id = json!(3);

        let proxied = h.proxy.find("Doc", &id).await.unwrap();

        let calls = h.service.backend().calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, "find");
        assert_eq!(calls[0].args, json!({"name": "Doc", "id": id}));
        assert_eq!(h.collector.get_adapter("memory").len(), 1);

        let direct = h.proxy.inner().find("Doc", &id).await.unwrap();
        assert_eq!(proxied, direct);
        assert_eq!(proxied, Some(json!({"id": 3, "title": "third"})));
        assert_eq!(h.collector.get_adapter("memory").len(), 1);
    }

    #[tokio::test]
    async fn test_arguments_reach_target_unchanged() {
        let h = harness();
        let values = [json!(1), json!(2)];

        h.proxy
            .find_where_in("Doc", "id", &values, Some(&json!({"id": -1})), Some(3))
            .await
            .unwrap();

        let calls = h.service.backend().calls().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, "findWhereIn");
        assert_eq!(
            calls[0].args,
            json!({
                "name": "Doc",
                "field": "id",
                "values": [1, 2],
                "sort": {"id": -1},
                "limit": 3,
            })
        );
    }

    #[tokio::test]
    async fn test_error_passes_through_and_closes_record() {
        let h = harness();
        h.service.backend().set_fail_on("findCountBy", true).await;

        let err = h
            .proxy
            .find_count_by("Doc", &json!({}))
            .await
            .unwrap_err();

        assert_eq!(err, DataError::Adapter("findCountBy failed".into()));
        let records = h.collector.get_adapter("memory");
        assert_eq!(records.len(), 1);
        assert!(!records[0].is_pending());
    }

    #[test]
    fn test_record_is_pending_while_call_is_in_flight() {
        let h = harness();
        let id = json!(1);
        h.service.backend().pause();

        let mut call = task::spawn(h.proxy.find("Doc", &id));
        assert_pending!(call.poll());

        let records = h.collector.get_adapter("memory");
        assert_eq!(records.len(), 1);
        assert!(records[0].is_pending());
        assert_eq!(h.collector.collect_data().queries[0].process_time, None);

        h.service.backend().resume();
        assert!(call.is_woken());
        let result = assert_ready!(call.poll());

        assert_eq!(result, Ok(None));
        assert!(!records[0].is_pending());
    }

    #[tokio::test]
    async fn test_transactions_are_recorded_against_adapter() {
        let h = harness();

        h.proxy.start_transaction().await.unwrap();
        h.proxy.commit_transaction().await.unwrap();

        let ops: Vec<String> = h
            .collector
            .get_adapter("memory")
            .iter()
            .map(|r| r.operation_name().to_string())
            .collect();
        assert_eq!(ops, vec!["startTransaction", "commitTransaction"]);
        assert_eq!(
            span_names(&h),
            vec!["memory.startTransaction", "memory.commitTransaction"]
        );
    }

    #[tokio::test]
    async fn test_sql_query_span_uses_repository_name() {
        let h = harness();

        h.proxy
            .create_sql_query("SELECT 1", &[json!(1)], Some("Doc"))
            .await
            .unwrap();
        h.proxy.create_sql_query("SELECT 2", &[], None).await.unwrap();

        assert_eq!(
            span_names(&h),
            vec!["Doc.createSqlQuery", "memory.createSqlQuery"]
        );
        let data = h.collector.get_adapter("memory")[0].data().clone();
        assert_eq!(
            data,
            json!({"sql": "SELECT 1", "params": [1], "repositoryName": "Doc"})
        );
    }

    #[tokio::test]
    async fn test_flush_and_connection_are_timed_not_recorded() {
        let h = harness();

        h.proxy.persist("Doc", json!({"a": 1})).await.unwrap();
        h.proxy.flush(None).await.unwrap();
        h.proxy.connect_with_config(&json!({})).await.unwrap();
        h.proxy.close_connection().await.unwrap();

        assert!(h.collector.is_empty());
        assert_eq!(
            span_names(&h),
            vec![
                "memory.flush",
                "memory.connectWithConfig",
                "memory.closeConnection"
            ]
        );
        assert_eq!(h.service.backend().documents("Doc").await.len(), 1);
    }

    #[tokio::test]
    async fn test_mapping_laps_once_per_extra_item() {
        let h = harness();
        let seen = Mutex::new(Vec::new());
        let walk = |index: usize, _: &Value| seen.lock().push(index);
        let data = [json!({}), json!({}), json!({}), json!({})];

        let mapped = h
            .proxy
            .map_data_to_models("Doc", &data, Some(&walk))
            .await
            .unwrap();

        assert_eq!(mapped.len(), 4);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
        let events = h.profiler.section("req-1").unwrap().events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Doc.mapDataToModels");
        assert_eq!(events[0].laps, 3);
        assert!(events[0].stopped);
        assert!(h.collector.is_empty());
    }

    #[tokio::test]
    async fn test_single_mapping_does_not_lap() {
        let h = harness();

        h.proxy
            .map_data_to_model("Doc", &json!({"a": 1}), None)
            .await
            .unwrap();

        let events = h.profiler.section("req-1").unwrap().events();
        assert_eq!(events[0].name, "Doc.mapDataToModel");
        assert_eq!(events[0].laps, 0);
    }

    #[tokio::test]
    async fn test_repository_is_cached_and_instrumented() {
        let h = harness();

        let first = h.proxy.get_repository("Doc").unwrap();
        let second = h.proxy.get_repository("Doc").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(h.proxy.repository_names(), vec!["Doc"]);

        first.find_count_by(&json!({})).await.unwrap();

        let records = h.collector.get_adapter("memory");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation_name(), "findCountBy");
    }

    #[tokio::test]
    async fn test_shared_repository_stays_bound_to_shared_manager() {
        let h = harness();
        let proxied = h.proxy.get_repository("Doc").unwrap();
        let shared = h.proxy.inner().get_repository("Doc").unwrap();

        assert!(!Arc::ptr_eq(&proxied, &shared));
        shared.find(&json!(1)).await.unwrap();

        assert!(h.collector.is_empty());
        assert_eq!(h.service.backend().calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_repositories_are_independent_across_requests() {
        let h = harness();
        let other = ManagerProxy::new(
            Arc::clone(h.proxy.inner()),
            context("req-2", &h.collector, Arc::new(NoopStopwatch)),
        );

        let mine = h.proxy.get_repository("Doc").unwrap();
        let theirs = other.get_repository("Doc").unwrap();

        assert!(!Arc::ptr_eq(&mine, &theirs));
    }

    #[tokio::test]
    async fn test_repository_reports_released_proxy() {
        let h = harness();
        let repository = h.proxy.get_repository("Doc").unwrap();
        let Harness { proxy, .. } = h;
        drop(proxy);

        assert_eq!(
            repository.find(&json!(1)).await.err(),
            Some(DataError::ManagerReleased("Doc".into()))
        );
    }

    #[tokio::test]
    async fn test_missing_adapter_falls_back_to_default_name() {
        let mut config = DataConfig::default();
        config.managers.insert(
            "default".to_string(),
            ManagerConfig {
                adapter: String::new(),
                documents: vec!["Doc".to_string()],
            },
        );
        let h = harness_with(&config);

        h.proxy.rollback_transaction().await.ok();

        assert_eq!(h.proxy.adapter_name(), DEFAULT_ADAPTER_NAME);
        assert_eq!(h.collector.adapter_names(), vec![DEFAULT_ADAPTER_NAME]);
        assert_eq!(span_names(&h), vec!["bass.rollbackTransaction"]);
        let events = h.profiler.section("req-1").unwrap().events();
        assert_eq!(events[0].category, DEFAULT_ADAPTER_NAME);
    }

    #[tokio::test]
    async fn test_noop_stopwatch_still_records_calls() {
        let service = MockDataService::new(&Config::for_test().data);
        let collector = Arc::new(QueryCollector::new());
        let manager = service.create_session().get_manager("default").unwrap();
        let proxy = ManagerProxy::new(
            manager,
            context("req-1", &collector, Arc::new(NoopStopwatch)),
        );

        proxy.remove_by("Doc", &json!({"a": 1})).await.unwrap();

        assert_eq!(collector.len(), 1);
    }

    #[tokio::test]
    async fn test_untouched_operations_forward() {
        let h = harness();

        assert_eq!(h.proxy.name(), "default");
        assert_eq!(h.proxy.adapter(), Some("memory"));
        assert_eq!(
            h.proxy.create_document("Doc", json!({"a": 1})).unwrap(),
            json!({"a": 1})
        );
        assert!(h.collector.is_empty());
        assert!(span_names(&h).is_empty());
    }
}
