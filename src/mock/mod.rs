//! In-memory data engine.
//!
//! Backs the data-access interfaces with plain maps so the request proxies,
//! fixtures and the CLI can run without a database. Every async manager call
//! is appended to a call log, can be made to fail on demand, and can be held
//! at a pause gate so tests can observe in-flight work.

mod manager;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::config::{DataConfig, ManagerConfig};
use crate::interfaces::{DataError, DataService, Manager, ManagerFactory, Result, Session};

pub use manager::{MockManager, MockRepository, MODEL_KEY};

/// One call received by a mock manager.
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub manager: String,
    pub operation: String,
    pub args: Value,
}

/// Storage and test hooks shared by every session of a [`MockDataService`].
#[derive(Default)]
pub struct MockBackend {
    documents: RwLock<HashMap<String, Vec<Value>>>,
    snapshot: RwLock<Option<HashMap<String, Vec<Value>>>>,
    calls: RwLock<Vec<MockCall>>,
    fail_on: RwLock<HashSet<String>>,
    next_id: AtomicU64,
    paused: AtomicBool,
    resume: Notify,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `operation` (e.g. `"findBy"`) fail for every manager.
    pub async fn set_fail_on(&self, operation: &str, fail: bool) {
        let mut fail_on = self.fail_on.write().await;
        if fail {
            fail_on.insert(operation.to_string());
        } else {
            fail_on.remove(operation);
        }
    }

    /// Hold every subsequent manager call until [`MockBackend::resume`].
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Release all held calls.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.resume.notify_waiters();
    }

    pub async fn calls(&self) -> Vec<MockCall> {
        self.calls.read().await.clone()
    }

    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
    }

    /// Stored documents of one type.
    pub async fn documents(&self, name: &str) -> Vec<Value> {
        self.documents
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Seed documents directly, bypassing managers and the call log.
    pub async fn insert(&self, name: &str, documents: Vec<Value>) {
        let mut store = self.documents.write().await;
        store.entry(name.to_string()).or_default().extend(documents);
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Log a call, then apply the failure switch and the pause gate.
    pub(crate) async fn enter(&self, manager: &str, operation: &str, args: Value) -> Result<()> {
        self.calls.write().await.push(MockCall {
            manager: manager.to_string(),
            operation: operation.to_string(),
            args,
        });

        if self.fail_on.read().await.contains(operation) {
            return Err(DataError::Adapter(format!("{operation} failed")));
        }

        while self.paused.load(Ordering::SeqCst) {
            let resumed = self.resume.notified();
            if !self.paused.load(Ordering::SeqCst) {
                break;
            }
            resumed.await;
        }
        Ok(())
    }

    pub(crate) fn store(&self) -> &RwLock<HashMap<String, Vec<Value>>> {
        &self.documents
    }

    pub(crate) async fn begin(&self) -> Result<()> {
        let mut snapshot = self.snapshot.write().await;
        if snapshot.is_some() {
            return Err(DataError::Transaction("transaction already started".into()));
        }
        *snapshot = Some(self.documents.read().await.clone());
        Ok(())
    }

    pub(crate) async fn commit(&self) -> Result<()> {
        self.snapshot
            .write()
            .await
            .take()
            .map(|_| ())
            .ok_or_else(|| DataError::Transaction("no transaction started".into()))
    }

    pub(crate) async fn rollback(&self) -> Result<()> {
        let snapshot = self
            .snapshot
            .write()
            .await
            .take()
            .ok_or_else(|| DataError::Transaction("no transaction started".into()))?;
        *self.documents.write().await = snapshot;
        Ok(())
    }
}

/// Builds [`MockManager`]s from manager definitions.
pub struct MockManagerFactory {
    backend: Arc<MockBackend>,
    definitions: Arc<BTreeMap<String, ManagerConfig>>,
}

impl ManagerFactory for MockManagerFactory {
    fn manager_names(&self) -> Vec<String> {
        self.definitions.keys().cloned().collect()
    }

    fn create_manager(&self, name: &str, session: &dyn Session) -> Result<Arc<dyn Manager>> {
        let definition = self
            .definitions
            .get(name)
            .ok_or_else(|| DataError::UnknownManager(name.to_string()))?;

        debug!(manager = %name, session_id = %session.id(), "Creating mock manager");

        let manager: Arc<dyn Manager> =
            MockManager::new(name, definition.clone(), Arc::clone(&self.backend));
        Ok(manager)
    }
}

/// Unit of work over the mock backend.
pub struct MockSession {
    id: String,
    factory: Arc<MockManagerFactory>,
    managers: Mutex<HashMap<String, Arc<dyn Manager>>>,
}

#[async_trait]
impl Session for MockSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn manager_factory(&self) -> Arc<dyn ManagerFactory> {
        Arc::clone(&self.factory) as Arc<dyn ManagerFactory>
    }

    fn get_manager(&self, name: &str) -> Result<Arc<dyn Manager>> {
        if let Some(manager) = self.managers.lock().get(name) {
            return Ok(Arc::clone(manager));
        }

        let manager = self.factory.create_manager(name, self)?;

        let mut managers = self.managers.lock();
        Ok(Arc::clone(
            managers.entry(name.to_string()).or_insert(manager),
        ))
    }

    fn manager_name_for_model(&self, model: &str) -> Option<String> {
        self.factory
            .definitions
            .iter()
            .find(|(_, definition)| definition.documents.iter().any(|d| d == model))
            .map(|(name, _)| name.clone())
    }

    fn get_manager_for_model_name(&self, model: &str) -> Result<Arc<dyn Manager>> {
        let name = self
            .manager_name_for_model(model)
            .ok_or_else(|| DataError::UnknownModel(model.to_string()))?;
        self.get_manager(&name)
    }

    fn managers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.managers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    async fn close(&self) -> Result<()> {
        let managers: Vec<Arc<dyn Manager>> = self.managers.lock().values().cloned().collect();
        try_join_all(managers.iter().map(|manager| manager.close_connection())).await?;
        Ok(())
    }
}

/// Shared in-memory data service.
pub struct MockDataService {
    backend: Arc<MockBackend>,
    factory: Arc<MockManagerFactory>,
    adapters: Vec<String>,
}

impl MockDataService {
    pub fn new(config: &DataConfig) -> Self {
        let backend = Arc::new(MockBackend::new());
        let factory = Arc::new(MockManagerFactory {
            backend: Arc::clone(&backend),
            definitions: Arc::new(config.managers.clone()),
        });
        Self {
            backend,
            factory,
            adapters: config.adapters.clone(),
        }
    }

    pub fn backend(&self) -> &Arc<MockBackend> {
        &self.backend
    }
}

impl DataService for MockDataService {
    fn create_session(&self) -> Arc<dyn Session> {
        Arc::new(MockSession {
            id: Uuid::new_v4().to_string(),
            factory: Arc::clone(&self.factory),
            managers: Mutex::new(HashMap::new()),
        })
    }

    fn manager_names(&self) -> Vec<String> {
        self.factory.manager_names()
    }

    fn adapter_names(&self) -> Vec<String> {
        self.adapters.clone()
    }
}
