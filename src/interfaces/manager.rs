//! Manager and repository interfaces.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::Result;

/// A structured query passed to `find_by_query` / `find_count_by_query`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub criteria: Value,
    pub sort: Option<Value>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl Query {
    pub fn new(criteria: Value) -> Self {
        Self {
            criteria,
            ..Self::default()
        }
    }

    pub fn sort(mut self, sort: Value) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Per-item progress callback for the mapping operations.
///
/// Called once for every mapped item, in order, with the item's index.
pub trait MapProgress: Send + Sync {
    fn on_item(&self, index: usize, model: &Value);
}

impl<F> MapProgress for F
where
    F: Fn(usize, &Value) + Send + Sync,
{
    fn on_item(&self, index: usize, model: &Value) {
        self(index, model)
    }
}

/// The primary per-model data-access surface.
///
/// A manager is created by a [`ManagerFactory`](super::ManagerFactory) for a
/// session and is bound to one adapter (the storage backend).
///
/// Implementations:
/// - `ManagerProxy`: request-scoped instrumentation decorator
/// - `MockManager`: in-memory engine for tests and fixtures
#[async_trait]
pub trait Manager: Send + Sync {
    /// Manager name as configured.
    fn name(&self) -> &str;

    /// Configured adapter identifier, if any.
    fn adapter(&self) -> Option<&str>;

    /// Get the repository for a document type.
    fn get_repository(&self, name: &str) -> Result<Arc<dyn Repository>>;

    /// Create a new, unpersisted document of the given type.
    fn create_document(&self, name: &str, data: Value) -> Result<Value>;

    async fn find(&self, name: &str, id: &Value) -> Result<Option<Value>>;

    async fn find_by(
        &self,
        name: &str,
        criteria: &Value,
        sort: Option<&Value>,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<Value>>;

    async fn find_one_by(
        &self,
        name: &str,
        criteria: &Value,
        sort: Option<&Value>,
    ) -> Result<Option<Value>>;

    async fn find_by_query(&self, name: &str, query: &Query) -> Result<Vec<Value>>;

    async fn find_count_by(&self, name: &str, criteria: &Value) -> Result<u64>;

    async fn find_count_by_query(&self, name: &str, query: &Query) -> Result<u64>;

    async fn find_where_in(
        &self,
        name: &str,
        field: &str,
        values: &[Value],
        sort: Option<&Value>,
        limit: Option<u64>,
    ) -> Result<Vec<Value>>;

    /// Update every document matching `criteria`; returns the number updated.
    async fn update_by(&self, name: &str, criteria: &Value, data: &Value) -> Result<u64>;

    /// Remove every document matching `criteria`; returns the number removed.
    async fn remove_by(&self, name: &str, criteria: &Value) -> Result<u64>;

    /// Queue a document for insertion or update on the next flush.
    async fn persist(&self, name: &str, document: Value) -> Result<()>;

    /// Queue a document for removal on the next flush.
    async fn remove(&self, name: &str, document: Value) -> Result<()>;

    /// Write queued changes. `document` restricts the flush to one document.
    async fn flush(&self, document: Option<&Value>) -> Result<()>;

    async fn create_sql_query(
        &self,
        sql: &str,
        params: &[Value],
        repository_name: Option<&str>,
    ) -> Result<Vec<Value>>;

    async fn start_transaction(&self) -> Result<()>;

    async fn commit_transaction(&self) -> Result<()>;

    async fn rollback_transaction(&self) -> Result<()>;

    async fn connect_with_config(&self, config: &Value) -> Result<()>;

    async fn close_connection(&self) -> Result<()>;

    async fn map_to_model(&self, model: &str, data: &Value, populate: bool) -> Result<Value>;

    async fn map_data_to_model(
        &self,
        model: &str,
        data: &Value,
        walk: Option<&dyn MapProgress>,
    ) -> Result<Value>;

    async fn map_data_to_models(
        &self,
        model: &str,
        data: &[Value],
        walk: Option<&dyn MapProgress>,
    ) -> Result<Vec<Value>>;

    async fn map_model_to_data(&self, model: &str, document: &Value) -> Result<Value>;
}

/// Manager-scoped helper for one document type.
///
/// Query helpers route through [`Repository::manager`], so whichever manager
/// a repository is bound to sees (and instruments) those queries.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Document type this repository serves.
    fn document_name(&self) -> &str;

    /// The manager this repository issues its queries through.
    fn manager(&self) -> Result<Arc<dyn Manager>>;

    /// A repository sharing this one's state but bound to `manager`.
    ///
    /// The receiver is left untouched.
    fn rebind(&self, manager: Weak<dyn Manager>) -> Arc<dyn Repository>;

    /// Adapter-level update, executed directly against storage.
    async fn update_by(&self, criteria: &Value, data: &Value) -> Result<u64>;

    async fn find(&self, id: &Value) -> Result<Option<Value>> {
        self.manager()?.find(self.document_name(), id).await
    }

    async fn find_by(
        &self,
        criteria: &Value,
        sort: Option<&Value>,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<Value>> {
        self.manager()?
            .find_by(self.document_name(), criteria, sort, skip, limit)
            .await
    }

    async fn find_one_by(&self, criteria: &Value, sort: Option<&Value>) -> Result<Option<Value>> {
        self.manager()?
            .find_one_by(self.document_name(), criteria, sort)
            .await
    }

    async fn find_count_by(&self, criteria: &Value) -> Result<u64> {
        self.manager()?
            .find_count_by(self.document_name(), criteria)
            .await
    }

    async fn find_where_in(
        &self,
        field: &str,
        values: &[Value],
        sort: Option<&Value>,
        limit: Option<u64>,
    ) -> Result<Vec<Value>> {
        self.manager()?
            .find_where_in(self.document_name(), field, values, sort, limit)
            .await
    }

    async fn remove_by(&self, criteria: &Value) -> Result<u64> {
        self.manager()?
            .remove_by(self.document_name(), criteria)
            .await
    }
}
