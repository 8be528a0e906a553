//! In-memory manager and repository.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex as AsyncMutex;

use super::MockBackend;
use crate::config::ManagerConfig;
use crate::interfaces::{DataError, Manager, MapProgress, Query, Repository, Result};

/// Key added to mapped documents, naming their model.
pub const MODEL_KEY: &str = "_model";

/// A queued unit-of-work change.
enum Write {
    Upsert { name: String, document: Value },
    Delete { name: String, document: Value },
}

impl Write {
    fn document(&self) -> &Value {
        match self {
            Write::Upsert { document, .. } | Write::Delete { document, .. } => document,
        }
    }
}

/// Manager over the shared [`MockBackend`].
///
/// `persist`/`remove` queue changes that `flush` applies. Queries read the
/// backend directly.
pub struct MockManager {
    name: String,
    definition: ManagerConfig,
    backend: Arc<MockBackend>,
    this: Weak<MockManager>,
    queued: AsyncMutex<Vec<Write>>,
    repositories: Mutex<HashMap<String, Arc<dyn Repository>>>,
    connected: AtomicBool,
}

impl MockManager {
    pub fn new(name: &str, definition: ManagerConfig, backend: Arc<MockBackend>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            name: name.to_string(),
            definition,
            backend,
            this: this.clone(),
            queued: AsyncMutex::new(Vec::new()),
            repositories: Mutex::new(HashMap::new()),
            connected: AtomicBool::new(true),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(AtomicOrdering::SeqCst)
    }

    fn check_document(&self, name: &str) -> Result<()> {
        if self.definition.documents.iter().any(|d| d == name) {
            Ok(())
        } else {
            Err(DataError::UnknownRepository(name.to_string()))
        }
    }

    async fn enter(&self, operation: &str, args: Value) -> Result<()> {
        self.backend.enter(&self.name, operation, args).await
    }

    async fn select(
        &self,
        name: &str,
        criteria: &Value,
        sort: Option<&Value>,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> Vec<Value> {
        let store = self.backend.store().read().await;
        let mut found: Vec<Value> = store
            .get(name)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| matches(doc, criteria))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(store);

        if let Some(sort) = sort {
            sort_documents(&mut found, sort);
        }
        window(found, skip, limit)
    }
}

/// A document matches when every criteria field equals the document's field.
fn matches(document: &Value, criteria: &Value) -> bool {
    match criteria.as_object() {
        Some(fields) => fields
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected)),
        None => criteria.is_null(),
    }
}

/// Sort by `{field: 1 | -1}` entries, in order.
fn sort_documents(documents: &mut [Value], sort: &Value) {
    let Some(keys) = sort.as_object() else {
        return;
    };
    documents.sort_by(|a, b| {
        for (field, direction) in keys {
            let ordering = compare(a.get(field), b.get(field));
            let ordering = if direction.as_i64() == Some(-1) {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(a)), Some(Value::String(b))) => a.cmp(b),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn window(documents: Vec<Value>, skip: Option<u64>, limit: Option<u64>) -> Vec<Value> {
    let skip = skip.unwrap_or(0) as usize;
    let iter = documents.into_iter().skip(skip);
    match limit {
        Some(limit) => iter.take(limit as usize).collect(),
        None => iter.collect(),
    }
}

fn same_id(a: &Value, b: &Value) -> bool {
    matches!((a.get("id"), b.get("id")), (Some(x), Some(y)) if x == y)
}

fn merge(target: &mut Value, data: &Value) {
    if let (Some(target), Some(data)) = (target.as_object_mut(), data.as_object()) {
        for (key, value) in data {
            target.insert(key.clone(), value.clone());
        }
    }
}

fn to_model(model: &str, data: &Value) -> Result<Value> {
    let mut fields: Map<String, Value> = data
        .as_object()
        .cloned()
        .ok_or_else(|| DataError::Mapping {
            model: model.to_string(),
            message: "expected an object".to_string(),
        })?;
    fields.insert(MODEL_KEY.to_string(), Value::String(model.to_string()));
    Ok(Value::Object(fields))
}

#[async_trait]
impl Manager for MockManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn adapter(&self) -> Option<&str> {
        Some(self.definition.adapter.as_str()).filter(|adapter| !adapter.is_empty())
    }

    fn get_repository(&self, name: &str) -> Result<Arc<dyn Repository>> {
        self.check_document(name)?;

        let mut repositories = self.repositories.lock();
        let repository = repositories.entry(name.to_string()).or_insert_with(|| {
            let manager: Weak<dyn Manager> = self.this.clone();
            Arc::new(MockRepository {
                document: name.to_string(),
                manager,
                backend: Arc::clone(&self.backend),
            })
        });
        Ok(Arc::clone(repository))
    }

    fn create_document(&self, name: &str, data: Value) -> Result<Value> {
        self.check_document(name)?;
        if data.is_object() {
            Ok(data)
        } else {
            Err(DataError::Mapping {
                model: name.to_string(),
                message: "expected an object".to_string(),
            })
        }
    }

    async fn find(&self, name: &str, id: &Value) -> Result<Option<Value>> {
        self.enter("find", json!({ "name": name, "id": id })).await?;
        let criteria = json!({ "id": id });
        Ok(self
            .select(name, &criteria, None, None, Some(1))
            .await
            .into_iter()
            .next())
    }

    async fn find_by(
        &self,
        name: &str,
        criteria: &Value,
        sort: Option<&Value>,
        skip: Option<u64>,
        limit: Option<u64>,
    ) -> Result<Vec<Value>> {
        let args = json!({
            "name": name,
            "criteria": criteria,
            "sort": sort,
            "skip": skip,
            "limit": limit,
        });
        self.enter("findBy", args).await?;
        Ok(self.select(name, criteria, sort, skip, limit).await)
    }

    async fn find_one_by(
        &self,
        name: &str,
        criteria: &Value,
        sort: Option<&Value>,
    ) -> Result<Option<Value>> {
        let args = json!({ "name": name, "criteria": criteria, "sort": sort });
        self.enter("findOneBy", args).await?;
        Ok(self
            .select(name, criteria, sort, None, Some(1))
            .await
            .into_iter()
            .next())
    }

    async fn find_by_query(&self, name: &str, query: &Query) -> Result<Vec<Value>> {
        self.enter("findByQuery", json!({ "name": name, "query": query }))
            .await?;
        Ok(self
            .select(
                name,
                &query.criteria,
                query.sort.as_ref(),
                query.skip,
                query.limit,
            )
            .await)
    }

    async fn find_count_by(&self, name: &str, criteria: &Value) -> Result<u64> {
        self.enter("findCountBy", json!({ "name": name, "criteria": criteria }))
            .await?;
        Ok(self.select(name, criteria, None, None, None).await.len() as u64)
    }

    async fn find_count_by_query(&self, name: &str, query: &Query) -> Result<u64> {
        self.enter("findCountByQuery", json!({ "name": name, "query": query }))
            .await?;
        Ok(self
            .select(name, &query.criteria, None, query.skip, query.limit)
            .await
            .len() as u64)
    }

    async fn find_where_in(
        &self,
        name: &str,
        field: &str,
        values: &[Value],
        sort: Option<&Value>,
        limit: Option<u64>,
    ) -> Result<Vec<Value>> {
        let args = json!({
            "name": name,
            "field": field,
            "values": values,
            "sort": sort,
            "limit": limit,
        });
        self.enter("findWhereIn", args).await?;

        let mut found: Vec<Value> = self
            .select(name, &Value::Null, None, None, None)
            .await
            .into_iter()
            .filter(|doc| doc.get(field).is_some_and(|v| values.contains(v)))
            .collect();
        if let Some(sort) = sort {
            sort_documents(&mut found, sort);
        }
        Ok(window(found, None, limit))
    }

    async fn update_by(&self, name: &str, criteria: &Value, data: &Value) -> Result<u64> {
        let args = json!({ "name": name, "criteria": criteria, "data": data });
        self.enter("updateBy", args).await?;

        let mut store = self.backend.store().write().await;
        let mut updated = 0;
        for doc in store.entry(name.to_string()).or_default().iter_mut() {
            if matches(doc, criteria) {
                merge(doc, data);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn remove_by(&self, name: &str, criteria: &Value) -> Result<u64> {
        self.enter("removeBy", json!({ "name": name, "criteria": criteria }))
            .await?;

        let mut store = self.backend.store().write().await;
        let docs = store.entry(name.to_string()).or_default();
        let before = docs.len();
        docs.retain(|doc| !matches(doc, criteria));
        Ok((before - docs.len()) as u64)
    }

    async fn persist(&self, name: &str, mut document: Value) -> Result<()> {
        self.enter("persist", json!({ "name": name, "document": document }))
            .await?;
        self.check_document(name)?;

        if let Some(fields) = document.as_object_mut() {
            if !fields.contains_key("id") {
                fields.insert("id".to_string(), json!(self.backend.next_id()));
            }
        }
        self.queued.lock().await.push(Write::Upsert {
            name: name.to_string(),
            document,
        });
        Ok(())
    }

    async fn remove(&self, name: &str, document: Value) -> Result<()> {
        self.enter("remove", json!({ "name": name, "document": document }))
            .await?;
        self.queued.lock().await.push(Write::Delete {
            name: name.to_string(),
            document,
        });
        Ok(())
    }

    async fn flush(&self, document: Option<&Value>) -> Result<()> {
        self.enter("flush", json!({ "document": document })).await?;

        let writes: Vec<Write> = {
            let mut queued = self.queued.lock().await;
            match document {
                Some(target) => {
                    let (selected, kept) = queued
                        .drain(..)
                        .partition(|write| same_id(write.document(), target));
                    *queued = kept;
                    selected
                }
                None => queued.drain(..).collect(),
            }
        };

        let mut store = self.backend.store().write().await;
        for write in writes {
            match write {
                Write::Upsert { name, document } => {
                    let docs = store.entry(name).or_default();
                    match docs.iter_mut().find(|doc| same_id(doc, &document)) {
                        Some(existing) => *existing = document,
                        None => docs.push(document),
                    }
                }
                Write::Delete { name, document } => {
                    store
                        .entry(name)
                        .or_default()
                        .retain(|doc| !same_id(doc, &document));
                }
            }
        }
        Ok(())
    }

    async fn create_sql_query(
        &self,
        sql: &str,
        params: &[Value],
        repository_name: Option<&str>,
    ) -> Result<Vec<Value>> {
        let args = json!({ "sql": sql, "params": params, "repositoryName": repository_name });
        self.enter("createSqlQuery", args).await?;

        if sql.trim().is_empty() {
            return Err(DataError::Query("empty statement".to_string()));
        }
        match repository_name {
            Some(name) => Ok(self.select(name, &Value::Null, None, None, None).await),
            None => Ok(Vec::new()),
        }
    }

    async fn start_transaction(&self) -> Result<()> {
        self.enter("startTransaction", json!({})).await?;
        self.backend.begin().await
    }

    async fn commit_transaction(&self) -> Result<()> {
        self.enter("commitTransaction", json!({})).await?;
        self.backend.commit().await
    }

    async fn rollback_transaction(&self) -> Result<()> {
        self.enter("rollbackTransaction", json!({})).await?;
        self.backend.rollback().await
    }

    async fn connect_with_config(&self, config: &Value) -> Result<()> {
        self.enter("connectWithConfig", json!({ "config": config }))
            .await?;
        self.connected.store(true, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn close_connection(&self) -> Result<()> {
        self.enter("closeConnection", json!({})).await?;
        self.connected.store(false, AtomicOrdering::SeqCst);
        Ok(())
    }

    async fn map_to_model(&self, model: &str, data: &Value, populate: bool) -> Result<Value> {
        let args = json!({ "model": model, "data": data, "populate": populate });
        self.enter("mapToModel", args).await?;

        let mut mapped = to_model(model, data)?;
        if populate {
            if let Some(id) = data.get("id") {
                let filter = json!({ "id": id });
                let stored = self.select(model, &filter, None, None, Some(1));
                if let Some(stored) = stored.await.into_iter().next() {
                    let mut populated = to_model(model, &stored)?;
                    merge(&mut populated, &mapped);
                    mapped = populated;
                }
            }
        }
        Ok(mapped)
    }

    async fn map_data_to_model(
        &self,
        model: &str,
        data: &Value,
        walk: Option<&dyn MapProgress>,
    ) -> Result<Value> {
        self.enter("mapDataToModel", json!({ "model": model, "data": data }))
            .await?;

        let mapped = to_model(model, data)?;
        if let Some(walk) = walk {
            walk.on_item(0, &mapped);
        }
        Ok(mapped)
    }

    async fn map_data_to_models(
        &self,
        model: &str,
        data: &[Value],
        walk: Option<&dyn MapProgress>,
    ) -> Result<Vec<Value>> {
        self.enter("mapDataToModels", json!({ "model": model, "data": data }))
            .await?;

        let mut mapped = Vec::with_capacity(data.len());
        for (index, item) in data.iter().enumerate() {
            let model_value = to_model(model, item)?;
            if let Some(walk) = walk {
                walk.on_item(index, &model_value);
            }
            mapped.push(model_value);
        }
        Ok(mapped)
    }

    async fn map_model_to_data(&self, model: &str, document: &Value) -> Result<Value> {
        self.enter("mapModelToData", json!({ "model": model, "document": document }))
            .await?;

        let mut data = document.clone();
        if let Some(fields) = data.as_object_mut() {
            fields.remove(MODEL_KEY);
        }
        Ok(data)
    }
}

/// Repository for one document type of a [`MockManager`].
pub struct MockRepository {
    document: String,
    manager: Weak<dyn Manager>,
    backend: Arc<MockBackend>,
}

#[async_trait]
impl Repository for MockRepository {
    fn document_name(&self) -> &str {
        &self.document
    }

    fn manager(&self) -> Result<Arc<dyn Manager>> {
        self.manager
            .upgrade()
            .ok_or_else(|| DataError::ManagerReleased(self.document.clone()))
    }

    fn rebind(&self, manager: Weak<dyn Manager>) -> Arc<dyn Repository> {
        Arc::new(MockRepository {
            document: self.document.clone(),
            manager,
            backend: Arc::clone(&self.backend),
        })
    }

    async fn update_by(&self, criteria: &Value, data: &Value) -> Result<u64> {
        let mut store = self.backend.store().write().await;
        let mut updated = 0;
        for doc in store.entry(self.document.clone()).or_default().iter_mut() {
            if matches(doc, criteria) {
                merge(doc, data);
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (Arc<MockManager>, Arc<MockBackend>) {
        let backend = Arc::new(MockBackend::new());
        let definition = ManagerConfig {
            adapter: "memory".to_string(),
            documents: vec!["User".to_string()],
        };
        (MockManager::new("default", definition, Arc::clone(&backend)), backend)
    }

    #[tokio::test]
    async fn test_persist_is_visible_after_flush() {
        let (manager, backend) = manager();

        manager.persist("User", json!({"name": "ada"})).await.unwrap();
        assert!(backend.documents("User").await.is_empty());

        manager.flush(None).await.unwrap();
        let stored = backend.documents("User").await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["id"], json!(1));
    }

    #[tokio::test]
    async fn test_find_by_sorts_and_windows() {
        let (manager, backend) = manager();
        backend
            .insert(
                "User",
                vec![
                    json!({"id": 1, "age": 30, "team": "a"}),
                    json!({"id": 2, "age": 20, "team": "a"}),
                    json!({"id": 3, "age": 40, "team": "b"}),
                    json!({"id": 4, "age": 10, "team": "a"}),
                ],
            )
            .await;

        let found = manager
            .find_by("User", &json!({"team": "a"}), Some(&json!({"age": -1})), Some(1), Some(1))
            .await
            .unwrap();

        assert_eq!(found, vec![json!({"id": 2, "age": 20, "team": "a"})]);
    }

    #[tokio::test]
    async fn test_find_where_in() {
        let (manager, backend) = manager();
        backend
            .insert("User", vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})])
            .await;

        let found = manager
            .find_where_in("User", "id", &[json!(1), json!(3)], None, None)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_map_data_to_models_walks_every_item() {
        let (manager, _) = manager();
        let seen = Mutex::new(Vec::new());
        let walk = |index: usize, _: &Value| seen.lock().push(index);

        let mapped = manager
            .map_data_to_models("User", &[json!({}), json!({}), json!({})], Some(&walk))
            .await
            .unwrap();

        assert_eq!(mapped.len(), 3);
        assert_eq!(mapped[0][MODEL_KEY], json!("User"));
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_repository_reports_released_manager() {
        let (manager, _) = manager();
        let repository = manager.get_repository("User").unwrap();
        drop(manager);

        assert_eq!(
            repository.find(&json!(1)).await.err(),
            Some(DataError::ManagerReleased("User".into()))
        );
    }

    #[tokio::test]
    async fn test_unknown_repository() {
        let (manager, _) = manager();
        assert_eq!(
            manager.get_repository("Order").err(),
            Some(DataError::UnknownRepository("Order".into()))
        );
    }
}
