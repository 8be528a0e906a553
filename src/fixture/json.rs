//! Fixtures read from `*.fixture.json` files.
//!
//! ```json
//! {
//!   "order": 2,
//!   "model": "Article",
//!   "documents": [
//!     { "_reference": "welcome", "id": 10, "title": "Hello" },
//!     { "title": "Reply", "parent": "@ref:welcome" }
//!   ]
//! }
//! ```
//!
//! A document's `_reference` key registers it under that name once loaded.
//! A string value `@ref:<name>` is replaced by the `id` of the document
//! registered under `<name>` by this or an earlier fixture.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{Fixture, FixtureContext, FixtureError, FixtureRegistry, Result};

/// File name suffix of JSON fixtures.
pub const FIXTURE_SUFFIX: &str = ".fixture.json";

const REFERENCE_KEY: &str = "_reference";
const REFERENCE_PREFIX: &str = "@ref:";

#[derive(Debug, Clone, Deserialize)]
struct FixtureFile {
    #[serde(default = "default_order")]
    order: i64,
    model: String,
    #[serde(default)]
    documents: Vec<Value>,
}

fn default_order() -> i64 {
    1
}

/// A fixture backed by one JSON file.
#[derive(Debug, Clone)]
pub struct JsonFixture {
    path: PathBuf,
    file: FixtureFile,
}

impl JsonFixture {
    /// Parse one fixture file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let file = serde_json::from_str(&text).map_err(|source| FixtureError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Every fixture file directly inside `dir`, in file name order.
    pub fn discover(dir: &Path) -> Result<Vec<Self>> {
        if !dir.is_dir() {
            return Err(FixtureError::MissingDirectory(dir.to_path_buf()));
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(FIXTURE_SUFFIX))
            })
            .collect();
        paths.sort();

        debug!(dir = %dir.display(), count = paths.len(), "Discovered fixture files");
        paths.iter().map(|path| Self::from_path(path)).collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn documents(&self) -> &[Value] {
        &self.file.documents
    }
}

/// Replace `@ref:<name>` strings with the referenced document's id.
fn resolve_references(value: Value, registry: &FixtureRegistry) -> Result<Value> {
    match value {
        Value::String(text) => match text.strip_prefix(REFERENCE_PREFIX) {
            Some(name) => registry
                .get(name)
                .map(|model| model.get("id").cloned().unwrap_or(Value::Null))
                .ok_or_else(|| FixtureError::UnknownReference(name.to_string())),
            None => Ok(Value::String(text)),
        },
        Value::Array(items) => items
            .into_iter()
            .map(|item| resolve_references(item, registry))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(fields) => fields
            .into_iter()
            .map(|(key, item)| Ok((key, resolve_references(item, registry)?)))
            .collect::<Result<serde_json::Map<_, _>>>()
            .map(Value::Object),
        other => Ok(other),
    }
}

#[async_trait]
impl Fixture for JsonFixture {
    fn order(&self) -> i64 {
        self.file.order
    }

    fn model_name(&self) -> &str {
        &self.file.model
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self, context: &FixtureContext) -> Result<()> {
        let model = self.model_name();
        let manager = context.manager_for(model)?;

        for document in &self.file.documents {
            let mut document = resolve_references(document.clone(), context.registry())?;
            let reference = document
                .as_object_mut()
                .and_then(|fields| fields.remove(REFERENCE_KEY))
                .and_then(|name| name.as_str().map(str::to_string));

            let document = manager.create_document(model, document)?;
            if let Some(name) = reference {
                context.registry().add(&name, document.clone());
            }
            manager.persist(model, document).await?;
        }

        manager.flush(None).await?;
        Ok(())
    }
}
