//! Fixture loading.
//!
//! Fixtures seed a data service with documents. They run strictly one after
//! another in ascending [`Fixture::order`], and share a [`FixtureRegistry`]
//! so a later fixture can point at documents an earlier one created.

mod json;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::info;

use crate::interfaces::{DataError, DataService, Manager, Session};

pub use json::{JsonFixture, FIXTURE_SUFFIX};

/// Errors that can occur while loading fixtures.
#[derive(Debug, thiserror::Error)]
pub enum FixtureError {
    #[error("Fixtures directory {0} doesn't exist")]
    MissingDirectory(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid fixture {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown fixture reference: {0}")]
    UnknownReference(String),

    #[error(transparent)]
    Data(#[from] DataError),
}

pub type Result<T> = std::result::Result<T, FixtureError>;

/// Named documents shared between the fixtures of one run.
#[derive(Default)]
pub struct FixtureRegistry {
    models: RwLock<HashMap<String, Value>>,
}

impl FixtureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `model` under `name`, replacing any earlier entry.
    pub fn add(&self, name: &str, model: Value) {
        self.models.write().insert(name.to_string(), model);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.models.read().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What a fixture gets to work with while loading.
pub struct FixtureContext {
    session: Arc<dyn Session>,
    registry: Arc<FixtureRegistry>,
}

impl FixtureContext {
    pub fn new(session: Arc<dyn Session>, registry: Arc<FixtureRegistry>) -> Self {
        Self { session, registry }
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn registry(&self) -> &FixtureRegistry {
        &self.registry
    }

    /// The manager serving `model` in this fixture's session.
    pub fn manager_for(&self, model: &str) -> Result<Arc<dyn Manager>> {
        Ok(self.session.get_manager_for_model_name(model)?)
    }
}

/// One unit of seed data.
#[async_trait]
pub trait Fixture: Send + Sync {
    /// Position in the run; lower runs first, ties keep discovery order.
    fn order(&self) -> i64 {
        1
    }

    /// Model the fixture creates documents for.
    fn model_name(&self) -> &str;

    /// Human-readable origin, used in progress output.
    fn source(&self) -> String {
        self.model_name().to_string()
    }

    async fn load(&self, context: &FixtureContext) -> Result<()>;
}

/// Runs fixtures in order against a data service.
pub struct FixtureRunner {
    service: Arc<dyn DataService>,
}

impl FixtureRunner {
    pub fn new(service: Arc<dyn DataService>) -> Self {
        Self { service }
    }

    /// Sort `fixtures` by order and load them one at a time.
    ///
    /// `on_each` is called just before each fixture loads. Every fixture gets
    /// its own session; all share one registry. The first failure stops the
    /// run. Returns the number of fixtures loaded.
    pub async fn run<F>(
        &self,
        mut fixtures: Vec<Box<dyn Fixture>>,
        mut on_each: F,
    ) -> Result<usize>
    where
        F: FnMut(&dyn Fixture),
    {
        fixtures.sort_by_key(|fixture| fixture.order());
        let registry = Arc::new(FixtureRegistry::new());

        for fixture in &fixtures {
            on_each(fixture.as_ref());

            let session = self.service.create_session();
            let context = FixtureContext::new(session, Arc::clone(&registry));
            fixture.load(&context).await?;

            info!(
                fixture = %fixture.source(),
                model = %fixture.model_name(),
                order = fixture.order(),
                "Fixture loaded"
            );
        }
        Ok(fixtures.len())
    }

    /// Load every `*.fixture.json` file in `dir`.
    pub async fn run_dir<F>(&self, dir: &Path, on_each: F) -> Result<usize>
    where
        F: FnMut(&dyn Fixture),
    {
        let fixtures = JsonFixture::discover(dir)?
            .into_iter()
            .map(|fixture| Box::new(fixture) as Box<dyn Fixture>)
            .collect();
        self.run(fixtures, on_each).await
    }
}
