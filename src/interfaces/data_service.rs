//! Root service, session and manager factory interfaces.

use std::sync::Arc;

use async_trait::async_trait;

use super::error::Result;
use super::manager::Manager;

/// The shared, process-wide entry point of the data layer.
pub trait DataService: Send + Sync {
    /// Open a new unit-of-work session.
    fn create_session(&self) -> Arc<dyn Session>;

    /// Names of all configured managers.
    fn manager_names(&self) -> Vec<String>;

    /// Names of all registered adapters.
    fn adapter_names(&self) -> Vec<String>;
}

/// A unit-of-work scope producing managers.
#[async_trait]
pub trait Session: Send + Sync {
    /// Unique session identifier.
    fn id(&self) -> &str;

    /// The factory used to create this session's managers.
    fn manager_factory(&self) -> Arc<dyn ManagerFactory>;

    /// Get (creating on first use) the named manager for this session.
    fn get_manager(&self, name: &str) -> Result<Arc<dyn Manager>>;

    /// Resolve which manager serves a model, if any.
    fn manager_name_for_model(&self, model: &str) -> Option<String>;

    /// Get the manager serving a model.
    fn get_manager_for_model_name(&self, model: &str) -> Result<Arc<dyn Manager>>;

    /// Names of the managers opened so far in this session.
    fn managers(&self) -> Vec<String>;

    /// Close the session and its managers' connections.
    async fn close(&self) -> Result<()>;
}

/// Builds managers from their configured definitions.
pub trait ManagerFactory: Send + Sync {
    /// Names of the manager definitions this factory knows.
    fn manager_names(&self) -> Vec<String>;

    /// Create a manager for `session`.
    fn create_manager(&self, name: &str, session: &dyn Session) -> Result<Arc<dyn Manager>>;
}
