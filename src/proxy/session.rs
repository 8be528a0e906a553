//! Request proxy around a freshly created session.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use trivial_delegation::trivial_delegation;

use super::delegate::Delegate;
use super::manager_factory::ManagerFactoryProxy;
use crate::interfaces::{DataError, Manager, ManagerFactory, Result, Session};
use crate::scope::RequestContext;

/// Wraps one session for one request.
///
/// Managers are created through the proxy's own [`ManagerFactoryProxy`] and
/// cached in the proxy's own map; the underlying session's managers are never
/// consulted, so every manager handed out is instrumented for this request.
pub struct SessionProxy {
    delegate: Delegate<dyn Session>,
    manager_factory: Arc<ManagerFactoryProxy>,
    managers: Mutex<HashMap<String, Arc<dyn Manager>>>,
}

impl SessionProxy {
    pub fn new(session: Arc<dyn Session>, context: RequestContext) -> Self {
        let manager_factory = Arc::new(ManagerFactoryProxy::new(
            session.manager_factory(),
            context.clone(),
        ));
        Self {
            delegate: Delegate::new(session, context),
            manager_factory,
            managers: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped session.
    pub fn inner(&self) -> &Arc<dyn Session> {
        self.delegate.target_arc()
    }
}

#[async_trait]
impl Session for SessionProxy {
    #[trivial_delegation]
    fn id(&self) -> &str {
        self.delegate.target().id()
    }

    fn manager_factory(&self) -> Arc<dyn ManagerFactory> {
        Arc::clone(&self.manager_factory) as Arc<dyn ManagerFactory>
    }

    fn get_manager(&self, name: &str) -> Result<Arc<dyn Manager>> {
        if let Some(manager) = self.managers.lock().get(name) {
            return Ok(Arc::clone(manager));
        }

        let manager = self.manager_factory.create_manager(name, self)?;

        let mut managers = self.managers.lock();
        Ok(Arc::clone(
            managers.entry(name.to_string()).or_insert(manager),
        ))
    }

    #[trivial_delegation]
    fn manager_name_for_model(&self, model: &str) -> Option<String> {
        self.delegate.target().manager_name_for_model(model)
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

    #[trivial_delegation]
    async fn close(&self) -> Result<()> {
        self.delegate.target().close().await
    }
}
