//! Request proxy around a session's manager factory.

use std::sync::Arc;

use trivial_delegation::trivial_delegation;

use super::delegate::Delegate;
use super::manager::ManagerProxy;
use crate::interfaces::{Manager, ManagerFactory, Result, Session};
use crate::scope::RequestContext;

/// Hands out [`ManagerProxy`] instances bound to the factory's request.
pub struct ManagerFactoryProxy {
    delegate: Delegate<dyn ManagerFactory>,
}

impl ManagerFactoryProxy {
    pub fn new(factory: Arc<dyn ManagerFactory>, context: RequestContext) -> Self {
        Self {
            delegate: Delegate::new(factory, context),
        }
    }
}

impl ManagerFactory for ManagerFactoryProxy {
    #[trivial_delegation]
    fn manager_names(&self) -> Vec<String> {
        self.delegate.target().manager_names()
    }

    fn create_manager(&self, name: &str, session: &dyn Session) -> Result<Arc<dyn Manager>> {
        let manager = self.delegate.target().create_manager(name, session)?;
        let proxy: Arc<dyn Manager> = ManagerProxy::new(manager, self.delegate.context().clone());
        Ok(proxy)
    }
}
