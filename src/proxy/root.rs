//! Request proxy around the shared data service.

use std::sync::Arc;

use tracing::debug;
use trivial_delegation::trivial_delegation;

use super::delegate::Delegate;
use super::session::SessionProxy;
use crate::interfaces::{DataService, Session};
use crate::scope::RequestContext;

/// Wraps the shared data service for one request.
///
/// Only session creation is overridden: each new session is wrapped in a
/// [`SessionProxy`] bound to this request.
pub struct RootServiceProxy {
    delegate: Delegate<dyn DataService>,
}

impl RootServiceProxy {
    pub fn new(service: Arc<dyn DataService>, context: RequestContext) -> Self {
        debug!(request_id = %context.request().id, "Wrapping data service for request");
        Self {
            delegate: Delegate::new(service, context),
        }
    }

    pub fn context(&self) -> &RequestContext {
        self.delegate.context()
    }
}

impl DataService for RootServiceProxy {
    fn create_session(&self) -> Arc<dyn Session> {
        let session = self.delegate.target().create_session();
        Arc::new(SessionProxy::new(session, self.delegate.context().clone()))
    }

    #[trivial_delegation]
    fn manager_names(&self) -> Vec<String> {
        self.delegate.target().manager_names()
    }

    #[trivial_delegation]
    fn adapter_names(&self) -> Vec<String> {
        self.delegate.target().adapter_names()
    }
}
