//! Forwarding base shared by every request proxy.

use std::sync::Arc;

use crate::scope::{RequestContext, RequestInfo, ServiceContainer};

/// A target object plus the request it is being used for.
///
/// Proxies hold a `Delegate` and implement the same trait as the target.
/// Members they do not override are single-expression forwards through
/// [`Delegate::target`], so every read sees the target's current state and
/// the target itself is never modified.
pub struct Delegate<T: ?Sized> {
    target: Arc<T>,
    context: RequestContext,
}

impl<T: ?Sized> Delegate<T> {
    pub fn new(target: Arc<T>, context: RequestContext) -> Self {
        Self { target, context }
    }

    /// The wrapped object.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Shared handle to the wrapped object.
    pub fn target_arc(&self) -> &Arc<T> {
        &self.target
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn request(&self) -> &RequestInfo {
        self.context.request()
    }

    pub fn container(&self) -> &ServiceContainer {
        self.context.container()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::QueryCollector;
    use crate::scope::RequestInfo;
    use crate::stopwatch::NoopStopwatch;
    use parking_lot::Mutex;

    fn context() -> RequestContext {
        let container = ServiceContainer::new(
            Arc::new(QueryCollector::new()),
            Arc::new(NoopStopwatch),
        );
        RequestContext::new(RequestInfo::with_id("req-1", "GET", "/"), Arc::new(container))
    }

    #[test]
    fn test_forwarding_is_live() {
        let target = Arc::new(Mutex::new(1));
        let delegate = Delegate::new(Arc::clone(&target), context());

        *target.lock() = 2;

        assert_eq!(*delegate.target().lock(), 2);
        assert!(Arc::ptr_eq(delegate.target_arc(), &target));
        assert_eq!(delegate.request().id, "req-1");
    }
}
