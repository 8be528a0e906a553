//! Request-scoped proxies over the data layer.
//!
//! One proxy tree is built per request:
//!
//! ```text
//! RootServiceProxy -> SessionProxy -> ManagerFactoryProxy -> ManagerProxy
//! ```
//!
//! Each proxy implements the same trait as the object it wraps, forwards
//! everything it does not override, and never mutates the shared target.
//! Only [`ManagerProxy`] records calls and timings; the outer layers exist so
//! that every manager reached from a request is the instrumented one.

mod delegate;
mod manager;
mod manager_factory;
mod root;
mod session;

pub use delegate::Delegate;
pub use manager::{ManagerProxy, DEFAULT_ADAPTER_NAME};
pub use manager_factory::ManagerFactoryProxy;
pub use root::RootServiceProxy;
pub use session::SessionProxy;
