//! Abstract interfaces for the data layer.
//!
//! These traits define the contracts for:
//! - The root data service, sessions and manager factories
//! - Managers and repositories (CRUD, queries, transactions, mapping)
//! - The optional timing subsystem (stopwatch, sections, events, clock)
//!
//! Request proxies implement the same traits as the objects they wrap, so
//! calling code cannot tell a proxy from the shared instance.

pub mod data_service;
pub mod error;
pub mod manager;
pub mod stopwatch;

pub use data_service::{DataService, ManagerFactory, Session};
pub use error::{DataError, Result};
pub use manager::{Manager, MapProgress, Query, Repository};
pub use stopwatch::{Clock, Stopwatch, StopwatchEvent, StopwatchSection};
