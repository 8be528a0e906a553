//! data-scope - request-scoped instrumentation for a data-access layer
//!
//! Wraps a shared data service in a per-request proxy tree so that every
//! query issued while serving a request is recorded (adapter, operation,
//! arguments, timing) and optionally timed by a profiler, without changing
//! what the data layer returns.
//!
//! - [`scope::DataLayer`] decides per request whether callers get a proxy tree
//! - [`proxy`] holds the decorators themselves
//! - [`collector::QueryCollector`] keeps the call records
//! - [`report`] turns them into operator payloads

pub mod collector;
pub mod config;
pub mod fixture;
pub mod interfaces;
pub mod mock;
pub mod proxy;
pub mod report;
pub mod scope;
pub mod stopwatch;
pub mod utils;
