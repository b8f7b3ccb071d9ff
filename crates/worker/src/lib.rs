//! Offline caching worker for shellcache.
//!
//! This crate provides the cache lifecycle (precache, activate, claim), the
//! request router, the caching strategies and the HTTP fetch pipeline they
//! fall back on.

pub mod background;
pub mod fetch;
pub mod lifecycle;
pub mod message;
pub mod request;
pub mod router;
pub mod strategy;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use background::BackgroundTasks;
pub use fetch::{FetchClient, FetchConfig, Fetcher};
pub use lifecycle::{ActivateReport, CacheLifecycle, GenerationConfig, InstallReport};
pub use message::ControlMessage;
pub use request::{Destination, Request, RequestMode, Response, ResponseSource};
pub use router::{Disposition, ResourceClass, Router};
pub use strategy::{StrategyContext, StrategyKind, StrategyTable};
pub use worker::{Worker, WorkerConfig, WorkerState, WorkerStatus};
