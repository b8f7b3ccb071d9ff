//! Core types and shared functionality for shellcache.
//!
//! This crate provides:
//! - Versioned cache generations with SQLite backend
//! - Size-bounded cache partitions with FIFO eviction
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, NewEntry, Partition, StoredResponse};
pub use config::{AppConfig, ConfigError, NavigationPolicy};
pub use error::Error;
