//! SQLite-backed store for versioned cache generations.
//!
//! This module provides the persistent request/response cache using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Named generations (`{prefix}-{version}`) created atomically at install
//! - Request-keyed entries using SHA-256 hashing
//! - Size-bounded partitions with FIFO eviction
//! - Automatic schema migrations and WAL mode
//!
//! Every operation runs as one closure on the connection's background
//! thread, so a closure is never interleaved with another store call.

pub mod connection;
pub mod entries;
pub mod generations;
pub mod hash;
pub mod migrations;
pub mod partitions;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{NewEntry, StoredResponse};
pub use generations::{Generation, GenerationState};
pub use partitions::Partition;
