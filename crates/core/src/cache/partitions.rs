//! Logical partitions and the size-bounded store.
//!
//! Bounded partitions evict in insertion order (FIFO). Reading an entry does
//! not refresh its position; only the sequence number assigned on first
//! insertion counts.

use super::connection::CacheDb;
use super::entries::{NewEntry, entry_exists, write_entry};
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Logical subset of a generation's entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    /// Shell document, precached assets and runtime shell assets.
    Shell,
    /// Raster images, bounded.
    Images,
    /// Everything else.
    Runtime,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Images => "images",
            Self::Runtime => "runtime",
        }
    }

    pub(crate) fn parse(s: &str) -> Self {
        match s {
            "shell" => Self::Shell,
            "images" => Self::Images,
            _ => Self::Runtime,
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn count(conn: &rusqlite::Connection, generation: &str, partition: Partition) -> Result<usize, rusqlite::Error> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM entries WHERE generation = ?1 AND partition = ?2",
        params![generation, partition.as_str()],
        |row| row.get(0),
    )?;
    Ok(n as usize)
}

/// Remove oldest-inserted entries until fewer than `cap` remain.
///
/// Returns the URLs of the evicted entries, oldest first.
fn evict(
    conn: &rusqlite::Connection, generation: &str, partition: Partition, cap: usize,
) -> Result<Vec<String>, rusqlite::Error> {
    let current = count(conn, generation, partition)?;
    if current < cap {
        return Ok(Vec::new());
    }
    let excess = (current + 1 - cap.max(1)).min(current) as i64;

    let mut stmt = conn.prepare(
        "SELECT key, url FROM entries WHERE generation = ?1 AND partition = ?2
         ORDER BY seq ASC LIMIT ?3",
    )?;
    let victims = stmt
        .query_map(params![generation, partition.as_str(), excess], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut evicted = Vec::with_capacity(victims.len());
    for (key, url) in victims {
        conn.execute("DELETE FROM entries WHERE generation = ?1 AND key = ?2", params![generation, key])?;
        evicted.push(url);
    }
    Ok(evicted)
}

impl CacheDb {
    /// Number of entries in one partition of a generation.
    pub async fn partition_len(&self, generation: &str, partition: Partition) -> Result<usize, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<usize, Error> { Ok(count(conn, &generation, partition)?) })
            .await
            .map_err(Error::from)
    }

    /// Evict oldest-inserted entries until the partition holds fewer than `cap`.
    ///
    /// Returns the URLs of evicted entries in eviction order.
    pub async fn evict_until_under(
        &self, generation: &str, partition: Partition, cap: usize,
    ) -> Result<Vec<String>, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let evicted = evict(&tx, &generation, partition, cap)?;
                tx.commit()?;
                Ok(evicted)
            })
            .await
            .map_err(Error::from)
    }

    /// Insert into a bounded partition, evicting first when it is full.
    ///
    /// Overwriting a key that is already present never evicts. Eviction and
    /// insertion commit together in one transaction on the connection
    /// thread, so concurrent callers can't push the partition past `cap`.
    /// A `cap` of zero retains nothing.
    ///
    /// Returns the URLs of evicted entries.
    pub async fn put_bounded(&self, generation: &str, entry: &NewEntry, cap: usize) -> Result<Vec<String>, Error> {
        let generation = generation.to_string();
        let entry = entry.clone();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<Vec<String>, Error> {
                let tx = conn.transaction()?;
                let mut evicted = Vec::new();
                if entry_exists(&tx, &generation, &entry.key)? {
                    write_entry(&tx, &generation, &entry, &now)?;
                } else {
                    evicted = evict(&tx, &generation, entry.partition, cap)?;
                    if cap > 0 {
                        write_entry(&tx, &generation, &entry, &now)?;
                    }
                }
                tx.commit()?;
                Ok(evicted)
            })
            .await
            .map_err(Error::from)
    }
}
