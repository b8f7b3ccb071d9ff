//! Cache entry operations.
//!
//! An entry maps a request key to a captured response inside one generation.
//! Writes are upserts by key; overwriting an entry replaces its response but
//! keeps the insertion sequence number of the first write.

use super::connection::CacheDb;
use super::partitions::Partition;
use crate::Error;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A captured response as persisted in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// An entry about to be written.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub key: String,
    pub method: String,
    pub url: String,
    pub partition: Partition,
    pub response: StoredResponse,
}

/// Listing view of a stored entry, without the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub key: String,
    pub url: String,
    pub partition: Partition,
    pub status: u16,
    pub seq: i64,
    pub stored_at: String,
}

pub(crate) fn encode_headers(headers: &[(String, String)]) -> String {
    serde_json::to_string(headers).unwrap_or_else(|_| String::from("[]"))
}

fn decode_headers(json: &str) -> Vec<(String, String)> {
    serde_json::from_str(json).unwrap_or_else(|e| {
        tracing::warn!("discarding unreadable stored headers: {}", e);
        Vec::new()
    })
}

/// Upsert an entry on an already borrowed connection or transaction.
pub(crate) fn write_entry(
    conn: &rusqlite::Connection, generation: &str, entry: &NewEntry, stored_at: &str,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO entries (
            generation, key, method, url, partition, status, headers_json, body, seq, stored_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                  COALESCE((SELECT MAX(seq) FROM entries WHERE generation = ?1), 0) + 1,
                  ?9)
        ON CONFLICT(generation, key) DO UPDATE SET
            method = excluded.method,
            url = excluded.url,
            partition = excluded.partition,
            status = excluded.status,
            headers_json = excluded.headers_json,
            body = excluded.body,
            stored_at = excluded.stored_at",
        params![
            generation,
            &entry.key,
            &entry.method,
            &entry.url,
            entry.partition.as_str(),
            entry.response.status as i64,
            encode_headers(&entry.response.headers),
            &entry.response.body,
            stored_at,
        ],
    )?;
    Ok(())
}

pub(crate) fn entry_exists(conn: &rusqlite::Connection, generation: &str, key: &str) -> Result<bool, rusqlite::Error> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM entries WHERE generation = ?1 AND key = ?2)",
        params![generation, key],
        |row| row.get(0),
    )
}

impl CacheDb {
    /// Look up the response stored under `key` in `generation`.
    ///
    /// Returns None on a miss, including when the generation doesn't exist.
    pub async fn match_entry(&self, generation: &str, key: &str) -> Result<Option<StoredResponse>, Error> {
        let generation = generation.to_string();
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<StoredResponse>, Error> {
                let mut stmt =
                    conn.prepare("SELECT status, headers_json, body FROM entries WHERE generation = ?1 AND key = ?2")?;

                let result = stmt.query_row(params![generation, key], |row| {
                    let headers_json: String = row.get(1)?;
                    Ok(StoredResponse {
                        status: row.get::<_, i64>(0)? as u16,
                        headers: decode_headers(&headers_json),
                        body: row.get(2)?,
                    })
                });

                match result {
                    Ok(r) => Ok(Some(r)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or overwrite an entry in an unbounded partition.
    pub async fn put_entry(&self, generation: &str, entry: &NewEntry) -> Result<(), Error> {
        let generation = generation.to_string();
        let entry = entry.clone();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                write_entry(conn, &generation, &entry, &now)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// List entries of a generation in insertion order.
    pub async fn list_entries(&self, generation: &str) -> Result<Vec<EntryMeta>, Error> {
        let generation = generation.to_string();
        self.conn
            .call(move |conn| -> Result<Vec<EntryMeta>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key, url, partition, status, seq, stored_at
                     FROM entries WHERE generation = ?1 ORDER BY seq ASC",
                )?;
                let rows = stmt.query_map(params![generation], |row| {
                    let partition: String = row.get(2)?;
                    Ok(EntryMeta {
                        key: row.get(0)?,
                        url: row.get(1)?,
                        partition: Partition::parse(&partition),
                        status: row.get::<_, i64>(3)? as u16,
                        seq: row.get(4)?,
                        stored_at: row.get(5)?,
                    })
                })?;

                let mut entries = Vec::new();
                for row in rows {
                    entries.push(row?);
                }
                Ok(entries)
            })
            .await
            .map_err(Error::from)
    }

    /// Count all entries of every generation whose URL equals `url`.
    ///
    /// Used by diagnostics to prove a URL was never cached anywhere.
    pub async fn count_url_everywhere(&self, url: &str) -> Result<u64, Error> {
        let url = url.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries WHERE url = ?1", params![url], |row| {
                    row.get(0)
                })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::hash::compute_cache_key;

    pub(crate) fn make_entry(url: &str, partition: Partition, body: &str) -> NewEntry {
        NewEntry {
            key: compute_cache_key("GET", url),
            method: "GET".to_string(),
            url: url.to_string(),
            partition,
            response: StoredResponse {
                status: 200,
                headers: vec![("content-type".to_string(), "text/plain".to_string())],
                body: body.as_bytes().to_vec(),
            },
        }
    }

    pub(crate) async fn db_with_generation(name: &str) -> CacheDb {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.install_generation(name, Vec::new()).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_put_and_match() {
        let db = db_with_generation("app-v1").await;
        let entry = make_entry("https://example.com/app.js", Partition::Shell, "console.log(1)");

        db.put_entry("app-v1", &entry).await.unwrap();

        let hit = db.match_entry("app-v1", &entry.key).await.unwrap().unwrap();
        assert_eq!(hit.status, 200);
        assert_eq!(hit.body, b"console.log(1)");
        assert_eq!(hit.headers, vec![("content-type".to_string(), "text/plain".to_string())]);
    }

    #[tokio::test]
    async fn test_match_missing() {
        let db = db_with_generation("app-v1").await;
        assert!(db.match_entry("app-v1", "nonexistent").await.unwrap().is_none());
        assert!(db.match_entry("app-v0", "nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_insertion_order() {
        let db = db_with_generation("app-v1").await;
        let first = make_entry("https://example.com/a", Partition::Runtime, "a1");
        let second = make_entry("https://example.com/b", Partition::Runtime, "b1");
        db.put_entry("app-v1", &first).await.unwrap();
        db.put_entry("app-v1", &second).await.unwrap();

        let rewritten = make_entry("https://example.com/a", Partition::Runtime, "a2");
        db.put_entry("app-v1", &rewritten).await.unwrap();

        let listed = db.list_entries("app-v1").await.unwrap();
        let urls: Vec<&str> = listed.iter().map(|e| e.url.as_str()).collect();
        assert_eq!(urls, vec!["https://example.com/a", "https://example.com/b"]);

        let hit = db.match_entry("app-v1", &first.key).await.unwrap().unwrap();
        assert_eq!(hit.body, b"a2");
    }

    #[tokio::test]
    async fn test_put_into_missing_generation_fails() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entry = make_entry("https://example.com/a", Partition::Runtime, "a");
        let result = db.put_entry("app-v9", &entry).await;
        assert!(matches!(result, Err(Error::Database(_))));
    }
}
