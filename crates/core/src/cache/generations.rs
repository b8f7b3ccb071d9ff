//! Cache generation lifecycle operations.
//!
//! A generation is a named, versioned set of entries. It is created in one
//! transaction together with its precached entries, promoted to `active`
//! when its worker activates, and deleted (with all of its entries) once a
//! newer generation of the same prefix takes over.

use super::connection::CacheDb;
use super::entries::{NewEntry, write_entry};
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// Lifecycle state of a stored generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationState {
    Installed,
    Active,
}

impl GenerationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::Active => "active",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "active" { Self::Active } else { Self::Installed }
    }
}

/// A stored cache generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub name: String,
    pub state: GenerationState,
    pub created_at: String,
    pub activated_at: Option<String>,
}

impl CacheDb {
    /// Create `name` (if absent) and write all `entries` into it atomically.
    ///
    /// Either the generation row and every entry are committed, or nothing
    /// is. Re-installing an existing generation upserts its entries and
    /// leaves its state untouched.
    pub async fn install_generation(&self, name: &str, entries: Vec<NewEntry>) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO generations (name, state, created_at) VALUES (?1, 'installed', ?2)
                     ON CONFLICT(name) DO NOTHING",
                    params![name, now],
                )?;
                for entry in &entries {
                    write_entry(&tx, &name, entry, &now)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// List every stored generation, oldest first.
    pub async fn list_generations(&self) -> Result<Vec<Generation>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<Generation>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT name, state, created_at, activated_at FROM generations ORDER BY created_at ASC, name ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    let state: String = row.get(1)?;
                    Ok(Generation {
                        name: row.get(0)?,
                        state: GenerationState::parse(&state),
                        created_at: row.get(2)?,
                        activated_at: row.get(3)?,
                    })
                })?;

                let mut generations = Vec::new();
                for row in rows {
                    generations.push(row?);
                }
                Ok(generations)
            })
            .await
            .map_err(Error::from)
    }

    /// Whether a generation with this name exists.
    pub async fn has_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let exists: bool = conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM generations WHERE name = ?1)",
                    params![name],
                    |row| row.get(0),
                )?;
                Ok(exists)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a generation and, through the foreign key cascade, its entries.
    ///
    /// Returns whether the generation existed.
    pub async fn delete_generation(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM generations WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Mark a generation as the active one.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` if the generation was never installed.
    pub async fn activate_generation(&self, name: &str) -> Result<(), Error> {
        let name = name.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let count = conn.execute(
                    "UPDATE generations SET state = 'active', activated_at = ?2 WHERE name = ?1",
                    params![name, now],
                )?;
                if count == 0 {
                    return Err(Error::InvalidState(format!("generation {name} is not installed")));
                }
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Most recently activated generation whose name starts with `prefix`.
    pub async fn active_generation(&self, prefix: &str) -> Result<Option<String>, Error> {
        let prefix = prefix.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row(
                    "SELECT name FROM generations
                     WHERE state = 'active' AND substr(name, 1, length(?1)) = ?1
                     ORDER BY activated_at DESC LIMIT 1",
                    params![prefix],
                    |row| row.get(0),
                );

                match result {
                    Ok(name) => Ok(Some(name)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entries::tests::make_entry;
    use crate::cache::partitions::Partition;

    #[tokio::test]
    async fn test_install_creates_generation_with_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entries = vec![
            make_entry("https://example.com/index.html", Partition::Shell, "<html>"),
            make_entry("https://example.com/app.js", Partition::Shell, "js"),
        ];

        db.install_generation("app-v1", entries).await.unwrap();

        let generations = db.list_generations().await.unwrap();
        assert_eq!(generations.len(), 1);
        assert_eq!(generations[0].name, "app-v1");
        assert_eq!(generations[0].state, GenerationState::Installed);
        assert_eq!(db.list_entries("app-v1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_install_rolls_back_on_failure() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let entries = vec![
            make_entry("https://example.com/index.html", Partition::Shell, "<html>"),
            make_entry("https://example.com/app.js", Partition::Shell, "js"),
        ];

        // Second write fails mid-transaction.
        db.conn
            .call(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER reject_js BEFORE INSERT ON entries
                     WHEN NEW.url LIKE '%.js' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
                )
            })
            .await
            .unwrap();

        let result = db.install_generation("app-v1", entries).await;
        assert!(result.is_err());
        assert!(!db.has_generation("app-v1").await.unwrap());
        assert_eq!(db.count_url_everywhere("https://example.com/index.html").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_entries() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.install_generation(
            "app-v1",
            vec![make_entry("https://example.com/index.html", Partition::Shell, "<html>")],
        )
        .await
        .unwrap();

        assert!(db.delete_generation("app-v1").await.unwrap());
        assert!(!db.delete_generation("app-v1").await.unwrap());
        assert_eq!(db.count_url_everywhere("https://example.com/index.html").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_activate_and_lookup_by_prefix() {
        let db = CacheDb::open_in_memory().await.unwrap();
        db.install_generation("app-v1", Vec::new()).await.unwrap();
        db.install_generation("other-v7", Vec::new()).await.unwrap();

        assert_eq!(db.active_generation("app-").await.unwrap(), None);

        db.activate_generation("app-v1").await.unwrap();
        db.activate_generation("other-v7").await.unwrap();

        assert_eq!(db.active_generation("app-").await.unwrap(), Some("app-v1".to_string()));
        assert_eq!(db.active_generation("other-").await.unwrap(), Some("other-v7".to_string()));
    }

    #[tokio::test]
    async fn test_activate_missing_generation() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let result = db.activate_generation("app-v2").await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }
}
