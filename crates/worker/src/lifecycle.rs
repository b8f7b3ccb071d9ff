//! Cache lifecycle: precache on install, garbage-collect on activate.
//!
//! Generations are named `{prefix}-{version}`. Only generations carrying
//! this app's prefix are ever deleted; caches of other apps sharing the
//! store are left alone.

use std::sync::Arc;

use serde::Serialize;
use shellcache_core::{AppConfig, CacheDb, Error, NewEntry, Partition};
use url::Url;

use crate::fetch::{Fetcher, canonical};
use crate::request::Request;

/// Name of the current generation and of the family it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationConfig {
    pub prefix: String,
    pub version: String,
}

impl GenerationConfig {
    pub fn new(prefix: impl Into<String>, version: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), version: version.into() }
    }

    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(&config.cache_prefix, &config.cache_version)
    }

    pub fn name(&self) -> String {
        format!("{}-{}", self.prefix, self.version)
    }

    /// Prefix shared by every generation of this app, including the dash.
    pub fn family(&self) -> String {
        format!("{}-", self.prefix)
    }

    pub fn owns(&self, generation: &str) -> bool {
        generation.starts_with(&self.family())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub generation: String,
    pub assets: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
    pub generation: String,
    pub deleted: Vec<String>,
}

/// Owns creation and deletion of generations.
pub struct CacheLifecycle {
    store: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    generation: GenerationConfig,
    origin: Url,
    manifest: Vec<String>,
}

impl CacheLifecycle {
    pub fn new(
        store: CacheDb, fetcher: Arc<dyn Fetcher>, generation: GenerationConfig, origin: Url, manifest: Vec<String>,
    ) -> Self {
        Self { store, fetcher, generation, origin, manifest }
    }

    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    /// Fetch the whole manifest and commit it as the current generation.
    ///
    /// Every asset is fetched before anything is written, and the generation
    /// row and its entries commit in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `Error::InstallFailed` naming the first asset that could not be
    /// fetched or answered with a non-success status. Nothing is stored.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let name = self.generation.name();
        tracing::info!(generation = %name, assets = self.manifest.len(), "installing cache generation");

        let mut entries = Vec::with_capacity(self.manifest.len());
        for path in &self.manifest {
            let url = self.origin.join(path).map_err(|e| Error::InstallFailed {
                asset: path.clone(),
                reason: format!("invalid path: {e}"),
            })?;
            let request = Request::get(canonical(&url));

            let response = self
                .fetcher
                .fetch(&request)
                .await
                .map_err(|e| Error::InstallFailed { asset: path.clone(), reason: e.to_string() })?;

            if !response.is_success() {
                return Err(Error::InstallFailed {
                    asset: path.clone(),
                    reason: format!("status {}", response.status.as_u16()),
                });
            }

            entries.push(NewEntry {
                key: request.cache_key(),
                method: request.method.as_str().to_string(),
                url: request.url.to_string(),
                partition: Partition::Shell,
                response: response.to_stored(),
            });
        }

        let assets = entries.len();
        self.store.install_generation(&name, entries).await?;
        tracing::info!(generation = %name, assets, "cache generation installed");

        Ok(InstallReport { generation: name, assets })
    }

    /// Delete every other generation of this app and mark the current one active.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` if the current generation was never installed.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        let name = self.generation.name();
        if !self.store.has_generation(&name).await? {
            return Err(Error::InvalidState(format!("generation {name} is not installed")));
        }

        let mut deleted = Vec::new();
        for generation in self.store.list_generations().await? {
            if generation.name == name || !self.generation.owns(&generation.name) {
                continue;
            }
            if self.store.delete_generation(&generation.name).await? {
                tracing::info!(generation = %generation.name, "deleted stale cache generation");
                deleted.push(generation.name);
            }
        }

        self.store.activate_generation(&name).await?;
        tracing::info!(generation = %name, deleted = deleted.len(), "cache generation activated");

        Ok(ActivateReport { generation: name, deleted })
    }

    /// Generation of this app most recently activated, from a previous run.
    pub async fn active_generation(&self) -> Result<Option<String>, Error> {
        self.store.active_generation(&self.generation.family()).await
    }
}
