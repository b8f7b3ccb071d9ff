//! The worker: lifecycle state machine plus the per-request entry point.
//!
//! A worker starts `Parsed`, installs its generation, waits (`Installed`)
//! until it is told to skip waiting, then activates and claims every page.
//! Until it has claimed, the generation activated by a previous run keeps
//! serving; with no such generation, intercepted requests go straight to the
//! network.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use shellcache_core::{AppConfig, CacheDb, Error, NavigationPolicy, Partition};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::background::BackgroundTasks;
use crate::fetch::{Fetcher, canonicalize};
use crate::lifecycle::{ActivateReport, CacheLifecycle, GenerationConfig, InstallReport};
use crate::message::ControlMessage;
use crate::request::{Request, Response};
use crate::router::{Disposition, Router};
use crate::strategy::{self, StrategyContext, StrategyTable};

/// Lifecycle states of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed and waiting for skip-waiting.
    Installed,
    Activating,
    Activated,
    /// Install failed; this worker will never control pages.
    Redundant,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub origin: Url,
    pub scope: String,
    pub shell_document: String,
    pub precache: Vec<String>,
    pub generation: GenerationConfig,
    pub image_cap: usize,
    pub navigation_policy: NavigationPolicy,
    pub skip_waiting_on_install: bool,
}

impl WorkerConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = canonicalize(&config.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(Self {
            origin,
            scope: config.scope.clone(),
            shell_document: config.shell_document.clone(),
            precache: config.precache.clone(),
            generation: GenerationConfig::from_app_config(config),
            image_cap: config.image_cache_cap,
            navigation_policy: config.navigation_policy,
            skip_waiting_on_install: config.skip_waiting_on_install,
        })
    }
}

/// Snapshot of a worker for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub current_generation: String,
    pub controlling_generation: Option<String>,
    pub skip_waiting: bool,
    pub background_tasks: usize,
    /// Entries in the controlling generation.
    pub cached_entries: usize,
    pub cached_images: usize,
}

pub struct Worker {
    config: WorkerConfig,
    store: CacheDb,
    fetcher: Arc<dyn Fetcher>,
    router: Router,
    strategies: StrategyTable,
    lifecycle: CacheLifecycle,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
    controlling: RwLock<Option<String>>,
    /// Serializes install/activate transitions.
    transition: Mutex<()>,
    background: BackgroundTasks,
}

impl Worker {
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the shell document can't be resolved
    /// against the origin.
    pub fn new(config: WorkerConfig, store: CacheDb, fetcher: Arc<dyn Fetcher>) -> Result<Self, Error> {
        let router = Router::new(&config.origin, &config.scope, &config.shell_document)?;
        let lifecycle = CacheLifecycle::new(
            store.clone(),
            fetcher.clone(),
            config.generation.clone(),
            config.origin.clone(),
            config.precache.clone(),
        );
        Ok(Self {
            strategies: StrategyTable::new(config.navigation_policy),
            config,
            store,
            fetcher,
            router,
            lifecycle,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            controlling: RwLock::new(None),
            transition: Mutex::new(()),
            background: BackgroundTasks::new(),
        })
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub async fn controlling_generation(&self) -> Option<String> {
        self.controlling.read().await.clone()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    async fn set_state(&self, state: WorkerState) {
        let mut current = self.state.write().await;
        tracing::debug!("worker state {} -> {}", *current, state);
        *current = state;
    }

    /// Resume the previous generation, install the current one and activate
    /// it when skip-waiting has been signalled.
    ///
    /// An install failure is returned, but the resumed generation keeps
    /// serving requests.
    pub async fn start(&self) -> Result<WorkerState, Error> {
        self.resume().await?;
        self.install().await?;
        if self.skip_waiting.load(Ordering::SeqCst) {
            // A message may have activated us between install and here.
            return self.skip_waiting().await;
        }
        Ok(self.state().await)
    }

    async fn resume(&self) -> Result<(), Error> {
        let mut controlling = self.controlling.write().await;
        if controlling.is_none()
            && let Some(previous) = self.lifecycle.active_generation().await?
        {
            tracing::info!(generation = %previous, "resuming previously active cache generation");
            self.trim_images(&previous).await;
            *controlling = Some(previous);
        }
        Ok(())
    }

    /// Bring a resumed generation's image partition back within the configured
    /// cap, which may have shrunk since the generation was written.
    async fn trim_images(&self, generation: &str) {
        let bound = self.config.image_cap.saturating_add(1);
        match self.store.evict_until_under(generation, Partition::Images, bound).await {
            Ok(evicted) if !evicted.is_empty() => {
                tracing::info!(generation, evicted = evicted.len(), "trimmed image cache to {}", self.config.image_cap);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(generation, "image cache trim failed: {}", e),
        }
    }

    /// Precache the current generation.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` unless the worker is `Parsed`, or the
    /// install error, after which the worker is `Redundant`.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        let _guard = self.transition.lock().await;
        let state = self.state().await;
        if state != WorkerState::Parsed {
            return Err(Error::InvalidState(format!("cannot install a worker that is {state}")));
        }

        self.set_state(WorkerState::Installing).await;
        match self.lifecycle.install().await {
            Ok(report) => {
                self.set_state(WorkerState::Installed).await;
                if self.config.skip_waiting_on_install {
                    self.skip_waiting.store(true, Ordering::SeqCst);
                }
                Ok(report)
            }
            Err(e) => {
                tracing::warn!(generation = %self.config.generation.name(), "install failed: {}", e);
                self.set_state(WorkerState::Redundant).await;
                Err(e)
            }
        }
    }

    /// Activate the installed generation and claim all pages.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` unless the worker is `Installed`.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        let _guard = self.transition.lock().await;
        self.activate_locked().await
    }

    async fn activate_locked(&self) -> Result<ActivateReport, Error> {
        let state = self.state().await;
        if state != WorkerState::Installed {
            return Err(Error::InvalidState(format!("cannot activate a worker that is {state}")));
        }

        self.set_state(WorkerState::Activating).await;
        match self.lifecycle.activate().await {
            Ok(report) => {
                *self.controlling.write().await = Some(report.generation.clone());
                self.set_state(WorkerState::Activated).await;
                tracing::info!(generation = %report.generation, "claimed clients");
                Ok(report)
            }
            Err(e) => {
                tracing::warn!("activation failed: {}", e);
                self.set_state(WorkerState::Installed).await;
                Err(e)
            }
        }
    }

    /// Stop waiting: activate now if installed, or as soon as install completes.
    pub async fn skip_waiting(&self) -> Result<WorkerState, Error> {
        self.skip_waiting.store(true, Ordering::SeqCst);
        let _guard = self.transition.lock().await;
        if self.state().await == WorkerState::Installed {
            self.activate_locked().await?;
        }
        Ok(self.state().await)
    }

    pub async fn on_message(&self, message: ControlMessage) -> Result<WorkerState, Error> {
        tracing::debug!(?message, "control message received");
        match message {
            ControlMessage::SkipWaiting => self.skip_waiting().await,
        }
    }

    /// Serve one request from a page.
    ///
    /// # Errors
    ///
    /// Only when neither the network nor the cache can answer a non-image
    /// request.
    pub async fn handle(&self, request: &Request) -> Result<Response, Error> {
        match self.router.classify(request) {
            Disposition::Bypass => {
                tracing::debug!("bypassing {} {}", request.method, request.url);
                self.fetcher.fetch(request).await
            }
            Disposition::Passthrough => {
                tracing::debug!("passing through cross-origin {}", request.url);
                self.fetcher.fetch(request).await
            }
            Disposition::Intercept(class) => {
                let Some(generation) = self.controlling_generation().await else {
                    tracing::debug!("no controlling generation, fetching {}", request.url);
                    return self.fetcher.fetch(request).await;
                };

                let resolved = self.router.resolve(request, class);
                let ctx = StrategyContext {
                    store: self.store.clone(),
                    fetcher: self.fetcher.clone(),
                    generation,
                    shell_document: self.router.shell_document_request(),
                    image_cap: self.config.image_cap,
                    background: self.background.clone(),
                };
                strategy::execute(self.strategies.for_class(class), &ctx, &resolved, class).await
            }
        }
    }

    /// Wait for every background refresh to finish.
    pub async fn drain_background(&self) {
        self.background.drain().await;
    }

    pub async fn status(&self) -> WorkerStatus {
        let controlling = self.controlling_generation().await;
        let (cached_entries, cached_images) = match &controlling {
            Some(generation) => (
                self.store.list_entries(generation).await.map(|e| e.len()).unwrap_or_default(),
                self.store.partition_len(generation, Partition::Images).await.unwrap_or_default(),
            ),
            None => (0, 0),
        };

        WorkerStatus {
            state: self.state().await,
            current_generation: self.config.generation.name(),
            controlling_generation: controlling,
            skip_waiting: self.skip_waiting.load(Ordering::SeqCst),
            background_tasks: self.background.pending().await,
            cached_entries,
            cached_images,
        }
    }
}
