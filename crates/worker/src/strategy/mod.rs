//! Caching strategies.
//!
//! Each strategy takes a resolved request and its class and produces a
//! response or a fetch error. Fetch errors are recoverable: strategies fall
//! back to the cache or, for images, to a placeholder. Only "no network and
//! no entry" reaches the caller as an error.
//!
//! Store failures never fail a response: a failed read counts as a miss and
//! a failed write is logged and dropped.

mod bounded;
mod cache_first;
mod network_first;
mod stale_while_revalidate;

use std::sync::Arc;

use shellcache_core::{CacheDb, Error, NavigationPolicy, NewEntry, Partition};

use crate::background::BackgroundTasks;
use crate::fetch::Fetcher;
use crate::request::{Request, Response};
use crate::router::ResourceClass;

/// The caching algorithms a class can be served with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    CacheFirst,
    BoundedCacheFirst,
    NetworkFirst,
    StaleWhileRevalidate,
}

impl From<NavigationPolicy> for StrategyKind {
    fn from(policy: NavigationPolicy) -> Self {
        match policy {
            NavigationPolicy::NetworkFirst => Self::NetworkFirst,
            NavigationPolicy::StaleWhileRevalidate => Self::StaleWhileRevalidate,
        }
    }
}

/// Dispatch table from resource class to strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrategyTable {
    document: StrategyKind,
    shell_asset: StrategyKind,
    image: StrategyKind,
    other: StrategyKind,
}

impl StrategyTable {
    /// Default table with the given navigation policy for documents.
    pub fn new(navigation: NavigationPolicy) -> Self {
        Self {
            document: navigation.into(),
            shell_asset: StrategyKind::CacheFirst,
            image: StrategyKind::BoundedCacheFirst,
            other: StrategyKind::NetworkFirst,
        }
    }

    pub fn for_class(&self, class: ResourceClass) -> StrategyKind {
        match class {
            ResourceClass::Document => self.document,
            ResourceClass::ShellAsset => self.shell_asset,
            ResourceClass::Image => self.image,
            ResourceClass::Other => self.other,
        }
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self::new(NavigationPolicy::default())
    }
}

/// Everything a strategy may touch while serving one request.
#[derive(Clone)]
pub struct StrategyContext {
    pub store: CacheDb,
    pub fetcher: Arc<dyn Fetcher>,
    /// Generation the response is read from and written to.
    pub generation: String,
    pub shell_document: Request,
    pub image_cap: usize,
    pub background: BackgroundTasks,
}

impl StrategyContext {
    /// Cached response for `request`, if any.
    async fn lookup(&self, request: &Request) -> Option<Response> {
        match self.store.match_entry(&self.generation, &request.cache_key()).await {
            Ok(Some(stored)) => {
                tracing::debug!("cache hit for {}", request.url);
                Some(Response::from_stored(stored))
            }
            Ok(None) => {
                tracing::debug!("cache miss for {}", request.url);
                None
            }
            Err(e) => {
                tracing::warn!(url = %request.url, "cache lookup failed, treating as miss: {}", e);
                None
            }
        }
    }

    /// Store a cacheable response. Images go through the bounded store.
    async fn store(&self, request: &Request, class: ResourceClass, response: &Response) {
        if !response.is_cacheable() {
            tracing::debug!("not caching {} (status {})", request.url, response.status.as_u16());
            return;
        }

        let entry = NewEntry {
            key: request.cache_key(),
            method: request.method.as_str().to_string(),
            url: request.url.to_string(),
            partition: class.partition(),
            response: response.to_stored(),
        };

        let result = match entry.partition {
            Partition::Images => self.store.put_bounded(&self.generation, &entry, self.image_cap).await,
            _ => self.store.put_entry(&self.generation, &entry).await.map(|_| Vec::new()),
        };

        match result {
            Ok(evicted) if !evicted.is_empty() => {
                tracing::debug!(partition = %entry.partition, "evicted {} to cache {}", evicted.join(", "), entry.url);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(url = %entry.url, "cache write failed: {}", e),
        }
    }

    /// Offline answer for a class whose own entry is missing.
    async fn offline_fallback(&self, class: ResourceClass) -> Option<Response> {
        match class {
            ResourceClass::Document => self.lookup(&self.shell_document).await,
            _ => None,
        }
    }
}

/// Serve `request` with strategy `kind`.
pub async fn execute(
    kind: StrategyKind, ctx: &StrategyContext, request: &Request, class: ResourceClass,
) -> Result<Response, Error> {
    tracing::debug!(class = class.as_str(), strategy = ?kind, "serving {}", request.url);
    match kind {
        StrategyKind::CacheFirst => cache_first::run(ctx, request, class).await,
        StrategyKind::BoundedCacheFirst => bounded::run(ctx, request, class).await,
        StrategyKind::NetworkFirst => network_first::run(ctx, request, class).await,
        StrategyKind::StaleWhileRevalidate => stale_while_revalidate::run(ctx, request, class).await,
    }
}
