//! Stale-while-revalidate: answer from the cache now, refresh it for later.
//!
//! The refresh runs as a detached task. The caller never waits on it and is
//! never told about its outcome; a failed refresh leaves the old entry in
//! place. On a miss this is plain network-first.

use shellcache_core::Error;

use super::{StrategyContext, network_first};
use crate::request::{Request, Response};
use crate::router::ResourceClass;

pub(super) async fn run(ctx: &StrategyContext, request: &Request, class: ResourceClass) -> Result<Response, Error> {
    if let Some(hit) = ctx.lookup(request).await {
        revalidate(ctx, request, class).await;
        return Ok(hit);
    }
    network_first::run(ctx, request, class).await
}

async fn revalidate(ctx: &StrategyContext, request: &Request, class: ResourceClass) {
    let background = ctx.background.clone();
    let ctx = ctx.clone();
    let request = request.clone();
    background
        .spawn(async move {
            match ctx.fetcher.fetch(&request).await {
                Ok(response) => ctx.store(&request, class, &response).await,
                Err(e) => tracing::debug!("background refresh of {} failed: {}", request.url, e),
            }
        })
        .await;
}
