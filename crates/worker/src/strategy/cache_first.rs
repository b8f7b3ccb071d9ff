//! Cache-first: answer from the cache without touching the network.

use shellcache_core::Error;

use super::StrategyContext;
use crate::request::{Request, Response};
use crate::router::ResourceClass;

pub(super) async fn run(ctx: &StrategyContext, request: &Request, class: ResourceClass) -> Result<Response, Error> {
    if let Some(hit) = ctx.lookup(request).await {
        return Ok(hit);
    }

    match ctx.fetcher.fetch(request).await {
        Ok(response) => {
            ctx.store(request, class, &response).await;
            Ok(response)
        }
        Err(err) if err.is_fetch_failure() => {
            tracing::debug!("fetch failed for {}: {}", request.url, err);
            ctx.offline_fallback(class).await.ok_or(err)
        }
        Err(err) => Err(err),
    }
}
