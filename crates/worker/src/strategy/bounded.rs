//! Cache-first over the bounded image partition.
//!
//! Same lookup and fetch as cache-first. Writes go through the FIFO-bounded
//! store, and a miss while offline yields a 503 placeholder instead of an
//! error, so an image element just shows as broken.

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
            tracing::debug!("serving placeholder for {}: {}", request.url, err);
            Ok(Response::placeholder())
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::ResponseSource;
    use crate::strategy::tests::{context, get};
    use crate::testing::MockFetcher;
    use shellcache_core::Partition;
    use std::sync::Arc;

    fn strip(name: &str) -> String {
        format!("https://comic.test/strips/{name}.png")
    }

    #[tokio::test]
    async fn test_cap_two_scenario() {
        let fetcher = Arc::new(MockFetcher::new().with(&strip("a"), "A").with(&strip("b"), "B").with(&strip("c"), "C"));
        let ctx = context(fetcher.clone(), 2).await;

        for name in ["a", "b", "c"] {
            run(&ctx, &get(&strip(name)), ResourceClass::Image).await.unwrap();
            assert!(ctx.store.partition_len(&ctx.generation, Partition::Images).await.unwrap() <= 2);
        }

        let urls: Vec<String> =
            ctx.store.list_entries(&ctx.generation).await.unwrap().into_iter().map(|e| e.url).collect();
        assert_eq!(urls, vec![strip("b"), strip("c")]);

        // A was evicted: offline it is a miss, answered by the placeholder.
        fetcher.set_offline(true);
        let response = run(&ctx, &get(&strip("a")), ResourceClass::Image).await.unwrap();
        assert_eq!(response.source, ResponseSource::Placeholder);
        assert_eq!(response.status.as_u16(), 503);

        let response = run(&ctx, &get(&strip("b")), ResourceClass::Image).await.unwrap();
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(&response.body[..], b"B");
    }

    #[tokio::test]
    async fn test_refetch_is_byte_identical() {
        let png: &[u8] = b"\x89PNG\r\n\x1a\nstrip-bytes";
        let fetcher = Arc::new(MockFetcher::new().with_bytes(&strip("today"), "image/png", png));
        let ctx = context(fetcher.clone(), 50).await;

        let first = run(&ctx, &get(&strip("today")), ResourceClass::Image).await.unwrap();
        let second = run(&ctx, &get(&strip("today")), ResourceClass::Image).await.unwrap();

        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(first.body, second.body);
        assert_eq!(second.header("content-type"), Some("image/png"));
        assert_eq!(fetcher.calls(&strip("today")), 1);
    }

    #[tokio::test]
    async fn test_partial_content_is_not_cached() {
        let fetcher = Arc::new(MockFetcher::new().with_status(&strip("big"), 206, "first-1kb"));
        let ctx = context(fetcher.clone(), 50).await;

        let first = run(&ctx, &get(&strip("big")), ResourceClass::Image).await.unwrap();
        assert_eq!(first.status.as_u16(), 206);
        assert_eq!(ctx.store.partition_len(&ctx.generation, Partition::Images).await.unwrap(), 0);

        fetcher.set_offline(true);
        let second = run(&ctx, &get(&strip("big")), ResourceClass::Image).await.unwrap();
        assert_eq!(second.source, ResponseSource::Placeholder);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_image_requests_respect_cap() {
        let mut fetcher = MockFetcher::new();
        for i in 0..30 {
            fetcher = fetcher.with(&strip(&i.to_string()), "img");
        }
        let ctx = context(Arc::new(fetcher), 4).await;

        let mut handles = Vec::new();
        for i in 0..30 {
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                run(&ctx, &get(&strip(&i.to_string())), ResourceClass::Image).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(ctx.store.partition_len(&ctx.generation, Partition::Images).await.unwrap(), 4);
    }
}
