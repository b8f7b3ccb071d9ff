//! Scripted network for strategy and worker tests.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::fetch::Fetcher;
use crate::request::{Request, Response, ResponseSource};
use shellcache_core::Error;

#[derive(Clone)]
enum Route {
    Respond { status: u16, content_type: String, body: Bytes },
    Fail,
}

/// Fetcher answering from a table of URLs. Unknown URLs get a 404.
#[derive(Default)]
pub(crate) struct MockFetcher {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MockFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(self, url: &str, body: &str) -> Self {
        self.set(url, body);
        self
    }

    pub(crate) fn with_status(self, url: &str, status: u16, body: &str) -> Self {
        self.set_status(url, status, body);
        self
    }

    pub(crate) fn with_bytes(self, url: &str, content_type: &str, body: &[u8]) -> Self {
        self.route(
            url,
            Route::Respond { status: 200, content_type: content_type.to_string(), body: Bytes::copy_from_slice(body) },
        );
        self
    }

    /// Every fetch of `url` fails like an unreachable host.
    pub(crate) fn with_failure(self, url: &str) -> Self {
        self.route(url, Route::Fail);
        self
    }

    pub(crate) fn set(&self, url: &str, body: &str) {
        self.set_status(url, 200, body);
    }

    pub(crate) fn set_status(&self, url: &str, status: u16, body: &str) {
        self.route(
            url,
            Route::Respond {
                status,
                content_type: "text/plain".to_string(),
                body: Bytes::copy_from_slice(body.as_bytes()),
            },
        );
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Number of fetches of `url`, including failed ones.
    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| u.as_str() == url).count()
    }

    fn route(&self, url: &str, route: Route) {
        self.routes.lock().unwrap().insert(url.to_string(), route);
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let url = request.url.to_string();
        self.calls.lock().unwrap().push(url.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {url}")));
        }

        let route = self.routes.lock().unwrap().get(&url).cloned();
        match route {
            Some(Route::Respond { status, content_type, body }) => {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&content_type) {
                    headers.insert(CONTENT_TYPE, value);
                }
                Ok(Response {
                    status: StatusCode::from_u16(status).unwrap(),
                    headers,
                    body,
                    source: ResponseSource::Network,
                })
            }
            Some(Route::Fail) => Err(Error::Network(format!("connection refused: {url}"))),
            None => Ok(Response {
                status: StatusCode::NOT_FOUND,
                headers: HeaderMap::new(),
                body: Bytes::new(),
                source: ResponseSource::Network,
            }),
        }
    }
}
