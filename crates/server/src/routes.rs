//! HTTP surface of the host.
//!
//! Control endpoints live under `/__shellcache/`; every other request is
//! converted into a worker request and answered by the worker.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::header::ACCEPT;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use shellcache_worker::{ControlMessage, Destination, Request, RequestMode, Worker, WorkerState, WorkerStatus};
use url::Url;

use crate::error::HostError;

pub const MESSAGE_PATH: &str = "/__shellcache/message";
pub const STATUS_PATH: &str = "/__shellcache/status";

/// Response header naming where the body came from.
pub const SOURCE_HEADER: &str = "x-shellcache-source";

const MAX_REQUEST_BODY: usize = 10 * 1024 * 1024;

pub fn router(worker: Arc<Worker>) -> Router {
    Router::new()
        .route(MESSAGE_PATH, post(message))
        .route(STATUS_PATH, get(status))
        .fallback(proxy)
        .with_state(worker)
}

#[derive(Debug, serde::Serialize)]
struct MessageReply {
    state: WorkerState,
}

async fn message(State(worker): State<Arc<Worker>>, body: Bytes) -> Result<Json<MessageReply>, HostError> {
    let message = ControlMessage::parse(&body)?;
    let state = worker.on_message(message).await?;
    Ok(Json(MessageReply { state }))
}

async fn status(State(worker): State<Arc<Worker>>) -> Json<WorkerStatus> {
    Json(worker.status().await)
}

async fn proxy(State(worker): State<Arc<Worker>>, request: axum::extract::Request) -> Result<Response, HostError> {
    let (parts, body) = request.into_parts();
    let body = to_bytes(body, MAX_REQUEST_BODY)
        .await
        .map_err(|e| HostError::InvalidRequest(format!("unreadable body: {e}")))?;

    let request = worker_request(&worker.config().origin, parts, body)?;
    let response = worker.handle(&request).await?;
    Ok(http_response(response))
}

/// Build a worker request from an incoming HTTP request.
///
/// Absolute-form targets (forward-proxy style) are used as-is; origin-form
/// targets are resolved against `origin`.
pub fn worker_request(origin: &Url, parts: Parts, body: Bytes) -> Result<Request, HostError> {
    let target = parts.uri.to_string();
    let url = match parts.uri.scheme() {
        Some(_) => Url::parse(&target),
        None => origin.join(&target),
    }
    .map_err(|e| HostError::InvalidRequest(format!("{target}: {e}")))?;

    let mode = header_str(&parts.headers, "sec-fetch-mode")
        .and_then(RequestMode::from_header)
        .unwrap_or_else(|| guess_mode(&parts.headers));
    let destination = header_str(&parts.headers, "sec-fetch-dest").map(Destination::from_header);

    Ok(Request { method: parts.method, url, mode, destination, headers: parts.headers, body })
}

/// Clients that don't send fetch metadata: an HTML-first Accept is a navigation.
fn guess_mode(headers: &HeaderMap) -> RequestMode {
    match header_str(headers, ACCEPT.as_str()) {
        Some(accept) if accept.trim_start().starts_with("text/html") => RequestMode::Navigate,
        _ => RequestMode::NoCors,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn http_response(response: shellcache_worker::Response) -> Response {
    let source = response.source.as_str();
    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = response.status;
    *http.headers_mut() = response.headers;
    http.headers_mut()
        .insert(SOURCE_HEADER, HeaderValue::from_static(source));
    http
}
