//! Intercepted requests and the responses handed back to pages.

use bytes::Bytes;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use shellcache_core::StoredResponse;
use shellcache_core::cache::hash::compute_cache_key;
use url::Url;

/// Request mode as reported by `Sec-Fetch-Mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Top-level page load.
    Navigate,
    SameOrigin,
    Cors,
    #[default]
    NoCors,
}

impl RequestMode {
    pub fn from_header(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "navigate" => Some(Self::Navigate),
            "same-origin" => Some(Self::SameOrigin),
            "cors" => Some(Self::Cors),
            "no-cors" => Some(Self::NoCors),
            _ => None,
        }
    }
}

/// Request destination as reported by `Sec-Fetch-Dest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Document,
    Style,
    Script,
    Image,
    Font,
    Manifest,
    Empty,
    Other,
}

impl Destination {
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" => Self::Document,
            "style" => Self::Style,
            "script" => Self::Script,
            "image" => Self::Image,
            "font" => Self::Font,
            "manifest" => Self::Manifest,
            "empty" => Self::Empty,
            _ => Self::Other,
        }
    }
}

/// A request intercepted from a page.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
    /// None when the host couldn't tell what the page will use the response for.
    pub destination: Option<Destination>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Request {
    /// A plain GET with no destination hint.
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::default(),
            destination: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// A top-level navigation to `url`.
    pub fn navigate(url: Url) -> Self {
        Self { mode: RequestMode::Navigate, destination: Some(Destination::Document), ..Self::get(url) }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Key of the cache entry this request reads and writes.
    pub fn cache_key(&self) -> String {
        compute_cache_key(self.method.as_str(), self.url.as_str())
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// Synthesized because neither network nor cache could answer.
    Placeholder,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Cache => "cache",
            Self::Placeholder => "placeholder",
        }
    }
}

/// A response snapshot: status, headers and the complete body.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Only complete `200 OK` responses are stored. A `206` body is a
    /// fragment and a `204` has nothing to replay.
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK
    }

    /// Stand-in for an image that is neither cached nor reachable.
    pub fn placeholder() -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            headers,
            body: Bytes::from_static(b"resource unavailable offline"),
            source: ResponseSource::Placeholder,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub(crate) fn from_stored(stored: StoredResponse) -> Self {
        let mut headers = HeaderMap::new();
        for (name, value) in &stored.headers {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
                headers.append(name, value);
            }
        }
        Self {
            status: StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK),
            headers,
            body: Bytes::from(stored.body),
            source: ResponseSource::Cache,
        }
    }

    pub(crate) fn to_stored(&self) -> StoredResponse {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        StoredResponse { status: self.status.as_u16(), headers, body: self.body.to_vec() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_and_destination_headers() {
        assert_eq!(RequestMode::from_header("navigate"), Some(RequestMode::Navigate));
        assert_eq!(RequestMode::from_header("NO-CORS"), Some(RequestMode::NoCors));
        assert_eq!(RequestMode::from_header("websocket"), None);
        assert_eq!(Destination::from_header("image"), Destination::Image);
        assert_eq!(Destination::from_header("audioworklet"), Destination::Other);
    }

    #[test]
    fn test_navigate_request() {
        let req = Request::navigate(Url::parse("https://comic.test/2024/01/01").unwrap());
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.mode, RequestMode::Navigate);
        assert_eq!(req.destination, Some(Destination::Document));
    }

    #[test]
    fn test_cache_key_depends_on_method() {
        let url = Url::parse("https://comic.test/api").unwrap();
        let get = Request::get(url.clone());
        let post = Request::get(url).with_method(Method::POST);
        assert_ne!(get.cache_key(), post.cache_key());
    }

    #[test]
    fn test_stored_conversion_preserves_snapshot() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));
        headers.append("x-extra", HeaderValue::from_static("1"));
        let response =
            Response { status: StatusCode::OK, headers, body: Bytes::from_static(b"\x89PNG"), source: ResponseSource::Network };

        let restored = Response::from_stored(response.to_stored());
        assert_eq!(restored.status, StatusCode::OK);
        assert_eq!(restored.header("content-type"), Some("image/png"));
        assert_eq!(restored.header("x-extra"), Some("1"));
        assert_eq!(restored.body, response.body);
        assert_eq!(restored.source, ResponseSource::Cache);
    }

    #[test]
    fn test_placeholder() {
        let response = Response::placeholder();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.source, ResponseSource::Placeholder);
        assert!(!response.is_success());
    }

    #[test]
    fn test_only_complete_ok_is_cacheable() {
        let with_status = |code: u16| Response {
            status: StatusCode::from_u16(code).unwrap(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            source: ResponseSource::Network,
        };
        assert!(with_status(200).is_cacheable());
        for code in [201, 204, 206, 304, 404] {
            assert!(!with_status(code).is_cacheable(), "{code}");
        }
        assert!(with_status(206).is_success());
    }
}
