//! Request classification.
//!
//! The router decides what happens to a request before any network or cache
//! access. The decision is a closed [`Disposition`]; intercepted requests
//! carry exactly one [`ResourceClass`], which the strategy table maps to an
//! algorithm.

use shellcache_core::{Error, Partition};
use url::Url;

use crate::fetch::{canonical, same_origin};
use crate::request::{Destination, Request, RequestMode};

/// Extensions of shell assets (styles, scripts, vector images, manifest).
const SHELL_ASSET_EXTENSIONS: &[&str] = &["css", "js", "mjs", "svg", "webmanifest"];

/// Extensions of raster images.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "avif", "bmp", "ico"];

/// Resource class of an intercepted request, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Document,
    ShellAsset,
    Image,
    Other,
}

impl ResourceClass {
    /// Partition that stores responses of this class.
    pub fn partition(&self) -> Partition {
        match self {
            Self::Document | Self::ShellAsset => Partition::Shell,
            Self::Image => Partition::Images,
            Self::Other => Partition::Runtime,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::ShellAsset => "shell_asset",
            Self::Image => "image",
            Self::Other => "other",
        }
    }
}

/// What the worker does with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Non-GET: straight to the network, never cached.
    Bypass,
    /// Different origin or outside the scope: straight to the network, never cached.
    Passthrough,
    /// Served by the strategy for this class.
    Intercept(ResourceClass),
}

#[derive(Debug, Clone)]
pub struct Router {
    origin: Url,
    scope: String,
    shell_document: Url,
}

impl Router {
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the shell document path can't be
    /// resolved against `origin`.
    pub fn new(origin: &Url, scope: &str, shell_document: &str) -> Result<Self, Error> {
        let shell_document = origin
            .join(shell_document)
            .map_err(|e| Error::InvalidUrl(format!("{shell_document}: {e}")))?;
        Ok(Self { origin: origin.clone(), scope: scope.to_string(), shell_document })
    }

    pub fn classify(&self, request: &Request) -> Disposition {
        if request.method != reqwest::Method::GET {
            return Disposition::Bypass;
        }
        if !same_origin(&request.url, &self.origin) || !self.in_scope(request.url.path()) {
            return Disposition::Passthrough;
        }
        Disposition::Intercept(self.class_of(request))
    }

    fn class_of(&self, request: &Request) -> ResourceClass {
        if request.mode == RequestMode::Navigate
            || request.destination == Some(Destination::Document)
            || self.is_scope_root(request.url.path())
        {
            return ResourceClass::Document;
        }

        let extension = extension_of(request.url.path());
        let has_extension = |list: &[&str]| extension.as_deref().is_some_and(|ext| list.contains(&ext));

        if matches!(request.destination, Some(Destination::Style | Destination::Script | Destination::Manifest))
            || has_extension(SHELL_ASSET_EXTENSIONS)
        {
            return ResourceClass::ShellAsset;
        }

        if request.destination == Some(Destination::Image) || has_extension(IMAGE_EXTENSIONS) {
            return ResourceClass::Image;
        }

        ResourceClass::Other
    }

    fn in_scope(&self, path: &str) -> bool {
        path.starts_with(&self.scope) || self.is_scope_root(path)
    }

    fn is_scope_root(&self, path: &str) -> bool {
        path == self.scope || (self.scope.len() > 1 && path == self.scope.trim_end_matches('/'))
    }

    /// Request a strategy keys and fetches for `request`.
    ///
    /// Every document resolves to the shell document; everything else to
    /// its canonical form.
    pub fn resolve(&self, request: &Request, class: ResourceClass) -> Request {
        if class == ResourceClass::Document {
            return Request { url: self.shell_document.clone(), body: Default::default(), ..request.clone() };
        }
        Request { url: canonical(&request.url), ..request.clone() }
    }

    /// Plain request for the shell document.
    pub fn shell_document_request(&self) -> Request {
        Request::navigate(self.shell_document.clone())
    }
}

fn extension_of(path: &str) -> Option<String> {
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    if ext.is_empty() { None } else { Some(ext.to_ascii_lowercase()) }
}
