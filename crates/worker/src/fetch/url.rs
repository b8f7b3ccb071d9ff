//! URL canonicalization for consistent cache keys and origin checks.

use url::Url;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let parsed = Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    Ok(canonical(&parsed))
}

/// Canonical form of an already parsed URL: lowercase host, no fragment.
pub fn canonical(url: &Url) -> Url {
    let mut out = url.clone();
    if let Some(host) = url.host_str() {
        let lowered = host.to_lowercase();
        if lowered != host {
            // Setting a lowercased version of a valid host can't fail.
            let _ = out.set_host(Some(&lowered));
        }
    }
    out.set_fragment(None);
    out
}

/// Whether two URLs share scheme, host and port.
pub fn same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonicalize_basic() {
        let url = canonicalize("https://example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_default_scheme() {
        let url = canonicalize("example.com").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_lowercase_host() {
        let url = canonicalize("https://EXAMPLE.COM").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_canonicalize_remove_fragment() {
        let url = canonicalize("https://example.com/comic#panel-2").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.path(), "/comic");
    }

    #[test]
    fn test_canonicalize_preserve_query() {
        let url = canonicalize("https://example.com?date=2024-01-01&b=2").unwrap();
        assert_eq!(url.query(), Some("date=2024-01-01&b=2"));
    }

    #[test]
    fn test_canonicalize_unsupported_scheme() {
        let result = canonicalize("file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_canonicalize_empty() {
        assert!(matches!(canonicalize(""), Err(UrlError::Empty)));
        assert!(matches!(canonicalize("   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_canonical_strips_fragment_only() {
        let url = Url::parse("https://comic.test/img/a.png?w=2#x").unwrap();
        assert_eq!(canonical(&url).as_str(), "https://comic.test/img/a.png?w=2");
    }

    #[test]
    fn test_same_origin() {
        let app = Url::parse("https://comic.test/").unwrap();
        assert!(same_origin(&app, &Url::parse("https://comic.test/app.js").unwrap()));
        assert!(!same_origin(&app, &Url::parse("http://comic.test/app.js").unwrap()));
        assert!(!same_origin(&app, &Url::parse("https://comic.test:8443/app.js").unwrap()));
        assert!(!same_origin(&app, &Url::parse("https://cdn.other.test/a.png").unwrap()));
    }
}
