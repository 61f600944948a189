//! Request URL resolution and origin checks.

use url::Url;

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Resolve a manifest path or page-relative URL against the page origin.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Join against `base` (absolute inputs replace it)
/// 3. Require http or https
/// 4. Remove fragment (#...), which never distinguishes cache entries
/// 5. Keep query string intact (do not reorder)
pub fn resolve(base: &Url, input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = base.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Whether `url` belongs to the page's own origin over http(s).
pub fn is_same_origin(origin: &Url, url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https") && url.origin() == origin.origin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("http://localhost:8080/").unwrap()
    }

    #[test]
    fn test_resolve_manifest_paths() {
        assert_eq!(resolve(&origin(), "./").unwrap().as_str(), "http://localhost:8080/");
        assert_eq!(resolve(&origin(), "./index.html").unwrap().as_str(), "http://localhost:8080/index.html");
        assert_eq!(resolve(&origin(), "data.json").unwrap().as_str(), "http://localhost:8080/data.json");
    }

    #[test]
    fn test_resolve_under_subdirectory() {
        let base = Url::parse("https://lab.test/app/").unwrap();
        assert_eq!(resolve(&base, "./offline.html").unwrap().as_str(), "https://lab.test/app/offline.html");
    }

    #[test]
    fn test_resolve_remove_fragment_preserve_query() {
        let url = resolve(&origin(), "./index.html?v=2#top").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query(), Some("v=2"));
    }

    #[test]
    fn test_resolve_absolute_input() {
        let url = resolve(&origin(), "https://cdn.test/lib.js").unwrap();
        assert_eq!(url.host_str(), Some("cdn.test"));
    }

    #[test]
    fn test_resolve_empty() {
        assert!(matches!(resolve(&origin(), "   "), Err(UrlError::Empty)));
    }

    #[test]
    fn test_resolve_unsupported_scheme() {
        let result = resolve(&origin(), "file:///etc/passwd");
        assert!(matches!(result, Err(UrlError::UnsupportedScheme(_))));
    }

    #[test]
    fn test_same_origin() {
        let origin = origin();
        assert!(is_same_origin(&origin, &Url::parse("http://localhost:8080/app.js").unwrap()));
        assert!(!is_same_origin(&origin, &Url::parse("http://localhost:9090/app.js").unwrap()));
        assert!(!is_same_origin(&origin, &Url::parse("https://localhost:8080/app.js").unwrap()));
        assert!(!is_same_origin(&origin, &Url::parse("https://cdn.test/app.js").unwrap()));
    }
}
