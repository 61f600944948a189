//! Network access for the cache controller.
//!
//! ### Semantics
//! - Any HTTP status is a response; only transport failures are errors
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//!
//! The [`Network`] trait is the seam between the controller and the outside
//! world: [`HttpNetwork`] talks to a real server, [`MemoryNetwork`] serves
//! canned responses in-process.

pub mod memory;
pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, StatusCode, Url, header};
use std::time::{Duration, Instant};

pub use memory::MemoryNetwork;
pub use self::url::{UrlError, is_same_origin, resolve};

use tubeguide_core::{Error, StoredResponse};

/// Whether a request loads a top-level document or a subresource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    Navigate,
    #[default]
    Subresource,
}

/// A request issued by a page.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
}

impl FetchRequest {
    pub fn get(url: Url) -> Self {
        Self { method: Method::GET, url, mode: RequestMode::Subresource }
    }

    pub fn navigate(url: Url) -> Self {
        Self { method: Method::GET, url, mode: RequestMode::Navigate }
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }
}

/// Response from a fetch operation, or a cached copy of one.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The URL that was requested
    pub url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Response headers
    pub headers: header::HeaderMap,
    /// Response body bytes
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds (0 when served from cache)
    pub fetch_ms: u64,
}

impl FetchResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Snapshot this response for storage under `method url`.
    pub fn to_stored(&self, method: &Method) -> StoredResponse {
        let headers = self
            .headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        StoredResponse::new(method.as_str(), self.url.as_str(), self.status.as_u16(), headers, self.bytes.to_vec())
    }

    /// Rebuild a response from a stored snapshot.
    pub fn from_stored(stored: &StoredResponse) -> Result<Self, Error> {
        let url = Url::parse(&stored.url).map_err(|e| Error::CorruptEntry(format!("url {}: {e}", stored.url)))?;
        let status = StatusCode::from_u16(stored.status_code)
            .map_err(|e| Error::CorruptEntry(format!("status {}: {e}", stored.status_code)))?;

        let mut headers = header::HeaderMap::new();
        for (name, value) in &stored.headers {
            let name = header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::CorruptEntry(format!("header {name}: {e}")))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| Error::CorruptEntry(format!("header value {value}: {e}")))?;
            headers.append(name, value);
        }

        Ok(Self { url, status, headers, bytes: Bytes::from(stored.body.clone()), fetch_ms: 0 })
    }
}

/// Something that can perform a network fetch.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error>;
}

/// Configuration for the HTTP network.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "tubeguide/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "tubeguide/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

/// reqwest-backed network.
pub struct HttpNetwork {
    http: Client,
    config: FetchConfig,
}

impl HttpNetwork {
    /// Create a new HTTP network with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::NetworkUnavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

fn transport_error(err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::FetchTimeout(err.to_string())
    } else {
        Error::NetworkUnavailable(err.to_string())
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        let start = Instant::now();

        let response = self
            .http
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let headers = response.headers().clone();
        let bytes = response.bytes().await.map_err(transport_error)?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("fetched {} {} -> {} in {}ms ({} bytes)", request.method, request.url, status, fetch_ms, bytes.len());

        Ok(FetchResponse { url: request.url.clone(), status, headers, bytes, fetch_ms })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "tubeguide/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_stored_round_trip_keeps_headers() {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("application/json"));
        let response = FetchResponse {
            url: Url::parse("http://localhost:8080/data.json").unwrap(),
            status: StatusCode::OK,
            headers,
            bytes: Bytes::from_static(b"[]"),
            fetch_ms: 12,
        };

        let stored = response.to_stored(&Method::GET);
        assert_eq!(stored.method, "GET");
        assert_eq!(stored.status_code, 200);

        let rebuilt = FetchResponse::from_stored(&stored).unwrap();
        assert_eq!(rebuilt.content_type(), Some("application/json"));
        assert_eq!(rebuilt.text(), "[]");
        assert_eq!(rebuilt.fetch_ms, 0);
    }

    #[test]
    fn test_from_stored_rejects_bad_status() {
        let mut stored = StoredResponse::new("GET", "http://localhost:8080/", 200, Vec::new(), Vec::new());
        stored.status_code = 42;
        assert!(matches!(FetchResponse::from_stored(&stored), Err(Error::CorruptEntry(_))));
    }

    #[tokio::test]
    async fn test_http_network_returns_error_statuses_as_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string("console.log(1)"))
            .mount(&server)
            .await;

        let network = HttpNetwork::new(FetchConfig::default()).unwrap();

        let ok = FetchRequest::get(Url::parse(&format!("{}/app.js", server.uri())).unwrap());
        let response = network.fetch(&ok).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.text(), "console.log(1)");

        let missing = FetchRequest::get(Url::parse(&format!("{}/missing.css", server.uri())).unwrap());
        let response = network.fetch(&missing).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_http_network_rejects_oversized_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64)))
            .mount(&server)
            .await;

        let network = HttpNetwork::new(FetchConfig { max_bytes: 16, ..Default::default() }).unwrap();
        let request = FetchRequest::get(Url::parse(&format!("{}/data.json", server.uri())).unwrap());
        assert!(matches!(network.fetch(&request).await, Err(Error::FetchTooLarge(_))));
    }

    #[tokio::test]
    async fn test_http_network_unreachable() {
        let network =
            HttpNetwork::new(FetchConfig { timeout: Duration::from_millis(500), ..Default::default() }).unwrap();
        let request = FetchRequest::get(Url::parse("http://127.0.0.1:9/").unwrap());
        let err = network.fetch(&request).await.unwrap_err();
        assert!(err.is_network_failure());
    }
}
