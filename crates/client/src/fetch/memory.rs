//! In-process network with canned responses.
//!
//! Routes are keyed by absolute URL. Unknown URLs answer 404, like a static
//! file server; going "offline" makes every fetch fail at the transport level.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{StatusCode, header};

use super::{FetchRequest, FetchResponse, Network};
use tubeguide_core::Error;

#[derive(Debug, Clone)]
struct Route {
    status: StatusCode,
    content_type: Option<String>,
    body: Bytes,
}

#[derive(Debug, Default)]
struct State {
    routes: HashMap<String, Route>,
    hits: HashMap<String, usize>,
    offline: bool,
    latency: Option<Duration>,
}

/// A cloneable handle; clones share routes and counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryNetwork {
    state: Arc<Mutex<State>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Serve `body` with status 200 at `url`.
    pub fn serve(&self, url: &str, body: impl Into<Bytes>) {
        self.serve_status(url, StatusCode::OK, body);
    }

    pub fn serve_status(&self, url: &str, status: StatusCode, body: impl Into<Bytes>) {
        let content_type = guess_content_type(url).map(String::from);
        self.lock()
            .routes
            .insert(url.to_string(), Route { status, content_type, body: body.into() });
    }

    pub fn remove(&self, url: &str) {
        self.lock().routes.remove(url);
    }

    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Delay every response by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    /// How many fetches reached `url`, including ones that failed offline.
    pub fn hits(&self, url: &str) -> usize {
        self.lock().hits.get(url).copied().unwrap_or(0)
    }
}

fn guess_content_type(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if path.ends_with('/') || path.ends_with(".html") {
        Some("text/html")
    } else if path.ends_with(".json") {
        Some("application/json")
    } else if path.ends_with(".css") {
        Some("text/css")
    } else if path.ends_with(".js") {
        Some("text/javascript")
    } else {
        None
    }
}

#[async_trait]
impl Network for MemoryNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        let key = request.url.as_str().to_string();
        let latency = {
            let mut state = self.lock();
            *state.hits.entry(key.clone()).or_default() += 1;
            state.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let route = {
            let state = self.lock();
            if state.offline {
                return Err(Error::NetworkUnavailable(format!("offline: {}", request.url)));
            }
            state.routes.get(&key).cloned()
        };

        let route = route.unwrap_or(Route { status: StatusCode::NOT_FOUND, content_type: None, body: Bytes::new() });

        let mut headers = header::HeaderMap::new();
        if let Some(content_type) = route.content_type.as_deref()
            && let Ok(value) = header::HeaderValue::from_str(content_type)
        {
            headers.insert(header::CONTENT_TYPE, value);
        }

        Ok(FetchResponse { url: request.url.clone(), status: route.status, headers, bytes: route.body, fetch_ms: 0 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Url;

    fn get(url: &str) -> FetchRequest {
        FetchRequest::get(Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn test_serves_routes_and_404s() {
        let network = MemoryNetwork::new();
        network.serve("http://app.test/data.json", "[]");

        let found = network.fetch(&get("http://app.test/data.json")).await.unwrap();
        assert_eq!(found.status, StatusCode::OK);
        assert_eq!(found.content_type(), Some("application/json"));

        let missing = network.fetch(&get("http://app.test/nope")).await.unwrap();
        assert_eq!(missing.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_offline_fails_and_counts_hits() {
        let network = MemoryNetwork::new();
        network.serve("http://app.test/", "<html>");
        network.set_offline(true);

        let err = network.fetch(&get("http://app.test/")).await.unwrap_err();
        assert!(err.is_network_failure());
        assert_eq!(network.hits("http://app.test/"), 1);

        network.set_offline(false);
        assert!(network.fetch(&get("http://app.test/")).await.is_ok());
        assert_eq!(network.hits("http://app.test/"), 2);
    }
}
