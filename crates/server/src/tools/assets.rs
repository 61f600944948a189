//! asset_fetch tool implementation.
//!
//! Issues a request from the page, so it goes through the controller's
//! stale-while-revalidate handling like any other page fetch.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tubeguide_client::ResponseSource;
use tubeguide_core::Error;

use super::json_result;
use crate::state::AppState;

/// Bodies longer than this are cut in the output.
const MAX_BODY_CHARS: usize = 64 * 1024;

/// Parameters for the asset_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssetFetchParams {
    /// Path relative to the page origin (e.g. "./app.js"), or an absolute URL.
    pub path: String,

    /// Treat the request as a navigation; failed navigations fall back to the offline page.
    #[serde(default)]
    pub navigate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssetFetchOutput {
    pub url: String,
    pub status: u16,
    /// cache, network, offline_fallback or passthrough.
    pub source: ResponseSource,
    pub content_type: Option<String>,
    pub bytes: usize,
    pub body: String,
    pub truncated: bool,
    pub fetch_ms: u64,
}

pub async fn fetch_impl(state: &AppState, params: AssetFetchParams) -> Result<CallToolResult, McpError> {
    if params.path.trim().is_empty() {
        return Err(Error::InvalidInput("path cannot be empty".into()).into());
    }

    let result = {
        let page = state.page.read().await;
        if params.navigate { page.navigate(&params.path).await } else { page.get(&params.path).await }
    };
    state.coordinator.connectivity().observe(&result);
    let served = result?;

    let text = served.response.text();
    let truncated = text.chars().count() > MAX_BODY_CHARS;
    let body = if truncated { text.chars().take(MAX_BODY_CHARS).collect() } else { text };

    let output = AssetFetchOutput {
        url: served.response.url.to_string(),
        status: served.response.status.as_u16(),
        source: served.source,
        content_type: served.response.content_type().map(String::from),
        bytes: served.response.bytes.len(),
        body,
        truncated,
        fetch_ms: served.response.fetch_ms,
    };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures::state;
    use crate::tools::parse_output;
    use tubeguide_client::Connectivity;

    fn params(path: &str, navigate: bool) -> AssetFetchParams {
        AssetFetchParams { path: path.into(), navigate }
    }

    #[tokio::test]
    async fn test_fetch_served_from_cache() {
        let (state, _network) = state().await;
        let output: AssetFetchOutput = parse_output(&fetch_impl(&state, params("./app.js", false)).await.unwrap());
        assert_eq!(output.status, 200);
        assert_eq!(output.source, ResponseSource::Cache);
        assert_eq!(output.body, "./app.js v1");
    }

    #[tokio::test]
    async fn test_offline_navigation_falls_back() {
        let (state, network) = state().await;
        network.set_offline(true);

        let output: AssetFetchOutput =
            parse_output(&fetch_impl(&state, params("./somewhere.html", true)).await.unwrap());
        assert_eq!(output.source, ResponseSource::OfflineFallback);
        assert_eq!(output.body, "./offline.html v1");
        assert_eq!(state.coordinator.connectivity().current(), Connectivity::Offline);

        assert!(fetch_impl(&state, params("./somewhere.png", false)).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_empty_path() {
        let (state, _network) = state().await;
        assert!(fetch_impl(&state, params(" ", false)).await.is_err());
    }
}
