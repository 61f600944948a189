//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::state::AppState;
use crate::tools::assets::{self, AssetFetchParams};
use crate::tools::favorites::{self, FavoritesListParams, FavoritesToggleParams};
use crate::tools::history::{self, HistoryRemoveParams};
use crate::tools::search::{AnalysisSearchParams, search_impl};
use crate::tools::{cache, status};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The main MCP server handler for tubeguide.
#[derive(Clone)]
pub struct TubeguideServer {
    state: Arc<AppState>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl TubeguideServer {
    /// Create a new server handler around a booted page.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Search lab analyses by name, mnemonic, analyser, tube or id. Accent and case insensitive. The query is added to the search history."
    )]
    async fn analysis_search(&self, params: Parameters<AnalysisSearchParams>) -> Result<CallToolResult, McpError> {
        search_impl(&self.state, params.0).await
    }

    #[tool(description = "List favorite analyses, sorted by name or by tube.")]
    async fn favorites_list(&self, params: Parameters<FavoritesListParams>) -> Result<CallToolResult, McpError> {
        favorites::list_impl(&self.state, params.0).await
    }

    #[tool(description = "Pin or unpin an analysis by id. Returns whether it is now a favorite.")]
    async fn favorites_toggle(&self, params: Parameters<FavoritesToggleParams>) -> Result<CallToolResult, McpError> {
        favorites::toggle_impl(&self.state, params.0).await
    }

    #[tool(description = "Remove every favorite.")]
    async fn favorites_clear(&self) -> Result<CallToolResult, McpError> {
        favorites::clear_impl(&self.state).await
    }

    #[tool(description = "List recent searches, newest first. Entries expire after a week.")]
    async fn history_list(&self) -> Result<CallToolResult, McpError> {
        history::list_impl(&self.state).await
    }

    #[tool(description = "Remove one recent search by its position in history_list.")]
    async fn history_remove(&self, params: Parameters<HistoryRemoveParams>) -> Result<CallToolResult, McpError> {
        history::remove_impl(&self.state, params.0).await
    }

    #[tool(description = "Forget every recent search.")]
    async fn history_clear(&self) -> Result<CallToolResult, McpError> {
        history::clear_impl(&self.state).await
    }

    #[tool(description = "Ask the page's cache controller for its version tag (GET_VERSION).")]
    async fn cache_version(&self) -> Result<CallToolResult, McpError> {
        cache::version_impl(&self.state).await
    }

    #[tool(description = "Delete every cache generation, including the current one (CLEAR_CACHES).")]
    async fn cache_clear(&self) -> Result<CallToolResult, McpError> {
        cache::clear_impl(&self.state).await
    }

    #[tool(
        description = "Fetch a path through the page's cache controller. Reports whether the response came from the cache, the network, the offline fallback or passed through."
    )]
    async fn asset_fetch(&self, params: Parameters<AssetFetchParams>) -> Result<CallToolResult, McpError> {
        assets::fetch_impl(&self.state, params.0).await
    }

    #[tool(description = "Report controller registration, data source, connectivity and any pending update.")]
    async fn app_status(&self) -> Result<CallToolResult, McpError> {
        status::status_impl(&self.state).await
    }

    #[tool(description = "Apply a pending update: activate the waiting version and reload the page data.")]
    async fn update_apply(&self) -> Result<CallToolResult, McpError> {
        status::apply_impl(&self.state).await
    }
}

impl ServerHandler for TubeguideServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "tubeguide".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Lab analysis lookup: search analyses to find the tube to use, pin favorites, and inspect the offline cache."
                    .into(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
