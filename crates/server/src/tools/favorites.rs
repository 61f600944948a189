//! Favorites tools: list, toggle and clear pinned analyses.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tubeguide_core::Error;
use tubeguide_core::catalogue::SortOrder;

use super::json_result;
use super::search::AnalysisView;
use crate::state::AppState;

/// Parameters for the favorites_list tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FavoritesListParams {
    /// "name" (default) or "tube".
    #[serde(default)]
    pub sort: SortOrder,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FavoritesListOutput {
    pub count: usize,
    pub favorites: Vec<AnalysisView>,
}

/// Parameters for the favorites_toggle tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FavoritesToggleParams {
    /// Analysis id to pin or unpin.
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FavoritesToggleOutput {
    pub id: String,
    /// Whether the analysis is a favorite after the toggle.
    pub favorite: bool,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FavoritesClearOutput {
    pub removed: usize,
}

pub async fn list_impl(state: &AppState, params: FavoritesListParams) -> Result<CallToolResult, McpError> {
    let loaded = state.loaded.read().await;
    let favorites = state.favorites.lock().await;
    let records: Vec<AnalysisView> = favorites
        .records(&loaded.catalogue, params.sort)
        .into_iter()
        .map(|record| AnalysisView::new(record, &favorites))
        .collect();

    json_result(&FavoritesListOutput { count: records.len(), favorites: records })
}

/// Pin or unpin an analysis. Unknown ids are rejected.
pub async fn toggle_impl(state: &AppState, params: FavoritesToggleParams) -> Result<CallToolResult, McpError> {
    let id = params.id.trim();
    if id.is_empty() {
        return Err(Error::InvalidInput("id cannot be empty".into()).into());
    }

    let known = state.loaded.read().await.catalogue.get(id).is_some();
    let mut favorites = state.favorites.lock().await;
    if !known && !favorites.is_favorite(id) {
        return Err(Error::InvalidInput(format!("unknown analysis id: {id}")).into());
    }

    let favorite = favorites.toggle(id).await?;
    tracing::debug!(id, favorite, "toggled favorite");

    json_result(&FavoritesToggleOutput { id: id.to_string(), favorite, count: favorites.len() })
}

pub async fn clear_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let removed = state.favorites.lock().await.clear().await?;
    json_result(&FavoritesClearOutput { removed })
}
