//! analysis_search tool implementation.
//!
//! Searches the loaded catalogue and records the query in the search history.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tubeguide_core::Analysis;
use tubeguide_core::catalogue::{Favorites, result_summary};

use super::json_result;
use crate::state::AppState;

/// Parameters for the analysis_search tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisSearchParams {
    /// Free-text query matched against name, mnemonic, analyser, tube and id.
    /// Accents and case are ignored.
    pub query: String,
}

/// One analysis as shown in a result list.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisView {
    pub id: String,
    pub name: String,
    pub mnemonic: Option<String>,
    pub analyser: Option<String>,
    pub code: Option<String>,
    /// Tube name, volume and container.
    pub tube: String,
    pub tube_color: Option<String>,
    pub remarks: Option<String>,
    /// The sample is forwarded to another laboratory.
    pub external_lab: bool,
    pub favorite: bool,
}

impl AnalysisView {
    pub fn new(record: &Analysis, favorites: &Favorites) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            mnemonic: record.mnemonic.clone(),
            analyser: record.analyser.clone(),
            code: record.code.clone(),
            tube: record.tube_summary(),
            tube_color: record.tube_color.clone(),
            remarks: record.remarks.clone(),
            external_lab: record.sends_to_external_lab(),
            favorite: favorites.is_favorite(&record.id),
        }
    }
}

/// Output from the analysis_search tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisSearchOutput {
    pub query: String,
    /// e.g. "3 results found".
    pub summary: String,
    pub results: Vec<AnalysisView>,
}

/// Implementation of the analysis_search tool.
pub async fn search_impl(state: &AppState, params: AnalysisSearchParams) -> Result<CallToolResult, McpError> {
    let results = {
        let loaded = state.loaded.read().await;
        let favorites = state.favorites.lock().await;
        loaded
            .catalogue
            .search(&params.query)
            .into_iter()
            .map(|record| AnalysisView::new(record, &favorites))
            .collect::<Vec<_>>()
    };

    if state.history.record(&params.query).await? {
        tracing::debug!(query = %params.query, "recorded search");
    }

    let output = AnalysisSearchOutput { summary: result_summary(results.len()), query: params.query, results };
    json_result(&output)
}
