//! Search history tools.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tubeguide_core::Error;
use tubeguide_core::catalogue::HistoryEntry;

use super::json_result;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HistoryListOutput {
    /// Newest first.
    pub entries: Vec<HistoryEntry>,
}

/// Parameters for the history_remove tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HistoryRemoveParams {
    /// Position in the list returned by history_list.
    pub index: usize,
}

pub async fn list_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let entries = state.history.entries().await?;
    json_result(&HistoryListOutput { entries })
}

pub async fn remove_impl(state: &AppState, params: HistoryRemoveParams) -> Result<CallToolResult, McpError> {
    if !state.history.remove(params.index).await? {
        return Err(Error::InvalidInput(format!("no history entry at index {}", params.index)).into());
    }
    list_impl(state).await
}

pub async fn clear_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    state.history.clear().await?;
    json_result(&HistoryListOutput { entries: Vec::new() })
}
