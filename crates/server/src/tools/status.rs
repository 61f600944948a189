//! app_status and update_apply tools.

use chrono::Utc;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tubeguide_client::{DataSource, RegistrationSnapshot, WorkerInfo};
use tubeguide_core::config::DisplayMode;

use super::json_result;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppStatusOutput {
    /// ISO8601 timestamp of this report.
    pub checked_at: String,
    pub display_mode: DisplayMode,
    pub registration: RegistrationSnapshot,
    /// Worker controlling the current page, if any.
    pub controller: Option<WorkerInfo>,
    pub data_source: DataSource,
    pub data_status: String,
    pub records: usize,
    pub favorites: usize,
    pub connectivity: String,
    /// Version waiting for update_apply.
    pub pending_update: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpdateApplyOutput {
    pub applied: bool,
    pub version: Option<String>,
}

pub async fn status_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let registration = state.registration.snapshot().await?;
    let controller = state.page.read().await.controller().await?;
    let (data_source, records) = {
        let loaded = state.loaded.read().await;
        (loaded.source, loaded.catalogue.len())
    };

    let output = AppStatusOutput {
        checked_at: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        display_mode: state.coordinator.mode(),
        registration,
        controller,
        data_source,
        data_status: data_source.status_message().to_string(),
        records,
        favorites: state.favorites.lock().await.len(),
        connectivity: state.coordinator.connectivity().current().label().to_string(),
        pending_update: state.pending_update.lock().await.as_ref().map(|v| v.to_string()),
    };
    json_result(&output)
}

/// Accept a pending update: skip waiting, then reload the page and its data.
pub async fn apply_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let version = state.apply_update().await?;
    json_result(&UpdateApplyOutput { applied: version.is_some(), version: version.map(|v| v.to_string()) })
}
