//! Cache control tools: version query and full clear, via control messages.

use std::time::Duration;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tubeguide_client::controller::{InboundMessage, OutboundMessage};
use tubeguide_client::{MessageTarget, Page};
use tubeguide_core::Error;

use super::json_result;
use crate::state::AppState;

/// How long to wait for the controller to answer a control message.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheVersionOutput {
    /// Version tag of the worker controlling the page.
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheClearOutput {
    pub cleared: bool,
    /// Generations left after the clear.
    pub generations: Vec<String>,
}

/// Send `message` to the page's controller and wait for the first reply matching `want`.
///
/// Replies to earlier, abandoned requests are skipped.
async fn round_trip<T>(
    page: &mut Page, message: InboundMessage, want: impl Fn(OutboundMessage) -> Option<T>,
) -> Result<T, Error> {
    if page.controller().await?.is_none() {
        return Err(Error::NoController("page is not controlled yet".into()));
    }

    page.post_message(MessageTarget::Controller, &message)?;
    let deadline = tokio::time::Instant::now() + REPLY_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let reply = page.recv_timeout(remaining).await?;
        if let Some(value) = want(reply) {
            return Ok(value);
        }
    }
}

pub async fn version_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let mut page = state.page.write().await;
    let version = round_trip(&mut page, InboundMessage::GetVersion, |reply| match reply {
        OutboundMessage::Version { version } => Some(version),
        _ => None,
    })
    .await?;

    json_result(&CacheVersionOutput { version })
}

pub async fn clear_impl(state: &AppState) -> Result<CallToolResult, McpError> {
    let mut page = state.page.write().await;
    round_trip(&mut page, InboundMessage::ClearCaches, |reply| match reply {
        OutboundMessage::CacheCleared => Some(()),
        _ => None,
    })
    .await?;

    let generations = state.db.list_generations().await?;
    json_result(&CacheClearOutput { cleared: true, generations })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::fixtures::state;
    use crate::tools::parse_output;

    #[tokio::test]
    async fn test_version_round_trip() {
        let (state, _network) = state().await;
        let output: CacheVersionOutput = parse_output(&version_impl(&state).await.unwrap());
        assert_eq!(output.version, "v1");
    }

    #[tokio::test]
    async fn test_clear_twice_leaves_no_generations() {
        let (state, _network) = state().await;
        for _ in 0..2 {
            let output: CacheClearOutput = parse_output(&clear_impl(&state).await.unwrap());
            assert!(output.cleared);
            assert!(output.generations.is_empty());
        }
    }
}
