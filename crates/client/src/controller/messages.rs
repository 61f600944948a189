//! Control-message protocol between pages and the controller.
//!
//! Messages are JSON objects discriminated by `type`:
//!
//! - page → controller: `SKIP_WAITING`, `CLEAR_CACHES`, `GET_VERSION`
//! - controller → page: `VERSION { version }`, `CACHE_CLEARED`

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundMessage {
    /// Promote a waiting worker to active without waiting for pages to close.
    SkipWaiting,
    /// Delete every cache generation, including the current one.
    ClearCaches,
    /// Ask for the receiving worker's version tag.
    GetVersion,
    /// Any other `type`; ignored.
    #[serde(other)]
    Unknown,
}

impl InboundMessage {
    /// Parse a raw message. Anything that isn't a `{type}` object is `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    Version { version: String },
    CacheCleared,
}
