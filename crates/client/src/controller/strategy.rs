//! Stale-while-revalidate fetch handling for controlled pages.

use std::sync::Arc;

use reqwest::{StatusCode, Url};
use tubeguide_core::{CacheDb, Error};

use super::{ResponseSource, ServedResponse, VersionTag};
use crate::fetch::{FetchRequest, FetchResponse, Network};

/// What a fetch task needs from the worker that spawned it.
#[derive(Clone)]
pub(crate) struct FetchContext {
    pub db: CacheDb,
    pub network: Arc<dyn Network>,
    pub version: VersionTag,
    pub offline_url: Url,
}

/// Answer from the current generation when possible, refresh it in the background.
///
/// The network fetch starts before the cache lookup. A hit is returned without
/// waiting for it. A miss waits for the network, and a failed navigation falls
/// back to the cached offline document.
pub(crate) async fn stale_while_revalidate(ctx: FetchContext, request: FetchRequest) -> Result<ServedResponse, Error> {
    let refresh = tokio::spawn(revalidate(ctx.clone(), request.clone()));

    match lookup(&ctx, &request).await {
        Some(response) => {
            tracing::debug!(url = %request.url, version = %ctx.version, "cache hit");
            return Ok(ServedResponse { response, source: ResponseSource::Cache });
        }
        None => tracing::debug!(url = %request.url, version = %ctx.version, "cache miss"),
    }

    let outcome = refresh
        .await
        .unwrap_or_else(|e| Err(Error::NetworkUnavailable(format!("fetch task failed: {e}"))));

    match outcome {
        Ok(response) => Ok(ServedResponse { response, source: ResponseSource::Network }),
        Err(err) if request.is_navigation() => {
            let fallback = FetchRequest::get(ctx.offline_url.clone());
            match lookup(&ctx, &fallback).await {
                Some(response) => {
                    tracing::info!(url = %request.url, error = %err, "serving offline document");
                    Ok(ServedResponse { response, source: ResponseSource::OfflineFallback })
                }
                None => Err(Error::Offline(format!("{}: {err}; no offline document cached", request.url))),
            }
        }
        Err(err) => Err(Error::Offline(format!("{}: {err}", request.url))),
    }
}

/// Fetch from the network and store a 200 response into the current generation.
async fn revalidate(ctx: FetchContext, request: FetchRequest) -> Result<FetchResponse, Error> {
    let response = ctx.network.fetch(&request).await?;

    if response.status == StatusCode::OK {
        let stored = response.to_stored(&request.method);
        match ctx.db.put_if_current(ctx.version.as_str(), &stored).await {
            Ok(true) => tracing::debug!(url = %request.url, version = %ctx.version, "cache refreshed"),
            Ok(false) => {
                tracing::debug!(url = %request.url, version = %ctx.version, "discarded refresh for superseded version")
            }
            Err(e) => tracing::warn!(url = %request.url, error = %e, "failed to store refreshed response"),
        }
    }

    Ok(response)
}

async fn lookup(ctx: &FetchContext, request: &FetchRequest) -> Option<FetchResponse> {
    let stored = match ctx
        .db
        .match_entry(ctx.version.as_str(), request.method.as_str(), request.url.as_str())
        .await
    {
        Ok(stored) => stored?,
        Err(e) => {
            tracing::warn!(url = %request.url, error = %e, "cache lookup failed");
            return None;
        }
    };

    match FetchResponse::from_stored(&stored) {
        Ok(response) => Some(response),
        Err(e) => {
            tracing::warn!(url = %request.url, error = %e, "ignoring unreadable cache entry");
            None
        }
    }
}
