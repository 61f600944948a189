//! Worker lifecycle: states plus the install and activate steps.

use std::fmt;

use futures_util::future::try_join_all;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tubeguide_core::{CacheDb, Error};

use super::{Deployment, VersionTag};
use crate::fetch::{FetchRequest, Network, resolve};

/// Worker lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Manifest assets are being fetched
    Installing,
    /// Installed; waiting for the previous worker to let go of its pages
    Installed,
    /// Stale generations are being deleted
    Activating,
    /// Serving fetches and answering messages
    Activated,
    /// Replaced, failed to install, or otherwise finished
    Redundant,
}

impl WorkerState {
    /// Check if this state allows fetch interception.
    pub fn can_intercept_fetch(self) -> bool {
        matches!(self, WorkerState::Activated)
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

/// Fetch every manifest asset and store them as generation `deployment.version`.
///
/// All fetches run concurrently. Any transport failure or non-success status
/// fails the whole install and nothing is written.
pub(crate) async fn install(
    db: &CacheDb, network: &dyn Network, origin: &Url, deployment: &Deployment,
) -> Result<usize, Error> {
    let failed = |reason: String| Error::InstallFailed { version: deployment.version.to_string(), reason };

    let requests = deployment
        .manifest
        .iter()
        .map(|path| {
            resolve(origin, path)
                .map(|url| (path.as_str(), FetchRequest::get(url)))
                .map_err(|e| failed(format!("{path}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let fetches = requests.iter().map(|(path, request)| async move {
        let response = network.fetch(request).await.map_err(|e| failed(format!("{path}: {e}")))?;
        if !response.status.is_success() {
            return Err(failed(format!("{path}: status {}", response.status.as_u16())));
        }
        Ok(response.to_stored(&request.method))
    });

    let entries = try_join_all(fetches).await?;
    let count = entries.len();

    db.install_generation(deployment.version.as_str(), entries).await?;

    tracing::info!(version = %deployment.version, assets = count, "installed cache generation");
    Ok(count)
}

/// Make `version` the current generation and delete every other one.
///
/// The tag is recorded before deleting, so refreshes still in flight for an
/// older worker are discarded rather than recreating its generation.
pub(crate) async fn activate(db: &CacheDb, version: &VersionTag) -> Result<Vec<String>, Error> {
    db.set_active_version(version.as_str()).await?;
    let deleted = db.delete_generations_except(version.as_str()).await?;

    tracing::info!(version = %version, deleted = ?deleted, "activated cache generation");
    Ok(deleted)
}
