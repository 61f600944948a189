//! Page-side coordination: registration, update detection and connectivity.
//!
//! An update is a new worker reaching `installed` while an older worker
//! still controls the page. Installed apps apply it silently; browser tabs
//! surface a prompt first.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tubeguide_core::Error;
use tubeguide_core::config::DisplayMode;

use crate::controller::{
    ClientId, Deployment, InboundMessage, MessageTarget, Page, RegisterOutcome, Registration, RegistrationEvent,
    ResponseSource, ServedResponse, VersionTag, WorkerId, WorkerState,
};

/// What the page should do about a detected update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateSignal {
    /// `SKIP_WAITING` was already sent; reload now.
    Reload { version: VersionTag },
    /// Ask the user; call [`UpdateWatcher::accept`] then reload if they agree.
    Prompt { version: VersionTag },
}

/// Registers the controller once per page load and owns the connectivity notifier.
pub struct ClientCoordinator {
    registration: Registration,
    mode: DisplayMode,
    connectivity: ConnectivityNotifier,
}

impl ClientCoordinator {
    pub fn new(registration: Registration, mode: DisplayMode) -> Self {
        Self { registration, mode, connectivity: ConnectivityNotifier::new(Connectivity::Online) }
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    pub fn connectivity(&self) -> &ConnectivityNotifier {
        &self.connectivity
    }

    /// Register `deployment` on behalf of `page` and start watching for updates.
    ///
    /// The watcher subscribes before registering so no lifecycle event of
    /// this registration is missed.
    pub async fn start(&self, page: &Page, deployment: Deployment) -> Result<(RegisterOutcome, UpdateWatcher), Error> {
        let watcher = UpdateWatcher::new(page, self.mode).await?;
        let outcome = self.registration.register(deployment).await?;
        match &outcome {
            RegisterOutcome::Current(worker) => {
                tracing::info!(version = %worker.version, state = %worker.state, "controller already registered")
            }
            RegisterOutcome::Installing(worker) => tracing::info!(version = %worker.version, "controller registered"),
        }
        Ok((outcome, watcher))
    }
}

/// Watches one page's registration for pending updates.
pub struct UpdateWatcher {
    registration: Registration,
    client: ClientId,
    mode: DisplayMode,
    events: broadcast::Receiver<RegistrationEvent>,
    controller: Option<WorkerId>,
    pending: Option<VersionTag>,
}

impl UpdateWatcher {
    pub async fn new(page: &Page, mode: DisplayMode) -> Result<Self, Error> {
        let registration = page.registration().clone();
        let events = registration.subscribe();
        let controller = page.controller().await?.map(|w| w.id);
        Ok(Self { registration, client: page.id(), mode, events, controller, pending: None })
    }

    /// Version of an update detected but not yet applied.
    pub fn pending(&self) -> Option<&VersionTag> {
        self.pending.as_ref()
    }

    /// Wait for the next update. `None` once the controller is gone.
    pub async fn next(&mut self) -> Option<UpdateSignal> {
        loop {
            let event = match self.events.recv().await {
                Ok(event) => event,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "update watcher lagged behind registration events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            };

            match event {
                RegistrationEvent::ControllerChange { worker } => self.controller = Some(worker.id),
                RegistrationEvent::StateChange { worker }
                    if worker.state == WorkerState::Installed
                        && self.controller.is_some_and(|current| current != worker.id) =>
                {
                    tracing::info!(version = %worker.version, mode = ?self.mode, "update available");
                    return Some(match self.mode {
                        DisplayMode::Standalone => {
                            self.skip_waiting();
                            UpdateSignal::Reload { version: worker.version }
                        }
                        DisplayMode::Browser => {
                            self.pending = Some(worker.version.clone());
                            UpdateSignal::Prompt { version: worker.version }
                        }
                    });
                }
                _ => {}
            }
        }
    }

    /// Apply the pending update; the caller reloads afterwards.
    pub fn accept(&mut self) -> Option<VersionTag> {
        let version = self.pending.take()?;
        self.skip_waiting();
        Some(version)
    }

    pub fn dismiss(&mut self) {
        self.pending = None;
    }

    fn skip_waiting(&self) {
        let message = match serde_json::to_string(&InboundMessage::SkipWaiting) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode SKIP_WAITING");
                return;
            }
        };
        if let Err(e) = self.registration.post(self.client, MessageTarget::Waiting, message) {
            tracing::warn!(error = %e, "failed to send SKIP_WAITING");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn label(self) -> &'static str {
        match self {
            Connectivity::Online => "online, data up to date",
            Connectivity::Offline => "offline, local cache active",
        }
    }
}

/// The single online/offline notifier. Subscribers hear about changes only.
#[derive(Clone)]
pub struct ConnectivityNotifier {
    state: Arc<watch::Sender<Connectivity>>,
}

impl ConnectivityNotifier {
    pub fn new(initial: Connectivity) -> Self {
        Self { state: Arc::new(watch::Sender::new(initial)) }
    }

    pub fn current(&self) -> Connectivity {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }

    /// Record the current state; returns true when it changed.
    pub fn set(&self, next: Connectivity) -> bool {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            tracing::info!(state = next.label(), "connectivity changed");
        }
        changed
    }

    /// Infer connectivity from a fetch outcome. Cache hits say nothing.
    pub fn observe(&self, result: &Result<ServedResponse, Error>) {
        match result {
            Ok(served) if matches!(served.source, ResponseSource::Network | ResponseSource::Passthrough) => {
                self.set(Connectivity::Online);
            }
            Ok(served) if served.source == ResponseSource::OfflineFallback => {
                self.set(Connectivity::Offline);
            }
            Err(e) if e.is_network_failure() || matches!(e, Error::Offline(_)) => {
                self.set(Connectivity::Offline);
            }
            _ => {}
        }
    }
}
