//! Shared state behind the tool handlers: one connected page and its data.

use std::sync::{Arc, Weak};

use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use tubeguide_client::{
    ClientCoordinator, ControllerOptions, Deployment, LoadedCatalogue, Network, Page, RegisterOutcome, Registration,
    UpdateSignal, UpdateWatcher, VersionTag, load_catalogue,
};
use tubeguide_core::catalogue::{Favorites, SearchHistory};
use tubeguide_core::{AppConfig, CacheDb, Error};

/// Reply channel for an accepted update.
type AcceptReply = oneshot::Sender<Option<VersionTag>>;

pub struct AppState {
    pub config: AppConfig,
    pub db: CacheDb,
    pub registration: Registration,
    pub coordinator: ClientCoordinator,
    pub history: SearchHistory,
    pub page: RwLock<Page>,
    pub loaded: RwLock<LoadedCatalogue>,
    pub favorites: Mutex<Favorites>,
    /// Update announced to a browser-mode page and not yet accepted
    pub pending_update: Mutex<Option<VersionTag>>,
    accept: mpsc::UnboundedSender<AcceptReply>,
}

impl AppState {
    /// Boot the page: spawn the controller, register the deployment, load the dataset.
    pub async fn start(config: AppConfig, db: CacheDb, network: Arc<dyn Network>) -> Result<Arc<Self>, Error> {
        let options = ControllerOptions::from_config(&config)?;
        let registration = Registration::spawn(db.clone(), network, options).await?;
        let coordinator = ClientCoordinator::new(registration.clone(), config.display_mode);

        let page = registration.connect().await?;
        let (outcome, watcher) = coordinator.start(&page, Deployment::from_config(&config)).await?;
        if let RegisterOutcome::Installing(worker) = &outcome {
            tracing::info!(version = %worker.version, "installing deployment");
        }

        let loaded = load_catalogue(&page, &db, &config.dataset_path).await;
        tracing::info!(status = loaded.source.status_message(), records = loaded.catalogue.len(), "page ready");

        let favorites = Favorites::load(db.clone()).await?;
        let history = SearchHistory::new(db.clone(), config.history_max, config.history_ttl_days);
        let (accept, requests) = mpsc::unbounded_channel();

        let state = Arc::new(Self {
            config,
            db,
            registration,
            coordinator,
            history,
            page: RwLock::new(page),
            loaded: RwLock::new(loaded),
            favorites: Mutex::new(favorites),
            pending_update: Mutex::new(None),
            accept,
        });

        tokio::spawn(watch_updates(Arc::downgrade(&state), watcher, requests));
        Ok(state)
    }

    /// Replace the page with a freshly connected one and reload the dataset.
    pub async fn reload(&self) -> Result<(), Error> {
        let page = self.registration.connect().await?;
        let loaded = load_catalogue(&page, &self.db, &self.config.dataset_path).await;
        tracing::info!(page = %page.id(), status = loaded.source.status_message(), "page reloaded");

        *self.loaded.write().await = loaded;
        *self.page.write().await = page;
        Ok(())
    }

    /// Accept the pending update, if any, and reload. Returns the applied version.
    pub async fn apply_update(&self) -> Result<Option<VersionTag>, Error> {
        let (reply, response) = oneshot::channel();
        self.accept.send(reply).map_err(|_| Error::ControllerGone)?;
        let accepted = response.await.map_err(|_| Error::ControllerGone)?;

        if accepted.is_some() {
            self.pending_update.lock().await.take();
            self.reload().await?;
        }
        Ok(accepted)
    }
}

async fn watch_updates(
    state: Weak<AppState>, mut watcher: UpdateWatcher, mut requests: mpsc::UnboundedReceiver<AcceptReply>,
) {
    loop {
        tokio::select! {
            signal = watcher.next() => {
                let Some(signal) = signal else { break };
                let Some(state) = state.upgrade() else { break };
                match signal {
                    UpdateSignal::Reload { version } => {
                        tracing::info!(%version, "applying update silently");
                        if let Err(e) = state.reload().await {
                            tracing::warn!(error = %e, "reload after update failed");
                        }
                    }
                    UpdateSignal::Prompt { version } => {
                        tracing::info!(%version, "new version available; call update_apply to reload");
                        *state.pending_update.lock().await = Some(version);
                    }
                }
            }
            request = requests.recv() => match request {
                Some(reply) => {
                    let _ = reply.send(watcher.accept());
                }
                None => break,
            },
        }
    }
    tracing::debug!("update watcher stopped");
}
