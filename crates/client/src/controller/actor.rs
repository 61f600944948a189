//! Controller actor: owns every worker slot and routes typed commands.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::{Method, Url};
use tokio::sync::{broadcast, mpsc, oneshot};
use tubeguide_core::{CacheDb, Error};

use super::lifecycle::{self, WorkerState};
use super::messages::{InboundMessage, OutboundMessage};
use super::strategy::{self, FetchContext};
use super::{
    ClientId, ControllerOptions, Deployment, MessageTarget, RegisterOutcome, RegistrationEvent, RegistrationSnapshot,
    ResponseSource, ServedResponse, VersionTag, WorkerId, WorkerInfo,
};
use crate::fetch::{FetchRequest, Network, is_same_origin};

type FetchReply = oneshot::Sender<Result<ServedResponse, Error>>;

pub(crate) enum Command {
    Register { deployment: Deployment, reply: oneshot::Sender<RegisterOutcome> },
    Connect { outbox: mpsc::UnboundedSender<OutboundMessage>, reply: oneshot::Sender<ClientId> },
    Disconnect { client: ClientId },
    Fetch { client: ClientId, request: FetchRequest, reply: FetchReply },
    Post { client: ClientId, target: MessageTarget, message: String },
    ControllerOf { client: ClientId, reply: oneshot::Sender<Option<WorkerInfo>> },
    Snapshot { reply: oneshot::Sender<RegistrationSnapshot> },
}

/// Results of work the actor spawned.
enum Completion {
    Installed { worker: WorkerId, result: Result<usize, Error> },
    Activated { worker: WorkerId, result: Result<Vec<String>, Error> },
}

struct Worker {
    id: WorkerId,
    version: VersionTag,
    state: WorkerState,
    skip_waiting: bool,
}

impl Worker {
    fn info(&self) -> WorkerInfo {
        WorkerInfo { id: self.id, version: self.version.clone(), state: self.state }
    }
}

struct Client {
    outbox: mpsc::UnboundedSender<OutboundMessage>,
    controller: Option<WorkerId>,
}

pub(crate) struct Actor {
    db: CacheDb,
    network: Arc<dyn Network>,
    options: ControllerOptions,
    offline_url: Url,
    events: broadcast::Sender<RegistrationEvent>,
    installing: Option<Worker>,
    waiting: Option<Worker>,
    active: Option<Worker>,
    clients: HashMap<ClientId, Client>,
    /// Fetches that arrived while the active worker was still activating
    queued: Vec<(FetchRequest, FetchReply)>,
    next_worker: u64,
    next_client: u64,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
}

impl Actor {
    pub(crate) fn new(
        db: CacheDb, network: Arc<dyn Network>, options: ControllerOptions, offline_url: Url,
        events: broadcast::Sender<RegistrationEvent>, resumed: Option<VersionTag>,
    ) -> Self {
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let mut actor = Self {
            db,
            network,
            options,
            offline_url,
            events,
            installing: None,
            waiting: None,
            active: None,
            clients: HashMap::new(),
            queued: Vec::new(),
            next_worker: 0,
            next_client: 0,
            done_tx,
            done_rx,
        };

        if let Some(version) = resumed {
            let id = actor.worker_id();
            tracing::info!(%version, worker = %id, "resuming active version");
            actor.active = Some(Worker { id, version, state: WorkerState::Activated, skip_waiting: false });
        }
        actor
    }

    pub(crate) async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = inbox.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(done) = self.done_rx.recv() => self.complete(done),
            }
        }
        tracing::debug!("controller stopped");
    }

    fn worker_id(&mut self) -> WorkerId {
        self.next_worker += 1;
        WorkerId(self.next_worker)
    }

    fn emit(&self, event: RegistrationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn emit_state(&self, worker: &Worker) {
        tracing::debug!(worker = %worker.id, version = %worker.version, state = %worker.state, "worker state changed");
        self.emit(RegistrationEvent::StateChange { worker: worker.info() });
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Register { deployment, reply } => {
                let _ = reply.send(self.register(deployment));
            }
            Command::Connect { outbox, reply } => {
                self.next_client += 1;
                let id = ClientId(self.next_client);
                let controller = self.active.as_ref().map(|w| w.id);
                self.clients.insert(id, Client { outbox, controller });
                tracing::debug!(client = %id, controller = ?controller, "page connected");
                let _ = reply.send(id);
            }
            Command::Disconnect { client } => {
                self.clients.remove(&client);
                tracing::debug!(client = %client, "page disconnected");
                self.try_promote_waiting();
            }
            Command::Fetch { client, request, reply } => self.fetch(client, request, reply),
            Command::Post { client, target, message } => self.post(client, target, &message),
            Command::ControllerOf { client, reply } => {
                let info = self
                    .clients
                    .get(&client)
                    .and_then(|c| c.controller)
                    .and_then(|id| self.worker(id))
                    .map(Worker::info);
                let _ = reply.send(info);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(RegistrationSnapshot {
                    installing: self.installing.as_ref().map(Worker::info),
                    waiting: self.waiting.as_ref().map(Worker::info),
                    active: self.active.as_ref().map(Worker::info),
                    clients: self.clients.len(),
                });
            }
        }
    }

    fn worker(&self, id: WorkerId) -> Option<&Worker> {
        [&self.active, &self.waiting, &self.installing]
            .into_iter()
            .flatten()
            .find(|w| w.id == id)
    }

    fn worker_mut(&mut self, id: WorkerId) -> Option<&mut Worker> {
        [&mut self.active, &mut self.waiting, &mut self.installing]
            .into_iter()
            .flatten()
            .find(|w| w.id == id)
    }

    fn register(&mut self, deployment: Deployment) -> RegisterOutcome {
        if let Some(existing) = [&self.installing, &self.waiting, &self.active]
            .into_iter()
            .flatten()
            .find(|w| w.version == deployment.version)
        {
            return RegisterOutcome::Current(existing.info());
        }

        if let Some(mut superseded) = self.installing.take() {
            superseded.state = WorkerState::Redundant;
            tracing::info!(worker = %superseded.id, version = %superseded.version, "install superseded");
            self.emit_state(&superseded);
        }

        let worker = Worker {
            id: self.worker_id(),
            version: deployment.version.clone(),
            state: WorkerState::Installing,
            skip_waiting: self.options.skip_waiting_on_install,
        };
        tracing::info!(worker = %worker.id, version = %worker.version, assets = deployment.manifest.len(), "installing");
        self.emit(RegistrationEvent::UpdateFound { worker: worker.info() });
        self.emit_state(&worker);

        let db = self.db.clone();
        let network = Arc::clone(&self.network);
        let origin = self.options.origin.clone();
        let done = self.done_tx.clone();
        let id = worker.id;
        tokio::spawn(async move {
            let result = lifecycle::install(&db, network.as_ref(), &origin, &deployment).await;
            let _ = done.send(Completion::Installed { worker: id, result });
        });

        let info = worker.info();
        self.installing = Some(worker);
        RegisterOutcome::Installing(info)
    }

    fn complete(&mut self, done: Completion) {
        match done {
            Completion::Installed { worker, result } => self.installed(worker, result),
            Completion::Activated { worker, result } => self.activated(worker, result),
        }
    }

    fn installed(&mut self, id: WorkerId, result: Result<usize, Error>) {
        let Some(mut worker) = self.installing.take_if(|w| w.id == id) else {
            tracing::debug!(worker = %id, "ignoring completion of superseded install");
            return;
        };

        match result {
            Ok(_) => {
                worker.state = WorkerState::Installed;
                self.emit_state(&worker);
                if let Some(mut replaced) = self.waiting.replace(worker) {
                    replaced.state = WorkerState::Redundant;
                    self.emit_state(&replaced);
                }
                self.try_promote_waiting();
            }
            Err(err) => {
                tracing::error!(worker = %worker.id, version = %worker.version, error = %err, "install failed");
                worker.state = WorkerState::Redundant;
                self.emit_state(&worker);
                self.emit(RegistrationEvent::InstallFailed { version: worker.version, reason: err.to_string() });
            }
        }
    }

    /// Activate the waiting worker when nothing holds it back.
    fn try_promote_waiting(&mut self) {
        let Some(waiting) = &self.waiting else {
            return;
        };

        let ready = match &self.active {
            None => true,
            Some(active) if active.state == WorkerState::Activating => false,
            Some(active) => waiting.skip_waiting || !self.clients.values().any(|c| c.controller == Some(active.id)),
        };

        if ready && let Some(worker) = self.waiting.take() {
            self.start_activation(worker);
        }
    }

    fn start_activation(&mut self, mut worker: Worker) {
        if let Some(mut previous) = self.active.take() {
            previous.state = WorkerState::Redundant;
            self.emit_state(&previous);
        }

        worker.state = WorkerState::Activating;
        self.emit_state(&worker);

        let db = self.db.clone();
        let version = worker.version.clone();
        let done = self.done_tx.clone();
        let id = worker.id;
        tokio::spawn(async move {
            let result = lifecycle::activate(&db, &version).await;
            let _ = done.send(Completion::Activated { worker: id, result });
        });

        self.active = Some(worker);
    }

    fn activated(&mut self, id: WorkerId, result: Result<Vec<String>, Error>) {
        if let Err(err) = result {
            tracing::error!(worker = %id, error = %err, "activation cleanup failed");
        }

        let Some(worker) = self.active.as_mut().filter(|w| w.id == id && w.state == WorkerState::Activating) else {
            return;
        };
        worker.state = WorkerState::Activated;
        let info = worker.info();
        tracing::info!(worker = %info.id, version = %info.version, "activated");
        self.emit(RegistrationEvent::StateChange { worker: info.clone() });

        let mut claimed = 0;
        for client in self.clients.values_mut() {
            if client.controller != Some(id) {
                client.controller = Some(id);
                claimed += 1;
            }
        }
        if claimed > 0 {
            tracing::info!(worker = %id, pages = claimed, "claimed pages");
            self.emit(RegistrationEvent::ControllerChange { worker: info });
        }

        for (request, reply) in std::mem::take(&mut self.queued) {
            self.intercept(request, reply);
        }

        self.try_promote_waiting();
    }

    fn fetch(&mut self, client: ClientId, request: FetchRequest, reply: FetchReply) {
        let controlled = self.clients.get(&client).and_then(|c| c.controller).is_some();
        let interceptable = request.method == Method::GET && is_same_origin(&self.options.origin, &request.url);

        if !controlled || !interceptable {
            self.passthrough(request, reply);
            return;
        }

        match self.active.as_ref().map(|w| w.state) {
            Some(WorkerState::Activating) => self.queued.push((request, reply)),
            Some(_) => self.intercept(request, reply),
            None => self.passthrough(request, reply),
        }
    }

    fn intercept(&mut self, request: FetchRequest, reply: FetchReply) {
        let Some(active) = &self.active else {
            self.passthrough(request, reply);
            return;
        };

        let ctx = FetchContext {
            db: self.db.clone(),
            network: Arc::clone(&self.network),
            version: active.version.clone(),
            offline_url: self.offline_url.clone(),
        };
        tokio::spawn(async move {
            let _ = reply.send(strategy::stale_while_revalidate(ctx, request).await);
        });
    }

    fn passthrough(&self, request: FetchRequest, reply: FetchReply) {
        let network = Arc::clone(&self.network);
        tokio::spawn(async move {
            let result = network
                .fetch(&request)
                .await
                .map(|response| ServedResponse { response, source: ResponseSource::Passthrough });
            let _ = reply.send(result);
        });
    }

    fn post(&mut self, client: ClientId, target: MessageTarget, raw: &str) {
        let Some(message) = InboundMessage::parse(raw) else {
            tracing::debug!(client = %client, "ignoring malformed message");
            return;
        };

        let recipient = match target {
            MessageTarget::Controller => self.clients.get(&client).and_then(|c| c.controller),
            MessageTarget::Waiting => self.waiting.as_ref().or(self.installing.as_ref()).map(|w| w.id),
        };
        let Some(recipient) = recipient else {
            tracing::debug!(client = %client, ?target, ?message, "no worker to receive message");
            return;
        };

        match message {
            InboundMessage::SkipWaiting => self.skip_waiting(recipient),
            InboundMessage::ClearCaches => self.clear_caches(client),
            InboundMessage::GetVersion => self.broadcast_version(recipient),
            InboundMessage::Unknown => tracing::debug!(client = %client, "ignoring unknown message type"),
        }
    }

    fn skip_waiting(&mut self, id: WorkerId) {
        let Some(worker) = self.worker_mut(id) else {
            return;
        };
        worker.skip_waiting = true;

        if self.waiting.as_ref().is_some_and(|w| w.id == id) {
            self.try_promote_waiting();
        }
    }

    fn clear_caches(&self, client: ClientId) {
        let Some(outbox) = self.clients.get(&client).map(|c| c.outbox.clone()) else {
            return;
        };

        let db = self.db.clone();
        tokio::spawn(async move {
            match db.delete_all_generations().await {
                Ok(deleted) => tracing::info!(deleted, "cleared every cache generation"),
                Err(e) => tracing::warn!(error = %e, "failed to clear caches"),
            }
            let _ = outbox.send(OutboundMessage::CacheCleared);
        });
    }

    fn broadcast_version(&self, id: WorkerId) {
        let Some(worker) = self.worker(id) else {
            return;
        };

        let message = OutboundMessage::Version { version: worker.version.to_string() };
        for client in self.clients.values().filter(|c| c.controller == Some(id)) {
            let _ = client.outbox.send(message.clone());
        }
    }
}
