//! The cache controller: a versioned asset cache that intercepts page fetches.
//!
//! The controller runs as an actor task. [`Registration`] is the handle used
//! to register deployments, connect pages and observe lifecycle events, while
//! [`Page`] is one connected document that issues fetches and control
//! messages.
//!
//! ### Lifecycle
//! `installing → installed → activating → activated → redundant`
//!
//! A registered deployment installs by caching its whole manifest into a
//! generation named after its version tag. Once activated, every other
//! generation is deleted and every connected page is claimed.

mod actor;
pub mod lifecycle;
pub mod messages;
mod strategy;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use tokio::sync::{broadcast, mpsc, oneshot};
use tubeguide_core::{AppConfig, CacheDb, Error};

pub use lifecycle::WorkerState;
pub use messages::{InboundMessage, OutboundMessage};

use self::actor::{Actor, Command};
use crate::fetch::{FetchRequest, FetchResponse, Network, resolve};

/// Opaque deployment version; two tags are the same version only if equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTag(String);

impl VersionTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VersionTag {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for VersionTag {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A deployed version of the page: its tag plus the assets it needs offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub version: VersionTag,
    /// Relative URLs resolved against the origin
    pub manifest: Vec<String>,
}

impl Deployment {
    pub fn new(version: impl Into<VersionTag>, manifest: Vec<String>) -> Self {
        Self { version: version.into(), manifest }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.version_tag.as_str(), config.manifest.clone())
    }
}

/// Settings fixed for the lifetime of a controller.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub origin: Url,
    pub offline_path: String,
    pub skip_waiting_on_install: bool,
}

impl ControllerOptions {
    pub fn new(origin: Url) -> Self {
        Self { origin, offline_path: "./offline.html".into(), skip_waiting_on_install: true }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidInput(e.to_string()))?;
        Ok(Self {
            origin,
            offline_path: config.offline_path.clone(),
            skip_waiting_on_install: config.skip_waiting_on_install,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub(crate) u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub(crate) u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.0)
    }
}

/// Public view of one controller instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub version: VersionTag,
    pub state: WorkerState,
}

/// Which workers currently fill each registration slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationSnapshot {
    pub installing: Option<WorkerInfo>,
    pub waiting: Option<WorkerInfo>,
    pub active: Option<WorkerInfo>,
    /// Number of connected pages
    pub clients: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// A new worker started installing.
    UpdateFound { worker: WorkerInfo },
    /// A worker moved to another lifecycle state.
    StateChange { worker: WorkerInfo },
    /// Connected pages are now controlled by `worker`.
    ControllerChange { worker: WorkerInfo },
    /// An install attempt failed; the previous generation keeps serving.
    InstallFailed { version: VersionTag, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// A worker for this version already exists.
    Current(WorkerInfo),
    /// A new worker is installing this version.
    Installing(WorkerInfo),
}

impl RegisterOutcome {
    pub fn worker(&self) -> &WorkerInfo {
        match self {
            RegisterOutcome::Current(worker) | RegisterOutcome::Installing(worker) => worker,
        }
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// The current generation, possibly stale
    Cache,
    /// A network response fetched for a cache miss
    Network,
    /// The cached offline document, for a failed navigation
    OfflineFallback,
    /// Not intercepted: uncontrolled page, cross-origin or non-GET
    Passthrough,
}

#[derive(Debug, Clone)]
pub struct ServedResponse {
    pub response: FetchResponse,
    pub source: ResponseSource,
}

/// Recipient of a control message posted by a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget {
    /// The worker controlling the sending page
    Controller,
    /// The installed worker waiting to activate, or the one still installing
    Waiting,
}

/// Handle to a running controller. Clones share the same actor.
#[derive(Clone)]
pub struct Registration {
    commands: mpsc::UnboundedSender<Command>,
    events: broadcast::Sender<RegistrationEvent>,
    origin: Url,
}

impl Registration {
    /// Start the controller actor.
    ///
    /// A version recorded as current by an earlier run resumes as the active
    /// worker, so pages connected before any registration are still served
    /// from its generation.
    pub async fn spawn(db: CacheDb, network: Arc<dyn Network>, options: ControllerOptions) -> Result<Self, Error> {
        let offline_url = resolve(&options.origin, &options.offline_path)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", options.offline_path)))?;

        let resumed = match db.active_version().await? {
            Some(version) if db.has_generation(&version).await? => Some(VersionTag::from(version)),
            _ => None,
        };

        let (commands, inbox) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(64);
        let origin = options.origin.clone();

        let actor = Actor::new(db, network, options, offline_url, events.clone(), resumed);
        tokio::spawn(actor.run(inbox));

        Ok(Self { commands, events, origin })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Receive lifecycle events from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.events.subscribe()
    }

    /// Register a deployment; installs it unless a worker for its version exists.
    pub async fn register(&self, deployment: Deployment) -> Result<RegisterOutcome, Error> {
        self.request(|reply| Command::Register { deployment, reply }).await
    }

    /// Connect a new page. It is controlled by the active worker, if any.
    pub async fn connect(&self) -> Result<Page, Error> {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let id = self.request(|reply| Command::Connect { outbox, reply }).await?;
        Ok(Page { id, registration: self.clone(), inbox })
    }

    pub async fn snapshot(&self) -> Result<RegistrationSnapshot, Error> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Wait until some worker is activated and return it.
    pub async fn ready(&self) -> Result<WorkerInfo, Error> {
        let mut events = self.subscribe();
        if let Some(active) = self.snapshot().await?.active
            && active.state == WorkerState::Activated
        {
            return Ok(active);
        }

        loop {
            match events.recv().await {
                Ok(RegistrationEvent::StateChange { worker }) if worker.state == WorkerState::Activated => {
                    return Ok(worker);
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "registration events lagged while waiting for activation");
                    if let Some(active) = self.snapshot().await?.active
                        && active.state == WorkerState::Activated
                    {
                        return Ok(active);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return Err(Error::ControllerGone),
            }
        }
    }

    pub(crate) fn post(&self, client: ClientId, target: MessageTarget, message: String) -> Result<(), Error> {
        self.send(Command::Post { client, target, message })
    }

    fn send(&self, command: Command) -> Result<(), Error> {
        self.commands.send(command).map_err(|_| Error::ControllerGone)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, Error> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply))?;
        response.await.map_err(|_| Error::ControllerGone)
    }
}

/// A connected document. Dropping it disconnects the page.
pub struct Page {
    id: ClientId,
    registration: Registration,
    inbox: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Page {
    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn registration(&self) -> &Registration {
        &self.registration
    }

    /// Issue a request; intercepted when this page has an activated controller.
    pub async fn fetch(&self, request: FetchRequest) -> Result<ServedResponse, Error> {
        self.registration
            .request(|reply| Command::Fetch { client: self.id, request, reply })
            .await?
    }

    /// Fetch a subresource by path relative to the origin.
    pub async fn get(&self, path: &str) -> Result<ServedResponse, Error> {
        let url = self.resolve(path)?;
        self.fetch(FetchRequest::get(url)).await
    }

    /// Navigate to a document by path relative to the origin.
    pub async fn navigate(&self, path: &str) -> Result<ServedResponse, Error> {
        let url = self.resolve(path)?;
        self.fetch(FetchRequest::navigate(url)).await
    }

    fn resolve(&self, path: &str) -> Result<Url, Error> {
        resolve(self.registration.origin(), path).map_err(|e| Error::InvalidUrl(format!("{path}: {e}")))
    }

    /// The worker controlling this page.
    pub async fn controller(&self) -> Result<Option<WorkerInfo>, Error> {
        self.registration
            .request(|reply| Command::ControllerOf { client: self.id, reply })
            .await
    }

    /// Post a raw control message. Unparseable messages are ignored by the worker.
    pub fn post(&self, target: MessageTarget, message: impl Into<String>) -> Result<(), Error> {
        self.registration.post(self.id, target, message.into())
    }

    pub fn post_message(&self, target: MessageTarget, message: &InboundMessage) -> Result<(), Error> {
        let raw = serde_json::to_string(message).map_err(|e| Error::InvalidInput(e.to_string()))?;
        self.post(target, raw)
    }

    /// Next message a worker sent to this page.
    pub async fn recv(&mut self) -> Option<OutboundMessage> {
        self.inbox.recv().await
    }

    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<OutboundMessage, Error> {
        match tokio::time::timeout(timeout, self.inbox.recv()).await {
            Ok(Some(message)) => Ok(message),
            Ok(None) => Err(Error::ControllerGone),
            Err(_) => Err(Error::ReplyTimeout(format!("no message for {} within {timeout:?}", self.id))),
        }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        let _ = self.registration.send(Command::Disconnect { client: self.id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::MemoryNetwork;
    use tubeguide_core::StoredResponse;

    const ORIGIN: &str = "http://app.test/";
    const MANIFEST: &[&str] = &["./", "./index.html", "./app.js", "./data.json", "./offline.html"];
    const WAIT: Duration = Duration::from_secs(5);

    fn site(network: &MemoryNetwork, marker: &str) {
        network.serve("http://app.test/", format!("<html>{marker}</html>"));
        network.serve("http://app.test/index.html", format!("<html>{marker}</html>"));
        network.serve("http://app.test/app.js", format!("// {marker}"));
        network.serve("http://app.test/data.json", format!("[{{\"Analyse_id\":\"{marker}\"}}]"));
        network.serve("http://app.test/offline.html", "offline");
    }

    fn deployment(version: &str) -> Deployment {
        Deployment::new(version, MANIFEST.iter().map(|p| p.to_string()).collect())
    }

    fn options() -> ControllerOptions {
        ControllerOptions::new(Url::parse(ORIGIN).unwrap())
    }

    async fn start(network: &MemoryNetwork, options: ControllerOptions) -> (CacheDb, Registration) {
        let db = CacheDb::open_in_memory().await.unwrap();
        let registration = Registration::spawn(db.clone(), Arc::new(network.clone()), options).await.unwrap();
        (db, registration)
    }

    async fn activated(registration: &Registration, version: &str) -> WorkerInfo {
        let mut events = registration.subscribe();
        let snapshot = registration.snapshot().await.unwrap();
        if let Some(active) = snapshot.active
            && active.version.as_str() == version
            && active.state == WorkerState::Activated
        {
            return active;
        }
        tokio::time::timeout(WAIT, async {
            loop {
                if let Ok(RegistrationEvent::StateChange { worker }) = events.recv().await
                    && worker.version.as_str() == version
                    && worker.state == WorkerState::Activated
                {
                    return worker;
                }
            }
        })
        .await
        .expect("worker never activated")
    }

    async fn wait_for_body(db: &CacheDb, version: &str, url: &str, expected: &str) {
        for _ in 0..100 {
            if let Some(entry) = db.match_entry(version, "GET", url).await.unwrap()
                && entry.body_text() == expected
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cache never reflected {expected:?} for {url}");
    }

    #[tokio::test]
    async fn test_install_caches_manifest() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        let (db, registration) = start(&network, options()).await;

        let outcome = registration.register(deployment("v1")).await.unwrap();
        assert!(matches!(outcome, RegisterOutcome::Installing(_)));
        activated(&registration, "v1").await;

        let origin = Url::parse(ORIGIN).unwrap();
        for path in MANIFEST {
            let url = resolve(&origin, path).unwrap();
            assert!(db.match_entry("v1", "GET", url.as_str()).await.unwrap().is_some(), "missing {path}");
        }
    }

    #[tokio::test]
    async fn test_register_same_version_is_current() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        let (_db, registration) = start(&network, options()).await;

        registration.register(deployment("v1")).await.unwrap();
        activated(&registration, "v1").await;

        let again = registration.register(deployment("v1")).await.unwrap();
        assert!(matches!(again, RegisterOutcome::Current(ref w) if w.state == WorkerState::Activated));
    }

    #[tokio::test]
    async fn test_failed_install_keeps_previous_generation() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        let (db, registration) = start(&network, options()).await;
        registration.register(deployment("v1")).await.unwrap();
        activated(&registration, "v1").await;

        let mut events = registration.subscribe();
        network.remove("http://app.test/app.js");
        registration.register(deployment("v2")).await.unwrap();

        let failure = tokio::time::timeout(WAIT, async {
            loop {
                if let Ok(RegistrationEvent::InstallFailed { version, reason }) = events.recv().await {
                    return (version, reason);
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(failure.0.as_str(), "v2");
        assert!(failure.1.contains("app.js"));

        let snapshot = registration.snapshot().await.unwrap();
        assert_eq!(snapshot.active.map(|w| w.version), Some(VersionTag::from("v1")));
        assert!(snapshot.installing.is_none());
        assert!(snapshot.waiting.is_none());
        assert_eq!(db.list_generations().await.unwrap(), vec!["v1".to_string()]);
    }

    #[tokio::test]
    async fn test_activation_deletes_other_generations() {
        let network = MemoryNetwork::new();
        site(&network, "v2");
        let (db, registration) = start(&network, options()).await;
        for name in ["v0", "v1"] {
            db.put_entry(name, &StoredResponse::new("GET", "http://app.test/", 200, Vec::new(), Vec::new()))
                .await
                .unwrap();
        }

        registration.register(deployment("v2")).await.unwrap();
        activated(&registration, "v2").await;

        assert_eq!(db.list_generations().await.unwrap(), vec!["v2".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_caches_twice() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        let (db, registration) = start(&network, options()).await;
        registration.register(deployment("v1")).await.unwrap();
        activated(&registration, "v1").await;

        let mut page = registration.connect().await.unwrap();
        for _ in 0..2 {
            page.post_message(MessageTarget::Controller, &InboundMessage::ClearCaches).unwrap();
            assert_eq!(page.recv_timeout(WAIT).await.unwrap(), OutboundMessage::CacheCleared);
        }
        assert!(db.list_generations().await.unwrap().is_empty());
        assert!(page.recv_timeout(Duration::from_millis(100)).await.is_err());
    }

    #[tokio::test]
    async fn test_get_version_broadcasts_to_controlled_pages() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        let (_db, registration) = start(&network, options()).await;
        registration.register(deployment("v1")).await.unwrap();
        activated(&registration, "v1").await;

        let mut first = registration.connect().await.unwrap();
        let mut second = registration.connect().await.unwrap();
        first.post(MessageTarget::Controller, r#"{"type":"GET_VERSION"}"#).unwrap();

        let expected = OutboundMessage::Version { version: "v1".into() };
        assert_eq!(first.recv_timeout(WAIT).await.unwrap(), expected);
        assert_eq!(second.recv_timeout(WAIT).await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_messages_are_ignored() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        let (_db, registration) = start(&network, options()).await;
        registration.register(deployment("v1")).await.unwrap();
        activated(&registration, "v1").await;

        let mut page = registration.connect().await.unwrap();
        page.post(MessageTarget::Controller, r#"{"type":"PING"}"#).unwrap();
        page.post(MessageTarget::Controller, "{not json").unwrap();
        page.post(MessageTarget::Controller, r#"{"type":"GET_VERSION"}"#).unwrap();

        assert_eq!(page.recv_timeout(WAIT).await.unwrap(), OutboundMessage::Version { version: "v1".into() });
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_through_page() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        let (db, registration) = start(&network, options()).await;
        registration.register(deployment("v1")).await.unwrap();
        activated(&registration, "v1").await;
        let page = registration.connect().await.unwrap();

        network.serve("http://app.test/data.json", "B");
        let first = page.get("./data.json").await.unwrap();
        assert_eq!(first.source, ResponseSource::Cache);
        assert_eq!(first.response.text(), "[{\"Analyse_id\":\"v1\"}]");

        wait_for_body(&db, "v1", "http://app.test/data.json", "B").await;
        assert_eq!(page.get("./data.json").await.unwrap().response.text(), "B");
    }

    #[tokio::test]
    async fn test_offline_navigation_and_subresource() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        let (_db, registration) = start(&network, options()).await;
        registration.register(deployment("v1")).await.unwrap();
        activated(&registration, "v1").await;
        let page = registration.connect().await.unwrap();

        network.set_offline(true);
        let served = page.navigate("./never-cached.html").await.unwrap();
        assert_eq!(served.source, ResponseSource::OfflineFallback);
        assert_eq!(served.response.text(), "offline");

        assert!(matches!(page.get("./never-cached.png").await, Err(Error::Offline(_))));
    }

    #[tokio::test]
    async fn test_uncontrolled_and_cross_origin_requests_pass_through() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        network.serve("http://cdn.test/lib.js", "lib");
        let (db, registration) = start(&network, options()).await;

        let early = registration.connect().await.unwrap();
        let served = early.get("./app.js").await.unwrap();
        assert_eq!(served.source, ResponseSource::Passthrough);

        registration.register(deployment("v1")).await.unwrap();
        activated(&registration, "v1").await;

        let cross = early.get("http://cdn.test/lib.js").await.unwrap();
        assert_eq!(cross.source, ResponseSource::Passthrough);
        assert!(db.match_entry("v1", "GET", "http://cdn.test/lib.js").await.unwrap().is_none());

        let head = FetchRequest { method: reqwest::Method::HEAD, ..FetchRequest::get(Url::parse(ORIGIN).unwrap()) };
        assert_eq!(early.fetch(head).await.unwrap().source, ResponseSource::Passthrough);
    }

    #[tokio::test]
    async fn test_activation_claims_connected_pages() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        let (_db, registration) = start(&network, options()).await;
        let page = registration.connect().await.unwrap();
        assert!(page.controller().await.unwrap().is_none());

        registration.register(deployment("v1")).await.unwrap();
        let worker = activated(&registration, "v1").await;

        let controller = page.controller().await.unwrap().unwrap();
        assert_eq!(controller.id, worker.id);
        assert_eq!(page.get("./app.js").await.unwrap().source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_waiting_worker_until_skip_waiting() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        let options = ControllerOptions { skip_waiting_on_install: false, ..options() };
        let (_db, registration) = start(&network, options).await;
        registration.register(deployment("v1")).await.unwrap();
        activated(&registration, "v1").await;
        let page = registration.connect().await.unwrap();

        let mut events = registration.subscribe();
        site(&network, "v2");
        registration.register(deployment("v2")).await.unwrap();
        tokio::time::timeout(WAIT, async {
            loop {
                if let Ok(RegistrationEvent::StateChange { worker }) = events.recv().await
                    && worker.state == WorkerState::Installed
                {
                    return;
                }
            }
        })
        .await
        .unwrap();

        let snapshot = registration.snapshot().await.unwrap();
        assert_eq!(snapshot.waiting.map(|w| w.version), Some(VersionTag::from("v2")));
        assert_eq!(snapshot.active.map(|w| w.version), Some(VersionTag::from("v1")));
        assert_eq!(page.controller().await.unwrap().map(|w| w.version), Some(VersionTag::from("v1")));

        page.post_message(MessageTarget::Waiting, &InboundMessage::SkipWaiting).unwrap();
        activated(&registration, "v2").await;
        assert_eq!(page.controller().await.unwrap().map(|w| w.version), Some(VersionTag::from("v2")));
    }

    #[tokio::test]
    async fn test_waiting_worker_activates_when_pages_close() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        let options = ControllerOptions { skip_waiting_on_install: false, ..options() };
        let (_db, registration) = start(&network, options).await;
        registration.register(deployment("v1")).await.unwrap();
        activated(&registration, "v1").await;
        let page = registration.connect().await.unwrap();

        let mut events = registration.subscribe();
        registration.register(deployment("v2")).await.unwrap();
        tokio::time::timeout(WAIT, async {
            loop {
                if let Ok(RegistrationEvent::StateChange { worker }) = events.recv().await
                    && worker.state == WorkerState::Installed
                {
                    return;
                }
            }
        })
        .await
        .unwrap();

        drop(page);
        activated(&registration, "v2").await;
    }

    #[tokio::test]
    async fn test_resumes_persisted_active_version() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        let db = CacheDb::open_in_memory().await.unwrap();
        {
            let registration = Registration::spawn(db.clone(), Arc::new(network.clone()), options()).await.unwrap();
            registration.register(deployment("v1")).await.unwrap();
            activated(&registration, "v1").await;
        }

        network.set_offline(true);
        let registration = Registration::spawn(db.clone(), Arc::new(network.clone()), options()).await.unwrap();
        let page = registration.connect().await.unwrap();
        let served = page.navigate("./").await.unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.response.text(), "<html>v1</html>");
    }

    #[tokio::test]
    async fn test_upgrade_v1_to_v2_end_to_end() {
        let network = MemoryNetwork::new();
        site(&network, "v1");
        let (db, registration) = start(&network, options()).await;
        registration.register(deployment("v1")).await.unwrap();
        activated(&registration, "v1").await;

        let mut page = registration.connect().await.unwrap();
        assert_eq!(page.get("./app.js").await.unwrap().response.text(), "// v1");

        let mut events = registration.subscribe();
        site(&network, "v2");
        network.serve("http://app.test/extra.css", "/* v2 */");
        let mut v2_deployment = deployment("v2");
        v2_deployment.manifest.push("./extra.css".into());
        registration.register(v2_deployment).await.unwrap();
        let v2 = activated(&registration, "v2").await;

        let claimed = tokio::time::timeout(WAIT, async {
            loop {
                if let Ok(RegistrationEvent::ControllerChange { worker }) = events.recv().await {
                    return worker;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(claimed.id, v2.id);

        assert_eq!(db.list_generations().await.unwrap(), vec!["v2".to_string()]);
        assert_eq!(page.get("./app.js").await.unwrap().response.text(), "// v2");
        let added = page.get("./extra.css").await.unwrap();
        assert_eq!(added.source, ResponseSource::Cache);
        assert_eq!(added.response.text(), "/* v2 */");

        page.post_message(MessageTarget::Controller, &InboundMessage::GetVersion).unwrap();
        assert_eq!(page.recv_timeout(WAIT).await.unwrap(), OutboundMessage::Version { version: "v2".into() });
    }
}
