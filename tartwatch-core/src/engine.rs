//! Wiring of the push channel, backend polling and the aggregators.
//!
//! One ingestion task owns both aggregators and is the only writer. After
//! each burst of events or roster update it publishes fresh snapshots
//! through [`ArcSwap`], so queries never wait on ingestion.

use std::sync::Arc;

use anyhow::anyhow;
use arc_swap::ArcSwap;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use tartwatch_commons::{ErrorReporter, NoopErrorReporter};
use tartwatch_config::{EndpointError, SettingsHandle, TartConfig, push_url};
use tartwatch_events::{NormalizedEvent, Normalizer, SubscriptionFilter};

use crate::backend::{BackendClient, RosterNode};
use crate::chain::{ChainAggregator, ChainState};
use crate::connection::{ConnectionManager, Subscription, Transport, WebSocketTransport};
use crate::error::EngineError;
use crate::network::NetworkOverview;
use crate::nodes::{NodeAggregator, NodeMetricsView, NodeState};

/// Upper bound on events folded in before a snapshot is published.
const MAX_BATCH: usize = 256;
const ROSTER_QUEUE: usize = 4;

struct Snapshots {
    chain: ArcSwap<ChainState>,
    nodes: ArcSwap<NodeMetricsView>,
}

/// Running aggregation pipeline.
pub struct TelemetryEngine {
    settings: SettingsHandle,
    backend: BackendClient,
    connection: ConnectionManager,
    snapshots: Arc<Snapshots>,
    roster_tx: mpsc::Sender<Vec<RosterNode>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for TelemetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryEngine")
            .field("backend", &self.backend.base_url().as_str())
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

impl TelemetryEngine {
    pub fn builder(settings: SettingsHandle) -> EngineBuilder {
        EngineBuilder::new(settings)
    }

    /// Start with the given push transport and default options.
    pub async fn start(settings: SettingsHandle, transport: Arc<dyn Transport>) -> Result<Self, EngineError> {
        Self::builder(settings).transport(transport).start().await
    }

    /// Latest chain snapshot.
    pub fn chain(&self) -> Arc<ChainState> {
        self.snapshots.chain.load_full()
    }

    pub fn nodes(&self) -> Arc<NodeMetricsView> {
        self.snapshots.nodes.load_full()
    }

    pub fn node_metrics(&self, node_id: &str) -> Result<NodeState, EngineError> {
        Ok(self.nodes().metrics_for(node_id, Utc::now())?)
    }

    pub fn all_node_metrics(&self) -> Vec<NodeState> {
        self.nodes().all_metrics(Utc::now())
    }

    pub fn overview(&self) -> NetworkOverview {
        NetworkOverview::compute(
            &self.chain(),
            &self.nodes(),
            self.connection.state(),
            Utc::now(),
        )
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    pub fn subscribe_events(&self) -> Subscription<NormalizedEvent> {
        self.connection.subscribe_events()
    }

    /// Fetch the roster now instead of waiting for the next poll.
    pub async fn refresh_roster(&self) -> Result<usize, EngineError> {
        let nodes = self.backend.nodes().await?;
        let count = nodes.len();
        self.roster_tx
            .send(nodes)
            .await
            .map_err(|_closed| EngineError::ShutDown)?;
        Ok(count)
    }

    /// Disconnect the push channel and stop every background task.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.connection.disconnect();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "engine task ended abnormally");
            }
        }
        info!("telemetry engine stopped");
    }
}

impl Drop for TelemetryEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Options for [`TelemetryEngine`].
pub struct EngineBuilder {
    settings: SettingsHandle,
    transport: Option<Arc<dyn Transport>>,
    reporter: Arc<dyn ErrorReporter>,
    filter: SubscriptionFilter,
}

impl EngineBuilder {
    pub fn new(settings: SettingsHandle) -> Self {
        Self {
            settings,
            transport: None,
            reporter: Arc::new(NoopErrorReporter),
            filter: SubscriptionFilter::All,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn filter(mut self, filter: SubscriptionFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Pull history and roster, connect, and spawn the background tasks.
    pub async fn start(self) -> Result<TelemetryEngine, EngineError> {
        let config = self.settings.get();
        let endpoint = push_url(&config.api_url)?;
        let backend = BackendClient::new(&config.api_url)?;
        let normalizer = Arc::new(Normalizer::new());

        let mut chain = ChainAggregator::new(config.retention.effective_blocks());
        let mut nodes = NodeAggregator::new(config.retention.node_events);
        seed_history(&backend, &normalizer, &config, &mut chain, &mut nodes, self.reporter.as_ref()).await;
        match backend.nodes().await {
            Ok(roster) => {
                nodes.refresh_roster(&roster);
            }
            Err(err) => report(self.reporter.as_ref(), anyhow!(err).context("initial roster fetch failed")),
        }

        let connection = ConnectionManager::builder(endpoint)
            .config(&config.connection)
            .transport(
                self.transport
                    .unwrap_or_else(|| Arc::new(WebSocketTransport::new())),
            )
            .normalizer(Arc::clone(&normalizer))
            .error_reporter(Arc::clone(&self.reporter))
            .filter(self.filter)
            .build();

        let snapshots = Arc::new(Snapshots {
            chain: ArcSwap::from_pointee(chain.snapshot()),
            nodes: ArcSwap::from_pointee(nodes.view()),
        });

        // Subscribe before connecting so no early event is missed.
        let events = connection.subscribe_events();
        let (roster_tx, roster_rx) = mpsc::channel(ROSTER_QUEUE);
        let shutdown = CancellationToken::new();

        let ingestion = Ingestion {
            chain,
            nodes,
            snapshots: Arc::clone(&snapshots),
            events,
            roster: roster_rx,
            shutdown: shutdown.clone(),
        };

        connection.connect();
        let tasks = vec![
            tokio::spawn(ingestion.run()),
            spawn_roster_poller(
                backend.clone(),
                self.settings.clone(),
                roster_tx.clone(),
                Arc::clone(&self.reporter),
                shutdown.clone(),
            ),
            spawn_settings_watcher(
                self.settings.clone(),
                backend.clone(),
                connection.clone(),
                shutdown.clone(),
            ),
        ];

        info!(api_url = %config.api_url, "telemetry engine started");
        Ok(TelemetryEngine {
            settings: self.settings,
            backend,
            connection,
            snapshots,
            roster_tx,
            shutdown,
            tasks: Mutex::new(tasks),
        })
    }
}

async fn seed_history(
    backend: &BackendClient,
    normalizer: &Normalizer,
    config: &TartConfig,
    chain: &mut ChainAggregator,
    nodes: &mut NodeAggregator,
    reporter: &dyn ErrorReporter,
) {
    match backend.events(config.retention.history_limit).await {
        Ok(history) => {
            let count = history.len();
            // The backend returns newest first.
            for raw in history.into_iter().rev() {
                let event = normalizer.normalize(raw);
                chain.apply(&event);
                nodes.apply(&event);
            }
            debug!(count, "history applied");
        }
        Err(err) => report(reporter, anyhow!(err).context("history pull failed")),
    }
}

fn report(reporter: &dyn ErrorReporter, error: anyhow::Error) {
    warn!(error = %format!("{error:#}"), "backend request failed");
    if let Err(report_err) = reporter.capture(&error) {
        debug!(error = %report_err, "error reporter failed");
    }
}

struct Ingestion {
    chain: ChainAggregator,
    nodes: NodeAggregator,
    snapshots: Arc<Snapshots>,
    events: Subscription<NormalizedEvent>,
    roster: mpsc::Receiver<Vec<RosterNode>>,
    shutdown: CancellationToken,
}

impl Ingestion {
    async fn run(mut self) {
        let mut reported_drops: u64 = 0;
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                Some(roster) = self.roster.recv() => {
                    self.nodes.refresh_roster(&roster);
                    self.publish();
                }
                Some(event) = self.events.recv() => {
                    self.apply(&event);
                    let mut batch: usize = 1;
                    while batch < MAX_BATCH {
                        let Some(next) = self.events.try_recv() else {
                            break;
                        };
                        self.apply(&next);
                        batch += 1;
                    }
                    let dropped = self.events.dropped();
                    if dropped > reported_drops {
                        warn!(dropped, "ingestion fell behind the push channel");
                        reported_drops = dropped;
                    }
                    self.publish();
                }
                else => break,
            }
        }
        debug!("ingestion task stopped");
    }

    fn apply(&mut self, event: &NormalizedEvent) {
        self.chain.apply(event);
        self.nodes.apply(event);
    }

    fn publish(&self) {
        self.snapshots.chain.store(Arc::new(self.chain.snapshot()));
        self.snapshots.nodes.store(Arc::new(self.nodes.view()));
    }
}

fn spawn_roster_poller(
    backend: BackendClient,
    settings: SettingsHandle,
    roster_tx: mpsc::Sender<Vec<RosterNode>>,
    reporter: Arc<dyn ErrorReporter>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let interval = settings.get().refresh_interval();
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }

            match backend.nodes().await {
                Ok(roster) => {
                    if roster_tx.send(roster).await.is_err() {
                        break;
                    }
                }
                Err(err) => report(reporter.as_ref(), anyhow!(err).context("roster poll failed")),
            }
        }
        debug!("roster poller stopped");
    })
}

fn spawn_settings_watcher(
    settings: SettingsHandle,
    backend: BackendClient,
    connection: ConnectionManager,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut changes = settings.subscribe();
        let mut current = changes.borrow_and_update().api_url.clone();
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let api_url = changes.borrow_and_update().api_url.clone();
            if api_url == current {
                continue;
            }
            match retarget_backend(&backend, &api_url) {
                Ok(endpoint) => {
                    info!(%api_url, "switching backend");
                    connection.set_endpoint(endpoint);
                    current = api_url;
                }
                Err(err) => {
                    warn!(%api_url, error = %err, "ignoring unusable api_url");
                }
            }
        }
        debug!("settings watcher stopped");
    })
}

/// Moves the REST client to `api_url` and returns the matching push URL.
/// The client is left untouched when either URL cannot be derived.
fn retarget_backend(backend: &BackendClient, api_url: &str) -> Result<Url, EndpointError> {
    let endpoint = push_url(api_url)?;
    backend.set_base_url(api_url)?;
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn retarget_moves_rest_and_push_together() {
        let backend = BackendClient::new("http://backend:8080").expect("client");

        let endpoint = retarget_backend(&backend, "https://other:9000/base").expect("retarget");
        assert_eq!(endpoint.as_str(), "wss://other:9000/base/api/ws");
        assert_eq!(backend.base_url().as_str(), "https://other:9000/base");
    }

    #[test]
    fn unusable_url_leaves_backend_in_place() {
        let backend = BackendClient::new("http://backend:8080").expect("client");

        assert!(retarget_backend(&backend, "ftp://other:21").is_err());
        assert!(retarget_backend(&backend, "not a url").is_err());
        assert_eq!(backend.base_url().as_str(), "http://backend:8080/");
    }
}
