//! Push-channel session management.
//!
//! A [`ConnectionManager`] owns at most one session task at a time. Every
//! session carries a generation number; control operations bump the
//! generation under the control lock, so a superseded task can never publish
//! a state transition after its replacement has started.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast::error::SendError;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;

use tartwatch_commons::{ErrorReporter, ExponentialBackoff, NoopErrorReporter};
use tartwatch_config::ConnectionConfig;
use tartwatch_events::{ClientMessage, NormalizedEvent, Normalizer, ServerMessage, SubscriptionFilter};

use super::state::{ConnectionEvent, ConnectionState};
use super::subscription::Subscription;
use super::transport::{Channel, FrameSink, Transport, WebSocketTransport};
use crate::error::ConnectionError;

const DEFAULT_SUBSCRIBER_BUFFER: usize = 1_024;

/// Handle to the live push connection. Cheap to clone; all clones control
/// the same session.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    normalizer: Arc<Normalizer>,
    backoff: ExponentialBackoff,
    reporter: Arc<dyn ErrorReporter>,
    events: broadcast::Sender<NormalizedEvent>,
    stats: broadcast::Sender<Value>,
    notices: broadcast::Sender<ConnectionEvent>,
    state: watch::Sender<ConnectionState>,
    control: Mutex<Control>,
}

struct Control {
    endpoint: Url,
    filter: SubscriptionFilter,
    session: Option<Session>,
    generation: u64,
}

struct Session {
    cancel: CancellationToken,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

#[derive(Debug, Clone, Copy)]
enum SessionCommand {
    Resubscribe,
}

enum SessionEnd {
    Cancelled,
    Lost(ConnectionError),
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint().as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    pub fn builder(endpoint: Url) -> ConnectionManagerBuilder {
        ConnectionManagerBuilder::new(endpoint)
    }

    /// Start a session unless one is already connected. A pending reconnect
    /// is cancelled and the attempt counter starts from zero.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut control = self.inner.control.lock();
        if control.session.is_some() && self.state().is_connected() {
            return;
        }
        self.start_session(&mut control);
    }

    /// Tear down the session, including any pending reconnect timer.
    pub fn disconnect(&self) {
        let mut control = self.inner.control.lock();
        if let Some(session) = control.session.take() {
            session.cancel.cancel();
        }
        control.generation = control.generation.wrapping_add(1);
        self.inner.publish_state(ConnectionState::Disconnected);
    }

    /// Point the manager at a new push URL. An active session is restarted
    /// against the new endpoint right away.
    pub fn set_endpoint(&self, endpoint: Url) {
        let mut control = self.inner.control.lock();
        if control.endpoint == endpoint {
            return;
        }
        info!(from = %control.endpoint, to = %endpoint, "push endpoint changed");
        control.endpoint = endpoint;
        if control.session.is_some() {
            self.start_session(&mut control);
        }
    }

    /// Replace the subscription filter; a connected session re-subscribes.
    pub fn set_filter(&self, filter: SubscriptionFilter) {
        let mut control = self.inner.control.lock();
        if control.filter == filter {
            return;
        }
        control.filter = filter;
        if let Some(session) = &control.session
            && session.commands.send(SessionCommand::Resubscribe).is_err()
        {
            trace!("session task already finished, filter applies on next connect");
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watch channel that always holds the latest state.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn endpoint(&self) -> Url {
        self.inner.control.lock().endpoint.clone()
    }

    pub fn filter(&self) -> SubscriptionFilter {
        self.inner.control.lock().filter.clone()
    }

    pub fn subscribe_events(&self) -> Subscription<NormalizedEvent> {
        Subscription::new(self.inner.events.subscribe())
    }

    pub fn subscribe_stats(&self) -> Subscription<Value> {
        Subscription::new(self.inner.stats.subscribe())
    }

    pub fn subscribe_connection(&self) -> Subscription<ConnectionEvent> {
        Subscription::new(self.inner.notices.subscribe())
    }

    pub fn normalizer(&self) -> &Arc<Normalizer> {
        &self.inner.normalizer
    }

    fn start_session(&self, control: &mut Control) {
        if let Some(previous) = control.session.take() {
            previous.cancel.cancel();
        }
        control.generation = control.generation.wrapping_add(1);

        let cancel = CancellationToken::new();
        let (commands, command_rx) = mpsc::unbounded_channel();
        control.session = Some(Session {
            cancel: cancel.clone(),
            commands,
        });

        let task = SessionTask {
            inner: Arc::clone(&self.inner),
            url: control.endpoint.clone(),
            generation: control.generation,
            cancel,
            commands: command_rx,
        };
        tokio::spawn(task.run());
    }
}

impl Inner {
    fn publish_state(&self, state: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
        if changed {
            debug!(%state, "connection state changed");
            self.notify(ConnectionEvent::StateChanged(state));
        }
    }

    fn notify(&self, event: ConnectionEvent) {
        if let Err(SendError(unsent)) = self.notices.send(event) {
            trace!(?unsent, "no connection subscribers");
        }
    }

    /// Publish `state` if `generation` is still the live session.
    fn transition(&self, generation: u64, state: ConnectionState) -> bool {
        let control = self.control.lock();
        if control.generation != generation {
            return false;
        }
        self.publish_state(state);
        true
    }

    fn schedule_retry(&self, generation: u64, attempt: u32, delay: Duration) -> bool {
        let control = self.control.lock();
        if control.generation != generation {
            return false;
        }
        self.publish_state(ConnectionState::Reconnecting);
        info!(attempt, delay_ms = delay.as_millis(), "reconnect scheduled");
        self.notify(ConnectionEvent::ReconnectScheduled { attempt, delay });
        true
    }

    fn give_up(&self, generation: u64, attempts: u32) {
        let mut control = self.control.lock();
        if control.generation != generation {
            return;
        }
        control.session = None;
        warn!(attempts, url = %control.endpoint, "giving up on push channel");
        self.notify(ConnectionEvent::ReconnectExhausted { attempts });
    }

    fn handle_frame(&self, frame: &str) {
        match ServerMessage::parse(frame) {
            Ok(ServerMessage::Event(raw)) => {
                let event = self.normalizer.normalize(raw);
                trace!(sequence_id = event.sequence_id, event_type = event.event_type, "event received");
                if let Err(SendError(_unsent)) = self.events.send(event) {
                    trace!("no event subscribers");
                }
            }
            Ok(ServerMessage::Stats(stats)) => {
                if let Err(SendError(_unsent)) = self.stats.send(stats) {
                    trace!("no stats subscribers");
                }
            }
            Ok(ServerMessage::Connected(data)) => debug!(%data, "push handshake acknowledged"),
            Ok(ServerMessage::Subscribed(data)) => debug!(%data, "subscription acknowledged"),
            Ok(ServerMessage::Unknown(kind)) => debug!(kind, "ignoring unknown push message"),
            Err(err) => {
                warn!(error = %err, "skipping malformed push frame");
                let error = anyhow::Error::new(err).context("malformed push frame");
                if let Err(report_err) = self.reporter.capture(&error) {
                    trace!(error = %report_err, "error reporter failed");
                }
            }
        }
    }

    async fn send_subscribe(&self, sink: &mut FrameSink) -> Result<(), ConnectionError> {
        let filter = self.control.lock().filter.clone();
        let frame = ClientMessage::subscribe(filter).to_frame()?;
        debug!(%frame, "sending subscribe");
        sink.send(frame).await
    }
}

struct SessionTask {
    inner: Arc<Inner>,
    url: Url,
    generation: u64,
    cancel: CancellationToken,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
}

impl SessionTask {
    async fn run(mut self) {
        let inner = Arc::clone(&self.inner);
        let mut failures: u32 = 0;

        loop {
            if !inner.transition(self.generation, ConnectionState::Connecting) {
                return;
            }

            let opened = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                opened = inner.transport.open(&self.url) => opened,
            };

            match opened {
                Ok(channel) => {
                    failures = 0;
                    if !inner.transition(self.generation, ConnectionState::Connected) {
                        return;
                    }
                    info!(url = %self.url, "push channel connected");
                    match self.pump(channel).await {
                        SessionEnd::Cancelled => return,
                        SessionEnd::Lost(err) => {
                            warn!(url = %self.url, error = %err, "push channel lost");
                        }
                    }
                }
                Err(err) => {
                    warn!(url = %self.url, failures, error = %err, "failed to open push channel");
                }
            }

            if !inner.transition(self.generation, ConnectionState::Disconnected) {
                return;
            }
            if failures >= inner.backoff.max_attempts() {
                inner.give_up(self.generation, failures);
                return;
            }

            failures = failures.saturating_add(1);
            let delay = inner.backoff.delay_for(failures);
            if !inner.schedule_retry(self.generation, failures, delay) {
                return;
            }
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn pump(&mut self, channel: Channel) -> SessionEnd {
        let Channel {
            mut sink,
            mut stream,
        } = channel;

        // The initial subscribe already carries the latest filter.
        while self.commands.try_recv().is_ok() {}
        if let Err(err) = self.inner.send_subscribe(&mut sink).await {
            return SessionEnd::Lost(err);
        }

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return SessionEnd::Cancelled,
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Resubscribe) => {
                        if let Err(err) = self.inner.send_subscribe(&mut sink).await {
                            return SessionEnd::Lost(err);
                        }
                    }
                    None => return SessionEnd::Cancelled,
                },
                frame = stream.next() => match frame {
                    Some(Ok(text)) => self.inner.handle_frame(&text),
                    Some(Err(err)) => return SessionEnd::Lost(err),
                    None => return SessionEnd::Lost(ConnectionError::Closed),
                },
            }
        }
    }
}

/// Builder for [`ConnectionManager`].
pub struct ConnectionManagerBuilder {
    endpoint: Url,
    transport: Option<Arc<dyn Transport>>,
    normalizer: Option<Arc<Normalizer>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    filter: SubscriptionFilter,
    backoff: ExponentialBackoff,
    subscriber_buffer: usize,
}

impl ConnectionManagerBuilder {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            transport: None,
            normalizer: None,
            reporter: None,
            filter: SubscriptionFilter::All,
            backoff: ExponentialBackoff::default(),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Share a normalizer so sequence numbers stay monotonic across sources.
    pub fn normalizer(mut self, normalizer: Arc<Normalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn filter(mut self, filter: SubscriptionFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn backoff(mut self, backoff: ExponentialBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn subscriber_buffer(mut self, capacity: usize) -> Self {
        self.subscriber_buffer = capacity.max(1);
        self
    }

    /// Apply reconnect and buffer settings from configuration.
    pub fn config(self, config: &ConnectionConfig) -> Self {
        self.backoff(ExponentialBackoff::new(
            config.base_delay(),
            config.max_reconnect_attempts,
        ))
        .subscriber_buffer(config.subscriber_buffer)
    }

    pub fn build(self) -> ConnectionManager {
        let (events, _) = broadcast::channel(self.subscriber_buffer);
        let (stats, _) = broadcast::channel(self.subscriber_buffer);
        let (notices, _) = broadcast::channel(self.subscriber_buffer);
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        ConnectionManager {
            inner: Arc::new(Inner {
                transport: self
                    .transport
                    .unwrap_or_else(|| Arc::new(WebSocketTransport::new())),
                normalizer: self.normalizer.unwrap_or_default(),
                backoff: self.backoff,
                reporter: self
                    .reporter
                    .unwrap_or_else(|| Arc::new(NoopErrorReporter)),
                events,
                stats,
                notices,
                state,
                control: Mutex::new(Control {
                    endpoint: self.endpoint,
                    filter: self.filter,
                    session: None,
                    generation: 0,
                }),
            }),
        }
    }
}
