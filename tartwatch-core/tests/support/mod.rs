#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use parking_lot::Mutex;
use serde_json::{Value, json};
use url::Url;

use tartwatch_core::{Channel, ConnectionError, ConnectionManager, ConnectionState, Subscription, Transport};

enum Step {
    Refuse,
    Serve(mpsc::UnboundedReceiver<Result<String, ConnectionError>>),
}

/// Transport that plays back a queue of connection outcomes. Once the
/// queue is empty every open is refused.
#[derive(Default)]
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    opens: Mutex<Vec<Url>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse(&self) {
        self.steps.lock().push_back(Step::Refuse);
    }

    /// Queue a successful open and return the handle that feeds it.
    pub fn serve(&self) -> Feed {
        let (sender, receiver) = mpsc::unbounded();
        self.steps.lock().push_back(Step::Serve(receiver));
        Feed { sender }
    }

    pub fn opens(&self) -> Vec<Url> {
        self.opens.lock().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, url: &Url) -> Result<Channel, ConnectionError> {
        self.opens.lock().push(url.clone());
        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Serve(frames)) => {
                let sent = Arc::clone(&self.sent);
                let sink = futures::sink::unfold((), move |(), frame: String| {
                    let sent = Arc::clone(&sent);
                    async move {
                        sent.lock().push(frame);
                        Ok::<_, ConnectionError>(())
                    }
                });
                Ok(Channel::new(sink, frames))
            }
            Some(Step::Refuse) | None => Err(ConnectionError::Open {
                url: url.to_string(),
                message: "connection refused".to_owned(),
            }),
        }
    }
}

/// Server side of one scripted session. Dropping it closes the session.
pub struct Feed {
    sender: mpsc::UnboundedSender<Result<String, ConnectionError>>,
}

impl Feed {
    pub fn frame(&self, text: impl Into<String>) {
        self.sender
            .unbounded_send(Ok(text.into()))
            .expect("session still open");
    }

    pub fn event(&self, record: Value) {
        self.frame(json!({"type": "event", "data": record}).to_string());
    }

    pub fn fail(&self, message: &str) {
        self.sender
            .unbounded_send(Err(ConnectionError::Io(message.to_owned())))
            .expect("session still open");
    }
}

pub fn best_block(node_id: &str, slot: u64, hash: &str) -> Value {
    json!({
        "node_id": node_id,
        "event_type": 11,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "event": {"BestBlockChanged": {"slot": slot, "hash": hash}},
    })
}

pub fn authored(node_id: &str, slot: u64, hash: &str) -> Value {
    json!({
        "node_id": node_id,
        "event_type": 42,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "event": {"Authored": {"block": {"slot": slot, "header_hash": hash}}},
    })
}

pub fn endpoint(host: &str) -> Url {
    Url::parse(&format!("ws://{host}/api/ws")).expect("valid url")
}

pub async fn next<T: Clone>(subscription: &mut Subscription<T>) -> T {
    tokio::time::timeout(Duration::from_secs(120), subscription.recv())
        .await
        .expect("timed out waiting for item")
        .expect("channel closed")
}

pub async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) {
    let mut changes = manager.state_changes();
    tokio::time::timeout(Duration::from_secs(120), changes.wait_for(|current| *current == state))
        .await
        .expect("timed out waiting for state")
        .map(|_| ())
        .expect("manager dropped");
}

/// Poll `check` until it holds, with real or paused time.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
