//! Text-frame transports for the push channel.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::ready;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::error::ConnectionError;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = ConnectionError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ConnectionError>> + Send>>;

/// An open, bidirectional channel of text frames.
///
/// The session ends when `stream` yields an error or runs dry.
pub struct Channel {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Channel {
    pub fn new<S, St>(sink: S, stream: St) -> Self
    where
        S: Sink<String, Error = ConnectionError> + Send + 'static,
        St: Stream<Item = Result<String, ConnectionError>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}

/// Opens push-channel connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, url: &Url) -> Result<Channel, ConnectionError>;
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self {
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &Url) -> Result<Channel, ConnectionError> {
        let open_error = |message: String| ConnectionError::Open {
            url: url.to_string(),
            message,
        };

        let (socket, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_elapsed| open_error(format!("timed out after {:?}", self.connect_timeout)))?
            .map_err(|err| open_error(err.to_string()))?;

        let (write, read) = socket.split();

        let sink = write
            .sink_map_err(|err| ConnectionError::Io(err.to_string()))
            .with(|frame: String| ready(Ok::<_, ConnectionError>(Message::text(frame))));

        let stream = read.filter_map(|message| {
            ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text.to_string())),
                Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(Message::Close(_)) => Some(Err(ConnectionError::Closed)),
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
                Err(err) => Some(Err(ConnectionError::Io(err.to_string()))),
            })
        });

        Ok(Channel::new(sink, stream))
    }
}
