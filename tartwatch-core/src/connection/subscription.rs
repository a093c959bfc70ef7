use futures::Stream;
use futures::stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Receiving end of one fan-out channel.
///
/// Each subscription buffers a bounded number of items. When the producer
/// runs ahead the oldest buffered items are discarded; the running total is
/// available from [`Subscription::dropped`]. Dropping the subscription
/// unsubscribes.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: broadcast::Receiver<T>,
    dropped: u64,
}

impl<T: Clone> Subscription<T> {
    pub(crate) fn new(receiver: broadcast::Receiver<T>) -> Self {
        Self {
            receiver,
            dropped: 0,
        }
    }

    /// Next item, or `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(item) => return Some(item),
                Err(RecvError::Lagged(skipped)) => {
                    self.dropped = self.dropped.saturating_add(skipped);
                    tracing::warn!(skipped, total = self.dropped, "subscriber lagged, oldest items dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered item without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.try_recv() {
                Ok(item) => return Some(item),
                Err(TryRecvError::Lagged(skipped)) => {
                    self.dropped = self.dropped.saturating_add(skipped);
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Items discarded because this subscriber fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn unsubscribe(self) {}

    pub fn into_stream(self) -> impl Stream<Item = T> + Send
    where
        T: Send + 'static,
    {
        stream::unfold(self, |mut subscription| async move {
            let item = subscription.recv().await?;
            Some((item, subscription))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn slow_subscriber_loses_oldest_items() {
        let (sender, receiver) = broadcast::channel(2);
        let mut subscription = Subscription::new(receiver);

        for value in 1..=5_u32 {
            assert!(sender.send(value).is_ok());
        }

        assert_eq!(subscription.recv().await, Some(4));
        assert_eq!(subscription.recv().await, Some(5));
        assert_eq!(subscription.dropped(), 3);
    }

    #[tokio::test]
    async fn closes_when_producer_goes_away() {
        let (sender, receiver) = broadcast::channel(4);
        let subscription = Subscription::new(receiver);
        assert!(sender.send("one").is_ok());
        drop(sender);

        let items: Vec<&str> = subscription.into_stream().collect().await;
        assert_eq!(items, vec!["one"]);
    }

    #[test]
    fn unsubscribing_releases_the_receiver() {
        let (sender, receiver) = broadcast::channel::<u8>(4);
        let subscription = Subscription::new(receiver);
        assert_eq!(sender.receiver_count(), 1);
        subscription.unsubscribe();
        assert_eq!(sender.receiver_count(), 0);
    }
}
