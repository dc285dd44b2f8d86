//! Event bus the outbox publishers feed.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::PublishError;
use crate::types::PublishedEvent;

/// Downstream sink for published events.
///
/// `publish` may wait (backpressure); only publishers call it, never
/// actors.
#[async_trait]
pub trait EventBus: Send + Sync + 'static {
    async fn publish(&self, ev: PublishedEvent) -> Result<(), PublishError>;
}

/// In-process bus over a bounded channel with a single subscriber.
#[derive(Debug)]
pub struct ChanBus {
    tx: mpsc::Sender<PublishedEvent>,
    rx: Mutex<Option<mpsc::Receiver<PublishedEvent>>>,
    dropped: AtomicU64,
}

impl ChanBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        ChanBus {
            tx,
            rx: Mutex::new(Some(rx)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Take the receiving end. Only the first call gets it.
    pub fn subscribe(&self) -> Option<mpsc::Receiver<PublishedEvent>> {
        self.rx.lock().take()
    }

    /// Publish without waiting; a full channel drops the event and counts it.
    pub fn try_publish(&self, ev: PublishedEvent) -> bool {
        match self.tx.try_send(ev) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Events lost by `try_publish`.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EventBus for ChanBus {
    async fn publish(&self, ev: PublishedEvent) -> Result<(), PublishError> {
        self.tx.send(ev).await.map_err(|_| PublishError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_core::Event;
    use std::sync::Arc;

    fn ev(seq: u64) -> PublishedEvent {
        PublishedEvent {
            symbol: Arc::from("BTC"),
            event: Event::cmd_end(seq, 0, seq),
        }
    }

    #[tokio::test]
    async fn single_subscriber_receives_in_order() {
        let bus = ChanBus::new(4);
        let mut rx = bus.subscribe().unwrap();
        assert!(bus.subscribe().is_none());

        bus.publish(ev(1)).await.unwrap();
        bus.publish(ev(2)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().event.seq, 1);
        assert_eq!(rx.recv().await.unwrap().event.seq, 2);
    }

    #[tokio::test]
    async fn try_publish_counts_drops() {
        let bus = ChanBus::new(1);
        assert!(bus.try_publish(ev(1)));
        assert!(!bus.try_publish(ev(2)));
        assert_eq!(bus.dropped(), 1);
    }

    #[tokio::test]
    async fn publish_fails_once_subscriber_is_gone() {
        let bus = ChanBus::new(1);
        drop(bus.subscribe());
        assert!(matches!(bus.publish(ev(1)).await, Err(PublishError::Closed)));
    }
}
