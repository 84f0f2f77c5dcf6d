#![allow(dead_code)]

//! Fan-out event bus used to publish `AgentEvent`s to subscribers (UI,
//! tests, loggers). Mirrors the teacher's `event-bus` crate: a thin
//! wrapper over `tokio::sync::broadcast` so publishers don't need to
//! track subscriber count or lifetimes.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use browseragent_core_types::CoreError;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

#[async_trait]
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), CoreError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// Simple in-memory bus. A `send` with no subscribers is not an error:
/// events are fire-and-forget until something is listening.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }
}

#[async_trait]
impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    async fn publish(&self, event: E) -> Result<(), CoreError> {
        // No subscribers is a normal state (e.g. headless CLI runs with
        // no UI attached) so a send error here is swallowed, not surfaced.
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Materialise an mpsc receiver from the bus subscription so callers can
/// await events without handling broadcast lag/close semantics directly.
pub fn to_mpsc<E>(bus: Arc<InMemoryBus<E>>, capacity: usize) -> mpsc::Receiver<E>
where
    E: Event,
{
    let mut rx = bus.subscribe();
    let (tx, out_rx) = mpsc::channel(capacity.max(1));
    tokio::spawn(async move {
        while let Ok(ev) = rx.recv().await {
            if tx.send(ev).await.is_err() {
                break;
            }
        }
    });
    out_rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_is_ok_with_no_subscribers() {
        let bus: Arc<InMemoryBus<i32>> = InMemoryBus::new(4);
        assert!(bus.publish(1).await.is_ok());
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus: Arc<InMemoryBus<&'static str>> = InMemoryBus::new(4);
        let mut rx = bus.subscribe();
        bus.publish("hello").await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }
}
