use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

pub type ConnectionId = u64;

pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Write half of an observer socket.
pub type ObserverSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("write failed: {0}")]
    Write(#[from] axum::Error),
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
}

/// A registered observer connection.
#[derive(Clone)]
pub struct Observer {
    id: ConnectionId,
    sink: Arc<Mutex<ObserverSink>>,
}

impl Observer {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Writes one text frame. Waiting for the sink and the write itself are
    /// both bounded by `limit`.
    pub async fn send_text(&self, payload: String, limit: Duration) -> Result<(), ConnectionError> {
        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(payload)).await
        };

        match tokio::time::timeout(limit, write).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ConnectionError::WriteTimeout(limit)),
        }
    }

    /// Closes the sink. A peer that never acknowledges is abandoned after
    /// [`CLOSE_TIMEOUT`].
    pub async fn close(&self) {
        let close = async {
            let mut sink = self.sink.lock().await;
            sink.close().await
        };

        match tokio::time::timeout(CLOSE_TIMEOUT, close).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(connection_id = self.id, "error closing connection: {}", e),
            Err(_) => debug!(connection_id = self.id, "connection close timed out"),
        }
    }
}

/// The set of currently open observer connections.
///
/// Shared by the acceptor (insert), each connection's reader (remove on
/// disconnect) and the broadcaster (remove on write failure). Iteration goes
/// through [`ConnectionRegistry::snapshot`], a copy taken under the lock, so
/// concurrent membership changes never touch a set being walked.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    next_id: AtomicU64,
    connections: Mutex<HashMap<ConnectionId, Observer>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, sink: ObserverSink) -> ConnectionId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let observer = Observer {
            id,
            sink: Arc::new(Mutex::new(sink)),
        };
        self.inner.connections.lock().await.insert(id, observer);
        id
    }

    /// Removes a connection, handing it back so the caller can close it.
    /// `None` if someone else already removed it.
    pub async fn remove(&self, id: ConnectionId) -> Option<Observer> {
        self.inner.connections.lock().await.remove(&id)
    }

    pub async fn snapshot(&self) -> Vec<Observer> {
        self.inner.connections.lock().await.values().cloned().collect()
    }

    #[cfg(test)]
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.inner.connections.lock().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.connections.lock().await.len()
    }

    /// Empties the registry and closes every connection it held.
    pub async fn close_all(&self) {
        let drained: Vec<Observer> = self
            .inner
            .connections
            .lock()
            .await
            .drain()
            .map(|(_, observer)| observer)
            .collect();

        if !drained.is_empty() {
            info!(observers = drained.len(), "closing observer connections");
        }
        for observer in drained {
            observer.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::test_support::channel_sink;

    #[tokio::test]
    async fn ids_are_never_reused() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = channel_sink();
        let (b, _rx_b) = channel_sink();

        let first = registry.add(a).await;
        assert!(registry.remove(first).await.is_some());
        let second = registry.add(b).await;

        assert_ne!(first, second);
        assert_eq!(registry.len().await, 1);
        assert!(!registry.contains(first).await);
        assert!(registry.contains(second).await);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (sink, _rx) = channel_sink();
        let id = registry.add(sink).await;

        assert!(registry.remove(id).await.is_some());
        assert!(registry.remove(id).await.is_none());
    }

    #[tokio::test]
    async fn snapshot_is_unaffected_by_later_changes() {
        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            let (sink, rx) = channel_sink();
            ids.push(registry.add(sink).await);
            receivers.push(rx);
        }

        let snapshot = registry.snapshot().await;
        registry.remove(ids[0]).await;
        let (late, _late_rx) = channel_sink();
        registry.add(late).await;

        assert_eq!(snapshot.len(), 3);
        assert_eq!(registry.len().await, 3);
        assert!(!registry.contains(ids[0]).await);
    }

    #[tokio::test]
    async fn concurrent_add_and_remove_keep_the_set_consistent() {
        let registry = ConnectionRegistry::new();
        let mut tasks = Vec::new();
        for i in 0..64 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (sink, rx) = channel_sink();
                let id = registry.add(sink).await;
                let _ = registry.snapshot().await;
                if i % 2 == 0 {
                    registry.remove(id).await;
                }
                drop(rx);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(registry.len().await, 32);
    }

    #[tokio::test]
    async fn close_all_empties_and_closes() {
        let registry = ConnectionRegistry::new();
        let (sink, mut rx) = channel_sink();
        registry.add(sink).await;

        registry.close_all().await;

        assert_eq!(registry.len().await, 0);
        // the receiving side observes the sink being closed
        assert_eq!(futures::StreamExt::next(&mut rx).await, None);
    }
}
