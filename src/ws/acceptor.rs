use crate::ws::registry::{ConnectionId, ConnectionRegistry};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{Sink, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

/// State handed to the observer listener.
#[derive(Clone)]
pub struct LiveState {
    pub registry: ConnectionRegistry,
    pub shutdown: CancellationToken,
}

/// Why a reader stopped.
#[derive(Debug, PartialEq, Eq)]
pub enum Disconnect {
    Closed,
    ReadError,
    Shutdown,
}

/// WebSocket upgrade handler. A request that fails the handshake is rejected
/// by the extractor before anything is registered.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<LiveState>) -> Response {
    ws.on_failed_upgrade(|e| warn!("failed to upgrade connection: {}", e))
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: LiveState) {
    let (sender, receiver) = socket.split();
    serve_observer(&state.registry, &state.shutdown, sender, receiver).await;
}

/// Registers the write half and then reads until the peer goes away.
///
/// Inbound frames carry no meaning and are discarded. Whatever ends the read
/// loop, the connection is removed from the registry and closed.
pub async fn serve_observer<S, R>(
    registry: &ConnectionRegistry,
    shutdown: &CancellationToken,
    sink: S,
    mut inbound: R,
) -> Disconnect
where
    S: Sink<Message, Error = axum::Error> + Send + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let id = registry.add(Box::pin(sink)).await;
    let observers = registry.len().await;
    info!(connection_id = id, observers, "observer connected");

    let reason = tokio::select! {
        reason = read_until_closed(id, &mut inbound) => reason,
        _ = shutdown.cancelled() => Disconnect::Shutdown,
    };

    if let Some(observer) = registry.remove(id).await {
        observer.close().await;
    }
    info!(connection_id = id, ?reason, "observer disconnected");

    reason
}

async fn read_until_closed<R>(id: ConnectionId, inbound: &mut R) -> Disconnect
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Close(_)) => return Disconnect::Closed,
            Ok(_) => {}
            Err(e) => {
                debug!(connection_id = id, "error reading message: {}", e);
                return Disconnect::ReadError;
            }
        }
    }
    Disconnect::Closed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::test_support::channel_sink;
    use futures::channel::mpsc;
    use std::time::Duration;

    type Inbound = mpsc::UnboundedSender<Result<Message, axum::Error>>;

    fn inbound() -> (Inbound, mpsc::UnboundedReceiver<Result<Message, axum::Error>>) {
        mpsc::unbounded()
    }

    async fn wait_for_len(registry: &ConnectionRegistry, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while registry.len().await != expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("registry never reached expected size");
    }

    #[tokio::test]
    async fn registers_while_open_and_deregisters_on_close_frame() {
        let registry = ConnectionRegistry::new();
        let shutdown = CancellationToken::new();
        let (sink, _out) = channel_sink();
        let (client, frames) = inbound();

        let task = tokio::spawn({
            let registry = registry.clone();
            let shutdown = shutdown.clone();
            async move { serve_observer(&registry, &shutdown, sink, frames).await }
        });
        wait_for_len(&registry, 1).await;

        // chatter from the client is ignored
        client
            .unbounded_send(Ok(Message::Text("hello".into())))
            .unwrap();
        client.unbounded_send(Ok(Message::Ping(vec![1]))).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(registry.len().await, 1);

        client.unbounded_send(Ok(Message::Close(None))).unwrap();
        assert_eq!(task.await.unwrap(), Disconnect::Closed);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn read_error_deregisters() {
        let registry = ConnectionRegistry::new();
        let shutdown = CancellationToken::new();
        let (sink, _out) = channel_sink();
        let (client, frames) = inbound();
        client
            .unbounded_send(Err(axum::Error::new(std::io::Error::from(
                std::io::ErrorKind::ConnectionReset,
            ))))
            .unwrap();

        let reason = serve_observer(&registry, &shutdown, sink, frames).await;

        assert_eq!(reason, Disconnect::ReadError);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn dropped_stream_counts_as_closed() {
        let registry = ConnectionRegistry::new();
        let shutdown = CancellationToken::new();
        let (sink, _out) = channel_sink();
        let (client, frames) = inbound();
        drop(client);

        let reason = serve_observer(&registry, &shutdown, sink, frames).await;

        assert_eq!(reason, Disconnect::Closed);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn shutdown_closes_idle_observers() {
        let registry = ConnectionRegistry::new();
        let shutdown = CancellationToken::new();
        let (sink, mut out) = channel_sink();
        let (_client, frames) = inbound();

        let task = tokio::spawn({
            let registry = registry.clone();
            let shutdown = shutdown.clone();
            async move { serve_observer(&registry, &shutdown, sink, frames).await }
        });
        wait_for_len(&registry, 1).await;

        shutdown.cancel();

        assert_eq!(task.await.unwrap(), Disconnect::Shutdown);
        assert_eq!(registry.len().await, 0);
        assert_eq!(out.next().await, None);
    }
}
