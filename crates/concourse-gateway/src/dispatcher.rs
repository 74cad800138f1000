use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

use concourse_types::events::GatewayEvent;

/// Fan-out hub: container-scoped events go out over a broadcast channel
/// (each connection filters by its own subscription set), targeted events
/// go over per-user channels.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events; every connection receives the
    /// stream and drops what it is not subscribed to.
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Per-user targeted send channels: user_id -> (conn_id, sender)
    user_channels: RwLock<HashMap<Uuid, (Uuid, mpsc::UnboundedSender<GatewayEvent>)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to the event stream. Returns a broadcast receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Publish an event to all connections. Fire-and-forget: delivery is
    /// at-least-once for live subscribers and clients reconcile by id.
    pub fn publish(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Register a per-user targeted channel. Returns (conn_id, receiver).
    pub async fn register_user_channel(
        &self,
        user_id: Uuid,
    ) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .insert(user_id, (conn_id, tx));
        (conn_id, rx)
    }

    /// Unregister a per-user targeted channel, but only if conn_id matches.
    /// A stale disconnect must not tear down a newer connection.
    pub async fn unregister_user_channel(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some((stored_conn_id, _)) = channels.get(&user_id) {
            if *stored_conn_id == conn_id {
                channels.remove(&user_id);
            }
        }
    }

    /// Send a targeted event to a specific user, if they are connected.
    pub async fn send_to_user(&self, user_id: Uuid, event: GatewayEvent) {
        let channels = self.inner.user_channels.read().await;
        if let Some((_, tx)) = channels.get(&user_id) {
            let _ = tx.send(event);
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concourse_types::events::GatewayEvent;

    #[tokio::test]
    async fn published_events_reach_subscribers() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        let user_id = Uuid::new_v4();
        dispatcher.publish(GatewayEvent::Ready { user_id });

        match rx.recv().await.unwrap() {
            GatewayEvent::Ready { user_id: got } => assert_eq!(got, user_id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn targeted_sends_only_reach_the_recipient() {
        let dispatcher = Dispatcher::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let (_conn_a, mut rx_a) = dispatcher.register_user_channel(alice).await;
        let (_conn_b, mut rx_b) = dispatcher.register_user_channel(bob).await;

        dispatcher
            .send_to_user(alice, GatewayEvent::Ready { user_id: alice })
            .await;

        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn stale_disconnect_does_not_unregister_newer_connection() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (old_conn, _old_rx) = dispatcher.register_user_channel(user).await;
        let (_new_conn, mut new_rx) = dispatcher.register_user_channel(user).await;

        // The old connection's teardown races in after the reconnect.
        dispatcher.unregister_user_channel(user, old_conn).await;

        dispatcher
            .send_to_user(user, GatewayEvent::Ready { user_id: user })
            .await;
        assert!(new_rx.recv().await.is_some());
    }
}
