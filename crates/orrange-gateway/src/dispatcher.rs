use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast, mpsc};
use tracing::debug;
use uuid::Uuid;

use orrange_types::events::GatewayEvent;

/// Process-wide connection registry.
///
/// Maps user ids to their live connection, connections to their outbound
/// queue, and room names to member connections. Delivery is fire-and-forget:
/// an event for a user or room with no live connection is dropped.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Events every connected client receives (presence, post updates)
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    registry: RwLock<Registry>,
}

#[derive(Default)]
struct Registry {
    /// conn_id -> outbound queue
    connections: HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>,

    /// user_id -> conn_id; the newest registration wins
    user_sockets: HashMap<i64, Uuid>,

    /// conn_id -> user_id, for cleanup on disconnect
    socket_users: HashMap<Uuid, i64>,

    /// room -> member conn_ids
    rooms: HashMap<String, HashSet<Uuid>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                registry: RwLock::new(Registry::default()),
            }),
        }
    }

    /// Subscribe to broadcast events.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Send an event to every connected client.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Track a new, not yet registered connection. Returns (conn_id, receiver).
    pub async fn connect(&self) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.registry.write().await.connections.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Bind a connection to a user and announce them online.
    /// A previous connection for the same user stays open but stops
    /// receiving user-targeted events. A connection that re-registers as
    /// someone else releases its old user, who goes offline.
    pub async fn register_user(&self, user_id: i64, conn_id: Uuid) {
        let released = {
            let mut registry = self.inner.registry.write().await;
            if !registry.connections.contains_key(&conn_id) {
                return;
            }
            if let Some(previous) = registry.user_sockets.insert(user_id, conn_id) {
                if previous != conn_id {
                    registry.socket_users.remove(&previous);
                }
            }
            match registry.socket_users.insert(conn_id, user_id) {
                Some(old_user) if old_user != user_id && registry.user_sockets.get(&old_user) == Some(&conn_id) => {
                    registry.user_sockets.remove(&old_user);
                    Some(old_user)
                }
                _ => None,
            }
        };

        if let Some(old_user) = released {
            self.broadcast(GatewayEvent::UserOffline { user_id: old_user });
        }
        self.broadcast(GatewayEvent::UserOnline { user_id });
    }

    /// Drop a connection. Clears the user mapping only if this connection
    /// still owns it, and removes the connection from every room.
    pub async fn disconnect(&self, conn_id: Uuid) {
        let went_offline = {
            let mut registry = self.inner.registry.write().await;
            registry.connections.remove(&conn_id);

            registry.rooms.retain(|_, members| {
                members.remove(&conn_id);
                !members.is_empty()
            });

            match registry.socket_users.remove(&conn_id) {
                Some(user_id) if registry.user_sockets.get(&user_id) == Some(&conn_id) => {
                    registry.user_sockets.remove(&user_id);
                    Some(user_id)
                }
                _ => None,
            }
        };

        if let Some(user_id) = went_offline {
            self.broadcast(GatewayEvent::UserOffline { user_id });
        }
    }

    /// The user currently bound to a connection, if any.
    pub async fn user_for(&self, conn_id: Uuid) -> Option<i64> {
        self.inner.registry.read().await.socket_users.get(&conn_id).copied()
    }

    pub async fn online_users(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .inner
            .registry
            .read()
            .await
            .user_sockets
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    pub async fn is_online(&self, user_id: i64) -> bool {
        self.inner.registry.read().await.user_sockets.contains_key(&user_id)
    }

    /// Send to one connection. Returns whether it was queued.
    pub async fn send_to_connection(&self, conn_id: Uuid, event: GatewayEvent) -> bool {
        let registry = self.inner.registry.read().await;
        match registry.connections.get(&conn_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Send to a user's live connection. Returns whether it was queued;
    /// an unregistered user silently misses the event.
    pub async fn send_to_user(&self, user_id: i64, event: GatewayEvent) -> bool {
        let registry = self.inner.registry.read().await;
        let Some(conn_id) = registry.user_sockets.get(&user_id) else {
            debug!("User {} not connected, dropping event", user_id);
            return false;
        };
        match registry.connections.get(conn_id) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub async fn join_room(&self, conn_id: Uuid, room: &str) {
        let mut registry = self.inner.registry.write().await;
        if registry.connections.contains_key(&conn_id) {
            registry.rooms.entry(room.to_string()).or_default().insert(conn_id);
        }
    }

    pub async fn leave_room(&self, conn_id: Uuid, room: &str) {
        let mut registry = self.inner.registry.write().await;
        if let Some(members) = registry.rooms.get_mut(room) {
            members.remove(&conn_id);
            if members.is_empty() {
                registry.rooms.remove(room);
            }
        }
    }

    /// Send one copy of the event to each member of the room.
    /// Returns the number of connections it was queued for.
    pub async fn emit_to_room(&self, room: &str, event: GatewayEvent) -> usize {
        let registry = self.inner.registry.read().await;
        let Some(members) = registry.rooms.get(room) else {
            return 0;
        };

        members
            .iter()
            .filter_map(|conn_id| registry.connections.get(conn_id))
            .filter(|tx| tx.send(event.clone()).is_ok())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn newest_connection_owns_the_user() {
        let dispatcher = Dispatcher::new();
        let (old_conn, mut old_rx) = dispatcher.connect().await;
        let (new_conn, mut new_rx) = dispatcher.connect().await;

        dispatcher.register_user(7, old_conn).await;
        dispatcher.register_user(7, new_conn).await;

        assert!(dispatcher.send_to_user(7, GatewayEvent::EndCall { from: 1 }).await);
        assert!(new_rx.try_recv().is_ok());
        assert!(old_rx.try_recv().is_err());

        // The stale connection going away must not take the user offline.
        dispatcher.disconnect(old_conn).await;
        assert!(dispatcher.is_online(7).await);

        dispatcher.disconnect(new_conn).await;
        assert!(!dispatcher.is_online(7).await);
    }

    #[tokio::test]
    async fn rebinding_a_connection_releases_the_old_user() {
        let dispatcher = Dispatcher::new();
        let mut events = dispatcher.subscribe();
        let (conn, mut rx) = dispatcher.connect().await;

        dispatcher.register_user(1, conn).await;
        dispatcher.register_user(2, conn).await;

        assert_eq!(dispatcher.online_users().await, vec![2]);
        assert!(!dispatcher.send_to_user(1, GatewayEvent::EndCall { from: 9 }).await);
        assert!(rx.try_recv().is_err());

        let mut offline = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let GatewayEvent::UserOffline { user_id } = event {
                offline.push(user_id);
            }
        }
        assert_eq!(offline, vec![1]);

        dispatcher.disconnect(conn).await;
        assert!(dispatcher.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn unregistered_user_drops_event() {
        let dispatcher = Dispatcher::new();
        assert!(!dispatcher.send_to_user(42, GatewayEvent::EndCall { from: 1 }).await);
    }

    #[tokio::test]
    async fn room_emission_reaches_each_member_once() {
        let dispatcher = Dispatcher::new();
        let (a, mut a_rx) = dispatcher.connect().await;
        let (b, mut b_rx) = dispatcher.connect().await;
        let (_c, mut c_rx) = dispatcher.connect().await;

        dispatcher.join_room(a, "conversation:1").await;
        dispatcher.join_room(a, "conversation:1").await;
        dispatcher.join_room(b, "conversation:1").await;

        let sent = dispatcher
            .emit_to_room("conversation:1", GatewayEvent::UserOnline { user_id: 3 })
            .await;
        assert_eq!(sent, 2);
        assert!(a_rx.try_recv().is_ok());
        assert!(a_rx.try_recv().is_err());
        assert!(b_rx.try_recv().is_ok());
        assert!(c_rx.try_recv().is_err());

        dispatcher.leave_room(b, "conversation:1").await;
        dispatcher.disconnect(a).await;
        let sent = dispatcher
            .emit_to_room("conversation:1", GatewayEvent::UserOnline { user_id: 3 })
            .await;
        assert_eq!(sent, 0);
    }

    #[tokio::test]
    async fn presence_is_broadcast() {
        let dispatcher = Dispatcher::new();
        let mut events = dispatcher.subscribe();
        let (conn, _rx) = dispatcher.connect().await;

        dispatcher.register_user(5, conn).await;
        assert!(matches!(events.recv().await.unwrap(), GatewayEvent::UserOnline { user_id: 5 }));
        assert_eq!(dispatcher.online_users().await, vec![5]);
        assert_eq!(dispatcher.user_for(conn).await, Some(5));

        dispatcher.disconnect(conn).await;
        assert!(matches!(events.recv().await.unwrap(), GatewayEvent::UserOffline { user_id: 5 }));
        assert!(dispatcher.online_users().await.is_empty());
    }
}
