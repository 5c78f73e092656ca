use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A client's subscription information.
pub struct ClientSubscription {
    /// Account uids whose updates this client receives.
    pub accounts: HashSet<String>,
    /// Channel to send messages to the client.
    pub tx: mpsc::UnboundedSender<String>,
}

/// Manages WebSocket clients and their per-account rooms.
///
/// Every client receives market broadcasts; account rooms carry balance
/// changes for one uid.
pub struct RoomManager {
    /// Client subscriptions keyed by client ID.
    pub clients: DashMap<Uuid, ClientSubscription>,
    /// Account rooms: uid -> set of client IDs.
    rooms: DashMap<String, HashSet<Uuid>>,
}

impl RoomManager {
    /// Create a new room manager.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new client.
    pub fn register(&self, tx: mpsc::UnboundedSender<String>) -> Uuid {
        let client_id = Uuid::new_v4();
        self.clients.insert(
            client_id,
            ClientSubscription {
                accounts: HashSet::new(),
                tx,
            },
        );
        client_id
    }

    /// Unregister a client and remove it from all rooms.
    pub fn unregister(&self, client_id: Uuid) {
        if let Some((_, subscription)) = self.clients.remove(&client_id) {
            for uid in subscription.accounts {
                self.leave_room(&uid, client_id);
            }
        }
    }

    /// Join an account room. Returns false if already joined.
    pub fn subscribe(&self, client_id: Uuid, uid: &str) -> bool {
        let Some(mut client) = self.clients.get_mut(&client_id) else {
            return false;
        };
        if !client.accounts.insert(uid.to_string()) {
            return false;
        }

        self.rooms
            .entry(uid.to_string())
            .or_default()
            .insert(client_id);
        true
    }

    /// Leave an account room. Returns false if not joined.
    pub fn unsubscribe(&self, client_id: Uuid, uid: &str) -> bool {
        let Some(mut client) = self.clients.get_mut(&client_id) else {
            return false;
        };
        if !client.accounts.remove(uid) {
            return false;
        }

        drop(client);
        self.leave_room(uid, client_id);
        true
    }

    /// Drop a member; the room goes with its last one.
    fn leave_room(&self, uid: &str, client_id: Uuid) {
        if let Some(mut room) = self.rooms.get_mut(uid) {
            room.remove(&client_id);
        }
        self.rooms.remove_if(uid, |_, room| room.is_empty());
    }

    /// Send to one client.
    pub fn send_to(&self, client_id: Uuid, message: &str) {
        if let Some(client) = self.clients.get(&client_id) {
            let _ = client.tx.send(message.to_string());
        }
    }

    /// Broadcast a message to all clients in an account room.
    pub fn broadcast(&self, uid: &str, message: &str) {
        let client_ids: Vec<Uuid> = self
            .rooms
            .get(uid)
            .map(|room| room.iter().copied().collect())
            .unwrap_or_default();

        for id in client_ids {
            self.send_to(id, message);
        }
    }

    /// Broadcast a message to all connected clients.
    pub fn broadcast_all(&self, message: &str) {
        for client in self.clients.iter() {
            let _ = client.tx.send(message.to_string());
        }
    }

    /// Get the number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Get the number of account rooms with at least one client.
    pub fn room_count(&self) -> usize {
        self.rooms.iter().filter(|r| !r.is_empty()).count()
    }
}

impl Default for RoomManager {
    fn default() -> Self {
        Self {
            clients: DashMap::new(),
            rooms: DashMap::new(),
        }
    }
}
