//! Fan-out hub for pushing events to connected sessions.
//!
//! Uses a single `tokio::sync::broadcast` channel. Each connected session
//! subscribes and filters payloads locally against its own joined rooms and
//! connection id, so room membership lives with the connection that owns it.

use std::sync::Arc;

use tokio::sync::broadcast;

use super::events::ServerEvent;

/// Where a payload should be delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Every connection that has joined the (namespaced) room.
    Room(String),
    /// One specific connection.
    Connection(String),
}

/// A payload fanned out to all connected gateway sessions.
#[derive(Debug, Clone)]
pub struct BroadcastPayload {
    pub target: Target,
    /// Connection id that must not receive this payload (the originator).
    pub except: Option<String>,
    pub event: ServerEvent,
}

/// The fan-out hub. Cloneable; every clone feeds the same channel.
#[derive(Clone)]
pub struct GatewayBroadcast {
    sender: broadcast::Sender<Arc<BroadcastPayload>>,
}

impl GatewayBroadcast {
    /// Slow receivers that fall behind `capacity` payloads skip messages
    /// (`RecvError::Lagged`).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to the channel. Each gateway session calls this once to get
    /// its own receiver.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BroadcastPayload>> {
        self.sender.subscribe()
    }

    pub fn dispatch(&self, payload: BroadcastPayload) {
        // Err only means nobody is connected.
        let _ = self.sender.send(Arc::new(payload));
    }

    pub fn to_room(&self, room: String, event: ServerEvent) {
        self.dispatch(BroadcastPayload {
            target: Target::Room(room),
            except: None,
            event,
        });
    }

    /// Room broadcast that skips the originating connection.
    pub fn to_room_except(&self, room: String, except: &str, event: ServerEvent) {
        self.dispatch(BroadcastPayload {
            target: Target::Room(room),
            except: Some(except.to_string()),
            event,
        });
    }

    pub fn to_connection(&self, connection_id: &str, event: ServerEvent) {
        self.dispatch(BroadcastPayload {
            target: Target::Connection(connection_id.to_string()),
            except: None,
            event,
        });
    }
}
