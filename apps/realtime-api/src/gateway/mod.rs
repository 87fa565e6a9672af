//! Real-time gateway: presence, rooms, typing indicators and push delivery.
//!
//! All mutable state lives in [`Gateway`], which is constructed once and
//! shared through `AppState`; nothing here is a process-wide singleton.

pub mod broadcast;
pub mod directory;
pub mod dispatcher;
pub mod events;
pub mod fanout;
pub mod gatekeeper;
pub mod presence;
pub mod rooms;
pub mod server;
pub mod session;
pub mod typing;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast as channel;

use crate::config::Config;
use crate::db::store::MemberStore;

use directory::{Registration, SessionDirectory};
use dispatcher::Dispatcher;
use events::{EventName, ServerEvent};
use fanout::{BroadcastPayload, GatewayBroadcast};
use presence::PresencePublisher;
use session::{ConnectionIdentity, GatewaySession};
use typing::{TypingRegistry, TYPING_TIMEOUT};

/// Tunables for the gateway's in-memory state.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub typing_timeout: Duration,
    pub broadcast_capacity: usize,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            typing_timeout: TYPING_TIMEOUT,
            broadcast_capacity: 4096,
        }
    }
}

impl From<&Config> for GatewaySettings {
    fn from(config: &Config) -> Self {
        Self {
            typing_timeout: config.typing_timeout,
            broadcast_capacity: config.broadcast_capacity,
        }
    }
}

pub struct Gateway {
    directory: SessionDirectory,
    typing: Arc<TypingRegistry>,
    broadcast: GatewayBroadcast,
    presence: PresencePublisher,
    store: Arc<dyn MemberStore>,
}

/// An admitted connection: its dispatcher, its feed of fanned-out payloads,
/// and the roster greeting to send first.
pub struct GatewayConnection {
    pub dispatcher: Dispatcher,
    pub events: channel::Receiver<Arc<BroadcastPayload>>,
    pub greeting: ServerEvent,
}

impl GatewayConnection {
    /// Drain every payload already queued for this connection without
    /// waiting, keeping only those addressed to it.
    pub fn pending_events(&mut self) -> Vec<ServerEvent> {
        let mut delivered = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(payload) => {
                    if self.dispatcher.should_deliver(&payload) {
                        delivered.push(payload.event.clone());
                    }
                }
                Err(channel::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        delivered
    }
}

impl Gateway {
    pub fn new(store: Arc<dyn MemberStore>, settings: GatewaySettings) -> Self {
        let broadcast = GatewayBroadcast::new(settings.broadcast_capacity);
        Self {
            directory: SessionDirectory::new(),
            typing: Arc::new(TypingRegistry::new(settings.typing_timeout)),
            presence: PresencePublisher::new(store.clone(), broadcast.clone()),
            broadcast,
            store,
        }
    }

    pub fn directory(&self) -> &SessionDirectory {
        &self.directory
    }

    pub fn typing(&self) -> &TypingRegistry {
        &self.typing
    }

    /// Admit an authenticated connection: register it, announce the member
    /// if this is their first connection, and build the roster greeting.
    pub async fn connect(self: &Arc<Self>, identity: ConnectionIdentity) -> GatewayConnection {
        let session = GatewaySession::new(identity);

        // Subscribe before announcing so nothing addressed to us is missed.
        let events = self.broadcast.subscribe();

        let registration = self
            .directory
            .register(&session.identity, &session.connection_id);
        let _ = match registration {
            Registration::FirstConnection => self.presence.announce_online(&session).await,
            Registration::AdditionalConnection => self.presence.refresh(&session.identity).await,
        };

        let roster = self.directory.list_online_members(&session.identity.org_id);

        tracing::info!(
            connection_id = %session.connection_id,
            member_id = %session.identity.member_id,
            org_id = %session.identity.org_id,
            online = roster.len(),
            "gateway connection established"
        );

        GatewayConnection {
            dispatcher: Dispatcher::new(self.clone(), session),
            events,
            greeting: ServerEvent::new(EventName::MEMBERS_ONLINE, roster),
        }
    }
}
