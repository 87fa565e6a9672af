//! Presence publishing: keeps the durable online/last-seen columns in step
//! with the session directory and announces transitions to the org room.
//!
//! Durable writes are best-effort. A failed write is logged and otherwise
//! ignored; it never reaches the client or stops the announcement.

use std::sync::Arc;

use crate::db::store::MemberStore;
use crate::error::StoreError;

use super::events::{EventName, MemberOffline, MemberOnline, ServerEvent};
use super::fanout::GatewayBroadcast;
use super::rooms;
use super::session::{ConnectionIdentity, GatewaySession};

/// Outcome of a best-effort durable write. Callers log it; nobody awaits
/// and propagates it.
pub type PersistOutcome = Result<(), StoreError>;

#[derive(Clone)]
pub struct PresencePublisher {
    store: Arc<dyn MemberStore>,
    broadcast: GatewayBroadcast,
}

impl PresencePublisher {
    pub fn new(store: Arc<dyn MemberStore>, broadcast: GatewayBroadcast) -> Self {
        Self { store, broadcast }
    }

    /// The member's first connection came up: persist and tell everyone else
    /// in the organization.
    pub async fn announce_online(&self, session: &GatewaySession) -> PersistOutcome {
        let identity = &session.identity;
        let outcome = self.persist(identity, true).await;

        self.broadcast.to_room_except(
            rooms::org_room(&identity.org_id),
            &session.connection_id,
            ServerEvent::new(
                EventName::MEMBER_ONLINE,
                MemberOnline {
                    member_id: &identity.member_id,
                    name: &identity.display_name,
                },
            ),
        );

        outcome
    }

    /// Keepalive from an already-online member: refresh last-seen only.
    pub async fn refresh(&self, identity: &ConnectionIdentity) -> PersistOutcome {
        self.persist(identity, true).await
    }

    /// The member's last connection closed.
    pub async fn announce_offline(&self, identity: &ConnectionIdentity) -> PersistOutcome {
        let outcome = self.persist(identity, false).await;

        self.broadcast.to_room(
            rooms::org_room(&identity.org_id),
            ServerEvent::new(
                EventName::MEMBER_OFFLINE,
                MemberOffline {
                    member_id: &identity.member_id,
                },
            ),
        );

        outcome
    }

    async fn persist(&self, identity: &ConnectionIdentity, is_online: bool) -> PersistOutcome {
        let outcome = self.store.set_online(&identity.member_id, is_online).await;
        if let Err(err) = &outcome {
            tracing::warn!(
                member_id = %identity.member_id,
                org_id = %identity.org_id,
                is_online,
                %err,
                "failed to persist presence"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use crate::db::memory::MemoryStore;

    use super::*;

    fn identity() -> ConnectionIdentity {
        ConnectionIdentity {
            member_id: "m1".to_string(),
            org_id: "o1".to_string(),
            display_name: "Ann Lee".to_string(),
            avatar_url: None,
            banned_at: None,
            muted_until: None,
        }
    }

    fn publisher(store: Arc<MemoryStore>) -> (PresencePublisher, GatewayBroadcast) {
        let hub = GatewayBroadcast::new(16);
        (PresencePublisher::new(store, hub.clone()), hub)
    }

    #[tokio::test]
    async fn online_announcement_persists_and_skips_originator() {
        let store = Arc::new(MemoryStore::new());
        let (publisher, hub) = publisher(store.clone());
        let mut rx = hub.subscribe();
        let session = GatewaySession::new(identity());

        publisher.announce_online(&session).await.unwrap();

        assert!(store.is_online("m1"));
        let payload = rx.try_recv().unwrap();
        assert_eq!(payload.event.event, EventName::MEMBER_ONLINE);
        assert_eq!(payload.event.data["memberId"], "m1");
        assert_eq!(payload.event.data["name"], "Ann Lee");
        assert!(!session.should_receive(&payload));
    }

    #[tokio::test]
    async fn offline_announcement_persists() {
        let store = Arc::new(MemoryStore::new());
        let (publisher, hub) = publisher(store.clone());
        let mut rx = hub.subscribe();

        publisher.announce_offline(&identity()).await.unwrap();

        assert!(!store.is_online("m1"));
        assert!(store.last_seen_at("m1").is_some());
        let payload = rx.try_recv().unwrap();
        assert_eq!(payload.event.event, EventName::MEMBER_OFFLINE);
        assert_eq!(payload.event.data, serde_json::json!({ "memberId": "m1" }));
    }

    #[tokio::test]
    async fn refresh_does_not_broadcast() {
        let store = Arc::new(MemoryStore::new());
        let (publisher, hub) = publisher(store.clone());
        let mut rx = hub.subscribe();

        publisher.refresh(&identity()).await.unwrap();

        assert!(store.is_online("m1"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn storage_failure_still_announces() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let (publisher, hub) = publisher(store.clone());
        let mut rx = hub.subscribe();

        assert!(publisher.announce_offline(&identity()).await.is_err());
        assert_eq!(rx.try_recv().unwrap().event.event, EventName::MEMBER_OFFLINE);
    }
}
