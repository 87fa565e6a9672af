//! Per-connection gateway session state.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use villagekeep_common::id::{prefix, prefixed_ulid};

use crate::db::store::MemberRecord;

use super::fanout::{BroadcastPayload, Target};
use super::rooms;

/// Who is on the other end of a connection. Built once at admission and
/// shared read-only with every handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIdentity {
    pub member_id: String,
    pub org_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub banned_at: Option<DateTime<Utc>>,
    pub muted_until: Option<DateTime<Utc>>,
}

impl ConnectionIdentity {
    pub fn is_banned(&self) -> bool {
        self.banned_at.is_some()
    }

    /// Muted members may connect and read but not emit typing signals.
    pub fn is_muted_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.muted_until, Some(until) if until > now)
    }
}

impl From<MemberRecord> for ConnectionIdentity {
    fn from(member: MemberRecord) -> Self {
        let display_name = member.display_name();
        Self {
            member_id: member.id,
            org_id: member.org_id,
            display_name,
            avatar_url: member.avatar_url,
            banned_at: member.banned_at,
            muted_until: member.muted_until,
        }
    }
}

/// State for a single WebSocket connection.
pub struct GatewaySession {
    /// Unique connection identifier (`conn_` prefixed ULID).
    pub connection_id: String,
    pub identity: Arc<ConnectionIdentity>,
    /// Namespaced room names this connection receives room broadcasts for.
    rooms: HashSet<String>,
}

impl GatewaySession {
    /// Create a session already placed in its organization room.
    pub fn new(identity: ConnectionIdentity) -> Self {
        let mut joined = HashSet::new();
        joined.insert(rooms::org_room(&identity.org_id));
        Self {
            connection_id: prefixed_ulid(prefix::CONNECTION),
            identity: Arc::new(identity),
            rooms: joined,
        }
    }

    /// Join a client-requested topic. Returns the namespaced room on success,
    /// `None` if the topic prefix is not recognized.
    pub fn join(&mut self, requested: &str) -> Option<String> {
        let room = rooms::scoped_room(&self.identity.org_id, requested)?;
        self.rooms.insert(room.clone());
        Some(room)
    }

    /// Leave a client-requested topic. Leaving a room not joined is a no-op.
    pub fn leave(&mut self, requested: &str) -> bool {
        match rooms::scoped_room(&self.identity.org_id, requested) {
            Some(room) => self.rooms.remove(&room),
            None => false,
        }
    }

    pub fn is_in_room(&self, room: &str) -> bool {
        self.rooms.contains(room)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &str> {
        self.rooms.iter().map(String::as_str)
    }

    /// Check whether a fanned-out payload is addressed to this connection.
    pub fn should_receive(&self, payload: &BroadcastPayload) -> bool {
        if payload.except.as_deref() == Some(self.connection_id.as_str()) {
            return false;
        }
        match &payload.target {
            Target::Room(room) => self.rooms.contains(room),
            Target::Connection(id) => *id == self.connection_id,
        }
    }
}
