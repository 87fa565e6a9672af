//! Storage collaborators the gateway depends on.
//!
//! Backed by Postgres in production ([`super::postgres::PgStore`]) and an
//! in-memory map in tests ([`super::memory::MemoryStore`]).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// A member resolved from a session credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRecord {
    pub id: String,
    pub org_id: String,
    pub first_name: String,
    pub last_name: String,
    pub avatar_url: Option<String>,
    pub banned_at: Option<DateTime<Utc>>,
    pub muted_until: Option<DateTime<Utc>>,
}

impl MemberRecord {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Last message a member has read in a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMarker {
    pub thread_id: String,
    pub member_id: String,
    pub message_id: String,
    pub read_at: DateTime<Utc>,
}

/// Resolves session credentials to members.
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Look the credential up in the current session table.
    async fn validate(&self, credential: &str) -> Result<Option<MemberRecord>, StoreError>;

    /// Look the credential up in the legacy session table.
    async fn validate_legacy(&self, credential: &str)
        -> Result<Option<MemberRecord>, StoreError>;
}

/// Durable member presence and read-marker writes.
#[async_trait]
pub trait MemberStore: Send + Sync {
    /// Set the member's online flag and stamp `last_seen_at = now`.
    async fn set_online(&self, member_id: &str, is_online: bool) -> Result<(), StoreError>;

    /// Insert or replace the (thread, member) read marker.
    async fn upsert_read_marker(&self, marker: &ReadMarker) -> Result<(), StoreError>;
}
