//! In-memory store for tests and local runs without Postgres.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::auth::session::hash_token;
use crate::error::StoreError;

use super::store::{MemberRecord, MemberStore, ReadMarker, SessionValidator};

#[derive(Debug, Clone, Default)]
struct PresenceColumns {
    is_online: bool,
    last_seen_at: Option<DateTime<Utc>>,
}

pub struct MemoryStore {
    members: Mutex<HashMap<String, MemberRecord>>,
    presence: Mutex<HashMap<String, PresenceColumns>>,
    /// token hash -> member id
    sessions: Mutex<HashMap<String, String>>,
    legacy_sessions: Mutex<HashMap<String, String>>,
    read_markers: Mutex<HashMap<(String, String), ReadMarker>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            members: Mutex::new(HashMap::new()),
            presence: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            legacy_sessions: Mutex::new(HashMap::new()),
            read_markers: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn insert_member(&self, member: MemberRecord) {
        self.members.lock().insert(member.id.clone(), member);
    }

    /// Issue a current-format session for `member_id` under the raw `token`.
    pub fn insert_session(&self, token: &str, member_id: &str) {
        self.sessions
            .lock()
            .insert(hash_token(token), member_id.to_string());
    }

    /// Issue a legacy-format session for `member_id` under the raw `token`.
    pub fn insert_legacy_session(&self, token: &str, member_id: &str) {
        self.legacy_sessions
            .lock()
            .insert(hash_token(token), member_id.to_string());
    }

    /// Make every subsequent write fail (reads keep working).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn is_online(&self, member_id: &str) -> bool {
        self.presence
            .lock()
            .get(member_id)
            .map(|p| p.is_online)
            .unwrap_or(false)
    }

    pub fn last_seen_at(&self, member_id: &str) -> Option<DateTime<Utc>> {
        self.presence
            .lock()
            .get(member_id)
            .and_then(|p| p.last_seen_at)
    }

    pub fn read_marker(&self, thread_id: &str, member_id: &str) -> Option<ReadMarker> {
        self.read_markers
            .lock()
            .get(&(thread_id.to_string(), member_id.to_string()))
            .cloned()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        Ok(())
    }

    fn resolve(
        &self,
        table: &Mutex<HashMap<String, String>>,
        credential: &str,
    ) -> Option<MemberRecord> {
        let member_id = table.lock().get(&hash_token(credential)).cloned()?;
        self.members.lock().get(&member_id).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionValidator for MemoryStore {
    async fn validate(&self, credential: &str) -> Result<Option<MemberRecord>, StoreError> {
        Ok(self.resolve(&self.sessions, credential))
    }

    async fn validate_legacy(
        &self,
        credential: &str,
    ) -> Result<Option<MemberRecord>, StoreError> {
        Ok(self.resolve(&self.legacy_sessions, credential))
    }
}

#[async_trait]
impl MemberStore for MemoryStore {
    async fn set_online(&self, member_id: &str, is_online: bool) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut presence = self.presence.lock();
        let entry = presence.entry(member_id.to_string()).or_default();
        entry.is_online = is_online;
        entry.last_seen_at = Some(Utc::now());
        Ok(())
    }

    async fn upsert_read_marker(&self, marker: &ReadMarker) -> Result<(), StoreError> {
        self.check_writable()?;
        self.read_markers.lock().insert(
            (marker.thread_id.clone(), marker.member_id.clone()),
            marker.clone(),
        );
        Ok(())
    }
}
