//! Typing indicator registry with timestamp-based expiry.
//!
//! Every `start` stamps the (thread, member) entry with a fresh version from
//! a global counter. Expiry timers carry the version they were scheduled for
//! and only clear the entry if it still holds that version, so a refreshed
//! indicator is never cleared by an older timer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use super::events::WireId;

/// Default lifetime of an indicator without a fresh `typing:start`.
pub const TYPING_TIMEOUT: Duration = Duration::from_secs(5);

/// A thread, scoped to its organization. The thread id keeps the JSON type
/// the client used so cleared indicators echo it unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadKey {
    pub org_id: String,
    pub thread_id: WireId,
}

impl ThreadKey {
    pub fn new(org_id: &str, thread_id: impl Into<WireId>) -> Self {
        Self {
            org_id: org_id.to_string(),
            thread_id: thread_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TypingEntry {
    started_at: Instant,
    version: u64,
}

pub struct TypingRegistry {
    threads: DashMap<ThreadKey, HashMap<String, TypingEntry>>,
    next_version: AtomicU64,
    timeout: Duration,
}

impl TypingRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            threads: DashMap::new(),
            next_version: AtomicU64::new(1),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record (or refresh) an indicator. Returns the version an expiry timer
    /// must present to [`TypingRegistry::expire`].
    pub fn start(&self, key: &ThreadKey, member_id: &str, now: Instant) -> u64 {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        self.threads.entry(key.clone()).or_default().insert(
            member_id.to_string(),
            TypingEntry {
                started_at: now,
                version,
            },
        );
        version
    }

    /// Remove an indicator. Returns whether one was present.
    pub fn stop(&self, key: &ThreadKey, member_id: &str) -> bool {
        self.remove_where(key, member_id, |_| true)
    }

    /// Timer callback: remove the indicator only if it was not refreshed
    /// since the timer for `version` was scheduled.
    pub fn expire(&self, key: &ThreadKey, member_id: &str, version: u64) -> bool {
        self.remove_where(key, member_id, |entry| entry.version == version)
    }

    /// Whether the member is typing at `now`. Entries older than the timeout
    /// count as not typing even before their timer fires.
    pub fn is_typing(&self, key: &ThreadKey, member_id: &str, now: Instant) -> bool {
        self.threads
            .get(key)
            .and_then(|members| members.get(member_id).copied())
            .map(|entry| self.is_live(entry, now))
            .unwrap_or(false)
    }

    /// Members with a live indicator in the thread, sorted.
    pub fn typing_members(&self, key: &ThreadKey, now: Instant) -> Vec<String> {
        let mut ids: Vec<String> = self
            .threads
            .get(key)
            .map(|members| {
                members
                    .iter()
                    .filter(|(_, entry)| self.is_live(**entry, now))
                    .map(|(id, _)| id.clone())
                    .collect()
            })
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Drop every indicator the member holds in the organization. Returns the
    /// affected thread ids so the caller can announce `isTyping=false`.
    pub fn clear_member(&self, org_id: &str, member_id: &str) -> Vec<WireId> {
        let mut cleared = Vec::new();
        self.threads.retain(|key, members| {
            if key.org_id == org_id && members.remove(member_id).is_some() {
                cleared.push(key.thread_id.clone());
            }
            !members.is_empty()
        });
        cleared.sort_by(|a, b| a.key().cmp(&b.key()));
        cleared
    }

    fn is_live(&self, entry: TypingEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.started_at) < self.timeout
    }

    fn remove_where(
        &self,
        key: &ThreadKey,
        member_id: &str,
        predicate: impl FnOnce(&TypingEntry) -> bool,
    ) -> bool {
        let (removed, thread_empty) = {
            let Some(mut members) = self.threads.get_mut(key) else {
                return false;
            };
            let removed = members.get(member_id).is_some_and(predicate);
            if removed {
                members.remove(member_id);
            }
            (removed, members.is_empty())
        };

        if thread_empty {
            self.threads.remove_if(key, |_, members| members.is_empty());
        }
        removed
    }
}

impl Default for TypingRegistry {
    fn default() -> Self {
        Self::new(TYPING_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(thread: &str) -> ThreadKey {
        ThreadKey::new("o1", thread)
    }

    #[test]
    fn start_then_stop() {
        let reg = TypingRegistry::default();
        let now = Instant::now();

        reg.start(&key("t1"), "m1", now);
        assert!(reg.is_typing(&key("t1"), "m1", now));

        assert!(reg.stop(&key("t1"), "m1"));
        assert!(!reg.is_typing(&key("t1"), "m1", now));
        // Idempotent.
        assert!(!reg.stop(&key("t1"), "m1"));
    }

    #[test]
    fn stale_timer_does_not_clear_refreshed_indicator() {
        let reg = TypingRegistry::default();
        let now = Instant::now();

        let first = reg.start(&key("t1"), "m1", now);
        let second = reg.start(&key("t1"), "m1", now + Duration::from_secs(3));
        assert!(second > first);

        assert!(!reg.expire(&key("t1"), "m1", first));
        assert!(reg.is_typing(&key("t1"), "m1", now + Duration::from_secs(5)));

        assert!(reg.expire(&key("t1"), "m1", second));
        assert!(!reg.is_typing(&key("t1"), "m1", now + Duration::from_secs(5)));
    }

    #[test]
    fn expired_entries_read_as_not_typing_without_a_timer() {
        let reg = TypingRegistry::default();
        let now = Instant::now();
        reg.start(&key("t1"), "m1", now);
        reg.start(&key("t1"), "m2", now + Duration::from_secs(4));

        let later = now + TYPING_TIMEOUT;
        assert!(!reg.is_typing(&key("t1"), "m1", later));
        assert_eq!(reg.typing_members(&key("t1"), later), vec!["m2"]);
    }

    #[test]
    fn clear_member_only_touches_that_member_in_that_org() {
        let reg = TypingRegistry::default();
        let now = Instant::now();
        reg.start(&key("t1"), "m1", now);
        reg.start(&key("t2"), "m1", now);
        reg.start(&key("t2"), "m2", now);
        reg.start(&ThreadKey::new("o2", "t3"), "m1", now);

        assert_eq!(reg.clear_member("o1", "m1"), vec!["t1", "t2"]);
        assert!(!reg.is_typing(&key("t1"), "m1", now));
        assert!(reg.is_typing(&key("t2"), "m2", now));
        assert!(reg.is_typing(&ThreadKey::new("o2", "t3"), "m1", now));
        assert!(reg.clear_member("o1", "m1").is_empty());
    }

    #[test]
    fn cleared_threads_keep_their_wire_type() {
        let reg = TypingRegistry::default();
        reg.start(&ThreadKey::new("o1", 42u64), "m1", Instant::now());

        let cleared = reg.clear_member("o1", "m1");
        assert_eq!(serde_json::to_value(&cleared).unwrap(), serde_json::json!([42]));
    }

    #[test]
    fn emptied_threads_are_dropped() {
        let reg = TypingRegistry::default();
        let version = reg.start(&key("t1"), "m1", Instant::now());
        reg.expire(&key("t1"), "m1", version);
        assert!(reg.threads.is_empty());
    }
}
