//! In-memory directory of live connections per member.
//!
//! Presence is per-**member**, not per-connection. A member is online iff
//! they have at least one registered connection; several tabs never cause a
//! spurious offline transition.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use serde::Serialize;

use super::session::ConnectionIdentity;

/// Per-member presence state.
struct MemberPresence {
    display_name: String,
    avatar_url: Option<String>,
    /// Never empty: the entry is removed with its last connection.
    connections: HashSet<String>,
}

/// One entry of the `members:online` roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineMember {
    pub member_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The member had no connections before this one.
    FirstConnection,
    AdditionalConnection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deregistration {
    /// The member still has `remaining` connections.
    StillOnline { remaining: usize },
    /// That was the member's last connection.
    WentOffline,
    /// The connection was not registered.
    Unknown,
}

/// Thread-safe, DashMap-backed session directory keyed by organization.
///
/// Each organization is one shard entry, so a register/deregister observes
/// and mutates a member's connection set atomically.
pub struct SessionDirectory {
    orgs: DashMap<String, HashMap<String, MemberPresence>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self {
            orgs: DashMap::new(),
        }
    }

    /// Add a connection to the member's entry, creating the entry if absent.
    pub fn register(&self, identity: &ConnectionIdentity, connection_id: &str) -> Registration {
        let mut members = self.orgs.entry(identity.org_id.clone()).or_default();
        let entry = members
            .entry(identity.member_id.clone())
            .or_insert_with(|| MemberPresence {
                display_name: identity.display_name.clone(),
                avatar_url: identity.avatar_url.clone(),
                connections: HashSet::new(),
            });

        let first = entry.connections.is_empty();
        entry.connections.insert(connection_id.to_string());

        if first {
            Registration::FirstConnection
        } else {
            Registration::AdditionalConnection
        }
    }

    /// Remove a connection. Reports `WentOffline` exactly once per member,
    /// on the removal that empties their connection set.
    pub fn deregister(&self, org_id: &str, member_id: &str, connection_id: &str) -> Deregistration {
        let (outcome, org_empty) = {
            let Some(mut members) = self.orgs.get_mut(org_id) else {
                return Deregistration::Unknown;
            };

            let outcome = match members.get_mut(member_id) {
                Some(entry) => {
                    if !entry.connections.remove(connection_id) {
                        Deregistration::Unknown
                    } else if entry.connections.is_empty() {
                        members.remove(member_id);
                        Deregistration::WentOffline
                    } else {
                        Deregistration::StillOnline {
                            remaining: entry.connections.len(),
                        }
                    }
                }
                None => Deregistration::Unknown,
            };

            (outcome, members.is_empty())
        };

        if org_empty {
            self.orgs.remove_if(org_id, |_, members| members.is_empty());
        }

        outcome
    }

    pub fn is_online(&self, org_id: &str, member_id: &str) -> bool {
        self.orgs
            .get(org_id)
            .map(|members| members.contains_key(member_id))
            .unwrap_or(false)
    }

    /// Number of distinct members online in the organization.
    pub fn online_count(&self, org_id: &str) -> usize {
        self.orgs.get(org_id).map(|members| members.len()).unwrap_or(0)
    }

    /// Members currently present, sorted by name then id.
    pub fn list_online_members(&self, org_id: &str) -> Vec<OnlineMember> {
        let mut roster: Vec<OnlineMember> = self
            .orgs
            .get(org_id)
            .map(|members| {
                members
                    .iter()
                    .map(|(member_id, presence)| OnlineMember {
                        member_id: member_id.clone(),
                        name: presence.display_name.clone(),
                        avatar_url: presence.avatar_url.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        roster.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.member_id.cmp(&b.member_id)));
        roster
    }

    /// Every live connection id of a member.
    pub fn connections_of(&self, org_id: &str, member_id: &str) -> Vec<String> {
        self.orgs
            .get(org_id)
            .and_then(|members| {
                members
                    .get(member_id)
                    .map(|entry| entry.connections.iter().cloned().collect())
            })
            .unwrap_or_default()
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new()
    }
}
