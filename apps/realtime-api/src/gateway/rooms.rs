//! Room naming. Every room is namespaced by organization so that two
//! tenants asking for the same bare topic never share a broadcast group.

/// Topic prefixes a client may join beyond its organization room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Forum,
    Post,
    Thread,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Forum => "forum",
            Topic::Post => "post",
            Topic::Thread => "thread",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "forum" => Some(Topic::Forum),
            "post" => Some(Topic::Post),
            "thread" => Some(Topic::Thread),
            _ => None,
        }
    }
}

/// The organization root room: `org:{org_id}`.
pub fn org_room(org_id: &str) -> String {
    format!("org:{org_id}")
}

/// A topic sub-room: `{org_id}:{topic}:{topic_id}`.
pub fn topic_room(org_id: &str, topic: Topic, topic_id: &str) -> String {
    format!("{org_id}:{}:{topic_id}", topic.as_str())
}

pub fn forum_room(org_id: &str, forum_id: &str) -> String {
    topic_room(org_id, Topic::Forum, forum_id)
}

pub fn post_room(org_id: &str, post_id: &str) -> String {
    topic_room(org_id, Topic::Post, post_id)
}

pub fn thread_room(org_id: &str, thread_id: &str) -> String {
    topic_room(org_id, Topic::Thread, thread_id)
}

/// Resolve a client-requested topic (`"thread:42"`) to its namespaced room.
///
/// Returns `None` for unrecognized prefixes or an empty topic id.
pub fn scoped_room(org_id: &str, requested: &str) -> Option<String> {
    let (prefix, topic_id) = requested.split_once(':')?;
    let topic = Topic::from_prefix(prefix)?;
    if topic_id.is_empty() {
        return None;
    }
    Some(topic_room(org_id, topic, topic_id))
}
