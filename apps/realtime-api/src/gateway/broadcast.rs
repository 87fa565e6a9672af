//! Server-initiated pushes. Called by the platform's REST handlers after a
//! successful write; none of these touch durable storage.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::events::{EventName, MessageNotification, ServerEvent};
use super::rooms;
use super::Gateway;

/// Characters of a message body carried in a notification preview.
pub const PREVIEW_CHARS: usize = 100;

/// A direct message as handed over by the messaging service. Fields besides
/// `body` and `sender_name` are passed through to clients untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectMessage {
    pub body: String,
    pub sender_name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// First [`PREVIEW_CHARS`] characters of `body`, never splitting a character.
pub fn preview(body: &str) -> String {
    body.chars().take(PREVIEW_CHARS).collect()
}

// Forum activity goes to the whole organization, carrying the ids needed to
// locate the item, and to the scoped room without the id that names it.
impl Gateway {
    pub fn broadcast_new_post(&self, org_id: &str, forum_id: &str, post: Value) {
        self.broadcast.to_room(
            rooms::org_room(org_id),
            ServerEvent::new(
                EventName::POST_NEW,
                json!({ "forumId": forum_id, "post": &post }),
            ),
        );
        self.broadcast.to_room(
            rooms::forum_room(org_id, forum_id),
            ServerEvent::new(EventName::POST_NEW, json!({ "post": post })),
        );
    }

    pub fn broadcast_new_reply(&self, org_id: &str, post_id: &str, reply: Value) {
        self.broadcast.to_room(
            rooms::org_room(org_id),
            ServerEvent::new(
                EventName::REPLY_NEW,
                json!({ "postId": post_id, "reply": &reply }),
            ),
        );
        self.broadcast.to_room(
            rooms::post_room(org_id, post_id),
            ServerEvent::new(EventName::REPLY_NEW, json!({ "reply": reply })),
        );
    }

    pub fn broadcast_like(
        &self,
        org_id: &str,
        post_id: &str,
        member_id: &str,
        liked: bool,
        like_count: u64,
    ) {
        self.broadcast.to_room(
            rooms::org_room(org_id),
            ServerEvent::new(
                EventName::POST_LIKE,
                json!({
                    "postId": post_id,
                    "memberId": member_id,
                    "liked": liked,
                    "likeCount": like_count,
                }),
            ),
        );
        self.broadcast.to_room(
            rooms::post_room(org_id, post_id),
            ServerEvent::new(
                EventName::POST_LIKE,
                json!({ "memberId": member_id, "liked": liked, "likeCount": like_count }),
            ),
        );
    }

    pub fn broadcast_post_deleted(&self, org_id: &str, forum_id: &str, post_id: &str) {
        self.broadcast.to_room(
            rooms::org_room(org_id),
            ServerEvent::new(
                EventName::POST_DELETED,
                json!({ "forumId": forum_id, "postId": post_id }),
            ),
        );
        self.broadcast.to_room(
            rooms::forum_room(org_id, forum_id),
            ServerEvent::new(EventName::POST_DELETED, json!({ "postId": post_id })),
        );
    }

    /// Also pushed to anyone viewing the post itself.
    pub fn broadcast_post_updated(
        &self,
        org_id: &str,
        forum_id: &str,
        post_id: &str,
        updates: Value,
    ) {
        self.broadcast.to_room(
            rooms::org_room(org_id),
            ServerEvent::new(
                EventName::POST_UPDATED,
                json!({ "forumId": forum_id, "postId": post_id, "updates": &updates }),
            ),
        );
        self.broadcast.to_room(
            rooms::forum_room(org_id, forum_id),
            ServerEvent::new(
                EventName::POST_UPDATED,
                json!({ "postId": post_id, "updates": &updates }),
            ),
        );
        self.broadcast.to_room(
            rooms::post_room(org_id, post_id),
            ServerEvent::new(EventName::POST_UPDATED, json!({ "updates": updates })),
        );
    }

    /// Deliver a new message to the open thread and a notification to every
    /// connection of each recipient, whether or not they have the thread open.
    pub fn broadcast_message(
        &self,
        org_id: &str,
        thread_id: &str,
        message: &DirectMessage,
        recipient_ids: &[String],
    ) {
        self.broadcast.to_room(
            rooms::thread_room(org_id, thread_id),
            ServerEvent::new(
                EventName::MESSAGE_NEW,
                json!({ "threadId": thread_id, "message": message }),
            ),
        );

        let notification = ServerEvent::new(
            EventName::MESSAGE_NOTIFICATION,
            MessageNotification {
                thread_id,
                preview: preview(&message.body),
                sender_name: &message.sender_name,
            },
        );

        let mut seen = HashSet::new();
        for recipient in recipient_ids.iter().filter(|id| seen.insert(id.as_str())) {
            for connection_id in self.directory.connections_of(org_id, recipient) {
                self.broadcast
                    .to_connection(&connection_id, notification.clone());
            }
        }
    }

    /// Offline members receive nothing; the notification is already durable
    /// elsewhere.
    pub fn broadcast_notification(&self, org_id: &str, member_id: &str, notification: Value) {
        let event = ServerEvent::new(EventName::NOTIFICATION_NEW, notification);
        for connection_id in self.directory.connections_of(org_id, member_id) {
            self.broadcast.to_connection(&connection_id, event.clone());
        }
    }

    pub fn online_count(&self, org_id: &str) -> usize {
        self.directory.online_count(org_id)
    }

    pub fn is_member_online(&self, org_id: &str, member_id: &str) -> bool {
        self.directory.is_online(org_id, member_id)
    }
}
