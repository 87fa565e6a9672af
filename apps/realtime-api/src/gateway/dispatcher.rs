//! Per-connection event handling.
//!
//! A [`Dispatcher`] owns one connection's [`GatewaySession`] and turns its
//! inbound [`ClientEvent`]s into state changes and broadcasts. It is driven
//! by the socket loop in `server.rs` but has no knowledge of the transport.

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use tokio::time::Instant;

use crate::db::store::ReadMarker;

use super::directory::Deregistration;
use super::events::{ClientEvent, EventName, ReadReceipt, ServerEvent, TypingUpdate, WireId};
use super::fanout::BroadcastPayload;
use super::rooms;
use super::session::GatewaySession;
use super::typing::ThreadKey;
use super::Gateway;

pub struct Dispatcher {
    gateway: Arc<Gateway>,
    session: GatewaySession,
}

impl Dispatcher {
    pub(crate) fn new(gateway: Arc<Gateway>, session: GatewaySession) -> Self {
        Self { gateway, session }
    }

    pub fn session(&self) -> &GatewaySession {
        &self.session
    }

    pub fn should_deliver(&self, payload: &BroadcastPayload) -> bool {
        self.session.should_receive(payload)
    }

    /// Handle one inbound event. Returns a direct reply for the sender, if
    /// the event has one.
    pub async fn handle(&mut self, event: ClientEvent) -> Option<ServerEvent> {
        match event {
            ClientEvent::Join(requested) => {
                self.join(&requested);
                None
            }
            ClientEvent::Leave(requested) => {
                self.leave(&requested);
                None
            }
            ClientEvent::TypingStart { thread_id } => {
                self.typing_start(&thread_id);
                None
            }
            ClientEvent::TypingStop { thread_id } => {
                self.typing_stop(&thread_id);
                None
            }
            ClientEvent::MessageRead {
                thread_id,
                message_id,
            } => {
                self.message_read(&thread_id, &message_id).await;
                None
            }
            ClientEvent::Ping => Some(self.ping().await),
        }
    }

    fn join(&mut self, requested: &str) {
        match self.session.join(requested) {
            Some(room) => tracing::debug!(
                connection_id = %self.session.connection_id,
                %room,
                "joined room"
            ),
            None => tracing::debug!(
                connection_id = %self.session.connection_id,
                requested,
                "ignoring join for unrecognized room"
            ),
        }
    }

    fn leave(&mut self, requested: &str) {
        if self.session.leave(requested) {
            tracing::debug!(
                connection_id = %self.session.connection_id,
                requested,
                "left room"
            );
        }
    }

    fn typing_start(&self, thread_id: &WireId) {
        let identity = &self.session.identity;
        if identity.is_muted_at(Utc::now()) {
            tracing::debug!(member_id = %identity.member_id, %thread_id, "muted member typing ignored");
            return;
        }

        let key = ThreadKey::new(&identity.org_id, thread_id.clone());
        let version = self
            .gateway
            .typing
            .start(&key, &identity.member_id, Instant::now());

        self.gateway.broadcast.to_room_except(
            rooms::thread_room(&identity.org_id, &thread_id.key()),
            &self.session.connection_id,
            typing_update(thread_id, &identity.member_id, Some(&identity.display_name), true),
        );

        self.schedule_expiry(key, version);
    }

    /// Clear the indicator after the timeout unless it was refreshed or
    /// stopped in the meantime.
    fn schedule_expiry(&self, key: ThreadKey, version: u64) {
        let typing = self.gateway.typing.clone();
        let broadcast = self.gateway.broadcast.clone();
        let member_id = self.session.identity.member_id.clone();
        let connection_id = self.session.connection_id.clone();

        tokio::spawn(async move {
            tokio::time::sleep(typing.timeout()).await;
            if typing.expire(&key, &member_id, version) {
                broadcast.to_room_except(
                    rooms::thread_room(&key.org_id, &key.thread_id.key()),
                    &connection_id,
                    typing_update(&key.thread_id, &member_id, None, false),
                );
            }
        });
    }

    fn typing_stop(&self, thread_id: &WireId) {
        let identity = &self.session.identity;
        self.gateway
            .typing
            .stop(&ThreadKey::new(&identity.org_id, thread_id.clone()), &identity.member_id);

        self.gateway.broadcast.to_room_except(
            rooms::thread_room(&identity.org_id, &thread_id.key()),
            &self.session.connection_id,
            typing_update(thread_id, &identity.member_id, None, false),
        );
    }

    async fn message_read(&self, thread_id: &WireId, message_id: &WireId) {
        let identity = &self.session.identity;
        let marker = ReadMarker {
            thread_id: thread_id.key().into_owned(),
            member_id: identity.member_id.clone(),
            message_id: message_id.key().into_owned(),
            read_at: Utc::now(),
        };

        if let Err(err) = self.gateway.store.upsert_read_marker(&marker).await {
            tracing::warn!(
                member_id = %identity.member_id,
                %thread_id,
                %message_id,
                %err,
                "failed to persist read marker"
            );
            return;
        }

        self.gateway.broadcast.to_room_except(
            rooms::thread_room(&identity.org_id, &thread_id.key()),
            &self.session.connection_id,
            ServerEvent::new(
                EventName::MESSAGE_READ,
                ReadReceipt {
                    thread_id,
                    message_id,
                    member_id: &identity.member_id,
                    read_at: marker.read_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                },
            ),
        );
    }

    async fn ping(&self) -> ServerEvent {
        let _ = self.gateway.presence.refresh(&self.session.identity).await;
        ServerEvent::pong()
    }

    /// Tear down after the socket closed: deregister, announce offline if
    /// this was the member's last connection, and clear their typing
    /// indicators.
    pub async fn disconnect(self) {
        let identity = self.session.identity.clone();
        let connection_id = &self.session.connection_id;

        match self
            .gateway
            .directory
            .deregister(&identity.org_id, &identity.member_id, connection_id)
        {
            Deregistration::WentOffline => {
                let _ = self.gateway.presence.announce_offline(&identity).await;
            }
            Deregistration::StillOnline { remaining } => tracing::debug!(
                member_id = %identity.member_id,
                remaining,
                "member still online on other connections"
            ),
            Deregistration::Unknown => tracing::warn!(
                %connection_id,
                member_id = %identity.member_id,
                "disconnect for unregistered connection"
            ),
        }

        for thread_id in self
            .gateway
            .typing
            .clear_member(&identity.org_id, &identity.member_id)
        {
            self.gateway.broadcast.to_room(
                rooms::thread_room(&identity.org_id, &thread_id.key()),
                typing_update(&thread_id, &identity.member_id, None, false),
            );
        }

        tracing::info!(
            %connection_id,
            member_id = %identity.member_id,
            org_id = %identity.org_id,
            "gateway connection closed"
        );
    }
}

fn typing_update(thread_id: &WireId, member_id: &str, name: Option<&str>, is_typing: bool) -> ServerEvent {
    ServerEvent::new(
        EventName::TYPING_UPDATE,
        TypingUpdate {
            thread_id,
            member_id,
            name,
            is_typing,
        },
    )
}
