//! Postgres-backed implementation of the storage collaborators.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sql_types::Text;
use uuid::Uuid;

use crate::auth::session::hash_token;
use crate::error::StoreError;
use crate::models::member::MemberRow;
use crate::models::read_marker::NewReadMarker;

use super::pool::DbPool;
use super::schema::{members, message_read_status};
use super::store::{MemberRecord, MemberStore, ReadMarker, SessionValidator};

const MEMBER_SESSION_LOOKUP: &str = "\
    SELECT m.id, m.org_id, m.first_name, m.last_name, m.profile_photo_url, \
           m.community_banned_at, m.community_muted_until \
    FROM members m \
    JOIN member_sessions ms ON ms.member_id = m.id \
    WHERE ms.token_hash = $1 \
      AND ms.expires_at > NOW() \
      AND ms.revoked_at IS NULL \
    LIMIT 1";

const LEGACY_SESSION_LOOKUP: &str = "\
    SELECT m.id, m.org_id, m.first_name, m.last_name, m.profile_photo_url, \
           m.community_banned_at, m.community_muted_until \
    FROM members m \
    JOIN sessions s ON s.member_id = m.id \
    WHERE s.token_hash = $1 \
      AND s.expires_at > NOW() \
    LIMIT 1";

#[derive(Clone)]
pub struct PgStore {
    db: DbPool,
}

impl PgStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    async fn lookup(
        &self,
        query: &'static str,
        credential: &str,
    ) -> Result<Option<MemberRecord>, StoreError> {
        let token_hash = hash_token(credential);
        let mut conn = self.db.get().await?;

        let rows: Vec<MemberRow> = diesel_async::RunQueryDsl::load(
            diesel::sql_query(query).bind::<Text, _>(&token_hash),
            &mut conn,
        )
        .await?;

        Ok(rows.into_iter().next().map(MemberRecord::from))
    }
}

#[async_trait]
impl SessionValidator for PgStore {
    async fn validate(&self, credential: &str) -> Result<Option<MemberRecord>, StoreError> {
        self.lookup(MEMBER_SESSION_LOOKUP, credential).await
    }

    async fn validate_legacy(
        &self,
        credential: &str,
    ) -> Result<Option<MemberRecord>, StoreError> {
        self.lookup(LEGACY_SESSION_LOOKUP, credential).await
    }
}

#[async_trait]
impl MemberStore for PgStore {
    async fn set_online(&self, member_id: &str, is_online: bool) -> Result<(), StoreError> {
        let member_id = Uuid::parse_str(member_id)?;
        let mut conn = self.db.get().await?;

        diesel_async::RunQueryDsl::execute(
            diesel::update(members::table.find(member_id)).set((
                members::is_online.eq(is_online),
                members::last_seen_at.eq(Some(Utc::now())),
            )),
            &mut conn,
        )
        .await?;

        Ok(())
    }

    async fn upsert_read_marker(&self, marker: &ReadMarker) -> Result<(), StoreError> {
        let row = NewReadMarker::try_from(marker)?;
        let mut conn = self.db.get().await?;

        diesel_async::RunQueryDsl::execute(
            diesel::insert_into(message_read_status::table)
                .values(&row)
                .on_conflict((message_read_status::thread_id, message_read_status::member_id))
                .do_update()
                .set((
                    message_read_status::last_read_message_id.eq(row.last_read_message_id),
                    message_read_status::last_read_at.eq(row.last_read_at),
                )),
            &mut conn,
        )
        .await?;

        Ok(())
    }
}
