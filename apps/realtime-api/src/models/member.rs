use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text, Timestamptz, Uuid as SqlUuid};
use uuid::Uuid;

use crate::db::store::MemberRecord;

/// Member columns selected by the session lookups.
#[derive(Debug, Clone, QueryableByName)]
pub struct MemberRow {
    #[diesel(sql_type = SqlUuid)]
    pub id: Uuid,
    #[diesel(sql_type = SqlUuid)]
    pub org_id: Uuid,
    #[diesel(sql_type = Text)]
    pub first_name: String,
    #[diesel(sql_type = Text)]
    pub last_name: String,
    #[diesel(sql_type = Nullable<Text>)]
    pub profile_photo_url: Option<String>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub community_banned_at: Option<DateTime<Utc>>,
    #[diesel(sql_type = Nullable<Timestamptz>)]
    pub community_muted_until: Option<DateTime<Utc>>,
}

impl From<MemberRow> for MemberRecord {
    fn from(row: MemberRow) -> Self {
        Self {
            id: row.id.to_string(),
            org_id: row.org_id.to_string(),
            first_name: row.first_name,
            last_name: row.last_name,
            avatar_url: row.profile_photo_url,
            banned_at: row.community_banned_at,
            muted_until: row.community_muted_until,
        }
    }
}
