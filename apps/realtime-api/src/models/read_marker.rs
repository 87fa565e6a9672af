use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::db::schema::message_read_status;
use crate::db::store::ReadMarker;
use crate::error::StoreError;

#[derive(Debug, Insertable)]
#[diesel(table_name = message_read_status)]
pub struct NewReadMarker {
    pub thread_id: Uuid,
    pub member_id: Uuid,
    pub last_read_message_id: Uuid,
    pub last_read_at: DateTime<Utc>,
}

impl TryFrom<&ReadMarker> for NewReadMarker {
    type Error = StoreError;

    fn try_from(marker: &ReadMarker) -> Result<Self, Self::Error> {
        Ok(Self {
            thread_id: Uuid::parse_str(&marker.thread_id)?,
            member_id: Uuid::parse_str(&marker.member_id)?,
            last_read_message_id: Uuid::parse_str(&marker.message_id)?,
            last_read_at: marker.read_at,
        })
    }
}
