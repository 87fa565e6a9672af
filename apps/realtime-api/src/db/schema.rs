// Tables owned by the membership platform; this service only reads sessions
// and members and writes presence columns and read markers.

diesel::table! {
    members (id) {
        id -> Uuid,
        org_id -> Uuid,
        first_name -> Text,
        last_name -> Text,
        profile_photo_url -> Nullable<Text>,
        community_banned_at -> Nullable<Timestamptz>,
        community_muted_until -> Nullable<Timestamptz>,
        is_online -> Bool,
        last_seen_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    member_sessions (id) {
        id -> Uuid,
        member_id -> Uuid,
        token_hash -> Text,
        expires_at -> Timestamptz,
        revoked_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    sessions (id) {
        id -> Uuid,
        member_id -> Nullable<Uuid>,
        token_hash -> Text,
        expires_at -> Timestamptz,
    }
}

diesel::table! {
    message_read_status (thread_id, member_id) {
        thread_id -> Uuid,
        member_id -> Uuid,
        last_read_message_id -> Uuid,
        last_read_at -> Timestamptz,
    }
}
