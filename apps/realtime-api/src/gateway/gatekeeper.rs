//! Connection admission: resolve the session credential, reject bans.

use crate::db::store::{MemberRecord, SessionValidator};
use crate::error::ApiError;

use super::session::ConnectionIdentity;

/// Why a connection attempt was refused. Returned to the attempting client
/// only; never broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthRejection {
    #[error("Authentication required")]
    MissingCredential,
    #[error("Invalid session")]
    InvalidSession,
    #[error("You are banned from the community")]
    Banned,
    #[error("Authentication failed")]
    Unavailable,
}

impl AuthRejection {
    pub fn code(self) -> &'static str {
        match self {
            AuthRejection::MissingCredential => "AUTH_REQUIRED",
            AuthRejection::InvalidSession => "INVALID_SESSION",
            AuthRejection::Banned => "BANNED",
            AuthRejection::Unavailable => "AUTH_FAILED",
        }
    }
}

impl From<AuthRejection> for ApiError {
    fn from(rejection: AuthRejection) -> Self {
        match rejection {
            AuthRejection::Banned => ApiError::forbidden(rejection.code(), rejection.to_string()),
            _ => ApiError::unauthorized(rejection.code(), rejection.to_string()),
        }
    }
}

/// Authenticate a connection attempt.
///
/// The current session table is consulted first, then the legacy one. A
/// banned member is refused whichever table resolved them.
pub async fn admit(
    validator: &dyn SessionValidator,
    credential: Option<&str>,
) -> Result<ConnectionIdentity, AuthRejection> {
    let credential = credential
        .filter(|c| !c.is_empty())
        .ok_or(AuthRejection::MissingCredential)?;

    let identity: ConnectionIdentity = resolve(validator, credential)
        .await?
        .ok_or(AuthRejection::InvalidSession)?
        .into();

    if identity.is_banned() {
        tracing::debug!(
            member_id = %identity.member_id,
            org_id = %identity.org_id,
            "banned member refused"
        );
        return Err(AuthRejection::Banned);
    }

    Ok(identity)
}

async fn resolve(
    validator: &dyn SessionValidator,
    credential: &str,
) -> Result<Option<MemberRecord>, AuthRejection> {
    let primary = validator.validate(credential).await.map_err(|err| {
        tracing::error!(%err, "session lookup failed");
        AuthRejection::Unavailable
    })?;

    if primary.is_some() {
        return Ok(primary);
    }

    validator.validate_legacy(credential).await.map_err(|err| {
        tracing::error!(%err, "legacy session lookup failed");
        AuthRejection::Unavailable
    })
}
