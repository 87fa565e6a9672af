//! Session-cookie admission extractor.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::session::credential_from_cookies;
use crate::error::ApiError;
use crate::gateway::gatekeeper;
use crate::gateway::session::ConnectionIdentity;
use crate::AppState;

/// Member admitted from the session cookie on the incoming request.
///
/// Rejects with 401 when the credential is missing or unknown and 403 when
/// the member is banned, before any WebSocket upgrade happens.
#[derive(Debug, Clone)]
pub struct AdmittedMember(pub ConnectionIdentity);

impl FromRequestParts<AppState> for AdmittedMember {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let credential = credential_from_cookies(&parts.headers, &state.config.session_cookie);

        let identity = gatekeeper::admit(state.sessions.as_ref(), credential.as_deref()).await?;

        Ok(AdmittedMember(identity))
    }
}
