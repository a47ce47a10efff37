//! Session guard for identity-sensitive endpoints.
//!
//! Every failure mode (no credential, unknown, expired, orphaned) produces the
//! same `401 {"error": "Unauthorized"}` so callers learn nothing about why.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use leadforge_identity::{AuthSession, User};
use tracing::debug;

use crate::util::session_credential;
use crate::{ApiError, AppState};

/// A request whose session credential resolved to a live session.
#[derive(Debug, Clone)]
pub struct VerifiedSession {
    pub user: User,
    pub session: AuthSession,
}

impl VerifiedSession {
    pub fn user_id(&self) -> i64 {
        self.user.id
    }
}

pub async fn verified_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<VerifiedSession, ApiError> {
    let Some(token) = session_credential(headers, &state.config().auth.session_cookie) else {
        debug!("request without session credential");
        return Err(ApiError::unauthorized("Unauthorized"));
    };

    let (user, session) = state.authenticate(&token).await?;
    Ok(VerifiedSession { user, session })
}

#[async_trait]
impl FromRequestParts<AppState> for VerifiedSession {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        verified_session(state, &parts.headers).await
    }
}
