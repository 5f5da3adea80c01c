use super::state::ServerState;
use crate::user::auth::AuthTokenValue;

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use std::convert::Infallible;
use tracing::{debug, warn};

#[derive(Debug)]
pub struct Session {
    pub user_id: usize,
    pub token: String,
}

pub const COOKIE_SESSION_TOKEN_KEY: &str = "session_token";
pub const HEADER_SESSION_TOKEN_KEY: &str = "Authorization";

pub enum SessionExtractionError {
    AccessDenied,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::AccessDenied => StatusCode::FORBIDDEN.into_response(),
        }
    }
}

fn token_from_cookie(parts: &Parts) -> Option<String> {
    let jar = CookieJar::from_headers(&parts.headers);
    let token = jar.get(COOKIE_SESSION_TOKEN_KEY)?.value();
    (!token.is_empty()).then(|| token.to_owned())
}

fn token_from_header(parts: &Parts) -> Option<String> {
    let raw = parts.headers.get(HEADER_SESSION_TOKEN_KEY)?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw).trim();
    (!token.is_empty()).then(|| token.to_owned())
}

/// Resolves the caller's token, cookie first, and refreshes its last-used time.
async fn resolve_session(parts: &Parts, state: &ServerState) -> Option<Session> {
    let Some(token) = token_from_cookie(parts).or_else(|| token_from_header(parts)) else {
        debug!("Request carries no session token");
        return None;
    };

    let value = AuthTokenValue(token);
    let auth_token = match state.user_manager.get_auth_token(&value) {
        Ok(Some(auth_token)) => auth_token,
        Ok(None) => {
            debug!("Unknown session token");
            return None;
        }
        Err(e) => {
            warn!("Session lookup failed: {}", e);
            return None;
        }
    };
    if let Err(e) = state.user_manager.update_auth_token_last_used(&value) {
        debug!("Could not refresh token of user {}: {}", auth_token.user_id, e);
    }

    Some(Session {
        user_id: auth_token.user_id,
        token: auth_token.value.0,
    })
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        resolve_session(parts, state)
            .await
            .ok_or(SessionExtractionError::AccessDenied)
    }
}

impl OptionalFromRequestParts<ServerState> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(resolve_session(parts, state).await)
    }
}
