//! Browser session endpoints.
//!
//! Sessions are created by the sign-in flow; here they are resolved, kept
//! alive and revoked. A missing, malformed, unknown or expired token is
//! indistinguishable from no session at all.

use super::no_store;
use crate::auth::{
    ident::IdKind,
    now_unix_seconds,
    session::{
        cookie::{SessionConfig, clear_session_cookies, extract_session_token, session_cookies},
        store::{SessionRecord, authenticate, delete_session, extend_session},
    },
};
use axum::{
    extract::Extension,
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct CurrentSession {
    /// `sess_` identifier.
    pub session_id: String,
    /// `usr_` identifier.
    pub user_id: String,
}

#[utoipa::path(
    get,
    path= "/v1/session",
    responses (
        (status = 200, description = "Active session; both session cookies are re-issued with a fresh lifetime", body = CurrentSession),
        (status = 204, description = "No valid session"),
        (status = 500, description = "Session lookup failed", body = String)
    ),
    tag= "session"
)]
pub async fn current_session(
    pool: Extension<PgPool>,
    config: Extension<Arc<SessionConfig>>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = extract_session_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let now = now_unix_seconds();
    match authenticate(&pool.0, &token, now).await {
        Ok(Some(record)) => {
            let mut headers = no_store();
            for cookie in refresh_session(&pool.0, &config.0, &record, &token, now).await {
                headers.append(SET_COOKIE, cookie);
            }
            let body = CurrentSession {
                session_id: IdKind::Session.encode(&record.session_id),
                user_id: IdKind::User.encode(&record.user_id),
            };
            (headers, Json(body)).into_response()
        }
        Ok(None) => {
            debug!("Presented session token is not valid");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => {
            error!("Failed to look up session: {err:#}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to look up session".to_string(),
            )
                .into_response()
        }
    }
}

/// Slide the session expiry to `now + ttl` and return the cookie pair to match.
///
/// The session is already authenticated, so a failed refresh is only logged
/// and the response goes out without cookies.
async fn refresh_session(
    pool: &PgPool,
    config: &SessionConfig,
    record: &SessionRecord,
    token: &str,
    now: i64,
) -> Vec<HeaderValue> {
    let expires_at = now.saturating_add(config.ttl_seconds());
    if let Err(err) = extend_session(pool, record.session_id, expires_at).await {
        warn!("Failed to extend session: {err:#}");
        return Vec::new();
    }
    match session_cookies(config, token) {
        Ok(cookies) => cookies.into(),
        Err(err) => {
            warn!("Failed to build session cookies: {err}");
            Vec::new()
        }
    }
}

#[utoipa::path(
    post,
    path= "/v1/logout",
    responses (
        (status = 204, description = "Session revoked and cookies cleared"),
        (status = 500, description = "Session could not be revoked", body = String)
    ),
    tag= "session"
)]
pub async fn logout(
    pool: Extension<PgPool>,
    config: Extension<Arc<SessionConfig>>,
    headers: HeaderMap,
) -> Response {
    if let Some(token) = extract_session_token(&headers) {
        // Only the holder of the verifier may revoke the session.
        let revoked = match authenticate(&pool.0, &token, now_unix_seconds()).await {
            Ok(Some(_)) => delete_session(&pool.0, &token).await,
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = revoked {
            error!("Failed to revoke session: {err:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to revoke session".to_string(),
            )
                .into_response();
        }
    }

    let cookies = match clear_session_cookies(&config.0) {
        Ok(cookies) => cookies,
        Err(err) => {
            error!("Failed to build session cookies: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to clear session".to_string(),
            )
                .into_response();
        }
    };

    let mut headers = no_store();
    for cookie in cookies {
        headers.append(SET_COOKIE, cookie);
    }

    (StatusCode::NO_CONTENT, headers).into_response()
}
