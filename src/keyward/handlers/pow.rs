//! Proof-of-work gate for sign-in and registration forms.

use super::no_store;
use crate::auth::{
    now_unix_seconds,
    pow::{PowEngine, PowError},
};
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::{IntoParams, ToSchema};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ChallengeResponse {
    pub token: String,
    pub nonce: String,
    /// Hex encoded; a solution's SHA-256 must be below it.
    pub target: String,
    pub algorithm: String,
    pub difficulty: u32,
    /// RFC 3339.
    pub expires_at: String,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ChallengeQuery {
    /// Leading zero bits requested, capped by the server.
    difficulty: Option<u32>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyRequest {
    pub token: String,
    pub solution: u32,
}

#[utoipa::path(
    get,
    path= "/pow/challenge",
    params(ChallengeQuery),
    responses (
        (status = 200, description = "Signed proof-of-work challenge", body = ChallengeResponse),
        (status = 400, description = "Requested difficulty out of range", body = String)
    ),
    tag= "pow"
)]
pub async fn challenge(
    pow: Extension<Arc<PowEngine>>,
    Query(query): Query<ChallengeQuery>,
) -> Response {
    let difficulty = query
        .difficulty
        .unwrap_or_else(|| pow.0.default_difficulty());

    let issued = match pow.0.issue(difficulty, now_unix_seconds()) {
        Ok(issued) => issued,
        Err(err @ PowError::InvalidDifficulty { .. }) => {
            debug!("Rejected challenge request: {err}");
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
        Err(err) => {
            error!("Failed to issue proof-of-work challenge: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to issue challenge".to_string(),
            )
                .into_response();
        }
    };

    let expires_at = DateTime::from_timestamp(issued.challenge.exp, 0)
        .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();

    let body = ChallengeResponse {
        token: issued.token,
        nonce: issued.challenge.nonce,
        target: issued.challenge.target,
        algorithm: issued.challenge.algorithm,
        difficulty: issued.challenge.difficulty,
        expires_at,
    };

    (no_store(), Json(body)).into_response()
}

#[utoipa::path(
    post,
    path= "/pow/verify",
    request_body = VerifyRequest,
    responses (
        (status = 202, description = "Solution accepted; the challenge is consumed"),
        (status = 403, description = "Invalid, expired, replayed or insufficient solution", body = String)
    ),
    tag= "pow"
)]
pub async fn verify(pow: Extension<Arc<PowEngine>>, Json(request): Json<VerifyRequest>) -> Response {
    match pow
        .0
        .verify(&request.token, request.solution, now_unix_seconds())
        .await
    {
        Ok(challenge) => {
            debug!(challenge_id = %challenge.id, "Proof of work verified");
            StatusCode::ACCEPTED.into_response()
        }
        Err(err) => {
            debug!("Proof of work rejected: {err}");
            (StatusCode::FORBIDDEN, err.to_string()).into_response()
        }
    }
}
