//! Database access for sessions.
//!
//! Flow Overview:
//! 1) `create_session` draws a verifier, stores only its digest, returns the token.
//! 2) `authenticate` decodes a presented token, loads the row by id, checks the
//!    verifier in constant time and the expiry against the caller's clock.
//! 3) `extend_session` slides the expiry forward while the session is in use.
//! 4) `delete_session` removes the row on logout.

use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::{Instrument, instrument};
use uuid::Uuid;

use super::{SessionToken, decode, encode};
use crate::auth::{
    lock::{self, LockId},
    verifier,
};

/// Advisory lock namespace for per-user session bookkeeping.
const SESSION_LOCK_NAMESPACE: u8 = 1;

/// Session row as stored; the digest is never the raw verifier.
#[derive(Clone, Debug)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub verifier_digest: String,
    pub expires_at_unix: i64,
}

/// A session that was just created: the token goes to the cookie, once.
#[derive(Debug)]
pub struct IssuedSession {
    pub token: String,
    pub record: SessionRecord,
}

/// Check a decoded token against its stored record.
///
/// The id comparison is not secret; the verifier comparison is constant time.
#[must_use]
pub fn verify_record(token: &SessionToken, record: &SessionRecord, now_unix: i64) -> bool {
    if token.session_id != record.session_id || record.expires_at_unix <= now_unix {
        return false;
    }
    let Some(candidate) = token.verifier_bytes() else {
        return false;
    };
    verifier::check(&candidate, &record.verifier_digest)
}

/// Build a session record and its token without touching the database.
///
/// # Errors
///
/// Returns an error if the verifier cannot be generated.
pub fn new_session(user_id: Uuid, now_unix: i64, ttl_seconds: i64) -> Result<IssuedSession> {
    let session_id = Uuid::now_v7();
    let verifier = verifier::create()?;
    let token = encode(&session_id, &verifier.raw);
    Ok(IssuedSession {
        token,
        record: SessionRecord {
            session_id,
            user_id,
            verifier_digest: verifier.digest.to_string(),
            expires_at_unix: now_unix.saturating_add(ttl_seconds),
        },
    })
}

/// Persist a new session for `user_id`.
///
/// Creation is serialized per user with an advisory lock, and the user's
/// expired sessions are pruned in the same transaction.
///
/// # Errors
///
/// Returns an error if the verifier cannot be generated or any query fails.
#[instrument(skip(pool))]
pub async fn create_session(
    pool: &PgPool,
    user_id: Uuid,
    now_unix: i64,
    ttl_seconds: i64,
) -> Result<IssuedSession> {
    let issued = new_session(user_id, now_unix, ttl_seconds)?;
    let lock_key = lock::encode(LockId::Uuid(user_id), Some(SESSION_LOCK_NAMESPACE))?;

    let mut tx = pool.begin().await.context("failed to begin transaction")?;
    lock::acquire_xact_lock(&mut tx, lock_key).await?;

    let prune_query = r"
        DELETE FROM sessions
        WHERE user_id = $1 AND expires_at <= to_timestamp($2::bigint)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = prune_query
    );
    sqlx::query(prune_query)
        .bind(user_id)
        .bind(now_unix)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to prune expired sessions")?;

    let query = r"
        INSERT INTO sessions (id, user_id, verifier_digest, created_at, expires_at)
        VALUES ($1, $2, $3, to_timestamp($4::bigint), to_timestamp($5::bigint))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(issued.record.session_id)
        .bind(issued.record.user_id)
        .bind(&issued.record.verifier_digest)
        .bind(now_unix)
        .bind(issued.record.expires_at_unix)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert session")?;

    tx.commit().await.context("failed to commit session")?;
    Ok(issued)
}

/// Load a session row by id.
///
/// # Errors
///
/// Returns an error if the query fails.
pub async fn lookup_session(pool: &PgPool, session_id: Uuid) -> Result<Option<SessionRecord>> {
    let query = r"
        SELECT id, user_id, verifier_digest,
               EXTRACT(EPOCH FROM expires_at)::bigint AS expires_at_unix
        FROM sessions
        WHERE id = $1
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(session_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    Ok(row.map(|row| SessionRecord {
        session_id: row.get("id"),
        user_id: row.get("user_id"),
        verifier_digest: row.get("verifier_digest"),
        expires_at_unix: row.get("expires_at_unix"),
    }))
}

/// Resolve a raw token into a valid session, if any.
///
/// Malformed tokens short-circuit before any query is made.
///
/// # Errors
///
/// Returns an error only if the database lookup fails.
#[instrument(skip_all)]
pub async fn authenticate(
    pool: &PgPool,
    raw_token: &str,
    now_unix: i64,
) -> Result<Option<SessionRecord>> {
    let Some(token) = decode(raw_token) else {
        return Ok(None);
    };
    let record = lookup_session(pool, token.session_id).await?;
    Ok(record.filter(|record| verify_record(&token, record, now_unix)))
}

/// Move a session's expiry to `expires_at_unix`, for sliding lifetimes.
///
/// # Errors
///
/// Returns an error if the update fails.
pub async fn extend_session(pool: &PgPool, session_id: Uuid, expires_at_unix: i64) -> Result<()> {
    let query = r"
        UPDATE sessions
        SET expires_at = to_timestamp($2::bigint)
        WHERE id = $1 AND expires_at < to_timestamp($2::bigint)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_id)
        .bind(expires_at_unix)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to extend session")?;
    Ok(())
}

/// Delete the session named by a raw token. Malformed tokens are a no-op.
///
/// # Errors
///
/// Returns an error if the delete fails.
pub async fn delete_session(pool: &PgPool, raw_token: &str) -> Result<()> {
    let Some(token) = decode(raw_token) else {
        return Ok(());
    };

    let query = "DELETE FROM sessions WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token.session_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}
