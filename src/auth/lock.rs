//! 64-bit keys for PostgreSQL transaction-scoped advisory locks.
//!
//! A key is either a raw 64-bit id, or a 4-bit namespace in the top bits over a
//! 60-bit payload. Locks are taken with `pg_advisory_xact_lock` and released
//! when the surrounding transaction commits or rolls back.

use anyhow::{Context, Result};
use sqlx::{Postgres, Transaction};
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

const NAMESPACE_SHIFT: u32 = 60;
pub const MAX_NAMESPACE: u8 = 15;
pub const MAX_NAMESPACED_ID: u64 = (1 << NAMESPACE_SHIFT) - 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockId {
    Numeric(u64),
    Uuid(Uuid),
}

impl From<u64> for LockId {
    fn from(value: u64) -> Self {
        Self::Numeric(value)
    }
}

impl From<Uuid> for LockId {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum LockKeyError {
    #[error("lock namespace {0} exceeds {MAX_NAMESPACE}")]
    NamespaceOutOfRange(u8),
    #[error("lock id {0} does not fit in 60 bits")]
    IdOutOfRange(u64),
}

/// Derive the advisory lock key for `lock_id`, optionally namespaced.
///
/// For a UUID only the low 64 bits (the last two groups) are used.
///
/// # Errors
///
/// Fails when the namespace is above 15 or a numeric id would spill into the
/// namespace bits. Nothing is truncated silently.
pub fn encode(lock_id: LockId, namespace: Option<u8>) -> Result<u64, LockKeyError> {
    let Some(namespace) = namespace else {
        return Ok(match lock_id {
            LockId::Numeric(id) => id,
            LockId::Uuid(id) => low_bits(&id),
        });
    };
    if namespace > MAX_NAMESPACE {
        return Err(LockKeyError::NamespaceOutOfRange(namespace));
    }
    let payload = match lock_id {
        LockId::Numeric(id) if id > MAX_NAMESPACED_ID => {
            return Err(LockKeyError::IdOutOfRange(id));
        }
        LockId::Numeric(id) => id,
        LockId::Uuid(id) => low_bits(&id) & MAX_NAMESPACED_ID,
    };
    Ok((u64::from(namespace) << NAMESPACE_SHIFT) | payload)
}

fn low_bits(id: &Uuid) -> u64 {
    let (_, low) = id.as_u64_pair();
    low
}

/// PostgreSQL takes `bigint`; reinterpret the bits rather than convert the value.
#[must_use]
pub fn to_pg_key(key: u64) -> i64 {
    i64::from_be_bytes(key.to_be_bytes())
}

/// Block until the advisory lock for `key` is held by `tx`.
///
/// # Errors
///
/// Returns an error if the lock query fails.
pub async fn acquire_xact_lock(tx: &mut Transaction<'_, Postgres>, key: u64) -> Result<()> {
    let query = "SELECT pg_advisory_xact_lock($1)";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(to_pg_key(key))
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to acquire advisory lock")?;
    Ok(())
}
