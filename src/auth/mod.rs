//! Credential primitives.
//!
//! Everything here except the session store, the key store and the advisory
//! lock helper is pure: no I/O, no shared state, and time comes in as a unix
//! timestamp from the caller.

pub mod check_session;
pub mod ident;
pub mod keys;
pub mod lock;
pub mod pkce;
pub mod pow;
pub mod session;
pub mod verifier;

use std::time::{SystemTime, UNIX_EPOCH};

/// Unix seconds for expiry checks.
#[must_use]
pub fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
