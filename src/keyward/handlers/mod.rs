pub mod health;
pub use self::health::health;

pub mod jwks;
pub use self::jwks::jwks;

pub mod check_session;
pub use self::check_session::check_session;

pub mod pow;
pub use self::pow::{challenge, verify};

pub mod session;
pub use self::session::{current_session, logout};

// common functions for the handlers
use axum::http::{HeaderMap, HeaderValue, header::CACHE_CONTROL};

/// Headers for responses that must never be cached by browsers or proxies.
pub(crate) fn no_store() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers
}
