//! Session token codec, cookie pair, and database-backed session store.
//!
//! A session token is `base64url(session_id || verifier)`: 16 bytes of UUID
//! followed by the 32-byte raw verifier, always 64 characters long. The codec
//! only packs and unpacks; checking the verifier is `auth::verifier`'s job.

pub mod cookie;
pub mod store;

use base64ct::{Base64UrlUnpadded, Encoding};
use std::fmt;
use uuid::Uuid;

use super::verifier::VERIFIER_LEN;

const SESSION_ID_LEN: usize = 16;
pub const RAW_TOKEN_LEN: usize = SESSION_ID_LEN + VERIFIER_LEN;
pub const ENCODED_TOKEN_LEN: usize = 64;

/// A decoded session token. The verifier stays opaque (base64url text).
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub session_id: Uuid,
    pub verifier: String,
}

impl SessionToken {
    /// Raw verifier bytes for [`crate::auth::verifier::check`].
    #[must_use]
    pub fn verifier_bytes(&self) -> Option<[u8; VERIFIER_LEN]> {
        let bytes = Base64UrlUnpadded::decode_vec(&self.verifier).ok()?;
        bytes.as_slice().try_into().ok()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("session_id", &self.session_id)
            .field("verifier", &"[redacted]")
            .finish()
    }
}

/// Pack a session id and raw verifier into the cookie value.
#[must_use]
pub fn encode(session_id: &Uuid, verifier: &[u8; VERIFIER_LEN]) -> String {
    let mut raw = [0u8; RAW_TOKEN_LEN];
    raw[..SESSION_ID_LEN].copy_from_slice(session_id.as_bytes());
    raw[SESSION_ID_LEN..].copy_from_slice(verifier);
    Base64UrlUnpadded::encode_string(&raw)
}

/// Unpack a cookie value. Anything malformed yields `None`.
#[must_use]
pub fn decode(token: &str) -> Option<SessionToken> {
    // Length gate first so oversized input is never decoded.
    if token.len() != ENCODED_TOKEN_LEN {
        return None;
    }
    let raw = Base64UrlUnpadded::decode_vec(token).ok()?;
    if raw.len() != RAW_TOKEN_LEN {
        return None;
    }
    let (id_bytes, verifier) = raw.split_at(SESSION_ID_LEN);
    let session_id = Uuid::from_slice(id_bytes).ok()?;
    Some(SessionToken {
        session_id,
        verifier: Base64UrlUnpadded::encode_string(verifier),
    })
}
