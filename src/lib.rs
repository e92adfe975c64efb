//! # Keyward (Identity & Session Security Core)
//!
//! `keyward` is the credential layer of an OpenID Connect identity provider: it
//! issues and verifies browser sessions, publishes the provider's signing keys,
//! and guards the token and sign-in endpoints.
//!
//! ## Sessions
//!
//! A session token is the 16-byte session id followed by a 32-byte random
//! verifier, base64url encoded to 64 characters. The database only keeps
//! `$sha256$<salt>$<digest>` of the verifier, so a leaked table cannot be
//! replayed as cookies. Verification is constant time.
//!
//! Two cookies are set together: `keyward_session` (`HttpOnly`) carries the
//! token, `keyward_session_check` carries `base64url(SHA-256(token))` for the
//! OIDC check-session iframe served at `/oidc/check-session`.
//!
//! ## Signing Keys
//!
//! `current` and `legacy` JWKS files are cached in memory with a TTL. A failed
//! reload keeps the previous keys; only a provider that never loaded keys
//! reports an error. `keyward rotate-keys` moves `current` to `legacy` and
//! generates a new RS256 key.
//!
//! ## Abuse Controls
//!
//! - **Proof of work:** HMAC-signed, time-bounded hash puzzles with a capped
//!   difficulty, each id accepted once.
//! - **Advisory locks:** per-entity `pg_advisory_xact_lock` keys with a 4-bit
//!   namespace serialize bookkeeping such as session creation.
//!
//! ## Identifiers
//!
//! UUIDs are exposed as `<prefix>_<base62>` (`sess_`, `usr_`, `org_`, `oidc_`,
//! `idpsk_`); a `sess_` id never parses where a `usr_` id is expected.

pub mod auth;
pub mod cli;
pub mod keyward;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
