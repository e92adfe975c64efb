//! PKCE (RFC 7636) verification at the token endpoint.

use base64ct::{Base64UrlUnpadded, Encoding};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

pub const METHOD_S256: &str = "S256";
pub const METHOD_PLAIN: &str = "plain";

/// Which transforms the provider accepts.
///
/// `plain` sends the verifier in the clear on the authorization request, so it
/// gives no protection against an observer of that request. Off by default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PkcePolicy {
    pub allow_plain: bool,
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum PkceError {
    #[error("invalid_request")]
    InvalidRequest,
    #[error("invalid_grant")]
    InvalidGrant,
}

impl PkceError {
    /// OAuth error code for the token endpoint response.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidGrant => "invalid_grant",
        }
    }
}

/// `base64url(SHA-256(verifier))`, the S256 challenge for a verifier.
#[must_use]
pub fn compute_s256_challenge(verifier: &str) -> String {
    Base64UrlUnpadded::encode_string(&Sha256::digest(verifier.as_bytes()))
}

/// Check a token request's `code_verifier` against the stored challenge.
///
/// A missing `method` means `plain`, as the authorization request would have
/// defaulted it.
///
/// # Errors
///
/// `InvalidRequest` when the verifier is missing or the method is unsupported
/// or disabled, `InvalidGrant` when the verifier does not match.
pub fn validate(
    verifier: Option<&str>,
    method: Option<&str>,
    stored_challenge: &str,
    policy: PkcePolicy,
) -> Result<(), PkceError> {
    let verifier = verifier.ok_or(PkceError::InvalidRequest)?;
    let expected = match method.unwrap_or(METHOD_PLAIN) {
        METHOD_S256 => compute_s256_challenge(verifier),
        METHOD_PLAIN if policy.allow_plain => verifier.to_string(),
        _ => return Err(PkceError::InvalidRequest),
    };

    if bool::from(expected.as_bytes().ct_eq(stored_challenge.as_bytes())) {
        Ok(())
    } else {
        Err(PkceError::InvalidGrant)
    }
}
