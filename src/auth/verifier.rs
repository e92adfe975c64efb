//! Salted verifier digests for session and bearer secrets.
//!
//! The raw 32-byte verifier only ever lives in the client's token; the database
//! keeps `$sha256$<salt>$<digest>` where `digest = SHA-256(salt || verifier)`.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;

pub const VERIFIER_LEN: usize = 32;
pub const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

const SHA256_TAG: &str = "sha256";

/// Stored form of a verifier, one variant per supported algorithm.
#[derive(Clone, PartialEq, Eq)]
pub enum VerifierDigest {
    Sha256 {
        salt: [u8; SALT_LEN],
        digest: [u8; DIGEST_LEN],
    },
}

impl VerifierDigest {
    /// Parse the persisted `$<alg>$<salt>$<digest>` form.
    ///
    /// Returns `None` for unknown algorithms or any malformed segment.
    #[must_use]
    pub fn parse(stored: &str) -> Option<Self> {
        let rest = stored.strip_prefix('$')?;
        let mut parts = rest.split('$');
        let algorithm = parts.next()?;
        let salt = parts.next()?;
        let digest = parts.next()?;
        if parts.next().is_some() {
            return None;
        }

        match algorithm {
            SHA256_TAG => Some(Self::Sha256 {
                salt: decode_fixed::<SALT_LEN>(salt)?,
                digest: decode_fixed::<DIGEST_LEN>(digest)?,
            }),
            _ => None,
        }
    }

    fn compute_sha256(salt: &[u8; SALT_LEN], verifier: &[u8]) -> [u8; DIGEST_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(verifier);
        hasher.finalize().into()
    }

    /// Recompute the digest for `candidate` and compare in constant time.
    #[must_use]
    pub fn matches(&self, candidate: &[u8]) -> bool {
        match self {
            Self::Sha256 { salt, digest } => {
                let computed = Self::compute_sha256(salt, candidate);
                computed.as_slice().ct_eq(digest.as_slice()).into()
            }
        }
    }
}

impl fmt::Display for VerifierDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 { salt, digest } => write!(
                f,
                "${SHA256_TAG}${}${}",
                Base64UrlUnpadded::encode_string(salt),
                Base64UrlUnpadded::encode_string(digest)
            ),
        }
    }
}

// Digest bytes are not secret, but keep them out of logs anyway.
impl fmt::Debug for VerifierDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha256 { .. } => f.write_str("VerifierDigest::Sha256(..)"),
        }
    }
}

/// Output of [`create`]: the raw secret for the token and the digest to persist.
pub struct NewVerifier {
    pub raw: [u8; VERIFIER_LEN],
    pub digest: VerifierDigest,
}

impl fmt::Debug for NewVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewVerifier")
            .field("raw", &"[redacted]")
            .field("digest", &self.digest)
            .finish()
    }
}

/// Draw a fresh verifier and salt from the OS RNG.
///
/// # Errors
///
/// Returns an error if the operating system RNG is unavailable.
pub fn create() -> Result<NewVerifier> {
    let mut raw = [0u8; VERIFIER_LEN];
    OsRng
        .try_fill_bytes(&mut raw)
        .context("failed to generate verifier")?;
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .context("failed to generate verifier salt")?;

    let digest = VerifierDigest::Sha256 {
        digest: VerifierDigest::compute_sha256(&salt, &raw),
        salt,
    };
    Ok(NewVerifier { raw, digest })
}

/// Check `candidate` against a stored digest string.
///
/// Fails closed: an unknown algorithm tag or a malformed string yields `false`.
#[must_use]
pub fn check(candidate: &[u8], stored: &str) -> bool {
    VerifierDigest::parse(stored).is_some_and(|digest| digest.matches(candidate))
}

fn decode_fixed<const N: usize>(value: &str) -> Option<[u8; N]> {
    let bytes = Base64UrlUnpadded::decode_vec(value).ok()?;
    bytes.as_slice().try_into().ok()
}
