//! Proof-of-work challenges for throttling abusive clients.
//!
//! Flow Overview:
//! 1) `PowEngine::issue` draws a nonce, sets `target = 2^(256 - difficulty)` and
//!    signs the challenge with HMAC-SHA256 into an opaque token.
//! 2) The client runs [`solve`]: the first 32-bit counter for which
//!    `SHA-256(nonce || counter_be)` read as a big-endian integer is below target.
//! 3) `PowEngine::verify` checks the signature, the time window, the work, and
//!    that the challenge id was not consumed before.
//!
//! Difficulty is capped by configuration and the solver takes an explicit
//! iteration budget, so neither side can be asked to search forever.

use anyhow::Context;
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use num_bigint::BigUint;
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use ulid::Ulid;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "SHA-256";
pub const MAX_SUPPORTED_DIFFICULTY: u32 = 256;
const NONCE_LEN: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PowError {
    #[error("difficulty {difficulty} outside 1..={max}")]
    InvalidDifficulty { difficulty: u32, max: u32 },
    #[error("malformed challenge token")]
    MalformedToken,
    #[error("challenge signature mismatch")]
    BadSignature,
    #[error("challenge not yet valid")]
    NotYetValid,
    #[error("challenge expired")]
    Expired,
    #[error("solution does not meet target")]
    InsufficientWork,
    #[error("challenge already used")]
    Replayed,
    #[error("failed to generate challenge nonce")]
    Randomness,
    #[error("invalid challenge signing key")]
    InvalidKey,
}

/// Signed challenge contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub nonce: String,
    pub target: String,
    pub algorithm: String,
    pub difficulty: u32,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl Challenge {
    fn nonce_bytes(&self) -> Option<Vec<u8>> {
        Base64UrlUnpadded::decode_vec(&self.nonce).ok()
    }

    fn target_value(&self) -> Option<BigUint> {
        BigUint::parse_bytes(self.target.as_bytes(), 16)
    }
}

#[derive(Clone, Debug)]
pub struct IssuedChallenge {
    pub token: String,
    pub challenge: Challenge,
}

#[derive(Clone, Debug)]
pub struct PowConfig {
    pub secret: SecretString,
    pub default_difficulty: u32,
    pub max_difficulty: u32,
    pub ttl_seconds: i64,
    pub not_before_seconds: i64,
}

/// `2^(256 - difficulty)`; callers keep `difficulty` in `1..=256`.
#[must_use]
pub fn target_for(difficulty: u32) -> BigUint {
    BigUint::from(1u8) << (MAX_SUPPORTED_DIFFICULTY - difficulty.min(MAX_SUPPORTED_DIFFICULTY))
}

fn work_digest(nonce: &[u8], counter: u32) -> BigUint {
    let mut hasher = Sha256::new();
    hasher.update(nonce);
    hasher.update(counter.to_be_bytes());
    BigUint::from_bytes_be(&hasher.finalize())
}

/// Search for a counter whose digest is below the challenge target.
///
/// Gives up after `max_iterations` attempts or when the counter space is
/// exhausted. `None` also covers a challenge with an undecodable nonce or target.
#[must_use]
pub fn solve(challenge: &Challenge, max_iterations: u64) -> Option<u32> {
    let nonce = challenge.nonce_bytes()?;
    let target = challenge.target_value()?;
    (0..=u32::MAX)
        .take(usize::try_from(max_iterations).unwrap_or(usize::MAX))
        .find(|counter| work_digest(&nonce, *counter) < target)
}

/// Run [`solve`] on the blocking pool, off the async workers.
///
/// # Errors
///
/// Returns an error if the solver task panics or is cancelled.
pub async fn solve_in_background(
    challenge: Challenge,
    max_iterations: u64,
) -> anyhow::Result<Option<u32>> {
    tokio::task::spawn_blocking(move || solve(&challenge, max_iterations))
        .await
        .context("proof-of-work solver task failed")
}

/// Issues and verifies challenges; remembers consumed ids until they expire.
pub struct PowEngine {
    config: PowConfig,
    consumed: Mutex<HashMap<String, i64>>,
}

impl PowEngine {
    /// # Errors
    ///
    /// Rejects a cap above 256 or a default difficulty outside `1..=cap`.
    pub fn new(config: PowConfig) -> Result<Self, PowError> {
        if config.max_difficulty == 0 || config.max_difficulty > MAX_SUPPORTED_DIFFICULTY {
            return Err(PowError::InvalidDifficulty {
                difficulty: config.max_difficulty,
                max: MAX_SUPPORTED_DIFFICULTY,
            });
        }
        if config.default_difficulty == 0 || config.default_difficulty > config.max_difficulty {
            return Err(PowError::InvalidDifficulty {
                difficulty: config.default_difficulty,
                max: config.max_difficulty,
            });
        }
        Ok(Self {
            config,
            consumed: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn default_difficulty(&self) -> u32 {
        self.config.default_difficulty
    }

    fn mac(&self) -> Result<HmacSha256, PowError> {
        HmacSha256::new_from_slice(self.config.secret.expose_secret().as_bytes())
            .map_err(|_| PowError::InvalidKey)
    }

    fn sign(&self, payload: &str) -> Result<String, PowError> {
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        Ok(Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes()))
    }

    /// Issue a challenge of `difficulty` bits valid from `now + not_before`.
    ///
    /// # Errors
    ///
    /// `InvalidDifficulty` outside `1..=max_difficulty`; `Randomness` if the
    /// nonce cannot be drawn.
    pub fn issue(&self, difficulty: u32, now: i64) -> Result<IssuedChallenge, PowError> {
        if difficulty == 0 || difficulty > self.config.max_difficulty {
            return Err(PowError::InvalidDifficulty {
                difficulty,
                max: self.config.max_difficulty,
            });
        }

        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|_| PowError::Randomness)?;

        let challenge = Challenge {
            id: Ulid::new().to_string(),
            nonce: Base64UrlUnpadded::encode_string(&nonce),
            target: target_for(difficulty).to_str_radix(16),
            algorithm: ALGORITHM.to_string(),
            difficulty,
            iat: now,
            nbf: now.saturating_add(self.config.not_before_seconds),
            exp: now.saturating_add(self.config.ttl_seconds),
        };

        let json = serde_json::to_vec(&challenge).map_err(|_| PowError::MalformedToken)?;
        let payload = Base64UrlUnpadded::encode_string(&json);
        let token = format!("{payload}.{}", self.sign(&payload)?);

        debug!(challenge_id = %challenge.id, difficulty, "issued proof-of-work challenge");
        Ok(IssuedChallenge { token, challenge })
    }

    /// Check `solution` for `token` and consume the challenge.
    ///
    /// # Errors
    ///
    /// One `PowError` per failed check, in order: token shape, signature,
    /// time window, work, replay.
    pub async fn verify(&self, token: &str, solution: u32, now: i64) -> Result<Challenge, PowError> {
        let challenge = self.open(token)?;

        if now < challenge.nbf {
            return Err(PowError::NotYetValid);
        }
        if now >= challenge.exp {
            return Err(PowError::Expired);
        }

        let nonce = challenge.nonce_bytes().ok_or(PowError::MalformedToken)?;
        let target = challenge.target_value().ok_or(PowError::MalformedToken)?;
        if work_digest(&nonce, solution) >= target {
            return Err(PowError::InsufficientWork);
        }

        let mut consumed = self.consumed.lock().await;
        consumed.retain(|_, exp| *exp > now);
        if consumed.contains_key(&challenge.id) {
            debug!(challenge_id = %challenge.id, "proof-of-work replay rejected");
            return Err(PowError::Replayed);
        }
        consumed.insert(challenge.id.clone(), challenge.exp);
        drop(consumed);

        debug!(challenge_id = %challenge.id, "proof-of-work accepted");
        Ok(challenge)
    }

    fn open(&self, token: &str) -> Result<Challenge, PowError> {
        let (payload, signature) = token.split_once('.').ok_or(PowError::MalformedToken)?;
        let signature =
            Base64UrlUnpadded::decode_vec(signature).map_err(|_| PowError::MalformedToken)?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| PowError::BadSignature)?;

        let json = Base64UrlUnpadded::decode_vec(payload).map_err(|_| PowError::MalformedToken)?;
        let challenge: Challenge =
            serde_json::from_slice(&json).map_err(|_| PowError::MalformedToken)?;
        if challenge.algorithm != ALGORITHM {
            return Err(PowError::MalformedToken);
        }
        Ok(challenge)
    }
}
