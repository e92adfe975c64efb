//! Signing keys for the OIDC provider.
//!
//! Keys live in two JWKS files: `current` holds the keys new tokens are signed
//! with, `legacy` the keys from before the last rotation, kept only so older
//! signatures still verify. [`KeyStore`] caches both with a TTL and keeps
//! serving the last good copy when a reload fails.

mod jwk;
mod rotate;
mod source;
mod store;

pub use jwk::{KeyFile, PublicJwk, PublicJwks, SigningKey};
pub use rotate::{MIN_RSA_BITS, generate_rs256, rotate};
pub use source::{FileKeySource, KeySource, read_key_file, write_key_file};
pub use store::{DEFAULT_CACHE_TTL_SECONDS, DependencyStatus, KeyStore};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeySet {
    pub current: Vec<SigningKey>,
    pub legacy: Vec<SigningKey>,
}

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("failed to read key file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid key file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write key file {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize key set")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to generate signing key")]
    Generate(#[from] rsa::Error),
    #[error("key generation task failed")]
    Task(#[from] tokio::task::JoinError),
    #[error("RSA modulus of {0} bits is below the {MIN_RSA_BITS}-bit minimum")]
    KeyTooSmall(usize),
    #[error("key id {0} is already in use")]
    DuplicateKid(String),
}
