//! Out-of-band key generation and rotation.

use rand::rngs::OsRng;
use rsa::RsaPrivateKey;
use tracing::info;

use super::{FileKeySource, KeySet, KeySource, KeyStoreError, SigningKey};

pub const MIN_RSA_BITS: usize = 2048;

/// Generate an RS256 signing key of `bits` bits.
///
/// # Errors
///
/// Returns an error if key generation fails.
pub fn generate_rs256(kid: &str, bits: usize) -> Result<SigningKey, KeyStoreError> {
    let private = RsaPrivateKey::new(&mut OsRng, bits)?;
    Ok(SigningKey::from_rsa_private_key(&private, kid))
}

/// Rotate the key files: `current` becomes `legacy` and a new RS256 key
/// becomes `current`. Keys that were already legacy are dropped.
///
/// Generation is CPU bound and runs on the blocking pool.
///
/// # Errors
///
/// Fails if `bits` is below [`MIN_RSA_BITS`], `kid` is already in use, the
/// existing files cannot be read, or the new files cannot be written.
pub async fn rotate(source: &FileKeySource, kid: &str, bits: usize) -> Result<KeySet, KeyStoreError> {
    if bits < MIN_RSA_BITS {
        return Err(KeyStoreError::KeyTooSmall(bits));
    }
    rotate_unchecked(source, kid, bits).await
}

async fn rotate_unchecked(
    source: &FileKeySource,
    kid: &str,
    bits: usize,
) -> Result<KeySet, KeyStoreError> {
    let existing = source.load().await?;
    if existing
        .current
        .iter()
        .chain(existing.legacy.iter())
        .any(|key| key.kid == kid)
    {
        return Err(KeyStoreError::DuplicateKid(kid.to_string()));
    }

    let new_kid = kid.to_string();
    let key = tokio::task::spawn_blocking(move || generate_rs256(&new_kid, bits))
        .await??;

    let rotated = KeySet {
        current: vec![key],
        legacy: existing.current,
    };
    source.store(&rotated).await?;

    info!(
        kid,
        retired = rotated.legacy.len(),
        dropped = existing.legacy.len(),
        "signing keys rotated"
    );
    Ok(rotated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const TEST_BITS: usize = 1024;

    fn source(dir: &std::path::Path) -> FileKeySource {
        FileKeySource::new(dir.join("current.json"), dir.join("legacy.json"))
    }

    #[test]
    fn generated_key_is_private_rs256() -> Result<()> {
        let key = generate_rs256("k1", TEST_BITS)?;
        assert_eq!(key.kty, "RSA");
        assert_eq!(key.alg.as_deref(), Some("RS256"));
        assert_eq!(key.key_use.as_deref(), Some("sig"));
        assert_eq!(key.kid, "k1");
        assert!(key.has_private_material());
        assert!(!serde_json::to_string(&key.public())?.contains("\"d\""));
        Ok(())
    }

    #[tokio::test]
    async fn rotation_moves_current_to_legacy() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = source(dir.path());

        let first = rotate_unchecked(&source, "k1", TEST_BITS).await?;
        assert_eq!(first.current.len(), 1);
        assert!(first.legacy.is_empty());

        let second = rotate_unchecked(&source, "k2", TEST_BITS).await?;
        assert_eq!(second.current[0].kid, "k2");
        assert_eq!(second.legacy.len(), 1);
        assert_eq!(second.legacy[0].kid, "k1");

        let third = rotate_unchecked(&source, "k3", TEST_BITS).await?;
        let legacy: Vec<&str> = third.legacy.iter().map(|k| k.kid.as_str()).collect();
        assert_eq!(legacy, ["k2"]);

        let on_disk = source.load().await?;
        assert_eq!(on_disk, third);
        Ok(())
    }

    #[tokio::test]
    async fn rotation_rejects_reused_kid_and_small_keys() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = source(dir.path());
        rotate_unchecked(&source, "k1", TEST_BITS).await?;

        assert!(matches!(
            rotate_unchecked(&source, "k1", TEST_BITS).await,
            Err(KeyStoreError::DuplicateKid(kid)) if kid == "k1"
        ));
        assert!(matches!(
            rotate(&source, "k2", 512).await,
            Err(KeyStoreError::KeyTooSmall(512))
        ));
        Ok(())
    }
}
