use std::{
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::debug;

use super::{KeyFile, KeySet, KeyStoreError, SigningKey};

/// Where signing keys come from. Loading must be side-effect free so that a
/// reload can be retried at will.
pub trait KeySource: Send + Sync {
    fn load(&self) -> impl Future<Output = Result<KeySet, KeyStoreError>> + Send;
}

/// Two JWKS files on disk: `current` signs, `legacy` only verifies.
#[derive(Clone, Debug)]
pub struct FileKeySource {
    current_path: PathBuf,
    legacy_path: PathBuf,
}

impl FileKeySource {
    #[must_use]
    pub fn new(current_path: PathBuf, legacy_path: PathBuf) -> Self {
        Self {
            current_path,
            legacy_path,
        }
    }

    #[must_use]
    pub fn current_path(&self) -> &Path {
        &self.current_path
    }

    #[must_use]
    pub fn legacy_path(&self) -> &Path {
        &self.legacy_path
    }

    /// Persist a key set, legacy first so a crash in between never drops the
    /// keys that verify outstanding signatures.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be written.
    pub async fn store(&self, set: &KeySet) -> Result<(), KeyStoreError> {
        write_key_file(&self.legacy_path, &set.legacy).await?;
        write_key_file(&self.current_path, &set.current).await
    }
}

impl KeySource for FileKeySource {
    async fn load(&self) -> Result<KeySet, KeyStoreError> {
        Ok(KeySet {
            current: read_key_file(&self.current_path).await?,
            legacy: read_key_file(&self.legacy_path).await?,
        })
    }
}

/// Read a JWKS file. A missing file is an empty set.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub async fn read_key_file(path: &Path) -> Result<Vec<SigningKey>, KeyStoreError> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "key file not found, treating as empty");
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(KeyStoreError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    let file: KeyFile = serde_json::from_str(&contents).map_err(|source| KeyStoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(file.keys)
}

/// Write a JWKS file through a sibling temp file and a rename.
///
/// # Errors
///
/// Returns an error if serialization, the write, or the rename fails.
pub async fn write_key_file(path: &Path, keys: &[SigningKey]) -> Result<(), KeyStoreError> {
    let document = KeyFile {
        keys: keys.to_vec(),
    };
    let json = serde_json::to_vec_pretty(&document)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let write_err = |source| KeyStoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    tokio::fs::write(&tmp_path, json).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const RSA_PUBLIC_ONLY: &str = r#"{"keys":[{"kty":"RSA","kid":"a","n":"AQAB","e":"AQAB"}]}"#;

    #[tokio::test]
    async fn missing_files_load_as_empty_sets() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let source = FileKeySource::new(dir.path().join("current.json"), dir.path().join("legacy.json"));
        let set = source.load().await?;
        assert!(set.current.is_empty());
        assert!(set.legacy.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn invalid_json_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let current = dir.path().join("current.json");
        std::fs::write(&current, "{ not json")?;
        let source = FileKeySource::new(current, dir.path().join("legacy.json"));
        assert!(matches!(source.load().await, Err(KeyStoreError::Parse { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_path_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        // A directory exists but is not a readable file.
        let source = FileKeySource::new(dir.path().to_path_buf(), dir.path().join("legacy.json"));
        assert!(matches!(source.load().await, Err(KeyStoreError::Read { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn store_then_load_round_trips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let legacy = dir.path().join("legacy.json");
        std::fs::write(&legacy, RSA_PUBLIC_ONLY)?;
        let source = FileKeySource::new(dir.path().join("current.json"), legacy);

        let mut set = source.load().await?;
        assert_eq!(set.legacy.len(), 1);
        set.current = set.legacy.clone();
        source.store(&set).await?;

        let reloaded = source.load().await?;
        assert_eq!(reloaded.current, set.current);
        assert_eq!(reloaded.legacy, set.legacy);
        assert!(!dir.path().join("current.json.tmp").exists());
        Ok(())
    }
}
