use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::{KeySet, KeySource, KeyStoreError, PublicJwks, SigningKey};

pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

#[derive(Debug, Clone)]
struct CachedKeys {
    keys: Arc<KeySet>,
    fetched_at: Instant,
}

impl CachedKeys {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyStatus {
    /// Keys loaded within the TTL and at least one current key.
    Ok,
    /// Reload failed or came back without a current key; serving the previous keys.
    Stale,
    /// Loaded, but there is no current key to sign with.
    Empty,
    /// Never loaded successfully.
    Error,
}

impl DependencyStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Stale => "stale",
            Self::Empty => "empty",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub const fn is_healthy(self) -> bool {
        matches!(self, Self::Ok | Self::Stale)
    }
}

/// Cached signing keys with a TTL, single-flight reload and stale fallback.
///
/// Availability wins over freshness: once any load has succeeded, a failing
/// source, or one that suddenly has no current key, only produces a warning
/// and the previous keys keep being served.
#[derive(Debug)]
pub struct KeyStore<S> {
    source: S,
    ttl: Duration,
    cache: RwLock<Option<CachedKeys>>,
    reload: Mutex<()>,
}

impl<S: KeySource> KeyStore<S> {
    #[must_use]
    pub fn new(source: S, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: RwLock::new(None),
            reload: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    async fn fresh_cache(&self) -> Option<Arc<KeySet>> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|cached| cached.is_fresh(self.ttl))
            .map(|cached| Arc::clone(&cached.keys))
    }

    /// Current and legacy keys, reloading when the cache is missing or stale.
    ///
    /// # Errors
    ///
    /// Returns the source error only when no load has ever succeeded.
    pub async fn keys(&self) -> Result<Arc<KeySet>, KeyStoreError> {
        self.snapshot().await.map(|(keys, _)| keys)
    }

    /// Keys plus whether they are a stale fallback after a failed reload.
    async fn snapshot(&self) -> Result<(Arc<KeySet>, bool), KeyStoreError> {
        if let Some(keys) = self.fresh_cache().await {
            return Ok((keys, false));
        }

        // One reload at a time; whoever waited re-checks before loading again.
        let _reload = self.reload.lock().await;
        let previous = self.cache.read().await.clone();
        if let Some(cached) = previous.as_ref().filter(|c| c.is_fresh(self.ttl)) {
            return Ok((Arc::clone(&cached.keys), false));
        }

        match (self.source.load().await, previous) {
            // Losing every current key is treated as a failed reload, not a rotation.
            (Ok(set), Some(cached))
                if set.current.is_empty() && !cached.keys.current.is_empty() =>
            {
                warn!(
                    legacy = set.legacy.len(),
                    "no current signing key after reload, using stale signing key cache"
                );
                Ok((cached.keys, true))
            }
            (Ok(set), _) => {
                let keys = Arc::new(set);
                *self.cache.write().await = Some(CachedKeys {
                    keys: Arc::clone(&keys),
                    fetched_at: Instant::now(),
                });
                info!(
                    current = keys.current.len(),
                    legacy = keys.legacy.len(),
                    "signing key cache refreshed"
                );
                Ok((keys, false))
            }
            (Err(err), Some(cached)) => {
                warn!(error = %err, "using stale signing key cache");
                Ok((cached.keys, true))
            }
            (Err(err), None) => Err(err),
        }
    }

    /// Keys for signing new tokens.
    ///
    /// # Errors
    ///
    /// See [`KeyStore::keys`].
    pub async fn current_private_keys(&self) -> Result<Vec<SigningKey>, KeyStoreError> {
        Ok(self.keys().await?.current.clone())
    }

    /// Current and legacy keys with every private member stripped.
    ///
    /// # Errors
    ///
    /// See [`KeyStore::keys`].
    pub async fn public_keys(&self) -> Result<PublicJwks, KeyStoreError> {
        let keys = self.keys().await?;
        Ok(PublicJwks {
            keys: keys
                .current
                .iter()
                .chain(keys.legacy.iter())
                .map(SigningKey::public)
                .collect(),
        })
    }

    /// Drop the cached keys so the next read goes to the source.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    /// Health view of the store; triggers a reload when the cache is stale.
    pub async fn dependency_status(&self) -> DependencyStatus {
        match self.snapshot().await {
            Ok((keys, _)) if keys.current.is_empty() => DependencyStatus::Empty,
            Ok((_, true)) => DependencyStatus::Stale,
            Ok((_, false)) => DependencyStatus::Ok,
            Err(err) => {
                warn!(error = %err, "signing keys unavailable during health check");
                DependencyStatus::Error
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::keys::{FileKeySource, KeyFile};
    use anyhow::Result;
    use std::{
        future::Future,
        path::Path,
        sync::atomic::{AtomicUsize, Ordering},
    };

    const KEY_FILE: &str = r#"{"keys":[{
        "kty":"EC","use":"sig","alg":"ES256","kid":"ec-1","crv":"P-256",
        "x":"f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
        "y":"x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0",
        "d":"jpsQnnGQmL-YBIffH1136cLyXnVFsmPhxhh0x9bTZhs"
    }]}"#;

    struct CountingSource {
        loads: AtomicUsize,
        keys: Vec<SigningKey>,
    }

    impl KeySource for CountingSource {
        fn load(&self) -> impl Future<Output = Result<KeySet, KeyStoreError>> + Send {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let current = self.keys.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(KeySet {
                    current,
                    legacy: Vec::new(),
                })
            }
        }
    }

    /// Formatted log output of the current thread, for asserting on warnings.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .map_err(|_| std::io::Error::other("log buffer poisoned"))?
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
            let writer = self.clone();
            tracing_subscriber::fmt()
                .with_ansi(false)
                .with_max_level(tracing::Level::WARN)
                .with_writer(move || writer.clone())
                .finish()
        }

        fn contains(&self, needle: &str) -> bool {
            self.0
                .lock()
                .is_ok_and(|buf| String::from_utf8_lossy(&buf).contains(needle))
        }
    }

    fn file_store(dir: &Path, ttl: Duration) -> KeyStore<FileKeySource> {
        KeyStore::new(
            FileKeySource::new(dir.join("current.json"), dir.join("legacy.json")),
            ttl,
        )
    }

    #[tokio::test]
    async fn loads_current_private_keys() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("current.json"), KEY_FILE)?;
        let store = file_store(dir.path(), Duration::from_secs(300));

        let current = store.current_private_keys().await?;
        assert_eq!(current.len(), 1);
        assert!(current[0].d.is_some());
        assert_eq!(store.dependency_status().await, DependencyStatus::Ok);
        Ok(())
    }

    #[tokio::test]
    async fn public_keys_cover_current_and_legacy_without_secrets() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("current.json"), KEY_FILE)?;
        std::fs::write(
            dir.path().join("legacy.json"),
            KEY_FILE.replace("ec-1", "ec-0"),
        )?;
        let store = file_store(dir.path(), Duration::from_secs(300));

        let jwks = store.public_keys().await?;
        let kids: Vec<&str> = jwks.keys.iter().map(|k| k.kid.as_str()).collect();
        assert_eq!(kids, ["ec-1", "ec-0"]);
        let rendered = serde_json::to_string(&jwks)?;
        assert!(!rendered.contains("\"d\""));
        Ok(())
    }

    #[tokio::test]
    async fn serves_stale_keys_when_files_disappear() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let current = dir.path().join("current.json");
        std::fs::write(&current, KEY_FILE)?;
        let store = file_store(dir.path(), Duration::ZERO);
        assert_eq!(store.current_private_keys().await?.len(), 1);

        // Replace the file with something unreadable after the TTL (zero) elapsed.
        std::fs::remove_file(&current)?;
        std::fs::create_dir(&current)?;

        assert_eq!(store.current_private_keys().await?.len(), 1);
        assert_eq!(store.dependency_status().await, DependencyStatus::Stale);
        Ok(())
    }

    #[tokio::test]
    async fn deleted_files_keep_serving_and_warn() -> Result<()> {
        let logs = CapturedLogs::default();
        let _guard = tracing::subscriber::set_default(logs.subscriber());

        let dir = tempfile::tempdir()?;
        let current = dir.path().join("current.json");
        std::fs::write(&current, KEY_FILE)?;
        let store = file_store(dir.path(), Duration::ZERO);
        assert_eq!(store.current_private_keys().await?.len(), 1);

        std::fs::remove_file(&current)?;
        assert_eq!(store.current_private_keys().await?.len(), 1);
        assert_eq!(store.dependency_status().await, DependencyStatus::Stale);
        assert!(logs.contains("using stale signing key cache"));

        // Keys coming back are picked up on the next read.
        std::fs::write(&current, KEY_FILE)?;
        assert_eq!(store.dependency_status().await, DependencyStatus::Ok);
        Ok(())
    }

    #[tokio::test]
    async fn empty_first_load_reports_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = file_store(dir.path(), Duration::ZERO);
        assert!(store.current_private_keys().await?.is_empty());
        assert_eq!(store.dependency_status().await, DependencyStatus::Empty);
        Ok(())
    }

    #[tokio::test]
    async fn first_load_failure_propagates() -> Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("current.json"), "not json")?;
        let store = file_store(dir.path(), Duration::from_secs(300));
        assert!(store.keys().await.is_err());
        assert_eq!(store.dependency_status().await, DependencyStatus::Error);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_readers_share_one_reload() -> Result<()> {
        let key: KeyFile = serde_json::from_str(KEY_FILE)?;
        let store = Arc::new(KeyStore::new(
            CountingSource {
                loads: AtomicUsize::new(0),
                keys: key.keys,
            },
            Duration::from_secs(300),
        ));

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.keys().await.map(|keys| keys.current.len()) })
            })
            .collect();
        for reader in readers {
            assert_eq!(reader.await??, 1);
        }
        assert_eq!(store.source().loads.load(Ordering::SeqCst), 1);

        store.invalidate().await;
        store.keys().await?;
        assert_eq!(store.source().loads.load(Ordering::SeqCst), 2);
        Ok(())
    }
}
