use crate::{
    auth::{
        keys::{FileKeySource, KeyStore},
        pow::{PowConfig, PowEngine},
        session::cookie::SessionConfig,
    },
    keyward::{self, Services},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub public_base_url: String,
    pub session_ttl_seconds: i64,
    pub keys_current_path: PathBuf,
    pub keys_legacy_path: PathBuf,
    pub keys_cache_ttl_seconds: u64,
    pub pow_secret: SecretString,
    pub pow_difficulty: u32,
    pub pow_max_difficulty: u32,
    pub pow_ttl_seconds: i64,
    pub pow_not_before_seconds: i64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is inconsistent, the database is unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let pow = PowEngine::new(PowConfig {
        secret: args.pow_secret,
        default_difficulty: args.pow_difficulty,
        max_difficulty: args.pow_max_difficulty,
        ttl_seconds: args.pow_ttl_seconds,
        not_before_seconds: args.pow_not_before_seconds,
    })
    .context("invalid proof-of-work configuration")?;

    let keys = KeyStore::new(
        FileKeySource::new(args.keys_current_path, args.keys_legacy_path),
        Duration::from_secs(args.keys_cache_ttl_seconds),
    );

    let session =
        SessionConfig::new(args.public_base_url).with_ttl_seconds(args.session_ttl_seconds);

    let pool = keyward::connect(&args.dsn).await?;

    keyward::new(
        args.port,
        Services {
            pool,
            keys: Arc::new(keys),
            pow: Arc::new(pow),
            session: Arc::new(session),
        },
    )
    .await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(&args.dsn)),
        ("public_base_url", args.public_base_url.clone()),
        ("session_ttl_seconds", args.session_ttl_seconds.to_string()),
        (
            "keys_current_path",
            args.keys_current_path.display().to_string(),
        ),
        (
            "keys_legacy_path",
            args.keys_legacy_path.display().to_string(),
        ),
        (
            "keys_cache_ttl_seconds",
            args.keys_cache_ttl_seconds.to_string(),
        ),
        (
            "pow_difficulty",
            format!("{} (max {})", args.pow_difficulty, args.pow_max_difficulty),
        ),
        ("pow_ttl_seconds", args.pow_ttl_seconds.to_string()),
    ];
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "keyward {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dsn_password_is_redacted() {
        assert_eq!(
            redact_dsn("postgres://keyward:hunter2@db:5432/keyward"),
            "postgres://keyward:REDACTED@db:5432/keyward"
        );
        assert_eq!(
            redact_dsn("postgres://db:5432/keyward"),
            "postgres://db:5432/keyward"
        );
        assert_eq!(redact_dsn("not a url"), "invalid-dsn");
    }

    #[test]
    fn short_commit_truncates() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
    }

    #[tokio::test]
    async fn inconsistent_pow_config_fails_before_connecting() {
        let args = Args {
            port: 0,
            dsn: "postgres://127.0.0.1:1/keyward".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            session_ttl_seconds: 60,
            keys_current_path: PathBuf::from("current.json"),
            keys_legacy_path: PathBuf::from("legacy.json"),
            keys_cache_ttl_seconds: 300,
            pow_secret: SecretString::from("s".to_string()),
            pow_difficulty: 30,
            pow_max_difficulty: 24,
            pow_ttl_seconds: 300,
            pow_not_before_seconds: 0,
        };
        let err = execute(args).await.err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("invalid proof-of-work configuration"));
    }
}
