use crate::auth::keys::{FileKeySource, rotate};
use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub kid: String,
    pub bits: usize,
    pub current_path: PathBuf,
    pub legacy_path: PathBuf,
}

/// Rotate the signing key files in place.
///
/// Running servers pick the new keys up when their key cache expires.
/// # Errors
/// Returns an error if the key files cannot be read or written, or the kid is taken.
pub async fn execute(args: Args) -> Result<()> {
    let source = FileKeySource::new(args.current_path, args.legacy_path);

    let rotated = rotate(&source, &args.kid, args.bits)
        .await
        .with_context(|| format!("failed to rotate signing keys to kid {}", args.kid))?;

    let legacy: Vec<&str> = rotated.legacy.iter().map(|key| key.kid.as_str()).collect();
    info!(
        current = %source.current_path().display(),
        legacy = %source.legacy_path().display(),
        "key files updated"
    );
    println!(
        "current: {}\nlegacy: {}",
        args.kid,
        if legacy.is_empty() {
            "-".to_string()
        } else {
            legacy.join(", ")
        }
    );

    Ok(())
}
