//! OIDC Session Management: the check-session iframe protocol.
//!
//! The relying party posts `"<client_id> <session_state>"` to the provider's
//! iframe; the iframe recomputes the state from the script-readable check
//! cookie and answers `changed`, `unchanged` or `error`. [`CHECK_SESSION_HTML`]
//! is that page; [`evaluate`] is the same algorithm on the server side, used to
//! mint and test session states.

use anyhow::{Context, Result};
use rand::{RngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use url::Url;

/// The static page served at `/oidc/check-session`.
pub const CHECK_SESSION_HTML: &str = include_str!("check_session.html");

const SALT_LEN: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckReply {
    Unchanged,
    Changed,
    Error,
}

impl CheckReply {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unchanged => "unchanged",
            Self::Changed => "changed",
            Self::Error => "error",
        }
    }
}

/// `hex(SHA-256(client_id origin check_cookie salt)).salt`, fields space separated.
#[must_use]
pub fn session_state(client_id: &str, origin: &str, check_cookie: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(client_id.as_bytes());
    hasher.update(b" ");
    hasher.update(origin.as_bytes());
    hasher.update(b" ");
    hasher.update(check_cookie.as_bytes());
    hasher.update(b" ");
    hasher.update(salt.as_bytes());
    format!("{}.{salt}", hex::encode(hasher.finalize()))
}

/// Mint a `session_state` for an authorization response with a fresh salt.
///
/// The redirect URI is reduced to its origin, which is what the browser
/// reports to the iframe as the message origin.
///
/// # Errors
///
/// Returns an error if the redirect URI is not an absolute URL or the salt
/// cannot be generated.
pub fn new_session_state(client_id: &str, redirect_uri: &str, check_cookie: &str) -> Result<String> {
    let origin = origin_of(redirect_uri).context("redirect uri has no origin")?;
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .context("failed to generate session state salt")?;
    Ok(session_state(
        client_id,
        &origin,
        check_cookie,
        &hex::encode(salt),
    ))
}

/// Serialized origin of a URL (`scheme://host[:port]`), if it has one.
#[must_use]
pub fn origin_of(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    let origin = url.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}

/// Answer a check-session message the way the iframe does.
///
/// Any missing or empty field is `Error`. No check cookie means no provider
/// session, which the relying party must see as `Changed`.
#[must_use]
pub fn evaluate(message: &str, origin: &str, check_cookie: Option<&str>) -> CheckReply {
    let Some((client_id, state)) = message.rsplit_once(' ') else {
        return CheckReply::Error;
    };
    if client_id.is_empty() || state.is_empty() || origin.is_empty() {
        return CheckReply::Error;
    }
    let Some((hash, salt)) = state.rsplit_once('.') else {
        return CheckReply::Error;
    };
    if hash.is_empty() || salt.is_empty() {
        return CheckReply::Error;
    }
    let Some(cookie) = check_cookie.filter(|cookie| !cookie.is_empty()) else {
        return CheckReply::Changed;
    };

    let expected = session_state(client_id, origin, cookie, salt);
    if bool::from(expected.as_bytes().ct_eq(state.as_bytes())) {
        CheckReply::Unchanged
    } else {
        CheckReply::Changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT: &str = "client-1";
    const ORIGIN: &str = "https://rp.example.com";

    #[test]
    fn session_state_matches_known_digest() {
        assert_eq!(
            session_state(CLIENT, ORIGIN, "checkval", "salt123"),
            "5374fb6260b7811825a85a426d04b417b36e451bb73d293bd7f285a46a94475b.salt123"
        );
    }

    #[test]
    fn matching_state_is_unchanged() {
        let state = session_state(CLIENT, ORIGIN, "checkval", "salt123");
        let message = format!("{CLIENT} {state}");
        assert_eq!(
            evaluate(&message, ORIGIN, Some("checkval")),
            CheckReply::Unchanged
        );
    }

    #[test]
    fn client_id_may_contain_spaces() {
        let client = "my client";
        let state = session_state(client, ORIGIN, "checkval", "s");
        let message = format!("{client} {state}");
        assert_eq!(
            evaluate(&message, ORIGIN, Some("checkval")),
            CheckReply::Unchanged
        );
    }

    #[test]
    fn different_cookie_or_origin_is_changed() {
        let state = session_state(CLIENT, ORIGIN, "checkval", "salt123");
        let message = format!("{CLIENT} {state}");
        assert_eq!(
            evaluate(&message, ORIGIN, Some("other")),
            CheckReply::Changed
        );
        assert_eq!(
            evaluate(&message, "https://evil.example.com", Some("checkval")),
            CheckReply::Changed
        );
    }

    #[test]
    fn missing_cookie_is_changed() {
        let state = session_state(CLIENT, ORIGIN, "checkval", "salt123");
        let message = format!("{CLIENT} {state}");
        assert_eq!(evaluate(&message, ORIGIN, None), CheckReply::Changed);
        assert_eq!(evaluate(&message, ORIGIN, Some("")), CheckReply::Changed);
    }

    #[test]
    fn malformed_messages_are_errors() {
        for message in [
            "",
            "no-space",
            " abc.salt",
            "client ",
            "client nodot",
            "client .salt",
            "client abc.",
        ] {
            assert_eq!(
                evaluate(message, ORIGIN, Some("checkval")),
                CheckReply::Error,
                "message {message:?}"
            );
        }
        assert_eq!(
            evaluate("client abc.salt", "", Some("checkval")),
            CheckReply::Error
        );
    }

    #[test]
    fn new_state_uses_redirect_origin() -> Result<()> {
        let state = new_session_state(CLIENT, "https://rp.example.com/cb?x=1", "checkval")?;
        let message = format!("{CLIENT} {state}");
        assert_eq!(
            evaluate(&message, ORIGIN, Some("checkval")),
            CheckReply::Unchanged
        );
        assert!(new_session_state(CLIENT, "not a url", "checkval").is_err());
        Ok(())
    }

    #[test]
    fn origin_keeps_non_default_port() {
        assert_eq!(
            origin_of("http://localhost:3000/callback"),
            Some("http://localhost:3000".to_string())
        );
        assert_eq!(
            origin_of("https://rp.example.com:443/x"),
            Some(ORIGIN.to_string())
        );
        assert_eq!(origin_of("data:text/plain,hi"), None);
    }

    #[test]
    fn page_reads_check_cookie_and_replies() {
        assert!(CHECK_SESSION_HTML.contains("keyward_session_check"));
        assert!(CHECK_SESSION_HTML.contains("postMessage"));
        assert!(CHECK_SESSION_HTML.contains("lastIndexOf(\" \")"));
        // Only sourceless or opaque-origin messages go unanswered.
        assert!(CHECK_SESSION_HTML.contains(
            "if (typeof event.data !== \"string\") {\n      reply(event, \"error\");"
        ));
        assert!(!CHECK_SESSION_HTML.contains("typeof event.data !== \"string\" ||"));
    }

    #[test]
    fn reply_strings() {
        assert_eq!(CheckReply::Unchanged.as_str(), "unchanged");
        assert_eq!(CheckReply::Changed.as_str(), "changed");
        assert_eq!(CheckReply::Error.as_str(), "error");
    }
}
