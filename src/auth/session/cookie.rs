//! The session cookie pair: the `HttpOnly` token cookie and the script-readable
//! check cookie used by the OIDC check-session page.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{AUTHORIZATION, COOKIE, InvalidHeaderValue},
};
use base64ct::{Base64UrlUnpadded, Encoding};
use sha2::{Digest, Sha256};

pub const SESSION_COOKIE_NAME: &str = "keyward_session";
pub const CHECK_COOKIE_NAME: &str = "keyward_session_check";

/// 400 days, the longest lifetime browsers honour for a cookie.
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 400 * 24 * 60 * 60;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    public_base_url: String,
    ttl_seconds: i64,
}

impl SessionConfig {
    #[must_use]
    pub fn new(public_base_url: String) -> Self {
        Self {
            public_base_url,
            ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    #[must_use]
    pub fn public_base_url(&self) -> &str {
        &self.public_base_url
    }

    // Only mark cookies secure when the provider is served over HTTPS.
    fn secure(&self) -> bool {
        self.public_base_url.starts_with("https://")
    }
}

/// Value of the check cookie for a session token.
///
/// Deterministic so the check-session page can reproduce `session_state`, and
/// a one-way hash so the verifier never reaches script-readable storage.
#[must_use]
pub fn check_cookie_value(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    Base64UrlUnpadded::encode_string(&digest)
}

/// Build both `Set-Cookie` values for a freshly issued session token.
///
/// # Errors
///
/// Returns an error if the token contains bytes not allowed in a header.
pub fn session_cookies(
    config: &SessionConfig,
    token: &str,
) -> Result<[HeaderValue; 2], InvalidHeaderValue> {
    let ttl = config.ttl_seconds();
    let session = build_cookie(SESSION_COOKIE_NAME, token, ttl, true, config.secure());
    let check = build_cookie(
        CHECK_COOKIE_NAME,
        &check_cookie_value(token),
        ttl,
        false,
        config.secure(),
    );
    Ok([HeaderValue::from_str(&session)?, HeaderValue::from_str(&check)?])
}

/// Expire both cookies, e.g. on logout.
///
/// # Errors
///
/// Returns an error if a cookie value cannot be encoded as a header.
pub fn clear_session_cookies(
    config: &SessionConfig,
) -> Result<[HeaderValue; 2], InvalidHeaderValue> {
    let session = build_cookie(SESSION_COOKIE_NAME, "", 0, true, config.secure());
    let check = build_cookie(CHECK_COOKIE_NAME, "", 0, false, config.secure());
    Ok([HeaderValue::from_str(&session)?, HeaderValue::from_str(&check)?])
}

fn build_cookie(name: &str, value: &str, max_age: i64, http_only: bool, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/; SameSite=Lax; Max-Age={max_age}");
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Find the raw session token in a bearer header or the session cookie.
#[must_use]
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let Some((key, val)) = pair.trim().split_once('=') else {
                continue;
            };
            if key.trim() == SESSION_COOKIE_NAME {
                let val = val.trim();
                if !val.is_empty() {
                    return Some(val.to_string());
                }
            }
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie_strings(values: &[HeaderValue; 2]) -> Vec<String> {
        values
            .iter()
            .map(|value| value.to_str().unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn session_cookie_is_http_only_and_check_cookie_is_not() {
        let config = SessionConfig::new("https://id.example.com".to_string());
        let cookies = session_cookies(&config, "token-value").map(|c| cookie_strings(&c));
        let cookies = cookies.unwrap_or_default();
        assert_eq!(cookies.len(), 2);

        assert!(cookies[0].starts_with("keyward_session=token-value;"));
        assert!(cookies[0].contains("HttpOnly"));
        assert!(cookies[0].contains("Secure"));
        assert!(cookies[0].contains(&format!("Max-Age={DEFAULT_SESSION_TTL_SECONDS}")));

        let expected_check = format!("keyward_session_check={};", check_cookie_value("token-value"));
        assert!(cookies[1].starts_with(&expected_check));
        assert!(!cookies[1].contains("HttpOnly"));
        assert!(cookies[1].contains(&format!("Max-Age={DEFAULT_SESSION_TTL_SECONDS}")));
    }

    #[test]
    fn plain_http_base_url_drops_secure_flag() {
        let config = SessionConfig::new("http://localhost:8080".to_string()).with_ttl_seconds(60);
        let cookies = session_cookies(&config, "t")
            .map(|c| cookie_strings(&c))
            .unwrap_or_default();
        assert!(cookies.iter().all(|cookie| !cookie.contains("Secure")));
        assert!(cookies.iter().all(|cookie| cookie.contains("Max-Age=60")));
    }

    #[test]
    fn clearing_expires_both_cookies() {
        let config = SessionConfig::new("https://id.example.com".to_string());
        let cookies = clear_session_cookies(&config)
            .map(|c| cookie_strings(&c))
            .unwrap_or_default();
        assert!(cookies[0].starts_with("keyward_session=;"));
        assert!(cookies[1].starts_with("keyward_session_check=;"));
        assert!(cookies.iter().all(|cookie| cookie.contains("Max-Age=0")));
    }

    #[test]
    fn check_cookie_value_is_stable_and_hides_token() {
        let first = check_cookie_value("abc");
        assert_eq!(first, check_cookie_value("abc"));
        assert_ne!(first, check_cookie_value("abd"));
        assert!(!first.contains("abc"));
        assert_eq!(first.len(), 43);
    }

    #[test]
    fn extract_prefers_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        headers.insert(
            COOKIE,
            HeaderValue::from_static("keyward_session=from-cookie"),
        );
        assert_eq!(
            extract_session_token(&headers),
            Some("from-header".to_string())
        );
    }

    #[test]
    fn extract_reads_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static(
                "theme=dark; keyward_session_check=xyz; keyward_session=abc; lang=en",
            ),
        );
        assert_eq!(extract_session_token(&headers), Some("abc".to_string()));
    }

    #[test]
    fn extract_ignores_empty_values() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        headers.insert(COOKIE, HeaderValue::from_static("keyward_session="));
        assert_eq!(extract_session_token(&headers), None);
    }
}
