//! Human-readable prefixed identifiers: `usr_2X7QnuTqsSi64fwdUsY4o`.
//!
//! The suffix is the UUID read as a 128-bit integer, written in base62. The
//! prefix is checked on the way back in, so a session id can never be
//! accepted where a user id is expected.

use uuid::Uuid;

const ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";
const BASE: u128 = 62;

/// Entity types that carry a prefixed identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdKind {
    Session,
    User,
    Organization,
    OidcClient,
    SigningKey,
}

impl IdKind {
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Session => "sess",
            Self::User => "usr",
            Self::Organization => "org",
            Self::OidcClient => "oidc",
            Self::SigningKey => "idpsk",
        }
    }

    #[must_use]
    pub fn encode(self, id: &Uuid) -> String {
        to_human(id, self.prefix())
    }

    #[must_use]
    pub fn decode(self, human: &str) -> Option<Uuid> {
        from_human(human, self.prefix())
    }
}

/// Render `id` as `<prefix>_<base62>`.
#[must_use]
pub fn to_human(id: &Uuid, prefix: &str) -> String {
    format!("{prefix}_{}", base62_encode(id.as_u128()))
}

/// Parse `<prefix>_<base62>`, returning `None` on a prefix mismatch or a bad suffix.
///
/// The split happens at the last underscore, so prefixes may contain underscores.
#[must_use]
pub fn from_human(human: &str, expected_prefix: &str) -> Option<Uuid> {
    let (prefix, suffix) = human.rsplit_once('_')?;
    if prefix != expected_prefix {
        return None;
    }
    base62_decode(suffix).map(Uuid::from_u128)
}

fn base62_encode(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::with_capacity(22);
    while value > 0 {
        let index = usize::try_from(value % BASE).unwrap_or_default();
        digits.push(ALPHABET[index]);
        value /= BASE;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

fn base62_decode(encoded: &str) -> Option<u128> {
    if encoded.is_empty() {
        return None;
    }
    encoded.bytes().try_fold(0u128, |acc, byte| {
        let digit = base62_digit(byte)?;
        acc.checked_mul(BASE)?.checked_add(u128::from(digit))
    })
}

const fn base62_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'z' => Some(byte - b'a' + 10),
        b'A'..=b'Z' => Some(byte - b'A' + 36),
        _ => None,
    }
}
