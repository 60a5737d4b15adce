//! Activation and password-reset tokens
//!
//! Tokens are never stored. Each one is `{timestamp_base36}-{mac}` where the
//! MAC is an HMAC-SHA256 over the account state that the action changes
//! (password hash, active flag, last login, email) plus the timestamp.
//! Activating the account or changing its password therefore invalidates
//! every token issued before, and a token older than the configured timeout
//! is rejected.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{digest::InvalidLength, Hmac, Mac};
use portico_core::{Account, AccountId};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Bytes of the HMAC output kept in the token
const MAC_LEN: usize = 20;

const KEY_SALT: &str = "portico.auth.ActionTokenGenerator";

/// Issues and checks action tokens
#[derive(Clone)]
pub struct ActionTokenGenerator {
    /// Keyed MAC, cloned per token
    mac: HmacSha256,
    timeout_secs: i64,
}

impl std::fmt::Debug for ActionTokenGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionTokenGenerator")
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl ActionTokenGenerator {
    pub fn new(secret: &str, timeout_secs: u64) -> Result<Self, InvalidLength> {
        let mut hasher = Sha256::new();
        hasher.update(KEY_SALT.as_bytes());
        hasher.update(secret.as_bytes());
        let key = hasher.finalize();

        Ok(Self {
            mac: HmacSha256::new_from_slice(&key)?,
            timeout_secs: i64::try_from(timeout_secs).unwrap_or(i64::MAX),
        })
    }

    /// Issue a token for the account's current state
    pub fn make_token(&self, account: &Account) -> String {
        self.make_token_at(account, Utc::now().timestamp())
    }

    /// Check a token against the account's current state
    pub fn check_token(&self, account: &Account, token: &str) -> bool {
        self.check_token_at(account, token, Utc::now().timestamp())
    }

    fn make_token_at(&self, account: &Account, timestamp: i64) -> String {
        let tag = self.mac(account, timestamp).finalize().into_bytes();
        format!(
            "{}-{}",
            to_base36(timestamp),
            URL_SAFE_NO_PAD.encode(&tag[..MAC_LEN])
        )
    }

    fn check_token_at(&self, account: &Account, token: &str, now: i64) -> bool {
        let Some((ts_part, mac_part)) = token.split_once('-') else {
            return false;
        };
        let Some(timestamp) = from_base36(ts_part) else {
            return false;
        };
        let Ok(tag) = URL_SAFE_NO_PAD.decode(mac_part) else {
            return false;
        };
        if tag.len() != MAC_LEN {
            return false;
        }

        // Constant-time comparison
        if self
            .mac(account, timestamp)
            .verify_truncated_left(&tag)
            .is_err()
        {
            return false;
        }

        now.saturating_sub(timestamp) <= self.timeout_secs
    }

    fn mac(&self, account: &Account, timestamp: i64) -> HmacSha256 {
        let last_login = account
            .last_login
            .map(|t| t.timestamp_micros().to_string())
            .unwrap_or_default();

        let id = account.id.to_string();
        let uid = account.uid.to_string();
        let ts = timestamp.to_string();

        let mut mac = self.mac.clone();
        for part in [
            id.as_str(),
            uid.as_str(),
            account.password_hash.as_str(),
            if account.is_active { "1" } else { "0" },
            last_login.as_str(),
            account.email.as_str(),
            ts.as_str(),
        ] {
            mac.update(part.as_bytes());
            mac.update(b"\x1f");
        }
        mac
    }
}

/// Encode an account ID for embedding in a link
pub fn encode_uid(id: AccountId) -> String {
    URL_SAFE_NO_PAD.encode(id.to_string())
}

/// Decode a link-embedded account ID; `None` when it is not one
pub fn decode_uid(uidb64: &str) -> Option<AccountId> {
    let bytes = URL_SAFE_NO_PAD.decode(uidb64.trim_end_matches('=')).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    text.parse().ok()
}

fn to_base36(mut n: i64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n <= 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn from_base36(s: &str) -> Option<i64> {
    // Longer inputs cannot be real timestamps and would overflow
    if s.is_empty() || s.len() > 12 {
        return None;
    }
    i64::from_str_radix(s, 36).ok().filter(|n| *n >= 0)
}
