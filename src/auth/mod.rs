//! Bearer-token storage and inspection
//!
//! The backend hands out a JWT at login; every outbound request reads it
//! from here. The store is process-wide with a single writer at a time:
//! populated by `duet auth`, read by the session and sibling channel,
//! cleared on `duet deauth` or when the backend rejects it.
//!
//! Tokens persist in the system keyring. Tests (and keyring-less
//! environments) disable keyring access and work against the in-process
//! cache alone.

use std::sync::{Mutex, OnceLock};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use keyring::Entry;
use serde::Deserialize;

const KEYRING_SERVICE: &str = "duet";
const KEYRING_USER: &str = "api-token";

#[derive(Clone, Debug, PartialEq, Eq)]
enum CacheEntry {
    Present(String),
    Missing,
}

fn cache() -> &'static Mutex<Option<CacheEntry>> {
    static CACHE: OnceLock<Mutex<Option<CacheEntry>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(None))
}

pub struct TokenStore {
    use_keyring: bool,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::with_keyring(true)
    }

    /// Construct a TokenStore, optionally disabling keyring access
    /// (useful for tests).
    pub fn with_keyring(use_keyring: bool) -> Self {
        Self { use_keyring }
    }

    pub fn store_token(&self, token: &str) -> Result<(), Box<dyn std::error::Error>> {
        if self.use_keyring {
            let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
            entry.set_password(token)?;
        }
        *cache().lock().expect("token cache lock") = Some(CacheEntry::Present(token.to_string()));
        Ok(())
    }

    pub fn get_token(&self) -> Result<Option<String>, Box<dyn std::error::Error>> {
        if let Some(entry) = cache().lock().expect("token cache lock").clone() {
            return Ok(match entry {
                CacheEntry::Present(token) => Some(token),
                CacheEntry::Missing => None,
            });
        }

        if !self.use_keyring {
            return Ok(None);
        }

        let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
        match entry.get_password() {
            Ok(token) => {
                *cache().lock().expect("token cache lock") =
                    Some(CacheEntry::Present(token.clone()));
                Ok(Some(token))
            }
            Err(keyring::Error::NoEntry) => {
                *cache().lock().expect("token cache lock") = Some(CacheEntry::Missing);
                Ok(None)
            }
            Err(err) => Err(Box::new(err)),
        }
    }

    pub fn clear_token(&self) -> Result<(), Box<dyn std::error::Error>> {
        *cache().lock().expect("token cache lock") = Some(CacheEntry::Missing);
        if self.use_keyring {
            let entry = Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(err) => return Err(Box::new(err)),
            }
        }
        Ok(())
    }
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Claims we care about from the login JWT.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TokenPayload {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Decode the payload segment of a JWT without verifying the signature.
/// Verification is the backend's job; the client only reads display claims.
pub fn token_payload(token: &str) -> Option<TokenPayload> {
    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let decoded = URL_SAFE_NO_PAD.decode(payload.as_bytes()).ok()?;
    serde_json::from_slice(&decoded).ok()
}

/// A token with no readable expiry, or a malformed token, counts as
/// expired.
pub fn is_token_expired(token: &str) -> bool {
    match token_payload(token).and_then(|p| p.exp) {
        Some(exp) => exp <= chrono::Utc::now().timestamp(),
        None => true,
    }
}
