//! Utility functions: identifiers, API key hashing, name lists

use crate::error::{SecurityError, SecurityResult};
use base64::{Engine as _, engine::general_purpose};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Prefix carried by every generated API key
pub const API_KEY_PREFIX: &str = "wdn_";

/// Secure random generator for identifiers and secrets
pub struct SecureRandom;

impl SecureRandom {
    /// Generate cryptographically secure random bytes
    pub fn bytes(length: usize) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        (0..length).map(|_| rng.r#gen()).collect()
    }

    /// Generate base64-encoded random string
    pub fn base64_string(byte_length: usize) -> String {
        general_purpose::STANDARD.encode(Self::bytes(byte_length))
    }

    /// Generate URL-safe base64-encoded random string
    pub fn base64_url_string(byte_length: usize) -> String {
        general_purpose::URL_SAFE_NO_PAD.encode(Self::bytes(byte_length))
    }
}

/// Generate an API key: [`API_KEY_PREFIX`] followed by 32 random bytes, base64-url encoded
///
/// # Example
/// ```rust
/// use warden::utils::generate_api_key;
///
/// let api_key = generate_api_key();
/// assert!(api_key.starts_with("wdn_"));
/// ```
pub fn generate_api_key() -> String {
    format!("{API_KEY_PREFIX}{}", SecureRandom::base64_url_string(32))
}

/// Generate a 64 byte JWT signing secret, base64 encoded
pub fn generate_jwt_secret() -> String {
    SecureRandom::base64_string(64)
}

/// Hash an API key for storage (SHA-256, base64)
pub fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    general_purpose::STANDARD.encode(hasher.finalize())
}

/// Validate that a string looks like a generated API key
pub fn validate_api_key_format(key: &str) -> SecurityResult<()> {
    let Some(key_part) = key.strip_prefix(API_KEY_PREFIX) else {
        return Err(SecurityError::invalid_token(format!(
            "API key must start with '{API_KEY_PREFIX}'"
        )));
    };

    if key.len() < 20 {
        return Err(SecurityError::invalid_token("API key too short"));
    }

    if key.len() > 200 {
        return Err(SecurityError::invalid_token("API key too long"));
    }

    if !key_part
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SecurityError::invalid_token("Invalid characters in API key"));
    }

    Ok(())
}

/// Generate a session id
pub fn generate_session_id() -> String {
    format!("sess_{}", SecureRandom::base64_url_string(32))
}

/// Generate a request id for tracing
pub fn generate_request_id() -> String {
    format!("req_{}", SecureRandom::base64_url_string(16))
}

/// Constant-time string comparison
pub fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (byte_a, byte_b) in a.bytes().zip(b.bytes()) {
        result |= byte_a ^ byte_b;
    }

    result == 0
}

/// Current Unix timestamp in seconds
pub fn current_timestamp() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

/// Split a comma-separated name list, trimming entries and skipping blanks
pub fn split_names(names: &str) -> Vec<&str> {
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect()
}

/// `None` for missing or blank name lists
pub fn non_blank(names: Option<&str>) -> Option<&str> {
    names.filter(|n| !n.trim().is_empty())
}
