//! Credential validators used by the stock direct clients

use crate::client::Credentials;
use crate::context::WebContext;
use crate::error::{SecurityError, SecurityResult};
use crate::profile::Profile;
use crate::utils::{
    SecureRandom, current_timestamp, hash_api_key, secure_compare, validate_api_key_format,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Validates credentials and builds the matching profile
///
/// `Ok(None)` means the credentials are not valid; it is not an error.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Validate `credentials` for the current request
    async fn validate(
        &self,
        credentials: &Credentials,
        context: &WebContext,
    ) -> SecurityResult<Option<Profile>>;
}

#[derive(Debug, Clone)]
struct ApiKeyEntry {
    user_id: String,
    roles: BTreeSet<String>,
}

/// API key validator; only SHA-256 hashes of the keys are kept
#[derive(Debug, Clone, Default)]
pub struct ApiKeyAuthenticator {
    api_keys: HashMap<String, ApiKeyEntry>,
}

impl ApiKeyAuthenticator {
    /// Create an empty validator
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an API key for `user_id`
    pub fn add_api_key<S: Into<String>>(&mut self, api_key: &str, user_id: S) -> SecurityResult<()> {
        self.add_api_key_with_roles(api_key, user_id, std::iter::empty::<String>())
    }

    /// Register an API key for `user_id` carrying `roles`
    pub fn add_api_key_with_roles<S, I, R>(
        &mut self,
        api_key: &str,
        user_id: S,
        roles: I,
    ) -> SecurityResult<()>
    where
        S: Into<String>,
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        validate_api_key_format(api_key)?;
        self.api_keys.insert(
            hash_api_key(api_key),
            ApiKeyEntry {
                user_id: user_id.into(),
                roles: roles.into_iter().map(Into::into).collect(),
            },
        );
        Ok(())
    }

    /// Remove an API key
    pub fn remove_api_key(&mut self, api_key: &str) -> bool {
        self.api_keys.remove(&hash_api_key(api_key)).is_some()
    }

    /// Number of stored API keys
    pub fn len(&self) -> usize {
        self.api_keys.len()
    }

    /// Whether no API key is stored
    pub fn is_empty(&self) -> bool {
        self.api_keys.is_empty()
    }

    fn lookup(&self, api_key: &str) -> Option<&ApiKeyEntry> {
        if validate_api_key_format(api_key).is_err() {
            return None;
        }
        let hash = hash_api_key(api_key);
        self.api_keys
            .iter()
            .find(|(stored_hash, _)| secure_compare(&hash, stored_hash))
            .map(|(_, entry)| entry)
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn validate(
        &self,
        credentials: &Credentials,
        _context: &WebContext,
    ) -> SecurityResult<Option<Profile>> {
        let Credentials::Token { token } = credentials else {
            return Ok(None);
        };

        Ok(self.lookup(token).map(|entry| {
            Profile::new(entry.user_id.clone())
                .with_roles(entry.roles.iter().cloned())
                .with_attribute("auth_method", "api_key")
        }))
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (profile id)
    pub sub: String,

    /// Expiration time
    pub exp: u64,

    /// Issued at time
    pub iat: u64,

    /// Not before time
    pub nbf: Option<u64>,

    /// JWT ID
    pub jti: String,

    /// Issuer
    pub iss: String,

    /// Audience
    pub aud: String,

    /// Custom roles
    pub roles: Option<Vec<String>>,

    /// Custom attributes copied onto the profile
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl JwtClaims {
    /// Create new JWT claims
    pub fn new<S: Into<String>>(
        subject: S,
        issuer: &str,
        audience: &str,
        expires_in_seconds: u64,
    ) -> Self {
        let now = current_timestamp();

        Self {
            sub: subject.into(),
            exp: now + expires_in_seconds,
            iat: now,
            nbf: Some(now),
            jti: SecureRandom::base64_url_string(16),
            iss: issuer.to_string(),
            aud: audience.to_string(),
            roles: None,
            metadata: None,
        }
    }

    /// Add roles to the claims
    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = Some(roles.into_iter().map(Into::into).collect());
        self
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        current_timestamp() > self.exp
    }

    fn into_profile(self) -> Profile {
        let mut profile = Profile::new(self.sub)
            .with_roles(self.roles.unwrap_or_default())
            .with_attribute("auth_method", "jwt")
            .with_attribute("iss", self.iss);

        if let Some(expires_at) = i64::try_from(self.exp)
            .ok()
            .and_then(|exp| Utc.timestamp_opt(exp, 0).single())
        {
            profile = profile.with_expiration(expires_at);
        }

        for (key, value) in self.metadata.unwrap_or_default() {
            profile = profile.with_attribute(key, value);
        }
        profile
    }
}

/// HS256 JWT validator
pub struct JwtAuthenticator {
    decoding_key: DecodingKey,
    validation: Validation,
    expected_issuer: String,
    expected_audience: String,
    secret: String,
}

impl std::fmt::Debug for JwtAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtAuthenticator")
            .field("expected_issuer", &self.expected_issuer)
            .field("expected_audience", &self.expected_audience)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl JwtAuthenticator {
    /// Create a new token validator
    pub fn new(secret: &str, issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.validate_exp = true;
        validation.validate_nbf = true;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            expected_issuer: issuer.to_string(),
            expected_audience: audience.to_string(),
            secret: secret.to_string(),
        }
    }

    /// Validate a JWT token and return the claims
    pub fn validate_token(&self, token: &str) -> SecurityResult<JwtClaims> {
        let claims = decode::<JwtClaims>(token, &self.decoding_key, &self.validation)?.claims;

        if claims.is_expired() {
            return Err(SecurityError::TokenExpired);
        }

        if claims.iss != self.expected_issuer {
            return Err(SecurityError::invalid_token("Invalid issuer"));
        }

        if claims.aud != self.expected_audience {
            return Err(SecurityError::invalid_token("Invalid audience"));
        }

        Ok(claims)
    }

    /// Create a JWT token from claims
    pub fn create_token(&self, claims: &JwtClaims) -> SecurityResult<String> {
        let encoding_key = EncodingKey::from_secret(self.secret.as_bytes());
        encode(&Header::new(Algorithm::HS256), claims, &encoding_key).map_err(SecurityError::from)
    }
}

#[async_trait]
impl Authenticator for JwtAuthenticator {
    async fn validate(
        &self,
        credentials: &Credentials,
        _context: &WebContext,
    ) -> SecurityResult<Option<Profile>> {
        let Credentials::Token { token } = credentials else {
            return Ok(None);
        };

        match self.validate_token(token) {
            Ok(claims) => Ok(Some(claims.into_profile())),
            Err(e) => {
                debug!("JWT validation failed: {}", e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{generate_api_key, generate_jwt_secret};

    #[tokio::test]
    async fn test_api_key_authenticator() {
        let mut authenticator = ApiKeyAuthenticator::new();
        let api_key = generate_api_key();
        authenticator
            .add_api_key_with_roles(&api_key, "svc-reporting", ["reader"])
            .unwrap();
        assert_eq!(authenticator.len(), 1);

        let context = WebContext::get("/");
        let profile = authenticator
            .validate(&Credentials::token(api_key.clone()), &context)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.id, "svc-reporting");
        assert!(profile.has_role("reader"));

        let unknown = authenticator
            .validate(&Credentials::token(generate_api_key()), &context)
            .await
            .unwrap();
        assert!(unknown.is_none());

        let malformed = authenticator
            .validate(&Credentials::token("not-a-key"), &context)
            .await
            .unwrap();
        assert!(malformed.is_none());

        assert!(authenticator.remove_api_key(&api_key));
        assert!(authenticator.is_empty());
    }

    #[test]
    fn test_api_key_format_enforced_on_registration() {
        let mut authenticator = ApiKeyAuthenticator::new();
        assert!(authenticator.add_api_key("short", "u").is_err());
    }

    #[tokio::test]
    async fn test_jwt_authenticator_builds_profile() {
        let authenticator = JwtAuthenticator::new(&generate_jwt_secret(), "issuer", "audience");
        let mut claims = JwtClaims::new("jdoe", "issuer", "audience", 3600).with_roles(["admin"]);
        claims.metadata = Some(HashMap::from([(
            "email".to_string(),
            serde_json::json!("jdoe@example.com"),
        )]));
        let token = authenticator.create_token(&claims).unwrap();

        let profile = authenticator
            .validate(&Credentials::token(token), &WebContext::get("/"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.id, "jdoe");
        assert!(profile.has_role("admin"));
        assert_eq!(
            profile.attribute("email"),
            Some(&serde_json::json!("jdoe@example.com"))
        );
        assert!(profile.expires_at.is_some());
        assert!(!profile.is_expired());
    }

    #[tokio::test]
    async fn test_jwt_wrong_issuer_is_absent() {
        let secret = generate_jwt_secret();
        let minting = JwtAuthenticator::new(&secret, "other", "audience");
        let token = minting
            .create_token(&JwtClaims::new("jdoe", "other", "audience", 3600))
            .unwrap();

        let authenticator = JwtAuthenticator::new(&secret, "issuer", "audience");
        assert!(authenticator.validate_token(&token).is_err());
        let profile = authenticator
            .validate(&Credentials::token(token), &WebContext::get("/"))
            .await
            .unwrap();
        assert!(profile.is_none());
    }

    #[test]
    fn test_jwt_garbage_rejected() {
        let authenticator = JwtAuthenticator::new(&generate_jwt_secret(), "i", "a");
        assert!(authenticator.validate_token("").is_err());
        assert!(authenticator.validate_token("not.a.jwt").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let authenticator = JwtAuthenticator::new("super-secret-value", "i", "a");
        let rendered = format!("{authenticator:?}");
        assert!(!rendered.contains("super-secret-value"));
        assert!(rendered.contains("REDACTED"));
    }
}
