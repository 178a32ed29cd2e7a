//! Error types for the security engine

use thiserror::Error;

/// Result type for security operations
pub type SecurityResult<T> = Result<T, SecurityError>;

/// Errors that can occur while deciding on a request
///
/// A required HTTP action (redirect, 401, custom status...) is *not* an
/// error: clients and authorizers signal it through
/// [`Attempt::Action`](crate::action::Attempt) and
/// [`AuthorizationDecision::Action`](crate::action::AuthorizationDecision).
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Configuration error: missing collaborator, unknown name, empty registry
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication mechanism failed in an unexpected way
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid token
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Token expired
    #[error("Token expired")]
    TokenExpired,

    /// Invalid API key
    #[error("Invalid API key")]
    InvalidApiKey,

    /// JWT validation error
    #[error("JWT validation error: {0}")]
    JwtValidation(String),

    /// Session store error
    #[error("Session store error: {0}")]
    Session(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic internal error
    #[error("Internal security error: {0}")]
    Internal(String),
}

impl SecurityError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(msg: S) -> Self {
        Self::AuthenticationFailed(msg.into())
    }

    /// Create an invalid token error
    pub fn invalid_token<S: Into<String>>(msg: S) -> Self {
        Self::InvalidToken(msg.into())
    }

    /// Create a JWT validation error
    pub fn jwt<S: Into<String>>(msg: S) -> Self {
        Self::JwtValidation(msg.into())
    }

    /// Create a session store error
    pub fn session<S: Into<String>>(msg: S) -> Self {
        Self::Session(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Error raised when a required collaborator is missing
    pub fn missing(name: &str) -> Self {
        Self::Config(format!("{name} cannot be null"))
    }

    /// Whether this is a configuration (programmer) error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

// Convert jsonwebtoken errors to SecurityError
impl From<jsonwebtoken::errors::Error> for SecurityError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => SecurityError::TokenExpired,
            ErrorKind::InvalidToken => SecurityError::InvalidToken("Invalid JWT token".to_string()),
            ErrorKind::InvalidSignature => {
                SecurityError::InvalidToken("Invalid JWT signature".to_string())
            }
            ErrorKind::InvalidAudience => {
                SecurityError::InvalidToken("Invalid JWT audience".to_string())
            }
            ErrorKind::InvalidIssuer => {
                SecurityError::InvalidToken("Invalid JWT issuer".to_string())
            }
            _ => SecurityError::JwtValidation(err.to_string()),
        }
    }
}
