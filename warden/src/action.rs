//! HTTP actions and the explicit "required action" result variants

use serde::{Deserialize, Serialize};

/// HTTP 200
pub const OK: u16 = 200;
/// HTTP 302
pub const FOUND: u16 = 302;
/// HTTP 401
pub const UNAUTHORIZED: u16 = 401;
/// HTTP 403
pub const FORBIDDEN: u16 = 403;

/// The only vocabulary the engine hands to the host boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HttpAction {
    /// Plain 200 with no content
    Ok,

    /// 302 redirect to an external location
    Redirect {
        /// Target URL
        location: String,
    },

    /// Arbitrary content with a status code
    RenderContent {
        /// Response body
        body: String,
        /// HTTP status
        status: u16,
    },

    /// Bare status code
    Status(u16),
}

impl HttpAction {
    /// 401 Unauthorized
    pub fn unauthorized() -> Self {
        Self::Status(UNAUTHORIZED)
    }

    /// 403 Forbidden
    pub fn forbidden() -> Self {
        Self::Status(FORBIDDEN)
    }

    /// 302 Found to `location`
    pub fn redirect<S: Into<String>>(location: S) -> Self {
        Self::Redirect {
            location: location.into(),
        }
    }

    /// Content with a status code
    pub fn render<S: Into<String>>(body: S, status: u16) -> Self {
        Self::RenderContent {
            body: body.into(),
            status,
        }
    }

    /// HTTP status code carried by this action
    pub fn code(&self) -> u16 {
        match self {
            Self::Ok => OK,
            Self::Redirect { .. } => FOUND,
            Self::RenderContent { status, .. } => *status,
            Self::Status(code) => *code,
        }
    }

    /// Redirect location, if any
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Redirect { location } => Some(location),
            _ => None,
        }
    }
}

impl std::fmt::Display for HttpAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Redirect { location } => write!(f, "302 -> {location}"),
            other => write!(f, "{}", other.code()),
        }
    }
}

/// Outcome of one step performed by a client
///
/// `Absent` is the normal "nothing here" answer and never an error;
/// `Action` short-circuits the whole pipeline with a specific response.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt<T> {
    /// The step produced a value
    Produced(T),
    /// Nothing to produce for this request
    Absent,
    /// The pipeline must stop and answer with this action
    Action(HttpAction),
}

impl<T> Attempt<T> {
    /// Map the produced value
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Attempt<U> {
        match self {
            Self::Produced(value) => Attempt::Produced(f(value)),
            Self::Absent => Attempt::Absent,
            Self::Action(action) => Attempt::Action(action),
        }
    }

    /// Whether a value was produced
    pub fn is_produced(&self) -> bool {
        matches!(self, Self::Produced(_))
    }
}

impl<T> From<Option<T>> for Attempt<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Self::Produced)
    }
}

/// Answer of an authorizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    /// Access allowed by this authorizer
    Allowed,
    /// Access denied; the engine answers 403
    Denied,
    /// Stop with this exact action
    Action(HttpAction),
}

impl From<bool> for AuthorizationDecision {
    fn from(allowed: bool) -> Self {
        if allowed { Self::Allowed } else { Self::Denied }
    }
}
