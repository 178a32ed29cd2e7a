//! # Warden
//!
//! Per-request security decision engine with Axum integration.
//!
//! For each request Warden decides whether the caller is authenticated,
//! whether the resulting profiles are authorized, and otherwise which HTTP
//! action to answer with (redirect to an identity provider, 401, 403 or a
//! custom response). Transport, routing and business logic stay with the host.
//!
//! ## Building blocks
//!
//! - **Clients** authenticate: direct clients read credentials from the
//!   request, indirect clients redirect to an identity provider whose
//!   callback fills the session.
//! - **Matchers** decide whether security applies to a request at all.
//! - **Authorizers** decide access over the whole [`ProfileSet`].
//! - **[`SecurityLogic`]** runs the decision; [`SecurityMiddleware`] plugs it
//!   into an Axum router.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{Router, routing::get, middleware::from_fn};
//! use std::sync::Arc;
//! use warden::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut api_keys = ApiKeyAuthenticator::new();
//!     api_keys.add_api_key_with_roles(&generate_api_key(), "reporting", ["reader"])?;
//!
//!     let clients = Clients::new(vec![
//!         Arc::new(HeaderClient::new("ApiKey", "authorization", api_keys).with_prefix("ApiKey ")),
//!         Arc::new(RedirectClient::new("Sso", "https://idp.example/login")?),
//!     ])?;
//!     let config = Config::new(clients)
//!         .add_authorizer("reader", RequireAnyRole::new(["reader"]))
//!         .add_matcher("excludeHealth", PathMatcher::new().exclude_path("/health"))
//!         .with_settings(env_settings()?);
//!
//!     let middleware = SecurityMiddleware::new(config)?.with_parameters(
//!         SecurityParameters::new()
//!             .authorizers("reader")
//!             .matchers("excludeHealth"),
//!     );
//!
//!     let app: Router = Router::new()
//!         .route("/", get(|| async { "Hello, secure world!" }))
//!         .layer(from_fn(warden_middleware(middleware)));
//!
//!     // Server setup...
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Configuration
//!
//! ```bash
//! WARDEN_CLIENT_NAME_PARAMETER=force_client
//! WARDEN_MULTI_PROFILE=false
//! WARDEN_SAVE_DIRECT_PROFILES_IN_SESSION=false
//! WARDEN_REDIRECT_AJAX_REQUESTS=false
//! WARDEN_SAVE_REQUESTED_URL=true
//! WARDEN_SESSION_COOKIE=WARDEN_SESSION
//! ```

pub mod action;
pub mod authenticator;
pub mod authorizer;
pub mod client;
pub mod clients;
pub mod config;
pub mod context;
pub mod error;
pub mod logic;
pub mod matcher;
pub mod middleware;
pub mod profile;
pub mod profile_manager;
pub mod session;
pub mod utils;

// Re-export main types for convenience
pub use action::{Attempt, AuthorizationDecision, HttpAction};
pub use authenticator::{ApiKeyAuthenticator, Authenticator, JwtAuthenticator, JwtClaims};
pub use authorizer::{
    AuthorizationChecker, Authorizer, DefaultAuthorizationChecker, IsAuthenticated,
    RequireAllRoles, RequireAnyRole, authorizer_fn,
};
pub use client::{Client, ClientFinder, ClientKind, Clients, Credentials, DefaultClientFinder};
pub use clients::{AnonymousClient, HeaderClient, RedirectClient};
pub use config::{Config, ConfigSummary, EngineSettings};
pub use context::WebContext;
pub use error::{SecurityError, SecurityResult};
pub use logic::{
    Disposition, GrantedAccess, HttpActionAdapter, SecurityLogic, SecurityParameters, Verdict,
    adapter_fn,
};
pub use matcher::{
    DefaultMatchingChecker, HttpMethodMatcher, Matcher, MatchingChecker, PathMatcher, matcher_fn,
};
pub use middleware::{AxumActionAdapter, RequestId, SecurityMiddleware, warden_middleware};
pub use profile::{Profile, ProfileSet};
pub use profile_manager::ProfileManager;
pub use session::{MemorySessionStore, SessionStore};
pub use utils::{SecureRandom, generate_api_key, generate_jwt_secret};

/// Version information for the security engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine settings from `WARDEN_*` environment variables
///
/// # Example
/// ```rust
/// use warden::env_settings;
///
/// let settings = env_settings().unwrap();
/// assert!(!settings.client_name_parameter.is_empty());
/// ```
pub fn env_settings() -> SecurityResult<EngineSettings> {
    EngineSettings::from_env()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_constant() {
        assert!(VERSION.contains('.'), "Version should contain dots");
        assert!(
            VERSION.chars().any(char::is_numeric),
            "Version should contain numbers"
        );
    }

    #[test]
    fn test_env_settings_with_invalid_cookie() {
        use std::env;

        unsafe {
            env::set_var("WARDEN_SESSION_COOKIE", "bad cookie");
        }

        let result = env_settings();
        assert!(result.is_err(), "Should fail with an invalid cookie name");

        unsafe {
            env::remove_var("WARDEN_SESSION_COOKIE");
        }
    }
}
