//! Engine configuration: registries, session backend and settings

use crate::authorizer::Authorizer;
use crate::client::{Clients, DEFAULT_CLIENT_NAME_PARAMETER};
use crate::error::{SecurityError, SecurityResult};
use crate::matcher::Matcher;
use crate::session::{MemorySessionStore, SessionStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;

/// Default name of the session cookie
pub const DEFAULT_SESSION_COOKIE: &str = "WARDEN_SESSION";

/// Behavior switches of the security engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Request parameter selecting one client among the resolved ones
    pub client_name_parameter: String,

    /// Accumulate one profile per client instead of keeping the first
    pub multi_profile: bool,

    /// Also store direct client profiles in the session
    pub save_direct_profiles_in_session: bool,

    /// Redirect AJAX requests to identity providers instead of answering 401
    pub redirect_ajax_requests: bool,

    /// Remember the requested URL before redirecting to an identity provider
    pub save_requested_url: bool,

    /// Cookie carrying the session id
    pub session_cookie_name: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            client_name_parameter: DEFAULT_CLIENT_NAME_PARAMETER.to_string(),
            multi_profile: false,
            save_direct_profiles_in_session: false,
            redirect_ajax_requests: false,
            save_requested_url: true,
            session_cookie_name: DEFAULT_SESSION_COOKIE.to_string(),
        }
    }
}

impl EngineSettings {
    /// Defaults overridden by `WARDEN_*` environment variables
    pub fn from_env() -> SecurityResult<Self> {
        let mut settings = Self::default();
        settings.load_from_env();
        settings.validate()?;
        Ok(settings)
    }

    /// Apply environment overrides; unparsable booleans keep the current value
    pub fn load_from_env(&mut self) {
        if let Ok(parameter) = env::var("WARDEN_CLIENT_NAME_PARAMETER") {
            self.client_name_parameter = parameter;
        }

        if let Ok(cookie) = env::var("WARDEN_SESSION_COOKIE") {
            self.session_cookie_name = cookie;
        }

        override_bool("WARDEN_MULTI_PROFILE", &mut self.multi_profile);
        override_bool(
            "WARDEN_SAVE_DIRECT_PROFILES_IN_SESSION",
            &mut self.save_direct_profiles_in_session,
        );
        override_bool("WARDEN_REDIRECT_AJAX_REQUESTS", &mut self.redirect_ajax_requests);
        override_bool("WARDEN_SAVE_REQUESTED_URL", &mut self.save_requested_url);
    }

    /// Validate the settings
    pub fn validate(&self) -> SecurityResult<()> {
        if self.client_name_parameter.trim().is_empty() {
            return Err(SecurityError::config("client name parameter cannot be empty"));
        }

        let cookie = &self.session_cookie_name;
        if cookie.is_empty()
            || !cookie
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
        {
            return Err(SecurityError::config(format!(
                "invalid session cookie name: {cookie:?}"
            )));
        }

        Ok(())
    }
}

fn override_bool(name: &str, target: &mut bool) {
    if let Ok(value) = env::var(name) {
        *target = value.parse().unwrap_or(*target);
    }
}

/// Everything the engine needs besides the request
#[derive(Clone)]
pub struct Config {
    clients: Option<Clients>,
    authorizers: HashMap<String, Arc<dyn Authorizer>>,
    matchers: HashMap<String, Arc<dyn Matcher>>,
    session_store: Arc<dyn SessionStore>,
    settings: EngineSettings,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut authorizers: Vec<_> = self.authorizers.keys().collect();
        authorizers.sort();
        let mut matchers: Vec<_> = self.matchers.keys().collect();
        matchers.sort();

        f.debug_struct("Config")
            .field("clients", &self.clients)
            .field("authorizers", &authorizers)
            .field("matchers", &matchers)
            .field("settings", &self.settings)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clients: None,
            authorizers: HashMap::new(),
            matchers: HashMap::new(),
            session_store: Arc::new(MemorySessionStore::new()),
            settings: EngineSettings::default(),
        }
    }
}

impl Config {
    /// Configuration over a client registry, with default settings and an in-memory session store
    pub fn new(clients: Clients) -> Self {
        Self::default().with_clients(clients)
    }

    /// Replace the client registry
    pub fn with_clients(mut self, clients: Clients) -> Self {
        self.clients = Some(clients);
        self
    }

    /// Set or clear the client registry
    pub fn set_clients(&mut self, clients: Option<Clients>) {
        self.clients = clients;
    }

    /// Register a named authorizer
    pub fn add_authorizer<S, A>(mut self, name: S, authorizer: A) -> Self
    where
        S: Into<String>,
        A: Authorizer + 'static,
    {
        self.authorizers.insert(name.into(), Arc::new(authorizer));
        self
    }

    /// Register a named matcher
    pub fn add_matcher<S, M>(mut self, name: S, matcher: M) -> Self
    where
        S: Into<String>,
        M: Matcher + 'static,
    {
        self.matchers.insert(name.into(), Arc::new(matcher));
        self
    }

    /// Use another session backend
    pub fn with_session_store<S: SessionStore + 'static>(mut self, store: S) -> Self {
        self.session_store = Arc::new(store);
        self
    }

    /// Use a shared session backend
    pub fn with_shared_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = store;
        self
    }

    /// Replace the settings
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Client registry, if set
    pub fn clients(&self) -> Option<&Clients> {
        self.clients.as_ref()
    }

    /// Named authorizers
    pub fn authorizers(&self) -> &HashMap<String, Arc<dyn Authorizer>> {
        &self.authorizers
    }

    /// Named matchers
    pub fn matchers(&self) -> &HashMap<String, Arc<dyn Matcher>> {
        &self.matchers
    }

    /// Session backend
    pub fn session_store(&self) -> &dyn SessionStore {
        self.session_store.as_ref()
    }

    /// Engine settings
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Check settings and the client registry
    pub fn validate(&self) -> SecurityResult<()> {
        self.settings.validate()?;
        match &self.clients {
            Some(clients) if !clients.is_empty() => Ok(()),
            _ => Err(SecurityError::config("no client registered")),
        }
    }

    /// Get configuration summary for logging
    pub fn summary(&self) -> ConfigSummary {
        let mut authorizers: Vec<String> = self.authorizers.keys().cloned().collect();
        authorizers.sort();
        let mut matchers: Vec<String> = self.matchers.keys().cloned().collect();
        matchers.sort();

        ConfigSummary {
            clients: self
                .clients
                .as_ref()
                .map(|c| c.names().into_iter().map(String::from).collect())
                .unwrap_or_default(),
            default_security_clients: self
                .clients
                .as_ref()
                .and_then(|c| c.default_security_clients())
                .map(String::from),
            authorizers,
            matchers,
            multi_profile: self.settings.multi_profile,
            save_direct_profiles_in_session: self.settings.save_direct_profiles_in_session,
            redirect_ajax_requests: self.settings.redirect_ajax_requests,
            client_name_parameter: self.settings.client_name_parameter.clone(),
        }
    }
}

/// Configuration summary for logging and display
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct ConfigSummary {
    pub clients: Vec<String>,
    pub default_security_clients: Option<String>,
    pub authorizers: Vec<String>,
    pub matchers: Vec<String>,
    pub multi_profile: bool,
    pub save_direct_profiles_in_session: bool,
    pub redirect_ajax_requests: bool,
    pub client_name_parameter: String,
}

impl std::fmt::Display for ConfigSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let list = |items: &[String]| {
            if items.is_empty() {
                "-".to_string()
            } else {
                items.join(", ")
            }
        };
        let flag = |on: bool| if on { "✓ Enabled" } else { "✗ Disabled" };

        writeln!(f, "Warden Security Configuration Summary:")?;
        writeln!(f, "  Clients: {}", list(&self.clients))?;
        writeln!(
            f,
            "  Default Clients: {}",
            self.default_security_clients.as_deref().unwrap_or("all")
        )?;
        writeln!(f, "  Authorizers: {}", list(&self.authorizers))?;
        writeln!(f, "  Matchers: {}", list(&self.matchers))?;
        writeln!(f, "  Multi-Profile: {}", flag(self.multi_profile))?;
        writeln!(
            f,
            "  Direct Profiles In Session: {}",
            flag(self.save_direct_profiles_in_session)
        )?;
        writeln!(f, "  AJAX Redirects: {}", flag(self.redirect_ajax_requests))?;
        write!(f, "  Client Parameter: {}", self.client_name_parameter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::IsAuthenticated;
    use crate::clients::AnonymousClient;
    use crate::matcher::PathMatcher;

    #[test]
    fn test_default_settings() {
        let settings = EngineSettings::default();
        assert_eq!(settings.client_name_parameter, "force_client");
        assert!(!settings.multi_profile);
        assert!(settings.save_requested_url);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = EngineSettings::default();
        settings.client_name_parameter = " ".to_string();
        assert!(settings.validate().unwrap_err().is_config());

        let mut settings = EngineSettings::default();
        settings.session_cookie_name = "bad cookie;".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_env_settings_loading() {
        unsafe {
            env::set_var("WARDEN_MULTI_PROFILE", "true");
            env::set_var("WARDEN_SAVE_REQUESTED_URL", "not-a-bool");
            env::set_var("WARDEN_CLIENT_NAME_PARAMETER", "client_name");
        }

        let mut settings = EngineSettings::default();
        settings.load_from_env();
        assert!(settings.multi_profile);
        assert!(settings.save_requested_url);
        assert_eq!(settings.client_name_parameter, "client_name");

        unsafe {
            env::remove_var("WARDEN_MULTI_PROFILE");
            env::remove_var("WARDEN_SAVE_REQUESTED_URL");
            env::remove_var("WARDEN_CLIENT_NAME_PARAMETER");
        }
    }

    #[test]
    fn test_settings_deserialize_with_defaults() {
        let settings: EngineSettings =
            serde_json::from_str(r#"{"multi_profile": true}"#).unwrap();
        assert!(settings.multi_profile);
        assert_eq!(settings.session_cookie_name, DEFAULT_SESSION_COOKIE);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().unwrap_err().is_config());

        config.set_clients(Some(
            Clients::new(vec![Arc::new(AnonymousClient::new())]).unwrap(),
        ));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_summary() {
        let clients = Clients::new(vec![Arc::new(AnonymousClient::new())])
            .unwrap()
            .with_default_security_clients("AnonymousClient");
        let config = Config::new(clients)
            .add_authorizer("isAuthenticated", IsAuthenticated)
            .add_matcher("all", PathMatcher::new());

        let summary = config.summary();
        assert_eq!(summary.clients, vec!["AnonymousClient"]);
        assert_eq!(summary.authorizers, vec!["isAuthenticated"]);
        assert_eq!(summary.matchers, vec!["all"]);

        let rendered = summary.to_string();
        assert!(rendered.contains("Clients: AnonymousClient"));
        assert!(rendered.contains("Multi-Profile: ✗ Disabled"));
    }
}
