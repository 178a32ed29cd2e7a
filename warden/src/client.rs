//! Authentication clients, their registry and the per-request client finder

use crate::action::{Attempt, HttpAction};
use crate::context::WebContext;
use crate::error::{SecurityError, SecurityResult};
use crate::profile::Profile;
use crate::utils::{non_blank, split_names};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Default name of the request parameter selecting one client
pub const DEFAULT_CLIENT_NAME_PARAMETER: &str = "force_client";

/// How a client authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientKind {
    /// Credentials are in the current request; never redirects
    Direct,
    /// Identity provider round-trip; the callback leg fills the session
    Indirect,
}

/// Credentials extracted from a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// Opaque token (API key, bearer token...)
    Token {
        /// Token value
        token: String,
    },
    /// Username and password pair
    UsernamePassword {
        /// Username
        username: String,
        /// Password
        password: String,
    },
    /// Anything else a client needs to carry
    Custom(serde_json::Value),
}

impl Credentials {
    /// Token credentials
    pub fn token<S: Into<String>>(token: S) -> Self {
        Self::Token {
            token: token.into(),
        }
    }
}

/// A pluggable authentication mechanism
#[async_trait]
pub trait Client: Send + Sync {
    /// Name, unique within a registry
    fn name(&self) -> &str;

    /// Direct or indirect
    fn kind(&self) -> ClientKind;

    /// Whether the client needs an identity provider round-trip
    fn is_indirect(&self) -> bool {
        self.kind() == ClientKind::Indirect
    }

    /// Try to obtain credentials from the current request
    async fn fetch_credentials(&self, context: &WebContext) -> SecurityResult<Attempt<Credentials>>;

    /// Turn valid credentials into a profile
    async fn build_profile(
        &self,
        credentials: Credentials,
        context: &WebContext,
    ) -> SecurityResult<Attempt<Profile>>;

    /// Action to take when this client has no profile yet
    ///
    /// Indirect clients answer with a redirect to their identity provider; a
    /// client may also report a terminal status instead.
    async fn redirect_action(&self, _context: &WebContext) -> SecurityResult<HttpAction> {
        Ok(HttpAction::unauthorized())
    }

    /// Credentials then profile; the profile is stamped with this client's name
    async fn authenticate(&self, context: &WebContext) -> SecurityResult<Attempt<Profile>> {
        let credentials = match self.fetch_credentials(context).await? {
            Attempt::Produced(credentials) => credentials,
            Attempt::Absent => return Ok(Attempt::Absent),
            Attempt::Action(action) => return Ok(Attempt::Action(action)),
        };

        let profile = self.build_profile(credentials, context).await?;
        Ok(profile.map(|profile| profile.with_client_name(self.name())))
    }
}

/// Ordered set of registered clients with unique names
#[derive(Clone, Default)]
pub struct Clients {
    clients: Vec<Arc<dyn Client>>,
    default_security_clients: Option<String>,
}

impl std::fmt::Debug for Clients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Clients")
            .field("clients", &self.names())
            .field("default_security_clients", &self.default_security_clients)
            .finish()
    }
}

impl Clients {
    /// Build a registry; names are compared case-insensitively and must be unique
    pub fn new(clients: Vec<Arc<dyn Client>>) -> SecurityResult<Self> {
        let mut seen: HashMap<String, &str> = HashMap::new();
        for client in &clients {
            let name = client.name();
            if name.trim().is_empty() {
                return Err(SecurityError::config("client name cannot be blank"));
            }
            if let Some(existing) = seen.insert(name.to_ascii_lowercase(), name) {
                return Err(SecurityError::config(format!(
                    "duplicate client name: {name} (already registered as {existing})"
                )));
            }
        }

        Ok(Self {
            clients,
            default_security_clients: None,
        })
    }

    /// Client names used when an invocation names none
    pub fn with_default_security_clients<S: Into<String>>(mut self, names: S) -> Self {
        self.default_security_clients = Some(names.into());
        self
    }

    /// Default client names, if configured
    pub fn default_security_clients(&self) -> Option<&str> {
        self.default_security_clients.as_deref()
    }

    /// Find a client by name, ignoring case
    pub fn find_client(&self, name: &str) -> Option<Arc<dyn Client>> {
        self.clients
            .iter()
            .find(|client| client.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// All clients in registration order
    pub fn all(&self) -> &[Arc<dyn Client>] {
        &self.clients
    }

    /// Registered names in order
    pub fn names(&self) -> Vec<&str> {
        self.clients.iter().map(|client| client.name()).collect()
    }

    /// Number of clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Resolves the clients taking part in one invocation
pub trait ClientFinder: Send + Sync {
    /// Ordered clients for `names` (comma-separated, `None` or blank for the defaults)
    fn find(
        &self,
        clients: &Clients,
        context: &WebContext,
        names: Option<&str>,
    ) -> SecurityResult<Vec<Arc<dyn Client>>>;
}

/// Name-list resolution with request-parameter narrowing
///
/// Blank names fall back to the registry's default security clients, then
/// to every registered client. When the request carries
/// [`client_name_parameter`](Self::client_name_parameter), only the resolved
/// clients it names are kept; naming none of them leaves the list empty.
#[derive(Debug, Clone)]
pub struct DefaultClientFinder {
    client_name_parameter: String,
}

impl DefaultClientFinder {
    /// Finder reading the default parameter name
    pub fn new() -> Self {
        Self::with_parameter(DEFAULT_CLIENT_NAME_PARAMETER)
    }

    /// Finder reading a custom parameter name
    pub fn with_parameter<S: Into<String>>(client_name_parameter: S) -> Self {
        Self {
            client_name_parameter: client_name_parameter.into(),
        }
    }

    /// Request parameter selecting a client
    pub fn client_name_parameter(&self) -> &str {
        &self.client_name_parameter
    }
}

impl Default for DefaultClientFinder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFinder for DefaultClientFinder {
    fn find(
        &self,
        clients: &Clients,
        context: &WebContext,
        names: Option<&str>,
    ) -> SecurityResult<Vec<Arc<dyn Client>>> {
        if clients.is_empty() {
            return Err(SecurityError::config("no client registered"));
        }

        let names = non_blank(names).or_else(|| non_blank(clients.default_security_clients()));
        let resolved = match names {
            Some(names) => split_names(names)
                .into_iter()
                .map(|name| {
                    clients
                        .find_client(name)
                        .ok_or_else(|| SecurityError::config(format!("unknown client: {name}")))
                })
                .collect::<SecurityResult<Vec<_>>>()?,
            None => clients.all().to_vec(),
        };

        let Some(requested) = non_blank(context.request_parameter(&self.client_name_parameter))
        else {
            return Ok(resolved);
        };

        let requested = split_names(requested);
        let chosen: Vec<_> = resolved
            .into_iter()
            .filter(|client| {
                requested
                    .iter()
                    .any(|name| client.name().eq_ignore_ascii_case(name))
            })
            .collect();
        debug!(
            "Client parameter {:?} narrowed clients to {:?}",
            requested,
            chosen.iter().map(|c| c.name()).collect::<Vec<_>>()
        );
        Ok(chosen)
    }
}
