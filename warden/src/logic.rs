//! The per-request security decision
//!
//! [`SecurityLogic::decide`] runs the matcher gate, resolves the clients,
//! authenticates through direct clients then the session, authorizes the
//! resulting profiles and answers with a [`Verdict`]. [`SecurityLogic::perform`]
//! wraps it with the host's grant callback and action adapter.

use crate::action::{Attempt, AuthorizationDecision, HttpAction};
use crate::authorizer::{AuthorizationChecker, DefaultAuthorizationChecker};
use crate::client::{Client, ClientFinder, DefaultClientFinder};
use crate::config::{Config, EngineSettings};
use crate::context::WebContext;
use crate::error::{SecurityError, SecurityResult};
use crate::matcher::{DefaultMatchingChecker, MatchingChecker};
use crate::profile::ProfileSet;
use crate::profile_manager::ProfileManager;
use axum::http::Method;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Per-invocation parameters
///
/// Name lists are comma-separated; `None` or blank means all clients, no
/// authorizer (allow) and no matcher (match everything) respectively.
#[derive(Debug, Clone, Default)]
pub struct SecurityParameters {
    /// Client names
    pub clients: Option<String>,
    /// Authorizer names
    pub authorizers: Option<String>,
    /// Matcher names
    pub matchers: Option<String>,
    /// Overrides [`EngineSettings::multi_profile`] when set
    pub multi_profile: Option<bool>,
    /// Forwarded verbatim to the grant callback
    pub extra: HashMap<String, serde_json::Value>,
}

impl SecurityParameters {
    /// Empty parameters
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to these clients
    pub fn clients<S: Into<String>>(mut self, clients: S) -> Self {
        self.clients = Some(clients.into());
        self
    }

    /// Require these authorizers
    pub fn authorizers<S: Into<String>>(mut self, authorizers: S) -> Self {
        self.authorizers = Some(authorizers.into());
        self
    }

    /// Apply only when these matchers match
    pub fn matchers<S: Into<String>>(mut self, matchers: S) -> Self {
        self.matchers = Some(matchers.into());
        self
    }

    /// Force multi-profile mode on or off
    pub fn multi_profile(mut self, multi_profile: bool) -> Self {
        self.multi_profile = Some(multi_profile);
        self
    }

    /// Add an extra parameter for the grant callback
    pub fn extra<K: Into<String>, V: Into<serde_json::Value>>(mut self, key: K, value: V) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// What the grant callback receives
#[derive(Debug, Clone)]
pub struct GrantedAccess {
    /// The request as it stood when access was granted
    pub context: WebContext,
    /// Authenticated and authorized profiles
    pub profiles: ProfileSet,
    /// Extra invocation parameters
    pub extra: HashMap<String, serde_json::Value>,
    /// Whether the profiles were read from the session
    pub loaded_from_session: bool,
}

/// Outcome of [`SecurityLogic::decide`]
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Access granted
    Granted(GrantedAccess),
    /// The host must answer with this action
    Action(HttpAction),
    /// The matcher gate rejected the request; security does not apply
    Bypassed,
}

/// Outcome of [`SecurityLogic::perform`]
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition<R> {
    /// Value returned by the grant callback
    Granted(R),
    /// Value returned by the action adapter
    Action(R),
    /// Neither callback ran
    Bypassed,
}

impl<R> Disposition<R> {
    /// Value produced by either callback
    pub fn into_inner(self) -> Option<R> {
        match self {
            Self::Granted(value) | Self::Action(value) => Some(value),
            Self::Bypassed => None,
        }
    }
}

/// Turns an [`HttpAction`] into the host's response type
pub trait HttpActionAdapter<R>: Send + Sync {
    /// Adapt `action` for the current request
    fn adapt(&self, action: HttpAction, context: &WebContext) -> R;
}

/// Action adapter backed by a closure
pub struct FnActionAdapter<F>(F);

impl<R, F> HttpActionAdapter<R> for FnActionAdapter<F>
where
    F: Fn(HttpAction, &WebContext) -> R + Send + Sync,
{
    fn adapt(&self, action: HttpAction, context: &WebContext) -> R {
        (self.0)(action, context)
    }
}

/// Wrap a closure as an [`HttpActionAdapter`]
pub fn adapter_fn<R, F>(f: F) -> FnActionAdapter<F>
where
    F: Fn(HttpAction, &WebContext) -> R + Send + Sync,
{
    FnActionAdapter(f)
}

/// The security decision engine
///
/// Holds no per-request state; one instance serves every request.
#[derive(Clone)]
pub struct SecurityLogic {
    client_finder: Option<Arc<dyn ClientFinder>>,
    authorization_checker: Option<Arc<dyn AuthorizationChecker>>,
    matching_checker: Option<Arc<dyn MatchingChecker>>,
}

impl std::fmt::Debug for SecurityLogic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityLogic")
            .field("client_finder", &self.client_finder.is_some())
            .field("authorization_checker", &self.authorization_checker.is_some())
            .field("matching_checker", &self.matching_checker.is_some())
            .finish()
    }
}

impl Default for SecurityLogic {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityLogic {
    /// Engine with the default finder, authorization checker and matcher checker
    pub fn new() -> Self {
        Self::for_settings(&EngineSettings::default())
    }

    /// Engine whose client finder reads `settings.client_name_parameter`
    pub fn for_settings(settings: &EngineSettings) -> Self {
        Self {
            client_finder: Some(Arc::new(DefaultClientFinder::with_parameter(
                settings.client_name_parameter.clone(),
            ))),
            authorization_checker: Some(Arc::new(DefaultAuthorizationChecker)),
            matching_checker: Some(Arc::new(DefaultMatchingChecker)),
        }
    }

    /// Replace the client finder
    pub fn set_client_finder(&mut self, finder: Option<Arc<dyn ClientFinder>>) {
        self.client_finder = finder;
    }

    /// Replace the authorization checker
    pub fn set_authorization_checker(&mut self, checker: Option<Arc<dyn AuthorizationChecker>>) {
        self.authorization_checker = checker;
    }

    /// Replace the matcher checker
    pub fn set_matching_checker(&mut self, checker: Option<Arc<dyn MatchingChecker>>) {
        self.matching_checker = checker;
    }

    /// Decide and hand the outcome to the host
    ///
    /// On grant, `grant` runs and its value is returned; on an action,
    /// `adapter` converts it. On bypass neither runs.
    pub async fn perform<R, G, Fut, A>(
        &self,
        context: &mut WebContext,
        config: Option<&Config>,
        grant: G,
        adapter: Option<&A>,
        parameters: &SecurityParameters,
    ) -> SecurityResult<Disposition<R>>
    where
        G: FnOnce(GrantedAccess) -> Fut,
        Fut: Future<Output = R>,
        A: HttpActionAdapter<R> + ?Sized,
    {
        let adapter = adapter.ok_or_else(|| SecurityError::missing("httpActionAdapter"))?;

        match self.decide(context, config, parameters).await? {
            Verdict::Bypassed => Ok(Disposition::Bypassed),
            Verdict::Granted(access) => Ok(Disposition::Granted(grant(access).await)),
            Verdict::Action(action) => Ok(Disposition::Action(adapter.adapt(action, context))),
        }
    }

    /// Run the decision for one request
    ///
    /// Configuration errors are returned before anything is read or written.
    pub async fn decide(
        &self,
        context: &mut WebContext,
        config: Option<&Config>,
        parameters: &SecurityParameters,
    ) -> SecurityResult<Verdict> {
        let config = config.ok_or_else(|| SecurityError::missing("config"))?;
        let clients = config
            .clients()
            .ok_or_else(|| SecurityError::missing("clients"))?;
        let client_finder = self
            .client_finder
            .as_deref()
            .ok_or_else(|| SecurityError::missing("clientFinder"))?;
        let authorization_checker = self
            .authorization_checker
            .as_deref()
            .ok_or_else(|| SecurityError::missing("authorizationChecker"))?;
        let matching_checker = self
            .matching_checker
            .as_deref()
            .ok_or_else(|| SecurityError::missing("matchingChecker"))?;

        if !matching_checker.matches(context, parameters.matchers.as_deref(), config.matchers())? {
            debug!(
                "No matcher applies to {} {}, skipping security",
                context.method(),
                context.path()
            );
            return Ok(Verdict::Bypassed);
        }

        let settings = config.settings();
        let multi_profile = parameters.multi_profile.unwrap_or(settings.multi_profile);
        let current_clients = client_finder.find(clients, context, parameters.clients.as_deref())?;
        debug!(
            "Resolved clients {:?} for {} {}",
            current_clients.iter().map(|c| c.name()).collect::<Vec<_>>(),
            context.method(),
            context.path()
        );

        let mut manager = ProfileManager::new(context, config.session_store());
        let profiles = match authenticate(&mut manager, &current_clients, multi_profile, settings)
            .await?
        {
            Attempt::Produced(profiles) => profiles,
            Attempt::Action(action) => {
                debug!("Authentication answered {}", action);
                return Ok(Verdict::Action(action));
            }
            Attempt::Absent => {
                debug!("No profile found, answering 401");
                return Ok(Verdict::Action(HttpAction::unauthorized()));
            }
        };

        let decision = authorization_checker
            .is_authorized(
                manager.context(),
                &profiles,
                parameters.authorizers.as_deref(),
                config.authorizers(),
            )
            .await?;

        match decision {
            AuthorizationDecision::Allowed => {}
            AuthorizationDecision::Denied => {
                debug!("Access denied for {:?}", ids(&profiles));
                return Ok(Verdict::Action(HttpAction::forbidden()));
            }
            AuthorizationDecision::Action(action) => {
                debug!("Authorization answered {}", action);
                return Ok(Verdict::Action(action));
            }
        }

        let loaded_from_session = manager.loaded_from_session().unwrap_or(false);
        let to_session = loaded_from_session || settings.save_direct_profiles_in_session;
        if to_session && !loaded_from_session {
            // fresh credentials never land under a session id the caller chose
            manager.renew_session().await?;
        }
        manager.save(&profiles, to_session).await?;

        info!(
            "Access granted to {:?} (from session: {})",
            ids(&profiles),
            loaded_from_session
        );
        Ok(Verdict::Granted(GrantedAccess {
            context: manager.context().clone(),
            profiles,
            extra: parameters.extra.clone(),
            loaded_from_session,
        }))
    }
}

/// Direct clients first, then the session, then the first indirect client's action
async fn authenticate(
    manager: &mut ProfileManager<'_>,
    clients: &[Arc<dyn Client>],
    multi_profile: bool,
    settings: &EngineSettings,
) -> SecurityResult<Attempt<ProfileSet>> {
    if clients.is_empty() {
        manager.set_loaded_from_session(true);
        return Ok(Attempt::Absent);
    }

    // a previous decision in this request already resolved the profiles
    let request_profiles = manager.load_from_request()?;
    if !request_profiles.is_empty() {
        let from_session = manager.loaded_from_session().unwrap_or(false);
        manager.set_loaded_from_session(from_session);
        return Ok(Attempt::Produced(request_profiles));
    }

    let mut profiles = ProfileSet::new();
    for client in clients.iter().filter(|c| !c.is_indirect()) {
        match client.authenticate(manager.context()).await? {
            Attempt::Produced(profile) => {
                debug!("Client {} authenticated profile {}", client.name(), profile.id);
                profiles.insert(client.name(), profile);
                if !multi_profile {
                    break;
                }
            }
            Attempt::Absent => debug!("Client {} found no credentials", client.name()),
            Attempt::Action(action) => {
                debug!("Client {} requires action {}", client.name(), action);
                manager.set_loaded_from_session(false);
                return Ok(Attempt::Action(action));
            }
        }
    }

    if !profiles.is_empty() {
        manager.set_loaded_from_session(false);
        return Ok(Attempt::Produced(profiles));
    }

    let indirect = clients.iter().find(|c| c.is_indirect());
    if indirect.is_none() && !settings.save_direct_profiles_in_session {
        manager.set_loaded_from_session(false);
        return Ok(Attempt::Absent);
    }

    manager.set_loaded_from_session(true);
    let session_profiles = manager.load().await?;
    if !session_profiles.is_empty() {
        debug!("Loaded {} profile(s) from session", session_profiles.len());
        return Ok(Attempt::Produced(session_profiles));
    }

    let Some(client) = indirect else {
        return Ok(Attempt::Absent);
    };
    let action = client.redirect_action(manager.context()).await?;
    if action.location().is_none() {
        return Ok(Attempt::Action(action));
    }

    if manager.context().is_ajax() && !settings.redirect_ajax_requests {
        debug!("AJAX request, answering 401 instead of redirecting to {}", client.name());
        return Ok(Attempt::Action(HttpAction::unauthorized()));
    }

    let method = manager.context().method().clone();
    if settings.save_requested_url && (method == Method::GET || method == Method::HEAD) {
        let url = manager.context().full_request_url();
        manager.save_requested_url(url).await?;
    }

    debug!("Redirecting to identity provider of {}", client.name());
    Ok(Attempt::Action(action))
}

fn ids(profiles: &ProfileSet) -> Vec<&str> {
    profiles.profiles().map(|p| p.id.as_str()).collect()
}
