//! Reading and writing profiles against the request and the session
//!
//! Request-scoped profiles live in a [`WebContext`] attribute and vanish with
//! the request. Session-scoped profiles live in the [`SessionStore`] under the
//! caller's session id and survive until removed or replaced.

use crate::context::WebContext;
use crate::error::SecurityResult;
use crate::profile::{Profile, ProfileSet};
use crate::session::SessionStore;
use tracing::debug;

/// Key of the profile set, both as request attribute and session value
pub const USER_PROFILES: &str = "warden.user_profiles";
/// Request attribute recording whether profiles came from the session
pub const LOAD_PROFILES_FROM_SESSION: &str = "warden.load_profiles_from_session";
/// Session key of the URL to return to after an identity provider round-trip
pub const REQUESTED_URL: &str = "warden.requested_url";

/// Profile store bound to one request
pub struct ProfileManager<'a> {
    context: &'a mut WebContext,
    store: &'a dyn SessionStore,
}

impl<'a> ProfileManager<'a> {
    /// Bind a manager to the current request and session backend
    pub fn new(context: &'a mut WebContext, store: &'a dyn SessionStore) -> Self {
        Self { context, store }
    }

    /// Current request
    pub fn context(&self) -> &WebContext {
        self.context
    }

    /// Profiles stored in the session, expired ones dropped
    pub async fn load(&self) -> SecurityResult<ProfileSet> {
        let Some(session_id) = self.context.session_id() else {
            return Ok(ProfileSet::new());
        };

        let mut profiles = match self.store.get(session_id, USER_PROFILES).await? {
            Some(value) => serde_json::from_value::<ProfileSet>(value)?,
            None => ProfileSet::new(),
        };

        let expired = profiles.remove_expired();
        if expired > 0 {
            debug!("Dropped {} expired session profile(s)", expired);
        }
        Ok(profiles)
    }

    /// Profiles already resolved during this request, expired ones dropped
    pub fn load_from_request(&self) -> SecurityResult<ProfileSet> {
        let mut profiles = match self.context.request_attribute(USER_PROFILES) {
            Some(value) => serde_json::from_value::<ProfileSet>(value.clone())?,
            None => ProfileSet::new(),
        };
        profiles.remove_expired();
        Ok(profiles)
    }

    /// Request profiles, plus session profiles when `from_session` is set
    ///
    /// Session entries win over request entries recorded under the same client.
    pub async fn load_all(&self, from_session: bool) -> SecurityResult<ProfileSet> {
        let mut profiles = self.load_from_request()?;
        if from_session {
            profiles.merge(self.load().await?);
        }
        Ok(profiles)
    }

    /// Store a profile set in the request, and in the session when `to_session`
    pub async fn save(&mut self, profiles: &ProfileSet, to_session: bool) -> SecurityResult<()> {
        let value = serde_json::to_value(profiles)?;
        self.context
            .set_request_attribute(USER_PROFILES, value.clone());

        if to_session {
            let session_id = self.context.ensure_session_id();
            self.store.set(&session_id, USER_PROFILES, value).await?;
            debug!(
                "Saved {} profile(s) in session {}",
                profiles.len(),
                session_id
            );
        }
        Ok(())
    }

    /// Store one profile under `client_name`
    ///
    /// In multi-profile mode the profile joins the existing set, replacing any
    /// previous entry for the same client; otherwise it becomes the only one.
    pub async fn save_profile(
        &mut self,
        client_name: &str,
        profile: Profile,
        to_session: bool,
        multi_profile: bool,
    ) -> SecurityResult<()> {
        let mut profiles = if multi_profile {
            self.load_all(to_session).await?
        } else {
            ProfileSet::new()
        };
        profiles.insert(client_name, profile);
        self.save(&profiles, to_session).await
    }

    /// Remove the profile recorded for `client_name` from both scopes
    pub async fn remove(&mut self, client_name: &str) -> SecurityResult<()> {
        let mut request_profiles = self.load_from_request()?;
        if request_profiles.remove(client_name).is_some() {
            self.context.set_request_attribute(
                USER_PROFILES,
                serde_json::to_value(&request_profiles)?,
            );
        }

        if self.context.session_id().is_some() {
            let mut session_profiles = self.load().await?;
            if session_profiles.remove(client_name).is_some() {
                self.save_session_only(&session_profiles).await?;
            }
        }
        Ok(())
    }

    /// Remove every profile from both scopes
    pub async fn remove_all(&mut self) -> SecurityResult<()> {
        self.context.remove_request_attribute(USER_PROFILES);
        if let Some(session_id) = self.context.session_id() {
            self.store.remove(session_id, USER_PROFILES).await?;
        }
        Ok(())
    }

    /// Whether the current request is authenticated
    pub async fn is_authenticated(&self, from_session: bool) -> SecurityResult<bool> {
        Ok(!self.load_all(from_session).await?.is_empty())
    }

    /// Record where the accepted profiles came from
    pub fn set_loaded_from_session(&mut self, loaded: bool) {
        self.context
            .set_request_attribute(LOAD_PROFILES_FROM_SESSION, serde_json::Value::Bool(loaded));
    }

    /// Where the accepted profiles came from, if decided yet
    pub fn loaded_from_session(&self) -> Option<bool> {
        loaded_from_session(self.context)
    }

    /// Move the session to a fresh id, carrying its values over
    ///
    /// A no-op when the id was already issued during this request, so only an
    /// id presented by the caller is ever replaced.
    pub async fn renew_session(&mut self) -> SecurityResult<()> {
        if self.context.session_created() {
            return Ok(());
        }
        if let Some(previous) = self.context.renew_session_id() {
            let session_id = self.context.ensure_session_id();
            self.store.renew(&previous, &session_id).await?;
        }
        Ok(())
    }

    /// Remember the URL to come back to after an identity provider round-trip
    pub async fn save_requested_url(&mut self, url: String) -> SecurityResult<()> {
        let session_id = self.context.ensure_session_id();
        self.store
            .set(&session_id, REQUESTED_URL, serde_json::Value::String(url))
            .await
    }

    async fn save_session_only(&mut self, profiles: &ProfileSet) -> SecurityResult<()> {
        if let Some(session_id) = self.context.session_id() {
            self.store
                .set(session_id, USER_PROFILES, serde_json::to_value(profiles)?)
                .await?;
        }
        Ok(())
    }
}

/// Where the accepted profiles of `context` came from, if decided yet
pub fn loaded_from_session(context: &WebContext) -> Option<bool> {
    context
        .request_attribute(LOAD_PROFILES_FROM_SESSION)
        .and_then(serde_json::Value::as_bool)
}

/// Profiles recorded in the request by a previous decision
pub fn request_profiles(context: &WebContext) -> Option<ProfileSet> {
    context
        .request_attribute(USER_PROFILES)
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}
