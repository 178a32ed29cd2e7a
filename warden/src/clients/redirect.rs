use crate::action::{Attempt, HttpAction};
use crate::client::{Client, ClientKind, Credentials};
use crate::context::WebContext;
use crate::error::{SecurityError, SecurityResult};
use crate::profile::Profile;
use async_trait::async_trait;
use url::Url;

/// Query parameter carrying the client name on the login redirect
pub const CLIENT_NAME_QUERY: &str = "client_name";
/// Query parameter carrying the callback URL on the login redirect
pub const CALLBACK_QUERY: &str = "callback";

/// Indirect client sending the caller to an external login page
///
/// The login page's callback leg is expected to store the resulting profile
/// in the session under this client's name.
#[derive(Debug, Clone)]
pub struct RedirectClient {
    name: String,
    login_url: Url,
    callback_url: Option<String>,
}

impl RedirectClient {
    /// Create a client redirecting to `login_url`
    pub fn new<S: Into<String>>(name: S, login_url: &str) -> SecurityResult<Self> {
        let login_url = Url::parse(login_url)
            .map_err(|e| SecurityError::config(format!("invalid login url {login_url}: {e}")))?;
        Ok(Self {
            name: name.into(),
            login_url,
            callback_url: None,
        })
    }

    /// URL the identity provider should send the caller back to
    pub fn with_callback_url<S: Into<String>>(mut self, callback_url: S) -> Self {
        self.callback_url = Some(callback_url.into());
        self
    }
}

#[async_trait]
impl Client for RedirectClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ClientKind {
        ClientKind::Indirect
    }

    async fn fetch_credentials(&self, _context: &WebContext) -> SecurityResult<Attempt<Credentials>> {
        Ok(Attempt::Absent)
    }

    async fn build_profile(
        &self,
        _credentials: Credentials,
        _context: &WebContext,
    ) -> SecurityResult<Attempt<Profile>> {
        Ok(Attempt::Absent)
    }

    async fn redirect_action(&self, _context: &WebContext) -> SecurityResult<HttpAction> {
        let mut location = self.login_url.clone();
        {
            let mut query = location.query_pairs_mut();
            query.append_pair(CLIENT_NAME_QUERY, &self.name);
            if let Some(callback_url) = &self.callback_url {
                query.append_pair(CALLBACK_QUERY, callback_url);
            }
        }
        Ok(HttpAction::redirect(location))
    }
}
