use crate::action::Attempt;
use crate::authenticator::Authenticator;
use crate::client::{Client, ClientKind, Credentials};
use crate::context::WebContext;
use crate::error::SecurityResult;
use crate::profile::Profile;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Direct client reading a token from a request header
///
/// With a prefix (e.g. `"Bearer "`), headers not starting with it are
/// ignored so several header clients can share one header.
#[derive(Clone)]
pub struct HeaderClient {
    name: String,
    header_name: String,
    prefix: String,
    authenticator: Arc<dyn Authenticator>,
}

impl std::fmt::Debug for HeaderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeaderClient")
            .field("name", &self.name)
            .field("header_name", &self.header_name)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl HeaderClient {
    /// Create a client reading `header_name` and validating with `authenticator`
    pub fn new<N, H, A>(name: N, header_name: H, authenticator: A) -> Self
    where
        N: Into<String>,
        H: Into<String>,
        A: Authenticator + 'static,
    {
        Self {
            name: name.into(),
            header_name: header_name.into(),
            prefix: String::new(),
            authenticator: Arc::new(authenticator),
        }
    }

    /// Only accept header values starting with `prefix`, which is stripped
    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.prefix = prefix.into();
        self
    }
}

#[async_trait]
impl Client for HeaderClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ClientKind {
        ClientKind::Direct
    }

    async fn fetch_credentials(&self, context: &WebContext) -> SecurityResult<Attempt<Credentials>> {
        let token = context
            .request_header(&self.header_name)
            .and_then(|value| value.strip_prefix(self.prefix.as_str()))
            .map(str::trim)
            .filter(|token| !token.is_empty());

        Ok(token.map(Credentials::token).into())
    }

    async fn build_profile(
        &self,
        credentials: Credentials,
        context: &WebContext,
    ) -> SecurityResult<Attempt<Profile>> {
        let profile = self.authenticator.validate(&credentials, context).await?;
        if profile.is_none() {
            debug!("Client {} rejected the presented credentials", self.name);
        }
        Ok(profile.into())
    }
}
