use crate::action::Attempt;
use crate::client::{Client, ClientKind, Credentials};
use crate::context::WebContext;
use crate::error::SecurityResult;
use crate::profile::Profile;
use async_trait::async_trait;

/// Direct client that always yields the anonymous profile
///
/// Placed last in a client list it turns "no identity" into an anonymous
/// identity that authorizers can still reason about.
#[derive(Debug, Clone)]
pub struct AnonymousClient {
    name: String,
}

impl AnonymousClient {
    /// Default client name
    pub const NAME: &'static str = "AnonymousClient";

    /// Create the client under its default name
    pub fn new() -> Self {
        Self {
            name: Self::NAME.to_string(),
        }
    }
}

impl Default for AnonymousClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Client for AnonymousClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> ClientKind {
        ClientKind::Direct
    }

    async fn fetch_credentials(&self, _context: &WebContext) -> SecurityResult<Attempt<Credentials>> {
        Ok(Attempt::Produced(Credentials::Custom(serde_json::Value::Null)))
    }

    async fn build_profile(
        &self,
        _credentials: Credentials,
        _context: &WebContext,
    ) -> SecurityResult<Attempt<Profile>> {
        Ok(Attempt::Produced(Profile::anonymous()))
    }
}
