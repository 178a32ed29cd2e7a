//! Authorizers and the authorization orchestrator

use crate::action::AuthorizationDecision;
use crate::context::WebContext;
use crate::error::{SecurityError, SecurityResult};
use crate::matcher::find_named;
use crate::profile::ProfileSet;
use crate::utils::{non_blank, split_names};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// A predicate over the request and the full profile set
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Decide access for `profiles`
    async fn is_authorized(
        &self,
        context: &WebContext,
        profiles: &ProfileSet,
    ) -> SecurityResult<AuthorizationDecision>;
}

/// Authorizer backed by a closure
pub struct FnAuthorizer<F>(F);

#[async_trait]
impl<F> Authorizer for FnAuthorizer<F>
where
    F: Fn(&WebContext, &ProfileSet) -> bool + Send + Sync,
{
    async fn is_authorized(
        &self,
        context: &WebContext,
        profiles: &ProfileSet,
    ) -> SecurityResult<AuthorizationDecision> {
        Ok((self.0)(context, profiles).into())
    }
}

/// Wrap a closure as an [`Authorizer`]
pub fn authorizer_fn<F>(f: F) -> FnAuthorizer<F>
where
    F: Fn(&WebContext, &ProfileSet) -> bool + Send + Sync,
{
    FnAuthorizer(f)
}

/// Allows when at least one profile is not anonymous
#[derive(Debug, Clone, Copy, Default)]
pub struct IsAuthenticated;

#[async_trait]
impl Authorizer for IsAuthenticated {
    async fn is_authorized(
        &self,
        _context: &WebContext,
        profiles: &ProfileSet,
    ) -> SecurityResult<AuthorizationDecision> {
        Ok(profiles.profiles().any(|p| !p.is_anonymous()).into())
    }
}

/// Allows when some profile has at least one of the roles
#[derive(Debug, Clone)]
pub struct RequireAnyRole {
    roles: BTreeSet<String>,
}

impl RequireAnyRole {
    /// Require any of `roles`
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Authorizer for RequireAnyRole {
    async fn is_authorized(
        &self,
        _context: &WebContext,
        profiles: &ProfileSet,
    ) -> SecurityResult<AuthorizationDecision> {
        Ok(profiles
            .profiles()
            .any(|p| p.has_any_role(self.roles.iter().map(String::as_str)))
            .into())
    }
}

/// Allows when some profile has every one of the roles
#[derive(Debug, Clone)]
pub struct RequireAllRoles {
    roles: BTreeSet<String>,
}

impl RequireAllRoles {
    /// Require all of `roles` on a single profile
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl Authorizer for RequireAllRoles {
    async fn is_authorized(
        &self,
        _context: &WebContext,
        profiles: &ProfileSet,
    ) -> SecurityResult<AuthorizationDecision> {
        Ok(profiles
            .profiles()
            .any(|p| self.roles.iter().all(|role| p.has_role(role)))
            .into())
    }
}

/// Evaluates a named authorizer list
#[async_trait]
pub trait AuthorizationChecker: Send + Sync {
    /// Combined decision of the authorizers named in `names`
    async fn is_authorized(
        &self,
        context: &WebContext,
        profiles: &ProfileSet,
        names: Option<&str>,
        authorizers: &HashMap<String, Arc<dyn Authorizer>>,
    ) -> SecurityResult<AuthorizationDecision>;
}

/// Evaluates authorizers in order, stopping at the first non-allow answer
///
/// No names means allow.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultAuthorizationChecker;

#[async_trait]
impl AuthorizationChecker for DefaultAuthorizationChecker {
    async fn is_authorized(
        &self,
        context: &WebContext,
        profiles: &ProfileSet,
        names: Option<&str>,
        authorizers: &HashMap<String, Arc<dyn Authorizer>>,
    ) -> SecurityResult<AuthorizationDecision> {
        let Some(names) = non_blank(names) else {
            return Ok(AuthorizationDecision::Allowed);
        };

        let resolved = split_names(names)
            .into_iter()
            .map(|name| {
                find_named(authorizers, name)
                    .map(|authorizer| (name, authorizer))
                    .ok_or_else(|| SecurityError::config(format!("unknown authorizer: {name}")))
            })
            .collect::<SecurityResult<Vec<_>>>()?;

        for (name, authorizer) in resolved {
            match authorizer.is_authorized(context, profiles).await? {
                AuthorizationDecision::Allowed => {}
                decision => {
                    debug!("Authorizer {} answered {:?}", name, decision);
                    return Ok(decision);
                }
            }
        }
        Ok(AuthorizationDecision::Allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::HttpAction;
    use crate::profile::Profile;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn profiles() -> ProfileSet {
        let mut profiles = ProfileSet::new();
        profiles.insert("A", Profile::new("alice").with_roles(["reader", "writer"]));
        profiles.insert("B", Profile::new("bob").with_role("admin"));
        profiles
    }

    #[tokio::test]
    async fn test_role_authorizers_see_every_profile() {
        let context = WebContext::get("/");
        let set = profiles();

        let any = RequireAnyRole::new(["admin", "auditor"]);
        assert_eq!(any.is_authorized(&context, &set).await.unwrap(), AuthorizationDecision::Allowed);

        let all = RequireAllRoles::new(["reader", "writer"]);
        assert_eq!(all.is_authorized(&context, &set).await.unwrap(), AuthorizationDecision::Allowed);

        // roles split across profiles do not satisfy an all-roles requirement
        let split = RequireAllRoles::new(["reader", "admin"]);
        assert_eq!(split.is_authorized(&context, &set).await.unwrap(), AuthorizationDecision::Denied);
    }

    #[tokio::test]
    async fn test_is_authenticated() {
        let context = WebContext::get("/");
        let anonymous = ProfileSet::single("AnonymousClient", Profile::anonymous());
        assert_eq!(
            IsAuthenticated.is_authorized(&context, &anonymous).await.unwrap(),
            AuthorizationDecision::Denied
        );
        assert_eq!(
            IsAuthenticated.is_authorized(&context, &profiles()).await.unwrap(),
            AuthorizationDecision::Allowed
        );
    }

    #[tokio::test]
    async fn test_checker_order_and_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();

        let mut authorizers: HashMap<String, Arc<dyn Authorizer>> = HashMap::new();
        authorizers.insert("deny".to_string(), Arc::new(authorizer_fn(|_, _| false)));
        authorizers.insert(
            "count".to_string(),
            Arc::new(authorizer_fn(move |_, _| {
                counted.fetch_add(1, Ordering::SeqCst);
                true
            })),
        );

        let context = WebContext::get("/");
        let checker = DefaultAuthorizationChecker;

        let decision = checker
            .is_authorized(&context, &profiles(), Some("count,deny,count"), &authorizers)
            .await
            .unwrap();
        assert_eq!(decision, AuthorizationDecision::Denied);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let decision = checker
            .is_authorized(&context, &profiles(), None, &authorizers)
            .await
            .unwrap();
        assert_eq!(decision, AuthorizationDecision::Allowed);
    }

    struct Teapot;

    #[async_trait]
    impl Authorizer for Teapot {
        async fn is_authorized(
            &self,
            _: &WebContext,
            _: &ProfileSet,
        ) -> SecurityResult<AuthorizationDecision> {
            Ok(AuthorizationDecision::Action(HttpAction::Status(418)))
        }
    }

    #[tokio::test]
    async fn test_checker_propagates_action() {
        let mut authorizers: HashMap<String, Arc<dyn Authorizer>> = HashMap::new();
        authorizers.insert("teapot".to_string(), Arc::new(Teapot));
        authorizers.insert("deny".to_string(), Arc::new(authorizer_fn(|_, _| false)));

        let decision = DefaultAuthorizationChecker
            .is_authorized(&WebContext::get("/"), &profiles(), Some("teapot,deny"), &authorizers)
            .await
            .unwrap();
        assert_eq!(decision, AuthorizationDecision::Action(HttpAction::Status(418)));
    }

    #[tokio::test]
    async fn test_unknown_authorizer() {
        let authorizers: HashMap<String, Arc<dyn Authorizer>> = HashMap::new();
        let err = DefaultAuthorizationChecker
            .is_authorized(&WebContext::get("/"), &profiles(), Some("nope"), &authorizers)
            .await
            .unwrap_err();
        assert!(err.is_config());
    }
}
