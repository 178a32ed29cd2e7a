//! Request matchers and the matcher gate
//!
//! A matcher decides whether security applies to a request at all. When the
//! gate rejects, the engine steps aside and the host handles the request.

use crate::context::WebContext;
use crate::error::{SecurityError, SecurityResult};
use crate::utils::{non_blank, split_names};
use axum::http::Method;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// A predicate over the request only
pub trait Matcher: Send + Sync {
    /// Whether security applies to this request
    fn matches(&self, context: &WebContext) -> SecurityResult<bool>;
}

/// Matcher backed by a closure
pub struct FnMatcher<F>(F);

impl<F> Matcher for FnMatcher<F>
where
    F: Fn(&WebContext) -> bool + Send + Sync,
{
    fn matches(&self, context: &WebContext) -> SecurityResult<bool> {
        Ok((self.0)(context))
    }
}

/// Wrap a closure as a [`Matcher`]
pub fn matcher_fn<F>(f: F) -> FnMatcher<F>
where
    F: Fn(&WebContext) -> bool + Send + Sync,
{
    FnMatcher(f)
}

/// Matches every path except the excluded ones
///
/// Exact paths and regex patterns can both be excluded; a pattern must match
/// the whole path.
#[derive(Debug, Clone, Default)]
pub struct PathMatcher {
    excluded_paths: HashSet<String>,
    excluded_patterns: Vec<Regex>,
}

impl PathMatcher {
    /// Matcher excluding nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude one exact path
    pub fn exclude_path<S: Into<String>>(mut self, path: S) -> Self {
        self.excluded_paths.insert(path.into());
        self
    }

    /// Exclude every path matching `pattern`
    pub fn exclude_regex(mut self, pattern: &str) -> SecurityResult<Self> {
        let anchored = format!("^(?:{pattern})$");
        let regex = Regex::new(&anchored)
            .map_err(|e| SecurityError::config(format!("invalid path pattern {pattern}: {e}")))?;
        self.excluded_patterns.push(regex);
        Ok(self)
    }
}

impl Matcher for PathMatcher {
    fn matches(&self, context: &WebContext) -> SecurityResult<bool> {
        let path = context.path();
        if self.excluded_paths.contains(path) {
            return Ok(false);
        }
        Ok(!self.excluded_patterns.iter().any(|re| re.is_match(path)))
    }
}

/// Matches requests using one of the given methods
#[derive(Debug, Clone)]
pub struct HttpMethodMatcher {
    methods: Vec<Method>,
}

impl HttpMethodMatcher {
    /// Matcher accepting `methods`
    pub fn new<I: IntoIterator<Item = Method>>(methods: I) -> Self {
        Self {
            methods: methods.into_iter().collect(),
        }
    }
}

impl Matcher for HttpMethodMatcher {
    fn matches(&self, context: &WebContext) -> SecurityResult<bool> {
        Ok(self.methods.contains(context.method()))
    }
}

/// Evaluates a named matcher list
pub trait MatchingChecker: Send + Sync {
    /// Whether all matchers named in `names` match the request
    fn matches(
        &self,
        context: &WebContext,
        names: Option<&str>,
        matchers: &HashMap<String, Arc<dyn Matcher>>,
    ) -> SecurityResult<bool>;
}

/// Logical AND over the named matchers, short-circuiting on the first miss
///
/// No names means every request matches. Unknown names are configuration
/// errors and are reported even if an earlier matcher already missed.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMatchingChecker;

impl MatchingChecker for DefaultMatchingChecker {
    fn matches(
        &self,
        context: &WebContext,
        names: Option<&str>,
        matchers: &HashMap<String, Arc<dyn Matcher>>,
    ) -> SecurityResult<bool> {
        let Some(names) = non_blank(names) else {
            return Ok(true);
        };

        let resolved = split_names(names)
            .into_iter()
            .map(|name| {
                find_named(matchers, name)
                    .map(|matcher| (name, matcher))
                    .ok_or_else(|| SecurityError::config(format!("unknown matcher: {name}")))
            })
            .collect::<SecurityResult<Vec<_>>>()?;

        for (name, matcher) in resolved {
            if !matcher.matches(context)? {
                debug!("Matcher {} rejected {} {}", name, context.method(), context.path());
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Look up a named component, ignoring case
pub(crate) fn find_named<'a, T: ?Sized>(
    registry: &'a HashMap<String, Arc<T>>,
    name: &str,
) -> Option<&'a Arc<T>> {
    registry.get(name).or_else(|| {
        registry
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}
