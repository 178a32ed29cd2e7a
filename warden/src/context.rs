//! Request view handed to clients, matchers and authorizers

use crate::utils::generate_session_id;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri, request::Parts};
use std::collections::HashMap;
use tracing::debug;

/// Header set by browsers' XMLHttpRequest callers
pub const AJAX_HEADER: &str = "x-requested-with";
/// Value of [`AJAX_HEADER`] marking an AJAX call
pub const AJAX_HEADER_VALUE: &str = "XMLHttpRequest";
/// Request parameter forcing AJAX handling
pub const AJAX_PARAMETER: &str = "is_ajax_request";

/// Owned snapshot of one inbound request plus request-scoped attributes
///
/// The engine never holds on to the host's request; the host builds a
/// `WebContext` (see [`WebContext::from_request`]) and keeps the body.
#[derive(Debug, Clone)]
pub struct WebContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    parameters: HashMap<String, Vec<String>>,
    attributes: HashMap<String, serde_json::Value>,
    session_id: Option<String>,
    session_created: bool,
}

impl WebContext {
    /// Create a context for `method` and `uri`; query parameters are parsed
    pub fn new(method: Method, uri: Uri) -> Self {
        let parameters = parse_query(uri.query());
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            parameters,
            attributes: HashMap::new(),
            session_id: None,
            session_created: false,
        }
    }

    /// GET context for a path, mostly useful in tests
    pub fn get(path: &str) -> Self {
        let uri = path.parse::<Uri>().unwrap_or_else(|_| Uri::from_static("/"));
        Self::new(Method::GET, uri)
    }

    /// Build from request parts, reading the session id from `session_cookie`
    pub fn from_parts(parts: &Parts, session_cookie: &str) -> Self {
        let mut context = Self::new(parts.method.clone(), parts.uri.clone());
        context.headers = parts.headers.clone();
        context.session_id = cookie_value(&parts.headers, session_cookie);
        context
    }

    /// Build from a full request without consuming it
    pub fn from_request<B>(request: &Request<B>, session_cookie: &str) -> Self {
        let mut context = Self::new(request.method().clone(), request.uri().clone());
        context.headers = request.headers().clone();
        context.session_id = cookie_value(request.headers(), session_cookie);
        context
    }

    /// Add a request header
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => debug!("Ignoring invalid header {}", name),
        }
        self
    }

    /// Add a request parameter
    pub fn with_parameter<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.parameters
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Attach an existing session id
    pub fn with_session_id<S: Into<String>>(mut self, session_id: S) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// HTTP method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Request URI as received
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Request headers
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a request parameter
    pub fn request_parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Header value as a string, if present and valid UTF-8
    pub fn request_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Absolute URL of the request, rebuilt from the Host header when needed
    pub fn full_request_url(&self) -> String {
        if self.uri.scheme().is_some() {
            return self.uri.to_string();
        }

        let path_and_query = self
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        match self.request_header("host") {
            Some(host) => {
                let scheme = self
                    .request_header("x-forwarded-proto")
                    .unwrap_or("http");
                format!("{scheme}://{host}{path_and_query}")
            }
            None => path_and_query.to_string(),
        }
    }

    /// Whether the request arrived over HTTPS, directly or behind a proxy
    pub fn is_https(&self) -> bool {
        if self.uri.scheme_str() == Some("https") {
            return true;
        }
        if let Some(proto) = self.request_header("x-forwarded-proto") {
            return proto.eq_ignore_ascii_case("https");
        }
        self.request_header("x-forwarded-ssl")
            .is_some_and(|ssl| ssl.eq_ignore_ascii_case("on"))
    }

    /// Whether the request comes from an AJAX caller
    pub fn is_ajax(&self) -> bool {
        self.request_header(AJAX_HEADER)
            .is_some_and(|value| value.eq_ignore_ascii_case(AJAX_HEADER_VALUE))
            || self
                .request_parameter(AJAX_PARAMETER)
                .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }

    /// Request-scoped attribute
    pub fn request_attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    /// Set a request-scoped attribute
    pub fn set_request_attribute<S: Into<String>>(&mut self, name: S, value: serde_json::Value) {
        self.attributes.insert(name.into(), value);
    }

    /// Remove a request-scoped attribute
    pub fn remove_request_attribute(&mut self, name: &str) -> Option<serde_json::Value> {
        self.attributes.remove(name)
    }

    /// Current session id, if the caller presented one
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Current session id, creating a new one if the caller had none
    pub fn ensure_session_id(&mut self) -> String {
        match &self.session_id {
            Some(id) => id.clone(),
            None => {
                let id = generate_session_id();
                debug!("Created session {}", id);
                self.session_id = Some(id.clone());
                self.session_created = true;
                id
            }
        }
    }

    /// Replace the session id with a fresh one, returning the previous id
    pub fn renew_session_id(&mut self) -> Option<String> {
        let id = generate_session_id();
        debug!("Issued session {}", id);
        self.session_created = true;
        self.session_id.replace(id)
    }

    /// Whether a session id was created during this request
    pub fn session_created(&self) -> bool {
        self.session_created
    }
}

fn parse_query(query: Option<&str>) -> HashMap<String, Vec<String>> {
    let mut parameters: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(query) = query {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            parameters
                .entry(name.into_owned())
                .or_default()
                .push(value.into_owned());
        }
    }
    parameters
}

/// Extract a cookie value from the `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == cookie_name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_query_parameters_are_parsed() {
        let context = WebContext::get("/app?force_client=Header&x=1&x=2&name=a%20b");
        assert_eq!(context.path(), "/app");
        assert_eq!(context.request_parameter("force_client"), Some("Header"));
        assert_eq!(context.request_parameter("x"), Some("1"));
        assert_eq!(context.request_parameter("name"), Some("a b"));
        assert_eq!(context.request_parameter("missing"), None);
    }

    #[test]
    fn test_from_request_reads_session_cookie() {
        let request = Request::builder()
            .uri("/secure")
            .header("cookie", "theme=dark; WARDEN_SESSION=sess_abc; other=1")
            .header("host", "example.com")
            .body(Body::empty())
            .unwrap();

        let context = WebContext::from_request(&request, "WARDEN_SESSION");
        assert_eq!(context.session_id(), Some("sess_abc"));
        assert_eq!(context.full_request_url(), "http://example.com/secure");
    }

    #[test]
    fn test_ensure_session_id_creates_once() {
        let mut context = WebContext::get("/");
        assert!(context.session_id().is_none());

        let first = context.ensure_session_id();
        let second = context.ensure_session_id();
        assert_eq!(first, second);
        assert!(first.starts_with("sess_"));
        assert!(context.session_created());

        let mut existing = WebContext::get("/").with_session_id("sess_known");
        assert_eq!(existing.ensure_session_id(), "sess_known");
        assert!(!existing.session_created());
    }

    #[test]
    fn test_ajax_detection() {
        assert!(
            WebContext::get("/")
                .with_header("X-Requested-With", "XMLHttpRequest")
                .is_ajax()
        );
        assert!(WebContext::get("/?is_ajax_request=true").is_ajax());
        assert!(!WebContext::get("/").is_ajax());
    }

    #[test]
    fn test_request_attributes() {
        let mut context = WebContext::get("/");
        context.set_request_attribute("k", serde_json::json!(true));
        assert_eq!(context.request_attribute("k"), Some(&serde_json::json!(true)));
        assert!(context.remove_request_attribute("k").is_some());
        assert!(context.request_attribute("k").is_none());
    }

    #[test]
    fn test_full_url_honors_forwarded_proto() {
        let context = WebContext::get("/a?b=c")
            .with_header("host", "app.example")
            .with_header("x-forwarded-proto", "https");
        assert_eq!(context.full_request_url(), "https://app.example/a?b=c");
    }

    #[test]
    fn test_is_https() {
        assert!(!WebContext::get("/").is_https());
        assert!(WebContext::get("https://app.example/").is_https());
        assert!(WebContext::get("/").with_header("x-forwarded-proto", "HTTPS").is_https());
        assert!(WebContext::get("/").with_header("x-forwarded-ssl", "on").is_https());
        assert!(!WebContext::get("/").with_header("x-forwarded-proto", "http").is_https());
    }
}
