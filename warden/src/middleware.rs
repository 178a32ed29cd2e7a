//! Axum middleware running the security decision on every request

use crate::action::HttpAction;
use crate::config::Config;
use crate::context::WebContext;
use crate::error::SecurityResult;
use crate::logic::{HttpActionAdapter, SecurityLogic, SecurityParameters, Verdict};
use crate::utils::generate_request_id;
use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Converts engine actions into axum responses
///
/// `Redirect` becomes 302 with a `Location` header, `RenderContent` a body
/// with its status, `Status` an empty response and `Ok` a plain 200.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxumActionAdapter;

impl HttpActionAdapter<Response> for AxumActionAdapter {
    fn adapt(&self, action: HttpAction, context: &WebContext) -> Response {
        match action {
            HttpAction::Ok => StatusCode::OK.into_response(),
            HttpAction::Redirect { location } => match HeaderValue::from_str(&location) {
                Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
                Err(_) => {
                    warn!("Invalid redirect location for {}", context.path());
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            },
            HttpAction::RenderContent { body, status } => (status_code(status), body).into_response(),
            HttpAction::Status(code) => status_code(code).into_response(),
        }
    }
}

fn status_code(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Main security middleware
///
/// Granted requests reach the handler with the [`ProfileSet`](crate::profile::ProfileSet)
/// and a [`RequestId`] in their extensions.
#[derive(Debug, Clone)]
pub struct SecurityMiddleware {
    logic: Arc<SecurityLogic>,
    config: Arc<Config>,
    parameters: Arc<SecurityParameters>,
}

impl SecurityMiddleware {
    /// Create a middleware over a validated configuration
    pub fn new(config: Config) -> SecurityResult<Self> {
        config.validate()?;
        let logic = SecurityLogic::for_settings(config.settings());

        Ok(Self {
            logic: Arc::new(logic),
            config: Arc::new(config),
            parameters: Arc::new(SecurityParameters::default()),
        })
    }

    /// Clients, authorizers and matchers to apply
    pub fn with_parameters(mut self, parameters: SecurityParameters) -> Self {
        self.parameters = Arc::new(parameters);
        self
    }

    /// Use a customized engine
    pub fn with_logic(mut self, logic: SecurityLogic) -> Self {
        self.logic = Arc::new(logic);
        self
    }

    /// Process the request
    pub async fn process(&self, mut request: Request, next: Next) -> Result<Response, StatusCode> {
        let request_id = generate_request_id();
        let start_time = Instant::now();
        let settings = self.config.settings();

        let mut context = WebContext::from_request(&request, &settings.session_cookie_name);
        let verdict = self
            .logic
            .decide(&mut context, Some(&self.config), &self.parameters)
            .await
            .map_err(|e| {
                error!("Security decision failed for request {}: {}", request_id, e);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;

        let mut response = match verdict {
            Verdict::Bypassed => next.run(request).await,
            Verdict::Granted(access) => {
                request.extensions_mut().insert(access.profiles);
                request
                    .extensions_mut()
                    .insert(RequestId(request_id.clone()));
                next.run(request).await
            }
            Verdict::Action(action) => {
                debug!("Request {} answered with {}", request_id, action);
                AxumActionAdapter.adapt(action, &context)
            }
        };

        if context.session_created() {
            if let Some(session_id) = context.session_id() {
                let mut cookie = format!(
                    "{}={}; Path=/; HttpOnly; SameSite=Lax",
                    settings.session_cookie_name, session_id
                );
                if context.is_https() {
                    cookie.push_str("; Secure");
                }
                match HeaderValue::from_str(&cookie) {
                    Ok(value) => {
                        response.headers_mut().append(header::SET_COOKIE, value);
                    }
                    Err(_) => warn!("Could not encode session cookie for request {}", request_id),
                }
            }
        }

        response.headers_mut().insert(
            "x-request-id",
            HeaderValue::from_str(&request_id)
                .unwrap_or_else(|_| HeaderValue::from_static("invalid")),
        );

        debug!(
            "Request {} completed in {:?} with status {}",
            request_id,
            start_time.elapsed(),
            response.status()
        );
        Ok(response)
    }
}

/// Request ID wrapper for extensions
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Middleware function for use with Axum
///
/// # Example
/// ```rust,no_run
/// use axum::{Router, routing::get, middleware::from_fn};
/// use std::sync::Arc;
/// use warden::*;
///
/// # fn main() -> Result<(), SecurityError> {
/// let clients = Clients::new(vec![Arc::new(AnonymousClient::new())])?;
/// let middleware = SecurityMiddleware::new(Config::new(clients))?;
///
/// let app: Router = Router::new()
///     .route("/", get(|| async { "Hello, secure world!" }))
///     .layer(from_fn(warden_middleware(middleware)));
/// # Ok(())
/// # }
/// ```
pub fn warden_middleware(
    middleware: SecurityMiddleware,
) -> impl Fn(
    Request,
    Next,
)
    -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, StatusCode>> + Send>>
+ Clone {
    move |req, next| {
        let middleware = middleware.clone();
        Box::pin(async move { middleware.process(req, next).await })
    }
}
