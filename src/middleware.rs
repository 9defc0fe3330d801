//! Security headers middleware.
//!
//! The app runs embedded inside wallet apps, so no frame-blocking headers
//! (`X-Frame-Options`, `frame-ancestors`) are sent.

use crate::config::Config;
use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Middleware that adds security headers to all responses.
///
/// - **Cache-Control: no-store** on `/api/` responses, which carry
///   per-session data. Uploaded images stay cacheable.
/// - **X-Content-Type-Options: nosniff** so uploaded images are never
///   reinterpreted as another content type.
/// - **Referrer-Policy: no-referrer**
/// - **Content-Security-Policy** locking API and image responses down to
///   same-origin images.
/// - **Strict-Transport-Security** in production only, since development
///   runs over plain HTTP.
///
/// # Usage
///
/// ```rust,no_run
/// use axum::{middleware, Router};
/// use shouldi::config::Config;
/// use shouldi::middleware::security_headers;
/// use std::sync::Arc;
///
/// let config = Arc::new(Config::from_env().unwrap());
/// let app: Router = Router::new()
///     .layer(middleware::from_fn_with_state(config, security_headers));
/// ```
pub async fn security_headers(
    State(config): State<Arc<Config>>,
    request: Request,
    next: Next,
) -> Response {
    let is_api = request.uri().path().starts_with("/api/");
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    if is_api {
        headers.insert("cache-control", HeaderValue::from_static("no-store"));
    }
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("camera=(), microphone=(), geolocation=(), payment=()"),
    );
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'; img-src 'self'"),
    );

    if config.production {
        headers.insert(
            "strict-transport-security",
            HeaderValue::from_static("max-age=63072000; includeSubDomains"),
        );
    }

    response
}
