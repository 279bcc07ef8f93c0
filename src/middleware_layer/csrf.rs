use axum::{
    body::Body,
    extract::Request,
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::{error::AppError, services::session::CSRF_COOKIE};

/// Upper bound when buffering a form body for the token check. Generous
/// next to the entry-content cap, even fully percent-encoded.
const MAX_FORM_BYTES: usize = 256 * 1024;

/// The hidden form field every state-changing form carries.
const CSRF_FIELD: &str = "csrf_token";

/// Pulls one field's raw value out of an urlencoded body. No percent
/// decoding: the token alphabet (URL-safe base64) is untouched by form
/// encoding, so the raw value compares exactly.
fn form_value<'a>(body: &'a str, name: &str) -> Option<&'a str> {
    body.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key == name).then_some(value)
    })
}

/// A middleware that verifies the double-submit CSRF token on
/// state-changing form posts: the `csrf_token` cookie must match the
/// hidden `csrf_token` field. Read methods pass through untouched.
pub async fn verify_csrf(cookies: Cookies, req: Request<Body>, next: Next) -> Response {
    if req.method() == Method::GET
        || req.method() == Method::HEAD
        || req.method() == Method::OPTIONS
    {
        tracing::debug!("✅ CSRF exemption: {} request", req.method());
        return next.run(req).await;
    }

    let cookie_token = match cookies.get(CSRF_COOKIE) {
        Some(c) => c.value().to_string(),
        None => {
            tracing::warn!("❌ CSRF: cookie {} not found", CSRF_COOKIE);
            return AppError::Authentication("Missing CSRF token".to_string()).into_response();
        }
    };

    // Buffer the body to read the hidden field, then hand the request on
    // with the body restored.
    let (parts, body) = req.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_FORM_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("❌ CSRF: could not buffer form body: {}", e);
            return AppError::Validation("Form body too large".to_string()).into_response();
        }
    };

    let form_token = std::str::from_utf8(&bytes)
        .ok()
        .and_then(|text| form_value(text, CSRF_FIELD));

    let form_token = match form_token {
        Some(token) => token,
        None => {
            tracing::warn!("❌ CSRF: form field {} not found", CSRF_FIELD);
            return AppError::Authentication("Missing CSRF token".to_string()).into_response();
        }
    };

    if form_token != cookie_token {
        tracing::warn!("❌ CSRF: token mismatch");
        return AppError::Authentication("CSRF token mismatch".to_string()).into_response();
    }

    tracing::debug!("✅ CSRF token valid");

    let req = Request::from_parts(parts, Body::from(bytes));
    next.run(req).await
}
