use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_cookies::Cookies;

use crate::{models::session::SessionState, services::session, state::AppState};

/// Resolves the session for every request and stashes the outcome as a
/// request extension, before any handler or store call runs. Also
/// guarantees the CSRF cookie exists so forms rendered further down can
/// embed its value.
pub async fn resolve_session(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let resolved = session::resolve(&state, &cookies).await;
    session::ensure_csrf_cookie(&cookies);

    match &resolved {
        SessionState::Authenticated(session) => {
            tracing::debug!("✅ Request authenticated: {}", session.user_id);
            request.extensions_mut().insert(session.clone());
        }
        SessionState::Anonymous => {
            tracing::debug!("👤 Request anonymous");
        }
    }

    request.extensions_mut().insert(resolved);
    next.run(request).await
}

/// Turns anonymous requests away from protected surfaces with a redirect
/// to the login page. Layered inside `resolve_session`; never issues a
/// backend call of its own.
pub async fn require_session(request: Request<Body>, next: Next) -> Response {
    let authenticated = request
        .extensions()
        .get::<SessionState>()
        .map(SessionState::is_authenticated)
        .unwrap_or(false);

    if !authenticated {
        tracing::debug!("🔒 Anonymous request to a protected surface, redirecting to login");
        return Redirect::to("/auth/login").into_response();
    }

    next.run(request).await
}
