//! The session guard: the one capability every surface goes through to
//! learn who is asking.
//!
//! The token pair lives in cookies and nowhere else; each request
//! resolves it against the auth backend from scratch. An expired access
//! token is replaced silently through the refresh grant, rewriting the
//! cookies on the way out. Every transition the guard observes is
//! emitted onto the notification stream exactly once.

use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};

use crate::crypto::csrf::generate_csrf_token;
use crate::error::AppError;
use crate::events::AuthChange;
use crate::models::session::{Session, SessionState};
use crate::provider::auth::ProviderSession;
use crate::state::AppState;

pub const ACCESS_COOKIE: &str = "sb_access_token";
pub const REFRESH_COOKIE: &str = "sb_refresh_token";
/// Not HttpOnly: the double-submit check compares this cookie against a
/// hidden form field carrying the same value.
pub const CSRF_COOKIE: &str = "csrf_token";

/// Lifetime to assume for an access token when the backend does not
/// report one.
const DEFAULT_ACCESS_LIFETIME_SECS: i64 = 3600;

/// Creates a cookie with the attributes every cookie in this application
/// carries. `csrf_token` stays readable by the form layer; everything
/// else is HttpOnly.
fn create_secure_cookie(name: &'static str, value: String, max_age: Duration) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);

    let is_production =
        std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()) == "production";

    if name != CSRF_COOKIE {
        cookie.set_http_only(true);
    }

    if is_production {
        cookie.set_secure(true);
    }

    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(max_age);
    cookie.set_path("/");

    cookie
}

fn session_of(granted: &ProviderSession) -> Session {
    Session {
        user_id: granted.user.id,
        email: granted.user.email.clone(),
        updated_at: granted.user.updated_at,
        access_token: granted.access_token.clone(),
    }
}

fn write_tokens(cookies: &Cookies, granted: &ProviderSession, session_duration_days: i64) {
    let access_lifetime = granted
        .expires_in
        .unwrap_or(DEFAULT_ACCESS_LIFETIME_SECS);

    cookies.add(create_secure_cookie(
        ACCESS_COOKIE,
        granted.access_token.clone(),
        Duration::seconds(access_lifetime),
    ));
    cookies.add(create_secure_cookie(
        REFRESH_COOKIE,
        granted.refresh_token.clone(),
        Duration::days(session_duration_days),
    ));
}

fn clear_tokens(cookies: &Cookies) {
    for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
        let mut cookie = Cookie::new(name, "");
        cookie.set_max_age(Duration::seconds(0));
        cookie.set_path("/");
        cookies.remove(cookie);
    }
}

/// Guarantees the double-submit token cookie exists, minting one on
/// first contact. Returns the value so a page further down the chain can
/// embed it in its forms; the jar reflects a pending add within the same
/// request.
pub fn ensure_csrf_cookie(cookies: &Cookies) -> String {
    if let Some(existing) = cookies.get(CSRF_COOKIE) {
        return existing.value().to_string();
    }

    let token = generate_csrf_token();
    cookies.add(create_secure_cookie(
        CSRF_COOKIE,
        token.clone(),
        Duration::days(1),
    ));
    token
}

/// Resolves the current session from the request cookies.
///
/// Resolution order: no tokens at all is anonymous without any backend
/// call; an access token is checked with get-user; a rejected or lapsed
/// access token falls back to the refresh grant. Only a refusal from the
/// backend tears the cookies down; a transport fault leaves them in
/// place and treats this one request as anonymous.
pub async fn resolve(state: &AppState, cookies: &Cookies) -> SessionState {
    let access = cookies.get(ACCESS_COOKIE).map(|c| c.value().to_string());
    let refresh = cookies.get(REFRESH_COOKIE).map(|c| c.value().to_string());

    match (access, refresh) {
        (None, None) => SessionState::Anonymous,

        (Some(access), refresh) => match state.provider.get_user(&access).await {
            Ok(user) => SessionState::Authenticated(Session {
                user_id: user.id,
                email: user.email,
                updated_at: user.updated_at,
                access_token: access,
            }),

            Err(AppError::Authentication(reason)) => {
                tracing::debug!("🔑 Access token rejected ({}), trying refresh", reason);
                match refresh {
                    Some(refresh) => try_refresh(state, cookies, &refresh).await,
                    None => {
                        clear_tokens(cookies);
                        state.events.emit(AuthChange::SignedOut { user_id: None });
                        SessionState::Anonymous
                    }
                }
            }

            Err(e) => {
                tracing::error!("❌ Session resolution failed: {}", e);
                SessionState::Anonymous
            }
        },

        (None, Some(refresh)) => try_refresh(state, cookies, &refresh).await,
    }
}

async fn try_refresh(state: &AppState, cookies: &Cookies, refresh_token: &str) -> SessionState {
    match state.provider.refresh(refresh_token).await {
        Ok(granted) => {
            write_tokens(cookies, &granted, state.config.session_duration_days);
            state.events.emit(AuthChange::TokenRefreshed {
                user_id: granted.user.id,
            });
            tracing::debug!("🔄 Access token refreshed for {}", granted.user.id);
            SessionState::Authenticated(session_of(&granted))
        }

        Err(AppError::Authentication(reason)) => {
            tracing::debug!("🔑 Refresh refused ({}), clearing session cookies", reason);
            clear_tokens(cookies);
            state.events.emit(AuthChange::SignedOut { user_id: None });
            SessionState::Anonymous
        }

        Err(e) => {
            tracing::error!("❌ Token refresh failed: {}", e);
            SessionState::Anonymous
        }
    }
}

/// Installs a fresh grant: token cookies written, sign-in announced.
pub fn establish(state: &AppState, cookies: &Cookies, granted: &ProviderSession) -> Session {
    write_tokens(cookies, granted, state.config.session_duration_days);
    state.events.emit(AuthChange::SignedIn {
        user_id: granted.user.id,
    });
    session_of(granted)
}

/// Tears the session down: best-effort backend revocation, cookies
/// cleared either way, sign-out announced.
pub async fn sign_out(state: &AppState, cookies: &Cookies, current: &SessionState) {
    match current.session() {
        Some(session) => {
            if let Err(e) = state.provider.sign_out(&session.access_token).await {
                tracing::warn!("⚠️ Backend sign-out failed, clearing cookies anyway: {}", e);
            }
            clear_tokens(cookies);
            state.events.emit(AuthChange::SignedOut {
                user_id: Some(session.user_id),
            });
        }
        None => clear_tokens(cookies),
    }
}
