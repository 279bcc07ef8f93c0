use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Extension,
};
use minijinja::context;
use tower_cookies::Cookies;

use crate::{
    error::Result,
    models::session::Session,
    services::session,
    state::AppState,
    views::SessionView,
};

/// Renders the account page for the signed-in user.
#[axum::debug_handler]
pub async fn profile_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    cookies: Cookies,
) -> Result<Response> {
    let csrf_token = session::ensure_csrf_cookie(&cookies);
    let html = state.views.render(
        "profile.html",
        context! {
            session => SessionView::from(&session),
            csrf_token => csrf_token,
        },
    )?;
    Ok(html.into_response())
}
