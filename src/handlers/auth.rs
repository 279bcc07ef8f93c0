use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Extension, Form,
};
use garde::Validate;
use minijinja::context;
use serde::Deserialize;
use tower_cookies::Cookies;

use crate::{
    error::{AppError, Result},
    models::session::SessionState,
    provider::auth::SignUpOutcome,
    services::session,
    state::AppState,
    views::session_view,
};

/// Credentials posted by the login form.
#[derive(Deserialize, Validate, Debug)]
pub struct LoginForm {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 1))]
    pub password: String,
}

/// Credentials posted by the sign-up form. The password floor matches
/// the auth backend's default minimum, so hopeless requests never
/// leave the process.
#[derive(Deserialize, Validate, Debug)]
pub struct SignUpForm {
    #[garde(email)]
    pub email: String,
    #[garde(length(min = 6, max = 128))]
    pub password: String,
}

/// Query string of the confirmation-link callback.
#[derive(Deserialize, Debug)]
pub struct CallbackQuery {
    pub code: Option<String>,
}

/// Renders the login page. Visitors who already hold a session have
/// nothing to do here and are sent back home.
#[axum::debug_handler]
pub async fn login_page(
    State(state): State<AppState>,
    Extension(session_state): Extension<SessionState>,
    cookies: Cookies,
) -> Result<Response> {
    if session_state.is_authenticated() {
        return Ok(Redirect::to("/").into_response());
    }

    render_login(&state, &cookies, None, None, "")
}

/// Handles a login attempt.
///
/// # Arguments
/// * `form` - Email and password from the login form
///
/// # Returns
/// * 303 to the diary list on success
/// * The login page re-rendered with the backend's message when the
///   credentials are refused, email kept so it can be corrected
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    tracing::info!("🔑 Login attempt for: {}", form.email);

    if let Err(report) = form.validate() {
        tracing::debug!("Login form rejected: {report}");
        return render_login(
            &state,
            &cookies,
            Some("メールアドレスとパスワードを正しく入力してください"),
            None,
            &form.email,
        );
    }

    match state.provider.sign_in(&form.email, &form.password).await {
        Ok(granted) => {
            let established = session::establish(&state, &cookies, &granted);
            tracing::info!("✅ User logged in: {}", established.user_id);
            Ok(Redirect::to("/").into_response())
        }
        Err(AppError::Authentication(message)) => {
            tracing::warn!("❌ Login rejected for: {}", form.email);
            render_login(&state, &cookies, Some(&message), None, &form.email)
        }
        Err(e) => Err(e),
    }
}

/// Handles a sign-up attempt.
///
/// Depending on backend configuration the response carries either a
/// full token pair (the session starts immediately) or a bare user
/// record, meaning a confirmation email is on its way.
#[axum::debug_handler]
pub async fn signup(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<SignUpForm>,
) -> Result<Response> {
    tracing::info!("👤 Sign-up attempt for: {}", form.email);

    if let Err(report) = form.validate() {
        tracing::debug!("Sign-up form rejected: {report}");
        return render_login(
            &state,
            &cookies,
            Some("メールアドレスと6文字以上のパスワードを入力してください"),
            None,
            &form.email,
        );
    }

    match state.provider.sign_up(&form.email, &form.password).await {
        Ok(SignUpOutcome::SessionIssued(granted)) => {
            let established = session::establish(&state, &cookies, &granted);
            tracing::info!("✅ User registered: {}", established.user_id);
            Ok(Redirect::to("/").into_response())
        }
        Ok(SignUpOutcome::ConfirmationRequired) => {
            tracing::info!("📧 Confirmation email pending for: {}", form.email);
            render_login(
                &state,
                &cookies,
                None,
                Some("確認メールを送信しました。メール内のリンクから登録を完了してください。"),
                &form.email,
            )
        }
        Err(AppError::Authentication(message)) => {
            tracing::warn!("❌ Sign-up rejected for: {}", form.email);
            render_login(&state, &cookies, Some(&message), None, &form.email)
        }
        Err(e) => Err(e),
    }
}

/// Handles logout. Works the same whether or not the visitor still
/// holds valid tokens, and always lands on the public start page.
#[axum::debug_handler]
pub async fn logout(
    State(state): State<AppState>,
    Extension(session_state): Extension<SessionState>,
    cookies: Cookies,
) -> Response {
    session::sign_out(&state, &cookies, &session_state).await;
    Redirect::to("/").into_response()
}

/// Target of confirmation email links. Exchanges the one-time code for
/// a session; without a code there is nothing to exchange and the
/// visitor goes straight home. Failed exchanges also land home,
/// flagged with a query parameter the list page turns into a banner.
#[axum::debug_handler]
pub async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let Some(code) = query.code else {
        tracing::debug!("Auth callback without a code, nothing to exchange");
        return Redirect::to("/");
    };

    match state.provider.exchange_code(&code).await {
        Ok(granted) => {
            let established = session::establish(&state, &cookies, &granted);
            tracing::info!("✅ Code exchange completed for user: {}", established.user_id);
            Redirect::to("/")
        }
        Err(e) => {
            tracing::error!("❌ Code exchange failed: {}", e);
            Redirect::to("/?error=auth")
        }
    }
}

/// Login and sign-up share one page; the old register URL points there.
#[axum::debug_handler]
pub async fn register_redirect() -> Redirect {
    Redirect::to("/auth/login")
}

/// Renders the password reset placeholder page.
#[axum::debug_handler]
pub async fn reset_password_page(
    State(state): State<AppState>,
    Extension(session_state): Extension<SessionState>,
    cookies: Cookies,
) -> Result<Response> {
    let csrf_token = session::ensure_csrf_cookie(&cookies);
    let html = state.views.render(
        "reset_password.html",
        context! {
            session => session_view(&session_state),
            csrf_token => csrf_token,
        },
    )?;
    Ok(html.into_response())
}

/// Renders the login page with an optional error banner, an optional
/// notice banner and a pre-filled email field.
fn render_login(
    state: &AppState,
    cookies: &Cookies,
    error: Option<&str>,
    notice: Option<&str>,
    email_value: &str,
) -> Result<Response> {
    let csrf_token = session::ensure_csrf_cookie(cookies);
    let html = state.views.render(
        "login.html",
        context! {
            session => None::<crate::views::SessionView>,
            csrf_token => csrf_token,
            error => error,
            notice => notice,
            email_value => email_value,
        },
    )?;
    Ok(html.into_response())
}
