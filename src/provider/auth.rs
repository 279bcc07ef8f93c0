//! Client for the backend's auth API (GoTrue dialect).
//!
//! Every session the application ever sees originates here: password and
//! code grants, sign-up, token refresh, identity lookup and sign-out. The
//! client is stateless; tokens live in the caller's cookies, never here.

use chrono::{DateTime, Utc};
use http::{StatusCode, header};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// A token grant issued by the auth backend: the access/refresh pair plus
/// the identity it was issued to.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Access-token lifetime in seconds, when the backend reports one.
    #[serde(default)]
    pub expires_in: Option<i64>,
    pub user: ProviderUser,
}

/// The identity record the auth backend holds for a user.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// What a sign-up call produced.
#[derive(Debug)]
pub enum SignUpOutcome {
    /// The backend signed the new user straight in.
    SessionIssued(ProviderSession),
    /// The backend created the account but wants the email confirmed
    /// before it issues tokens.
    ConfirmationRequired,
}

#[derive(Serialize)]
struct PasswordGrant<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshGrant<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
struct CodeGrant<'a> {
    auth_code: &'a str,
}

/// Error payload shapes the auth backend answers with. The token endpoint
/// uses `error_description`, most others use `msg`.
#[derive(Deserialize, Default)]
struct AuthErrorBody {
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

/// Pulls a human-readable message out of an auth error body, falling back
/// to the (truncated) raw text for anything unrecognized.
fn auth_error_message(body: &str) -> String {
    let parsed: AuthErrorBody = sonic_rs::from_str(body).unwrap_or_default();
    parsed
        .msg
        .or(parsed.error_description)
        .or(parsed.error)
        .unwrap_or_else(|| truncate_raw(body))
}

fn truncate_raw(body: &str) -> String {
    const LIMIT: usize = 200;
    if body.len() <= LIMIT {
        return body.to_string();
    }
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

/// Maps a failed auth call to the error taxonomy: client-class statuses
/// mean the backend rejected the credentials or token, anything else is an
/// upstream fault.
fn auth_failure(status: StatusCode, body: &str, what: &str) -> AppError {
    let message = auth_error_message(body);
    tracing::warn!("❌ Auth backend refused {} ({}): {}", what, status, message);
    match status {
        StatusCode::BAD_REQUEST
        | StatusCode::UNAUTHORIZED
        | StatusCode::FORBIDDEN
        | StatusCode::UNPROCESSABLE_ENTITY => AppError::Authentication(message),
        _ => AppError::Upstream {
            status: status.as_u16(),
            message,
        },
    }
}

/// Client for the auth half of the backend.
#[derive(Clone)]
pub struct AuthProvider {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl AuthProvider {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        anon_key: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            anon_key: anon_key.into(),
        }
    }

    /// Exchanges email + password for a session.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<ProviderSession> {
        tracing::debug!("Requesting password grant for {}", email);

        let response = self
            .http
            .post(format!(
                "{}/auth/v1/token?grant_type=password",
                self.base_url
            ))
            .header(header::CONTENT_TYPE, "application/json")
            .header("apikey", &self.anon_key)
            .body(sonic_rs::to_string(&PasswordGrant { email, password })?)
            .send()
            .await?;

        self.read_session(response, "password sign-in").await
    }

    /// Registers a new account. Depending on backend settings this either
    /// issues tokens immediately or defers to email confirmation.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome> {
        tracing::debug!("Requesting sign-up for {}", email);

        let response = self
            .http
            .post(format!("{}/auth/v1/signup", self.base_url))
            .header(header::CONTENT_TYPE, "application/json")
            .header("apikey", &self.anon_key)
            .body(sonic_rs::to_string(&PasswordGrant { email, password })?)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(auth_failure(status, &text, "sign-up"));
        }

        // With confirmations enabled the backend returns a bare user record
        // instead of a token grant.
        match sonic_rs::from_str::<ProviderSession>(&text) {
            Ok(session) => Ok(SignUpOutcome::SessionIssued(session)),
            Err(_) => {
                tracing::debug!("Sign-up accepted, email confirmation pending");
                Ok(SignUpOutcome::ConfirmationRequired)
            }
        }
    }

    /// Resolves the identity behind an access token. A client-class status
    /// means the token was rejected (expired or revoked) and the caller
    /// should attempt a refresh.
    pub async fn get_user(&self, access_token: &str) -> Result<ProviderUser> {
        let response = self
            .http
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(auth_failure(status, &text, "get-user"));
        }

        sonic_rs::from_str(&text).map_err(|e| AppError::Upstream {
            status: status.as_u16(),
            message: format!("malformed get-user response: {e}"),
        })
    }

    /// Trades a refresh token for a fresh session.
    pub async fn refresh(&self, refresh_token: &str) -> Result<ProviderSession> {
        tracing::debug!("Requesting refresh-token grant");

        let response = self
            .http
            .post(format!(
                "{}/auth/v1/token?grant_type=refresh_token",
                self.base_url
            ))
            .header(header::CONTENT_TYPE, "application/json")
            .header("apikey", &self.anon_key)
            .body(sonic_rs::to_string(&RefreshGrant { refresh_token })?)
            .send()
            .await?;

        self.read_session(response, "token refresh").await
    }

    /// Exchanges a one-time authorization code (from a confirmation or
    /// recovery link) for a session.
    pub async fn exchange_code(&self, code: &str) -> Result<ProviderSession> {
        tracing::debug!("Exchanging authorization code");

        let response = self
            .http
            .post(format!("{}/auth/v1/token?grant_type=pkce", self.base_url))
            .header(header::CONTENT_TYPE, "application/json")
            .header("apikey", &self.anon_key)
            .body(sonic_rs::to_string(&CodeGrant { auth_code: code })?)
            .send()
            .await?;

        self.read_session(response, "code exchange").await
    }

    /// Revokes the session behind an access token. A token the backend
    /// already rejects counts as signed out.
    pub async fn sign_out(&self, access_token: &str) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/auth/v1/logout", self.base_url))
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::UNAUTHORIZED {
            let text = response.text().await.unwrap_or_default();
            return Err(auth_failure(status, &text, "sign-out"));
        }

        Ok(())
    }

    async fn read_session(
        &self,
        response: reqwest::Response,
        what: &str,
    ) -> Result<ProviderSession> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(auth_failure(status, &text, what));
        }

        sonic_rs::from_str(&text).map_err(|e| AppError::Upstream {
            status: status.as_u16(),
            message: format!("malformed {what} response: {e}"),
        })
    }
}
