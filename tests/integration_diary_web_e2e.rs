use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{Value, json};
use uuid::Uuid;

use diarynote::config::Config;
use diarynote::events::{AuthChange, AuthEvents};
use diarynote::state::AppState;

static ANA_ID: Lazy<Uuid> =
    Lazy::new(|| Uuid::parse_str("7f3c9a20-8e2f-4c57-9b1a-52f0f2a1d001").unwrap());
static RIVAL_ID: Lazy<Uuid> =
    Lazy::new(|| Uuid::parse_str("c4b0d882-13a5-4f4e-8a8e-9e2f5c3b7002").unwrap());

const ANA_EMAIL: &str = "ana@example.com";
const ANA_PASSWORD: &str = "correct-horse-battery";
const CONFIRM_EMAIL: &str = "confirm-me@example.com";
const GOOD_CODE: &str = "one-time-good-code";

// ---------------------------------------------------------------------------
// Mock backend: the auth + row-store collaborator, GoTrue/PostgREST shaped.
// Reads are public (the row policy under test allows anyone to look at a
// single entry); writes apply only to the bearer's own rows.
// ---------------------------------------------------------------------------

#[derive(Clone, Serialize)]
struct MockRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct BackendInner {
    rows: Vec<MockRow>,
    access_tokens: HashMap<String, Uuid>,
    refresh_tokens: HashMap<String, Uuid>,
    token_seq: usize,
    list_calls: usize,
    insert_calls: usize,
    get_user_calls: usize,
    auth_outage: bool,
    rows_outage: bool,
}

#[derive(Clone, Default)]
struct MockBackend {
    inner: Arc<Mutex<BackendInner>>,
}

impl MockBackend {
    fn issue_session(&self, user_id: Uuid, email: &str) -> Value {
        let mut inner = self.inner.lock().unwrap();
        inner.token_seq += 1;
        let access = format!("access-{}", inner.token_seq);
        let refresh = format!("refresh-{}", inner.token_seq);
        inner.access_tokens.insert(access.clone(), user_id);
        inner.refresh_tokens.insert(refresh.clone(), user_id);

        json!({
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": 3600,
            "token_type": "bearer",
            "user": {
                "id": user_id,
                "email": email,
                "updated_at": "2025-05-01T09:00:00Z"
            }
        })
    }

    fn user_of_access(&self, token: &str) -> Option<Uuid> {
        self.inner.lock().unwrap().access_tokens.get(token).copied()
    }

    fn user_of_refresh(&self, token: &str) -> Option<Uuid> {
        self.inner.lock().unwrap().refresh_tokens.get(token).copied()
    }

    /// Simulates access-token expiry: every outstanding access token is
    /// rejected from now on, refresh tokens stay valid.
    fn expire_access_tokens(&self) {
        self.inner.lock().unwrap().access_tokens.clear();
    }

    fn revoke_refresh_tokens(&self) {
        self.inner.lock().unwrap().refresh_tokens.clear();
    }

    /// Simulates the auth backend falling over: identity lookups answer
    /// 500 until the outage is lifted. The tokens themselves stay valid.
    fn set_auth_outage(&self, down: bool) {
        self.inner.lock().unwrap().auth_outage = down;
    }

    /// Simulates the row store falling over: reads answer 500.
    fn set_rows_outage(&self, down: bool) {
        self.inner.lock().unwrap().rows_outage = down;
    }

    fn seed_row(&self, user_id: Uuid, title: &str, content: &str) -> Uuid {
        let now = Utc::now();
        let row = MockRow {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            content: content.to_string(),
            created_at: now,
            updated_at: now,
        };
        let id = row.id;
        self.inner.lock().unwrap().rows.push(row);
        id
    }

    fn row(&self, id: Uuid) -> Option<MockRow> {
        self.inner
            .lock()
            .unwrap()
            .rows
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    fn row_count(&self) -> usize {
        self.inner.lock().unwrap().rows.len()
    }

    fn list_calls(&self) -> usize {
        self.inner.lock().unwrap().list_calls
    }

    fn insert_calls(&self) -> usize {
        self.inner.lock().unwrap().insert_calls
    }

    fn get_user_calls(&self) -> usize {
        self.inner.lock().unwrap().get_user_calls
    }
}

fn bearer(headers: &HeaderMap) -> String {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string()
}

async fn token_grant(
    State(mock): State<MockBackend>,
    Query(query): Query<HashMap<String, String>>,
    body: String,
) -> Response {
    let payload: Value = serde_json::from_str(&body).unwrap_or_default();

    match query.get("grant_type").map(String::as_str) {
        Some("password") => {
            if payload["email"] == ANA_EMAIL && payload["password"] == ANA_PASSWORD {
                Json(mock.issue_session(*ANA_ID, ANA_EMAIL)).into_response()
            } else {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error_description": "Invalid login credentials"})),
                )
                    .into_response()
            }
        }
        Some("refresh_token") => {
            let token = payload["refresh_token"].as_str().unwrap_or_default();
            match mock.user_of_refresh(token) {
                Some(user_id) => Json(mock.issue_session(user_id, ANA_EMAIL)).into_response(),
                None => (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({"msg": "Invalid Refresh Token"})),
                )
                    .into_response(),
            }
        }
        Some("pkce") => {
            if payload["auth_code"] == GOOD_CODE {
                Json(mock.issue_session(*ANA_ID, ANA_EMAIL)).into_response()
            } else {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error_description": "invalid flow state"})),
                )
                    .into_response()
            }
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unsupported_grant_type"})),
        )
            .into_response(),
    }
}

async fn signup(State(mock): State<MockBackend>, body: String) -> Response {
    let payload: Value = serde_json::from_str(&body).unwrap_or_default();
    let email = payload["email"].as_str().unwrap_or_default().to_string();

    if email == CONFIRM_EMAIL {
        // Confirmation enabled: a bare user record, no tokens yet.
        Json(json!({"id": Uuid::new_v4(), "email": email})).into_response()
    } else {
        Json(mock.issue_session(Uuid::new_v4(), &email)).into_response()
    }
}

async fn get_user(State(mock): State<MockBackend>, headers: HeaderMap) -> Response {
    {
        let mut inner = mock.inner.lock().unwrap();
        inner.get_user_calls += 1;
        if inner.auth_outage {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"msg": "unexpected failure"})),
            )
                .into_response();
        }
    }

    match mock.user_of_access(&bearer(&headers)) {
        Some(user_id) => Json(json!({
            "id": user_id,
            "email": ANA_EMAIL,
            "updated_at": "2025-05-01T09:00:00Z"
        }))
        .into_response(),
        None => (StatusCode::UNAUTHORIZED, Json(json!({"msg": "invalid JWT"}))).into_response(),
    }
}

async fn logout() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn rows_read(
    State(mock): State<MockBackend>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut inner = mock.inner.lock().unwrap();

    if inner.rows_outage {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"message": "connection to the row store failed"})),
        )
            .into_response();
    }

    match query.get("id").and_then(|f| f.strip_prefix("eq.")) {
        Some(id) => {
            let matches: Vec<MockRow> = inner
                .rows
                .iter()
                .filter(|r| r.id.to_string() == id)
                .cloned()
                .collect();
            Json(matches).into_response()
        }
        None => {
            inner.list_calls += 1;
            let mut all = inner.rows.clone();
            all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Json(all).into_response()
        }
    }
}

async fn rows_insert(
    State(mock): State<MockBackend>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let caller = mock.user_of_access(&bearer(&headers));
    let payload: Value = serde_json::from_str(&body).unwrap_or_default();

    let mut inner = mock.inner.lock().unwrap();
    inner.insert_calls += 1;

    let Some(caller) = caller else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"message": "JWT required"})),
        )
            .into_response();
    };

    let now = Utc::now();
    let row = MockRow {
        id: Uuid::new_v4(),
        user_id: caller,
        title: payload["title"].as_str().unwrap_or_default().to_string(),
        content: payload["content"].as_str().unwrap_or_default().to_string(),
        created_at: now,
        updated_at: now,
    };
    inner.rows.push(row.clone());

    (StatusCode::CREATED, Json(vec![row])).into_response()
}

async fn rows_update(
    State(mock): State<MockBackend>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let caller = mock.user_of_access(&bearer(&headers));
    let payload: Value = serde_json::from_str(&body).unwrap_or_default();
    let id = query
        .get("id")
        .and_then(|f| f.strip_prefix("eq."))
        .unwrap_or_default()
        .to_string();

    let mut inner = mock.inner.lock().unwrap();
    let updated: Vec<MockRow> = inner
        .rows
        .iter_mut()
        .filter(|r| r.id.to_string() == id && Some(r.user_id) == caller)
        .map(|r| {
            if let Some(title) = payload["title"].as_str() {
                r.title = title.to_string();
            }
            if let Some(content) = payload["content"].as_str() {
                r.content = content.to_string();
            }
            if let Some(stamp) = payload["updated_at"].as_str() {
                if let Ok(parsed) = DateTime::parse_from_rfc3339(stamp) {
                    r.updated_at = parsed.with_timezone(&Utc);
                }
            }
            r.clone()
        })
        .collect();

    Json(updated).into_response()
}

async fn rows_delete(
    State(mock): State<MockBackend>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let caller = mock.user_of_access(&bearer(&headers));
    let id = query
        .get("id")
        .and_then(|f| f.strip_prefix("eq."))
        .unwrap_or_default()
        .to_string();

    let mut inner = mock.inner.lock().unwrap();
    inner
        .rows
        .retain(|r| !(r.id.to_string() == id && Some(r.user_id) == caller));

    StatusCode::NO_CONTENT.into_response()
}

fn mock_router(mock: MockBackend) -> Router {
    Router::new()
        .route("/auth/v1/token", post(token_grant))
        .route("/auth/v1/signup", post(signup))
        .route("/auth/v1/user", get(get_user))
        .route("/auth/v1/logout", post(logout))
        .route(
            "/rest/v1/diaries",
            get(rows_read)
                .post(rows_insert)
                .patch(rows_update)
                .delete(rows_delete),
        )
        .with_state(mock)
}

// ---------------------------------------------------------------------------
// Test harness: one app instance per test, each with its own backend.
// ---------------------------------------------------------------------------

struct TestApp {
    base_url: String,
    backend: MockBackend,
    events: AuthEvents,
}

struct SignedIn {
    csrf: String,
    access_token: String,
}

impl TestApp {
    async fn spawn() -> Self {
        let backend = MockBackend::default();
        let backend_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = backend_listener.local_addr().unwrap();
        let backend_router = mock_router(backend.clone());
        tokio::spawn(async move {
            axum::serve(backend_listener, backend_router).await.unwrap();
        });

        let config = Config {
            supabase_url: format!("http://{}", backend_addr),
            supabase_anon_key: "anon-key-for-tests".to_string(),
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            session_duration_days: 7,
        };
        let state = AppState::new(&config).unwrap();
        let events = state.events.clone();

        let app_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let app_addr = app_listener.local_addr().unwrap();
        let router = diarynote::build_router(state);
        tokio::spawn(async move {
            axum::serve(
                app_listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        Self {
            base_url: format!("http://{}", app_addr),
            backend,
            events,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Logs Ana in through the real form flow and returns the CSRF token
    /// plus the access token the response set.
    async fn sign_in(&self, client: &reqwest::Client) -> SignedIn {
        let login_page = client.get(self.url("/auth/login")).send().await.unwrap();
        assert_eq!(login_page.status(), StatusCode::OK);
        let csrf = cookie_value(&login_page, "csrf_token").expect("login page sets a CSRF cookie");

        let response = client
            .post(self.url("/auth/login"))
            .form(&[
                ("email", ANA_EMAIL),
                ("password", ANA_PASSWORD),
                ("csrf_token", csrf.as_str()),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        let access_token =
            cookie_value(&response, "sb_access_token").expect("login sets the access cookie");

        SignedIn { csrf, access_token }
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

fn cookie_value(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|raw| {
            let (pair, _) = raw.split_once(';').unwrap_or((raw, ""));
            let (key, value) = pair.split_once('=')?;
            (key == name).then(|| value.to_string())
        })
}

fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

async fn next_event(events: &mut tokio::sync::broadcast::Receiver<AuthChange>) -> AuthChange {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("expected a session transition")
        .expect("transition stream open")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn anonymous_visitor_gets_the_welcome_page_without_backend_calls() {
        let app = TestApp::spawn().await;
        let client = client();

        let response = client.get(app.url("/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.text().await.unwrap();
        assert!(body.contains("DiaryNoteへようこそ"));

        assert_eq!(app.backend.list_calls(), 0);
        assert_eq!(app.backend.get_user_calls(), 0);
    }

    #[tokio::test]
    async fn protected_pages_redirect_anonymous_visitors_to_login() {
        let app = TestApp::spawn().await;
        let client = client();

        let id = Uuid::new_v4();
        let edit = format!("/diary/edit/{id}");
        let delete = format!("/diary/{id}/delete");

        for path in ["/diary/new", "/profile", edit.as_str(), delete.as_str()] {
            let response = client.get(app.url(path)).send().await.unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{path}");
            assert_eq!(location(&response), "/auth/login", "{path}");
        }

        for path in ["/diary/new", edit.as_str(), delete.as_str()] {
            let response = client.post(app.url(path)).send().await.unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "POST {path}");
            assert_eq!(location(&response), "/auth/login", "POST {path}");
        }
    }

    #[tokio::test]
    async fn the_old_register_url_redirects_to_the_login_surface() {
        let app = TestApp::spawn().await;
        let client = client();

        let response = client.get(app.url("/auth/register")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/auth/login");
    }

    #[tokio::test]
    async fn login_round_trip_lands_on_the_diary_list() {
        let app = TestApp::spawn().await;
        let client = client();

        app.sign_in(&client).await;

        let response = client.get(app.url("/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.text().await.unwrap();
        assert!(body.contains("あなたの日記"));
        assert!(body.contains("最初の日記を書きましょう"));
    }

    #[tokio::test]
    async fn wrong_password_rerenders_login_with_the_backend_message() {
        let app = TestApp::spawn().await;
        let client = client();

        let login_page = client.get(app.url("/auth/login")).send().await.unwrap();
        let csrf = cookie_value(&login_page, "csrf_token").unwrap();

        let response = client
            .post(app.url("/auth/login"))
            .form(&[
                ("email", ANA_EMAIL),
                ("password", "not-the-password"),
                ("csrf_token", csrf.as_str()),
            ])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(cookie_value(&response, "sb_access_token").is_none());
        let body = response.text().await.unwrap();
        assert!(body.contains("Invalid login credentials"));
        assert!(body.contains(ANA_EMAIL), "typed email stays in the form");
    }

    #[tokio::test]
    async fn signup_can_require_email_confirmation() {
        let app = TestApp::spawn().await;
        let client = client();

        let login_page = client.get(app.url("/auth/login")).send().await.unwrap();
        let csrf = cookie_value(&login_page, "csrf_token").unwrap();

        let response = client
            .post(app.url("/auth/signup"))
            .form(&[
                ("email", CONFIRM_EMAIL),
                ("password", "fresh-password-1"),
                ("csrf_token", csrf.as_str()),
            ])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(cookie_value(&response, "sb_access_token").is_none());
        let body = response.text().await.unwrap();
        assert!(body.contains("確認メールを送信しました"));
    }

    #[tokio::test]
    async fn signup_signs_straight_in_when_no_confirmation_is_needed() {
        let app = TestApp::spawn().await;
        let client = client();
        let mut events = app.events.subscribe();

        let login_page = client.get(app.url("/auth/login")).send().await.unwrap();
        let csrf = cookie_value(&login_page, "csrf_token").unwrap();

        let response = client
            .post(app.url("/auth/signup"))
            .form(&[
                ("email", "new-user@example.com"),
                ("password", "fresh-password-1"),
                ("csrf_token", csrf.as_str()),
            ])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        assert!(cookie_value(&response, "sb_access_token").is_some());
        assert!(matches!(
            next_event(&mut events).await,
            AuthChange::SignedIn { .. }
        ));
    }

    #[tokio::test]
    async fn created_entries_come_back_in_the_list() {
        let app = TestApp::spawn().await;
        let client = client();
        let signed_in = app.sign_in(&client).await;

        let response = client
            .post(app.url("/diary/new"))
            .form(&[
                ("title", "雨の日の散歩"),
                ("content", "今日は雨だったけど、長い散歩をした。"),
                ("csrf_token", signed_in.csrf.as_str()),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        assert_eq!(app.backend.row_count(), 1);
        let list = client.get(app.url("/")).send().await.unwrap();
        let body = list.text().await.unwrap();
        assert!(body.contains("雨の日の散歩"));
    }

    #[tokio::test]
    async fn blank_titles_never_reach_the_store() {
        let app = TestApp::spawn().await;
        let client = client();
        let signed_in = app.sign_in(&client).await;

        let response = client
            .post(app.url("/diary/new"))
            .form(&[
                ("title", "   "),
                ("content", "本文はある"),
                ("csrf_token", signed_in.csrf.as_str()),
            ])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.text().await.unwrap();
        assert!(body.contains("タイトルを入力してください"));
        assert!(body.contains("本文はある"), "typed content is preserved");
        assert_eq!(app.backend.insert_calls(), 0);
    }

    #[tokio::test]
    async fn editing_bumps_updated_at_and_keeps_created_at() {
        let app = TestApp::spawn().await;
        let client = client();
        let signed_in = app.sign_in(&client).await;

        let id = app.backend.seed_row(*ANA_ID, "最初の題", "最初の本文");
        let before = app.backend.row(id).unwrap();

        let untouched = client
            .get(app.url(&format!("/diary/{id}")))
            .send()
            .await
            .unwrap();
        let body = untouched.text().await.unwrap();
        assert!(!body.contains("更新:"), "no edit marker before the first edit");

        tokio::time::sleep(Duration::from_millis(10)).await;

        let response = client
            .post(app.url(&format!("/diary/edit/{id}")))
            .form(&[
                ("title", "直した題"),
                ("content", "直した本文"),
                ("csrf_token", signed_in.csrf.as_str()),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), format!("/diary/{id}"));

        let after = app.backend.row(id).unwrap();
        assert_eq!(after.title, "直した題");
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);

        let detail = client
            .get(app.url(&format!("/diary/{id}")))
            .send()
            .await
            .unwrap();
        let body = detail.text().await.unwrap();
        assert!(body.contains("更新:"), "the edit marker shows on the detail page");
    }

    #[tokio::test]
    async fn the_edit_form_comes_prefilled() {
        let app = TestApp::spawn().await;
        let client = client();
        app.sign_in(&client).await;

        let id = app.backend.seed_row(*ANA_ID, "旅の記録", "電車で海へ行った。");

        let response = client
            .get(app.url(&format!("/diary/edit/{id}")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.text().await.unwrap();
        assert!(body.contains("旅の記録"));
        assert!(body.contains("電車で海へ行った。"));
    }

    #[tokio::test]
    async fn foreign_entries_bounce_back_to_the_list() {
        let app = TestApp::spawn().await;
        let client = client();
        let signed_in = app.sign_in(&client).await;

        let id = app.backend.seed_row(*RIVAL_ID, "他人の日記", "見えても触れない");

        let edit_page = client
            .get(app.url(&format!("/diary/edit/{id}")))
            .send()
            .await
            .unwrap();
        assert_eq!(edit_page.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&edit_page), "/");

        let update = client
            .post(app.url(&format!("/diary/edit/{id}")))
            .form(&[
                ("title", "乗っ取り"),
                ("content", "駄目"),
                ("csrf_token", signed_in.csrf.as_str()),
            ])
            .send()
            .await
            .unwrap();
        assert_eq!(update.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&update), "/");

        let delete = client
            .post(app.url(&format!("/diary/{id}/delete")))
            .form(&[("csrf_token", signed_in.csrf.as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(delete.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&delete), "/");

        let row = app.backend.row(id).unwrap();
        assert_eq!(row.title, "他人の日記", "nothing about the row changed");
    }

    #[tokio::test]
    async fn deleting_runs_through_confirmation_and_then_404s() {
        let app = TestApp::spawn().await;
        let client = client();
        let signed_in = app.sign_in(&client).await;

        let id = app.backend.seed_row(*ANA_ID, "消える日記", "さようなら");

        let confirm = client
            .get(app.url(&format!("/diary/{id}/delete")))
            .send()
            .await
            .unwrap();
        assert_eq!(confirm.status(), StatusCode::OK);
        let body = confirm.text().await.unwrap();
        assert!(body.contains("本当にこの日記を削除しますか"));
        assert!(body.contains("消える日記"));

        let response = client
            .post(app.url(&format!("/diary/{id}/delete")))
            .form(&[("csrf_token", signed_in.csrf.as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        assert_eq!(app.backend.row_count(), 0);

        let detail = client
            .get(app.url(&format!("/diary/{id}")))
            .send()
            .await
            .unwrap();
        assert_eq!(detail.status(), StatusCode::NOT_FOUND);
        let body = detail.text().await.unwrap();
        assert!(body.contains("日記が見つかりませんでした"));
    }

    #[tokio::test]
    async fn anyone_the_row_policy_admits_can_read_but_only_owners_see_edit_links() {
        let app = TestApp::spawn().await;
        let id = app.backend.seed_row(*ANA_ID, "公開された日記", "誰でも読める");

        let anonymous = client();
        let response = anonymous
            .get(app.url(&format!("/diary/{id}")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.text().await.unwrap();
        assert!(body.contains("公開された日記"));
        assert!(!body.contains("編集する"));

        let owner = client();
        app.sign_in(&owner).await;
        let response = owner
            .get(app.url(&format!("/diary/{id}")))
            .send()
            .await
            .unwrap();
        let body = response.text().await.unwrap();
        assert!(body.contains("編集する"));
        assert!(body.contains("削除する"));
    }

    #[tokio::test]
    async fn logout_clears_the_cookies_and_announces_the_sign_out() {
        let app = TestApp::spawn().await;
        let client = client();
        let signed_in = app.sign_in(&client).await;
        let mut events = app.events.subscribe();

        let response = client
            .post(app.url("/auth/logout"))
            .form(&[("csrf_token", signed_in.csrf.as_str())])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        assert_eq!(
            cookie_value(&response, "sb_access_token").as_deref(),
            Some(""),
            "access cookie cleared"
        );

        assert_eq!(
            next_event(&mut events).await,
            AuthChange::SignedOut {
                user_id: Some(*ANA_ID)
            }
        );

        let home = client.get(app.url("/")).send().await.unwrap();
        let body = home.text().await.unwrap();
        assert!(body.contains("DiaryNoteへようこそ"));
    }

    #[tokio::test]
    async fn an_expired_access_token_is_refreshed_without_the_visitor_noticing() {
        let app = TestApp::spawn().await;
        let client = client();
        let signed_in = app.sign_in(&client).await;
        let mut events = app.events.subscribe();

        app.backend.expire_access_tokens();

        let response = client.get(app.url("/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let fresh = cookie_value(&response, "sb_access_token").expect("rotated access cookie");
        assert_ne!(fresh, signed_in.access_token);

        assert!(matches!(
            next_event(&mut events).await,
            AuthChange::TokenRefreshed { user_id } if user_id == *ANA_ID
        ));

        let body = response.text().await.unwrap();
        assert!(body.contains("あなたの日記"));
    }

    #[tokio::test]
    async fn a_rejected_refresh_ends_the_session_cleanly() {
        let app = TestApp::spawn().await;
        let client = client();
        app.sign_in(&client).await;
        let mut events = app.events.subscribe();

        app.backend.expire_access_tokens();
        app.backend.revoke_refresh_tokens();

        let response = client.get(app.url("/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            cookie_value(&response, "sb_access_token").as_deref(),
            Some(""),
            "dead tokens are torn down"
        );
        let body = response.text().await.unwrap();
        assert!(body.contains("DiaryNoteへようこそ"));

        assert_eq!(
            next_event(&mut events).await,
            AuthChange::SignedOut { user_id: None }
        );
    }

    #[tokio::test]
    async fn an_auth_outage_reads_as_anonymous_without_ending_the_session() {
        let app = TestApp::spawn().await;
        let client = client();
        app.sign_in(&client).await;

        app.backend.set_auth_outage(true);

        let response = client.get(app.url("/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            cookie_value(&response, "sb_access_token").is_none(),
            "tokens are left in place during the outage"
        );
        let body = response.text().await.unwrap();
        assert!(body.contains("DiaryNoteへようこそ"));
        assert_eq!(app.backend.list_calls(), 0, "nothing listed on the visitor's behalf");

        app.backend.set_auth_outage(false);

        let response = client.get(app.url("/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.text().await.unwrap();
        assert!(body.contains("最初の日記を書きましょう"), "the same cookies still sign in");
    }

    #[tokio::test]
    async fn a_store_outage_still_renders_the_list_with_a_banner() {
        let app = TestApp::spawn().await;
        let client = client();
        app.sign_in(&client).await;

        app.backend.set_rows_outage(true);

        let response = client.get(app.url("/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.text().await.unwrap();
        assert!(body.contains("日記の読み込み中にエラーが発生しました"));
        assert!(body.contains("新しい日記を書く"), "still the signed-in page");
    }

    #[tokio::test]
    async fn a_store_outage_turns_the_detail_page_into_a_bad_gateway() {
        let app = TestApp::spawn().await;
        let client = client();

        let id = app.backend.seed_row(*ANA_ID, "読めない日記", "停電の間だけ");
        app.backend.set_rows_outage(true);

        let response = client
            .get(app.url(&format!("/diary/{id}")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = response.text().await.unwrap();
        assert!(body.contains("日記の読み込み中にエラーが発生しました"));

        app.backend.set_rows_outage(false);

        let recovered = client
            .get(app.url(&format!("/diary/{id}")))
            .send()
            .await
            .unwrap();
        assert_eq!(recovered.status(), StatusCode::OK, "the entry was never gone");
    }

    #[tokio::test]
    async fn the_callback_without_a_code_just_goes_home() {
        let app = TestApp::spawn().await;
        let client = client();

        let response = client.get(app.url("/auth/callback")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
    }

    #[tokio::test]
    async fn a_failed_code_exchange_lands_home_with_a_banner() {
        let app = TestApp::spawn().await;
        let client = client();

        let response = client
            .get(app.url("/auth/callback?code=wrong-code"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/?error=auth");

        let home = client.get(app.url("/?error=auth")).send().await.unwrap();
        let body = home.text().await.unwrap();
        assert!(body.contains("認証処理中にエラーが発生しました"));
    }

    #[tokio::test]
    async fn a_good_code_exchange_starts_a_session() {
        let app = TestApp::spawn().await;
        let client = client();
        let mut events = app.events.subscribe();

        let response = client
            .get(app.url(&format!("/auth/callback?code={GOOD_CODE}")))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        assert!(cookie_value(&response, "sb_access_token").is_some());

        assert_eq!(
            next_event(&mut events).await,
            AuthChange::SignedIn { user_id: *ANA_ID }
        );
    }

    #[tokio::test]
    async fn posts_with_a_mismatched_csrf_token_are_rejected() {
        let app = TestApp::spawn().await;
        let client = client();
        app.sign_in(&client).await;

        let response = client
            .post(app.url("/diary/new"))
            .form(&[
                ("title", "偽のリクエスト"),
                ("content", "通らないはず"),
                ("csrf_token", "wrong-token"),
            ])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(app.backend.insert_calls(), 0);
    }

    #[tokio::test]
    async fn unknown_paths_render_the_not_found_page() {
        let app = TestApp::spawn().await;
        let client = client();

        let response = client.get(app.url("/no-such-page")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response.text().await.unwrap();
        assert!(body.contains("ページが見つかりませんでした"));

        let css = client.get(app.url("/static/style.css")).send().await.unwrap();
        assert_eq!(css.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn the_profile_page_shows_the_account() {
        let app = TestApp::spawn().await;
        let client = client();
        app.sign_in(&client).await;

        let response = client.get(app.url("/profile")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.text().await.unwrap();
        assert!(body.contains(ANA_EMAIL));
        assert!(body.contains(&ANA_ID.to_string()));
    }

    #[tokio::test]
    async fn a_garbled_entry_id_reads_as_not_found() {
        let app = TestApp::spawn().await;
        let client = client();

        let response = client
            .get(app.url("/diary/definitely-not-a-uuid"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = response.text().await.unwrap();
        assert!(body.contains("日記が見つかりませんでした"));
    }
}
