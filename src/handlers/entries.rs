use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Extension, Form,
};
use minijinja::context;
use serde::Deserialize;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        diary::DiaryEntry,
        session::{Session, SessionState},
    },
    services::{diary as diary_service, diary::OwnedEntry, session},
    state::AppState,
    views::{session_view, SessionView},
};

const NOT_FOUND_MESSAGE: &str = "日記が見つかりませんでした";
const READ_ERROR_MESSAGE: &str = "日記の読み込み中にエラーが発生しました";
const SAVE_ERROR_MESSAGE: &str = "日記の保存中にエラーが発生しました。もう一度お試しください。";
const DELETE_ERROR_MESSAGE: &str = "削除中にエラーが発生しました。もう一度お試しください。";

/// Query string of the list page. `error` is set by the auth callback
/// when a code exchange fails.
#[derive(Deserialize, Debug)]
pub struct ListQuery {
    pub error: Option<String>,
}

/// Fields posted by the entry form, for new entries and edits alike.
#[derive(Deserialize, Debug)]
pub struct EntryForm {
    pub title: String,
    pub content: String,
}

/// Renders the start page.
///
/// Signed-out visitors get the welcome screen without any row-store
/// call made on their behalf. Signed-in visitors get their entries,
/// newest first; if the store cannot be reached the page still renders,
/// with a banner instead of the list.
#[axum::debug_handler]
pub async fn list_entries(
    State(state): State<AppState>,
    Extension(session_state): Extension<SessionState>,
    cookies: Cookies,
    Query(query): Query<ListQuery>,
) -> Result<Response> {
    let csrf_token = session::ensure_csrf_cookie(&cookies);

    let mut banner = query
        .error
        .as_deref()
        .map(|_| "認証処理中にエラーが発生しました".to_string());

    let entries = match session_state.session() {
        None => Vec::new(),
        Some(session) => match diary_service::list_for(&state, session).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("❌ Failed to list entries: {}", e);
                banner = Some(READ_ERROR_MESSAGE.to_string());
                Vec::new()
            }
        },
    };

    let html = state.views.render(
        "index.html",
        context! {
            session => session_view(&session_state),
            csrf_token => csrf_token,
            error => banner,
            entries => entries,
        },
    )?;
    Ok(html.into_response())
}

/// Renders one entry. Open to signed-out visitors as well; what they
/// can actually see is decided by the backend's row policy, so an
/// invisible or absent entry uniformly renders the not-found state.
#[axum::debug_handler]
pub async fn entry_detail(
    State(state): State<AppState>,
    Extension(session_state): Extension<SessionState>,
    cookies: Cookies,
    Path(id): Path<String>,
) -> Result<Response> {
    // A malformed id behaves exactly like an absent row.
    let Ok(id) = id.parse::<Uuid>() else {
        let viewer = session_view(&session_state);
        return render_message(&state, viewer, &cookies, NOT_FOUND_MESSAGE, StatusCode::NOT_FOUND);
    };

    let fetched = match session_state.session() {
        Some(session) => diary_service::fetch_one(&state, session, id).await,
        None => diary_service::fetch_public(&state, id).await,
    };

    let viewer = session_view(&session_state);
    match fetched {
        Ok(Some(entry)) => {
            let is_owner = session_state
                .session()
                .map(|s| s.user_id == entry.user_id)
                .unwrap_or(false);
            let was_edited = entry.was_edited();

            let csrf_token = session::ensure_csrf_cookie(&cookies);
            let html = state.views.render(
                "entry_detail.html",
                context! {
                    session => viewer,
                    csrf_token => csrf_token,
                    entry => entry,
                    is_owner => is_owner,
                    was_edited => was_edited,
                },
            )?;
            Ok(html.into_response())
        }
        Ok(None) => {
            render_message(&state, viewer, &cookies, NOT_FOUND_MESSAGE, StatusCode::NOT_FOUND)
        }
        Err(e) => {
            tracing::error!("❌ Failed to load entry {}: {}", id, e);
            render_message(&state, viewer, &cookies, READ_ERROR_MESSAGE, StatusCode::BAD_GATEWAY)
        }
    }
}

/// Renders the blank form for a new entry.
#[axum::debug_handler]
pub async fn new_entry_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    cookies: Cookies,
) -> Result<Response> {
    render_form(
        &state,
        &session,
        &cookies,
        new_entry_screen("", "", None, StatusCode::OK),
    )
}

/// Stores a new entry and returns to the list.
///
/// # Arguments
/// * `form` - Title and content as typed
///
/// # Returns
/// * 303 to the list on success
/// * The form re-rendered with a banner and the typed values kept when
///   validation or the store refuses the entry
#[axum::debug_handler]
pub async fn create_entry(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    cookies: Cookies,
    Form(form): Form<EntryForm>,
) -> Result<Response> {
    match diary_service::create(&state, &session, &form.title, &form.content).await {
        Ok(_) => Ok(Redirect::to("/").into_response()),
        Err(AppError::Validation(message)) => render_form(
            &state,
            &session,
            &cookies,
            new_entry_screen(&form.title, &form.content, Some(&message), StatusCode::BAD_REQUEST),
        ),
        Err(e) => {
            tracing::error!("❌ Failed to store entry: {}", e);
            render_form(
                &state,
                &session,
                &cookies,
                new_entry_screen(
                    &form.title,
                    &form.content,
                    Some(SAVE_ERROR_MESSAGE),
                    StatusCode::BAD_GATEWAY,
                ),
            )
        }
    }
}

/// Renders the edit form, pre-filled with the stored entry.
#[axum::debug_handler]
pub async fn edit_entry_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    cookies: Cookies,
    Path(id): Path<String>,
) -> Result<Response> {
    let viewer = SessionView::from(&session);
    let Ok(id) = id.parse::<Uuid>() else {
        return render_message(
            &state,
            Some(viewer),
            &cookies,
            NOT_FOUND_MESSAGE,
            StatusCode::NOT_FOUND,
        );
    };

    match diary_service::fetch_owned(&state, &session, id).await {
        Ok(OwnedEntry::Granted(entry)) => render_form(
            &state,
            &session,
            &cookies,
            edit_entry_screen(id, &entry.title, &entry.content, None, StatusCode::OK),
        ),
        Ok(OwnedEntry::Missing) => {
            render_message(&state, Some(viewer), &cookies, NOT_FOUND_MESSAGE, StatusCode::NOT_FOUND)
        }
        Ok(OwnedEntry::Foreign) => Ok(Redirect::to("/").into_response()),
        Err(e) => {
            tracing::error!("❌ Failed to load entry {} for editing: {}", id, e);
            render_message(
                &state,
                Some(viewer),
                &cookies,
                READ_ERROR_MESSAGE,
                StatusCode::BAD_GATEWAY,
            )
        }
    }
}

/// Applies an edit and returns to the entry.
#[axum::debug_handler]
pub async fn update_entry(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    cookies: Cookies,
    Path(id): Path<String>,
    Form(form): Form<EntryForm>,
) -> Result<Response> {
    let viewer = SessionView::from(&session);
    let Ok(id) = id.parse::<Uuid>() else {
        return render_message(
            &state,
            Some(viewer),
            &cookies,
            NOT_FOUND_MESSAGE,
            StatusCode::NOT_FOUND,
        );
    };

    match diary_service::update(&state, &session, id, &form.title, &form.content).await {
        Ok(OwnedEntry::Granted(entry)) => {
            Ok(Redirect::to(&format!("/diary/{}", entry.id)).into_response())
        }
        Ok(OwnedEntry::Missing) => {
            render_message(&state, Some(viewer), &cookies, NOT_FOUND_MESSAGE, StatusCode::NOT_FOUND)
        }
        Ok(OwnedEntry::Foreign) => Ok(Redirect::to("/").into_response()),
        Err(AppError::Validation(message)) => render_form(
            &state,
            &session,
            &cookies,
            edit_entry_screen(
                id,
                &form.title,
                &form.content,
                Some(&message),
                StatusCode::BAD_REQUEST,
            ),
        ),
        Err(e) => {
            tracing::error!("❌ Failed to update entry {}: {}", id, e);
            render_form(
                &state,
                &session,
                &cookies,
                edit_entry_screen(
                    id,
                    &form.title,
                    &form.content,
                    Some(SAVE_ERROR_MESSAGE),
                    StatusCode::BAD_GATEWAY,
                ),
            )
        }
    }
}

/// Renders the delete confirmation page.
#[axum::debug_handler]
pub async fn delete_confirm_page(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    cookies: Cookies,
    Path(id): Path<String>,
) -> Result<Response> {
    let viewer = SessionView::from(&session);
    let Ok(id) = id.parse::<Uuid>() else {
        return render_message(
            &state,
            Some(viewer),
            &cookies,
            NOT_FOUND_MESSAGE,
            StatusCode::NOT_FOUND,
        );
    };

    match diary_service::fetch_owned(&state, &session, id).await {
        Ok(OwnedEntry::Granted(entry)) => {
            render_confirm(&state, &session, &cookies, &entry, None, StatusCode::OK)
        }
        Ok(OwnedEntry::Missing) => {
            render_message(&state, Some(viewer), &cookies, NOT_FOUND_MESSAGE, StatusCode::NOT_FOUND)
        }
        Ok(OwnedEntry::Foreign) => Ok(Redirect::to("/").into_response()),
        Err(e) => {
            tracing::error!("❌ Failed to load entry {} for deletion: {}", id, e);
            render_message(
                &state,
                Some(viewer),
                &cookies,
                READ_ERROR_MESSAGE,
                StatusCode::BAD_GATEWAY,
            )
        }
    }
}

/// Deletes an entry after confirmation and returns to the list.
#[axum::debug_handler]
pub async fn delete_entry(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    cookies: Cookies,
    Path(id): Path<String>,
) -> Result<Response> {
    let viewer = SessionView::from(&session);
    let Ok(id) = id.parse::<Uuid>() else {
        return render_message(
            &state,
            Some(viewer),
            &cookies,
            NOT_FOUND_MESSAGE,
            StatusCode::NOT_FOUND,
        );
    };

    match diary_service::delete(&state, &session, id).await {
        Ok(OwnedEntry::Granted(_)) => Ok(Redirect::to("/").into_response()),
        Ok(OwnedEntry::Missing) => {
            render_message(&state, Some(viewer), &cookies, NOT_FOUND_MESSAGE, StatusCode::NOT_FOUND)
        }
        Ok(OwnedEntry::Foreign) => Ok(Redirect::to("/").into_response()),
        Err(e) => {
            tracing::error!("❌ Failed to delete entry {}: {}", id, e);
            // Offer the confirmation again so the visitor can retry.
            match diary_service::fetch_owned(&state, &session, id).await {
                Ok(OwnedEntry::Granted(entry)) => render_confirm(
                    &state,
                    &session,
                    &cookies,
                    &entry,
                    Some(DELETE_ERROR_MESSAGE),
                    StatusCode::BAD_GATEWAY,
                ),
                _ => render_message(
                    &state,
                    Some(viewer),
                    &cookies,
                    DELETE_ERROR_MESSAGE,
                    StatusCode::BAD_GATEWAY,
                ),
            }
        }
    }
}

/// Fallback for paths no route claims.
#[axum::debug_handler]
pub async fn not_found_page(
    State(state): State<AppState>,
    session_state: Option<Extension<SessionState>>,
    cookies: Cookies,
) -> Result<Response> {
    let viewer = session_state.as_ref().and_then(|ext| session_view(&ext.0));
    render_message(&state, viewer, &cookies, "ページが見つかりませんでした", StatusCode::NOT_FOUND)
}

/// Everything the entry form template needs besides session context.
struct FormScreen<'a> {
    heading: &'static str,
    action: String,
    cancel_href: String,
    title_placeholder: &'static str,
    title_value: &'a str,
    content_value: &'a str,
    error: Option<&'a str>,
    status: StatusCode,
}

fn new_entry_screen<'a>(
    title_value: &'a str,
    content_value: &'a str,
    error: Option<&'a str>,
    status: StatusCode,
) -> FormScreen<'a> {
    FormScreen {
        heading: "新しい日記を書く",
        action: "/diary/new".to_string(),
        cancel_href: "/".to_string(),
        title_placeholder: "今日の出来事",
        title_value,
        content_value,
        error,
        status,
    }
}

fn edit_entry_screen<'a>(
    id: Uuid,
    title_value: &'a str,
    content_value: &'a str,
    error: Option<&'a str>,
    status: StatusCode,
) -> FormScreen<'a> {
    FormScreen {
        heading: "日記を編集",
        action: format!("/diary/edit/{id}"),
        cancel_href: format!("/diary/{id}"),
        title_placeholder: "日記のタイトル",
        title_value,
        content_value,
        error,
        status,
    }
}

fn render_form(
    state: &AppState,
    session: &Session,
    cookies: &Cookies,
    screen: FormScreen<'_>,
) -> Result<Response> {
    let csrf_token = session::ensure_csrf_cookie(cookies);
    let html = state.views.render(
        "entry_form.html",
        context! {
            session => SessionView::from(session),
            csrf_token => csrf_token,
            heading => screen.heading,
            action => screen.action,
            cancel_href => screen.cancel_href,
            title_placeholder => screen.title_placeholder,
            title_value => screen.title_value,
            content_value => screen.content_value,
            error => screen.error,
        },
    )?;
    Ok((screen.status, html).into_response())
}

fn render_confirm(
    state: &AppState,
    session: &Session,
    cookies: &Cookies,
    entry: &DiaryEntry,
    error: Option<&str>,
    status: StatusCode,
) -> Result<Response> {
    let csrf_token = session::ensure_csrf_cookie(cookies);
    let html = state.views.render(
        "delete_confirm.html",
        context! {
            session => SessionView::from(session),
            csrf_token => csrf_token,
            entry => entry,
            error => error,
        },
    )?;
    Ok((status, html).into_response())
}

fn render_message(
    state: &AppState,
    viewer: Option<SessionView>,
    cookies: &Cookies,
    message: &str,
    status: StatusCode,
) -> Result<Response> {
    let csrf_token = session::ensure_csrf_cookie(cookies);
    let html = state.views.render(
        "not_found.html",
        context! {
            session => viewer,
            csrf_token => csrf_token,
            message => message,
        },
    )?;
    Ok((status, html).into_response())
}
