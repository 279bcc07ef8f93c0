use chrono::Utc;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        diary::{DiaryEntry, EntryPatch, NewEntry},
        session::Session,
    },
    state::AppState,
    validation::entry::{validate_content, validate_title},
};

/// How an entry relates to the caller after an owner-checked fetch.
#[derive(Debug)]
pub enum OwnedEntry {
    /// The entry exists and belongs to the caller.
    Granted(DiaryEntry),
    /// No such entry is visible to the caller.
    Missing,
    /// The entry exists but belongs to someone else.
    Foreign,
}

/// Lists the caller's entries, newest first.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `session` - The caller's resolved session.
///
/// # Returns
///
/// A `Result` containing the visible entries in creation order, newest
/// first. The backend's row policy decides visibility; no owner filter is
/// applied here.
pub async fn list_for(state: &AppState, session: &Session) -> Result<Vec<DiaryEntry>> {
    state.rows.list(&session.access_token).await
}

/// Fetches one entry by id, owned or not.
pub async fn fetch_one(
    state: &AppState,
    session: &Session,
    id: Uuid,
) -> Result<Option<DiaryEntry>> {
    state.rows.fetch(&session.access_token, id).await
}

/// Fetches one entry with no session, under the publishable key alone.
/// The backend's row policy decides what an anonymous visitor may see.
pub async fn fetch_public(state: &AppState, id: Uuid) -> Result<Option<DiaryEntry>> {
    state.rows.fetch(&state.config.supabase_anon_key, id).await
}

/// Fetches one entry and classifies it against the caller.
///
/// The backend's row policy stays authoritative on ownership; this check
/// runs anyway so a permissive read policy cannot put another user's
/// entry behind an edit or delete surface.
pub async fn fetch_owned(state: &AppState, session: &Session, id: Uuid) -> Result<OwnedEntry> {
    match state.rows.fetch(&session.access_token, id).await? {
        None => Ok(OwnedEntry::Missing),
        Some(entry) if entry.user_id == session.user_id => Ok(OwnedEntry::Granted(entry)),
        Some(entry) => {
            tracing::warn!(
                "🔒 User {} reached for foreign entry {} (owner {})",
                session.user_id,
                entry.id,
                entry.user_id
            );
            Ok(OwnedEntry::Foreign)
        }
    }
}

/// Validates and stores a new entry for the caller.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `session` - The caller's resolved session.
/// * `title` - The entry title, as typed.
/// * `content` - The entry body, as typed. Newlines are preserved.
///
/// # Returns
///
/// A `Result` containing the stored entry, id and timestamps assigned by
/// the backend.
pub async fn create(
    state: &AppState,
    session: &Session,
    title: &str,
    content: &str,
) -> Result<DiaryEntry> {
    validate_title(title)?;
    validate_content(content)?;

    let entry = NewEntry {
        user_id: session.user_id,
        title: title.to_string(),
        content: content.to_string(),
    };

    let stored = state.rows.insert(&session.access_token, &entry).await?;
    tracing::info!("📓 Entry {} created by {}", stored.id, session.user_id);

    Ok(stored)
}

/// Validates and applies an edit. Only title, content and a fresh
/// `updated_at` travel to the backend; owner and creation timestamp never
/// do.
pub async fn update(
    state: &AppState,
    session: &Session,
    id: Uuid,
    title: &str,
    content: &str,
) -> Result<OwnedEntry> {
    validate_title(title)?;
    validate_content(content)?;

    match fetch_owned(state, session, id).await? {
        OwnedEntry::Granted(_) => {
            let patch = EntryPatch {
                title: title.to_string(),
                content: content.to_string(),
                updated_at: Utc::now(),
            };

            match state.rows.update(&session.access_token, id, &patch).await? {
                Some(stored) => {
                    tracing::info!("📓 Entry {} updated by {}", id, session.user_id);
                    Ok(OwnedEntry::Granted(stored))
                }
                // The row vanished between the ownership check and the
                // write; last writer wins elsewhere, nothing to retry.
                None => Ok(OwnedEntry::Missing),
            }
        }
        other => Ok(other),
    }
}

/// Deletes the caller's entry. Irreversible; the confirmation step lives
/// in the handlers and is already behind us when this runs.
pub async fn delete(state: &AppState, session: &Session, id: Uuid) -> Result<OwnedEntry> {
    match fetch_owned(state, session, id).await? {
        OwnedEntry::Granted(entry) => {
            state.rows.delete(&session.access_token, id).await?;
            tracing::info!("🗑️ Entry {} deleted by {}", id, session.user_id);
            Ok(OwnedEntry::Granted(entry))
        }
        other => Ok(other),
    }
}
