use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One journal record, as stored in the backend's `diaries` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiaryEntry {
    /// Identifier assigned by the row store on insert.
    pub id: Uuid,
    /// The owning user. Only this identity may edit or delete the entry;
    /// the backend's row-level policy enforces it, and the view layer
    /// re-checks it before rendering owner-only surfaces.
    pub user_id: Uuid,
    pub title: String,
    /// Free text; newlines are preserved end to end.
    pub content: String,
    /// Assigned at creation, never touched afterwards.
    pub created_at: DateTime<Utc>,
    /// Assigned at creation, overwritten on every edit.
    pub updated_at: DateTime<Utc>,
}

impl DiaryEntry {
    /// Whether the entry has been edited since it was written.
    pub fn was_edited(&self) -> bool {
        self.updated_at != self.created_at
    }
}

/// Insert payload for a new entry. Timestamps are assigned by the backend.
#[derive(Debug, Clone, Serialize)]
pub struct NewEntry {
    pub user_id: Uuid,
    pub title: String,
    pub content: String,
}

/// Update payload for an edit: title, content and the bumped
/// `updated_at`. Owner and creation timestamp are deliberately absent;
/// an edit must never touch them.
#[derive(Debug, Clone, Serialize)]
pub struct EntryPatch {
    pub title: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}
