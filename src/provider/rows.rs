//! Client for the backend's row API (PostgREST dialect) over the
//! `diaries` table.
//!
//! Every call carries the caller's access token; the backend's row-level
//! policy decides which rows exist for that caller. This client never
//! filters by owner itself.

use http::{StatusCode, header};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::diary::{DiaryEntry, EntryPatch, NewEntry};

/// PostgREST error payloads carry the reason under `message`.
#[derive(Deserialize, Default)]
struct RowsErrorBody {
    message: Option<String>,
}

fn rows_error_message(body: &str) -> String {
    let parsed: RowsErrorBody = sonic_rs::from_str(body).unwrap_or_default();
    parsed.message.unwrap_or_else(|| {
        let mut end = body.len().min(200);
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body[..end].to_string()
    })
}

fn rows_failure(status: StatusCode, body: &str, what: &str) -> AppError {
    let message = rows_error_message(body);
    tracing::error!("❌ Row store {} failed ({}): {}", what, status, message);
    AppError::Upstream {
        status: status.as_u16(),
        message,
    }
}

/// Client for the row-store half of the backend.
#[derive(Clone)]
pub struct RecordStore {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl RecordStore {
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

    fn table_url(&self) -> String {
        format!("{}/rest/v1/diaries", self.base_url)
    }

    /// Lists the entries visible to this token, newest first.
    pub async fn list(&self, access_token: &str) -> Result<Vec<DiaryEntry>> {
        let response = self
            .http
            .get(format!(
                "{}?select=*&order=created_at.desc",
                self.table_url()
            ))
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await?;

        self.read_rows(response, "list").await
    }

    /// Fetches one entry by id.
    ///
    /// Deliberately requested as a plain filtered select rather than a
    /// single-object representation: zero rows is a well-formed answer
    /// (missing, or not visible to this token) and maps to `None`, never
    /// to an error.
    pub async fn fetch(&self, access_token: &str, id: Uuid) -> Result<Option<DiaryEntry>> {
        let response = self
            .http
            .get(format!("{}?select=*&id=eq.{}", self.table_url(), id))
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await?;

        let rows = self.read_rows(response, "fetch").await?;
        Ok(rows.into_iter().next())
    }

    /// Inserts a new entry and returns the stored row, timestamps and id
    /// assigned by the backend.
    pub async fn insert(&self, access_token: &str, entry: &NewEntry) -> Result<DiaryEntry> {
        let response = self
            .http
            .post(self.table_url())
            .header(header::CONTENT_TYPE, "application/json")
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .header("Prefer", "return=representation")
            .body(sonic_rs::to_string(entry)?)
            .send()
            .await?;

        let rows = self.read_rows(response, "insert").await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("insert returned no representation".to_string()))
    }

    /// Applies an edit to the entry with this id and returns the stored
    /// row. `None` means the row vanished or is not writable by this
    /// token; the row policy filters silently rather than erroring.
    pub async fn update(
        &self,
        access_token: &str,
        id: Uuid,
        patch: &EntryPatch,
    ) -> Result<Option<DiaryEntry>> {
        let response = self
            .http
            .patch(format!("{}?id=eq.{}", self.table_url(), id))
            .header(header::CONTENT_TYPE, "application/json")
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .header("Prefer", "return=representation")
            .body(sonic_rs::to_string(patch)?)
            .send()
            .await?;

        let rows = self.read_rows(response, "update").await?;
        Ok(rows.into_iter().next())
    }

    /// Deletes the entry with this id. Idempotent from the caller's view;
    /// deleting an already-gone row succeeds.
    pub async fn delete(&self, access_token: &str, id: Uuid) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}?id=eq.{}", self.table_url(), id))
            .header("apikey", &self.anon_key)
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(rows_failure(status, &text, "delete"));
        }

        Ok(())
    }

    async fn read_rows(&self, response: reqwest::Response, what: &str) -> Result<Vec<DiaryEntry>> {
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(rows_failure(status, &text, what));
        }

        sonic_rs::from_str(&text).map_err(|e| AppError::Upstream {
            status: status.as_u16(),
            message: format!("malformed {what} response: {e}"),
        })
    }
}
