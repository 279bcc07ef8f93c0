use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The signed-in identity, as resolved against the auth backend for the
/// current request.
///
/// The session is owned by the backend; this struct is a transient local
/// copy and is re-derived on every request. `access_token` is the caller's
/// capability for row-store calls: the backend's row-level policy keys off
/// it, so it must accompany every read and write issued on this user's
/// behalf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// The backend-assigned user identifier.
    pub user_id: Uuid,
    /// The user's email address, when the backend discloses one.
    pub email: Option<String>,
    /// When the backend last updated this identity.
    pub updated_at: Option<DateTime<Utc>>,
    /// Bearer token for backend calls made on this user's behalf.
    pub access_token: String,
}

/// The per-request outcome of session resolution.
///
/// Every page derives its rendering and redirect decisions from this value;
/// no page talks to the auth backend directly.
#[derive(Debug, Clone)]
pub enum SessionState {
    /// A session resolved (possibly after a silent token refresh).
    Authenticated(Session),
    /// No usable session: no tokens, rejected tokens, or an unreadable
    /// session treated as absent for access control.
    Anonymous,
}

impl SessionState {
    /// Returns the resolved session, if any.
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            SessionState::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionState::Authenticated(_))
    }
}
