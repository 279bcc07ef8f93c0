//! Session transition notifications.
//!
//! One process-wide ordered stream of auth transitions. The session
//! resolution path emits onto it; any number of subscribers consume it.
//! The built-in transition logger subscribes at startup before the
//! listener accepts its first connection, so every transition the
//! resolver observes is deliverable from the stream's first event on.

use tokio::sync::broadcast;
use uuid::Uuid;

/// A session transition observed by the resolution path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthChange {
    /// A user signed in: password grant, sign-up or code exchange.
    SignedIn { user_id: Uuid },
    /// The session ended: explicit sign-out, or tokens the backend
    /// refused to refresh. The id is `None` when the dead tokens never
    /// resolved far enough to name their user.
    SignedOut { user_id: Option<Uuid> },
    /// An expired access token was replaced silently. Never navigates.
    TokenRefreshed { user_id: Uuid },
}

/// Handle on the transition stream. Cheap to clone; all clones share the
/// same channel.
#[derive(Clone)]
pub struct AuthEvents {
    tx: broadcast::Sender<AuthChange>,
}

impl AuthEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    /// Delivers a transition to every current subscriber, in emission
    /// order per subscriber. Sending fails only when nobody subscribes,
    /// and an unobserved notification is not an error.
    pub fn emit(&self, change: AuthChange) {
        let _ = self.tx.send(change);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.tx.subscribe()
    }
}

impl Default for AuthEvents {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawns the task that consumes the transition stream and logs each
/// transition. This is the single structured observability point for
/// session changes.
pub fn spawn_transition_logger(events: &AuthEvents) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(AuthChange::SignedIn { user_id }) => {
                    tracing::info!("🔐 Signed in: {}", user_id);
                }
                Ok(AuthChange::SignedOut {
                    user_id: Some(user_id),
                }) => {
                    tracing::info!("🔐 Signed out: {}", user_id);
                }
                Ok(AuthChange::SignedOut { user_id: None }) => {
                    tracing::info!("🔐 Signed out (tokens no longer resolvable)");
                }
                Ok(AuthChange::TokenRefreshed { user_id }) => {
                    tracing::info!("🔄 Session refreshed: {}", user_id);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("Transition logger lagged, {} transitions dropped", n);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
