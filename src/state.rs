use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::Result;
use crate::events::AuthEvents;
use crate::provider::auth::AuthProvider;
use crate::provider::rows::RecordStore;
use crate::views::Views;

/// How long any single backend call may take before it is abandoned.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// The application's configuration.
    pub config: Config,
    /// Client for the auth half of the backend.
    pub provider: AuthProvider,
    /// Client for the row-store half of the backend.
    pub rows: RecordStore,
    /// Broadcast channel for session transitions.
    pub events: AuthEvents,
    /// The compiled page templates.
    pub views: Arc<Views>,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub fn new(config: &Config) -> Result<Self> {
        // One connection pool serves both halves of the backend.
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        let provider = AuthProvider::new(
            http.clone(),
            config.supabase_url.clone(),
            config.supabase_anon_key.clone(),
        );
        tracing::info!("✅ Auth provider client initialized for {}", config.supabase_url);

        let rows = RecordStore::new(
            http,
            config.supabase_url.clone(),
            config.supabase_anon_key.clone(),
        );
        tracing::info!("✅ Row store client initialized");

        let events = AuthEvents::new();
        tracing::info!("✅ Session transition channel initialized");

        let views = Arc::new(Views::new()?);
        tracing::info!("✅ Page templates compiled");

        Ok(AppState {
            config: config.clone(),
            provider,
            rows,
            events,
            views,
        })
    }
}
