use std::env;
use std::net::SocketAddr;
use anyhow::{Context, Result};

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// Base URL of the Supabase-compatible backend (auth + row store).
    pub supabase_url: String,
    /// The backend's publishable (anon) API key.
    pub supabase_anon_key: String,
    /// The address the HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// Lifetime of the refresh-token cookie in days.
    pub session_duration_days: i64,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// `SUPABASE_URL` and `SUPABASE_ANON_KEY` are required; everything else
    /// has a default.
    pub fn from_env() -> Result<Self> {
        let supabase_url = env::var("SUPABASE_URL")
            .context("SUPABASE_URL must be set (e.g. https://xyzcompany.supabase.co)")?
            .trim_end_matches('/')
            .to_string();

        let supabase_anon_key = env::var("SUPABASE_ANON_KEY")
            .context("SUPABASE_ANON_KEY must be set (the project's publishable key)")?;

        if supabase_anon_key.trim().is_empty() {
            anyhow::bail!("SUPABASE_ANON_KEY must not be empty");
        }

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            listen_addr: env::var("LISTEN_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
                .parse()
                .context("Invalid LISTEN_ADDR")?,
            session_duration_days: env::var("SESSION_DURATION_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .context("Invalid SESSION_DURATION_DAYS")?,
        })
    }
}
