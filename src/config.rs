//! Configuration management for sporlstats.
//!
//! This module handles loading configuration values from environment variables
//! and `.env` files. It provides a centralized way to manage application
//! configuration including Spotify API credentials, the callback server
//! address, the database location and sync parameters.
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the local data directory
//! 3. Application defaults (where applicable)

use std::{env, path::PathBuf, time::Duration};

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8888/callback";
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:8888";
pub const DEFAULT_SCOPE: &str =
    "user-read-private user-read-email user-read-recently-played user-top-read";

/// Provider-side cap on the page size of the top-items endpoints.
pub const MAX_TOP_LIMIT: u32 = 50;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Runtime settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub client_id: String,
    /// When set, token exchanges authenticate with HTTP Basic instead of the public PKCE form.
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scope: String,
    pub server_addr: String,
    pub database_path: PathBuf,
    pub top_limit: u32,
    pub http_timeout: Duration,
}

impl Settings {
    /// Loads the `.env` file from the local data directory and reads the settings.
    ///
    /// The function looks for the `.env` file in:
    /// - Linux: `~/.local/share/sporlstats/.env`
    /// - macOS: `~/Library/Application Support/sporlstats/.env`
    /// - Windows: `%LOCALAPPDATA%/sporlstats/.env`
    ///
    /// A missing `.env` file is not an error; values may come from the
    /// process environment alone.
    pub async fn load() -> Result<Self> {
        let path = data_dir().join(".env");
        if let Some(parent) = path.parent() {
            async_fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Config(e.to_string()))?;
        }

        if path.is_file() {
            dotenv::from_path(&path).map_err(|e| Error::Config(e.to_string()))?;
        }

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the settings from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `SPOTIFY_API_AUTH_CLIENT_ID` is missing, a
    /// numeric value cannot be parsed or the HTTP timeout is zero. Empty
    /// values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let client_id = lookup("SPOTIFY_API_AUTH_CLIENT_ID")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::Config("SPOTIFY_API_AUTH_CLIENT_ID must be set".to_string()))?;

        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let top_limit = match set("SPORLSTATS_TOP_LIMIT") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|e| Error::Config(format!("SPORLSTATS_TOP_LIMIT: {}", e)))?,
            None => MAX_TOP_LIMIT,
        }
        .clamp(1, MAX_TOP_LIMIT);

        let timeout_secs = match set("SPORLSTATS_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("SPORLSTATS_HTTP_TIMEOUT_SECS: {}", e)))?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };
        if timeout_secs == 0 {
            return Err(Error::Config(
                "SPORLSTATS_HTTP_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }

        let database_path = lookup("SPORLSTATS_DATABASE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_database_path);

        Ok(Self {
            api_url: get("SPOTIFY_API_URL", DEFAULT_API_URL)
                .trim_end_matches('/')
                .to_string(),
            auth_url: get("SPOTIFY_API_AUTH_URL", DEFAULT_AUTH_URL),
            token_url: get("SPOTIFY_API_TOKEN_URL", DEFAULT_TOKEN_URL),
            client_id,
            client_secret: lookup("SPOTIFY_API_AUTH_CLIENT_SECRET").filter(|v| !v.is_empty()),
            redirect_uri: get("SPOTIFY_API_REDIRECT_URI", DEFAULT_REDIRECT_URI),
            scope: get("SPOTIFY_API_AUTH_SCOPE", DEFAULT_SCOPE),
            server_addr: get("SERVER_ADDRESS", DEFAULT_SERVER_ADDRESS),
            database_path,
            top_limit,
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Returns the per-user application directory inside the platform data dir.
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("sporlstats");
    path
}

fn default_database_path() -> PathBuf {
    data_dir().join("sporlstats.db")
}
