//! Error taxonomy for the sync and insights engine.
//!
//! Authentication failures (`CredentialExpired`, `Authentication`) are fatal to
//! a sync and require the user to run `sporlstats auth` again. Provider and
//! transport failures are safe to retry later because ingestion is idempotent.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The refresh exchange was rejected; the stored refresh token is no longer usable.
    #[error("Spotify credential for user {user_id} expired and could not be refreshed: {reason}")]
    CredentialExpired { user_id: String, reason: String },

    /// A request was rejected with 401 twice in a row, once after a forced refresh.
    #[error("Spotify rejected the credential for {endpoint} after a forced refresh")]
    Authentication { endpoint: String },

    #[error("Spotify API error on {endpoint}: {status} {message}")]
    ExternalApi {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Spotify API unavailable on {endpoint}: {source}")]
    ExternalApiUnavailable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// The authorization handshake did not produce a usable grant.
    #[error("Authorization was not completed: {0}")]
    AuthorizationIncomplete(String),

    #[error("No stored credential for user {user_id}. Run sporlstats auth")]
    NotAuthenticated { user_id: String },

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether running the same operation again later may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ExternalApi { .. } | Error::ExternalApiUnavailable { .. }
        )
    }

    /// Whether the user has to authorize again before any further sync.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Error::CredentialExpired { .. }
                | Error::Authentication { .. }
                | Error::NotAuthenticated { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
