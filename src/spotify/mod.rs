//! # Spotify Integration Module
//!
//! This module is the integration layer between sporlstats and the Spotify Web
//! API. It covers the authorization handshake that produces a stored
//! credential, the refresh exchange used to keep that credential valid, and a
//! typed client for the endpoints the sync engine reads from.
//!
//! ## Architecture
//!
//! ```text
//! Management Layer (sync, credential lifecycle)
//!          ↓
//! Spotify Integration Layer
//!     ├── Authentication (OAuth 2.0 PKCE, refresh exchange)
//!     └── Client (profile, recently played, top items, audio features)
//!          ↓
//! HTTP Layer (reqwest, JSON)
//!          ↓
//! Spotify Web API
//! ```
//!
//! ## Core Modules
//!
//! - [`auth`] - PKCE authorization flow, code exchange and the [`auth::TokenEndpoint`]
//!   seam used by the credential lifecycle to refresh tokens.
//! - [`client`] - [`client::SpotifyClient`], which asks the credential lifecycle for a
//!   fresh token before every request, retries exactly once after a 401 and
//!   splits id lists into batches the API accepts.
//!
//! ## Error Handling
//!
//! All functions return the crate [`Error`]:
//! - non-2xx responses become `Error::ExternalApi` with the endpoint and status
//! - transport failures become `Error::ExternalApiUnavailable`
//! - bodies that do not match the expected shape become `Error::Decode`
//!
//! Apart from the single retry after a 401 nothing is retried here. Ingestion
//! is idempotent, so callers retry a whole sync instead.

pub mod auth;
pub mod client;

pub use client::{SpotifyApi, SpotifyClient};

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;

use crate::{
    config::Settings,
    error::{Error, Result},
};

/// Maximum number of ids the audio features endpoint accepts per call.
pub const AUDIO_FEATURES_BATCH_SIZE: usize = 100;

/// Page size for the recently played endpoint, which is also its cap.
pub const RECENTLY_PLAYED_LIMIT: u32 = 50;

/// Builds the shared HTTP client with the configured request timeout.
pub fn http_client(settings: &Settings) -> Result<Client> {
    Client::builder()
        .timeout(settings.http_timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Config(format!("Cannot build HTTP client: {}", e)))
}

/// Turns a response into `T`, mapping non-2xx statuses and malformed bodies to typed errors.
///
/// An empty body decodes as JSON `null`, so `()` and `Option<_>` work for
/// endpoints that answer `204 No Content`.
pub(crate) async fn decode_response<T: DeserializeOwned>(
    endpoint: &str,
    response: Response,
) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| Error::ExternalApiUnavailable {
            endpoint: endpoint.to_string(),
            source,
        })?;

    if !status.is_success() {
        return Err(Error::ExternalApi {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            message: error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("").to_string()),
        });
    }

    let body = if body.trim().is_empty() { "null" } else { body.as_str() };
    serde_json::from_str(body).map_err(|source| Error::Decode {
        endpoint: endpoint.to_string(),
        source,
    })
}

/// Extracts the message from Spotify's error bodies.
///
/// The Web API answers `{"error": {"status": 429, "message": "..."}}`, the
/// accounts service `{"error": "invalid_grant", "error_description": "..."}`.
fn error_message(body: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;
    let error = json.get("error")?;
    if let Some(message) = error.get("message").and_then(|m| m.as_str()) {
        return Some(message.to_string());
    }
    let code = error.as_str()?;
    match json.get("error_description").and_then(|d| d.as_str()) {
        Some(description) => Some(format!("{}: {}", code, description)),
        None => Some(code.to_string()),
    }
}
