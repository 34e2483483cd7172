use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{AUDIO_FEATURES_BATCH_SIZE, decode_response};
use crate::{
    config::Settings,
    error::{Error, Result},
    management::CredentialManager,
    types::{
        Artist, AudioFeatures, AudioFeaturesResponse, Paging, RecentlyPlayedResponse, TimeRange,
        Track,
    },
};

/// The endpoints the sync engine reads, bound to one user.
#[async_trait]
pub trait SpotifyApi: Send + Sync {
    /// One page of plays strictly after `after_ms`, or the newest page when `None`.
    async fn recently_played(&self, after_ms: Option<i64>, limit: u32)
    -> Result<RecentlyPlayedResponse>;

    async fn top_artists(&self, range: TimeRange, limit: u32, offset: u32) -> Result<Paging<Artist>>;

    async fn top_tracks(&self, range: TimeRange, limit: u32, offset: u32) -> Result<Paging<Track>>;

    /// Descriptors for `track_ids` in request order; `None` where Spotify has none.
    async fn audio_features(&self, track_ids: &[String]) -> Result<Vec<Option<AudioFeatures>>>;
}

/// Spotify Web API client acting on behalf of one stored user.
///
/// A token is requested from the [`CredentialManager`] before every call, so
/// long running syncs never send a token that expired halfway through. A 401
/// forces one refresh and the request is sent once more; a second 401 fails
/// with `Error::Authentication`.
pub struct SpotifyClient {
    http: Client,
    base_url: String,
    credentials: Arc<CredentialManager>,
    user_id: String,
}

impl SpotifyClient {
    pub fn new(
        settings: &Settings,
        credentials: Arc<CredentialManager>,
        user_id: impl Into<String>,
    ) -> Result<Self> {
        Ok(SpotifyClient {
            http: super::http_client(settings)?,
            base_url: settings.api_url.clone(),
            credentials,
            user_id: user_id.into(),
        })
    }

    /// Sends `method` to `endpoint` (relative to the API base) and decodes the body.
    pub async fn request<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        method: Method,
        params: &[(&str, String)],
    ) -> Result<T> {
        let token = self.credentials.get_valid_token(&self.user_id).await?;
        let mut response = self.send(endpoint, &method, params, &token).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("{} {} answered 401, forcing a token refresh", method, endpoint);
            let token = self
                .credentials
                .force_refresh(&self.user_id, &token)
                .await?;
            response = self.send(endpoint, &method, params, &token).await?;
            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(Error::Authentication {
                    endpoint: endpoint.to_string(),
                });
            }
        }

        decode_response(endpoint, response).await
    }

    async fn send(
        &self,
        endpoint: &str,
        method: &Method,
        params: &[(&str, String)],
        token: &str,
    ) -> Result<Response> {
        debug!("{} {} {:?}", method, endpoint, params);
        let mut request = self
            .http
            .request(method.clone(), format!("{}{}", self.base_url, endpoint))
            .bearer_auth(token);
        if !params.is_empty() {
            request = request.query(params);
        }

        request
            .send()
            .await
            .map_err(|source| Error::ExternalApiUnavailable {
                endpoint: endpoint.to_string(),
                source,
            })
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        self.request(endpoint, Method::GET, params).await
    }
}

#[async_trait]
impl SpotifyApi for SpotifyClient {
    async fn recently_played(
        &self,
        after_ms: Option<i64>,
        limit: u32,
    ) -> Result<RecentlyPlayedResponse> {
        let mut params = vec![("limit", limit.to_string())];
        if let Some(after) = after_ms {
            params.push(("after", after.to_string()));
        }
        self.get("/me/player/recently-played", &params).await
    }

    async fn top_artists(&self, range: TimeRange, limit: u32, offset: u32) -> Result<Paging<Artist>> {
        self.get(
            "/me/top/artists",
            &[
                ("time_range", range.as_str().to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )
        .await
    }

    async fn top_tracks(&self, range: TimeRange, limit: u32, offset: u32) -> Result<Paging<Track>> {
        self.get(
            "/me/top/tracks",
            &[
                ("time_range", range.as_str().to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )
        .await
    }

    async fn audio_features(&self, track_ids: &[String]) -> Result<Vec<Option<AudioFeatures>>> {
        let mut features = Vec::with_capacity(track_ids.len());
        for chunk in track_ids.chunks(AUDIO_FEATURES_BATCH_SIZE) {
            let response: AudioFeaturesResponse = self
                .get("/audio-features", &[("ids", chunk.join(","))])
                .await?;
            features.extend(
                response
                    .audio_features
                    .into_iter()
                    .map(AudioFeatures::from_entry),
            );
        }
        Ok(features)
    }
}
