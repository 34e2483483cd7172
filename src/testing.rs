//! In-crate fakes shared by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::{Error, Result},
    spotify::{SpotifyApi, auth::TokenEndpoint},
    types::{
        Artist, AudioFeatures, Credential, Paging, PlayHistoryItem, RecentlyPlayedResponse,
        SimpleAlbum, SimpleArtist, TimeRange, TokenGrant, Track,
    },
};

pub fn make_credential(user_id: &str, access_token: &str, expires_at: DateTime<Utc>) -> Credential {
    Credential {
        user_id: user_id.to_string(),
        display_name: Some(format!("{} name", user_id)),
        email: None,
        access_token: access_token.to_string(),
        refresh_token: "refresh-1".to_string(),
        expires_at,
    }
}

pub fn make_track(track_id: &str, artist_id: &str, duration_ms: i64, popularity: i64) -> Track {
    Track {
        id: Some(track_id.to_string()),
        name: format!("Track {}", track_id),
        duration_ms,
        popularity,
        artists: vec![SimpleArtist {
            id: Some(artist_id.to_string()),
            name: format!("Artist {}", artist_id),
        }],
        album: SimpleAlbum {
            id: Some(format!("album-{}", artist_id)),
            name: format!("Album {}", artist_id),
        },
    }
}

pub fn make_history_item(track_id: &str, artist_id: &str, played_at: &str) -> PlayHistoryItem {
    PlayHistoryItem {
        track: Some(make_track(track_id, artist_id, 200_000, 50)),
        played_at: played_at.to_string(),
    }
}

pub fn make_artist(artist_id: &str, genres: &[&str], popularity: i64) -> Artist {
    Artist {
        id: artist_id.to_string(),
        name: format!("Artist {}", artist_id),
        genres: genres.iter().map(|g| g.to_string()).collect(),
        popularity,
    }
}

pub fn make_features(track_id: &str, valence: f64, energy: f64, danceability: f64) -> AudioFeatures {
    AudioFeatures {
        track_id: track_id.to_string(),
        danceability,
        energy,
        key: 0,
        loudness: -8.0,
        mode: 1,
        speechiness: 0.1,
        acousticness: 0.2,
        instrumentalness: 0.0,
        liveness: 0.1,
        valence,
        tempo: 120.0,
        duration_ms: 200_000,
        time_signature: 4,
    }
}

pub struct FakeTokenEndpoint {
    access_token: String,
    rotated_refresh_token: Option<String>,
    fail_status: Option<u16>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeTokenEndpoint {
    pub fn new(access_token: &str) -> Self {
        FakeTokenEndpoint {
            access_token: access_token.to_string(),
            rotated_refresh_token: None,
            fail_status: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Rejects every refresh with `400 invalid_grant`.
    pub fn failing() -> Self {
        Self::failing_with(400)
    }

    pub fn failing_with(status: u16) -> Self {
        FakeTokenEndpoint {
            fail_status: Some(status),
            ..Self::new("unused")
        }
    }

    pub fn rotating(mut self, refresh_token: &str) -> Self {
        self.rotated_refresh_token = Some(refresh_token.to_string());
        self
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenEndpoint for FakeTokenEndpoint {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(status) = self.fail_status {
            return Err(Error::ExternalApi {
                endpoint: "/api/token".to_string(),
                status,
                message: "invalid_grant".to_string(),
            });
        }
        Ok(TokenGrant {
            access_token: self.access_token.clone(),
            refresh_token: self.rotated_refresh_token.clone(),
            scope: None,
            expires_in: 3600,
        })
    }
}

fn unavailable(endpoint: &str) -> Error {
    Error::ExternalApi {
        endpoint: endpoint.to_string(),
        status: 503,
        message: "Service Unavailable".to_string(),
    }
}

/// Scriptable stand-in for the Spotify client.
#[derive(Default)]
pub struct FakeSpotifyApi {
    pub recent: Mutex<Vec<PlayHistoryItem>>,
    pub recent_after: Mutex<Vec<Option<i64>>>,
    pub top_artists: Mutex<HashMap<TimeRange, Vec<Artist>>>,
    pub top_tracks: Mutex<HashMap<TimeRange, Vec<Track>>>,
    pub failing_windows: Mutex<HashSet<TimeRange>>,
    pub features: Mutex<HashMap<String, AudioFeatures>>,
    pub feature_requests: Mutex<Vec<Vec<String>>>,
    pub fail_features: Mutex<bool>,
    pub fail_auth: Mutex<bool>,
}

impl FakeSpotifyApi {
    pub fn set_recent(&self, items: Vec<PlayHistoryItem>) {
        *self.recent.lock().unwrap() = items;
    }

    pub fn set_top(&self, range: TimeRange, artists: Vec<Artist>, tracks: Vec<Track>) {
        self.top_artists.lock().unwrap().insert(range, artists);
        self.top_tracks.lock().unwrap().insert(range, tracks);
    }

    pub fn fail_window(&self, range: TimeRange) {
        self.failing_windows.lock().unwrap().insert(range);
    }

    pub fn add_features(&self, features: AudioFeatures) {
        self.features
            .lock()
            .unwrap()
            .insert(features.track_id.clone(), features);
    }

    pub fn requested_feature_ids(&self) -> Vec<String> {
        self.feature_requests
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    fn check_auth(&self, endpoint: &str) -> Result<()> {
        if *self.fail_auth.lock().unwrap() {
            return Err(Error::Authentication {
                endpoint: endpoint.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SpotifyApi for FakeSpotifyApi {
    async fn recently_played(
        &self,
        after_ms: Option<i64>,
        limit: u32,
    ) -> Result<RecentlyPlayedResponse> {
        self.check_auth("/me/player/recently-played")?;
        self.recent_after.lock().unwrap().push(after_ms);
        let items: Vec<PlayHistoryItem> = self
            .recent
            .lock()
            .unwrap()
            .iter()
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(RecentlyPlayedResponse {
            items,
            next: None,
            cursors: None,
        })
    }

    async fn top_artists(&self, range: TimeRange, limit: u32, _offset: u32) -> Result<Paging<Artist>> {
        self.check_auth("/me/top/artists")?;
        if self.failing_windows.lock().unwrap().contains(&range) {
            return Err(unavailable("/me/top/artists"));
        }
        let items: Vec<Artist> = self
            .top_artists
            .lock()
            .unwrap()
            .get(&range)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(limit as usize)
            .collect();
        Ok(Paging {
            total: Some(items.len() as u64),
            items,
            next: None,
        })
    }

    async fn top_tracks(&self, range: TimeRange, limit: u32, _offset: u32) -> Result<Paging<Track>> {
        self.check_auth("/me/top/tracks")?;
        if self.failing_windows.lock().unwrap().contains(&range) {
            return Err(unavailable("/me/top/tracks"));
        }
        let items: Vec<Track> = self
            .top_tracks
            .lock()
            .unwrap()
            .get(&range)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(limit as usize)
            .collect();
        Ok(Paging {
            total: Some(items.len() as u64),
            items,
            next: None,
        })
    }

    async fn audio_features(&self, track_ids: &[String]) -> Result<Vec<Option<AudioFeatures>>> {
        self.check_auth("/audio-features")?;
        self.feature_requests
            .lock()
            .unwrap()
            .push(track_ids.to_vec());
        if *self.fail_features.lock().unwrap() {
            return Err(unavailable("/audio-features"));
        }
        let known = self.features.lock().unwrap();
        Ok(track_ids.iter().map(|id| known.get(id).cloned()).collect())
    }
}
