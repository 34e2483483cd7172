use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// Token endpoint response for both the code exchange and the refresh exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Present on the code exchange; present on refresh only when Spotify rotates it.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone)]
pub struct PkceToken {
    pub code_verifier: String,
    pub grant: Option<TokenGrant>,
}

/// A user's stored authorization, keyed by their Spotify user id.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub user_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    /// Expiry of the currently stored access token.
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimpleArtist {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimpleAlbum {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Track {
    /// Local files and some unavailable tracks come back without an id.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub duration_ms: i64,
    #[serde(default)]
    pub popularity: i64,
    #[serde(default)]
    pub artists: Vec<SimpleArtist>,
    #[serde(default)]
    pub album: SimpleAlbum,
}

impl Track {
    pub fn primary_artist(&self) -> Option<&SimpleArtist> {
        self.artists.first()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub popularity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayHistoryItem {
    #[serde(default)]
    pub track: Option<Track>,
    pub played_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cursors {
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentlyPlayedResponse {
    #[serde(default)]
    pub items: Vec<PlayHistoryItem>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub cursors: Option<Cursors>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Paging<T> {
    #[serde(default)]
    pub items: Vec<T>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFeaturesResponse {
    /// Kept raw so one malformed entry cannot fail the whole batch.
    #[serde(default)]
    pub audio_features: Vec<serde_json::Value>,
}

/// Per-track audio descriptors. Written once per track and shared by every user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    #[serde(rename = "id")]
    pub track_id: String,
    pub danceability: f64,
    pub energy: f64,
    pub key: i64,
    pub loudness: f64,
    pub mode: i64,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    pub tempo: f64,
    pub duration_ms: i64,
    pub time_signature: i64,
}

/// One provider entry as sent; missing keys and `null` both decode to `None`.
#[derive(Debug, Deserialize)]
struct RawAudioFeatures {
    id: Option<String>,
    danceability: Option<f64>,
    energy: Option<f64>,
    key: Option<i64>,
    loudness: Option<f64>,
    mode: Option<i64>,
    speechiness: Option<f64>,
    acousticness: Option<f64>,
    instrumentalness: Option<f64>,
    liveness: Option<f64>,
    valence: Option<f64>,
    tempo: Option<f64>,
    duration_ms: Option<i64>,
    time_signature: Option<i64>,
}

impl AudioFeatures {
    /// Validates one entry of an audio features response.
    ///
    /// The cache is write-once, so anything short of a complete descriptor is
    /// treated like a `null` entry and asked for again on a later sync. An
    /// entry is complete when it has an id and all seven bounded descriptors
    /// lie in `[0, 1]`. The unbounded fields fall back to neutral values.
    pub fn from_entry(entry: serde_json::Value) -> Option<AudioFeatures> {
        if entry.is_null() {
            return None;
        }
        let raw: RawAudioFeatures = serde_json::from_value(entry).ok()?;
        let unit = |value: Option<f64>| value.filter(|v| (0.0..=1.0).contains(v));

        Some(AudioFeatures {
            track_id: raw.id.filter(|id| !id.is_empty())?,
            danceability: unit(raw.danceability)?,
            energy: unit(raw.energy)?,
            speechiness: unit(raw.speechiness)?,
            acousticness: unit(raw.acousticness)?,
            instrumentalness: unit(raw.instrumentalness)?,
            liveness: unit(raw.liveness)?,
            valence: unit(raw.valence)?,
            // -1 is Spotify's "no key detected"
            key: raw.key.unwrap_or(-1),
            loudness: raw.loudness.unwrap_or(0.0),
            mode: raw.mode.unwrap_or(0),
            tempo: raw.tempo.unwrap_or(0.0),
            duration_ms: raw.duration_ms.unwrap_or(0),
            time_signature: raw.time_signature.unwrap_or(4),
        })
    }
}

/// Part of the local day a play falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DayBand {
    /// 00:00 to 05:59
    Night,
    /// 06:00 to 11:59
    Morning,
    /// 12:00 to 17:59
    Afternoon,
    /// 18:00 to 23:59
    Evening,
}

/// The lookback periods Spotify computes top items over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "short_term")]
    ShortTerm,
    #[serde(rename = "medium_term")]
    MediumTerm,
    #[serde(rename = "long_term")]
    LongTerm,
}

impl TimeRange {
    pub const ALL: [TimeRange; 3] = [
        TimeRange::ShortTerm,
        TimeRange::MediumTerm,
        TimeRange::LongTerm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::ShortTerm => "short_term",
            TimeRange::MediumTerm => "medium_term",
            TimeRange::LongTerm => "long_term",
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stored play. `(user_id, track_id, played_at)` is unique.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayEvent {
    pub user_id: String,
    pub track_id: String,
    pub track_name: String,
    pub artist_id: String,
    pub artist_name: String,
    pub album_id: String,
    pub album_name: String,
    pub played_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl PlayEvent {
    pub fn key(&self) -> PlayKey {
        PlayKey {
            user_id: self.user_id.clone(),
            track_id: self.track_id.clone(),
            played_at_ms: self.played_at.timestamp_millis(),
        }
    }
}

/// Deduplication key of a play.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlayKey {
    pub user_id: String,
    pub track_id: String,
    pub played_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopArtistEntry {
    pub user_id: String,
    pub artist_id: String,
    pub artist_name: String,
    pub term: TimeRange,
    /// 1-based position in the provider's response.
    pub rank: u32,
    pub genres: Vec<String>,
    pub popularity: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopTrackEntry {
    pub user_id: String,
    pub track_id: String,
    pub track_name: String,
    pub artist_id: String,
    pub artist_name: String,
    pub album_id: String,
    pub album_name: String,
    pub term: TimeRange,
    pub rank: u32,
    pub popularity: i64,
}

/// Outcome of one incremental play sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlaySyncReport {
    pub inserted: usize,
    pub skipped_duplicates: usize,
    pub skipped_malformed: usize,
    pub features_added: usize,
    /// Set when the plays were committed but fetching their audio features failed.
    pub enrichment_error: Option<String>,
}

/// Outcome of replacing one ranking window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowReport {
    pub window: TimeRange,
    pub artists: usize,
    pub tracks: usize,
    pub features_added: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopItemsReport {
    pub windows: Vec<WindowReport>,
}

impl TopItemsReport {
    /// True when every window was replaced.
    pub fn is_complete(&self) -> bool {
        self.windows.iter().all(|w| w.error.is_none())
    }

    pub fn failed_windows(&self) -> Vec<TimeRange> {
        self.windows
            .iter()
            .filter(|w| w.error.is_some())
            .map(|w| w.window)
            .collect()
    }
}

/// Outcome of a full sync: recent plays first, then the ranking windows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub plays: PlaySyncReport,
    pub top_items: TopItemsReport,
}

#[derive(Tabled)]
pub struct ArtistTableRow {
    pub artist: String,
    pub plays: i64,
}

#[derive(Tabled)]
pub struct TrackTableRow {
    pub track: String,
    pub artist: String,
    pub plays: i64,
}

#[derive(Tabled)]
pub struct StatTableRow {
    pub stat: String,
    pub value: String,
}

#[derive(Tabled)]
pub struct UserTableRow {
    pub user: String,
    pub name: String,
    pub token_expires: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn complete(id: &str) -> serde_json::Value {
        json!({
            "id": id,
            "danceability": 0.7,
            "energy": 0.6,
            "key": 5,
            "loudness": -6.2,
            "mode": 1,
            "speechiness": 0.05,
            "acousticness": 0.1,
            "instrumentalness": 0.0,
            "liveness": 0.12,
            "valence": 0.8,
            "tempo": 120.0,
            "duration_ms": 200000,
            "time_signature": 4
        })
    }

    #[test]
    fn test_complete_entry_is_accepted() {
        let features = AudioFeatures::from_entry(complete("t1")).unwrap();
        assert_eq!(features.track_id, "t1");
        assert_eq!(features.valence, 0.8);
        assert_eq!(features.key, 5);
        assert_eq!(features.loudness, -6.2);
    }

    #[test]
    fn test_unbounded_fields_fall_back() {
        let mut entry = complete("t1");
        for field in ["key", "loudness", "mode", "tempo", "duration_ms", "time_signature"] {
            entry[field] = serde_json::Value::Null;
        }
        let features = AudioFeatures::from_entry(entry).unwrap();
        assert_eq!(features.key, -1);
        assert_eq!(features.tempo, 0.0);
        assert_eq!(features.time_signature, 4);
    }

    #[test]
    fn test_incomplete_entries_are_unavailable() {
        assert!(AudioFeatures::from_entry(serde_json::Value::Null).is_none());
        assert!(AudioFeatures::from_entry(json!({"id": "t1", "valence": 0.9})).is_none());

        let mut null_field = complete("t1");
        null_field["valence"] = serde_json::Value::Null;
        assert!(AudioFeatures::from_entry(null_field).is_none());

        let mut out_of_range = complete("t1");
        out_of_range["energy"] = json!(1.5);
        assert!(AudioFeatures::from_entry(out_of_range).is_none());

        let mut wrong_type = complete("t1");
        wrong_type["danceability"] = json!("high");
        assert!(AudioFeatures::from_entry(wrong_type).is_none());

        let mut no_id = complete("t1");
        no_id["id"] = json!("");
        assert!(AudioFeatures::from_entry(no_id).is_none());
    }
}
