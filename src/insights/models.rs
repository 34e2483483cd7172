use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistListenCount {
    pub artist_id: String,
    pub artist_name: String,
    pub listen_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackListenCount {
    pub track_id: String,
    pub track_name: String,
    pub artist_name: String,
    pub listen_count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListeningTimeStats {
    /// Rounded to 2 decimals.
    pub total_listening_hours: f64,
    /// Total hours divided by `days_of_data`, rounded to 2 decimals.
    pub average_hours_per_day: f64,
    /// Whole days between the earliest and latest play, at least 1.
    pub days_of_data: i64,
    pub earliest_listen: Option<DateTime<Utc>>,
    pub latest_listen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeOfDayDistribution {
    pub morning: i64,
    pub afternoon: i64,
    pub evening: i64,
    pub night: i64,
}

/// Mean descriptors over the distinct tracks a user played, rounded to 3 decimals.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureAverages {
    pub danceability: f64,
    pub energy: f64,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BasicInsights {
    pub total_tracks_listened: i64,
    pub top_artists: Vec<ArtistListenCount>,
    pub top_tracks: Vec<TrackListenCount>,
    pub listening_time_stats: ListeningTimeStats,
    pub listening_by_time_of_day: TimeOfDayDistribution,
    pub recent_favorites: Vec<TrackListenCount>,
    /// `None` when the user has no plays at all.
    pub audio_features_averages: Option<FeatureAverages>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenreScore {
    pub genre: String,
    pub score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPlayCount {
    /// `YYYY-MM`
    pub month: String,
    pub plays: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PopularityDistribution {
    /// [80, 100]
    pub mainstream: i64,
    /// [60, 80)
    pub popular: i64,
    /// [40, 60)
    pub mixed: i64,
    /// [20, 40)
    pub niche: i64,
    /// [0, 20)
    pub obscure: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularityProfile {
    pub average_popularity: f64,
    pub popularity_distribution: PopularityDistribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mood {
    Exuberant,
    Relaxed,
    Tense,
    Melancholy,
}

impl Mood {
    /// Quadrant of the valence/energy plane, split at 0.5 on both axes.
    pub fn from_quadrant(valence: f64, energy: f64) -> Self {
        match (valence > 0.5, energy > 0.5) {
            (true, true) => Mood::Exuberant,
            (true, false) => Mood::Relaxed,
            (false, true) => Mood::Tense,
            (false, false) => Mood::Melancholy,
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Mood::Exuberant => "Exuberant",
            Mood::Relaxed => "Relaxed",
            Mood::Tense => "Tense",
            Mood::Melancholy => "Melancholy",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodIndicators {
    pub happiness: f64,
    pub energy: f64,
    pub danceability: f64,
    pub calmness: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodQuadrantValues {
    pub valence: f64,
    pub energy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodAnalysis {
    pub primary_mood: Mood,
    pub mood_indicators: MoodIndicators,
    pub mood_quadrant_values: MoodQuadrantValues,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetailedInsights {
    #[serde(flatten)]
    pub basic: BasicInsights,
    pub genre_distribution: Vec<GenreScore>,
    pub listening_trends_by_month: Vec<MonthlyPlayCount>,
    pub popular_vs_obscure: PopularityProfile,
    pub mood_analysis: MoodAnalysis,
}
