//! Read-only statistics over a user's stored listening history.
//!
//! Every operation only reads from the [`ListeningStore`] and never fails on
//! an empty history: counts are zero, lists are empty and averages fall back
//! to fixed defaults. Time based operations use the generator's `now` and UTC
//! offset, which default to the current time and UTC and can be pinned with
//! [`InsightsGenerator::at`] and [`InsightsGenerator::with_offset`].
//!
//! "Basic" insights cover play counts, top artists and tracks, listening time,
//! time of day, recent favorites and audio feature averages. "Detailed"
//! insights add genres, the monthly trend, popularity and mood.

mod models;

pub use models::*;

use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, Offset, Timelike, Utc};

use crate::{
    error::Result,
    store::{ListeningStore, features, plays, rankings},
    types::{AudioFeatures, DayBand, PlayEvent, TimeRange},
    utils,
};

pub const DEFAULT_TOP_LIMIT: usize = 5;
pub const DEFAULT_RECENT_DAYS: i64 = 30;
pub const DEFAULT_GENRE_LIMIT: usize = 10;
pub const DEFAULT_TREND_MONTHS: u32 = 6;
/// Mean popularity reported when no ranking data is stored.
pub const DEFAULT_POPULARITY: f64 = 50.0;
/// Valence, energy and danceability assumed when no descriptor is stored.
pub const NEUTRAL_FEATURE_VALUE: f64 = 0.5;

/// Computes insights for one user.
pub struct InsightsGenerator {
    store: ListeningStore,
    user_id: String,
    now: DateTime<Utc>,
    offset: FixedOffset,
}

impl InsightsGenerator {
    pub fn new(store: ListeningStore, user_id: impl Into<String>) -> Self {
        InsightsGenerator {
            store,
            user_id: user_id.into(),
            now: Utc::now(),
            offset: Utc.fix(),
        }
    }

    /// Evaluates time windows relative to `now` instead of the current time.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Local offset used for time-of-day bands and month boundaries.
    pub fn with_offset(mut self, offset: FixedOffset) -> Self {
        self.offset = offset;
        self
    }

    fn plays(&self) -> Result<Vec<PlayEvent>> {
        self.store.read(|conn| plays::list(conn, &self.user_id))
    }

    /// Stored descriptors of the distinct tracks among `plays`.
    fn played_features(&self, plays: &[PlayEvent]) -> Result<Vec<AudioFeatures>> {
        let track_ids = utils::dedup_ids(plays.iter().map(|p| p.track_id.as_str()));
        self.store.read(|conn| {
            let mut found = Vec::with_capacity(track_ids.len());
            for track_id in &track_ids {
                if let Some(descriptor) = features::get(conn, track_id)? {
                    found.push(descriptor);
                }
            }
            Ok(found)
        })
    }

    pub fn get_basic_insights(&self) -> Result<BasicInsights> {
        let plays = self.plays()?;
        self.basic_from(&plays)
    }

    pub fn get_detailed_insights(&self) -> Result<DetailedInsights> {
        let plays = self.plays()?;
        Ok(DetailedInsights {
            basic: self.basic_from(&plays)?,
            genre_distribution: self.genre_distribution(DEFAULT_GENRE_LIMIT)?,
            listening_trends_by_month: trends_by_month(
                &plays,
                self.now,
                &self.offset,
                DEFAULT_TREND_MONTHS,
            ),
            popular_vs_obscure: self.popular_vs_obscure()?,
            mood_analysis: mood_from(&self.played_features(&plays)?),
        })
    }

    fn basic_from(&self, plays: &[PlayEvent]) -> Result<BasicInsights> {
        Ok(BasicInsights {
            total_tracks_listened: plays.len() as i64,
            top_artists: top_artists_in(plays, DEFAULT_TOP_LIMIT),
            top_tracks: top_tracks_in(plays, DEFAULT_TOP_LIMIT),
            listening_time_stats: time_stats_of(plays),
            listening_by_time_of_day: time_of_day_of(plays, &self.offset),
            recent_favorites: self.recent_favorites_in(
                plays,
                DEFAULT_RECENT_DAYS,
                DEFAULT_TOP_LIMIT,
            ),
            audio_features_averages: if plays.is_empty() {
                None
            } else {
                Some(averages_of(&self.played_features(plays)?))
            },
        })
    }

    pub fn total_tracks_listened(&self) -> Result<i64> {
        self.store.read(|conn| plays::count(conn, &self.user_id))
    }

    pub fn top_artists(&self, limit: usize) -> Result<Vec<ArtistListenCount>> {
        Ok(top_artists_in(&self.plays()?, limit))
    }

    pub fn top_tracks(&self, limit: usize) -> Result<Vec<TrackListenCount>> {
        Ok(top_tracks_in(&self.plays()?, limit))
    }

    pub fn listening_time_stats(&self) -> Result<ListeningTimeStats> {
        Ok(time_stats_of(&self.plays()?))
    }

    pub fn listening_by_time_of_day(&self) -> Result<TimeOfDayDistribution> {
        Ok(time_of_day_of(&self.plays()?, &self.offset))
    }

    /// Most played tracks among plays in the trailing `days` before `now`.
    pub fn recent_favorites(&self, days: i64, limit: usize) -> Result<Vec<TrackListenCount>> {
        Ok(self.recent_favorites_in(&self.plays()?, days, limit))
    }

    fn recent_favorites_in(&self, plays: &[PlayEvent], days: i64, limit: usize) -> Vec<TrackListenCount> {
        let cutoff = self.now - Duration::days(days);
        let recent: Vec<PlayEvent> = plays
            .iter()
            .filter(|p| p.played_at >= cutoff)
            .cloned()
            .collect();
        top_tracks_in(&recent, limit)
    }

    /// `None` for a user without plays.
    pub fn audio_features_averages(&self) -> Result<Option<FeatureAverages>> {
        let plays = self.plays()?;
        if plays.is_empty() {
            return Ok(None);
        }
        Ok(Some(averages_of(&self.played_features(&plays)?)))
    }

    /// Genres of the medium term top artists, weighted `51 - rank` per artist.
    pub fn genre_distribution(&self, limit: usize) -> Result<Vec<GenreScore>> {
        let artists = self
            .store
            .read(|conn| rankings::top_artists(conn, &self.user_id, TimeRange::MediumTerm))?;

        let mut scores: Vec<GenreScore> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for artist in &artists {
            let weight = 51 - i64::from(artist.rank);
            for genre in &artist.genres {
                match index.get(genre) {
                    Some(&i) => scores[i].score += weight,
                    None => {
                        index.insert(genre.clone(), scores.len());
                        scores.push(GenreScore {
                            genre: genre.clone(),
                            score: weight,
                        });
                    }
                }
            }
        }

        // Stable: equal scores keep first-seen order.
        scores.sort_by(|a, b| b.score.cmp(&a.score));
        scores.truncate(limit);
        Ok(scores)
    }

    pub fn listening_trends_by_month(&self, months: u32) -> Result<Vec<MonthlyPlayCount>> {
        Ok(trends_by_month(&self.plays()?, self.now, &self.offset, months))
    }

    /// Popularity of the short and medium term top tracks.
    pub fn popular_vs_obscure(&self) -> Result<PopularityProfile> {
        let popularity: Vec<i64> = self.store.read(|conn| {
            let mut values = Vec::new();
            for window in [TimeRange::ShortTerm, TimeRange::MediumTerm] {
                values.extend(
                    rankings::top_tracks(conn, &self.user_id, window)?
                        .into_iter()
                        .map(|t| t.popularity),
                );
            }
            Ok(values)
        })?;

        let mut distribution = PopularityDistribution::default();
        for value in &popularity {
            match value {
                80..=100 => distribution.mainstream += 1,
                60..=79 => distribution.popular += 1,
                40..=59 => distribution.mixed += 1,
                20..=39 => distribution.niche += 1,
                0..=19 => distribution.obscure += 1,
                _ => {}
            }
        }

        let average = if popularity.is_empty() {
            DEFAULT_POPULARITY
        } else {
            popularity.iter().sum::<i64>() as f64 / popularity.len() as f64
        };

        Ok(PopularityProfile {
            average_popularity: utils::round_to(average, 1),
            popularity_distribution: distribution,
        })
    }

    pub fn mood_analysis(&self) -> Result<MoodAnalysis> {
        let plays = self.plays()?;
        Ok(mood_from(&self.played_features(&plays)?))
    }
}

/// Counts occurrences of `key`, keeping first-seen order among equal counts.
fn count_by<K, F>(plays: &[PlayEvent], key: F) -> Vec<(K, i64)>
where
    K: Eq + std::hash::Hash + Clone,
    F: Fn(&PlayEvent) -> K,
{
    let mut counts: Vec<(K, i64)> = Vec::new();
    let mut index: HashMap<K, usize> = HashMap::new();
    for play in plays {
        let k = key(play);
        match index.get(&k) {
            Some(&i) => counts[i].1 += 1,
            None => {
                index.insert(k.clone(), counts.len());
                counts.push((k, 1));
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
}

fn top_artists_in(plays: &[PlayEvent], limit: usize) -> Vec<ArtistListenCount> {
    count_by(plays, |p| (p.artist_id.clone(), p.artist_name.clone()))
        .into_iter()
        .take(limit)
        .map(|((artist_id, artist_name), listen_count)| ArtistListenCount {
            artist_id,
            artist_name,
            listen_count,
        })
        .collect()
}

fn top_tracks_in(plays: &[PlayEvent], limit: usize) -> Vec<TrackListenCount> {
    count_by(plays, |p| {
        (p.track_id.clone(), p.track_name.clone(), p.artist_name.clone())
    })
    .into_iter()
    .take(limit)
    .map(|((track_id, track_name, artist_name), listen_count)| TrackListenCount {
        track_id,
        track_name,
        artist_name,
        listen_count,
    })
    .collect()
}

fn time_stats_of(plays: &[PlayEvent]) -> ListeningTimeStats {
    let total_ms: i64 = plays.iter().map(|p| p.duration_ms).sum();
    let total_hours = total_ms as f64 / 3_600_000.0;

    let earliest = plays.iter().map(|p| p.played_at).min();
    let latest = plays.iter().map(|p| p.played_at).max();
    let days_of_data = match (earliest, latest) {
        (Some(first), Some(last)) => (last - first).num_days().max(1),
        _ => 1,
    };

    ListeningTimeStats {
        total_listening_hours: utils::round_to(total_hours, 2),
        average_hours_per_day: utils::round_to(total_hours / days_of_data as f64, 2),
        days_of_data,
        earliest_listen: earliest,
        latest_listen: latest,
    }
}

fn time_of_day_of(plays: &[PlayEvent], offset: &FixedOffset) -> TimeOfDayDistribution {
    let mut distribution = TimeOfDayDistribution::default();
    for play in plays {
        match utils::day_band(play.played_at.with_timezone(offset).hour()) {
            DayBand::Night => distribution.night += 1,
            DayBand::Morning => distribution.morning += 1,
            DayBand::Afternoon => distribution.afternoon += 1,
            DayBand::Evening => distribution.evening += 1,
        }
    }
    distribution
}

fn mean_of<F>(descriptors: &[AudioFeatures], field: F) -> f64
where
    F: Fn(&AudioFeatures) -> f64,
{
    if descriptors.is_empty() {
        return 0.0;
    }
    descriptors.iter().map(field).sum::<f64>() / descriptors.len() as f64
}

fn averages_of(descriptors: &[AudioFeatures]) -> FeatureAverages {
    let mean = |field: &dyn Fn(&AudioFeatures) -> f64| {
        utils::round_to(mean_of(descriptors, field), 3)
    };
    FeatureAverages {
        danceability: mean(&|f| f.danceability),
        energy: mean(&|f| f.energy),
        speechiness: mean(&|f| f.speechiness),
        acousticness: mean(&|f| f.acousticness),
        instrumentalness: mean(&|f| f.instrumentalness),
        liveness: mean(&|f| f.liveness),
        valence: mean(&|f| f.valence),
    }
}

/// Play counts for the trailing `months` calendar months, oldest first.
///
/// The current month ends at `now`, so plays stamped in the future are not counted.
fn trends_by_month(
    plays: &[PlayEvent],
    now: DateTime<Utc>,
    offset: &FixedOffset,
    months: u32,
) -> Vec<MonthlyPlayCount> {
    let (year, month) = utils::year_month(now, offset);
    let mut trend = Vec::with_capacity(months as usize);

    for back in (0..months as i32).rev() {
        let (y, m) = utils::shift_month(year, month, -back);
        let Some(start) = utils::month_start(y, m, offset) else {
            continue;
        };
        let end = if back == 0 {
            Some(now)
        } else {
            let (ny, nm) = utils::shift_month(y, m, 1);
            utils::month_start(ny, nm, offset)
        };
        let Some(end) = end else {
            continue;
        };

        let count = plays
            .iter()
            .filter(|p| p.played_at >= start && p.played_at < end)
            .count();
        trend.push(MonthlyPlayCount {
            month: format!("{:04}-{:02}", y, m),
            plays: count as i64,
        });
    }
    trend
}

/// Without any descriptor the neutral 0.5 defaults are reported as `Relaxed`.
fn mood_from(descriptors: &[AudioFeatures]) -> MoodAnalysis {
    let (valence, energy, danceability, primary_mood) = if descriptors.is_empty() {
        (
            NEUTRAL_FEATURE_VALUE,
            NEUTRAL_FEATURE_VALUE,
            NEUTRAL_FEATURE_VALUE,
            Mood::Relaxed,
        )
    } else {
        let valence = mean_of(descriptors, |f| f.valence);
        let energy = mean_of(descriptors, |f| f.energy);
        let danceability = mean_of(descriptors, |f| f.danceability);
        (valence, energy, danceability, Mood::from_quadrant(valence, energy))
    };

    MoodAnalysis {
        primary_mood,
        mood_indicators: MoodIndicators {
            happiness: utils::round_to(valence, 3),
            energy: utils::round_to(energy, 3),
            danceability: utils::round_to(danceability, 3),
            calmness: utils::round_to(1.0 - energy, 3),
        },
        mood_quadrant_values: MoodQuadrantValues {
            valence: utils::round_to(valence, 3),
            energy: utils::round_to(energy, 3),
        },
    }
}
