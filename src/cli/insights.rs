use serde::Serialize;
use tabled::Table;

use crate::{
    config::Settings,
    error,
    insights::{BasicInsights, DetailedInsights, InsightsGenerator, TrackListenCount},
    types::{ArtistTableRow, StatTableRow, TrackTableRow},
    utils, warning,
};

use super::{open_store, resolve_user};

/// Prints basic or detailed insights for one account, as tables or JSON.
pub async fn insights(settings: &Settings, user: Option<String>, detailed: bool, json: bool) {
    let store = match open_store(settings) {
        Ok(store) => store,
        Err(e) => error!("Cannot open store. Err: {}", e),
    };
    let user_id = match resolve_user(&store, user) {
        Ok(user_id) => user_id,
        Err(e) => error!("{}", e),
    };
    let generator = InsightsGenerator::new(store, user_id);

    if detailed {
        match generator.get_detailed_insights() {
            Ok(insights) if json => print_json(&insights),
            Ok(insights) => print_detailed(&insights),
            Err(e) => error!("Cannot compute insights. Err: {}", e),
        }
    } else {
        match generator.get_basic_insights() {
            Ok(insights) if json => print_json(&insights),
            Ok(insights) => print_basic(&insights),
            Err(e) => error!("Cannot compute insights. Err: {}", e),
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(out) => println!("{}", out),
        Err(e) => error!("Cannot serialize insights. Err: {}", e),
    }
}

fn stat(name: &str, value: impl ToString) -> StatTableRow {
    StatTableRow {
        stat: name.to_string(),
        value: value.to_string(),
    }
}

fn track_rows(tracks: &[TrackListenCount]) -> Vec<TrackTableRow> {
    tracks
        .iter()
        .map(|t| TrackTableRow {
            track: t.track_name.clone(),
            artist: t.artist_name.clone(),
            plays: t.listen_count,
        })
        .collect()
}

fn print_basic(insights: &BasicInsights) {
    if insights.total_tracks_listened == 0 {
        warning!("No plays stored yet. Run `sporlstats sync` first");
        return;
    }

    let time = &insights.listening_time_stats;
    let band = &insights.listening_by_time_of_day;
    let mut rows = vec![
        stat("Plays", insights.total_tracks_listened),
        stat("Hours listened", time.total_listening_hours),
        stat("Hours per day", time.average_hours_per_day),
        stat("Days of data", time.days_of_data),
        stat("Morning plays", band.morning),
        stat("Afternoon plays", band.afternoon),
        stat("Evening plays", band.evening),
        stat("Night plays", band.night),
    ];
    if let Some(first) = time.earliest_listen {
        rows.push(stat("First play", utils::format_timestamp(first)));
    }
    if let Some(last) = time.latest_listen {
        rows.push(stat("Last play", utils::format_timestamp(last)));
    }
    println!("{}", Table::new(rows));

    let artists: Vec<ArtistTableRow> = insights
        .top_artists
        .iter()
        .map(|a| ArtistTableRow {
            artist: a.artist_name.clone(),
            plays: a.listen_count,
        })
        .collect();
    println!("Top artists\n{}", Table::new(artists));

    println!(
        "Top tracks\n{}",
        Table::new(track_rows(&insights.top_tracks))
    );
    println!(
        "Recent favorites\n{}",
        Table::new(track_rows(&insights.recent_favorites))
    );

    match &insights.audio_features_averages {
        Some(averages) => {
            let rows = vec![
                stat("Danceability", averages.danceability),
                stat("Energy", averages.energy),
                stat("Speechiness", averages.speechiness),
                stat("Acousticness", averages.acousticness),
                stat("Instrumentalness", averages.instrumentalness),
                stat("Liveness", averages.liveness),
                stat("Valence", averages.valence),
            ];
            println!("Audio features\n{}", Table::new(rows));
        }
        None => warning!("No audio features available"),
    }
}

fn print_detailed(insights: &DetailedInsights) {
    print_basic(&insights.basic);

    let genres: Vec<StatTableRow> = insights
        .genre_distribution
        .iter()
        .map(|g| stat(&g.genre, g.score))
        .collect();
    if genres.is_empty() {
        warning!("No top artists stored. Run `sporlstats sync` to rank genres");
    } else {
        println!("Genres\n{}", Table::new(genres));
    }

    let months: Vec<StatTableRow> = insights
        .listening_trends_by_month
        .iter()
        .map(|m| stat(&m.month, m.plays))
        .collect();
    println!("Plays by month\n{}", Table::new(months));

    let popularity = &insights.popular_vs_obscure;
    let buckets = &popularity.popularity_distribution;
    let rows = vec![
        stat("Average popularity", popularity.average_popularity),
        stat("Mainstream (80-100)", buckets.mainstream),
        stat("Popular (60-79)", buckets.popular),
        stat("Mixed (40-59)", buckets.mixed),
        stat("Niche (20-39)", buckets.niche),
        stat("Obscure (0-19)", buckets.obscure),
    ];
    println!("Popularity\n{}", Table::new(rows));

    let mood = &insights.mood_analysis;
    let rows = vec![
        stat("Primary mood", mood.primary_mood),
        stat("Happiness", mood.mood_indicators.happiness),
        stat("Energy", mood.mood_indicators.energy),
        stat("Danceability", mood.mood_indicators.danceability),
        stat("Calmness", mood.mood_indicators.calmness),
    ];
    println!("Mood\n{}", Table::new(rows));
}
