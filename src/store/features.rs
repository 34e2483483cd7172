use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::Result;
use crate::types::AudioFeatures;

fn from_row(row: &Row<'_>) -> rusqlite::Result<AudioFeatures> {
    Ok(AudioFeatures {
        track_id: row.get(0)?,
        danceability: row.get(1)?,
        energy: row.get(2)?,
        key: row.get(3)?,
        loudness: row.get(4)?,
        mode: row.get(5)?,
        speechiness: row.get(6)?,
        acousticness: row.get(7)?,
        instrumentalness: row.get(8)?,
        liveness: row.get(9)?,
        valence: row.get(10)?,
        tempo: row.get(11)?,
        duration_ms: row.get(12)?,
        time_signature: row.get(13)?,
    })
}

/// Returns the subset of `track_ids` that already has a stored descriptor.
pub fn existing_ids(conn: &Connection, track_ids: &[String]) -> Result<HashSet<String>> {
    let mut stmt = conn.prepare_cached("SELECT 1 FROM audio_features WHERE track_id = ?1")?;
    let mut found = HashSet::new();
    for track_id in track_ids {
        if stmt.exists(params![track_id])? {
            found.insert(track_id.clone());
        }
    }
    Ok(found)
}

/// Writes the descriptor unless the track already has one. Returns whether a row was added.
pub fn insert_if_absent(conn: &Connection, features: &AudioFeatures) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO audio_features
         (track_id, danceability, energy, key, loudness, mode, speechiness, acousticness,
          instrumentalness, liveness, valence, tempo, duration_ms, time_signature)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )?;
    let inserted = stmt.execute(params![
        features.track_id,
        features.danceability,
        features.energy,
        features.key,
        features.loudness,
        features.mode,
        features.speechiness,
        features.acousticness,
        features.instrumentalness,
        features.liveness,
        features.valence,
        features.tempo,
        features.duration_ms,
        features.time_signature,
    ])?;
    Ok(inserted == 1)
}

pub fn get(conn: &Connection, track_id: &str) -> Result<Option<AudioFeatures>> {
    let mut stmt = conn.prepare_cached(
        "SELECT track_id, danceability, energy, key, loudness, mode, speechiness, acousticness,
                instrumentalness, liveness, valence, tempo, duration_ms, time_signature
         FROM audio_features WHERE track_id = ?1",
    )?;
    Ok(stmt.query_row(params![track_id], from_row).optional()?)
}

pub fn count(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM audio_features", [], |r| r.get(0))?)
}
