use rusqlite::{Connection, params};

use crate::error::Result;
use crate::types::{TimeRange, TopArtistEntry, TopTrackEntry};

pub fn join_genres(genres: &[String]) -> String {
    genres.join(",")
}

/// Splits a stored genre list, trimming entries and dropping empty ones.
pub fn split_genres(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

/// Replaces the user's top artists for `term` with `entries`.
///
/// Must run inside a transaction so the delete and the inserts land together.
pub fn replace_top_artists(
    conn: &Connection,
    user_id: &str,
    term: TimeRange,
    entries: &[TopArtistEntry],
) -> Result<usize> {
    conn.execute(
        "DELETE FROM top_artists WHERE user_id = ?1 AND term = ?2",
        params![user_id, term.as_str()],
    )?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO top_artists (user_id, artist_id, artist_name, term, rank, genres, popularity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for entry in entries {
        stmt.execute(params![
            user_id,
            entry.artist_id,
            entry.artist_name,
            term.as_str(),
            entry.rank,
            join_genres(&entry.genres),
            entry.popularity,
        ])?;
    }
    Ok(entries.len())
}

/// Replaces the user's top tracks for `term` with `entries`.
pub fn replace_top_tracks(
    conn: &Connection,
    user_id: &str,
    term: TimeRange,
    entries: &[TopTrackEntry],
) -> Result<usize> {
    conn.execute(
        "DELETE FROM top_tracks WHERE user_id = ?1 AND term = ?2",
        params![user_id, term.as_str()],
    )?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO top_tracks
         (user_id, track_id, track_name, artist_id, artist_name, album_id, album_name,
          term, rank, popularity)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    )?;
    for entry in entries {
        stmt.execute(params![
            user_id,
            entry.track_id,
            entry.track_name,
            entry.artist_id,
            entry.artist_name,
            entry.album_id,
            entry.album_name,
            term.as_str(),
            entry.rank,
            entry.popularity,
        ])?;
    }
    Ok(entries.len())
}

pub fn top_artists(conn: &Connection, user_id: &str, term: TimeRange) -> Result<Vec<TopArtistEntry>> {
    let mut stmt = conn.prepare_cached(
        "SELECT user_id, artist_id, artist_name, rank, genres, popularity
         FROM top_artists WHERE user_id = ?1 AND term = ?2 ORDER BY rank, id",
    )?;
    let rows = stmt
        .query_map(params![user_id, term.as_str()], |row| {
            Ok(TopArtistEntry {
                user_id: row.get(0)?,
                artist_id: row.get(1)?,
                artist_name: row.get(2)?,
                term,
                rank: row.get(3)?,
                genres: split_genres(&row.get::<_, String>(4)?),
                popularity: row.get(5)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn top_tracks(conn: &Connection, user_id: &str, term: TimeRange) -> Result<Vec<TopTrackEntry>> {
    let mut stmt = conn.prepare_cached(
        "SELECT user_id, track_id, track_name, artist_id, artist_name, album_id, album_name,
                rank, popularity
         FROM top_tracks WHERE user_id = ?1 AND term = ?2 ORDER BY rank, id",
    )?;
    let rows = stmt
        .query_map(params![user_id, term.as_str()], |row| {
            Ok(TopTrackEntry {
                user_id: row.get(0)?,
                track_id: row.get(1)?,
                track_name: row.get(2)?,
                artist_id: row.get(3)?,
                artist_name: row.get(4)?,
                album_id: row.get(5)?,
                album_name: row.get(6)?,
                term,
                rank: row.get(7)?,
                popularity: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}
