use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use super::millis_to_datetime;
use crate::error::Result;
use crate::types::{PlayEvent, PlayKey};

/// The watermark for incremental fetches: the newest stored play of the user.
pub fn latest_played_at(conn: &Connection, user_id: &str) -> Result<Option<DateTime<Utc>>> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(played_at) FROM play_events WHERE user_id = ?1",
        params![user_id],
        |r| r.get(0),
    )?;
    Ok(max.map(millis_to_datetime).transpose()?)
}

pub fn exists(conn: &Connection, key: &PlayKey) -> Result<bool> {
    let mut stmt = conn.prepare_cached(
        "SELECT 1 FROM play_events WHERE user_id = ?1 AND track_id = ?2 AND played_at = ?3",
    )?;
    let found = stmt
        .query_row(params![key.user_id, key.track_id, key.played_at_ms], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

/// Plain insert: a duplicate key fails the statement, and with it the enclosing transaction.
pub fn insert(conn: &Connection, play: &PlayEvent) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO play_events
         (user_id, track_id, track_name, artist_id, artist_name, album_id, album_name,
          played_at, duration_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    )?;
    stmt.execute(params![
        play.user_id,
        play.track_id,
        play.track_name,
        play.artist_id,
        play.artist_name,
        play.album_id,
        play.album_name,
        play.played_at.timestamp_millis(),
        play.duration_ms,
    ])?;
    Ok(())
}

pub fn count(conn: &Connection, user_id: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM play_events WHERE user_id = ?1",
        params![user_id],
        |r| r.get(0),
    )?)
}

/// All plays of the user in insertion order.
pub fn list(conn: &Connection, user_id: &str) -> Result<Vec<PlayEvent>> {
    let mut stmt = conn.prepare_cached(
        "SELECT user_id, track_id, track_name, artist_id, artist_name, album_id, album_name,
                played_at, duration_ms
         FROM play_events WHERE user_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![user_id], |row| {
            Ok(PlayEvent {
                user_id: row.get(0)?,
                track_id: row.get(1)?,
                track_name: row.get(2)?,
                artist_id: row.get(3)?,
                artist_name: row.get(4)?,
                album_id: row.get(5)?,
                album_name: row.get(6)?,
                played_at: millis_to_datetime(row.get(7)?)?,
                duration_ms: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ListeningStore;

    fn make_play(user_id: &str, track_id: &str, played_at_ms: i64) -> PlayEvent {
        PlayEvent {
            user_id: user_id.to_string(),
            track_id: track_id.to_string(),
            track_name: format!("Track {}", track_id),
            artist_id: "artist1".to_string(),
            artist_name: "Artist 1".to_string(),
            album_id: "album1".to_string(),
            album_name: "Album 1".to_string(),
            played_at: DateTime::from_timestamp_millis(played_at_ms).unwrap(),
            duration_ms: 180_000,
        }
    }

    #[test]
    fn test_latest_played_at_empty() {
        let store = ListeningStore::open_in_memory().unwrap();
        assert!(store
            .read(|conn| latest_played_at(conn, "user1"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_latest_played_at_is_per_user() {
        let store = ListeningStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                insert(tx, &make_play("user1", "t1", 1_000))?;
                insert(tx, &make_play("user1", "t2", 5_000))?;
                insert(tx, &make_play("user2", "t3", 9_000))?;
                Ok(())
            })
            .unwrap();

        let latest = store
            .read(|conn| latest_played_at(conn, "user1"))
            .unwrap()
            .unwrap();
        assert_eq!(latest.timestamp_millis(), 5_000);
        assert_eq!(store.read(|conn| count(conn, "user1")).unwrap(), 2);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let store = ListeningStore::open_in_memory().unwrap();
        let play = make_play("user1", "t1", 1_000);
        store.write(|tx| insert(tx, &play)).unwrap();

        assert!(store.read(|conn| exists(conn, &play.key())).unwrap());
        assert!(store.write(|tx| insert(tx, &play)).is_err());
        assert_eq!(store.read(|conn| count(conn, "user1")).unwrap(), 1);
    }

    #[test]
    fn test_list_keeps_insertion_order() {
        let store = ListeningStore::open_in_memory().unwrap();
        store
            .write(|tx| {
                insert(tx, &make_play("user1", "t2", 2_000))?;
                insert(tx, &make_play("user1", "t1", 1_000))?;
                Ok(())
            })
            .unwrap();

        let plays = store.read(|conn| list(conn, "user1")).unwrap();
        let ids: Vec<&str> = plays.iter().map(|p| p.track_id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1"]);
    }
}
