use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::millis_to_datetime;
use crate::error::Result;
use crate::types::Credential;

const SELECT_COLUMNS: &str =
    "SELECT user_id, display_name, email, access_token, refresh_token, expires_at FROM credentials";

fn from_row(row: &Row<'_>) -> rusqlite::Result<Credential> {
    Ok(Credential {
        user_id: row.get(0)?,
        display_name: row.get(1)?,
        email: row.get(2)?,
        access_token: row.get(3)?,
        refresh_token: row.get(4)?,
        expires_at: millis_to_datetime(row.get(5)?)?,
    })
}

/// Inserts the credential or overwrites every field of the existing one.
pub fn upsert(conn: &Connection, credential: &Credential) -> Result<()> {
    conn.execute(
        "INSERT INTO credentials
         (user_id, display_name, email, access_token, refresh_token, expires_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(user_id) DO UPDATE SET
            display_name = excluded.display_name,
            email = excluded.email,
            access_token = excluded.access_token,
            refresh_token = excluded.refresh_token,
            expires_at = excluded.expires_at,
            updated_at = excluded.updated_at",
        params![
            credential.user_id,
            credential.display_name,
            credential.email,
            credential.access_token,
            credential.refresh_token,
            credential.expires_at.timestamp_millis(),
            Utc::now().timestamp(),
        ],
    )?;
    Ok(())
}

pub fn load(conn: &Connection, user_id: &str) -> Result<Option<Credential>> {
    let mut stmt = conn.prepare_cached(&format!("{} WHERE user_id = ?1", SELECT_COLUMNS))?;
    Ok(stmt.query_row(params![user_id], from_row).optional()?)
}

pub fn list(conn: &Connection) -> Result<Vec<Credential>> {
    let mut stmt = conn.prepare_cached(&format!("{} ORDER BY user_id", SELECT_COLUMNS))?;
    let rows = stmt
        .query_map([], from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Stores the result of a refresh exchange. The refresh token is kept when
/// the provider did not rotate it. Returns the number of rows updated.
pub fn replace_tokens(
    conn: &Connection,
    user_id: &str,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: DateTime<Utc>,
) -> Result<usize> {
    let updated = conn.execute(
        "UPDATE credentials SET
            access_token = ?2,
            refresh_token = COALESCE(?3, refresh_token),
            expires_at = ?4,
            updated_at = ?5
         WHERE user_id = ?1",
        params![
            user_id,
            access_token,
            refresh_token,
            expires_at.timestamp_millis(),
            Utc::now().timestamp(),
        ],
    )?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::store::ListeningStore;

    fn make_credential(user_id: &str) -> Credential {
        Credential {
            user_id: user_id.to_string(),
            display_name: Some("Test User".to_string()),
            email: None,
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
        }
    }

    #[test]
    fn test_upsert_and_load() {
        let store = ListeningStore::open_in_memory().unwrap();
        let credential = make_credential("user1");

        store.write(|tx| upsert(tx, &credential)).unwrap();
        let loaded = store.read(|conn| load(conn, "user1")).unwrap().unwrap();
        assert_eq!(loaded, credential);

        assert!(store.read(|conn| load(conn, "nobody")).unwrap().is_none());
    }

    #[test]
    fn test_upsert_overwrites_existing() {
        let store = ListeningStore::open_in_memory().unwrap();
        let mut credential = make_credential("user1");
        store.write(|tx| upsert(tx, &credential)).unwrap();

        credential.access_token = "access-2".to_string();
        credential.display_name = None;
        store.write(|tx| upsert(tx, &credential)).unwrap();

        let all = store.read(list).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].access_token, "access-2");
        assert!(all[0].display_name.is_none());
    }

    #[test]
    fn test_replace_tokens_keeps_refresh_token_when_not_rotated() {
        let store = ListeningStore::open_in_memory().unwrap();
        let credential = make_credential("user1");
        store.write(|tx| upsert(tx, &credential)).unwrap();

        let new_expiry = credential.expires_at + Duration::hours(1);
        let updated = store
            .write(|tx| replace_tokens(tx, "user1", "access-2", None, new_expiry))
            .unwrap();
        assert_eq!(updated, 1);

        let loaded = store.read(|conn| load(conn, "user1")).unwrap().unwrap();
        assert_eq!(loaded.access_token, "access-2");
        assert_eq!(loaded.refresh_token, "refresh-1");
        assert_eq!(loaded.expires_at, new_expiry);

        store
            .write(|tx| replace_tokens(tx, "user1", "access-3", Some("refresh-2"), new_expiry))
            .unwrap();
        let loaded = store.read(|conn| load(conn, "user1")).unwrap().unwrap();
        assert_eq!(loaded.refresh_token, "refresh-2");
    }

    #[test]
    fn test_replace_tokens_unknown_user_updates_nothing() {
        let store = ListeningStore::open_in_memory().unwrap();
        let updated = store
            .write(|tx| replace_tokens(tx, "ghost", "a", None, Utc::now()))
            .unwrap();
        assert_eq!(updated, 0);
    }
}
