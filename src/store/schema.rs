//! Table descriptions for the listening database and the `CREATE` statements derived from them.

use rusqlite::{Connection, params};

use crate::error::Result;

/// Offset added to the schema version stored in `PRAGMA user_version`.
pub const BASE_DB_VERSION: usize = 4200;

pub const DEFAULT_TIMESTAMP: &str = "(cast(strftime('%s','now') as int))";

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Only mutated when optional field assignments are passed
            #[allow(unused_mut)]
            let mut column = $crate::store::schema::Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                non_null: false,
                default_value: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
}

pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static SqlType,
    pub is_primary_key: bool,
    pub non_null: bool,
    pub default_value: Option<&'static str>,
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// `(index name, comma separated column list)`
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

impl Table {
    pub fn create_sql(&self) -> String {
        let mut create_sql = format!("CREATE TABLE {} (", self.name);
        for (column_index, column) in self.columns.iter().enumerate() {
            if column_index > 0 {
                create_sql.push_str(", ");
            }
            create_sql.push_str(&format!(
                "{} {}",
                column.name,
                match column.sql_type {
                    SqlType::Text => "TEXT",
                    SqlType::Integer => "INTEGER",
                    SqlType::Real => "REAL",
                }
            ));
            if column.is_primary_key {
                create_sql.push_str(" PRIMARY KEY");
            }
            if column.non_null {
                create_sql.push_str(" NOT NULL");
            }
            if let Some(default_value) = column.default_value {
                create_sql.push_str(&format!(" DEFAULT {}", default_value));
            }
        }

        for unique_constraint in self.unique_constraints {
            create_sql.push_str(&format!(", UNIQUE ({})", unique_constraint.join(", ")));
        }
        create_sql.push_str(");");
        create_sql
    }

    pub fn create(&self, conn: &Connection) -> Result<()> {
        conn.execute(&self.create_sql(), params![])?;

        for (index_name, columns) in self.indices {
            conn.execute(
                &format!("CREATE INDEX {} ON {}({});", index_name, self.name, columns),
                params![],
            )?;
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.pragma_update(None, "user_version", (BASE_DB_VERSION + self.version) as i64)?;
        Ok(())
    }
}

/// Authorization per user. Rows are updated in place, never deleted.
const CREDENTIALS_TABLE: Table = Table {
    name: "credentials",
    columns: &[
        sqlite_column!("user_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("display_name", &SqlType::Text),
        sqlite_column!("email", &SqlType::Text),
        sqlite_column!("access_token", &SqlType::Text, non_null = true),
        sqlite_column!("refresh_token", &SqlType::Text, non_null = true),
        // epoch millis
        sqlite_column!("expires_at", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

const PLAY_EVENTS_TABLE: Table = Table {
    name: "play_events",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("track_id", &SqlType::Text, non_null = true),
        sqlite_column!("track_name", &SqlType::Text, non_null = true),
        sqlite_column!("artist_id", &SqlType::Text, non_null = true),
        sqlite_column!("artist_name", &SqlType::Text, non_null = true),
        sqlite_column!("album_id", &SqlType::Text, non_null = true),
        sqlite_column!("album_name", &SqlType::Text, non_null = true),
        // epoch millis
        sqlite_column!("played_at", &SqlType::Integer, non_null = true),
        sqlite_column!("duration_ms", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "synced_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_play_events_user_played_at", "user_id, played_at"),
        ("idx_play_events_artist", "artist_id"),
    ],
    unique_constraints: &[&["user_id", "track_id", "played_at"]],
};

const TOP_ARTISTS_TABLE: Table = Table {
    name: "top_artists",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("artist_id", &SqlType::Text, non_null = true),
        sqlite_column!("artist_name", &SqlType::Text, non_null = true),
        sqlite_column!("term", &SqlType::Text, non_null = true),
        sqlite_column!("rank", &SqlType::Integer, non_null = true),
        // comma separated
        sqlite_column!("genres", &SqlType::Text, non_null = true),
        sqlite_column!("popularity", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "synced_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_top_artists_user_term", "user_id, term")],
    unique_constraints: &[],
};

const TOP_TRACKS_TABLE: Table = Table {
    name: "top_tracks",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("user_id", &SqlType::Text, non_null = true),
        sqlite_column!("track_id", &SqlType::Text, non_null = true),
        sqlite_column!("track_name", &SqlType::Text, non_null = true),
        sqlite_column!("artist_id", &SqlType::Text, non_null = true),
        sqlite_column!("artist_name", &SqlType::Text, non_null = true),
        sqlite_column!("album_id", &SqlType::Text, non_null = true),
        sqlite_column!("album_name", &SqlType::Text, non_null = true),
        sqlite_column!("term", &SqlType::Text, non_null = true),
        sqlite_column!("rank", &SqlType::Integer, non_null = true),
        sqlite_column!("popularity", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "synced_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_top_tracks_user_term", "user_id, term")],
    unique_constraints: &[],
};

/// Shared by all users, written once per track.
const AUDIO_FEATURES_TABLE: Table = Table {
    name: "audio_features",
    columns: &[
        sqlite_column!("track_id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("danceability", &SqlType::Real, non_null = true),
        sqlite_column!("energy", &SqlType::Real, non_null = true),
        sqlite_column!("key", &SqlType::Integer, non_null = true),
        sqlite_column!("loudness", &SqlType::Real, non_null = true),
        sqlite_column!("mode", &SqlType::Integer, non_null = true),
        sqlite_column!("speechiness", &SqlType::Real, non_null = true),
        sqlite_column!("acousticness", &SqlType::Real, non_null = true),
        sqlite_column!("instrumentalness", &SqlType::Real, non_null = true),
        sqlite_column!("liveness", &SqlType::Real, non_null = true),
        sqlite_column!("valence", &SqlType::Real, non_null = true),
        sqlite_column!("tempo", &SqlType::Real, non_null = true),
        sqlite_column!("duration_ms", &SqlType::Integer, non_null = true),
        sqlite_column!("time_signature", &SqlType::Integer, non_null = true),
        sqlite_column!(
            "fetched_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[],
    unique_constraints: &[],
};

pub const LISTENING_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[
        CREDENTIALS_TABLE,
        PLAY_EVENTS_TABLE,
        TOP_ARTISTS_TABLE,
        TOP_TRACKS_TABLE,
        AUDIO_FEATURES_TABLE,
    ],
    migration: None,
}];
