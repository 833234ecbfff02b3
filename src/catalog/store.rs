//! Catalog storage and persistence.
//!
//! Provides the `CatalogStore` trait used by the scraping pipeline and a
//! SQLite-backed implementation.

use super::models::{Artist, BacklogEntry, EntityKind, Genre, Label, MixKind, Track};
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Store abstraction over the persistent catalog.
///
/// The scraping pipeline only ever touches records through this trait, so
/// tests and alternative backends can swap the implementation.
pub trait CatalogStore: Send + Sync {
    // === Artists ===

    fn get_artist(&self, id: i64) -> Result<Option<Artist>>;
    fn get_artist_by_external_id(&self, external_id: i64) -> Result<Option<Artist>>;
    /// Create a bare row holding only the external id (and slug when known).
    fn create_artist_placeholder(&self, external_id: i64, slug: Option<&str>) -> Result<Artist>;
    fn update_artist(&self, artist: &Artist) -> Result<()>;
    fn delete_artist(&self, id: i64) -> Result<()>;
    fn set_artist_public(&self, id: i64, public: bool) -> Result<()>;

    // === Genres ===

    fn get_genre(&self, id: i64) -> Result<Option<Genre>>;
    fn get_genre_by_external_id(&self, external_id: i64) -> Result<Option<Genre>>;
    fn create_genre_placeholder(&self, external_id: i64, slug: Option<&str>) -> Result<Genre>;
    fn update_genre(&self, genre: &Genre) -> Result<()>;
    fn delete_genre(&self, id: i64) -> Result<()>;
    fn set_genre_public(&self, id: i64, public: bool) -> Result<()>;

    // === Labels ===

    fn get_label(&self, id: i64) -> Result<Option<Label>>;
    fn get_label_by_external_id(&self, external_id: i64) -> Result<Option<Label>>;
    fn create_label_placeholder(&self, external_id: i64, slug: Option<&str>) -> Result<Label>;
    fn update_label(&self, label: &Label) -> Result<()>;
    fn delete_label(&self, id: i64) -> Result<()>;
    fn set_label_public(&self, id: i64, public: bool) -> Result<()>;

    // === Tracks ===

    fn get_track(&self, id: i64) -> Result<Option<Track>>;
    fn get_track_by_external_id(&self, external_id: i64) -> Result<Option<Track>>;
    fn create_track_placeholder(&self, external_id: i64, slug: Option<&str>) -> Result<Track>;
    /// Update a track's scalar fields. Relations go through the set_* methods.
    fn update_track(&self, track: &Track) -> Result<()>;
    fn delete_track(&self, id: i64) -> Result<()>;
    fn set_track_public(&self, id: i64, public: bool) -> Result<()>;
    /// Replace the performing-artist relation list.
    fn set_track_artists(&self, track_id: i64, artist_ids: &[i64]) -> Result<()>;
    /// Replace the remix-artist relation list.
    fn set_track_remix_artists(&self, track_id: i64, artist_ids: &[i64]) -> Result<()>;
    /// Highest marketplace id among locally known tracks, if any.
    fn max_track_external_id(&self) -> Result<Option<i64>>;
    fn is_track_external_id_known(&self, external_id: i64) -> Result<bool>;
    /// Non-public tracks with an external id, oldest rows first.
    fn list_nonpublic_tracks(&self, limit: usize) -> Result<Vec<Track>>;

    // === Counts ===

    fn count_artists(&self) -> Result<i64>;
    fn count_genres(&self) -> Result<i64>;
    fn count_labels(&self) -> Result<i64>;
    fn count_tracks(&self) -> Result<i64>;

    // === Missing pages (confirmed upstream 404s) ===

    fn record_missing(&self, kind: EntityKind, external_id: i64) -> Result<()>;
    fn is_missing(&self, kind: EntityKind, external_id: i64) -> Result<bool>;

    // === Backlog ===

    fn enqueue_backlog(&self, external_id: i64, user_id: Option<&str>) -> Result<()>;
    /// Oldest backlog entries first, with their requesting users.
    fn next_backlog_entries(&self, limit: usize) -> Result<Vec<BacklogEntry>>;
    fn remove_backlog(&self, external_id: i64) -> Result<()>;
}

/// SQLite-backed catalog store.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

fn now_ts() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

impl SqliteCatalogStore {
    /// Open (or create) the catalog database at the given path.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open catalog database at {:?}", path))?;
        info!("Opened catalog database at {:?}", path);
        Self::from_connection(conn)
    }

    /// In-memory store, used by tests and throwaway runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        for schema in CATALOG_VERSIONED_SCHEMAS {
            conn.execute_batch(schema.up)
                .with_context(|| format!("Failed to apply catalog schema v{}", schema.version))?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn map_named_row(row: &Row) -> rusqlite::Result<(i64, Option<i64>, Option<String>, String, bool)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get::<_, i64>(4)? != 0,
        ))
    }

    fn map_track(row: &Row) -> rusqlite::Result<Track> {
        let mix: Option<String> = row.get(4)?;
        let release_date: Option<String> = row.get(8)?;
        Ok(Track {
            id: row.get(0)?,
            external_id: row.get(1)?,
            slug: row.get(2)?,
            title: row.get(3)?,
            mix: mix.as_deref().and_then(MixKind::from_str),
            length_secs: row.get(5)?,
            bpm: row.get(6)?,
            key: row.get(7)?,
            release_date: release_date
                .as_deref()
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()),
            genre_id: row.get(9)?,
            label_id: row.get(10)?,
            artist_ids: vec![],
            remix_artist_ids: vec![],
            public: row.get::<_, i64>(11)? != 0,
        })
    }

    fn load_relation_ids(conn: &Connection, table: &str, track_id: i64) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT artist_id FROM {} WHERE track_id = ?1 ORDER BY artist_id",
            table
        ))?;
        let ids = stmt
            .query_map(params![track_id], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn load_track(conn: &Connection, where_clause: &str, value: i64) -> Result<Option<Track>> {
        let sql = format!(
            "SELECT id, external_id, slug, title, mix, length_secs, bpm, track_key,
                    release_date, genre_id, label_id, public
             FROM tracks WHERE {}",
            where_clause
        );
        let track = conn
            .query_row(&sql, params![value], Self::map_track)
            .optional()?;
        match track {
            Some(mut track) => {
                track.artist_ids = Self::load_relation_ids(conn, "track_artists", track.id)?;
                track.remix_artist_ids =
                    Self::load_relation_ids(conn, "track_remix_artists", track.id)?;
                Ok(Some(track))
            }
            None => Ok(None),
        }
    }

    fn replace_relations(
        conn: &Connection,
        table: &str,
        track_id: i64,
        artist_ids: &[i64],
    ) -> Result<()> {
        conn.execute(
            &format!("DELETE FROM {} WHERE track_id = ?1", table),
            params![track_id],
        )?;
        let mut stmt = conn.prepare(&format!(
            "INSERT OR IGNORE INTO {} (track_id, artist_id) VALUES (?1, ?2)",
            table
        ))?;
        for artist_id in artist_ids {
            stmt.execute(params![track_id, artist_id])?;
        }
        Ok(())
    }
}

macro_rules! named_entity_impl {
    ($get:ident, $get_by_external:ident, $create:ident, $update:ident, $delete:ident,
     $set_public:ident, $table:literal, $map:ident) => {
        fn $get(&self, id: i64) -> Result<Option<super::models::$map>> {
            let conn = self.conn.lock().unwrap();
            let row = conn
                .query_row(
                    concat!(
                        "SELECT id, external_id, slug, name, public FROM ",
                        $table,
                        " WHERE id = ?1"
                    ),
                    params![id],
                    |row| Self::map_named_row(row),
                )
                .optional()?;
            Ok(row.map(|(id, external_id, slug, name, public)| super::models::$map {
                id,
                external_id,
                slug,
                name,
                public,
            }))
        }

        fn $get_by_external(&self, external_id: i64) -> Result<Option<super::models::$map>> {
            let conn = self.conn.lock().unwrap();
            let row = conn
                .query_row(
                    concat!(
                        "SELECT id, external_id, slug, name, public FROM ",
                        $table,
                        " WHERE external_id = ?1"
                    ),
                    params![external_id],
                    |row| Self::map_named_row(row),
                )
                .optional()?;
            Ok(row.map(|(id, external_id, slug, name, public)| super::models::$map {
                id,
                external_id,
                slug,
                name,
                public,
            }))
        }

        fn $create(&self, external_id: i64, slug: Option<&str>) -> Result<super::models::$map> {
            let id = {
                let conn = self.conn.lock().unwrap();
                conn.execute(
                    concat!(
                        "INSERT INTO ",
                        $table,
                        " (external_id, slug) VALUES (?1, ?2)"
                    ),
                    params![external_id, slug],
                )?;
                conn.last_insert_rowid()
            };
            Ok(super::models::$map {
                id,
                external_id: Some(external_id),
                slug: slug.map(str::to_string),
                name: String::new(),
                public: false,
            })
        }

        fn $update(&self, entity: &super::models::$map) -> Result<()> {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                concat!(
                    "UPDATE ",
                    $table,
                    " SET external_id = ?2, slug = ?3, name = ?4, public = ?5 WHERE id = ?1"
                ),
                params![
                    entity.id,
                    entity.external_id,
                    entity.slug,
                    entity.name,
                    entity.public as i64
                ],
            )?;
            Ok(())
        }

        fn $delete(&self, id: i64) -> Result<()> {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                concat!("DELETE FROM ", $table, " WHERE id = ?1"),
                params![id],
            )?;
            Ok(())
        }

        fn $set_public(&self, id: i64, public: bool) -> Result<()> {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                concat!("UPDATE ", $table, " SET public = ?2 WHERE id = ?1"),
                params![id, public as i64],
            )?;
            Ok(())
        }
    };
}

impl CatalogStore for SqliteCatalogStore {
    named_entity_impl!(
        get_artist,
        get_artist_by_external_id,
        create_artist_placeholder,
        update_artist,
        delete_artist,
        set_artist_public,
        "artists",
        Artist
    );

    named_entity_impl!(
        get_genre,
        get_genre_by_external_id,
        create_genre_placeholder,
        update_genre,
        delete_genre,
        set_genre_public,
        "genres",
        Genre
    );

    named_entity_impl!(
        get_label,
        get_label_by_external_id,
        create_label_placeholder,
        update_label,
        delete_label,
        set_label_public,
        "labels",
        Label
    );

    fn get_track(&self, id: i64) -> Result<Option<Track>> {
        let conn = self.conn.lock().unwrap();
        Self::load_track(&conn, "id = ?1", id)
    }

    fn get_track_by_external_id(&self, external_id: i64) -> Result<Option<Track>> {
        let conn = self.conn.lock().unwrap();
        Self::load_track(&conn, "external_id = ?1", external_id)
    }

    fn create_track_placeholder(&self, external_id: i64, slug: Option<&str>) -> Result<Track> {
        let id = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO tracks (external_id, slug) VALUES (?1, ?2)",
                params![external_id, slug],
            )?;
            conn.last_insert_rowid()
        };
        Ok(Track {
            id,
            external_id: Some(external_id),
            slug: slug.map(str::to_string),
            title: String::new(),
            mix: None,
            length_secs: None,
            bpm: None,
            key: None,
            release_date: None,
            genre_id: None,
            label_id: None,
            artist_ids: vec![],
            remix_artist_ids: vec![],
            public: false,
        })
    }

    fn update_track(&self, track: &Track) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tracks
             SET external_id = ?2, slug = ?3, title = ?4, mix = ?5, length_secs = ?6,
                 bpm = ?7, track_key = ?8, release_date = ?9, genre_id = ?10,
                 label_id = ?11, public = ?12
             WHERE id = ?1",
            params![
                track.id,
                track.external_id,
                track.slug,
                track.title,
                track.mix.map(|m| m.as_str()),
                track.length_secs,
                track.bpm,
                track.key,
                track.release_date.map(|d| d.format("%Y-%m-%d").to_string()),
                track.genre_id,
                track.label_id,
                track.public as i64,
            ],
        )?;
        Ok(())
    }

    fn delete_track(&self, id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM tracks WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn set_track_public(&self, id: i64, public: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE tracks SET public = ?2 WHERE id = ?1",
            params![id, public as i64],
        )?;
        Ok(())
    }

    fn set_track_artists(&self, track_id: i64, artist_ids: &[i64]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::replace_relations(&conn, "track_artists", track_id, artist_ids)
    }

    fn set_track_remix_artists(&self, track_id: i64, artist_ids: &[i64]) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        Self::replace_relations(&conn, "track_remix_artists", track_id, artist_ids)
    }

    fn max_track_external_id(&self) -> Result<Option<i64>> {
        let conn = self.conn.lock().unwrap();
        let max: Option<i64> =
            conn.query_row("SELECT MAX(external_id) FROM tracks", [], |row| row.get(0))?;
        Ok(max)
    }

    fn is_track_external_id_known(&self, external_id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tracks WHERE external_id = ?1",
            params![external_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn list_nonpublic_tracks(&self, limit: usize) -> Result<Vec<Track>> {
        let ids: Vec<i64> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT id FROM tracks
                 WHERE public = 0 AND external_id IS NOT NULL
                 ORDER BY id ASC LIMIT ?1",
            )?;
            let ids = stmt
                .query_map(params![limit as i64], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };
        let mut tracks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(track) = self.get_track(id)? {
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    fn count_artists(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM artists", [], |row| row.get(0))?)
    }

    fn count_genres(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM genres", [], |row| row.get(0))?)
    }

    fn count_labels(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM labels", [], |row| row.get(0))?)
    }

    fn count_tracks(&self) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?)
    }

    fn record_missing(&self, kind: EntityKind, external_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO missing_pages (kind, external_id, discovered_at)
             VALUES (?1, ?2, ?3)",
            params![kind.as_str(), external_id, now_ts()],
        )?;
        Ok(())
    }

    fn is_missing(&self, kind: EntityKind, external_id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM missing_pages WHERE kind = ?1 AND external_id = ?2",
            params![kind.as_str(), external_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn enqueue_backlog(&self, external_id: i64, user_id: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO backlog (external_id, created_at) VALUES (?1, ?2)",
            params![external_id, now_ts()],
        )?;
        if let Some(user_id) = user_id {
            conn.execute(
                "INSERT OR IGNORE INTO backlog_requests (external_id, user_id) VALUES (?1, ?2)",
                params![external_id, user_id],
            )?;
        }
        Ok(())
    }

    fn next_backlog_entries(&self, limit: usize) -> Result<Vec<BacklogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT external_id, created_at FROM backlog
             ORDER BY created_at ASC, external_id ASC LIMIT ?1",
        )?;
        let entries = stmt
            .query_map(params![limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut users_stmt = conn.prepare(
            "SELECT user_id FROM backlog_requests WHERE external_id = ?1 ORDER BY user_id",
        )?;
        let mut result = Vec::with_capacity(entries.len());
        for (external_id, created_at) in entries {
            let requested_by = users_stmt
                .query_map(params![external_id], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            result.push(BacklogEntry {
                external_id,
                created_at,
                requested_by,
            });
        }
        Ok(result)
    }

    fn remove_backlog(&self, external_id: i64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM backlog WHERE external_id = ?1",
            params![external_id],
        )?;
        Ok(())
    }
}
