//! Schema definition for the catalog database.

/// A versioned schema step applied with `execute_batch`.
pub struct CatalogSchema {
    pub version: usize,
    pub up: &'static str,
}

pub const CATALOG_VERSIONED_SCHEMAS: &[CatalogSchema] = &[CatalogSchema {
    version: 1,
    up: r#"
            CREATE TABLE IF NOT EXISTS artists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id INTEGER UNIQUE,
                slug TEXT,
                name TEXT NOT NULL DEFAULT '',
                public INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS genres (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id INTEGER UNIQUE,
                slug TEXT,
                name TEXT NOT NULL DEFAULT '',
                public INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS labels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id INTEGER UNIQUE,
                slug TEXT,
                name TEXT NOT NULL DEFAULT '',
                public INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS tracks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id INTEGER UNIQUE,
                slug TEXT,
                title TEXT NOT NULL DEFAULT '',
                mix TEXT,
                length_secs INTEGER,
                bpm INTEGER,
                track_key TEXT,
                release_date TEXT,
                genre_id INTEGER REFERENCES genres(id) ON DELETE SET NULL,
                label_id INTEGER REFERENCES labels(id) ON DELETE SET NULL,
                public INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS track_artists (
                track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
                artist_id INTEGER NOT NULL REFERENCES artists(id) ON DELETE CASCADE,
                PRIMARY KEY (track_id, artist_id)
            );

            CREATE TABLE IF NOT EXISTS track_remix_artists (
                track_id INTEGER NOT NULL REFERENCES tracks(id) ON DELETE CASCADE,
                artist_id INTEGER NOT NULL REFERENCES artists(id) ON DELETE CASCADE,
                PRIMARY KEY (track_id, artist_id)
            );

            CREATE TABLE IF NOT EXISTS missing_pages (
                kind TEXT NOT NULL,
                external_id INTEGER NOT NULL,
                discovered_at INTEGER NOT NULL,
                PRIMARY KEY (kind, external_id)
            );

            CREATE TABLE IF NOT EXISTS backlog (
                external_id INTEGER PRIMARY KEY,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS backlog_requests (
                external_id INTEGER NOT NULL REFERENCES backlog(external_id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                PRIMARY KEY (external_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_tracks_public ON tracks(public);
            CREATE INDEX IF NOT EXISTS idx_tracks_genre ON tracks(genre_id);
            CREATE INDEX IF NOT EXISTS idx_tracks_label ON tracks(label_id);
            CREATE INDEX IF NOT EXISTS idx_track_artists_artist ON track_artists(artist_id);
            CREATE INDEX IF NOT EXISTS idx_track_remix_artists_artist ON track_remix_artists(artist_id);
        "#,
}];
