//! Data models for the local catalog.
//!
//! Defines the scraped entities (artists, genres, labels, tracks), the
//! derived metadata status used to decide whether a record needs scraping,
//! and the scraping backlog bookkeeping record.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of catalog entity that maps to a marketplace page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Artist,
    Genre,
    Label,
    Track,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Artist => "artist",
            EntityKind::Genre => "genre",
            EntityKind::Label => "label",
            EntityKind::Track => "track",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "artist" => Some(EntityKind::Artist),
            "genre" => Some(EntityKind::Genre),
            "label" => Some(EntityKind::Label),
            "track" => Some(EntityKind::Track),
            _ => None,
        }
    }
}

/// Single-select mix category for a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixKind {
    Original,
    Extended,
    Remix,
    Edit,
    Dub,
    Instrumental,
    Acapella,
    Other,
}

impl MixKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MixKind::Original => "original",
            MixKind::Extended => "extended",
            MixKind::Remix => "remix",
            MixKind::Edit => "edit",
            MixKind::Dub => "dub",
            MixKind::Instrumental => "instrumental",
            MixKind::Acapella => "acapella",
            MixKind::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "original" => Some(MixKind::Original),
            "extended" => Some(MixKind::Extended),
            "remix" => Some(MixKind::Remix),
            "edit" => Some(MixKind::Edit),
            "dub" => Some(MixKind::Dub),
            "instrumental" => Some(MixKind::Instrumental),
            "acapella" => Some(MixKind::Acapella),
            "other" => Some(MixKind::Other),
            _ => None,
        }
    }

    /// Classify the free-form mix label printed on a track page
    /// (e.g. "Original Mix", "Hot Since 82 Remix", "Radio Edit").
    pub fn from_label(label: &str) -> Self {
        let lowered = label.to_lowercase();
        if lowered.contains("extended") {
            MixKind::Extended
        } else if lowered.contains("remix") || lowered.contains("rework") {
            MixKind::Remix
        } else if lowered.contains("edit") {
            MixKind::Edit
        } else if lowered.contains("dub") {
            MixKind::Dub
        } else if lowered.contains("instrumental") {
            MixKind::Instrumental
        } else if lowered.contains("acapella") || lowered.contains("a cappella") {
            MixKind::Acapella
        } else if lowered.contains("original") {
            MixKind::Original
        } else {
            MixKind::Other
        }
    }
}

/// Derived scraping decision for a record.
///
/// Not stored; computed from field completeness and the visibility flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataStatus {
    /// All required fields present and the record is visible. Nothing to do.
    Complete,
    /// All required fields present but the record is hidden: flip it on.
    Add,
    /// Record is visible but required fields are missing: flip it off, then rescrape.
    Remove,
    /// Record is hidden and incomplete: fetch it.
    Scrape,
}

impl MetadataStatus {
    fn derive(complete: bool, public: bool) -> Self {
        match (complete, public) {
            (true, true) => MetadataStatus::Complete,
            (true, false) => MetadataStatus::Add,
            (false, true) => MetadataStatus::Remove,
            (false, false) => MetadataStatus::Scrape,
        }
    }

    /// Returns true if the record still needs a fetch after any visibility flip.
    pub fn needs_fetch(&self) -> bool {
        matches!(self, MetadataStatus::Remove | MetadataStatus::Scrape)
    }
}

/// A performing artist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    /// Local row id.
    pub id: i64,
    /// Marketplace-assigned numeric id. Unique when set.
    pub external_id: Option<i64>,
    /// URL slug from the marketplace page, when known.
    pub slug: Option<String>,
    pub name: String,
    /// Whether the record is visible to catalog browsing.
    pub public: bool,
}

impl Artist {
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty()
    }

    pub fn metadata_status(&self) -> MetadataStatus {
        MetadataStatus::derive(self.is_complete(), self.public)
    }
}

/// A musical genre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub external_id: Option<i64>,
    pub slug: Option<String>,
    pub name: String,
    pub public: bool,
}

impl Genre {
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty()
    }

    pub fn metadata_status(&self) -> MetadataStatus {
        MetadataStatus::derive(self.is_complete(), self.public)
    }
}

/// A record label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub id: i64,
    pub external_id: Option<i64>,
    pub slug: Option<String>,
    pub name: String,
    pub public: bool,
}

impl Label {
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty()
    }

    pub fn metadata_status(&self) -> MetadataStatus {
        MetadataStatus::derive(self.is_complete(), self.public)
    }
}

/// A track, with its scraped audio metadata and entity links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    pub external_id: Option<i64>,
    pub slug: Option<String>,
    pub title: String,
    /// Single-select mix category.
    pub mix: Option<MixKind>,
    pub length_secs: Option<i64>,
    pub bpm: Option<i64>,
    /// Musical key as printed on the page, e.g. "A min".
    pub key: Option<String>,
    pub release_date: Option<NaiveDate>,
    /// Local row id of the linked genre.
    pub genre_id: Option<i64>,
    /// Local row id of the linked label.
    pub label_id: Option<i64>,
    /// Local row ids of performing artists.
    pub artist_ids: Vec<i64>,
    /// Local row ids of remix artists.
    pub remix_artist_ids: Vec<i64>,
    pub public: bool,
}

impl Track {
    /// A track is complete when every field the catalog displays is present.
    pub fn is_complete(&self) -> bool {
        !self.title.trim().is_empty()
            && self.length_secs.is_some()
            && self.bpm.is_some()
            && self.key.is_some()
            && self.release_date.is_some()
            && self.genre_id.is_some()
            && !self.artist_ids.is_empty()
    }

    pub fn metadata_status(&self) -> MetadataStatus {
        MetadataStatus::derive(self.is_complete(), self.public)
    }
}

/// An external track id queued for future scraping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacklogEntry {
    pub external_id: i64,
    /// Unix timestamp of when the entry was queued.
    pub created_at: i64,
    /// Ids of users who asked for this track, if any.
    pub requested_by: Vec<String>,
}
