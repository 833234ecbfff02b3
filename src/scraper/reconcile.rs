//! Reconciliation of catalog records against marketplace pages.
//!
//! For each entity kind the reconciler runs the same state machine keyed by
//! external id: look up or create the local record, decide from its metadata
//! status whether anything needs fetching, then fetch and parse with a
//! bounded number of attempts. A placeholder created during the call is
//! deleted again if the call ends without a populated record, so failed
//! scrapes never leave bare rows behind.

use super::error::ScrapeError;
use super::fetch::PageFetcher;
use super::page::PageRef;
use super::parse::{self, PageLink};
use crate::catalog::{CatalogStore, EntityKind, MetadataStatus, Track};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Why a reconciliation returned without touching the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotAttemptedReason {
    /// Non-positive external id. Can never exist upstream.
    InvalidIdentifier,
    /// The id sits in the missing-pages set, confirmed 404 on a prior run.
    KnownMissing,
}

/// Terminal result of reconciling one external id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapeOutcome {
    /// No fetch was issued.
    NotAttempted(NotAttemptedReason),
    /// The record is complete and visible. `newly_resolved` distinguishes a
    /// record populated by this call from one that was already complete.
    Populated { newly_resolved: bool },
    /// Upstream answered 404.
    NotFound,
    /// A placeholder created by this call was deleted after exhausting
    /// attempts without ever completing.
    Abandoned,
    /// Attempts exhausted on a pre-existing record. Prior data kept.
    Failed,
}

impl ScrapeOutcome {
    pub fn is_populated(&self) -> bool {
        matches!(self, ScrapeOutcome::Populated { .. })
    }
}

/// Result of reconciling a linked entity while assembling a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkResolution {
    /// The linked record was populated by this resolution. Attach and keep
    /// walking the relation list.
    Resolved(i64),
    /// The linked record was already complete. Attach it if absent, then
    /// stop walking: the rest of the relation is assumed current.
    AlreadyCurrent(i64),
    /// The link could not be resolved. Stop walking without attaching.
    Failed,
}

pub struct Reconciler {
    store: Arc<dyn CatalogStore>,
    fetcher: Box<dyn PageFetcher>,
    max_attempts: u32,
}

macro_rules! named_scrape_impl {
    ($scrape:ident, $resolve:ident, $kind:expr,
     $get_by_external:ident, $create:ident, $update:ident, $delete:ident, $set_public:ident) => {
        pub fn $scrape(&self, external_id: i64, slug_hint: Option<&str>) -> Result<ScrapeOutcome> {
            if external_id <= 0 {
                return Ok(ScrapeOutcome::NotAttempted(
                    NotAttemptedReason::InvalidIdentifier,
                ));
            }
            if self.store.is_missing($kind, external_id)? {
                return Ok(ScrapeOutcome::NotAttempted(NotAttemptedReason::KnownMissing));
            }

            let (mut record, created_now) = match self.store.$get_by_external(external_id)? {
                Some(record) => (record, false),
                None => (self.store.$create(external_id, slug_hint)?, true),
            };

            // Visibility flips apply immediately; only records still
            // missing required fields go on to a fetch.
            let status = record.metadata_status();
            match status {
                MetadataStatus::Add => self.store.$set_public(record.id, true)?,
                MetadataStatus::Remove => {
                    self.store.$set_public(record.id, false)?;
                    record.public = false;
                }
                MetadataStatus::Complete | MetadataStatus::Scrape => {}
            }
            if !status.needs_fetch() {
                debug!("{} {} already complete", $kind.as_str(), external_id);
                return Ok(ScrapeOutcome::Populated {
                    newly_resolved: false,
                });
            }

            let page = PageRef::new($kind, external_id, record.slug.as_deref().or(slug_hint));
            for attempt in 0..self.max_attempts {
                match self.fetcher.fetch(&page, attempt) {
                    Ok(html) => match parse::parse_name_page(&html) {
                        Ok(name) => {
                            record.name = name;
                            record.public = true;
                            self.store.$update(&record)?;
                            info!("Populated {}", page);
                            return Ok(ScrapeOutcome::Populated {
                                newly_resolved: true,
                            });
                        }
                        Err(e) => warn!("Parsing {} failed: {}", page, e),
                    },
                    Err(ScrapeError::NotFound) => {
                        if created_now {
                            self.store.$delete(record.id)?;
                            self.store.record_missing($kind, external_id)?;
                        }
                        return Ok(ScrapeOutcome::NotFound);
                    }
                    Err(e) if e.is_retryable() => {
                        warn!("Fetching {} failed on attempt {}: {}", page, attempt, e)
                    }
                    Err(e) => {
                        warn!("Fetching {} aborted: {}", page, e);
                        break;
                    }
                }
            }

            if created_now {
                info!("Abandoning never-completed placeholder for {}", page);
                self.store.$delete(record.id)?;
                return Ok(ScrapeOutcome::Abandoned);
            }
            Ok(ScrapeOutcome::Failed)
        }

        fn $resolve(&self, link: &PageLink) -> Result<LinkResolution> {
            let outcome = self.$scrape(link.external_id, Some(&link.slug))?;
            let resolution = match outcome {
                ScrapeOutcome::Populated { newly_resolved } => {
                    match self.store.$get_by_external(link.external_id)? {
                        Some(record) if newly_resolved => LinkResolution::Resolved(record.id),
                        Some(record) => LinkResolution::AlreadyCurrent(record.id),
                        None => LinkResolution::Failed,
                    }
                }
                _ => LinkResolution::Failed,
            };
            Ok(resolution)
        }
    };
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn CatalogStore>,
        fetcher: Box<dyn PageFetcher>,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            fetcher,
            max_attempts,
        }
    }

    named_scrape_impl!(
        scrape_artist,
        resolve_artist_link,
        EntityKind::Artist,
        get_artist_by_external_id,
        create_artist_placeholder,
        update_artist,
        delete_artist,
        set_artist_public
    );

    named_scrape_impl!(
        scrape_genre,
        resolve_genre_link,
        EntityKind::Genre,
        get_genre_by_external_id,
        create_genre_placeholder,
        update_genre,
        delete_genre,
        set_genre_public
    );

    named_scrape_impl!(
        scrape_label,
        resolve_label_link,
        EntityKind::Label,
        get_label_by_external_id,
        create_label_placeholder,
        update_label,
        delete_label,
        set_label_public
    );

    pub fn scrape_track(&self, external_id: i64, slug_hint: Option<&str>) -> Result<ScrapeOutcome> {
        if external_id <= 0 {
            return Ok(ScrapeOutcome::NotAttempted(
                NotAttemptedReason::InvalidIdentifier,
            ));
        }
        if self.store.is_missing(EntityKind::Track, external_id)? {
            return Ok(ScrapeOutcome::NotAttempted(NotAttemptedReason::KnownMissing));
        }

        let (mut track, created_now) = match self.store.get_track_by_external_id(external_id)? {
            Some(track) => (track, false),
            None => (
                self.store.create_track_placeholder(external_id, slug_hint)?,
                true,
            ),
        };

        let status = track.metadata_status();
        match status {
            MetadataStatus::Add => self.store.set_track_public(track.id, true)?,
            MetadataStatus::Remove => {
                self.store.set_track_public(track.id, false)?;
                track.public = false;
            }
            MetadataStatus::Complete | MetadataStatus::Scrape => {}
        }
        if !status.needs_fetch() {
            debug!("track {} already complete", external_id);
            return Ok(ScrapeOutcome::Populated {
                newly_resolved: false,
            });
        }

        let page = PageRef::new(
            EntityKind::Track,
            external_id,
            track.slug.as_deref().or(slug_hint),
        );
        for attempt in 0..self.max_attempts {
            match self.fetcher.fetch(&page, attempt) {
                Ok(html) => match parse::parse_track_page(&html) {
                    Ok(parsed) => {
                        self.apply_parsed_track(&mut track, parsed)?;
                        if track.is_complete() {
                            track.public = true;
                            self.store.update_track(&track)?;
                            info!("Populated {}", page);
                            return Ok(ScrapeOutcome::Populated {
                                newly_resolved: true,
                            });
                        }
                        warn!("{} parsed but still incomplete after merge", page);
                    }
                    Err(e) => warn!("Parsing {} failed: {}", page, e),
                },
                Err(ScrapeError::NotFound) => {
                    if created_now {
                        self.store.delete_track(track.id)?;
                        self.store.record_missing(EntityKind::Track, external_id)?;
                    }
                    return Ok(ScrapeOutcome::NotFound);
                }
                Err(e) if e.is_retryable() => {
                    warn!("Fetching {} failed on attempt {}: {}", page, attempt, e)
                }
                Err(e) => {
                    warn!("Fetching {} aborted: {}", page, e);
                    break;
                }
            }
        }

        if created_now {
            info!("Abandoning never-completed placeholder for {}", page);
            self.store.delete_track(track.id)?;
            return Ok(ScrapeOutcome::Abandoned);
        }
        Ok(ScrapeOutcome::Failed)
    }

    /// Merge one parsed page into the track and persist the partial state.
    /// Linked entities are reconciled recursively by their own external ids.
    fn apply_parsed_track(&self, track: &mut Track, parsed: parse::ParsedTrack) -> Result<()> {
        track.title = parsed.title;
        track.mix = parsed.mix.or(track.mix);
        track.length_secs = parsed.length_secs.or(track.length_secs);
        track.bpm = parsed.bpm.or(track.bpm);
        track.key = parsed.key.or(track.key.take());
        track.release_date = parsed.release_date.or(track.release_date);

        if let Some(link) = &parsed.genre {
            match self.resolve_genre_link(link)? {
                LinkResolution::Resolved(id) | LinkResolution::AlreadyCurrent(id) => {
                    track.genre_id = Some(id)
                }
                LinkResolution::Failed => {}
            }
        }
        if let Some(link) = &parsed.label {
            match self.resolve_label_link(link)? {
                LinkResolution::Resolved(id) | LinkResolution::AlreadyCurrent(id) => {
                    track.label_id = Some(id)
                }
                LinkResolution::Failed => {}
            }
        }

        track.artist_ids = self.resolve_artist_list(&track.artist_ids, &parsed.artists)?;
        track.remix_artist_ids =
            self.resolve_artist_list(&track.remix_artist_ids, &parsed.remixers)?;

        self.store.update_track(track)?;
        self.store.set_track_artists(track.id, &track.artist_ids)?;
        self.store
            .set_track_remix_artists(track.id, &track.remix_artist_ids)?;
        Ok(())
    }

    /// Walk a relation list of artist links. A newly resolved artist is
    /// attached and the walk continues; an already-current artist is
    /// attached if absent and the walk stops, trusting the stored relation;
    /// a failed resolution stops the walk without attaching.
    fn resolve_artist_list(&self, current: &[i64], links: &[PageLink]) -> Result<Vec<i64>> {
        let mut ids = current.to_vec();
        for link in links {
            match self.resolve_artist_link(link)? {
                LinkResolution::Resolved(id) => {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
                LinkResolution::AlreadyCurrent(id) => {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                    break;
                }
                LinkResolution::Failed => break,
            }
        }
        Ok(ids)
    }
}
