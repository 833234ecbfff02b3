//! Structural extraction of catalog fields from marketplace HTML.
//!
//! Pages are parsed by locating class-tagged containers rather than by
//! regexing raw markup. A page that loads but lacks the expected structure
//! (interstitial, captcha wall, layout change) yields `ScrapeError::Parse`,
//! which the reconciler treats as retry-worthy.

use super::error::ScrapeError;
use crate::catalog::{EntityKind, MixKind};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};

lazy_static! {
    static ref TITLE_SEL: Selector = Selector::parse("div.interior-title h1:not(.remixed)").unwrap();
    static ref MIX_SEL: Selector = Selector::parse("div.interior-title h1.remixed").unwrap();
    static ref ARTIST_BLOCK_SEL: Selector = Selector::parse("div.interior-track-artists").unwrap();
    static ref BLOCK_HEADING_SEL: Selector = Selector::parse("h2").unwrap();
    static ref LINK_SEL: Selector = Selector::parse("a[href]").unwrap();
    static ref LENGTH_SEL: Selector =
        Selector::parse("li.interior-track-length span.value").unwrap();
    static ref RELEASED_SEL: Selector =
        Selector::parse("li.interior-track-released span.value").unwrap();
    static ref BPM_SEL: Selector = Selector::parse("li.interior-track-bpm span.value").unwrap();
    static ref KEY_SEL: Selector = Selector::parse("li.interior-track-key span.value").unwrap();
    static ref GENRE_SEL: Selector = Selector::parse("li.interior-track-genre a[href]").unwrap();
    static ref LABEL_SEL: Selector = Selector::parse("li.interior-track-labels a[href]").unwrap();
}

/// A reference to another marketplace page found inside a parsed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub external_id: i64,
    pub slug: String,
    pub name: String,
}

/// Everything extractable from one track page.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTrack {
    pub title: String,
    pub mix: Option<MixKind>,
    pub length_secs: Option<i64>,
    pub bpm: Option<i64>,
    pub key: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub genre: Option<PageLink>,
    pub label: Option<PageLink>,
    pub artists: Vec<PageLink>,
    pub remixers: Vec<PageLink>,
}

fn element_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document
        .select(selector)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
}

/// Parse an `/{kind}/{slug}/{id}` href into a link, checking the kind
/// segment matches what the surrounding markup claims to reference.
fn parse_link_href(href: &str, expected: EntityKind, name: String) -> Option<PageLink> {
    let mut segments = href.trim_start_matches('/').split('/');
    let kind = EntityKind::from_str(segments.next()?)?;
    if kind != expected {
        return None;
    }
    let slug = segments.next()?.to_string();
    let external_id: i64 = segments.next()?.parse().ok()?;
    if external_id <= 0 {
        return None;
    }
    Some(PageLink {
        external_id,
        slug,
        name,
    })
}

fn collect_links(element: ElementRef, expected: EntityKind) -> Vec<PageLink> {
    element
        .select(&LINK_SEL)
        .filter_map(|a| {
            let href = a.value().attr("href")?;
            parse_link_href(href, expected, element_text(a))
        })
        .collect()
}

/// Track length as printed, "6:24" or "1:02:30", in whole seconds.
fn parse_length(text: &str) -> Option<i64> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut secs: i64 = 0;
    for part in &parts {
        secs = secs * 60 + part.trim().parse::<i64>().ok()?;
    }
    Some(secs)
}

/// Extract the display name from an artist, genre or label page.
pub fn parse_name_page(html: &str) -> Result<String, ScrapeError> {
    let document = Html::parse_document(html);
    first_text(&document, &TITLE_SEL)
        .ok_or_else(|| ScrapeError::Parse("page has no title heading".into()))
}

/// Extract all track fields from a track page.
///
/// Only the title is required at parse time; field completeness is judged
/// later against the assembled record.
pub fn parse_track_page(html: &str) -> Result<ParsedTrack, ScrapeError> {
    let document = Html::parse_document(html);

    let title = first_text(&document, &TITLE_SEL)
        .ok_or_else(|| ScrapeError::Parse("track page has no title heading".into()))?;
    let mix = first_text(&document, &MIX_SEL).map(|label| MixKind::from_label(&label));

    let mut artists = Vec::new();
    let mut remixers = Vec::new();
    for block in document.select(&ARTIST_BLOCK_SEL) {
        let heading = block
            .select(&BLOCK_HEADING_SEL)
            .next()
            .map(element_text)
            .unwrap_or_default();
        let links = collect_links(block, EntityKind::Artist);
        match heading.as_str() {
            "Remixers" => remixers.extend(links),
            _ => artists.extend(links),
        }
    }

    let genre = document
        .select(&GENRE_SEL)
        .next()
        .and_then(|a| {
            let href = a.value().attr("href")?;
            parse_link_href(href, EntityKind::Genre, element_text(a))
        });
    let label = document
        .select(&LABEL_SEL)
        .next()
        .and_then(|a| {
            let href = a.value().attr("href")?;
            parse_link_href(href, EntityKind::Label, element_text(a))
        });

    Ok(ParsedTrack {
        title,
        mix,
        length_secs: first_text(&document, &LENGTH_SEL).and_then(|t| parse_length(&t)),
        bpm: first_text(&document, &BPM_SEL).and_then(|t| t.trim().parse().ok()),
        key: first_text(&document, &KEY_SEL),
        release_date: first_text(&document, &RELEASED_SEL)
            .and_then(|t| NaiveDate::parse_from_str(t.trim(), "%Y-%m-%d").ok()),
        genre,
        label,
        artists,
        remixers,
    })
}
