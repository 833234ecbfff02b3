//! Shared fixtures for pipeline tests: a scripted page fetcher and canned
//! marketplace HTML.

use cratedigger::catalog::{EntityKind, SqliteCatalogStore};
use cratedigger::scraper::{PageFetcher, PageRef, ScrapeError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub const VOICES_TRACK_ID: i64 = 14879071;
pub const VOICES_ARTIST_ID: i64 = 38;
pub const VOICES_GENRE_ID: i64 = 12;
pub const VOICES_LABEL_ID: i64 = 247;

/// File-backed store in a temp directory, as the binary would open it.
pub fn temp_store() -> (Arc<SqliteCatalogStore>, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = SqliteCatalogStore::new(&dir.path().join("catalog.db")).unwrap();
    (Arc::new(store), dir)
}

#[derive(Clone)]
pub enum PageResponse {
    Html(String),
    NotFound,
    Transient,
}

/// Scripted fetcher. Each page plays its response list in order, repeating
/// the last entry; pages without a script answer 404. All calls are logged.
pub struct FixtureFetcher {
    scripts: HashMap<(EntityKind, i64), Vec<PageResponse>>,
    cursor: Mutex<HashMap<(EntityKind, i64), usize>>,
    calls: Arc<Mutex<Vec<(EntityKind, i64)>>>,
}

impl FixtureFetcher {
    pub fn new() -> (Self, Arc<Mutex<Vec<(EntityKind, i64)>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                scripts: HashMap::new(),
                cursor: Mutex::new(HashMap::new()),
                calls: calls.clone(),
            },
            calls,
        )
    }

    pub fn script(mut self, kind: EntityKind, id: i64, responses: Vec<PageResponse>) -> Self {
        self.scripts.insert((kind, id), responses);
        self
    }

    /// Script every page needed to fully resolve the "Voices" track.
    pub fn with_voices_pages(self) -> Self {
        self.script(
            EntityKind::Track,
            VOICES_TRACK_ID,
            vec![PageResponse::Html(voices_track_page())],
        )
        .script(
            EntityKind::Artist,
            VOICES_ARTIST_ID,
            vec![PageResponse::Html(name_page("Maceo Plex"))],
        )
        .script(
            EntityKind::Genre,
            VOICES_GENRE_ID,
            vec![PageResponse::Html(name_page("Deep House"))],
        )
        .script(
            EntityKind::Label,
            VOICES_LABEL_ID,
            vec![PageResponse::Html(name_page("Ellum Audio"))],
        )
    }
}

impl PageFetcher for FixtureFetcher {
    fn fetch(&self, page: &PageRef, _attempt: u32) -> Result<String, ScrapeError> {
        let key = (page.kind, page.external_id);
        self.calls.lock().unwrap().push(key);
        let responses = match self.scripts.get(&key) {
            Some(responses) => responses,
            None => return Err(ScrapeError::NotFound),
        };
        let mut cursor = self.cursor.lock().unwrap();
        let index = cursor.entry(key).or_insert(0);
        let response = responses[(*index).min(responses.len() - 1)].clone();
        *index += 1;
        match response {
            PageResponse::Html(html) => Ok(html),
            PageResponse::NotFound => Err(ScrapeError::NotFound),
            PageResponse::Transient => Err(ScrapeError::Transient("scripted failure".into())),
        }
    }
}

pub fn name_page(name: &str) -> String {
    format!(r#"<div class="interior-title"><h1>{}</h1></div>"#, name)
}

pub fn voices_track_page() -> String {
    r#"
    <html><body>
      <div class="interior-title">
        <h1>Voices</h1>
        <h1 class="remixed">Original Mix</h1>
      </div>
      <div class="interior-track-artists">
        <h2>Artists</h2>
        <a href="/artist/maceo-plex/38">Maceo Plex</a>
      </div>
      <ul>
        <li class="interior-track-length"><span class="value">6:24</span></li>
        <li class="interior-track-released"><span class="value">2013-06-17</span></li>
        <li class="interior-track-bpm"><span class="value">124</span></li>
        <li class="interior-track-key"><span class="value">A min</span></li>
        <li class="interior-track-genre"><a href="/genre/deep-house/12">Deep House</a></li>
        <li class="interior-track-labels"><a href="/label/ellum/247">Ellum Audio</a></li>
      </ul>
    </body></html>
    "#
    .to_string()
}

pub fn count_fetches(
    calls: &Arc<Mutex<Vec<(EntityKind, i64)>>>,
    kind: EntityKind,
    id: i64,
) -> usize {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter(|&&(k, i)| k == kind && i == id)
        .count()
}
