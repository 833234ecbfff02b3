//! Cratedigger Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod catalog;
pub mod config;
pub mod scraper;

// Re-export commonly used types for convenience
pub use catalog::{CatalogStore, EntityKind, SqliteCatalogStore};
pub use config::{AppConfig, CliConfig, FileConfig, ScraperSettings, TransportMode};
pub use scraper::{
    build_fetcher, PageFetcher, PageRef, Reconciler, ScrapeDriver, ScrapeError, ScrapeOutcome,
};
