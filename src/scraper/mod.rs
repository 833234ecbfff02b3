pub mod discovery;
pub mod error;
pub mod fetch;
pub mod page;
pub mod parse;
pub mod reconcile;

pub use discovery::{enqueue_request, BacklogReport, ScrapeDriver, DEFAULT_ID_CEILING};
pub use error::ScrapeError;
pub use fetch::{build_fetcher, PageFetcher};
pub use page::{PageRef, UrlScheme};
pub use reconcile::{LinkResolution, Reconciler, ScrapeOutcome};
