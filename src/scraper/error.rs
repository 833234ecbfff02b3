use thiserror::Error;

/// Error taxonomy for a single fetch-and-parse cycle.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The identifier cannot correspond to a marketplace page.
    #[error("Invalid identifier")]
    InvalidIdentifier,

    /// The marketplace answered 404. Definitive, never retried.
    #[error("Page not found upstream")]
    NotFound,

    /// Network failure, timeout, or non-success status. Worth retrying.
    #[error("Transient fetch failure: {0}")]
    Transient(String),

    /// The page came back but its structure didn't match expectations.
    /// Retried, since marketplaces occasionally serve interstitial pages.
    #[error("Failed to parse page: {0}")]
    Parse(String),

    /// The configured transport is unusable (missing credentials etc.).
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),
}

impl ScrapeError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ScrapeError::Transient(_) | ScrapeError::Parse(_))
    }
}

impl From<reqwest::Error> for ScrapeError {
    fn from(e: reqwest::Error) -> Self {
        ScrapeError::Transient(e.to_string())
    }
}
