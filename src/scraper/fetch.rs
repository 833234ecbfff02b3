//! Page fetch transports.
//!
//! Two interchangeable transports sit behind the [`PageFetcher`] trait: a
//! direct transport going through a rotating residential proxy with a
//! randomized browser identity, and a managed scraping gateway that handles
//! anti-bot measures server-side. The transport is chosen once, from
//! configuration, when the fetcher is built.

use super::error::ScrapeError;
use super::page::{PageRef, UrlScheme};
use crate::config::{ScraperSettings, TransportMode};
use rand::seq::IndexedRandom;
use rand::Rng;
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use reqwest::{Proxy, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Fetches the raw HTML of a marketplace page.
///
/// `attempt` is zero-based and only influences pacing: later attempts wait
/// longer before going out.
pub trait PageFetcher {
    fn fetch(&self, page: &PageRef, attempt: u32) -> Result<String, ScrapeError>;
}

/// Jittered inter-request pacing.
///
/// Every request waits a random base delay, plus a fixed increment per
/// prior failed attempt so retries back off.
#[derive(Debug, Clone)]
pub struct DelayPolicy {
    pub min_ms: u64,
    pub max_ms: u64,
    pub increment_ms: u64,
}

impl DelayPolicy {
    fn from_settings(settings: &ScraperSettings) -> Self {
        Self {
            min_ms: settings.delay_min_ms,
            max_ms: settings.delay_max_ms,
            increment_ms: settings.delay_increment_ms,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base = if self.max_ms > self.min_ms {
            rand::rng().random_range(self.min_ms..=self.max_ms)
        } else {
            self.min_ms
        };
        Duration::from_millis(base + self.increment_ms * attempt as u64)
    }

    #[cfg(not(feature = "no_delay"))]
    fn wait(&self, attempt: u32) {
        std::thread::sleep(self.delay_for(attempt));
    }

    #[cfg(feature = "no_delay")]
    fn wait(&self, _attempt: u32) {}
}

fn status_to_error(status: StatusCode, page: &PageRef) -> ScrapeError {
    if status == StatusCode::NOT_FOUND {
        debug!("Page {} not found upstream", page);
        ScrapeError::NotFound
    } else {
        warn!("Fetching {} returned status {}", page, status);
        ScrapeError::Transient(format!("unexpected status {}", status))
    }
}

/// Direct transport: every request goes out through a rotating proxy
/// endpoint with a browser identity drawn at random per request.
pub struct DirectProxyFetcher {
    client: Client,
    host: String,
    user_agents: Vec<String>,
    delay: DelayPolicy,
}

impl DirectProxyFetcher {
    fn new(settings: &ScraperSettings) -> Result<Self, ScrapeError> {
        let proxy_url = settings
            .proxy_url
            .as_deref()
            .ok_or_else(|| ScrapeError::UnsupportedTransport("proxy_url is not set".into()))?;
        if settings.user_agents.is_empty() {
            return Err(ScrapeError::UnsupportedTransport(
                "user_agents pool is empty".into(),
            ));
        }

        let mut proxy = Proxy::all(proxy_url)
            .map_err(|e| ScrapeError::UnsupportedTransport(format!("invalid proxy url: {}", e)))?;
        if let (Some(user), Some(pass)) = (
            settings.proxy_username.as_deref(),
            settings.proxy_password.as_deref(),
        ) {
            proxy = proxy.basic_auth(user, pass);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .proxy(proxy)
            .build()
            .map_err(|e| ScrapeError::UnsupportedTransport(e.to_string()))?;

        Ok(Self {
            client,
            host: settings.marketplace_host.clone(),
            user_agents: settings.user_agents.clone(),
            delay: DelayPolicy::from_settings(settings),
        })
    }
}

impl PageFetcher for DirectProxyFetcher {
    fn fetch(&self, page: &PageRef, attempt: u32) -> Result<String, ScrapeError> {
        self.delay.wait(attempt);

        // The proxy rotates exit nodes per connection; pair that with a
        // fresh browser identity each request.
        let user_agent = self
            .user_agents
            .choose(&mut rand::rng())
            .cloned()
            .unwrap_or_default();
        let url = page.url(UrlScheme::Http, &self.host);
        debug!("Fetching {} via proxy (attempt {})", url, attempt);

        let response = self.client.get(&url).header(USER_AGENT, user_agent).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_to_error(status, page));
        }
        Ok(response.text()?)
    }
}

/// Gateway transport: requests go to a managed scraping API that fetches
/// the target on our behalf.
pub struct ManagedGatewayFetcher {
    client: Client,
    gateway_url: String,
    api_key: String,
    host: String,
    delay: DelayPolicy,
}

impl ManagedGatewayFetcher {
    fn new(settings: &ScraperSettings) -> Result<Self, ScrapeError> {
        let api_key = settings
            .api_key
            .as_deref()
            .ok_or_else(|| ScrapeError::UnsupportedTransport("api_key is not set".into()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ScrapeError::UnsupportedTransport(e.to_string()))?;

        Ok(Self {
            client,
            gateway_url: settings.gateway_url.clone(),
            api_key: api_key.to_string(),
            host: settings.marketplace_host.clone(),
            delay: DelayPolicy::from_settings(settings),
        })
    }
}

impl PageFetcher for ManagedGatewayFetcher {
    fn fetch(&self, page: &PageRef, attempt: u32) -> Result<String, ScrapeError> {
        self.delay.wait(attempt);

        let target = page.url(UrlScheme::Https, &self.host);
        debug!("Fetching {} via gateway (attempt {})", target, attempt);

        let response = self
            .client
            .get(&self.gateway_url)
            .query(&[("api_key", self.api_key.as_str()), ("url", target.as_str())])
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_to_error(status, page));
        }
        Ok(response.text()?)
    }
}

/// Build the fetcher named by the configuration.
pub fn build_fetcher(settings: &ScraperSettings) -> Result<Box<dyn PageFetcher>, ScrapeError> {
    match settings.transport {
        TransportMode::Proxy => Ok(Box::new(DirectProxyFetcher::new(settings)?)),
        TransportMode::Gateway => Ok(Box::new(ManagedGatewayFetcher::new(settings)?)),
    }
}
