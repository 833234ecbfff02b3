mod file_config;

pub use file_config::{FileConfig, ScraperConfig};

use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

/// Browser identities used by the direct proxy transport when the
/// configuration doesn't supply its own pool.
const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
];

const DEFAULT_MARKETPLACE_HOST: &str = "www.beatport.com";
const DEFAULT_GATEWAY_URL: &str = "https://app.scrapingbee.com/api/v1/";

/// How outbound page fetches are transported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Direct requests through a rotating proxy with randomized user agents.
    #[default]
    Proxy,
    /// Requests through a managed scraping gateway API.
    Gateway,
}

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub transport: TransportMode,
    pub proxy_url: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub scraper: ScraperSettings,
}

/// Resolved scraping pipeline settings.
#[derive(Debug, Clone)]
pub struct ScraperSettings {
    pub transport: TransportMode,
    pub marketplace_host: String,
    pub proxy_url: Option<String>,
    pub proxy_username: Option<String>,
    pub proxy_password: Option<String>,
    pub user_agents: Vec<String>,
    pub gateway_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub delay_increment_ms: u64,
}

impl Default for ScraperSettings {
    fn default() -> Self {
        Self {
            transport: TransportMode::Proxy,
            marketplace_host: DEFAULT_MARKETPLACE_HOST.to_string(),
            proxy_url: None,
            proxy_username: None,
            proxy_password: None,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            api_key: None,
            timeout_secs: 30,
            max_attempts: 3,
            delay_min_ms: 2000,
            delay_max_ms: 4000,
            delay_increment_ms: 5000,
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified via --db or in config file")
            })?;

        let defaults = ScraperSettings::default();
        let scraper_file = file.scraper.unwrap_or_default();

        let transport = scraper_file
            .transport
            .and_then(|s| parse_transport(&s))
            .unwrap_or(cli.transport);

        let scraper = ScraperSettings {
            transport,
            marketplace_host: scraper_file
                .marketplace_host
                .unwrap_or(defaults.marketplace_host),
            proxy_url: scraper_file.proxy_url.or_else(|| cli.proxy_url.clone()),
            proxy_username: scraper_file
                .proxy_username
                .or_else(|| cli.proxy_username.clone()),
            proxy_password: scraper_file
                .proxy_password
                .or_else(|| cli.proxy_password.clone()),
            user_agents: scraper_file.user_agents.unwrap_or(defaults.user_agents),
            gateway_url: scraper_file.gateway_url.unwrap_or(defaults.gateway_url),
            api_key: scraper_file.api_key.or_else(|| cli.api_key.clone()),
            timeout_secs: scraper_file.timeout_secs.unwrap_or(defaults.timeout_secs),
            max_attempts: scraper_file.max_attempts.unwrap_or(defaults.max_attempts),
            delay_min_ms: scraper_file.delay_min_ms.unwrap_or(defaults.delay_min_ms),
            delay_max_ms: scraper_file.delay_max_ms.unwrap_or(defaults.delay_max_ms),
            delay_increment_ms: scraper_file
                .delay_increment_ms
                .unwrap_or(defaults.delay_increment_ms),
        };

        if scraper.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if scraper.delay_min_ms > scraper.delay_max_ms {
            bail!(
                "delay_min_ms ({}) must not exceed delay_max_ms ({})",
                scraper.delay_min_ms,
                scraper.delay_max_ms
            );
        }

        Ok(Self { db_path, scraper })
    }
}

/// Parses a transport mode string using clap's ValueEnum trait.
fn parse_transport(s: &str) -> Option<TransportMode> {
    TransportMode::from_str(s, true).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transport() {
        assert!(matches!(parse_transport("proxy"), Some(TransportMode::Proxy)));
        assert!(matches!(
            parse_transport("gateway"),
            Some(TransportMode::Gateway)
        ));
        // Case insensitive
        assert!(matches!(
            parse_transport("GATEWAY"),
            Some(TransportMode::Gateway)
        ));
        // Invalid
        assert!(parse_transport("carrier-pigeon").is_none());
    }

    #[test]
    fn test_resolve_cli_only() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/data/catalog.db")),
            transport: TransportMode::Proxy,
            proxy_url: Some("http://proxy.example.com:8000".to_string()),
            proxy_username: Some("user".to_string()),
            proxy_password: Some("pass".to_string()),
            api_key: None,
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_path, PathBuf::from("/data/catalog.db"));
        assert_eq!(config.scraper.transport, TransportMode::Proxy);
        assert_eq!(
            config.scraper.proxy_url.as_deref(),
            Some("http://proxy.example.com:8000")
        );
        assert_eq!(config.scraper.marketplace_host, "www.beatport.com");
        assert_eq!(config.scraper.max_attempts, 3);
        assert_eq!(config.scraper.delay_min_ms, 2000);
        assert_eq!(config.scraper.delay_max_ms, 4000);
        assert!(!config.scraper.user_agents.is_empty());
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/should/be/overridden")),
            transport: TransportMode::Proxy,
            ..Default::default()
        };

        let file_config = FileConfig {
            db_path: Some("/toml/catalog.db".to_string()),
            scraper: Some(ScraperConfig {
                transport: Some("gateway".to_string()),
                api_key: Some("secret".to_string()),
                timeout_secs: Some(60),
                ..Default::default()
            }),
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.db_path, PathBuf::from("/toml/catalog.db"));
        assert_eq!(config.scraper.transport, TransportMode::Gateway);
        assert_eq!(config.scraper.api_key.as_deref(), Some("secret"));
        assert_eq!(config.scraper.timeout_secs, 60);
        // Defaults used when neither specifies
        assert_eq!(config.scraper.delay_increment_ms, 5000);
    }

    #[test]
    fn test_resolve_missing_db_path_error() {
        let cli = CliConfig::default();
        let result = AppConfig::resolve(&cli, None);
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_path must be specified"));
    }

    #[test]
    fn test_resolve_rejects_inverted_delay_window() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/data/catalog.db")),
            ..Default::default()
        };
        let file_config = FileConfig {
            scraper: Some(ScraperConfig {
                delay_min_ms: Some(5000),
                delay_max_ms: Some(1000),
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = AppConfig::resolve(&cli, Some(file_config));
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_rejects_zero_attempts() {
        let cli = CliConfig {
            db_path: Some(PathBuf::from("/data/catalog.db")),
            ..Default::default()
        };
        let file_config = FileConfig {
            scraper: Some(ScraperConfig {
                max_attempts: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = AppConfig::resolve(&cli, Some(file_config));
        assert!(result.is_err());
    }
}
