use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cratedigger::catalog::{CatalogStore, SqliteCatalogStore};
use cratedigger::config::{AppConfig, CliConfig, FileConfig, TransportMode};
use cratedigger::scraper::reconcile::NotAttemptedReason;
use cratedigger::scraper::{
    build_fetcher, enqueue_request, Reconciler, ScrapeDriver, ScrapeOutcome,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Resolve a CLI path argument, tolerating paths that don't exist yet
/// (the catalog database is created on first open).
fn parse_path(s: &str) -> Result<PathBuf> {
    let path = PathBuf::from(s);
    let resolved = match path.canonicalize() {
        Ok(canonical) => canonical,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => path,
        Err(e) => return Err(e).with_context(|| format!("Error resolving path: {}", s)),
    };
    if resolved.is_absolute() {
        Ok(resolved)
    } else {
        Ok(std::env::current_dir()?.join(resolved))
    }
}

#[derive(Parser, Debug)]
#[clap(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")"))]
struct CliArgs {
    /// Path to the SQLite catalog database file.
    #[clap(long, value_parser = parse_path)]
    pub db: Option<PathBuf>,

    /// Path to a TOML config file. Values in it override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Transport for outbound page fetches.
    #[clap(long, value_enum, default_value_t = TransportMode::Proxy)]
    pub transport: TransportMode,

    /// Rotating proxy endpoint for the proxy transport.
    #[clap(long)]
    pub proxy_url: Option<String>,

    /// Username for proxy authentication.
    #[clap(long)]
    pub proxy_username: Option<String>,

    /// Password for proxy authentication.
    #[clap(long)]
    pub proxy_password: Option<String>,

    /// API key for the gateway transport.
    #[clap(long)]
    pub api_key: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape one track by its marketplace id.
    Track {
        id: i64,
        /// URL slug, when known. Speeds nothing up but makes nicer URLs.
        #[clap(long)]
        slug: Option<String>,
    },
    /// Scrape one artist by its marketplace id.
    Artist {
        id: i64,
        #[clap(long)]
        slug: Option<String>,
    },
    /// Scrape one genre by its marketplace id.
    Genre {
        id: i64,
        #[clap(long)]
        slug: Option<String>,
    },
    /// Scrape one label by its marketplace id.
    Label {
        id: i64,
        #[clap(long)]
        slug: Option<String>,
    },
    /// Queue a track id for a later backlog sweep.
    Request {
        id: i64,
        /// User to associate with the request.
        #[clap(long)]
        user: Option<String>,
    },
    /// Try randomly sampled unknown track ids.
    Random {
        /// Number of ids to attempt.
        #[clap(default_value_t = 10)]
        iterations: u32,
    },
    /// Run the three-phase backlog sweep.
    Backlog {
        /// Total reconciliation budget for the sweep.
        #[clap(default_value_t = 50)]
        max_items: u32,
    },
}

fn report_outcome(what: &str, id: i64, outcome: ScrapeOutcome) {
    match outcome {
        ScrapeOutcome::Populated { newly_resolved: true } => {
            info!("{} {} populated", what, id)
        }
        ScrapeOutcome::Populated { newly_resolved: false } => {
            info!("{} {} already up to date", what, id)
        }
        ScrapeOutcome::NotFound => warn!("{} {} does not exist upstream", what, id),
        ScrapeOutcome::NotAttempted(NotAttemptedReason::InvalidIdentifier) => {
            warn!("{} {} is not a valid marketplace id", what, id)
        }
        ScrapeOutcome::NotAttempted(NotAttemptedReason::KnownMissing) => {
            warn!("{} {} was confirmed missing on a previous run", what, id)
        }
        ScrapeOutcome::Abandoned | ScrapeOutcome::Failed => {
            warn!("Scraping {} {} failed", what, id)
        }
    }
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db.clone(),
        transport: cli_args.transport,
        proxy_url: cli_args.proxy_url.clone(),
        proxy_username: cli_args.proxy_username.clone(),
        proxy_password: cli_args.proxy_password.clone(),
        api_key: cli_args.api_key.clone(),
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    let store = Arc::new(SqliteCatalogStore::new(&config.db_path)?);
    info!(
        "Catalog holds {} artists, {} genres, {} labels, {} tracks",
        store.count_artists()?,
        store.count_genres()?,
        store.count_labels()?,
        store.count_tracks()?
    );

    // The queueing command doesn't need a working transport.
    if let Command::Request { id, user } = &cli_args.command {
        if enqueue_request(store.as_ref(), *id, user.as_deref())? {
            info!("Queued track {} for the next backlog sweep", id);
        }
        return Ok(());
    }

    let fetcher = build_fetcher(&config.scraper).context("Failed to build page fetcher")?;
    let reconciler = Reconciler::new(store.clone(), fetcher, config.scraper.max_attempts);

    match cli_args.command {
        Command::Track { id, slug } => {
            let outcome = reconciler.scrape_track(id, slug.as_deref())?;
            report_outcome("track", id, outcome);
        }
        Command::Artist { id, slug } => {
            let outcome = reconciler.scrape_artist(id, slug.as_deref())?;
            report_outcome("artist", id, outcome);
        }
        Command::Genre { id, slug } => {
            let outcome = reconciler.scrape_genre(id, slug.as_deref())?;
            report_outcome("genre", id, outcome);
        }
        Command::Label { id, slug } => {
            let outcome = reconciler.scrape_label(id, slug.as_deref())?;
            report_outcome("label", id, outcome);
        }
        Command::Random { iterations } => {
            let driver = ScrapeDriver::new(store, reconciler);
            let summary = driver.random_scraper(iterations)?;
            println!("{}", summary);
        }
        Command::Backlog { max_items } => {
            let driver = ScrapeDriver::new(store, reconciler);
            let report = driver.process_backlog(max_items)?;
            info!(
                "Backlog sweep done: {} refreshed, {} backlog entries, {} discovered{}",
                report.refreshed,
                report.backlog_processed,
                report.discovered,
                if report.aborted { " (aborted early)" } else { "" }
            );
        }
        Command::Request { .. } => unreachable!(),
    }

    Ok(())
}
