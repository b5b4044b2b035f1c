pub mod config;
pub mod crawler;
pub mod db;
pub mod fetch;
pub mod models;
pub mod relevance;
pub mod scraping;

use std::sync::Arc;

use anyhow::{Context, Result};

pub use config::CrawlConfig;
pub use crawler::{CrawlStats, Crawler};
pub use db::Store;
pub use fetch::{FetchError, HttpFetcher, PageFetcher};
pub use models::{Coordinates, EventRecord, ListingCandidate, Page};
pub use relevance::{CardVerdict, DateWindow};
pub use scraping::allevents_html::AllEvents;
pub use scraping::EventSource;

/// Crawler over the live site, with "today" fixed now in the source's timezone.
pub fn http_crawler(config: &CrawlConfig) -> Result<Crawler<HttpFetcher>> {
    let fetcher = HttpFetcher::new(&config.user_agent, config.request_delay())
        .context("unable to build http client")?;
    let source = AllEvents::new(&config.city, &config.source);
    let window = DateWindow::starting_now(source.timezone(), config.max_days_ahead);
    Ok(Crawler::new(
        Arc::new(fetcher),
        Arc::new(source),
        window,
        config,
    ))
}
