use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Url};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::models::Page;

const REQUEST_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Fetches a page and reports the URL the response resolved to.
pub trait PageFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Page, FetchError>> + Send;
}

/// reqwest-backed fetcher that spaces out requests to the same origin.
pub struct HttpFetcher {
    client: Client,
    delay: Duration,
    next_slot: Mutex<HashMap<String, Instant>>,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, delay: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(user_agent)
            .build()?;
        Ok(Self {
            client,
            delay,
            next_slot: Mutex::new(HashMap::new()),
        })
    }

    /// Reserves the next dispatch slot for `origin` and sleeps until it arrives.
    async fn wait_for_turn(&self, origin: &str) {
        let wait = {
            let mut slots = self.next_slot.lock().await;
            let now = Instant::now();
            let slot = slots.get(origin).map_or(now, |next| (*next).max(now));
            slots.insert(origin.to_string(), slot + self.delay);
            slot - now
        };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}

impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
        let parsed = Url::parse(url).map_err(|err| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        self.wait_for_turn(&parsed.origin().ascii_serialization())
            .await;

        tracing::debug!(%url, "fetching page");
        let response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let resolved = response.url().to_string();
        let html = response.text().await?;
        Ok(Page {
            url: resolved,
            html,
        })
    }
}
