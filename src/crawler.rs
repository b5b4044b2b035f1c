//! Listing/detail crawl loop.
//!
//! Listing pages are walked one after another; each scan decides whether the next
//! listing page is scheduled. Detail pages are fetched concurrently, bounded by
//! `max_in_flight`, and every accepted record is sent on the output channel. A failed
//! or panicking task is logged and counted without affecting the rest of the crawl.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::CrawlConfig;
use crate::fetch::{FetchError, PageFetcher};
use crate::models::{EventRecord, ListingCandidate};
use crate::relevance::DateWindow;
use crate::scraping::{EventSource, ListingScan};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlStats {
    pub listing_pages: usize,
    pub detail_pages: usize,
    pub emitted: usize,
    pub dropped: usize,
    pub failed: usize,
    pub stopped_at_cutoff: bool,
    pub budget_exhausted: bool,
}

enum Task {
    Listing(String),
    Detail(ListingCandidate),
}

enum TaskOutcome {
    Listing {
        url: String,
        scan: ListingScan,
    },
    Detail {
        record: EventRecord,
        accepted: bool,
    },
    Failed {
        url: String,
        listing: bool,
        error: FetchError,
    },
}

pub struct Crawler<F: PageFetcher> {
    fetcher: Arc<F>,
    source: Arc<dyn EventSource>,
    window: DateWindow,
    max_pages: usize,
    max_in_flight: usize,
}

impl<F: PageFetcher> Crawler<F> {
    pub fn new(
        fetcher: Arc<F>,
        source: Arc<dyn EventSource>,
        window: DateWindow,
        config: &CrawlConfig,
    ) -> Self {
        Self {
            fetcher,
            source,
            window,
            max_pages: config.max_pages,
            max_in_flight: config.max_in_flight.max(1),
        }
    }

    pub fn window(&self) -> DateWindow {
        self.window
    }

    /// Runs the crawl to completion, sending accepted records on `tx`.
    ///
    /// Stops early if the receiver is dropped.
    pub async fn run(&self, tx: mpsc::Sender<EventRecord>) -> CrawlStats {
        let mut stats = CrawlStats::default();
        let mut queue = VecDeque::from([Task::Listing(self.source.start_url().to_string())]);
        let mut seen_details = HashSet::new();
        let mut tasks = JoinSet::new();
        let mut dispatched = 0usize;

        tracing::info!(
            start = %self.source.start_url(),
            today = %self.window.today(),
            cutoff = %self.window.cutoff(),
            "starting crawl"
        );

        loop {
            while tasks.len() < self.max_in_flight {
                let Some(task) = queue.pop_front() else {
                    break;
                };
                if dispatched >= self.max_pages {
                    tracing::info!(
                        max_pages = self.max_pages,
                        skipped = queue.len() + 1,
                        "page budget exhausted"
                    );
                    stats.budget_exhausted = true;
                    queue.clear();
                    break;
                }
                dispatched += 1;
                tasks.spawn(self.execute(task));
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(error = %err, "crawl task aborted");
                    stats.failed += 1;
                    continue;
                }
            };

            match outcome {
                TaskOutcome::Listing { url, scan } => {
                    stats.listing_pages += 1;
                    stats.stopped_at_cutoff |= scan.stopped_at_cutoff;
                    let mut scheduled = 0usize;
                    for candidate in scan.candidates {
                        if seen_details.insert(candidate.url.clone()) {
                            queue.push_back(Task::Detail(candidate));
                            scheduled += 1;
                        }
                    }
                    tracing::info!(%url, scheduled, "scanned listing page");
                    if let Some(next) = scan.next_page {
                        queue.push_back(Task::Listing(next));
                    }
                }
                TaskOutcome::Detail { record, accepted } => {
                    stats.detail_pages += 1;
                    if !accepted {
                        tracing::debug!(
                            url = %record.event_url,
                            start_date = ?record.start_date,
                            "dropping event outside date window"
                        );
                        stats.dropped += 1;
                        continue;
                    }
                    if tx.send(record).await.is_err() {
                        tracing::warn!("record receiver closed, aborting crawl");
                        tasks.abort_all();
                        break;
                    }
                    stats.emitted += 1;
                }
                TaskOutcome::Failed {
                    url,
                    listing,
                    error,
                } => {
                    tracing::warn!(%url, listing, error = %error, "fetch failed");
                    stats.failed += 1;
                }
            }
        }

        tracing::info!(?stats, "crawl finished");
        stats
    }

    /// Runs the crawl and gathers every accepted record.
    pub async fn collect(&self) -> (Vec<EventRecord>, CrawlStats) {
        let (tx, mut rx) = mpsc::channel(64);
        let gather = async move {
            let mut records = Vec::new();
            while let Some(record) = rx.recv().await {
                records.push(record);
            }
            records
        };
        let (stats, records) = tokio::join!(self.run(tx), gather);
        (records, stats)
    }

    fn execute(&self, task: Task) -> impl Future<Output = TaskOutcome> + Send + 'static {
        let fetcher = Arc::clone(&self.fetcher);
        let source = Arc::clone(&self.source);
        let window = self.window;
        async move {
            match task {
                Task::Listing(url) => match fetcher.fetch(&url).await {
                    Ok(page) => TaskOutcome::Listing {
                        scan: source.scan_listing(&page, &window),
                        url: page.url,
                    },
                    Err(error) => TaskOutcome::Failed {
                        url,
                        listing: true,
                        error,
                    },
                },
                Task::Detail(candidate) => match fetcher.fetch(&candidate.url).await {
                    Ok(page) => {
                        let record = source.extract_detail(&page);
                        let accepted = window.accepts_start_date(record.start_date.as_deref());
                        TaskOutcome::Detail { record, accepted }
                    }
                    Err(error) => TaskOutcome::Failed {
                        url: candidate.url,
                        listing: false,
                        error,
                    },
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::models::Page;
    use crate::scraping::allevents_html::AllEvents;

    const LISTING: &str = "https://allevents.in/bangalore/all";

    #[derive(Default)]
    struct FakeFetcher {
        pages: HashMap<String, String>,
        fetched: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn with_page(mut self, url: &str, html: String) -> Self {
            self.pages.insert(url.to_string(), html);
            self
        }

        fn fetched(&self) -> Vec<String> {
            self.fetched.lock().expect("fetch log").clone()
        }
    }

    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
            self.fetched.lock().expect("fetch log").push(url.to_string());
            match self.pages.get(url) {
                Some(html) => Ok(Page {
                    url: url.to_string(),
                    html: html.clone(),
                }),
                None => Err(FetchError::Status {
                    status: 404,
                    url: url.to_string(),
                }),
            }
        }
    }

    /// Records the peak number of fetches running at once.
    #[derive(Default)]
    struct GaugedFetcher {
        inner: FakeFetcher,
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl PageFetcher for GaugedFetcher {
        async fn fetch(&self, url: &str) -> Result<Page, FetchError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            let result = self.inner.fetch(url).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 5, 20).expect("date")
    }

    fn card(slug: &str, id: u32, label: &str) -> String {
        format!(r#"<a href="https://allevents.in/bangalore/{slug}/{id}">{label}</a>"#)
    }

    fn listing(cards: &[String]) -> String {
        format!("<html><body>{}</body></html>", cards.join("\n"))
    }

    fn detail(name: &str, start: Option<NaiveDate>) -> String {
        let block = start
            .map(|date| {
                format!(
                    r#"<script type="application/ld+json">{{"@type": "Event", "startDate": "{}T19:00:00"}}</script>"#,
                    date.format("%Y-%m-%d")
                )
            })
            .unwrap_or_default();
        format!("<html><head>{block}</head><body><h1>{name}</h1></body></html>")
    }

    fn detail_url(slug: &str, id: u32) -> String {
        format!("https://allevents.in/bangalore/{slug}/{id}")
    }

    fn crawler(fetcher: FakeFetcher, config: CrawlConfig) -> (Crawler<FakeFetcher>, Arc<FakeFetcher>) {
        let fetcher = Arc::new(fetcher);
        let crawler = Crawler::new(
            Arc::clone(&fetcher),
            Arc::new(AllEvents::default()),
            DateWindow::new(today(), config.max_days_ahead),
            &config,
        );
        (crawler, fetcher)
    }

    fn names(records: &[EventRecord]) -> Vec<String> {
        let mut names: Vec<String> = records.iter().map(EventRecord::title).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn cutoff_card_halts_scan_and_pagination() {
        let soon = today() + Duration::days(3);
        let fetcher = FakeFetcher::default()
            .with_page(
                LISTING,
                listing(&[
                    card("jazz", 1, "Jazz 23 May"),
                    r#"<a href="https://allevents.in/bangalore/about">About</a>"#.to_string(),
                    card("expo", 2, "Expo 10 Jul"),
                    card("comedy", 3, "Comedy 24 May"),
                ]),
            )
            .with_page(&format!("{LISTING}?page=2"), listing(&[card("later", 4, "Later 25 May")]))
            .with_page(&detail_url("jazz", 1), detail("Jazz", Some(soon)))
            .with_page(&detail_url("comedy", 3), detail("Comedy", Some(soon)));

        let (crawler, fetcher) = crawler(fetcher, CrawlConfig::default());
        let (records, stats) = crawler.collect().await;

        assert_eq!(names(&records), vec!["Jazz"]);
        assert!(stats.stopped_at_cutoff);
        assert_eq!(stats.listing_pages, 1);
        let fetched = fetcher.fetched();
        assert!(fetched.contains(&detail_url("jazz", 1)));
        assert!(!fetched.contains(&detail_url("expo", 2)));
        assert!(!fetched.contains(&detail_url("comedy", 3)));
        assert!(!fetched.iter().any(|url| url.ends_with("/about")));
        assert!(!fetched.iter().any(|url| url.contains("page=2")));
    }

    #[tokio::test]
    async fn paginates_until_listing_fetch_fails() {
        let soon = today() + Duration::days(1);
        let fetcher = FakeFetcher::default()
            .with_page(LISTING, listing(&[card("one", 1, "One 21 May")]))
            .with_page(&format!("{LISTING}?page=2"), listing(&[card("two", 2, "Two 22 May")]))
            .with_page(&detail_url("one", 1), detail("One", Some(soon)))
            .with_page(&detail_url("two", 2), detail("Two", Some(soon)));

        let (crawler, fetcher) = crawler(fetcher, CrawlConfig::default());
        let (records, stats) = crawler.collect().await;

        assert_eq!(names(&records), vec!["One", "Two"]);
        assert_eq!(stats.listing_pages, 2);
        assert_eq!(stats.failed, 1);
        assert!(!stats.stopped_at_cutoff);
        assert!(fetcher.fetched().contains(&format!("{LISTING}?page=3")));
        assert!(!fetcher.fetched().contains(&format!("{LISTING}?page=4")));
    }

    #[tokio::test]
    async fn authoritative_filter_gates_emission() {
        let cases = [
            ("yesterday", 1, Some(today() - Duration::days(1))),
            ("today", 2, Some(today())),
            ("edge", 3, Some(today() + Duration::days(30))),
            ("beyond", 4, Some(today() + Duration::days(31))),
            ("undated", 5, None),
        ];
        let cards: Vec<String> = cases.iter().map(|(slug, id, _)| card(slug, *id, slug)).collect();
        let mut fetcher = FakeFetcher::default()
            .with_page(LISTING, listing(&cards))
            .with_page(&format!("{LISTING}?page=2"), listing(&[]));
        for (slug, id, start) in cases {
            fetcher = fetcher.with_page(&detail_url(slug, id), detail(slug, start));
        }

        let (crawler, _) = crawler(fetcher, CrawlConfig::default());
        let (records, stats) = crawler.collect().await;

        assert_eq!(names(&records), vec!["edge", "today"]);
        assert_eq!(stats.emitted, 2);
        assert_eq!(stats.dropped, 3);
        assert_eq!(stats.detail_pages, 5);
    }

    #[tokio::test]
    async fn failed_detail_does_not_stop_the_crawl() {
        let soon = today() + Duration::days(2);
        let fetcher = FakeFetcher::default()
            .with_page(
                LISTING,
                listing(&[card("missing", 1, "Missing"), card("ok", 2, "Ok")]),
            )
            .with_page(&format!("{LISTING}?page=2"), listing(&[card("next", 3, "Next")]))
            .with_page(&detail_url("ok", 2), detail("Ok", Some(soon)))
            .with_page(&detail_url("next", 3), detail("Next", Some(soon)));

        let (crawler, _) = crawler(fetcher, CrawlConfig::default());
        let (records, stats) = crawler.collect().await;

        assert_eq!(names(&records), vec!["Next", "Ok"]);
        // detail "missing" and listing page 3
        assert_eq!(stats.failed, 2);
    }

    #[tokio::test]
    async fn page_budget_bounds_dispatches() {
        let soon = today() + Duration::days(2);
        let fetcher = FakeFetcher::default()
            .with_page(
                LISTING,
                listing(&[card("a", 1, "A"), card("b", 2, "B"), card("c", 3, "C")]),
            )
            .with_page(&detail_url("a", 1), detail("A", Some(soon)))
            .with_page(&detail_url("b", 2), detail("B", Some(soon)))
            .with_page(&detail_url("c", 3), detail("C", Some(soon)));

        let config = CrawlConfig {
            max_pages: 3,
            ..CrawlConfig::default()
        };
        let (crawler, fetcher) = crawler(fetcher, config);
        let (records, stats) = crawler.collect().await;

        assert_eq!(fetcher.fetched().len(), 3);
        assert_eq!(names(&records), vec!["A", "B"]);
        assert!(stats.budget_exhausted);
    }

    #[tokio::test]
    async fn repeated_detail_links_are_fetched_once() {
        let soon = today() + Duration::days(2);
        let fetcher = FakeFetcher::default()
            .with_page(
                LISTING,
                listing(&[card("jazz", 1, "Jazz"), card("jazz", 1, "Jazz poster")]),
            )
            .with_page(&format!("{LISTING}?page=2"), listing(&[card("jazz", 1, "Jazz again")]))
            .with_page(&detail_url("jazz", 1), detail("Jazz", Some(soon)));

        let config = CrawlConfig {
            max_in_flight: 1,
            ..CrawlConfig::default()
        };
        let (crawler, fetcher) = crawler(fetcher, config);
        let (records, _) = crawler.collect().await;

        assert_eq!(records.len(), 1);
        let detail_fetches = fetcher
            .fetched()
            .iter()
            .filter(|url| **url == detail_url("jazz", 1))
            .count();
        assert_eq!(detail_fetches, 1);
    }

    #[tokio::test]
    async fn month_like_title_words_do_not_stop_pagination() {
        let soon = today() + Duration::days(2);
        let fetcher = FakeFetcher::default()
            .with_page(
                LISTING,
                listing(&[
                    card("open-mic", 1, "Open Mic Wed, 21 May"),
                    card("swing", 2, "Jazz: 5 Decades of Swing Thu, 22 May"),
                    card("comedy", 3, "Comedy Fri, 23 May"),
                ]),
            )
            .with_page(&format!("{LISTING}?page=2"), listing(&[card("later", 4, "Later 24 May")]))
            .with_page(&detail_url("open-mic", 1), detail("Open Mic", Some(soon)))
            .with_page(&detail_url("swing", 2), detail("Swing", Some(soon)))
            .with_page(&detail_url("comedy", 3), detail("Comedy", Some(soon)))
            .with_page(&detail_url("later", 4), detail("Later", Some(soon)));

        let (crawler, fetcher) = crawler(fetcher, CrawlConfig::default());
        let (records, stats) = crawler.collect().await;

        assert_eq!(names(&records), vec!["Comedy", "Later", "Open Mic", "Swing"]);
        assert!(!stats.stopped_at_cutoff);
        assert!(fetcher.fetched().contains(&format!("{LISTING}?page=2")));
    }

    #[tokio::test]
    async fn in_flight_fetches_never_exceed_limit() {
        let soon = today() + Duration::days(2);
        let slugs = ["a", "b", "c", "d", "e", "f"];
        let cards: Vec<String> = (1..)
            .zip(slugs)
            .map(|(id, slug)| card(slug, id, slug))
            .collect();
        let mut inner = FakeFetcher::default().with_page(LISTING, listing(&cards));
        for (id, slug) in (1..).zip(slugs) {
            inner = inner.with_page(&detail_url(slug, id), detail(slug, Some(soon)));
        }
        let fetcher = Arc::new(GaugedFetcher {
            inner,
            ..GaugedFetcher::default()
        });

        let config = CrawlConfig {
            max_in_flight: 2,
            ..CrawlConfig::default()
        };
        let crawler = Crawler::new(
            Arc::clone(&fetcher),
            Arc::new(AllEvents::default()),
            DateWindow::new(today(), config.max_days_ahead),
            &config,
        );
        let (records, stats) = crawler.collect().await;

        assert_eq!(records.len(), slugs.len());
        assert_eq!(stats.detail_pages, slugs.len());
        assert_eq!(fetcher.peak.load(Ordering::SeqCst), 2);
        assert_eq!(fetcher.running.load(Ordering::SeqCst), 0);
    }
}
