use chrono::Utc;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::base;
use super::resolve::{self, DetailContext};
use super::structured::{self, StructuredEventBlock};
use super::{EventSource, ListingScan};
use crate::models::{EventRecord, ListingCandidate, Page};
use crate::relevance::{CardVerdict, DateWindow};

pub const DEFAULT_CITY: &str = "Bangalore";
pub const DEFAULT_SOURCE: &str = "allevents.in";
const SITE_ROOT: &str = "https://allevents.in";
const KEY_PREFIX: &str = "allevents";
const CURRENCY_SYMBOL: &str = "₹";
const TIMEZONE: Tz = chrono_tz::Asia::Kolkata;

static CARD_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("allevents card selector"));
static PAGE_PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]page=(\d+)").expect("valid page param regex"));

pub struct AllEvents {
    city: String,
    source: String,
    start_url: String,
    card_prefix: String,
}

impl Default for AllEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CITY, DEFAULT_SOURCE)
    }
}

impl AllEvents {
    pub fn new(city: &str, source: &str) -> Self {
        let slug = city
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_lowercase();
        Self {
            city: city.to_string(),
            source: source.to_string(),
            start_url: format!("{SITE_ROOT}/{slug}/all"),
            card_prefix: format!("{SITE_ROOT}/{slug}/"),
        }
    }

    /// Increments the `page` query parameter; the unparameterised start URL is page 1.
    pub fn next_listing_url(&self, current_url: &str) -> String {
        let current = PAGE_PARAM_RE
            .captures(current_url)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok());
        let next = current.map_or(2, |page| page.saturating_add(1));
        format!("{}?page={next}", self.start_url)
    }

    fn event_key(&self, page_url: &str, event_id: Option<&str>) -> (String, String) {
        match event_id {
            Some(id) => (id.to_string(), format!("{KEY_PREFIX}:{id}")),
            None => {
                let digest = base::url_digest(page_url);
                (digest[..16].to_string(), format!("{KEY_PREFIX}:url:{digest}"))
            }
        }
    }
}

impl EventSource for AllEvents {
    fn source_name(&self) -> &str {
        &self.source
    }

    fn city(&self) -> &str {
        &self.city
    }

    fn start_url(&self) -> &str {
        &self.start_url
    }

    fn currency_symbol(&self) -> &str {
        CURRENCY_SYMBOL
    }

    fn timezone(&self) -> Tz {
        TIMEZONE
    }

    fn scan_listing(&self, page: &Page, window: &DateWindow) -> ListingScan {
        let document = Html::parse_document(&page.html);
        let mut scan = ListingScan::default();

        for card in document.select(&CARD_LINK_SELECTOR) {
            let href = card.value().attr("href").map(str::to_string);
            let url = match base::absolute_url(&page.url, href) {
                Some(url) => url,
                None => continue,
            };
            if !url.starts_with(&self.card_prefix) || base::numeric_suffix(&url).is_none() {
                continue;
            }

            let card_text = base::inner_text(card);
            if window.check_card(&card_text) == CardVerdict::Stop {
                tracing::info!(
                    listing = %page.url,
                    card = %card_text,
                    cutoff = %window.cutoff(),
                    "reached date cutoff, stopping pagination"
                );
                scan.stopped_at_cutoff = true;
                break;
            }

            scan.candidates.push(ListingCandidate { url, card_text });
        }

        if !scan.stopped_at_cutoff {
            scan.next_page = Some(self.next_listing_url(&page.url));
        }
        scan
    }

    fn extract_detail(&self, page: &Page) -> EventRecord {
        let document = Html::parse_document(&page.html);
        let numeric_id = base::numeric_suffix(&page.url);
        let (event_id, event_key) = self.event_key(&page.url, numeric_id);

        let mut record = EventRecord {
            event_id,
            event_key,
            event_name: resolve::title(&document),
            event_url: page.url.clone(),
            source_url: page.url.clone(),
            start_date: None,
            start_time: None,
            venue_name: None,
            venue_address: None,
            organizer_name: None,
            ticket_price: None,
            ticket_url: None,
            description: resolve::description(&document),
            categories: None,
            city: self.city().to_string(),
            source: self.source_name().to_string(),
            last_updated: Utc::now().to_rfc3339(),
        };

        match structured::decode_event_block(&document) {
            Some(block) => self.apply_block(&mut record, &document, &page.url, numeric_id, &block),
            None => tracing::debug!(url = %page.url, "no structured event block"),
        }

        record
    }
}

impl AllEvents {
    fn apply_block(
        &self,
        record: &mut EventRecord,
        document: &Html,
        page_url: &str,
        event_id: Option<&str>,
        block: &StructuredEventBlock,
    ) {
        let ctx = DetailContext {
            document,
            page_url,
            event_id,
            block,
        };
        let (start_date, start_time) = ctx.start();
        record.start_date = start_date;
        record.start_time = start_time;
        record.venue_name = ctx.venue_name();
        record.venue_address = ctx.venue_address();
        record.organizer_name = ctx.organizer();
        record.ticket_price = ctx.ticket_price(self.currency_symbol());
        record.ticket_url = ctx.ticket_url();
        record.categories = resolve::categories(document, self.city());
    }
}
