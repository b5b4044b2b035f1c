//! Per-field fallback chains for detail pages.
//!
//! Each field is resolved by trying strategies in priority order; every strategy returns
//! `Option` and the first `Some` wins.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use super::base;
use super::structured::StructuredEventBlock;

pub const MAX_CATEGORY_LEN: usize = 40;

static TICKET_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"a[href*="tickets"]"#).expect("ticket link selector"));
static DESCRIPTION_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[class*="description"]"#).expect("description selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1").expect("title selector"));
static ORGANIZER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)^(?:hosted by|curated by|by)\s+(.+)$").expect("valid organizer regex")
});

/// Everything a resolver may read for one detail page.
pub struct DetailContext<'a> {
    pub document: &'a Html,
    pub page_url: &'a str,
    pub event_id: Option<&'a str>,
    pub block: &'a StructuredEventBlock,
}

/// Splits `2025-06-01T18:30:00` (or `2025-06-01 18:30`) into `("2025-06-01", Some("18:30"))`.
pub fn split_start(raw: &str) -> (String, Option<String>) {
    match raw.trim().split_once(['T', ' ']) {
        Some((date, time)) => {
            let time: String = time.chars().take(5).collect();
            let time = if time.is_empty() { None } else { Some(time) };
            (date.to_string(), time)
        }
        None => (raw.to_string(), None),
    }
}

impl DetailContext<'_> {
    pub fn start(&self) -> (Option<String>, Option<String>) {
        match self.block.start_date.as_deref() {
            Some(raw) => {
                let (date, time) = split_start(raw);
                (Some(date), time)
            }
            None => (None, None),
        }
    }

    pub fn venue_name(&self) -> Option<String> {
        self.block.location.as_ref()?.name.clone()
    }

    pub fn venue_address(&self) -> Option<String> {
        self.block.location.as_ref()?.address.as_ref()?.joined()
    }

    pub fn organizer(&self) -> Option<String> {
        self.block
            .organizer_name
            .clone()
            .or_else(|| self.organizer_from_text())
            .and_then(base::non_empty)
    }

    fn organizer_from_text(&self) -> Option<String> {
        base::text_nodes(self.document).find_map(|text| {
            ORGANIZER_RE
                .captures(text.trim())
                .and_then(|caps| caps.get(1))
                .map(|m| base::clean_text(m.as_str()))
        })
    }

    pub fn ticket_price(&self, currency_symbol: &str) -> Option<String> {
        let page_text = base::page_text(self.document).to_lowercase();
        self.structured_price(currency_symbol)
            .or_else(|| free_marker(&page_text))
            .or_else(|| price_in_text(&page_text, currency_symbol))
    }

    fn structured_price(&self, currency_symbol: &str) -> Option<String> {
        let price = self.block.offer.as_ref()?.price.as_deref()?;
        Some(format!("{currency_symbol}{price}"))
    }

    pub fn ticket_url(&self) -> Option<String> {
        self.structured_ticket_url()
            .or_else(|| self.ticket_link_on_page())
            .or_else(|| {
                self.page_url
                    .contains("tickets")
                    .then(|| self.page_url.to_string())
            })
    }

    fn structured_ticket_url(&self) -> Option<String> {
        let url = self.block.offer.as_ref()?.url.clone();
        base::absolute_url(self.page_url, url)
    }

    fn ticket_link_on_page(&self) -> Option<String> {
        let event_id = self.event_id?;
        let href = self
            .document
            .select(&TICKET_LINK_SELECTOR)
            .filter_map(|link| link.value().attr("href"))
            .find(|href| href.contains(event_id))?;
        base::absolute_url(self.page_url, Some(href.to_string()))
    }
}

fn free_marker(lowered_page_text: &str) -> Option<String> {
    (lowered_page_text.contains("free entry") || lowered_page_text.contains("free event"))
        .then(|| "Free".to_string())
}

fn price_in_text(page_text: &str, currency_symbol: &str) -> Option<String> {
    let symbol = regex::escape(currency_symbol);
    let pattern = format!(r"{symbol}\s?\d+(?:\s?-\s?(?:{symbol})?\d+)?");
    let price_re = Regex::new(&pattern).ok()?;
    price_re
        .find(page_text)
        .map(|m| m.as_str().chars().filter(|ch| !ch.is_whitespace()).collect())
}

/// Labels from "other <label> events in <city>" phrases in the description region.
pub fn categories(document: &Html, city: &str) -> Option<Vec<String>> {
    let text = base::region_text(document, &DESCRIPTION_SELECTOR)?;
    let pattern = format!(
        r"(?i)other\s+([A-Za-z &]+?)\s+events\s+in\s+{}",
        regex::escape(city)
    );
    let category_re = Regex::new(&pattern).ok()?;
    let labels: BTreeSet<String> = category_re
        .captures_iter(&text)
        .filter_map(|caps| caps.get(1))
        .map(|m| base::title_case(m.as_str().trim()))
        .filter(|label| !label.is_empty() && label.chars().count() <= MAX_CATEGORY_LEN)
        .collect();
    if labels.is_empty() {
        None
    } else {
        Some(labels.into_iter().collect())
    }
}

pub fn title(document: &Html) -> Option<String> {
    base::first_text(document, &TITLE_SELECTOR)
}

pub fn description(document: &Html) -> Option<String> {
    base::region_text(document, &DESCRIPTION_SELECTOR)
}
