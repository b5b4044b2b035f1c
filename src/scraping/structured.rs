//! Schema.org JSON-LD `Event` blocks embedded in detail pages.
//!
//! Decoding never fails: a missing block, malformed JSON or a block of another type
//! all come back as `None`.

use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde_json::Value;

static JSONLD_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("json-ld selector")
});

const EVENT_TYPE: &str = "Event";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PostalAddress {
    pub street: Option<String>,
    pub locality: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl PostalAddress {
    /// Present parts joined with ", ", in street to country order.
    pub fn joined(&self) -> Option<String> {
        let parts = [
            &self.street,
            &self.locality,
            &self.region,
            &self.postal_code,
            &self.country,
        ];
        let joined = parts
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        if joined.is_empty() {
            None
        } else {
            Some(joined)
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventLocation {
    pub name: Option<String>,
    pub address: Option<PostalAddress>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventOffer {
    pub price: Option<String>,
    pub url: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StructuredEventBlock {
    pub start_date: Option<String>,
    pub location: Option<EventLocation>,
    pub organizer_name: Option<String>,
    pub offer: Option<EventOffer>,
}

/// Returns the first `Event` block on the page, scanning every JSON-LD script in order.
pub fn decode_event_block(document: &Html) -> Option<StructuredEventBlock> {
    for script in document.select(&JSONLD_SELECTOR) {
        let payload = script.text().collect::<String>();
        let value: Value = match serde_json::from_str(payload.trim()) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(error = %err, "skipping malformed json-ld payload");
                continue;
            }
        };
        if let Some(block) = select_event(&value).map(block_from_value) {
            return Some(block);
        }
    }
    None
}

fn select_event(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find(|item| is_event(item)),
        Value::Object(_) if is_event(value) => Some(value),
        _ => None,
    }
}

fn is_event(item: &Value) -> bool {
    item.get("@type").and_then(Value::as_str) == Some(EVENT_TYPE)
}

fn block_from_value(item: &Value) -> StructuredEventBlock {
    let location = item.get("location").and_then(object).map(|loc| EventLocation {
        name: string_field(loc, "name"),
        address: loc.get("address").and_then(object).map(|addr| PostalAddress {
            street: string_field(addr, "streetAddress"),
            locality: string_field(addr, "addressLocality"),
            region: string_field(addr, "addressRegion"),
            postal_code: string_field(addr, "postalCode"),
            country: string_field(addr, "addressCountry"),
        }),
    });

    let organizer_name = item
        .get("organizer")
        .and_then(first_object)
        .and_then(|org| string_field(org, "name"));

    let offer = item.get("offers").and_then(first_object).map(|offer| EventOffer {
        price: offer.get("price").and_then(price_text),
        url: string_field(offer, "url"),
    });

    StructuredEventBlock {
        start_date: string_field(item, "startDate"),
        location,
        organizer_name,
        offer,
    }
}

fn object(value: &Value) -> Option<&Value> {
    value.is_object().then_some(value)
}

fn first_object(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find(|item| item.is_object()),
        Value::Object(_) => Some(value),
        _ => None,
    }
}

/// String fields may be plain strings, numbers, or `{ "name": ... }` objects
/// (common for `addressCountry`). Blank values count as absent.
fn string_field(parent: &Value, key: &str) -> Option<String> {
    let text = match parent.get(key)? {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Object(_) => return parent.get(key).and_then(|inner| string_field(inner, "name")),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// A zero or blank price is treated as missing.
fn price_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) if number.as_f64() == Some(0.0) => None,
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    }
}
