use serde::{Deserialize, Serialize};

/// A fetched page: rendered HTML plus the URL the response resolved to.
#[derive(Clone, Debug)]
pub struct Page {
    pub url: String,
    pub html: String,
}

/// A detail link found on a listing page, with the card's text for the fast date check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingCandidate {
    pub url: String,
    pub card_text: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub event_id: String,
    pub event_key: String, // "<source>:<id>" or "<source>:url:<sha256>"
    pub event_name: Option<String>,
    pub event_url: String,
    pub source_url: String,
    pub start_date: Option<String>,
    pub start_time: Option<String>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub organizer_name: Option<String>,
    pub ticket_price: Option<String>,
    pub ticket_url: Option<String>,
    pub description: Option<String>,
    pub categories: Option<Vec<String>>,
    pub city: String,
    pub source: String,
    pub last_updated: String,
}

impl EventRecord {
    pub fn title(&self) -> String {
        self.event_name
            .clone()
            .unwrap_or_else(|| "Untitled Event".to_string())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub long: f64,
}
