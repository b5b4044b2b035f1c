pub mod allevents_html;
pub mod base;
pub mod resolve;
pub mod structured;

use chrono_tz::Tz;

use crate::models::{EventRecord, ListingCandidate, Page};
use crate::relevance::DateWindow;

/// Result of scanning one listing page.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListingScan {
    pub candidates: Vec<ListingCandidate>,
    /// `None` once a card past the cutoff has been seen.
    pub next_page: Option<String>,
    pub stopped_at_cutoff: bool,
}

/// A paginated event listing and its detail pages.
pub trait EventSource: Send + Sync {
    fn source_name(&self) -> &str;
    fn city(&self) -> &str;
    fn start_url(&self) -> &str;
    fn currency_symbol(&self) -> &str;
    fn timezone(&self) -> Tz;
    fn scan_listing(&self, page: &Page, window: &DateWindow) -> ListingScan;
    /// Builds the candidate record for a detail page; acceptance is decided by the caller.
    fn extract_detail(&self, page: &Page) -> EventRecord;
}
