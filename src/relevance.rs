//! Date relevance window shared by the listing pre-filter and the final emission gate.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

/// Exact abbreviations or full month names; "Decades" or "Marvel" are not months.
const MONTH_TOKEN: &str = r"(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

static DAY_MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(\d{{1,2}})\s+{MONTH_TOKEN}\b")).expect("valid day-month regex")
});
static MONTH_DAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b{MONTH_TOKEN}\s+(\d{{1,2}})\b")).expect("valid month-day regex")
});

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// What the listing pre-filter concluded about one card.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardVerdict {
    /// Schedule the detail fetch (date inside the window, in the past, or unparseable).
    Continue,
    /// The card is past the cutoff; listings are date-ordered so nothing after it matters.
    Stop,
}

/// `[today, today + max_days_ahead]`, with `today` fixed once per crawl.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DateWindow {
    today: NaiveDate,
    max_days_ahead: i64,
}

impl DateWindow {
    pub fn new(today: NaiveDate, max_days_ahead: i64) -> Self {
        Self {
            today,
            max_days_ahead,
        }
    }

    /// Window anchored at the current date in the crawl's timezone.
    pub fn starting_now(tz: Tz, max_days_ahead: i64) -> Self {
        Self::new(Utc::now().with_timezone(&tz).date_naive(), max_days_ahead)
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn cutoff(&self) -> NaiveDate {
        self.today + Duration::days(self.max_days_ahead)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.today <= date && date <= self.cutoff()
    }

    /// Fast check on free listing text. Only a date past the cutoff yields an opinion.
    pub fn check_card(&self, card_text: &str) -> CardVerdict {
        match self.parse_card_date(card_text) {
            Some(date) if date > self.cutoff() => CardVerdict::Stop,
            _ => CardVerdict::Continue,
        }
    }

    /// First "day month" or "month day" fragment in the text, placed in `today`'s year.
    pub fn parse_card_date(&self, card_text: &str) -> Option<NaiveDate> {
        let year = self.today.year();
        if let Some(caps) = DAY_MONTH_RE.captures(card_text) {
            let day = caps.get(1)?.as_str().parse().ok()?;
            let month = month_number(caps.get(2)?.as_str())?;
            if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
                return Some(date);
            }
        }
        let caps = MONTH_DAY_RE.captures(card_text)?;
        let month = month_number(caps.get(1)?.as_str())?;
        let day = caps.get(2)?.as_str().parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    }

    /// Authoritative gate on a resolved `YYYY-MM-DD` start date.
    pub fn accepts_start_date(&self, start_date: Option<&str>) -> bool {
        start_date
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
            .is_some_and(|date| self.contains(date))
    }
}

fn month_number(token: &str) -> Option<u32> {
    let prefix = token.get(..3)?.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|month| *month == prefix)
        .and_then(|index| u32::try_from(index + 1).ok())
}
