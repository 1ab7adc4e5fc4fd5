//! Pattern tier of booking-fact extraction.
//!
//! Fast, deterministic extraction from structured ticket text and HTML.
//! Runs before the generative tier and short-circuits it for
//! well-formatted tickets, saving an API call per ticket that agents
//! already annotated with a structured note.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use refund_triage_core::BookingType;
use regex::Regex;
use scraper::{Html, Selector};

/// Fields recovered by the pattern tier. All optional; the extractor
/// merges them into [`refund_triage_core::BookingFacts`].
#[derive(Debug, Clone, Default)]
pub struct PatternFields {
    /// First booking identifier found.
    pub booking_id: Option<String>,
    /// All distinct booking identifiers, in order of appearance. More
    /// than one means the ticket references multiple bookings.
    pub booking_ids: Vec<String>,
    /// Event (parking) start date.
    pub event_date: Option<NaiveDate>,
    /// Date the booking was made.
    pub reservation_date: Option<NaiveDate>,
    /// Amount in dollars.
    pub amount: Option<f64>,
    /// Facility name or address.
    pub location: Option<String>,
    /// Customer email.
    pub customer_email: Option<String>,
    /// Inferred booking product category.
    pub booking_type: Option<BookingType>,
}

impl PatternFields {
    /// Number of populated fields, used for confidence scoring.
    #[must_use]
    pub fn field_count(&self) -> usize {
        usize::from(self.booking_id.is_some())
            + usize::from(self.event_date.is_some())
            + usize::from(self.reservation_date.is_some())
            + usize::from(self.amount.is_some())
            + usize::from(self.location.is_some())
            + usize::from(self.customer_email.is_some())
            + usize::from(self.booking_type.is_some())
    }
}

static BOOKING_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // PW-12345
        r"(?i)PW-\d+",
        // Booking ID: 123, Booking #123
        r"(?i)Booking\s*(?:ID|#|Number)?\s*:?\s*(\d+)",
        // Order ID: 123
        r"(?i)Order\s*(?:ID|#|Number)?\s*:?\s*(\d+)",
        // Confirmation #123
        r"(?i)Confirmation\s*(?:ID|#|Number)?\s*:?\s*(\d+)",
        // Standalone 9-12 digit numbers. Word boundaries, not
        // whitespace: consuming the separator would swallow the start
        // of an adjacent id.
        r"\b(\d{9,12})\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Date patterns paired with their `chrono` parse formats. Written
/// month names come in full and abbreviated variants, with and without
/// the comma.
static DATE_PATTERNS: Lazy<Vec<(Regex, &'static [&'static str])>> = Lazy::new(|| {
    const ISO: &[&str] = &["%Y-%m-%d"];
    const US: &[&str] = &["%m/%d/%Y"];
    const WRITTEN: &[&str] = &["%B %d, %Y", "%B %d %Y"];
    const SHORT: &[&str] = &["%b %d, %Y", "%b %d %Y"];
    [
        (r"(\d{4}[-/]\d{2}[-/]\d{2})", ISO),
        (r"(\d{1,2}[-/]\d{1,2}[-/]\d{4})", US),
        (
            r"(?i)((?:January|February|March|April|May|June|July|August|September|October|November|December)\s+\d{1,2},?\s+\d{4})",
            WRITTEN,
        ),
        (
            r"(?i)((?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)\s+\d{1,2},?\s+\d{4})",
            SHORT,
        ),
    ]
    .iter()
    .filter_map(|(p, formats)| Regex::new(p).ok().map(|re| (re, *formats)))
    .collect()
});

static LOCATION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:at|location|facility|garage|lot):\s*([^\n,]+)",
        r"(?i)(?:parking\s+(?:at|in|near))\s+([^\n,]+)",
        r"(?i)(?:address|venue):\s*([^\n,]+)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static EMAIL_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").ok());

static AMOUNT_REGEX: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\$\s*(\d+(?:\.\d{2})?)").ok());

const CONFIRMED_KEYWORDS: &[&str] = &["confirmed", "advance", "pre-booked", "reservation"];
const ON_DEMAND_KEYWORDS: &[&str] = &["on-demand", "same-day", "instant", "immediate"];
const THIRD_PARTY_KEYWORDS: &[&str] = &[
    "third-party",
    "expedia",
    "priceline",
    "booking.com",
    "hotels.com",
];
const SEASON_KEYWORDS: &[&str] = &["season pass", "season parking", "seasonal pass"];

/// Extract fields from plain ticket text.
#[must_use]
pub fn extract_from_text(text: &str) -> PatternFields {
    if text.trim().is_empty() {
        return PatternFields::default();
    }

    let mut fields = PatternFields {
        booking_ids: extract_booking_ids(text),
        ..PatternFields::default()
    };
    fields.booking_id = fields.booking_ids.first().cloned();

    let dates = extract_dates(text);
    match dates.len() {
        0 => {}
        // Single date is most likely the event date.
        1 => fields.event_date = Some(dates[0]),
        // With two or more, the first mentioned is usually when the
        // booking was made and the second the event itself.
        _ => {
            fields.reservation_date = Some(dates[0]);
            fields.event_date = Some(dates[1]);
        }
    }

    fields.location = extract_location(text);
    if let Some(re) = EMAIL_REGEX.as_ref() {
        fields.customer_email = re.find(text).map(|m| m.as_str().to_string());
    }
    fields.amount = extract_amount(text);
    fields.booking_type = infer_booking_type(text);
    fields
}

/// Extract fields from HTML ticket content.
///
/// Structured booking notes often arrive as a two-column table; labeled
/// rows are mapped to fields directly. Text extraction fills in
/// whatever the table missed.
#[must_use]
pub fn extract_from_html(html: &str) -> PatternFields {
    let document = Html::parse_fragment(html);

    let (Ok(table_sel), Ok(row_sel), Ok(cell_sel)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("td, th"),
    ) else {
        return extract_from_text(html);
    };

    let mut fields = PatternFields::default();
    for table in document.select(&table_sel) {
        for row in table.select(&row_sel) {
            let cells: Vec<String> = row
                .select(&cell_sel)
                .map(|c| c.text().collect::<String>().trim().to_string())
                .collect();
            if cells.len() < 2 {
                continue;
            }
            let label = cells[0].to_lowercase();
            let value = &cells[1];

            if label.contains("booking") || label.contains("order") || label.contains("confirmation")
            {
                if fields.booking_id.is_none() {
                    fields.booking_id = Some(value.clone());
                    fields.booking_ids.push(value.clone());
                }
            } else if label.contains("amount") || label.contains("total") || label.contains("price")
            {
                fields.amount = extract_amount(value).or_else(|| value.parse().ok());
            } else if label.contains("event") || label.contains("parking date") || label.contains("start")
            {
                fields.event_date = extract_dates(value).first().copied();
            } else if label.contains("reservation")
                || label.contains("booked")
                || label.contains("created")
            {
                fields.reservation_date = extract_dates(value).first().copied();
            } else if label.contains("location")
                || label.contains("facility")
                || label.contains("address")
            {
                fields.location = Some(value.clone());
            } else if label.contains("email") {
                fields.customer_email = Some(value.clone());
            }
        }
    }

    // Table parsing found little; fall back to text patterns over the
    // rendered text.
    if fields.field_count() < 2 {
        let text = document.root_element().text().collect::<Vec<_>>().join("\n");
        let text_fields = extract_from_text(&text);
        merge_missing(&mut fields, text_fields);
    }
    fields
}

/// Whether content looks like HTML worth parsing structurally.
#[must_use]
pub fn looks_like_html(text: &str) -> bool {
    text.contains("<table") || text.contains("<div") || text.contains("<p>") || text.contains("<br")
}

/// All distinct booking identifiers in `text`, in order of appearance.
#[must_use]
pub fn extract_booking_ids(text: &str) -> Vec<String> {
    let mut ids = Vec::new();
    for re in BOOKING_ID_PATTERNS.iter() {
        for caps in re.captures_iter(text) {
            let id = caps
                .get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().trim().to_string());
            if let Some(id) = id {
                // Normalize so `PW-12345` and `12345` count as one booking.
                let canonical = id.trim_start_matches("PW-").trim_start_matches("pw-");
                if !ids
                    .iter()
                    .any(|existing: &String| existing.trim_start_matches("PW-") == canonical)
                {
                    ids.push(id);
                }
            }
        }
    }
    ids
}

fn extract_dates(text: &str) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    for (re, formats) in DATE_PATTERNS.iter() {
        for caps in re.captures_iter(text) {
            let Some(raw) = caps.get(1) else { continue };
            if let Some(date) = parse_date(raw.as_str(), formats) {
                if !dates.contains(&date) {
                    dates.push(date);
                }
            }
        }
    }
    dates
}

fn parse_date(raw: &str, formats: &[&str]) -> Option<NaiveDate> {
    for format in formats {
        let normalized = match *format {
            "%Y-%m-%d" => raw.replace('/', "-"),
            "%m/%d/%Y" => raw.replace('-', "/"),
            _ => raw.to_string(),
        };
        if let Ok(date) = NaiveDate::parse_from_str(&normalized, format) {
            return Some(date);
        }
    }
    None
}

fn extract_location(text: &str) -> Option<String> {
    for re in LOCATION_PATTERNS.iter() {
        if let Some(caps) = re.captures(text) {
            if let Some(m) = caps.get(1) {
                let location = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
                let mut location = location;
                location.truncate(200);
                return Some(location);
            }
        }
    }
    None
}

fn extract_amount(text: &str) -> Option<f64> {
    AMOUNT_REGEX
        .as_ref()
        .and_then(|re| re.captures(text))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn infer_booking_type(text: &str) -> Option<BookingType> {
    let lowered = text.to_lowercase();
    // Specific categories before the generic "confirmed" battery;
    // "reservation" appears in nearly every ticket.
    if SEASON_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return Some(BookingType::Season);
    }
    if THIRD_PARTY_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return Some(BookingType::ThirdParty);
    }
    if ON_DEMAND_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return Some(BookingType::OnDemand);
    }
    if CONFIRMED_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        return Some(BookingType::Confirmed);
    }
    None
}

fn merge_missing(into: &mut PatternFields, from: PatternFields) {
    if into.booking_id.is_none() {
        into.booking_id = from.booking_id;
    }
    for id in from.booking_ids {
        if !into.booking_ids.contains(&id) {
            into.booking_ids.push(id);
        }
    }
    if into.event_date.is_none() {
        into.event_date = from.event_date;
    }
    if into.reservation_date.is_none() {
        into.reservation_date = from.reservation_date;
    }
    if into.amount.is_none() {
        into.amount = from.amount;
    }
    if into.location.is_none() {
        into.location = from.location;
    }
    if into.customer_email.is_none() {
        into.customer_email = from.customer_email;
    }
    if into.booking_type.is_none() {
        into.booking_type = from.booking_type;
    }
}
