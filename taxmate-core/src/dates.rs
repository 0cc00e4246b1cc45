//! Best-effort parsing of statement dates for ordering and range reporting.
//!
//! Order of attempts:
//! 1. `D/M/Y` or `M/D/Y` (`/` or `-` separated, 2 or 4 digit year). A part
//!    above 12 must be the day; when both could be months, day-first wins as
//!    that is the Nigerian convention.
//! 2. `YYYY-MM-DD`
//! 3. A handful of common textual layouts (`15 Jan 2026`, `15-Jan-26`, ...)
//!
//! Anything else maps to the Unix epoch so malformed rows sort first.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static NUMERIC_DMY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[/\-](\d{1,2})[/\-](\d{2,4})$").unwrap());
static ISO_YMD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").unwrap());

// `%y` layouts precede their `%Y` twins: `%Y` happily reads "26" as year 26.
const GENERIC_FORMATS: &[&str] = &[
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%y",
    "%d-%b-%Y",
    "%d %b, %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%Y/%m/%d",
    "%d.%m.%Y",
];

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

/// Parse a statement date, falling back to 1970-01-01.
pub fn parse_statement_date(s: &str) -> NaiveDate {
    try_parse_statement_date(s).unwrap_or_else(epoch)
}

/// Parse a statement date, or `None` if no known layout matches.
pub fn try_parse_statement_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(caps) = NUMERIC_DMY.captures(s) {
        let p1: u32 = caps[1].parse().ok()?;
        let p2: u32 = caps[2].parse().ok()?;
        let year_raw = &caps[3];
        let year: i32 = if year_raw.len() == 2 {
            2000 + year_raw.parse::<i32>().ok()?
        } else {
            year_raw.parse().ok()?
        };

        let (day, month) = if p1 > 12 {
            (p1, p2)
        } else if p2 > 12 {
            (p2, p1)
        } else {
            (p1, p2)
        };

        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }

    if let Some(caps) = ISO_YMD.captures(s) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    GENERIC_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}
