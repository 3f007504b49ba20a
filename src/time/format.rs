//! Text forms for instants and date keys.
//!
//! Rule text (`UNTIL=`) and exception lists use the basic ISO form
//! `YYYYMMDDTHHmmss`. A trailing `Z` and the date-only form `YYYYMMDD`
//! are accepted on input. Date keys (`YYYY-MM-DD`) identify a calendar
//! day independent of time of day.

use chrono::{NaiveDate, NaiveDateTime};

const BASIC_FORMAT: &str = "%Y%m%dT%H%M%S";
const BASIC_DATE_FORMAT: &str = "%Y%m%d";
const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

/// Formats an instant as `YYYYMMDDTHHmmss`.
pub fn format_basic(date: NaiveDateTime) -> String {
    date.format(BASIC_FORMAT).to_string()
}

/// Parses the basic ISO form (date-time or date-only).
pub fn parse_basic(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    let text = text.strip_suffix('Z').unwrap_or(text);
    if let Ok(date) = NaiveDateTime::parse_from_str(text, BASIC_FORMAT) {
        return Some(date);
    }
    NaiveDate::parse_from_str(text, BASIC_DATE_FORMAT)
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
}

/// Canonical key of the day containing `date`.
pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}
