//! Interval timestamp helpers.
//!
//! Upstream timestamps are zero-padded and ISO-like, so plain string order is
//! chronological. Parsing is only needed when new timestamps must be derived.

use chrono::{Duration, NaiveDateTime};

/// Output format for derived period labels.
pub const PERIOD_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ACCEPTED_FORMATS: [&str; 6] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Calendar date of a timestamp: everything before the first space or `T`.
pub fn calendar_date(timestamp: &str) -> &str {
    let trimmed = timestamp.trim();
    let end = trimmed.find([' ', 'T']).unwrap_or(trimmed.len());
    &trimmed[..end]
}

/// Parses a market timestamp in any of the formats the feeds use.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    let raw = raw.split('.').next().unwrap_or(raw);
    ACCEPTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// `anchor - offset * width`, rendered as a period label. `None` when the
/// offset does not fit the calendar.
pub fn offset_label(anchor: NaiveDateTime, offset: u32, width: Duration) -> Option<String> {
    let steps = i32::try_from(offset).ok()?;
    let back = width.checked_mul(steps)?;
    anchor
        .checked_sub_signed(back)
        .map(|period| period.format(PERIOD_FORMAT).to_string())
}
