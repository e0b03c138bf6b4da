//! IMAP date and date-time forms.
//!
//! The internal-date form is `DD-Mon-YYYY HH:MM:SS ±HHMM` with a
//! space-padded single-digit day; search dates use `DD-Mon-YYYY`.

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::error::{DecodeError, DecodeResult};

/// An IMAP internal date with its original zone offset.
pub type InternalDate = DateTime<FixedOffset>;

/// Formats an internal date, without the surrounding quotes.
#[must_use]
pub fn format_date_time(dt: &InternalDate) -> String {
    // %e renders a space-padded day, matching date-day-fixed.
    dt.format("%e-%b-%Y %H:%M:%S %z").to_string()
}

/// Parses an internal date, with or without a leading space-padded day.
pub fn parse_date_time(s: &str) -> DecodeResult<InternalDate> {
    DateTime::parse_from_str(s.trim_start(), "%d-%b-%Y %H:%M:%S %z")
        .map_err(|_| DecodeError::InvalidDateTime(0))
}

/// Formats a search date (`DD-Mon-YYYY`).
#[must_use]
pub fn format_date(date: &NaiveDate) -> String {
    date.format("%-d-%b-%Y").to_string()
}

/// Parses a search date.
pub fn parse_date(s: &str) -> DecodeResult<NaiveDate> {
    NaiveDate::parse_from_str(s.trim_matches('"'), "%d-%b-%Y")
        .map_err(|_| DecodeError::InvalidDateTime(0))
}
