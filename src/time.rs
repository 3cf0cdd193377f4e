//! Timestamps as the SQLite tables store them.

use chrono::{NaiveDateTime, ParseError, Utc};

/// Same shape as SQLite's `CURRENT_TIMESTAMP`, always UTC.
pub const SQLITE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn sqlite_now() -> String {
    Utc::now().format(SQLITE_DATETIME_FORMAT).to_string()
}

/// Reads back a stored timestamp as RFC 3339.
///
/// ```
/// # use maildrop::time::sqlite_datetime_to_rfc3339;
/// assert_eq!(
///     sqlite_datetime_to_rfc3339("2024-03-09 23:15:00").unwrap(),
///     "2024-03-09T23:15:00+00:00",
/// );
/// ```
pub fn sqlite_datetime_to_rfc3339(stored: &str) -> Result<String, ParseError> {
    NaiveDateTime::parse_from_str(stored, SQLITE_DATETIME_FORMAT)
        .map(|naive| naive.and_utc().to_rfc3339())
}
