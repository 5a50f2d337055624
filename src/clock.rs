//! Normalization of report dates, interval labels and clock durations.
//!
//! Reports are produced shortly after midnight for the previous day's
//! traffic, so every header time is rolled back one calendar day before it
//! is stored. All header times are local to a fixed UTC+3 offset.

use chrono::{Duration, FixedOffset, NaiveDateTime, TimeZone};

use crate::error::{ParseError, ParseResult};

const UTC_OFFSET_SECS: i32 = 3 * 3600;
const HEADER_FORMAT: &str = "%b %d, %Y %I:%M %p";
const MIDNIGHT: &str = "12:00 am";

/// Epoch seconds for a header date (`Jan 05, 2024`) and time of day
/// (`12:15 am`), rolled back one day to the covered day.
pub fn report_timestamp(date: &str, time_of_day: &str) -> ParseResult<i64> {
    let raw = format!("{} {}", date.trim(), time_of_day.trim());
    let naive = NaiveDateTime::parse_from_str(&raw, HEADER_FORMAT)
        .map_err(|_| ParseError::Timestamp(raw.clone()))?;
    let offset =
        FixedOffset::east_opt(UTC_OFFSET_SECS).ok_or(ParseError::Timestamp(raw.clone()))?;
    let local = offset
        .from_local_datetime(&naive)
        .single()
        .ok_or(ParseError::Timestamp(raw))?;

    let seconds = (local - Duration::days(1)).timestamp();
    if seconds < 0 {
        return Err(ParseError::BeforeEpoch(seconds));
    }
    Ok(seconds)
}

/// Start of the interval labelled `label` (`H:MM`, optionally followed by
/// `-H:MM`) on the day covered by a report dated `date`. Only the hour is
/// used; labels sit on hour boundaries.
pub fn interval_start(date: &str, label: &str, line: usize) -> ParseResult<i64> {
    let invalid = || ParseError::InvalidField {
        field: "interval label",
        value: label.to_string(),
        line,
    };
    let (hour, _) = label.split_once(':').ok_or_else(invalid)?;
    let hour: i64 = hour.trim().parse().map_err(|_| invalid())?;
    if !(0..24).contains(&hour) {
        return Err(invalid());
    }

    Ok(report_timestamp(date, MIDNIGHT)? + hour * 3600)
}

/// Seconds in a clock field such as `3:45` or `1:02:03`. Blank or malformed
/// text yields zero rather than failing the row.
pub fn clock_seconds(field: &str) -> i32 {
    let field = field.trim();
    if field.is_empty() {
        return 0;
    }

    field
        .split(':')
        .try_fold(0i32, |total, part| {
            let part = part.trim();
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let value: i32 = part.parse().ok()?;
            total.checked_mul(60)?.checked_add(value)
        })
        .unwrap_or(0)
}
