//! HTTP date formatting and parsing (RFC 9110 `IMF-fixdate` plus the two
//! obsolete forms servers are required to accept).
//!
//! Formatting is table-driven rather than going through a general purpose
//! formatter: the `Date` header is produced for every response, so the hot
//! path is a handful of array lookups and pushes into a pre-sized string.

use std::convert::TryFrom;

use time::{Date, Month, OffsetDateTime};

use crate::error::ParseError;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[rustfmt::skip]
const TWO_DIGITS: [&str; 100] = [
    "00", "01", "02", "03", "04", "05", "06", "07", "08", "09",
    "10", "11", "12", "13", "14", "15", "16", "17", "18", "19",
    "20", "21", "22", "23", "24", "25", "26", "27", "28", "29",
    "30", "31", "32", "33", "34", "35", "36", "37", "38", "39",
    "40", "41", "42", "43", "44", "45", "46", "47", "48", "49",
    "50", "51", "52", "53", "54", "55", "56", "57", "58", "59",
    "60", "61", "62", "63", "64", "65", "66", "67", "68", "69",
    "70", "71", "72", "73", "74", "75", "76", "77", "78", "79",
    "80", "81", "82", "83", "84", "85", "86", "87", "88", "89",
    "90", "91", "92", "93", "94", "95", "96", "97", "98", "99",
];

/// Named zones accepted while parsing, with their offset from UTC in minutes.
const ZONES: [(&str, i32); 6] = [
    ("UTC", 0),
    ("GMT", 0),
    ("EDT", -240),
    ("CDT", -300),
    ("MDT", -360),
    ("PDT", -420),
];

/// Formats a unix timestamp (seconds) as an RFC 9110 IMF-fixdate, e.g.
/// `Sun, 06 Nov 1994 08:49:37 GMT`.
///
/// Timestamps outside the representable calendar clamp to the epoch.
pub fn format_http_date(unix: i64) -> String {
    let dt = OffsetDateTime::from_unix_timestamp(unix)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH);

    let year = dt.year();
    debug_assert!((0..=9999).contains(&year));

    let mut out = String::with_capacity(29);
    out.push_str(WEEKDAYS[dt.weekday().number_days_from_sunday() as usize]);
    out.push_str(", ");
    out.push_str(TWO_DIGITS[dt.day() as usize]);
    out.push(' ');
    out.push_str(MONTHS[u8::from(dt.month()) as usize - 1]);
    out.push(' ');
    out.push_str(TWO_DIGITS[(year / 100) as usize]);
    out.push_str(TWO_DIGITS[(year % 100) as usize]);
    out.push(' ');
    out.push_str(TWO_DIGITS[dt.hour() as usize]);
    out.push(':');
    out.push_str(TWO_DIGITS[dt.minute() as usize]);
    out.push(':');
    out.push_str(TWO_DIGITS[dt.second() as usize]);
    out.push_str(" GMT");
    out
}

/// The current time, formatted as an IMF-fixdate.
pub fn now_http_date() -> String {
    format_http_date(OffsetDateTime::now_utc().unix_timestamp())
}

/// Parses an HTTP date into a unix timestamp (seconds).
///
/// Accepted forms:
///
/// * IMF-fixdate - `Sun, 06 Nov 1994 08:49:37 GMT`
/// * RFC 850 - `Sunday, 06-Nov-94 08:49:37 GMT`
/// * asctime - `Sun Nov  6 08:49:37 1994`
///
/// The leading day-of-week is optional. A trailing zone may be a recognised
/// name (`UTC`, `GMT`, `EDT`, `CDT`, `MDT`, `PDT`), an explicit `±HHMM`
/// offset, or a bracketed zone name such as `(UTC)`; absent a zone, GMT is
/// assumed. Month names are matched case-sensitively.
pub fn parse_http_date(input: &str) -> Result<i64, ParseError> {
    let rest = strip_weekday(input.trim());
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(ParseError::InvalidDate);
    }

    let first = tokens[0];
    let (day, month, year, time, zone_tokens) = if first.contains('-') {
        // RFC 850: `06-Nov-94 08:49:37 GMT`
        if tokens.len() < 2 {
            return Err(ParseError::InvalidDate);
        }
        let mut pieces = first.splitn(3, '-');
        let day = parse_number(pieces.next().unwrap_or(""))?;
        let month = parse_month(pieces.next().unwrap_or(""))?;
        let year = expand_year(parse_number(pieces.next().unwrap_or(""))?);
        (day, month, year, tokens[1], &tokens[2..])
    } else if first.as_bytes().first().map_or(false, u8::is_ascii_digit) {
        // IMF-fixdate: `06 Nov 1994 08:49:37 GMT`
        if tokens.len() < 4 {
            return Err(ParseError::InvalidDate);
        }
        let day = parse_number(tokens[0])?;
        let month = parse_month(tokens[1])?;
        let year = parse_number(tokens[2])?;
        (day, month, year, tokens[3], &tokens[4..])
    } else {
        // asctime: `Nov  6 08:49:37 1994` (weekday already stripped)
        if tokens.len() < 4 {
            return Err(ParseError::InvalidDate);
        }
        let month = parse_month(tokens[0])?;
        let day = parse_number(tokens[1])?;
        let year = parse_number(tokens[3])?;
        (day, month, year, tokens[2], &tokens[4..])
    };

    let (hour, minute, second) = parse_time(time)?;
    let offset_minutes = parse_zone(zone_tokens)?;

    if !(1..=31).contains(&day) || !(0..=9999).contains(&year) {
        return Err(ParseError::InvalidDate);
    }
    let date = Date::from_calendar_date(year as i32, month, day as u8)
        .map_err(|_| ParseError::InvalidDate)?;
    let timestamp = date
        .with_hms(hour as u8, minute as u8, second as u8)
        .map_err(|_| ParseError::InvalidDate)?
        .assume_utc()
        .unix_timestamp();

    Ok(timestamp - i64::from(offset_minutes) * 60)
}

/// Drops a leading day-of-week, either comma-separated (`Sun, ` / `Sunday, `)
/// or bare as in asctime (`Sun `).
fn strip_weekday(input: &str) -> &str {
    if let Some(comma) = input.find(',') {
        let head = &input[..comma];
        if !head.is_empty() && head.chars().all(|c| c.is_ascii_alphabetic()) {
            return input[comma + 1..].trim_start();
        }
    } else if let Some(space) = input.find(' ') {
        let head = &input[..space];
        if WEEKDAYS.contains(&head) {
            return input[space + 1..].trim_start();
        }
    }
    input
}

fn parse_number(input: &str) -> Result<i64, ParseError> {
    if input.is_empty() || !input.as_bytes().iter().all(u8::is_ascii_digit) {
        return Err(ParseError::InvalidDate);
    }
    input.parse().map_err(|_| ParseError::InvalidDate)
}

fn parse_month(input: &str) -> Result<Month, ParseError> {
    let index = MONTHS
        .iter()
        .position(|m| *m == input)
        .ok_or(ParseError::InvalidDate)?;
    Month::try_from(index as u8 + 1).map_err(|_| ParseError::InvalidDate)
}

fn expand_year(year: i64) -> i64 {
    if year >= 100 {
        year
    } else if year >= 70 {
        1900 + year
    } else {
        2000 + year
    }
}

fn parse_time(input: &str) -> Result<(i64, i64, i64), ParseError> {
    let mut pieces = input.splitn(3, ':');
    let hour = parse_number(pieces.next().unwrap_or(""))?;
    let minute = parse_number(pieces.next().unwrap_or(""))?;
    let second = parse_number(pieces.next().unwrap_or(""))?;
    if hour > 23 || minute > 59 || second > 59 {
        return Err(ParseError::InvalidDate);
    }
    Ok((hour, minute, second))
}

/// Resolves trailing zone tokens to an offset from UTC in minutes.
fn parse_zone(tokens: &[&str]) -> Result<i32, ParseError> {
    for token in tokens {
        let name = token.trim_start_matches('(').trim_end_matches(')');

        if let Some(&(_, offset)) = ZONES.iter().find(|(z, _)| *z == name) {
            return Ok(offset);
        }

        let bytes = name.as_bytes();
        if bytes.len() == 5 && (bytes[0] == b'+' || bytes[0] == b'-') {
            let hours = parse_number(&name[1..3])?;
            let minutes = parse_number(&name[3..5])?;
            let magnitude = (hours * 60 + minutes) as i32;
            return Ok(if bytes[0] == b'-' { -magnitude } else { magnitude });
        }

        return Err(ParseError::InvalidDate);
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn formats_the_reference_date() {
        assert_eq!(format_http_date(784111777), "Sun, 06 Nov 1994 08:49:37 GMT");
        assert_eq!(format_http_date(0), "Thu, 01 Jan 1970 00:00:00 GMT");
    }

    #[test]
    fn agrees_with_httpdate_formatting() {
        for &unix in &[0i64, 1, 784111777, 1_600_000_000, 2_147_483_647] {
            let system = UNIX_EPOCH + Duration::from_secs(unix as u64);
            assert_eq!(format_http_date(unix), httpdate::fmt_http_date(system));
        }
    }

    #[test]
    fn round_trips_across_the_supported_year_range() {
        let samples = [
            0i64,
            1,
            784111777,
            951_827_696,        // leap year, Feb 29 2000
            4_107_542_399,      // end of 2099
            253_402_300_799,    // 9999-12-31 23:59:59
        ];
        for &unix in &samples {
            assert_eq!(parse_http_date(&format_http_date(unix)).unwrap(), unix);
        }
    }

    #[test]
    fn parses_the_legacy_forms() {
        let expected = 784111777;
        assert_eq!(
            parse_http_date("Sunday, 06-Nov-94 08:49:37 GMT").unwrap(),
            expected
        );
        assert_eq!(parse_http_date("Sun Nov  6 08:49:37 1994").unwrap(), expected);
    }

    #[test]
    fn weekday_prefix_is_optional() {
        assert_eq!(parse_http_date("06 Nov 1994 08:49:37 GMT").unwrap(), 784111777);
    }

    #[test]
    fn honours_zone_names_and_offsets() {
        let base = parse_http_date("06 Nov 1994 08:49:37 GMT").unwrap();
        assert_eq!(parse_http_date("06 Nov 1994 08:49:37 UTC").unwrap(), base);
        assert_eq!(
            parse_http_date("06 Nov 1994 08:49:37 EDT").unwrap(),
            base + 240 * 60
        );
        assert_eq!(
            parse_http_date("06 Nov 1994 08:49:37 PDT").unwrap(),
            base + 420 * 60
        );
        assert_eq!(
            parse_http_date("06 Nov 1994 08:49:37 +0200").unwrap(),
            base - 2 * 3600
        );
        assert_eq!(
            parse_http_date("06 Nov 1994 08:49:37 -0130").unwrap(),
            base + 90 * 60
        );
    }

    #[test]
    fn tolerates_a_bracketed_zone_name() {
        assert_eq!(
            parse_http_date("Sun, 06 Nov 1994 08:49:37 (UTC)").unwrap(),
            784111777
        );
    }

    #[test]
    fn months_are_case_sensitive() {
        assert!(parse_http_date("Sun, 06 NOV 1994 08:49:37 GMT").is_err());
        assert!(parse_http_date("Sun, 06 nov 1994 08:49:37 GMT").is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_http_date("").is_err());
        assert!(parse_http_date("yesterday").is_err());
        assert!(parse_http_date("Sun, 32 Nov 1994 08:49:37 GMT").is_err());
        assert!(parse_http_date("Sun, 06 Nov 1994 25:49:37 GMT").is_err());
        assert!(parse_http_date("Sun, 06 Nov 1994 08:49:37 XYZ").is_err());
    }
}
