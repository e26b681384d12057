//! Per-line timestamp extraction.
//!
//! A [`TimeConfig`] carries the compiled time pattern for a document. The
//! pattern's capture layout decides how a match is interpreted:
//!
//! - 6 or more groups: calendar components `(year, month, day, hour, minute,
//!   second[, millisecond])`. Years below 100 get 2000 added.
//! - exactly 1 group: a full date substring, handed to the custom
//!   [`DateFormat`] if configured, otherwise to a generic parser.
//!
//! Any other layout, a failed match, or out-of-range components yield `None`.
//! Timestamps carry no zone information and are read as UTC.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Time pattern used when neither the settings nor the file config set one.
///
/// Matches `2021-01-01 10:00:00,000` style prefixes (log4j default layout).
pub const DEFAULT_TIME_PATTERN: &str = r"^([0-2][0-9]|[0-2][0-9][0-9][0-9])-([0-1][0-9])-([0-3][0-9]) ([0-2][0-9]):([0-5][0-9]):([0-5][0-9]),([0-9][0-9][0-9])";

/// Formats tried, in order, for a single-group capture without a custom format.
const GENERIC_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%d.%m.%Y %H:%M:%S%.f",
    "%b %d %Y %H:%M:%S%.f",
    "%a %b %d %Y %H:%M:%S%.f",
];

/// Time extraction settings for one document.
#[derive(Debug, Clone)]
pub struct TimeConfig {
    /// Pattern applied to every line.
    pub time_pattern: Regex,
    /// Optional strftime-style format for single-group captures.
    pub custom_date_format: Option<DateFormat>,
}

impl TimeConfig {
    /// Creates a config with no custom date format.
    pub const fn new(time_pattern: Regex) -> Self {
        Self {
            time_pattern,
            custom_date_format: None,
        }
    }

    /// Sets the custom date format.
    #[must_use]
    pub fn with_format(mut self, format: DateFormat) -> Self {
        self.custom_date_format = Some(format);
        self
    }

    /// Extracts the timestamp on `text`, if any.
    pub fn parse(&self, text: &str) -> Option<DateTime<Utc>> {
        parse_line(text, self)
    }
}

/// A strftime-style date format, e.g. `%d/%m/%Y %H:%M:%S%.3f`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DateFormat(String);

impl DateFormat {
    pub fn new(format: impl Into<String>) -> Self {
        Self(format.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parses `raw` with this format.
    ///
    /// Formats with a zone specifier are converted to UTC; formats with only a
    /// date resolve to midnight.
    pub fn parse(&self, raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(dt) = DateTime::parse_from_str(raw, &self.0) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, &self.0) {
            return Some(naive.and_utc());
        }
        NaiveDate::parse_from_str(raw, &self.0)
            .ok()
            .map(|d| d.and_time(NaiveTime::MIN).and_utc())
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extracts a single timestamp from `text`, or `None` if the line has none.
pub fn parse_line(text: &str, config: &TimeConfig) -> Option<DateTime<Utc>> {
    let caps = config.time_pattern.captures(text)?;
    match caps.len() {
        n if n >= 7 => from_components(&caps),
        2 => {
            let raw = caps.get(1)?.as_str();
            config
                .custom_date_format
                .as_ref()
                .map_or_else(|| parse_generic(raw), |format| format.parse(raw))
        }
        _ => None,
    }
}

fn from_components(caps: &regex::Captures<'_>) -> Option<DateTime<Utc>> {
    let num = |i: usize| -> Option<u32> { caps.get(i)?.as_str().parse().ok() };

    let mut year = i32::try_from(num(1)?).ok()?;
    if year < 100 {
        year += 2000;
    }
    let millis = match caps.get(7).map(|m| m.as_str()) {
        None | Some("") => 0,
        Some(raw) => raw.parse().ok()?,
    };

    let date = NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?;
    let time = NaiveTime::from_hms_milli_opt(num(4)?, num(5)?, num(6)?, millis)?;
    Some(date.and_time(time).and_utc())
}

/// Best-effort parse of a free-form date string.
fn parse_generic(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    GENERIC_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .map(|naive| naive.and_utc())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN).and_utc())
        })
}
