//! Shared utilities for CLI commands.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use lt_core::{CancelToken, Document, DocumentId, TextDocument, Timeline, TimelineError};
use regex::Regex;

/// Log-style timestamp: `YYYY-MM-DD HH:MM:SS[.fff|,fff]`.
static LOG_TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2})[ T](\d{2}):(\d{2}):(\d{2})(?:[.,](\d{1,3}))?$").unwrap()
});

/// Reads a file into a document identified by its path.
pub fn open_document(path: &Path) -> Result<TextDocument> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let id = DocumentId::new(path.display().to_string())
        .with_context(|| format!("invalid document path {}", path.display()))?;
    Ok(TextDocument::new(id, text))
}

/// Parse a point in time as RFC 3339 or as a log-style timestamp (UTC).
///
/// Supports:
/// - RFC 3339: "2021-01-01T10:00:05Z"
/// - Log style: "2021-01-01 10:00:05", "2021-01-01 10:00:05,250"
pub fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let Some(caps) = LOG_TIME_RE.captures(s) else {
        bail!(
            "Invalid time: {s}. Use RFC 3339 (e.g., 2021-01-01T10:00:05Z) or 'YYYY-MM-DD HH:MM:SS.fff'"
        );
    };
    let number = |i: usize| -> Result<u32> {
        caps[i].parse().with_context(|| format!("invalid number in time {s}"))
    };
    let year = caps[1]
        .parse()
        .with_context(|| format!("invalid year in time {s}"))?;
    // "25" -> 250 ms, "2" -> 200 ms
    let millis = caps
        .get(7)
        .map_or(Ok(0), |m| format!("{:0<3}", m.as_str()).parse::<u32>())
        .context("invalid milliseconds")?;

    NaiveDate::from_ymd_opt(year, number(2)?, number(3)?)
        .and_then(|date| {
            date.and_hms_milli_opt(number(4).ok()?, number(5).ok()?, number(6).ok()?, millis)
        })
        .map(|naive| naive.and_utc())
        .with_context(|| format!("time out of range: {s}"))
}

pub fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Signed seconds with millisecond precision, e.g. `-4.000s`.
pub fn format_offset(offset: Duration) -> String {
    let ms = offset.num_milliseconds();
    let sign = if ms < 0 { '-' } else { '+' };
    let abs = ms.unsigned_abs();
    format!("{sign}{}.{:03}s", abs / 1000, abs % 1000)
}

/// Opens `doc` in `timeline` and builds its cache and index.
pub fn refresh(timeline: &mut Timeline, doc: &dyn Document) -> Result<()> {
    timeline.open(doc);
    let mut progress = |done: usize, total: usize| {
        tracing::debug!(document = %doc.id(), done, total, "indexing");
    };
    match timeline.refresh_blocking(doc, &CancelToken::new(), &mut progress) {
        Ok(()) => Ok(()),
        Err(TimelineError::NoConfigMatched(id)) => bail!("no file config matches {id}"),
        Err(err) => Err(err).with_context(|| format!("failed to index {}", doc.id())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    #[test]
    fn parses_rfc3339() {
        let time = parse_time("2021-01-01T11:00:05+01:00").unwrap();
        assert_eq!(time, Utc.with_ymd_and_hms(2021, 1, 1, 10, 0, 5).unwrap());
    }

    #[test]
    fn parses_log_style_with_fraction() {
        let time = parse_time("2021-01-01 10:00:05,25").unwrap();
        assert_eq!(
            time,
            Utc.with_ymd_and_hms(2021, 1, 1, 10, 0, 5).unwrap() + Duration::milliseconds(250)
        );
        assert_eq!(
            parse_time("2021-01-01 10:00:05").unwrap(),
            Utc.with_ymd_and_hms(2021, 1, 1, 10, 0, 5).unwrap()
        );
    }

    #[test]
    fn rejects_garbage_and_out_of_range() {
        assert!(parse_time("yesterday").is_err());
        assert!(parse_time("2021-13-01 10:00:00").is_err());
        assert!(parse_time("2021-01-01 25:00:00").is_err());
    }

    #[test]
    fn formats_offsets() {
        assert_eq!(format_offset(Duration::zero()), "+0.000s");
        assert_eq!(format_offset(Duration::milliseconds(-4250)), "-4.250s");
        assert_eq!(format_offset(Duration::seconds(90)), "+90.000s");
    }
}
