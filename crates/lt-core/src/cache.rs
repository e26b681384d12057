//! Per-document timestamp cache.
//!
//! One resolved timestamp per line. Lines without a timestamp inherit the
//! previous line's value (forward-fill); a leading undated line gets the Unix
//! epoch. The cache stores raw parsed values only. The document's clock
//! offset is applied at read time, so changing it never touches the cache.
//!
//! Values are not guaranteed to be monotonic: logs may be out of order.

use chrono::{DateTime, Duration, Utc};

use crate::document::Document;
use crate::error::TimelineError;
use crate::pass::{
    self, CancelToken, ChunkBudget, ChunkedPass, PassOptions, PassStep, ProgressSink,
};
use crate::time::TimeConfig;

/// Resolved timestamps for every line of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeCache {
    times: Vec<DateTime<Utc>>,
}

impl TimeCache {
    /// Builds a cache on the current thread.
    pub fn build_blocking<S: ProgressSink + ?Sized>(
        doc: &dyn Document,
        config: &TimeConfig,
        options: &PassOptions,
        cancel: &CancelToken,
        progress: &mut S,
    ) -> Result<Self, TimelineError> {
        pass::run_blocking(
            TimeCachePass::new(doc, config.clone()),
            doc,
            options,
            cancel,
            progress,
        )
    }

    /// Builds a cache, yielding between chunks.
    pub async fn build<S: ProgressSink + ?Sized>(
        doc: &dyn Document,
        config: &TimeConfig,
        options: &PassOptions,
        cancel: &CancelToken,
        progress: &mut S,
    ) -> Result<Self, TimelineError> {
        pass::run_cooperative(
            TimeCachePass::new(doc, config.clone()),
            doc,
            options,
            cancel,
            progress,
        )
        .await
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// A cache is only usable for a document of exactly the length it was built from.
    pub fn is_valid_for(&self, doc: &dyn Document) -> bool {
        self.times.len() == doc.line_count()
    }

    /// Cached value for `line` without any clock offset.
    pub fn raw_time_at(&self, line: usize) -> Option<DateTime<Utc>> {
        self.times.get(line).copied()
    }

    /// Time of `line` shifted by `offset`. `None` if the shifted time is not
    /// representable.
    pub fn time_at(&self, line: usize, offset: Duration) -> Option<DateTime<Utc>> {
        self.raw_time_at(line)?.checked_add_signed(offset)
    }

    /// True if every cached value stays representable when shifted by `offset`.
    pub fn accepts_offset(&self, offset: Duration) -> bool {
        let (Some(earliest), Some(latest)) = (self.times.iter().min(), self.times.iter().max())
        else {
            return true;
        };
        earliest.checked_add_signed(offset).is_some() && latest.checked_add_signed(offset).is_some()
    }

    /// Finds the line to reveal for `time`.
    ///
    /// Scans for the first line whose (offset) time is `>= time`. An exact
    /// hit returns that line; otherwise the line before it. Returns `None`
    /// when the first later line is line 0, or when no line reaches `time`.
    ///
    /// This is a linear scan. Binary search would need monotonic times, which
    /// real logs do not guarantee.
    pub fn line_at_or_before(&self, time: DateTime<Utc>, offset: Duration) -> Option<usize> {
        let target = time.checked_sub_signed(offset)?;
        let first_later = self.times.iter().position(|t| *t >= target)?;
        if self.times[first_later] == target {
            Some(first_later)
        } else {
            first_later.checked_sub(1)
        }
    }

    /// Iterates raw cached values in line order.
    pub fn iter(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.times.iter().copied()
    }
}

/// Forward-fill timestamp pass.
#[derive(Debug)]
pub struct TimeCachePass {
    config: TimeConfig,
    times: Vec<DateTime<Utc>>,
    total: usize,
}

impl TimeCachePass {
    pub fn new(doc: &dyn Document, config: TimeConfig) -> Self {
        let total = doc.line_count();
        Self {
            config,
            times: Vec::with_capacity(total),
            total,
        }
    }
}

impl ChunkedPass for TimeCachePass {
    type Output = TimeCache;

    fn total(&self) -> usize {
        self.total
    }

    fn step(&mut self, doc: &dyn Document, budget: ChunkBudget) -> PassStep<TimeCache> {
        let mut processed = 0;
        while self.times.len() < self.total {
            let line = self.times.len();
            let text = doc.line_at(line).unwrap_or_default();
            let time = self.config.parse(text).unwrap_or_else(|| {
                self.times
                    .last()
                    .copied()
                    .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
            });
            self.times.push(time);

            processed += 1;
            if budget.exhausted(processed) {
                break;
            }
        }

        if self.times.len() < self.total {
            PassStep::Continue {
                done: self.times.len(),
            }
        } else {
            tracing::debug!(lines = self.total, "time cache built");
            PassStep::Complete(TimeCache {
                times: std::mem::take(&mut self.times),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use regex::Regex;

    use crate::document::TextDocument;
    use crate::pass::NoProgress;
    use crate::time::DEFAULT_TIME_PATTERN;
    use crate::types::DocumentId;

    fn config() -> TimeConfig {
        TimeConfig::new(
            Regex::new(r"^(\d{4})-(\d{2})-(\d{2}) (\d{2}):(\d{2}):(\d{2}),(\d{3})").unwrap(),
        )
    }

    fn doc(lines: &[&str]) -> TextDocument {
        TextDocument::from_lines(DocumentId::new("cache.log").unwrap(), lines)
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, h, m, s).unwrap()
    }

    fn build(doc: &TextDocument) -> TimeCache {
        TimeCache::build_blocking(
            doc,
            &config(),
            &PassOptions::default(),
            &CancelToken::new(),
            &mut NoProgress,
        )
        .unwrap()
    }

    #[test]
    fn forward_fills_undated_lines() {
        let doc = doc(&[
            "2021-01-01 10:00:00,000 START A",
            "no timestamp here",
            "2021-01-01 10:00:05,000 END A",
        ]);
        let cache = build(&doc);

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.raw_time_at(0), Some(at(10, 0, 0)));
        assert_eq!(cache.raw_time_at(1), Some(at(10, 0, 0)));
        assert_eq!(cache.raw_time_at(2), Some(at(10, 0, 5)));
        assert_eq!(cache.raw_time_at(3), None);
    }

    #[test]
    fn leading_undated_line_is_epoch() {
        let doc = doc(&["header", "2021-01-01 10:00:00,000 x"]);
        let cache = build(&doc);
        assert_eq!(cache.raw_time_at(0), Some(DateTime::<Utc>::UNIX_EPOCH));
    }

    #[test]
    fn offset_is_applied_at_read_time() {
        let doc = doc(&["2021-01-01 10:00:00,000 x"]);
        let cache = build(&doc);
        let shifted = cache.time_at(0, Duration::milliseconds(1500)).unwrap();
        assert_eq!(shifted, at(10, 0, 0) + Duration::milliseconds(1500));
        // Cache itself is unchanged.
        assert_eq!(cache.raw_time_at(0), Some(at(10, 0, 0)));
    }

    #[test]
    fn line_at_or_before_semantics() {
        let doc = doc(&[
            "2021-01-01 10:00:00,000 a",
            "2021-01-01 10:00:10,000 b",
            "2021-01-01 10:00:20,000 c",
        ]);
        let cache = build(&doc);
        let zero = Duration::zero();

        assert_eq!(cache.line_at_or_before(at(10, 0, 10), zero), Some(1));
        assert_eq!(cache.line_at_or_before(at(10, 0, 15), zero), Some(1));
        assert_eq!(cache.line_at_or_before(at(9, 0, 0), zero), None);
        assert_eq!(cache.line_at_or_before(at(11, 0, 0), zero), None);
        // With a +10s offset line 0 reads as 10:00:10.
        assert_eq!(
            cache.line_at_or_before(at(10, 0, 10), Duration::seconds(10)),
            Some(0)
        );
    }

    #[test]
    fn unrepresentable_offsets_read_as_none() {
        let doc = doc(&["2021-01-01 10:00:00,000 a", "2021-01-01 10:00:10,000 b"]);
        let cache = build(&doc);
        let huge = DateTime::<Utc>::MAX_UTC - at(10, 0, 0);

        assert!(cache.accepts_offset(Duration::hours(1)));
        assert!(!cache.accepts_offset(huge));
        assert_eq!(cache.time_at(1, huge), None);
        assert_eq!(cache.line_at_or_before(DateTime::<Utc>::MIN_UTC, huge), None);
    }

    #[test]
    fn validity_tracks_line_count() {
        let cache = build(&doc(&["a", "b"]));
        assert!(cache.is_valid_for(&doc(&["a", "b"])));
        assert!(!cache.is_valid_for(&doc(&["a", "b", "c"])));
    }

    #[test]
    fn rebuild_is_idempotent() {
        let doc = doc(&["2021-01-01 10:00:00,000 x", "y", "2021-01-01 09:00:00,000 z"]);
        assert_eq!(build(&doc), build(&doc));
    }

    #[test]
    fn cancelling_mid_build_returns_error() {
        let lines: Vec<String> = (0..10_000)
            .map(|i| format!("2021-01-01 10:{:02}:{:02},000 line {i}", (i / 60) % 60, i % 60))
            .collect();
        let doc = TextDocument::from_lines(DocumentId::new("big.log").unwrap(), &lines);
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let options = PassOptions {
            batch_lines: 100,
            ..PassOptions::default()
        };

        let result = TimeCache::build_blocking(
            &doc,
            &config(),
            &options,
            &cancel,
            &mut |done: usize, _total: usize| {
                if done >= 500 {
                    token.cancel();
                }
            },
        );

        assert!(matches!(
            result,
            Err(TimelineError::CancelledBuild {
                lines_done: 500,
                lines_total: 10_000
            })
        ));
    }

    #[tokio::test]
    async fn cooperative_build_matches_blocking() {
        let doc = doc(&["2021-01-01 10:00:00,000 x", "y"]);
        let cache = TimeCache::build(
            &doc,
            &TimeConfig::new(Regex::new(DEFAULT_TIME_PATTERN).unwrap()),
            &PassOptions::default(),
            &CancelToken::new(),
            &mut NoProgress,
        )
        .await
        .unwrap();
        assert_eq!(cache, build(&doc));
    }
}
