//! Chunked, cancellable passes over a document.
//!
//! A pass advances one bounded chunk at a time. Between chunks the driver
//! checks the [`CancelToken`], reports progress, and (for the cooperative
//! driver) yields to the runtime. This is the only interruption mechanism;
//! both timestamp caching and event indexing run through it.
//!
//! A pass accumulates into private state and hands its output back only on
//! completion. Cancelling drops the partial state, so whatever the caller
//! published before stays untouched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::document::Document;
use crate::error::TimelineError;

/// Default number of lines per chunk.
pub const DEFAULT_BATCH_LINES: usize = 1000;

/// Default wall-time bound for a single chunk.
pub const DEFAULT_MAX_SLICE: Duration = Duration::from_millis(100);

/// How often (in lines) a chunk checks its deadline.
const DEADLINE_CHECK_INTERVAL: usize = 64;

/// Tuning for pass drivers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOptions {
    /// Maximum lines processed per chunk.
    pub batch_lines: usize,
    /// Maximum wall time spent in a chunk before it ends early.
    pub max_slice: Duration,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            batch_lines: DEFAULT_BATCH_LINES,
            max_slice: DEFAULT_MAX_SLICE,
        }
    }
}

/// Shared cancellation flag between the host and a running pass.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. The pass stops at its next chunk boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives `(lines_done, lines_total)` after every chunk.
pub trait ProgressSink {
    fn report(&mut self, done: usize, total: usize);
}

impl<F: FnMut(usize, usize)> ProgressSink for F {
    fn report(&mut self, done: usize, total: usize) {
        self(done, total);
    }
}

/// A progress sink that discards reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _done: usize, _total: usize) {}
}

/// Limits for one chunk of work.
#[derive(Debug, Clone, Copy)]
pub struct ChunkBudget {
    max_lines: usize,
    deadline: Instant,
}

impl ChunkBudget {
    fn new(options: &PassOptions) -> Self {
        Self {
            max_lines: options.batch_lines.max(1),
            deadline: Instant::now() + options.max_slice,
        }
    }

    /// A budget bounded only by line count.
    pub fn lines(max_lines: usize) -> Self {
        Self {
            max_lines: max_lines.max(1),
            deadline: Instant::now() + Duration::from_secs(3600),
        }
    }

    /// Returns true once `processed` lines exhaust the chunk.
    pub fn exhausted(&self, processed: usize) -> bool {
        if processed >= self.max_lines {
            return true;
        }
        processed > 0
            && processed % DEADLINE_CHECK_INTERVAL == 0
            && Instant::now() >= self.deadline
    }
}

/// Outcome of advancing a pass by one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassStep<T> {
    /// More lines remain; `done` lines have been processed so far.
    Continue { done: usize },
    /// The pass finished.
    Complete(T),
}

/// A resumable pass over a document's lines.
pub trait ChunkedPass {
    type Output;

    /// Total number of lines the pass will visit.
    fn total(&self) -> usize;

    /// Processes lines until the budget is exhausted or the document ends.
    fn step(&mut self, doc: &dyn Document, budget: ChunkBudget) -> PassStep<Self::Output>;
}

/// Drives `pass` to completion on the current thread.
pub fn run_blocking<P, S>(
    mut pass: P,
    doc: &dyn Document,
    options: &PassOptions,
    cancel: &CancelToken,
    progress: &mut S,
) -> Result<P::Output, TimelineError>
where
    P: ChunkedPass,
    S: ProgressSink + ?Sized,
{
    let total = pass.total();
    let mut done = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(done, total));
        }
        match pass.step(doc, ChunkBudget::new(options)) {
            PassStep::Complete(output) => {
                progress.report(total, total);
                return Ok(output);
            }
            PassStep::Continue { done: now } => {
                done = now;
                progress.report(done, total);
            }
        }
    }
}

/// Drives `pass` to completion, yielding to the async runtime between chunks.
pub async fn run_cooperative<P, S>(
    mut pass: P,
    doc: &dyn Document,
    options: &PassOptions,
    cancel: &CancelToken,
    progress: &mut S,
) -> Result<P::Output, TimelineError>
where
    P: ChunkedPass,
    S: ProgressSink + ?Sized,
{
    let total = pass.total();
    let mut done = 0;
    loop {
        if cancel.is_cancelled() {
            return Err(cancelled(done, total));
        }
        match pass.step(doc, ChunkBudget::new(options)) {
            PassStep::Complete(output) => {
                progress.report(total, total);
                return Ok(output);
            }
            PassStep::Continue { done: now } => {
                done = now;
                progress.report(done, total);
                tokio::task::yield_now().await;
            }
        }
    }
}

fn cancelled(done: usize, total: usize) -> TimelineError {
    tracing::debug!(done, total, "pass cancelled");
    TimelineError::CancelledBuild {
        lines_done: done,
        lines_total: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::document::TextDocument;
    use crate::types::DocumentId;

    /// Counts lines; completes with the count.
    struct CountPass {
        next: usize,
        total: usize,
    }

    impl ChunkedPass for CountPass {
        type Output = usize;

        fn total(&self) -> usize {
            self.total
        }

        fn step(&mut self, _doc: &dyn Document, budget: ChunkBudget) -> PassStep<usize> {
            let mut processed = 0;
            while self.next < self.total {
                self.next += 1;
                processed += 1;
                if budget.exhausted(processed) {
                    break;
                }
            }
            if self.next == self.total {
                PassStep::Complete(self.next)
            } else {
                PassStep::Continue { done: self.next }
            }
        }
    }

    fn doc(lines: usize) -> TextDocument {
        let text = vec!["x"; lines].join("\n");
        TextDocument::new(DocumentId::new("count.log").unwrap(), text)
    }

    fn options(batch_lines: usize) -> PassOptions {
        PassOptions {
            batch_lines,
            ..PassOptions::default()
        }
    }

    #[test]
    fn blocking_reports_progress_per_chunk() {
        let doc = doc(250);
        let mut reports = Vec::new();
        let out = run_blocking(
            CountPass { next: 0, total: 250 },
            &doc,
            &options(100),
            &CancelToken::new(),
            &mut |done: usize, total: usize| reports.push((done, total)),
        )
        .unwrap();

        assert_eq!(out, 250);
        assert_eq!(reports, vec![(100, 250), (200, 250), (250, 250)]);
    }

    #[test]
    fn pre_cancelled_token_does_no_work() {
        let doc = doc(10);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = run_blocking(
            CountPass { next: 0, total: 10 },
            &doc,
            &PassOptions::default(),
            &cancel,
            &mut NoProgress,
        )
        .unwrap_err();
        assert_eq!(
            err,
            TimelineError::CancelledBuild {
                lines_done: 0,
                lines_total: 10
            }
        );
    }

    #[test]
    fn cancel_from_progress_stops_at_next_boundary() {
        let doc = doc(1000);
        let cancel = CancelToken::new();
        let token = cancel.clone();
        let err = run_blocking(
            CountPass { next: 0, total: 1000 },
            &doc,
            &options(100),
            &cancel,
            &mut |done: usize, _total: usize| {
                if done >= 300 {
                    token.cancel();
                }
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            TimelineError::CancelledBuild {
                lines_done: 300,
                lines_total: 1000
            }
        );
    }

    #[test]
    fn zero_batch_is_treated_as_one() {
        let budget = ChunkBudget::lines(0);
        assert!(budget.exhausted(1));
    }

    #[tokio::test]
    async fn cooperative_matches_blocking() {
        let doc = doc(2500);
        let out = run_cooperative(
            CountPass { next: 0, total: 2500 },
            &doc,
            &PassOptions::default(),
            &CancelToken::new(),
            &mut NoProgress,
        )
        .await
        .unwrap();
        assert_eq!(out, 2500);
    }
}
