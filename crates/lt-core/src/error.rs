//! Error types for the timeline engine.

use thiserror::Error;

use crate::types::DocumentId;

/// Errors raised while compiling configuration records.
///
/// None of these are fatal: the offending rule or file config is skipped and
/// compilation continues with the rest.
#[derive(Debug, Error, Clone)]
pub enum ConfigError {
    /// An event rule's pattern failed to compile.
    #[error("file config {config}: event rule {index} has an invalid regex")]
    MalformedRuleConfig {
        config: String,
        index: usize,
        #[source]
        source: regex::Error,
    },
    /// A file config's identify pattern failed to compile.
    #[error("file config {config}: invalid identifyRegex")]
    InvalidIdentifyPattern {
        config: String,
        #[source]
        source: regex::Error,
    },
    /// A time pattern failed to compile.
    #[error("invalid timeRegex for {scope}")]
    InvalidTimePattern {
        scope: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors surfaced by the [`Timeline`](crate::Timeline) engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimelineError {
    /// No file config explains this document. The document is inert.
    #[error("no file config matches document {0}")]
    NoConfigMatched(DocumentId),
    /// A pass was cancelled before completing. Prior state is unchanged.
    #[error("build cancelled after {lines_done} of {lines_total} lines")]
    CancelledBuild {
        lines_done: usize,
        lines_total: usize,
    },
    /// The document was never opened, or has been closed.
    #[error("unknown document: {0}")]
    UnknownDocument(DocumentId),
    /// The clock offset would move a cached time outside the representable range.
    #[error("clock offset for {0} is out of range")]
    OffsetOutOfRange(DocumentId),
}
