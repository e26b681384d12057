//! Timeline engine for line-oriented log documents.
//!
//! This crate contains the fundamental types and logic for:
//! - Timestamp extraction: parsing per-line timestamps with forward-fill caching
//! - Event indexing: leveled regex rules building an event tree and decorations
//! - Config matching: picking the file config that best explains a document
//! - The per-document [`Timeline`] engine tying the passes together

mod cache;
pub mod config;
pub mod document;
mod error;
pub mod indexer;
mod matcher;
pub mod pass;
pub mod time;
mod timeline;
pub mod tree;
pub mod types;

pub use cache::{TimeCache, TimeCachePass};
pub use config::{CompiledSettings, DecorationRegistry, EventRule, FileConfig, Settings};
pub use document::{Document, LineRange, TextDocument};
pub use error::{ConfigError, TimelineError};
pub use indexer::{
    Decoration, DecorationBucket, DecorationSet, Fingerprint, IndexOutput, IndexPass, SyncEvent,
};
pub use matcher::{SAMPLE_LINES, SelectedConfig, select_config};
pub use pass::{
    CancelToken, ChunkBudget, ChunkedPass, NoProgress, PassOptions, PassStep, ProgressSink,
};
pub use time::{DEFAULT_TIME_PATTERN, DateFormat, TimeConfig, parse_line};
pub use timeline::{DocumentPhase, RefreshOutput, RefreshPlan, Timeline};
pub use tree::{EventTree, NodeId, NodeSnapshot, Presentation};
pub use types::{DocumentId, DocumentLocation, ValidationError};
