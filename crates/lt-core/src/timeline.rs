//! Per-document engine state.
//!
//! A [`Timeline`] tracks every open document through an explicit state
//! machine:
//!
//! ```text
//! Unconfigured --select--> Configured --plan--> Indexing --commit--> Ready
//!       ^                      ^                    |                  |
//!       |                      +------abandon-------+                  |
//!       +---------------- settings changed ----------------------------+
//! ```
//!
//! Refreshing is split in three so the long-running passes never hold the
//! engine: [`Timeline::plan_refresh`] snapshots what a pass needs,
//! [`RefreshPlan::run`] (or [`RefreshPlan::run_blocking`]) builds the time
//! cache and event index, and [`Timeline::commit`] publishes the result.
//! Commits are last-writer-wins per document; results planned before the
//! document last changed are dropped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::cache::{TimeCache, TimeCachePass};
use crate::config::{CompiledSettings, DecorationRegistry, FileConfig};
use crate::document::Document;
use crate::error::TimelineError;
use crate::indexer::{DecorationSet, IndexOutput, IndexPass, SyncEvent};
use crate::matcher::{SelectedConfig, select_config};
use crate::pass::{self, CancelToken, PassOptions, ProgressSink};
use crate::tree::{EventTree, NodeId, Presentation};
use crate::types::DocumentId;

/// Lifecycle state of one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentPhase {
    /// No file config identifies the document (yet).
    Unconfigured,
    /// A file config is selected; no current index.
    Configured(String),
    /// A refresh has been planned and not yet committed.
    Indexing,
    /// Cache and index are current.
    Ready,
}

#[derive(Debug)]
struct DocumentEntry {
    phase: DocumentPhase,
    selected: Option<SelectedConfig>,
    times: Option<Arc<TimeCache>>,
    index: Option<IndexOutput>,
    clock_offset: Duration,
    generation: u64,
}

impl DocumentEntry {
    fn configured_phase(&self) -> DocumentPhase {
        self.selected.as_ref().map_or(DocumentPhase::Unconfigured, |s| {
            DocumentPhase::Configured(s.config.name.clone())
        })
    }

    /// Fingerprints whose shifted time is not representable are dropped,
    /// the same as events on lines without a time.
    fn shift_fingerprints(&mut self, delta: Duration) {
        if delta.is_zero() {
            return;
        }
        if let Some(index) = &mut self.index {
            index.sync_events.retain_mut(|event| {
                match event.fingerprint.time.checked_add_signed(delta) {
                    Some(time) => {
                        event.fingerprint.time = time;
                        true
                    }
                    None => false,
                }
            });
        }
    }

    /// Rejects offsets that would push a cached time out of range.
    fn check_offset(&self, id: &DocumentId, offset: Duration) -> Result<(), TimelineError> {
        match &self.times {
            Some(times) if !times.accepts_offset(offset) => {
                Err(TimelineError::OffsetOutOfRange(id.clone()))
            }
            _ => Ok(()),
        }
    }
}

/// Engine holding every open document's cache, tree and clock offset.
#[derive(Debug)]
pub struct Timeline {
    settings: CompiledSettings,
    options: PassOptions,
    documents: HashMap<DocumentId, DocumentEntry>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(CompiledSettings::default())
    }
}

impl Timeline {
    pub fn new(settings: CompiledSettings) -> Self {
        Self::with_options(settings, PassOptions::default())
    }

    pub fn with_options(settings: CompiledSettings, options: PassOptions) -> Self {
        Self {
            settings,
            options,
            documents: HashMap::new(),
        }
    }

    pub const fn settings(&self) -> &CompiledSettings {
        &self.settings
    }

    pub const fn options(&self) -> &PassOptions {
        &self.options
    }

    /// Registers `doc` and selects its file config. Reopening an open
    /// document behaves like a content change.
    pub fn open(&mut self, doc: &dyn Document) -> DocumentPhase {
        if self.documents.contains_key(doc.id()) {
            return self.document_changed(doc);
        }
        let selected = select_config(doc, &self.settings);
        let mut entry = DocumentEntry {
            phase: DocumentPhase::Unconfigured,
            selected,
            times: None,
            index: None,
            clock_offset: Duration::zero(),
            generation: 0,
        };
        entry.phase = entry.configured_phase();
        tracing::debug!(document = %doc.id(), phase = ?entry.phase, "document opened");
        let phase = entry.phase.clone();
        self.documents.insert(doc.id().clone(), entry);
        phase
    }

    /// Forgets a document. Returns false if it was not open.
    pub fn close(&mut self, id: &DocumentId) -> bool {
        self.documents.remove(id).is_some()
    }

    pub fn is_open(&self, id: &DocumentId) -> bool {
        self.documents.contains_key(id)
    }

    /// Open documents, in no particular order.
    pub fn documents(&self) -> impl Iterator<Item = &DocumentId> {
        self.documents.keys()
    }

    /// Invalidates the time cache after an edit. A selected config is kept;
    /// an unconfigured document gets another selection attempt.
    pub fn document_changed(&mut self, doc: &dyn Document) -> DocumentPhase {
        let Some(entry) = self.documents.get_mut(doc.id()) else {
            return self.open(doc);
        };
        entry.generation += 1;
        entry.times = None;
        if entry.selected.is_none() {
            entry.selected = select_config(doc, &self.settings);
        }
        entry.phase = entry.configured_phase();
        entry.phase.clone()
    }

    /// Replaces the settings and resets every document to unconfigured.
    /// Clock offsets survive.
    pub fn settings_changed(&mut self, settings: CompiledSettings) {
        self.settings = settings;
        for entry in self.documents.values_mut() {
            entry.generation += 1;
            entry.phase = DocumentPhase::Unconfigured;
            entry.selected = None;
            entry.times = None;
            entry.index = None;
        }
        tracing::debug!(documents = self.documents.len(), "settings changed");
    }

    fn entry(&self, id: &DocumentId) -> Result<&DocumentEntry, TimelineError> {
        self.documents
            .get(id)
            .ok_or_else(|| TimelineError::UnknownDocument(id.clone()))
    }

    fn entry_mut(&mut self, id: &DocumentId) -> Result<&mut DocumentEntry, TimelineError> {
        self.documents
            .get_mut(id)
            .ok_or_else(|| TimelineError::UnknownDocument(id.clone()))
    }

    pub fn phase(&self, id: &DocumentId) -> Result<DocumentPhase, TimelineError> {
        Ok(self.entry(id)?.phase.clone())
    }

    pub fn selected_config(&self, id: &DocumentId) -> Option<&SelectedConfig> {
        self.documents.get(id)?.selected.as_ref()
    }

    /// Snapshots what a refresh of `doc` needs and moves it to `Indexing`.
    ///
    /// Selects a config first if none is selected. A still-valid time cache
    /// is reused.
    pub fn plan_refresh(&mut self, doc: &dyn Document) -> Result<RefreshPlan, TimelineError> {
        let id = doc.id().clone();
        let settings = &self.settings;
        let entry = self
            .documents
            .get_mut(&id)
            .ok_or_else(|| TimelineError::UnknownDocument(id.clone()))?;

        if entry.selected.is_none() {
            entry.selected = select_config(doc, settings);
        }
        let Some(selected) = &entry.selected else {
            entry.phase = DocumentPhase::Unconfigured;
            return Err(TimelineError::NoConfigMatched(id));
        };

        let times = entry
            .times
            .as_ref()
            .filter(|times| times.is_valid_for(doc))
            .map(Arc::clone);
        let plan = RefreshPlan {
            document: id,
            generation: entry.generation,
            config: Arc::clone(&selected.config),
            registry: Arc::clone(&settings.decorations),
            times,
            offset: entry.clock_offset,
            options: self.options.clone(),
        };
        entry.phase = DocumentPhase::Indexing;
        Ok(plan)
    }

    /// Publishes a finished refresh. Returns false if the result was planned
    /// before the document last changed and was dropped.
    pub fn commit(&mut self, output: RefreshOutput) -> Result<bool, TimelineError> {
        let entry = self.entry_mut(&output.document)?;
        if output.generation != entry.generation {
            tracing::debug!(
                document = %output.document,
                planned = output.generation,
                current = entry.generation,
                "dropping stale refresh"
            );
            return Ok(false);
        }

        let mut index = output.index;
        if let Some(previous) = &entry.index {
            let mut presentation = std::mem::take(&mut index.presentation);
            presentation.carry_selection(&previous.presentation, &previous.tree, &index.tree);
            index.presentation = presentation;
        }
        entry.times = Some(output.times);
        entry.index = Some(index);
        match entry.clock_offset.checked_sub(&output.offset) {
            Some(delta) => entry.shift_fingerprints(delta),
            None => {
                if let Some(index) = &mut entry.index {
                    index.sync_events.clear();
                }
            }
        }
        entry.phase = DocumentPhase::Ready;
        Ok(true)
    }

    /// Returns a document left in `Indexing` by a failed or cancelled pass to
    /// its previous settled phase.
    pub fn abandon(&mut self, id: &DocumentId) {
        if let Some(entry) = self.documents.get_mut(id)
            && entry.phase == DocumentPhase::Indexing
        {
            entry.phase = if entry.index.is_some() && entry.times.is_some() {
                DocumentPhase::Ready
            } else {
                entry.configured_phase()
            };
        }
    }

    /// Plans, runs and commits a refresh on the current thread.
    pub fn refresh_blocking<S: ProgressSink + ?Sized>(
        &mut self,
        doc: &dyn Document,
        cancel: &CancelToken,
        progress: &mut S,
    ) -> Result<(), TimelineError> {
        let plan = self.plan_refresh(doc)?;
        match plan.run_blocking(doc, cancel, progress) {
            Ok(output) => self.commit(output).map(drop),
            Err(err) => {
                self.abandon(doc.id());
                Err(err)
            }
        }
    }

    /// Plans, runs and commits a refresh, yielding between chunks.
    pub async fn refresh<S: ProgressSink + ?Sized>(
        &mut self,
        doc: &dyn Document,
        cancel: &CancelToken,
        progress: &mut S,
    ) -> Result<(), TimelineError> {
        let plan = self.plan_refresh(doc)?;
        match plan.run(doc, cancel, progress).await {
            Ok(output) => self.commit(output).map(drop),
            Err(err) => {
                self.abandon(doc.id());
                Err(err)
            }
        }
    }

    /// Time of `line` with the clock offset applied. `None` without a
    /// current cache or past the last line.
    pub fn time_at(
        &self,
        id: &DocumentId,
        line: usize,
    ) -> Result<Option<DateTime<Utc>>, TimelineError> {
        let entry = self.entry(id)?;
        Ok(entry
            .times
            .as_ref()
            .and_then(|times| times.time_at(line, entry.clock_offset)))
    }

    /// Line to reveal for `time`; see [`TimeCache::line_at_or_before`].
    pub fn line_at_or_before(
        &self,
        id: &DocumentId,
        time: DateTime<Utc>,
    ) -> Result<Option<usize>, TimelineError> {
        let entry = self.entry(id)?;
        Ok(entry
            .times
            .as_ref()
            .and_then(|times| times.line_at_or_before(time, entry.clock_offset)))
    }

    /// Hover text for `line`, e.g. `calculated time: 10:00:05.000 line#=2`.
    pub fn hover_text(
        &self,
        id: &DocumentId,
        line: usize,
    ) -> Result<Option<String>, TimelineError> {
        Ok(self.time_at(id, line)?.map(|time| {
            format!(
                "calculated time: {} line#={line}",
                time.format("%H:%M:%S%.3f")
            )
        }))
    }

    pub fn tree(&self, id: &DocumentId) -> Option<&EventTree> {
        Some(&self.documents.get(id)?.index.as_ref()?.tree)
    }

    pub fn presentation(&self, id: &DocumentId) -> Option<&Presentation> {
        Some(&self.documents.get(id)?.index.as_ref()?.presentation)
    }

    /// Selects `node` in the document's tree. Returns false if the node is
    /// not part of the current tree.
    pub fn select_node(&mut self, id: &DocumentId, node: NodeId) -> Result<bool, TimelineError> {
        let entry = self.entry_mut(id)?;
        let Some(index) = &mut entry.index else {
            return Ok(false);
        };
        if index.tree.get(node).is_none() {
            return Ok(false);
        }
        index.presentation.select(node);
        Ok(true)
    }

    pub fn decorations(&self, id: &DocumentId) -> Option<&DecorationSet> {
        Some(&self.documents.get(id)?.index.as_ref()?.decorations)
    }

    /// Fingerprints of the current index; empty if there is none.
    pub fn sync_events(&self, id: &DocumentId) -> &[SyncEvent] {
        self.documents
            .get(id)
            .and_then(|entry| entry.index.as_ref())
            .map(|index| index.sync_events.as_slice())
            .unwrap_or_default()
    }

    pub fn clock_offset(&self, id: &DocumentId) -> Result<Duration, TimelineError> {
        Ok(self.entry(id)?.clock_offset)
    }

    /// Sets the clock offset. Cached times are untouched; fingerprint times
    /// move by the difference.
    ///
    /// Fails with [`TimelineError::OffsetOutOfRange`] if a cached time would
    /// leave the representable range; the offset is then unchanged.
    pub fn set_clock_offset(
        &mut self,
        id: &DocumentId,
        offset: Duration,
    ) -> Result<(), TimelineError> {
        let entry = self.entry_mut(id)?;
        let delta = offset
            .checked_sub(&entry.clock_offset)
            .ok_or_else(|| TimelineError::OffsetOutOfRange(id.clone()))?;
        entry.check_offset(id, offset)?;
        entry.clock_offset = offset;
        entry.shift_fingerprints(delta);
        Ok(())
    }

    /// Adds `delta` to the clock offset and returns the new offset.
    pub fn adjust_clock(
        &mut self,
        id: &DocumentId,
        delta: Duration,
    ) -> Result<Duration, TimelineError> {
        let entry = self.entry_mut(id)?;
        let offset = entry
            .clock_offset
            .checked_add(&delta)
            .ok_or_else(|| TimelineError::OffsetOutOfRange(id.clone()))?;
        entry.check_offset(id, offset)?;
        entry.clock_offset = offset;
        entry.shift_fingerprints(delta);
        Ok(offset)
    }
}

/// Everything a refresh needs, detached from the [`Timeline`].
#[derive(Debug, Clone)]
pub struct RefreshPlan {
    document: DocumentId,
    generation: u64,
    config: Arc<FileConfig>,
    registry: Arc<DecorationRegistry>,
    times: Option<Arc<TimeCache>>,
    offset: Duration,
    options: PassOptions,
}

impl RefreshPlan {
    pub const fn document(&self) -> &DocumentId {
        &self.document
    }

    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    /// True if the plan reuses a still-valid time cache.
    pub const fn reuses_cache(&self) -> bool {
        self.times.is_some()
    }

    /// Builds the time cache (unless reused) and the event index on the
    /// current thread.
    pub fn run_blocking<S: ProgressSink + ?Sized>(
        self,
        doc: &dyn Document,
        cancel: &CancelToken,
        progress: &mut S,
    ) -> Result<RefreshOutput, TimelineError> {
        let times = match &self.times {
            Some(times) => Arc::clone(times),
            None => Arc::new(pass::run_blocking(
                TimeCachePass::new(doc, self.config.time.clone()),
                doc,
                &self.options,
                cancel,
                progress,
            )?),
        };
        let index = pass::run_blocking(
            self.index_pass(doc, &times),
            doc,
            &self.options,
            cancel,
            progress,
        )?;
        Ok(self.finish(times, index))
    }

    /// Like [`RefreshPlan::run_blocking`], yielding between chunks.
    pub async fn run<S: ProgressSink + ?Sized>(
        self,
        doc: &dyn Document,
        cancel: &CancelToken,
        progress: &mut S,
    ) -> Result<RefreshOutput, TimelineError> {
        let times = match &self.times {
            Some(times) => Arc::clone(times),
            None => Arc::new(
                pass::run_cooperative(
                    TimeCachePass::new(doc, self.config.time.clone()),
                    doc,
                    &self.options,
                    cancel,
                    progress,
                )
                .await?,
            ),
        };
        let index = pass::run_cooperative(
            self.index_pass(doc, &times),
            doc,
            &self.options,
            cancel,
            progress,
        )
        .await?;
        Ok(self.finish(times, index))
    }

    fn index_pass(&self, doc: &dyn Document, times: &Arc<TimeCache>) -> IndexPass {
        IndexPass::new(
            doc,
            Arc::clone(&self.config),
            Arc::clone(&self.registry),
            Arc::clone(times),
            self.offset,
        )
    }

    fn finish(self, times: Arc<TimeCache>, index: IndexOutput) -> RefreshOutput {
        RefreshOutput {
            document: self.document,
            generation: self.generation,
            times,
            index,
            offset: self.offset,
        }
    }
}

/// Result of a completed refresh, ready for [`Timeline::commit`].
#[derive(Debug)]
pub struct RefreshOutput {
    document: DocumentId,
    generation: u64,
    times: Arc<TimeCache>,
    index: IndexOutput,
    offset: Duration,
}

impl RefreshOutput {
    pub const fn document(&self) -> &DocumentId {
        &self.document
    }

    pub const fn index(&self) -> &IndexOutput {
        &self.index
    }
}
