//! Fingerprint exchange and clock reconciliation.
//!
//! Each side matches the other's fingerprints to its own by id and value.
//! For a matched pair, the side with the lower priority number is
//! authoritative:
//!
//! - a remote fingerprint that outranks the local one yields a candidate
//!   offset `remote.time - local.time`;
//! - a local fingerprint that outranks the remote one is sent back so the
//!   other side can correct itself.
//!
//! The mean of all candidates is added to the document's clock offset when
//! it exceeds [`RECONCILE_THRESHOLD`].
//!
//! Documents open in the same [`Timeline`] sync with each other too: every
//! outgoing message is also queued locally and handled by the next
//! [`TimeSyncCoordinator::drain`] or [`TimeSyncCoordinator::next`].

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use lt_core::{DocumentId, DocumentLocation, Fingerprint, Timeline, TimelineError};

use crate::error::SyncError;
use crate::message::SyncMessage;
use crate::peer::{PeerInbox, PeerRegistry};

/// Offsets at or below this magnitude are not applied.
pub const RECONCILE_THRESHOLD: Duration = Duration::milliseconds(100);

/// What handling one or more incoming messages did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Lines the host should reveal for an announced selected time.
    pub reveal: Vec<DocumentLocation>,
    /// Documents whose clock offset was set, with the new offset.
    pub adjusted: Vec<(DocumentId, Duration)>,
    /// Number of documents that sent their fingerprints back.
    pub rebroadcasts: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.reveal.is_empty() && self.adjusted.is_empty() && self.rebroadcasts == 0
    }

    fn merge(&mut self, other: Self) {
        self.reveal.extend(other.reveal);
        self.adjusted.extend(other.adjusted);
        self.rebroadcasts += other.rebroadcasts;
    }
}

/// Coordinates time sync for every document of one [`Timeline`].
#[derive(Debug)]
pub struct TimeSyncCoordinator<R> {
    timeline: Timeline,
    registry: R,
    externally_synced: HashSet<DocumentId>,
    last_selected: Option<DateTime<Utc>>,
    local: VecDeque<SyncMessage>,
}

impl<R: PeerRegistry> TimeSyncCoordinator<R> {
    pub fn new(timeline: Timeline, registry: R) -> Self {
        Self {
            timeline,
            registry,
            externally_synced: HashSet::new(),
            last_selected: None,
            local: VecDeque::new(),
        }
    }

    pub const fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub const fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.timeline
    }

    pub const fn registry(&self) -> &R {
        &self.registry
    }

    /// True once reconciliation has set the document's offset.
    pub fn is_externally_synced(&self, doc: &DocumentId) -> bool {
        self.externally_synced.contains(doc)
    }

    /// Most recent selected time announced by a peer.
    pub const fn last_selected_time(&self) -> Option<DateTime<Utc>> {
        self.last_selected
    }

    /// Messages sent by one local document and not yet handled by the others.
    pub fn pending_local(&self) -> usize {
        self.local.len()
    }

    /// Sends `message` to every peer and returns how many accepted it. The
    /// message is queued locally when another document is open.
    fn send_all(&mut self, message: SyncMessage) -> usize {
        if self.timeline.documents().any(|doc| *doc != message.sender) {
            self.local.push_back(message.clone());
        }
        let mut delivered = 0;
        for peer in self.registry.list_peers() {
            match peer.send(&message) {
                Ok(()) => delivered += 1,
                Err(err) => tracing::warn!(peer = %peer.id(), error = %err, "sync delivery failed"),
            }
        }
        delivered
    }

    /// Sends the document's fingerprints to all peers. Returns the number of
    /// peers reached; nothing is sent when the document has no fingerprints.
    pub fn broadcast_time_syncs(&mut self, doc: &DocumentId) -> Result<usize, SyncError> {
        if !self.timeline.is_open(doc) {
            return Err(SyncError::UnknownDocument(doc.clone()));
        }
        let fingerprints: Vec<Fingerprint> = self
            .timeline
            .sync_events(doc)
            .iter()
            .map(|event| event.fingerprint.clone())
            .collect();
        if fingerprints.is_empty() {
            return Ok(0);
        }
        tracing::debug!(
            document = %doc,
            fingerprints = fingerprints.len(),
            "broadcasting time syncs"
        );
        Ok(self.send_all(SyncMessage::fingerprints(doc.clone(), fingerprints)))
    }

    /// Announces the time of `line` as the selected time.
    pub fn announce_selection(
        &mut self,
        doc: &DocumentId,
        line: usize,
    ) -> Result<usize, SyncError> {
        let time = self.timeline.time_at(doc, line)?.ok_or_else(|| {
            SyncError::NoTimeAtLine(DocumentLocation {
                document: doc.clone(),
                line,
            })
        })?;
        Ok(self.send_all(SyncMessage::selected(doc.clone(), time)))
    }

    /// Adds `delta` to the document's clock offset and re-broadcasts its
    /// fingerprints. Returns the new offset.
    pub fn adjust_time(
        &mut self,
        doc: &DocumentId,
        delta: Duration,
    ) -> Result<Duration, SyncError> {
        let offset = self.timeline.adjust_clock(doc, delta)?;
        tracing::info!(document = %doc, offset_ms = offset.num_milliseconds(), "clock adjusted");
        self.broadcast_time_syncs(doc)?;
        Ok(offset)
    }

    /// Sets the document's clock offset as a manual adjustment.
    pub fn set_time_offset(
        &mut self,
        doc: &DocumentId,
        offset: Duration,
    ) -> Result<Duration, SyncError> {
        let current = self.timeline.clock_offset(doc)?;
        let delta = offset
            .checked_sub(&current)
            .ok_or_else(|| TimelineError::OffsetOutOfRange(doc.clone()))?;
        self.adjust_time(doc, delta)
    }

    /// Shifts the document so that `line` lands on the last selected time a
    /// peer announced.
    pub fn adjust_to_last_selected(
        &mut self,
        doc: &DocumentId,
        line: usize,
    ) -> Result<Duration, SyncError> {
        if self.is_externally_synced(doc) {
            return Err(SyncError::ExternallySynced(doc.clone()));
        }
        let selected = self.last_selected.ok_or(SyncError::NoSelectedTime)?;
        let time = self.timeline.time_at(doc, line)?.ok_or_else(|| {
            SyncError::NoTimeAtLine(DocumentLocation {
                document: doc.clone(),
                line,
            })
        })?;
        self.adjust_time(doc, selected - time)
    }

    /// Applies one peer message to every local document except its sender.
    pub fn handle_incoming(&mut self, message: &SyncMessage) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        let mut documents: Vec<DocumentId> = self
            .timeline
            .documents()
            .filter(|doc| **doc != message.sender)
            .cloned()
            .collect();
        documents.sort();

        if let Some(selected) = message.selected_time {
            self.last_selected = Some(selected);
            for doc in &documents {
                if let Some(line) = self.timeline.line_at_or_before(doc, selected)? {
                    report.reveal.push(DocumentLocation {
                        document: doc.clone(),
                        line,
                    });
                }
            }
        }

        if !message.time_syncs.is_empty() {
            for doc in documents {
                self.reconcile(doc, &message.time_syncs, &mut report)?;
            }
        }
        Ok(report)
    }

    fn reconcile(
        &mut self,
        doc: DocumentId,
        remote: &[Fingerprint],
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let mut offsets = Vec::new();
        let mut outranking = Vec::new();
        for event in self.timeline.sync_events(&doc) {
            let local = &event.fingerprint;
            let mut outranks = false;
            for peer in remote.iter().filter(|peer| local.same_event(peer)) {
                if peer.priority < local.priority {
                    offsets.push(peer.time - local.time);
                } else if peer.priority > local.priority {
                    outranks = true;
                }
            }
            if outranks {
                outranking.push(local.clone());
            }
        }

        if let Some(mean) = mean(&offsets) {
            tracing::debug!(
                document = %doc,
                candidates = offsets.len(),
                mean_ms = mean.num_milliseconds(),
                "reconciling"
            );
            if mean.abs() > RECONCILE_THRESHOLD {
                match self.timeline.adjust_clock(&doc, mean) {
                    Ok(offset) => {
                        tracing::info!(
                            document = %doc,
                            offset_ms = offset.num_milliseconds(),
                            "clock synced from peer"
                        );
                        self.externally_synced.insert(doc.clone());
                        report.adjusted.push((doc, offset));
                        return Ok(());
                    }
                    Err(TimelineError::OffsetOutOfRange(_)) => {
                        tracing::warn!(
                            document = %doc,
                            mean_ms = mean.num_milliseconds(),
                            "ignoring peer offset out of range"
                        );
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }

        if !outranking.is_empty() {
            tracing::debug!(
                document = %doc,
                fingerprints = outranking.len(),
                "re-broadcasting outranking fingerprints"
            );
            self.send_all(SyncMessage::fingerprints(doc, outranking));
            report.rebroadcasts += 1;
        }
        Ok(())
    }

    /// Handles every message already queued locally or in `inbox`. Local
    /// messages sent while draining wait for the next call.
    pub fn drain(&mut self, inbox: &mut PeerInbox) -> Result<SyncReport, SyncError> {
        let mut report = SyncReport::default();
        for _ in 0..self.local.len() {
            let Some(message) = self.local.pop_front() else {
                break;
            };
            report.merge(self.handle_incoming(&message)?);
        }
        while let Some(message) = inbox.try_recv() {
            report.merge(self.handle_incoming(&message?)?);
        }
        Ok(report)
    }

    /// Handles the next queued local message, or waits for the next message
    /// in `inbox`. `None` once the inbox is closed.
    pub async fn next(
        &mut self,
        inbox: &mut PeerInbox,
    ) -> Option<Result<SyncReport, SyncError>> {
        if let Some(message) = self.local.pop_front() {
            return Some(self.handle_incoming(&message));
        }
        let message = inbox.recv().await?;
        Some(message.and_then(|message| self.handle_incoming(&message)))
    }
}

/// Arithmetic mean, truncated to whole milliseconds.
fn mean(offsets: &[Duration]) -> Option<Duration> {
    if offsets.is_empty() {
        return None;
    }
    let total: i128 = offsets.iter().map(|d| i128::from(d.num_milliseconds())).sum();
    let count = i128::try_from(offsets.len()).ok()?;
    Duration::try_milliseconds(i64::try_from(total / count).ok()?)
}
