//! Sync command: line up several files on a common clock.
//!
//! Every file becomes its own peer on an in-process hub, as if each were
//! open in a separate viewer. Each peer broadcasts its fingerprints, then the
//! hub is pumped until no peer has anything left to do.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Args;
use lt_core::{Document, TextDocument};
use lt_sync::{ChannelHub, HubMember, PeerInbox, SyncReport, TimeSyncCoordinator};

use super::util::{format_offset, open_document, refresh};
use crate::Config;

/// Default upper bound on hub rounds.
const DEFAULT_MAX_ROUNDS: usize = 16;

#[derive(Debug, Args)]
pub struct SyncArgs {
    /// Log files to synchronize.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Stop after this many rounds even if peers are still exchanging.
    #[arg(long, default_value_t = DEFAULT_MAX_ROUNDS)]
    pub max_rounds: usize,
}

pub fn run<W: Write>(writer: &mut W, args: &SyncArgs, config: &Config) -> Result<()> {
    let docs = args
        .files
        .iter()
        .map(|path| open_document(path))
        .collect::<Result<Vec<_>>>()?;
    let lines = sync_documents(&docs, config, args.max_rounds)?;
    for line in lines {
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

struct Participant<'a> {
    doc: &'a TextDocument,
    coordinator: TimeSyncCoordinator<HubMember>,
    inbox: PeerInbox,
}

/// Runs the exchange and returns one result line per document, in order.
pub fn sync_documents(
    docs: &[TextDocument],
    config: &Config,
    max_rounds: usize,
) -> Result<Vec<String>> {
    let hub = ChannelHub::new();
    let mut participants = Vec::with_capacity(docs.len());
    for doc in docs {
        let mut timeline = config.timeline();
        if let Err(err) = refresh(&mut timeline, doc) {
            tracing::warn!(document = %doc.id(), error = %err, "document takes no part in sync");
        }
        let (member, inbox) = hub.join();
        participants.push(Participant {
            doc,
            coordinator: TimeSyncCoordinator::new(timeline, member),
            inbox,
        });
    }

    for participant in &mut participants {
        let sent = participant
            .coordinator
            .broadcast_time_syncs(participant.doc.id())?;
        tracing::debug!(document = %participant.doc.id(), peers = sent, "fingerprints sent");
    }

    let mut settled = false;
    for round in 1..=max_rounds {
        let mut report = SyncReport::default();
        for participant in &mut participants {
            let step = participant.coordinator.drain(&mut participant.inbox)?;
            report.adjusted.extend(step.adjusted);
            report.rebroadcasts += step.rebroadcasts;
        }
        tracing::debug!(
            round,
            adjusted = report.adjusted.len(),
            rebroadcasts = report.rebroadcasts,
            "sync round"
        );
        if report.is_empty() {
            settled = true;
            break;
        }
    }
    if !settled {
        bail!("peers did not settle within {max_rounds} rounds");
    }

    participants
        .iter()
        .map(|participant| -> Result<String> {
            let id = participant.doc.id();
            let timeline = participant.coordinator.timeline();
            let offset = timeline.clock_offset(id)?;
            let mut line = format!("{id}  {}", format_offset(offset));
            if participant.coordinator.is_externally_synced(id) {
                line.push_str("  (synced)");
            } else if timeline.sync_events(id).is_empty() {
                line.push_str("  (no fingerprints)");
            }
            Ok(line)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use lt_core::DocumentId;
    use lt_core::config::{EventRuleRecord, FileConfigRecord};

    fn config() -> Config {
        let mut config = Config::default();
        for (name, identify, priority) in [("gateway", "gateway", 1), ("backend", "backend", 2)] {
            config.settings.file_configs.push(FileConfigRecord {
                name: Some(name.to_string()),
                identify_regex: Some(identify.to_string()),
                events: vec![EventRuleRecord {
                    regex: Some(r"request id=(\w+)".to_string()),
                    time_sync_id: Some("request".to_string()),
                    time_sync_prio: Some(priority),
                    ..EventRuleRecord::default()
                }],
                ..FileConfigRecord::default()
            });
        }
        config
    }

    fn doc(name: &str, text: &str) -> TextDocument {
        TextDocument::new(DocumentId::new(name).unwrap(), text)
    }

    #[test]
    fn lower_priority_file_follows() {
        let docs = [
            doc(
                "gateway.log",
                "2021-01-01 10:00:00,000 gateway up\n\
                 2021-01-01 10:00:01,000 request id=Q1\n\
                 2021-01-01 10:00:02,000 request id=Q2",
            ),
            doc(
                "backend.log",
                "2021-01-01 10:00:03,500 backend up\n\
                 2021-01-01 10:00:04,500 request id=q1\n\
                 2021-01-01 10:00:05,500 request id=q2",
            ),
            doc("notes.txt", "nothing to sync here"),
        ];

        let lines = sync_documents(&docs, &config(), DEFAULT_MAX_ROUNDS).unwrap();
        assert_snapshot!(lines.join("\n"), @r"
        gateway.log  +0.000s
        backend.log  -3.500s  (synced)
        notes.txt  +0.000s  (no fingerprints)
        ");
    }

    #[test]
    fn unrelated_fingerprints_leave_clocks_alone() {
        let docs = [
            doc("gateway.log", "2021-01-01 10:00:00,000 gateway request id=a"),
            doc("backend.log", "2021-01-01 10:00:09,000 backend request id=b"),
        ];
        let lines = sync_documents(&docs, &config(), DEFAULT_MAX_ROUNDS).unwrap();
        assert_eq!(lines, vec!["gateway.log  +0.000s", "backend.log  +0.000s"]);
    }
}
