//! Index command: event tree, decorations and fingerprints of one file.

use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use lt_core::{DecorationSet, Document, NodeSnapshot, SyncEvent, Timeline};
use serde::Serialize;

use super::util::{format_time, open_document, refresh};
use crate::Config;

#[derive(Debug, Args)]
pub struct IndexArgs {
    /// Log file to index.
    pub file: PathBuf,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &IndexArgs, config: &Config) -> Result<()> {
    let doc = open_document(&args.file)?;
    let mut timeline = config.timeline();
    refresh(&mut timeline, &doc)?;

    let output = if args.json {
        format_index_json(&timeline, &doc)?
    } else {
        format_index(&timeline, &doc)
    };
    writeln!(writer, "{output}")?;
    Ok(())
}

/// Renders the index of an already refreshed document as text.
pub fn format_index(timeline: &Timeline, doc: &dyn Document) -> String {
    let id = doc.id();
    let mut output = String::new();

    if let Some(tree) = timeline.tree(id) {
        let presentation = timeline.presentation(id);
        let _ = writeln!(output, "Events ({}):", tree.root().label());
        if tree.is_empty() {
            let _ = writeln!(output, "  (none)");
        }
        for node in tree.iter().skip(1) {
            let indent = "  ".repeat(node.depth() as usize);
            let icon = presentation
                .and_then(|p| p.icon(node.id()))
                .map(|icon| format!(" [{icon}]"))
                .unwrap_or_default();
            let line = node
                .line()
                .map(|line| format!("  line {line}"))
                .unwrap_or_default();
            let _ = writeln!(output, "{indent}{}{icon}{line}", node.label());
        }
    }

    let decorations = timeline.decorations(id);
    if let Some(decorations) = decorations.filter(|d| !d.is_empty()) {
        let _ = writeln!(output, "Decorations:");
        for bucket in decorations.iter() {
            let _ = writeln!(output, "  {} ({})", bucket.decoration_id, bucket.decorations.len());
            for decoration in &bucket.decorations {
                let _ = writeln!(
                    output,
                    "    line {}  {}",
                    decoration.range.line, decoration.tooltip
                );
            }
        }
    }

    let events = timeline.sync_events(id);
    if !events.is_empty() {
        let _ = writeln!(output, "Fingerprints:");
        for event in events {
            let fingerprint = &event.fingerprint;
            let _ = writeln!(
                output,
                "  line {}  {}={}  {}  priority {}",
                event.line,
                fingerprint.id,
                fingerprint.value,
                format_time(fingerprint.time),
                fingerprint.priority
            );
        }
    }

    output.trim_end().to_string()
}

#[derive(Debug, Serialize)]
struct IndexJson<'a> {
    document: &'a str,
    config: Option<&'a str>,
    tree: Option<NodeSnapshot>,
    decorations: Option<&'a DecorationSet>,
    fingerprints: &'a [SyncEvent],
}

/// Renders the index of an already refreshed document as JSON.
pub fn format_index_json(timeline: &Timeline, doc: &dyn Document) -> Result<String> {
    let id = doc.id();
    let json = IndexJson {
        document: id.as_str(),
        config: timeline
            .selected_config(id)
            .map(|selected| selected.config.name.as_str()),
        tree: timeline
            .tree(id)
            .zip(timeline.presentation(id))
            .map(|(tree, presentation)| tree.snapshot(presentation)),
        decorations: timeline.decorations(id),
        fingerprints: timeline.sync_events(id),
    };
    serde_json::to_string_pretty(&json).context("failed to serialize index")
}
