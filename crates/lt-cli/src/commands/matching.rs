//! Match command: which file config a file is matched to.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use lt_core::{Document, SAMPLE_LINES, Timeline};

use super::util::open_document;
use crate::Config;

#[derive(Debug, Args)]
pub struct MatchArgs {
    /// Log file to check.
    pub file: PathBuf,
}

pub fn run<W: Write>(writer: &mut W, args: &MatchArgs, config: &Config) -> Result<()> {
    let doc = open_document(&args.file)?;
    let mut timeline = config.timeline();
    writeln!(writer, "{}", format_match(&mut timeline, &doc))?;
    Ok(())
}

pub fn format_match(timeline: &mut Timeline, doc: &dyn Document) -> String {
    timeline.open(doc);
    let sampled = doc.line_count().min(SAMPLE_LINES);
    timeline.selected_config(doc.id()).map_or_else(
        || format!("no file config matches {}", doc.id()),
        |selected| {
            format!(
                "config: {}\naccuracy: {}/{sampled} sampled lines",
                selected.config.name, selected.accuracy
            )
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;
    use lt_core::config::FileConfigRecord;
    use lt_core::{DocumentId, TextDocument};

    fn config() -> Config {
        let mut config = Config::default();
        for (name, time_regex) in [
            ("bracketed", r"^\[(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2})\]"),
            ("iso", r"^(\d{4})-(\d{2})-(\d{2}) (\d{2}):(\d{2}):(\d{2}),(\d{3})"),
        ] {
            config.settings.file_configs.push(FileConfigRecord {
                name: Some(name.to_string()),
                identify_regex: Some("worker".to_string()),
                time_regex: Some(time_regex.to_string()),
                ..FileConfigRecord::default()
            });
        }
        config
    }

    #[test]
    fn picks_config_explaining_most_lines() {
        let doc = TextDocument::new(
            DocumentId::new("worker.log").unwrap(),
            "2021-01-01 10:00:00,000 worker up\n\
             2021-01-01 10:00:01,000 job 1\n\
             [2021-01-01T10:00:02] job 2\n\
             continuation",
        );
        let mut timeline = config().timeline();
        assert_snapshot!(format_match(&mut timeline, &doc), @r"
        config: iso
        accuracy: 2/4 sampled lines
        ");
    }

    #[test]
    fn reports_unmatched_file() {
        let doc = TextDocument::new(DocumentId::new("other.log").unwrap(), "nothing here");
        let mut timeline = config().timeline();
        assert_snapshot!(
            format_match(&mut timeline, &doc),
            @"no file config matches other.log"
        );
    }
}
