//! File config selection.
//!
//! Candidates are the configs whose identify pattern matches the document.
//! They are scored in parallel by how many of the first [`SAMPLE_LINES`]
//! lines their time pattern parses.

use std::sync::Arc;

use rayon::prelude::*;

use crate::config::{CompiledSettings, FileConfig};
use crate::document::Document;
use crate::time::parse_line;

/// Number of leading lines scored per candidate.
pub const SAMPLE_LINES: usize = 100;

/// A candidate scoring above this many sampled lines is taken immediately.
const HIGH_ACCURACY: usize = 50;

/// The file config chosen for a document.
#[derive(Debug, Clone)]
pub struct SelectedConfig {
    /// Position in `CompiledSettings::file_configs`.
    pub index: usize,
    pub config: Arc<FileConfig>,
    /// Sampled lines that yielded a timestamp.
    pub accuracy: usize,
}

/// Picks the file config whose time pattern explains the most sampled lines.
///
/// Only configs whose identify pattern matches somewhere in the document are
/// considered. The first candidate scoring above the high-accuracy threshold
/// wins outright; otherwise the best score wins, ties going to the earlier
/// candidate.
pub fn select_config(doc: &dyn Document, settings: &CompiledSettings) -> Option<SelectedConfig> {
    let text = doc.text();
    let candidates: Vec<usize> = settings
        .file_configs
        .iter()
        .enumerate()
        .filter(|(_, config)| config.identify_pattern.is_match(&text))
        .map(|(index, _)| index)
        .collect();

    if candidates.is_empty() {
        tracing::debug!(document = %doc.id(), "no file config identifies document");
        return None;
    }

    let sample: Vec<&str> = (0..doc.line_count().min(SAMPLE_LINES))
        .filter_map(|line| doc.line_at(line))
        .collect();

    let scores: Vec<(usize, usize)> = candidates
        .par_iter()
        .map(|&index| (index, accuracy(&settings.file_configs[index], &sample)))
        .collect();

    let (index, accuracy) = scores
        .iter()
        .copied()
        .find(|&(_, score)| score > HIGH_ACCURACY)
        .or_else(|| {
            scores
                .iter()
                .copied()
                .fold(None, |best: Option<(usize, usize)>, candidate| match best {
                    Some(b) if b.1 >= candidate.1 => Some(b),
                    _ => Some(candidate),
                })
        })?;

    let config = Arc::clone(&settings.file_configs[index]);
    tracing::debug!(
        document = %doc.id(),
        config = %config.name,
        accuracy,
        candidates = scores.len(),
        "file config selected"
    );
    Some(SelectedConfig {
        index,
        config,
        accuracy,
    })
}

fn accuracy(config: &FileConfig, sample: &[&str]) -> usize {
    sample
        .iter()
        .filter(|line| parse_line(line, &config.time).is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::{FileConfigRecord, Settings};
    use crate::document::TextDocument;
    use crate::types::DocumentId;

    fn record(name: &str, identify: &str, time_regex: &str) -> FileConfigRecord {
        FileConfigRecord {
            name: Some(name.to_string()),
            identify_regex: Some(identify.to_string()),
            time_regex: Some(time_regex.to_string()),
            ..FileConfigRecord::default()
        }
    }

    fn settings(records: Vec<FileConfigRecord>) -> CompiledSettings {
        Settings {
            file_configs: records,
            ..Settings::default()
        }
        .compile()
    }

    /// `dated` lines carry an ISO timestamp, the rest a bracketed one.
    fn doc(dated: usize, bracketed: usize) -> TextDocument {
        let lines = (0..dated)
            .map(|i| format!("2021-01-01 10:00:{:02},000 iso line", i % 60))
            .chain((0..bracketed).map(|i| format!("[10:00:{:02}] bracket line", i % 60)));
        TextDocument::from_lines(DocumentId::new("m.log").unwrap(), lines)
    }

    const ISO: &str = r"^(\d{4})-(\d{2})-(\d{2}) (\d{2}):(\d{2}):(\d{2}),(\d{3})";
    const BRACKET: &str = r"^\[(\d{2}):(\d{2}):(\d{2})\]";

    #[test]
    fn picks_most_accurate_candidate() {
        let settings = settings(vec![
            record("bracket", "line", BRACKET),
            record("iso", "line", ISO),
        ]);
        let selected = select_config(&doc(80, 20), &settings).unwrap();
        assert_eq!(selected.config.name, "iso");
        assert_eq!(selected.index, 1);
        assert_eq!(selected.accuracy, 80);
    }

    #[test]
    fn best_below_threshold_wins() {
        let settings = settings(vec![
            record("iso", "line", ISO),
            record("never", "line", "^NEVER"),
        ]);
        let selected = select_config(&doc(30, 70), &settings).unwrap();
        assert_eq!(selected.config.name, "iso");
        assert_eq!(selected.accuracy, 30);
    }

    #[test]
    fn ties_keep_first_candidate() {
        let settings = settings(vec![
            record("first", "line", ISO),
            record("second", "line", ISO),
        ]);
        let selected = select_config(&doc(10, 0), &settings).unwrap();
        assert_eq!(selected.config.name, "first");
    }

    #[test]
    fn high_accuracy_short_circuits_in_order() {
        let settings = settings(vec![
            record("iso", "line", ISO),
            record("iso-any", "line", r"(\d{4})-(\d{2})-(\d{2}) (\d{2}):(\d{2}):(\d{2}),(\d{3})"),
        ]);
        let selected = select_config(&doc(60, 0), &settings).unwrap();
        assert_eq!(selected.config.name, "iso");
    }

    #[test]
    fn identify_pattern_gates_candidates() {
        let settings = settings(vec![
            record("other", "^OTHER-APP", ISO),
            record("zero", "bracket", "^NEVER"),
        ]);
        let selected = select_config(&doc(80, 1), &settings).unwrap();
        assert_eq!(selected.config.name, "zero");
        assert_eq!(selected.accuracy, 0);
    }

    #[test]
    fn no_identifying_config() {
        let settings = settings(vec![record("other", "^OTHER-APP", ISO)]);
        assert!(select_config(&doc(5, 5), &settings).is_none());
    }

    #[test]
    fn samples_only_leading_lines() {
        let settings = settings(vec![record("iso", "line", ISO)]);
        let selected = select_config(&doc(150, 0), &settings).unwrap();
        assert_eq!(selected.accuracy, SAMPLE_LINES);
    }
}
