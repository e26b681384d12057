//! Single-pass event indexing.
//!
//! One forward pass over the document applies the file config's rules, in
//! declared order, to every line. Each rule fires at most once per line (its
//! first match) and rules are independent, so several may fire on the same
//! line. A firing rule can:
//!
//! - add a tree node at its level (level > 0),
//! - add a decoration to a declared decoration bucket,
//! - record a time-sync fingerprint.
//!
//! The tree, decorations and fingerprints are built privately and handed
//! back together when the pass completes.

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Duration, Utc};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::cache::TimeCache;
use crate::config::{DecorationRegistry, EventRule, FileConfig};
use crate::document::{Document, LineRange};
use crate::pass::{ChunkBudget, ChunkedPass, PassStep};
use crate::tree::{EventTree, Presentation};

/// Placeholder syntax in label templates.
static LABEL_PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\d+)\}").unwrap());

/// A decorated range and its hover text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decoration {
    pub range: LineRange,
    pub tooltip: String,
}

/// All decorations for one decoration id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorationBucket {
    pub decoration_id: String,
    pub decorations: Vec<Decoration>,
}

/// Decoration buckets in order of first use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DecorationSet {
    buckets: Vec<DecorationBucket>,
}

impl DecorationSet {
    fn push(&mut self, decoration_id: &str, decoration: Decoration) {
        if let Some(bucket) = self
            .buckets
            .iter_mut()
            .find(|b| b.decoration_id == decoration_id)
        {
            bucket.decorations.push(decoration);
        } else {
            self.buckets.push(DecorationBucket {
                decoration_id: decoration_id.to_string(),
                decorations: vec![decoration],
            });
        }
    }

    /// Decorations for `decoration_id`, if any were produced.
    pub fn get(&self, decoration_id: &str) -> Option<&[Decoration]> {
        self.buckets
            .iter()
            .find(|b| b.decoration_id == decoration_id)
            .map(|b| b.decorations.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecorationBucket> {
        self.buckets.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of decorations over all buckets.
    pub fn total(&self) -> usize {
        self.buckets.iter().map(|b| b.decorations.len()).sum()
    }
}

/// A named, valued, prioritized marker used to correlate clocks.
///
/// A lower `priority` number is more authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub id: String,
    /// Always lower-case.
    pub value: String,
    pub time: DateTime<Utc>,
    pub priority: u32,
}

impl Fingerprint {
    /// True if both name the same real event: same id and same value.
    pub fn same_event(&self, other: &Self) -> bool {
        self.id == other.id && self.value.to_lowercase() == other.value.to_lowercase()
    }
}

/// A fingerprint and the line it was extracted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub line: usize,
    pub fingerprint: Fingerprint,
}

/// Everything one indexing pass produces.
#[derive(Debug, Clone)]
pub struct IndexOutput {
    pub tree: EventTree,
    pub presentation: Presentation,
    pub decorations: DecorationSet,
    pub sync_events: Vec<SyncEvent>,
}

/// Event indexing pass for one document.
#[derive(Debug)]
pub struct IndexPass {
    config: Arc<FileConfig>,
    registry: Arc<DecorationRegistry>,
    times: Arc<TimeCache>,
    offset: Duration,
    next_line: usize,
    total: usize,
    output: IndexOutput,
}

impl IndexPass {
    /// Prepares a pass. `times` must have been built for `doc`; fingerprint
    /// times are read from it with `offset` applied.
    pub fn new(
        doc: &dyn Document,
        config: Arc<FileConfig>,
        registry: Arc<DecorationRegistry>,
        times: Arc<TimeCache>,
        offset: Duration,
    ) -> Self {
        let tree = EventTree::new(doc.id().clone(), config.name.clone());
        Self {
            config,
            registry,
            times,
            offset,
            next_line: 0,
            total: doc.line_count(),
            output: IndexOutput {
                tree,
                presentation: Presentation::default(),
                decorations: DecorationSet::default(),
                sync_events: Vec::new(),
            },
        }
    }

    fn index_line(&mut self, doc: &dyn Document, line: usize) {
        let Some(text) = doc.line_at(line) else {
            return;
        };
        let config = Arc::clone(&self.config);
        for rule in &config.rules {
            if let Some(caps) = rule.match_pattern.captures(text) {
                self.apply(doc, rule, line, &caps);
            }
        }
    }

    fn apply(&mut self, doc: &dyn Document, rule: &EventRule, line: usize, caps: &Captures<'_>) {
        let label = rule.label_template.as_deref().map_or_else(
            || caps[0].to_string(),
            |template| format_label(template, caps),
        );

        if rule.level > 0 {
            let tree = &mut self.output.tree;
            let parent = tree.parent_for_level(rule.level);
            let (_, id) = tree.push_child(parent, label.clone(), Some(line));
            if let Some(icon) = &rule.icon_id {
                self.output.presentation.set_icon(id, icon.clone());
            }
        }

        if let Some(decoration_id) = &rule.decoration_id
            && self.registry.contains(decoration_id)
            && let Some(range) = doc.line_range(line)
        {
            self.output.decorations.push(
                decoration_id,
                Decoration {
                    range,
                    tooltip: label,
                },
            );
        }

        if let Some((id, priority)) = rule.time_sync()
            && let Some(value) = caps.get(caps.len() - 1)
            && let Some(time) = self.times.time_at(line, self.offset)
        {
            self.output.sync_events.push(SyncEvent {
                line,
                fingerprint: Fingerprint {
                    id: id.to_string(),
                    value: value.as_str().to_lowercase(),
                    time,
                    priority,
                },
            });
        }
    }
}

impl ChunkedPass for IndexPass {
    type Output = IndexOutput;

    fn total(&self) -> usize {
        self.total
    }

    fn step(&mut self, doc: &dyn Document, budget: ChunkBudget) -> PassStep<IndexOutput> {
        let mut processed = 0;
        while self.next_line < self.total {
            self.index_line(doc, self.next_line);
            self.next_line += 1;

            processed += 1;
            if budget.exhausted(processed) {
                break;
            }
        }

        if self.next_line < self.total {
            return PassStep::Continue {
                done: self.next_line,
            };
        }

        let output = IndexOutput {
            tree: EventTree::new(self.output.tree.document().clone(), self.config.name.clone()),
            presentation: Presentation::default(),
            decorations: DecorationSet::default(),
            sync_events: Vec::new(),
        };
        let output = std::mem::replace(&mut self.output, output);
        tracing::debug!(
            config = %self.config.name,
            nodes = output.tree.len(),
            decorations = output.decorations.total(),
            sync_events = output.sync_events.len(),
            "event index built"
        );
        PassStep::Complete(output)
    }
}

/// Substitutes `{n}` with capture group `n`. Unknown or unmatched groups stay literal.
pub fn format_label(template: &str, caps: &Captures<'_>) -> String {
    LABEL_PLACEHOLDER_RE
        .replace_all(template, |placeholder: &Captures<'_>| {
            placeholder[1]
                .parse::<usize>()
                .ok()
                .and_then(|group| caps.get(group))
                .map_or_else(|| placeholder[0].to_string(), |m| m.as_str().to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    use crate::document::TextDocument;
    use crate::pass::{self, CancelToken, NoProgress, PassOptions};
    use crate::time::TimeConfig;
    use crate::types::DocumentId;

    fn time_config() -> TimeConfig {
        TimeConfig::new(
            Regex::new(r"^(\d{4})-(\d{2})-(\d{2}) (\d{2}):(\d{2}):(\d{2}),(\d{3})").unwrap(),
        )
    }

    fn file_config(rules: Vec<EventRule>) -> Arc<FileConfig> {
        Arc::new(FileConfig {
            name: "app".to_string(),
            identify_pattern: Regex::new("").unwrap(),
            time: time_config(),
            rules,
        })
    }

    fn registry(ids: &[&str]) -> Arc<DecorationRegistry> {
        let mut registry = DecorationRegistry::default();
        for id in ids {
            registry.declare(*id, serde_json::Value::Null);
        }
        Arc::new(registry)
    }

    fn doc(lines: &[&str]) -> TextDocument {
        TextDocument::from_lines(DocumentId::new("idx.log").unwrap(), lines)
    }

    fn index(doc: &TextDocument, rules: Vec<EventRule>, decorations: &[&str]) -> IndexOutput {
        index_with_offset(doc, rules, decorations, Duration::zero())
    }

    fn index_with_offset(
        doc: &TextDocument,
        rules: Vec<EventRule>,
        decorations: &[&str],
        offset: Duration,
    ) -> IndexOutput {
        let cancel = CancelToken::new();
        let options = PassOptions {
            batch_lines: 2,
            ..PassOptions::default()
        };
        let times =
            TimeCache::build_blocking(doc, &time_config(), &options, &cancel, &mut NoProgress)
                .unwrap();
        let pass = IndexPass::new(
            doc,
            file_config(rules),
            registry(decorations),
            Arc::new(times),
            offset,
        );
        pass::run_blocking(pass, doc, &options, &cancel, &mut NoProgress).unwrap()
    }

    fn rule(pattern: &str) -> EventRule {
        EventRule::new(Regex::new(pattern).unwrap())
    }

    fn shape(tree: &EventTree) -> Vec<(u32, String, Option<usize>)> {
        tree.iter()
            .map(|n| (n.depth(), n.label().to_string(), n.line()))
            .collect()
    }

    #[test]
    fn builds_leveled_tree() {
        let doc = doc(&[
            "2021-01-01 10:00:00,000 BOOT",
            "2021-01-01 10:00:01,000 START A",
            "2021-01-01 10:00:02,000 step 1",
            "2021-01-01 10:00:03,000 START B",
            "2021-01-01 10:00:04,000 step 2",
        ]);
        let out = index(
            &doc,
            vec![
                rule(r"START (\w)").with_level(1).with_label("task {1}"),
                rule(r"step (\d)").with_level(2).with_label("step {1}"),
            ],
            &[],
        );

        assert_eq!(
            shape(&out.tree),
            vec![
                (0, "app".to_string(), None),
                (1, "task A".to_string(), Some(1)),
                (2, "step 1".to_string(), Some(2)),
                (1, "task B".to_string(), Some(3)),
                (2, "step 2".to_string(), Some(4)),
            ]
        );
    }

    #[test]
    fn renders_nested_tree() {
        let doc = doc(&[
            "START build",
            "phase compile",
            "step 1",
            "step 2",
            "phase link",
            "START test",
            "step 3",
        ]);
        let out = index(
            &doc,
            vec![
                rule(r"START (\w+)").with_level(1).with_label("{1}"),
                rule(r"phase (\w+)").with_level(2).with_label("{1}"),
                rule(r"step (\d)").with_level(3).with_label("step {1}"),
            ],
            &[],
        );

        let rendered = out
            .tree
            .iter()
            .map(|n| {
                let line = n.line().map_or_else(|| "-".to_string(), |l| l.to_string());
                format!("{}{} @{line}", "  ".repeat(n.depth() as usize), n.label())
            })
            .collect::<Vec<_>>()
            .join("\n");
        insta::assert_snapshot!(rendered, @r"
        app @-
          build @0
            compile @1
              step 1 @2
              step 2 @3
            link @4
          test @5
            (no parent level 2 event) @-
              step 3 @6
        ");
    }

    #[test]
    fn missing_parent_level_is_synthesized() {
        let doc = doc(&["step 1", "START A", "step 2"]);
        let out = index(
            &doc,
            vec![
                rule(r"START (\w)").with_level(1).with_label("task {1}"),
                rule(r"step (\d)").with_level(2).with_label("step {1}"),
            ],
            &[],
        );

        assert_eq!(
            shape(&out.tree),
            vec![
                (0, "app".to_string(), None),
                (1, "(no parent level 1 event)".to_string(), None),
                (2, "step 1".to_string(), Some(0)),
                (1, "task A".to_string(), Some(1)),
                (2, "step 2".to_string(), Some(2)),
            ]
        );
    }

    #[test]
    fn level_zero_rules_do_not_change_tree_shape() {
        let doc = doc(&["START A", "WARN x", "START B"]);
        let leveled = rule(r"START (\w)").with_level(1);
        let with_zero = index(
            &doc,
            vec![leveled.clone(), rule("WARN").with_decoration("warn")],
            &["warn"],
        );
        let without_zero = index(&doc, vec![leveled], &["warn"]);

        assert_eq!(shape(&with_zero.tree), shape(&without_zero.tree));
        assert_eq!(with_zero.decorations.total(), 1);
    }

    #[test]
    fn default_label_is_whole_match() {
        let doc = doc(&["xx START A yy"]);
        let out = index(&doc, vec![rule(r"START \w").with_level(1)], &[]);
        let child = out.tree.root().children().next().unwrap();
        assert_eq!(child.label(), "START A");
    }

    #[test]
    fn unresolved_placeholders_stay_literal() {
        let re = Regex::new(r"(a)(b)?").unwrap();
        let caps = re.captures("a").unwrap();
        assert_eq!(format_label("{0}-{1}-{2}-{9}", &caps), "a-a-{2}-{9}");
    }

    #[test]
    fn decorations_need_declared_id() {
        let doc = doc(&["ERROR disk full", "ERROR again", "INFO ok"]);
        let out = index(
            &doc,
            vec![
                rule(r"ERROR (.*)").with_decoration("red").with_label("error: {1}"),
                rule(r"INFO").with_decoration("undeclared"),
            ],
            &["red"],
        );

        let red = out.decorations.get("red").unwrap();
        assert_eq!(red.len(), 2);
        assert_eq!(red[0].tooltip, "error: disk full");
        assert_eq!(red[0].range, LineRange { line: 0, start: 0, end: 15 });
        assert!(out.decorations.get("undeclared").is_none());
    }

    #[test]
    fn multiple_rules_fire_on_same_line() {
        let doc = doc(&["START A ERROR"]);
        let out = index(
            &doc,
            vec![
                rule(r"START (\w)").with_level(1).with_decoration("d"),
                rule("ERROR").with_decoration("d"),
            ],
            &["d"],
        );
        assert_eq!(out.tree.len(), 2);
        assert_eq!(out.decorations.get("d").unwrap().len(), 2);
    }

    #[test]
    fn extracts_lowercased_fingerprints_with_line_time() {
        let doc = doc(&[
            "2021-01-01 10:00:00,000 boot",
            "2021-01-01 10:00:05,000 SYNC id=ABC",
            "continued",
        ]);
        let out = index_with_offset(
            &doc,
            vec![rule(r"SYNC id=(\w+)").with_time_sync("sync", 3)],
            &[],
            Duration::seconds(2),
        );

        assert_eq!(out.sync_events.len(), 1);
        let event = &out.sync_events[0];
        assert_eq!(event.line, 1);
        assert_eq!(event.fingerprint.value, "abc");
        assert_eq!(event.fingerprint.priority, 3);
        assert_eq!(
            event.fingerprint.time,
            Utc.with_ymd_and_hms(2021, 1, 1, 10, 0, 7).unwrap()
        );
    }

    #[test]
    fn icons_go_to_presentation() {
        let doc = doc(&["START A"]);
        let out = index(&doc, vec![rule("START").with_level(1).with_icon("play")], &[]);
        let child = out.tree.root().children().next().unwrap();
        assert_eq!(out.presentation.icon(child.id()), Some("play"));
    }

    #[test]
    fn reindexing_is_structurally_identical() {
        let doc = doc(&["START A", "step 1", "START B"]);
        let rules = vec![
            rule(r"START (\w)").with_level(1),
            rule(r"step (\d)").with_level(2),
        ];
        let first = index(&doc, rules.clone(), &[]);
        let second = index(&doc, rules, &[]);
        assert_eq!(shape(&first.tree), shape(&second.tree));
        assert_eq!(first.sync_events, second.sync_events);
    }

    #[test]
    fn fingerprint_match_ignores_case() {
        let t = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        let fingerprint = |value: &str, priority| Fingerprint {
            id: "s".into(),
            value: value.into(),
            time: t,
            priority,
        };
        let a = fingerprint("abc", 1);
        let b = fingerprint("ABC", 2);
        let c = fingerprint("abd", 2);
        assert!(a.same_event(&b));
        assert!(!a.same_event(&c));
    }
}
