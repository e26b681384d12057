//! Configuration records and their compiled form.
//!
//! Records are plain `serde` structures with the same camelCase keys as the
//! smart-log settings (`fileConfigs`, `identifyRegex`, `timeSyncPrio`, ...).
//! [`Settings::compile`] validates them once, up front, into closed types the
//! engine works with. Broken pieces are dropped with a warning rather than
//! failing the whole load.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::time::{DEFAULT_TIME_PATTERN, DateFormat, TimeConfig};

/// Top-level settings as loaded from configuration files.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Fallback time pattern for file configs that do not set one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_regex: Option<String>,

    /// Fallback date format for single-group time patterns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_format: Option<String>,

    /// Candidate file configs, in priority order.
    #[serde(default)]
    pub file_configs: Vec<FileConfigRecord>,

    /// Declared decoration styles.
    #[serde(default)]
    pub decorations: Vec<DecorationRecord>,
}

/// One candidate configuration for a kind of log file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfigRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Pattern that must match somewhere in the document text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identify_regex: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_regex: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_format: Option<String>,

    #[serde(default)]
    pub events: Vec<EventRuleRecord>,
}

/// One event rule as configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRuleRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex: Option<String>,

    /// Label template; `{0}`, `{1}`, ... are replaced by capture groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Tree depth. 0 (the default) only decorates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoration_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_sync_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_sync_prio: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// A decoration style. Render options are opaque to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecorationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_options: Option<serde_json::Value>,
}

/// A compiled event rule.
#[derive(Debug, Clone)]
pub struct EventRule {
    pub match_pattern: Regex,
    pub label_template: Option<String>,
    /// 0 = decoration-only.
    pub level: u32,
    pub decoration_id: Option<String>,
    pub time_sync_id: Option<String>,
    pub time_sync_priority: Option<u32>,
    pub icon_id: Option<String>,
}

impl EventRule {
    /// A decoration-only rule with no label, sync or icon.
    pub const fn new(match_pattern: Regex) -> Self {
        Self {
            match_pattern,
            label_template: None,
            level: 0,
            decoration_id: None,
            time_sync_id: None,
            time_sync_priority: None,
            icon_id: None,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_label(mut self, template: impl Into<String>) -> Self {
        self.label_template = Some(template.into());
        self
    }

    #[must_use]
    pub fn with_decoration(mut self, id: impl Into<String>) -> Self {
        self.decoration_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_time_sync(mut self, id: impl Into<String>, priority: u32) -> Self {
        self.time_sync_id = Some(id.into());
        self.time_sync_priority = Some(priority);
        self
    }

    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon_id = Some(icon.into());
        self
    }

    /// Returns `(id, priority)` when the rule emits time-sync fingerprints.
    pub fn time_sync(&self) -> Option<(&str, u32)> {
        Some((self.time_sync_id.as_deref()?, self.time_sync_priority?))
    }
}

/// A compiled file config.
#[derive(Debug, Clone)]
pub struct FileConfig {
    pub name: String,
    pub identify_pattern: Regex,
    /// Resolved time settings (own pattern, else the global fallback).
    pub time: TimeConfig,
    pub rules: Vec<EventRule>,
}

/// Declared decoration ids and their opaque render options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecorationRegistry {
    styles: BTreeMap<String, serde_json::Value>,
}

impl DecorationRegistry {
    /// Declares `id` with the given render options.
    pub fn declare(&mut self, id: impl Into<String>, render_options: serde_json::Value) {
        self.styles.insert(id.into(), render_options);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.styles.contains_key(id)
    }

    pub fn render_options(&self, id: &str) -> Option<&serde_json::Value> {
        self.styles.get(id)
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

/// Settings after validation.
#[derive(Debug, Clone)]
pub struct CompiledSettings {
    /// Global fallback time settings.
    pub default_time: TimeConfig,
    pub file_configs: Vec<Arc<FileConfig>>,
    pub decorations: Arc<DecorationRegistry>,
    /// Everything that was skipped during compilation.
    pub problems: Vec<ConfigError>,
}

impl Default for CompiledSettings {
    fn default() -> Self {
        Settings::default().compile()
    }
}

impl Settings {
    /// Validates and compiles all records.
    pub fn compile(&self) -> CompiledSettings {
        let mut problems = Vec::new();

        let default_pattern = self
            .time_regex
            .as_deref()
            .and_then(|pattern| {
                compile_time_pattern(pattern, "settings".to_string(), &mut problems)
            })
            .unwrap_or_else(default_time_pattern);
        let default_format = self.time_format.clone().map(DateFormat::new);
        let default_time = TimeConfig {
            time_pattern: default_pattern,
            custom_date_format: default_format,
        };

        let mut decorations = DecorationRegistry::default();
        for record in &self.decorations {
            if let Some(id) = &record.id {
                tracing::debug!(id, "adding decoration");
                decorations.declare(
                    id.clone(),
                    record.render_options.clone().unwrap_or_default(),
                );
            }
        }

        let file_configs = self
            .file_configs
            .iter()
            .filter_map(|record| compile_file_config(record, &default_time, &mut problems))
            .map(Arc::new)
            .collect::<Vec<_>>();

        tracing::debug!(
            file_configs = file_configs.len(),
            decorations = decorations.len(),
            problems = problems.len(),
            "compiled settings"
        );

        CompiledSettings {
            default_time,
            file_configs,
            decorations: Arc::new(decorations),
            problems,
        }
    }
}

/// Pre-compiled default time pattern.
static DEFAULT_TIME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_TIME_PATTERN).unwrap());

fn default_time_pattern() -> Regex {
    DEFAULT_TIME_REGEX.clone()
}

fn compile_time_pattern(
    pattern: &str,
    scope: String,
    problems: &mut Vec<ConfigError>,
) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(source) => {
            let err = ConfigError::InvalidTimePattern { scope, source };
            tracing::warn!(error = %err, "falling back to default time pattern");
            problems.push(err);
            None
        }
    }
}

fn compile_file_config(
    record: &FileConfigRecord,
    default_time: &TimeConfig,
    problems: &mut Vec<ConfigError>,
) -> Option<FileConfig> {
    let (Some(name), Some(identify)) = (&record.name, &record.identify_regex) else {
        tracing::debug!(name = ?record.name, "ignoring file config without name or identifyRegex");
        return None;
    };

    let identify_pattern = match Regex::new(identify) {
        Ok(re) => re,
        Err(source) => {
            let err = ConfigError::InvalidIdentifyPattern {
                config: name.clone(),
                source,
            };
            tracing::warn!(error = %err, "skipping file config");
            problems.push(err);
            return None;
        }
    };

    let time_pattern = record
        .time_regex
        .as_deref()
        .and_then(|pattern| compile_time_pattern(pattern, format!("file config {name}"), problems))
        .unwrap_or_else(|| default_time.time_pattern.clone());
    let custom_date_format = record
        .time_format
        .clone()
        .map(DateFormat::new)
        .or_else(|| default_time.custom_date_format.clone());

    let mut rules = Vec::with_capacity(record.events.len());
    for (index, event) in record.events.iter().enumerate() {
        let Some(pattern) = &event.regex else {
            continue;
        };
        match Regex::new(pattern) {
            Ok(match_pattern) => rules.push(EventRule {
                match_pattern,
                label_template: event.label.clone(),
                level: event.level.unwrap_or(0),
                decoration_id: event.decoration_id.clone(),
                time_sync_id: event.time_sync_id.clone(),
                time_sync_priority: event.time_sync_prio,
                icon_id: event.icon.clone(),
            }),
            Err(source) => {
                let err = ConfigError::MalformedRuleConfig {
                    config: name.clone(),
                    index,
                    source,
                };
                tracing::warn!(error = %err, "skipping event rule");
                problems.push(err);
            }
        }
    }

    Some(FileConfig {
        name: name.clone(),
        identify_pattern,
        time: TimeConfig {
            time_pattern,
            custom_date_format,
        },
        rules,
    })
}
