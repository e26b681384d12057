//! Configuration loading and management.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml};
use lt_core::{PassOptions, Settings, Timeline};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// File configs, decorations and fallback time pattern.
    #[serde(default)]
    pub settings: Settings,

    /// Tuning for the line passes.
    #[serde(default)]
    pub pass: PassConfig,
}

/// How line passes are chunked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassConfig {
    /// Lines per chunk.
    pub batch_lines: usize,
    /// Wall-time limit per chunk, in milliseconds.
    pub max_slice_ms: u64,
}

impl Default for PassConfig {
    fn default() -> Self {
        let options = PassOptions::default();
        Self {
            batch_lines: options.batch_lines,
            max_slice_ms: u64::try_from(options.max_slice.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl PassConfig {
    pub fn options(&self) -> PassOptions {
        PassOptions {
            batch_lines: self.batch_lines.max(1),
            max_slice: Duration::from_millis(self.max_slice_ms),
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = if path.extension().is_some_and(|ext| ext == "json") {
                figment.merge(Json::file(path))
            } else {
                figment.merge(Toml::file(path))
            };
        }

        // LT_PASS__BATCH_LINES=500 sets pass.batch_lines
        figment = figment.merge(Env::prefixed("LT_").split("__"));

        figment.extract()
    }

    /// Compiles the settings into a fresh engine. Malformed patterns are
    /// logged and skipped.
    pub fn timeline(&self) -> Timeline {
        let settings = self.settings.compile();
        for problem in &settings.problems {
            tracing::warn!(error = %problem, "configuration problem");
        }
        Timeline::with_options(settings, self.pass.options())
    }
}

/// Returns the platform-specific config directory for lt.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("lt"))
}
