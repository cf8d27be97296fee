//! Layered configuration for the reharmonization engine.
//!
//! Kept free of engine types so the CLI and the engine can both depend on
//! it. The engine converts these plain settings into validated values
//! (`SearchConfig`, `StyleProfile`, `VoicingConstraints`).
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins):
//! 1. `/etc/reharm/config.toml` (system)
//! 2. `~/.config/reharm/config.toml` (user)
//! 3. `./reharm.toml` or the `--config` path (local override)
//! 4. Environment variables (`REHARM_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [search]
//! beam_width = 8
//! max_suggestions = 4
//! seed = 7
//!
//! [session]
//! style = "bebop"
//! complexity = 0.7
//!
//! [styles.bebop]
//! base = "jazz"
//! repetition_penalty = 0.6
//! strategy_weights = { tritone_substitution = 1.0 }
//! ```

pub mod loader;
pub mod settings;
pub mod styles;

pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};
pub use settings::{SearchSettings, SessionSettings, TelemetrySettings, VoicingSettings};
pub use styles::StyleOverride;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: String, message: String },
}

/// Complete reharm configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReharmConfig {
    #[serde(default)]
    pub search: SearchSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub voicing: VoicingSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,

    /// User-defined style profiles keyed by name.
    #[serde(default)]
    pub styles: BTreeMap<String, StyleOverride>,
}

impl ReharmConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with `config_path` taking the place of `./reharm.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about sources.
    pub fn load_with_sources() -> Result<(Self, ConfigSources), ConfigError> {
        Self::load_with_sources_from(None)
    }

    /// Load configuration from optional path and return information about sources.
    ///
    /// The merged result is validated before it is returned.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();

        let expanded = config_path.map(expand_path);
        for path in loader::discover_config_files_with_override(expanded.as_deref()) {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let origin = sources
            .files
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("<defaults>"));
        let mut config = loader::table_to_config(merged, &origin)?;

        loader::apply_env_overrides(&mut config, &mut sources)?;
        config.validate()?;

        Ok((config, sources))
    }

    /// Parse a single TOML document on top of the compiled defaults.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let origin = Path::new("<inline>");
        let table = loader::parse_table(contents, origin)?;
        let config = loader::table_to_config(table, origin)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values instead of clamping them.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search.beam_width == 0 {
            return Err(invalid("search.beam_width", "must be at least 1"));
        }
        if self.search.max_suggestions == 0 {
            return Err(invalid("search.max_suggestions", "must be at least 1"));
        }
        if !self.search.min_score.is_finite() || self.search.min_score < 0.0 {
            return Err(invalid("search.min_score", "must be a non-negative number"));
        }

        if !unit_range(self.session.complexity) {
            return Err(invalid("session.complexity", "must be within [0, 1]"));
        }
        if self.session.suggestions_per_range == 0 {
            return Err(invalid("session.suggestions_per_range", "must be at least 1"));
        }
        if self.session.history_depth == 0 {
            return Err(invalid("session.history_depth", "must be at least 1"));
        }
        if self.session.style.trim().is_empty() {
            return Err(invalid("session.style", "must not be empty"));
        }

        if let (Some(low), Some(high)) = (self.voicing.low_pitch, self.voicing.high_pitch) {
            if low >= high {
                return Err(invalid(
                    "voicing.low_pitch",
                    &format!("{} is not below high_pitch {}", low, high),
                ));
            }
        }
        if self.voicing.high_pitch.is_some_and(|p| p > 127) {
            return Err(invalid("voicing.high_pitch", "must be a MIDI pitch (0-127)"));
        }
        if self.voicing.max_candidates == 0 {
            return Err(invalid("voicing.max_candidates", "must be at least 1"));
        }

        for (name, style) in &self.styles {
            for (label, value) in style.numeric_fields() {
                if !unit_range(value) {
                    return Err(invalid(
                        &format!("styles.{}.{}", name, label),
                        "must be within [0, 1]",
                    ));
                }
            }
        }

        Ok(())
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> String {
        let mut output = String::new();

        output.push_str("# reharm configuration\n\n");

        output.push_str("[search]\n");
        output.push_str(&format!("beam_width = {}\n", self.search.beam_width));
        output.push_str(&format!("max_suggestions = {}\n", self.search.max_suggestions));
        output.push_str(&format!("max_time_ms = {}\n", self.search.max_time_ms));
        if let Some(seed) = self.search.seed {
            output.push_str(&format!("seed = {}\n", seed));
        }
        output.push_str(&format!("min_score = {:?}\n", self.search.min_score));

        output.push_str("\n[session]\n");
        output.push_str(&format!("style = \"{}\"\n", self.session.style));
        output.push_str(&format!("complexity = {:?}\n", self.session.complexity));
        output.push_str(&format!(
            "suggestions_per_range = {}\n",
            self.session.suggestions_per_range
        ));
        output.push_str(&format!("history_depth = {}\n", self.session.history_depth));

        output.push_str("\n[voicing]\n");
        output.push_str(&format!("instrument = \"{}\"\n", self.voicing.instrument));
        if let Some(low) = self.voicing.low_pitch {
            output.push_str(&format!("low_pitch = {}\n", low));
        }
        if let Some(high) = self.voicing.high_pitch {
            output.push_str(&format!("high_pitch = {}\n", high));
        }
        output.push_str(&format!("max_candidates = {}\n", self.voicing.max_candidates));

        output.push_str("\n[telemetry]\n");
        output.push_str(&format!("log_level = \"{}\"\n", self.telemetry.log_level));

        for (name, style) in &self.styles {
            output.push_str(&format!("\n[styles.{}]\n", name));
            if let Some(base) = &style.base {
                output.push_str(&format!("base = \"{}\"\n", base));
            }
            for (label, value) in style.numeric_fields() {
                if !label.starts_with("strategy_weights.") {
                    output.push_str(&format!("{} = {:?}\n", label, value));
                }
            }
            if let Some(allow) = style.allow_dominant_to_subdominant {
                output.push_str(&format!("allow_dominant_to_subdominant = {}\n", allow));
            }
            if let Some(prefer) = style.prefer_neapolitan_inversion {
                output.push_str(&format!("prefer_neapolitan_inversion = {}\n", prefer));
            }
            if let Some(extended) = style.extended_harmony {
                output.push_str(&format!("extended_harmony = {}\n", extended));
            }
            if !style.strategy_weights.is_empty() {
                output.push_str(&format!("\n[styles.{}.strategy_weights]\n", name));
                for (strategy, weight) in &style.strategy_weights {
                    output.push_str(&format!("{} = {:?}\n", strategy, weight));
                }
            }
        }

        output
    }
}

fn unit_range(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        message: message.to_string(),
    }
}
