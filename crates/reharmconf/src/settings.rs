//! Engine settings - search budget, session defaults, voicing register, telemetry.

use serde::{Deserialize, Serialize};

/// Beam search budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSettings {
    /// Partial sequences retained per step.
    /// Default: 8
    #[serde(default = "SearchSettings::default_beam_width")]
    pub beam_width: usize,

    /// Maximum substitutions accepted in one result.
    /// Default: 4
    #[serde(default = "SearchSettings::default_max_suggestions")]
    pub max_suggestions: usize,

    /// Cooperative deadline checked between expansion steps.
    /// Default: 2000
    #[serde(default = "SearchSettings::default_max_time_ms")]
    pub max_time_ms: u64,

    /// Fixes action enumeration order when set.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Actions scoring at or below this are never applied.
    /// Default: 0.0
    #[serde(default)]
    pub min_score: f64,
}

impl SearchSettings {
    fn default_beam_width() -> usize {
        8
    }

    fn default_max_suggestions() -> usize {
        4
    }

    fn default_max_time_ms() -> u64 {
        2000
    }
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            beam_width: Self::default_beam_width(),
            max_suggestions: Self::default_max_suggestions(),
            max_time_ms: Self::default_max_time_ms(),
            seed: None,
            min_score: 0.0,
        }
    }
}

/// Defaults for interactive sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Style profile name, built-in or from `[styles.*]`.
    /// Default: "classical"
    #[serde(default = "SessionSettings::default_style")]
    pub style: String,

    /// 0.0 suppresses chromatic suggestions entirely, 1.0 leaves them untouched.
    /// Default: 0.5
    #[serde(default = "SessionSettings::default_complexity")]
    pub complexity: f64,

    /// How many ranked suggestions a range query returns.
    /// Default: 10
    #[serde(default = "SessionSettings::default_suggestions_per_range")]
    pub suggestions_per_range: usize,

    /// Undo entries kept before the oldest is dropped.
    /// Default: 100
    #[serde(default = "SessionSettings::default_history_depth")]
    pub history_depth: usize,
}

impl SessionSettings {
    fn default_style() -> String {
        "classical".to_string()
    }

    fn default_complexity() -> f64 {
        0.5
    }

    fn default_suggestions_per_range() -> usize {
        10
    }

    fn default_history_depth() -> usize {
        100
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            style: Self::default_style(),
            complexity: Self::default_complexity(),
            suggestions_per_range: Self::default_suggestions_per_range(),
            history_depth: Self::default_history_depth(),
        }
    }
}

/// Register and instrument used by the built-in voicing generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicingSettings {
    /// "piano", "guitar", "ensemble" or "bass".
    /// Default: "piano"
    #[serde(default = "VoicingSettings::default_instrument")]
    pub instrument: String,

    /// Lowest MIDI pitch a voicing may use. Falls back to the instrument preset.
    #[serde(default)]
    pub low_pitch: Option<u8>,

    /// Highest MIDI pitch a voicing may use. Falls back to the instrument preset.
    #[serde(default)]
    pub high_pitch: Option<u8>,

    /// Candidates kept per chord for the DP.
    /// Default: 6
    #[serde(default = "VoicingSettings::default_max_candidates")]
    pub max_candidates: usize,
}

impl VoicingSettings {
    fn default_instrument() -> String {
        "piano".to_string()
    }

    fn default_max_candidates() -> usize {
        6
    }
}

impl Default for VoicingSettings {
    fn default() -> Self {
        Self {
            instrument: Self::default_instrument(),
            low_pitch: None,
            high_pitch: None,
            max_candidates: Self::default_max_candidates(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySettings {
    /// tracing EnvFilter directive.
    /// Default: "info"
    #[serde(default = "TelemetrySettings::default_log_level")]
    pub log_level: String,
}

impl TelemetrySettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
