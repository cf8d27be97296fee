//! Chord reharmonization engine.
//!
//! Six suggestion strategies propose replacements and insertions over a
//! window of a progression; the [`ScoringEngine`] folds confidence, voice
//! leading, functional motion, melodic consonance and variety into one
//! comparable score; [`BeamSearchOptimizer`] picks a coherent set of
//! substitutions in batch, while [`InteractiveSession`] lets a caller
//! accept, reject, lock and undo them one at a time. [`VoicingOptimizer`]
//! then voices the finished progression.
//!
//! ```rust,no_run
//! use reharm::{ChordProgression, InteractiveSession, Key, StyleProfile};
//!
//! let progression = ChordProgression::parse("Cmaj7 Am7 Dm7 G7", 4.0)?;
//! let style = StyleProfile::named("jazz")?;
//! let key = Key::parse("C major")?;
//! let mut session = InteractiveSession::new(progression, key, Vec::new(), style)?;
//!
//! let suggestions = session.get_suggestions_for_range(0, 4, 5, None, None)?;
//! if let Some(best) = suggestions.first() {
//!     session.accept_suggestion(&best.suggestion)?;
//! }
//! println!("{}", session.current_progression());
//! # Ok::<(), reharm::Error>(())
//! ```

pub mod analysis;
pub mod cache;
pub mod chord_templates;
pub mod engine;
pub mod scoring;
pub mod search;
pub mod session;
pub mod strategies;
pub mod style;
pub mod suggestion;
pub mod theory;
pub mod voicing;

pub use analysis::{ChordAnalysis, DiatonicAnalyzer, HarmonicFunction, HarmonyAnalyzer};
pub use cache::SuggestionCache;
pub use engine::{RankedSuggestion, SuggestionEngine};
pub use scoring::{ScoreBreakdown, ScoringContext, ScoringEngine};
pub use search::{BeamSearchOptimizer, SearchConfig, SearchConstraints, SearchOutcome};
pub use session::{
    InteractiveSession, PositionDiff, ReharmonizationState, SectionRange, SessionSnapshot,
};
pub use strategies::{Strategy, StrategyContext, StrategyKind};
pub use style::{
    Complexity, ScoringWeights, StrategyWeights, StyleProfile, StyleRegistry, StyleRules,
};
pub use suggestion::{ChordSuggestion, SubstitutionType, SuggestionDraft, SuggestionFingerprint};
pub use theory::{Chord, ChordProgression, ChordQuality, ChordSlot, Key, KeyMode, MelodyNote};
pub use voicing::{
    ChordVoicing, VoicedNote, VoicingConstraints, VoicingGenerator, VoicingKind, VoicingOptimizer,
    VoicingPlan,
};

/// Broad class of an [`Error`], separating bad configuration from bad
/// values and from protocol misuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown style, complexity or weights outside [0, 1], bad search or voicing limits.
    Configuration,
    /// A value that cannot exist: malformed suggestion, chord symbol, key or voicing.
    Construction,
    /// Caller misuse of a session: locked position, empty history, unknown section.
    Protocol,
}

/// Errors from reharmonization operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown style: {0}")]
    UnknownStyle(String),

    #[error("style {style}: {field} = {value} is outside [0, 1]")]
    InvalidStyle {
        style: String,
        field: String,
        value: f64,
    },

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error("complexity {0} is outside [0, 1]")]
    InvalidComplexity(f64),

    #[error("invalid search configuration: {0}")]
    InvalidSearchConfig(String),

    #[error("invalid voicing constraints: {0}")]
    InvalidVoicingConstraints(String),

    #[error(transparent)]
    Config(#[from] reharmconf::ConfigError),

    #[error("invalid suggestion: {0}")]
    InvalidSuggestion(String),

    #[error("cannot parse chord symbol {0:?}")]
    ChordParse(String),

    #[error("cannot parse key {0:?}")]
    KeyParse(String),

    #[error("invalid chord: {0}")]
    InvalidChord(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid progression: {0}")]
    InvalidProgression(String),

    #[error("invalid voicing: {0}")]
    InvalidVoicing(String),

    #[error("session snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    #[error("position {0} is locked")]
    PositionLocked(usize),

    #[error("position {position} is out of range for a progression of {len} chords")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("invalid range {start}..{end} for a progression of {len} chords")]
    InvalidRange { start: usize, end: usize, len: usize },

    #[error("suggestion targets {expected} at position {position}, but {found} is there now")]
    StaleSuggestion {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("unknown section: {0}")]
    UnknownSection(String),

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("nothing to redo")]
    NothingToRedo,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownStyle(_)
            | Error::InvalidStyle { .. }
            | Error::UnknownStrategy(_)
            | Error::InvalidComplexity(_)
            | Error::InvalidSearchConfig(_)
            | Error::InvalidVoicingConstraints(_)
            | Error::Config(_) => ErrorKind::Configuration,
            Error::InvalidSuggestion(_)
            | Error::ChordParse(_)
            | Error::KeyParse(_)
            | Error::InvalidChord(_)
            | Error::InvalidKey(_)
            | Error::InvalidProgression(_)
            | Error::InvalidVoicing(_)
            | Error::Snapshot(_) => ErrorKind::Construction,
            Error::PositionLocked(_)
            | Error::PositionOutOfRange { .. }
            | Error::InvalidRange { .. }
            | Error::StaleSuggestion { .. }
            | Error::UnknownSection(_)
            | Error::NothingToUndo
            | Error::NothingToRedo => ErrorKind::Protocol,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_follow_the_taxonomy() {
        assert_eq!(Error::UnknownStyle("x".into()).kind(), ErrorKind::Configuration);
        assert_eq!(Error::InvalidComplexity(2.0).kind(), ErrorKind::Configuration);
        assert_eq!(Error::InvalidSuggestion("x".into()).kind(), ErrorKind::Construction);
        assert_eq!(Error::PositionLocked(1).kind(), ErrorKind::Protocol);
        assert_eq!(Error::NothingToUndo.kind(), ErrorKind::Protocol);
    }
}
