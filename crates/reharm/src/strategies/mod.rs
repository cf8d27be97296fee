//! Suggestion strategies.
//!
//! The set is closed: six unit types, one per [`StrategyKind`], each a pure
//! function of the progression window it is handed. [`Strategy::suggest`]
//! applies the shared gating (style weight, window bounds) before a
//! strategy's own `propose` runs.

mod chromatic_approach;
mod functional_movement;
mod modal_borrowing;
mod neapolitan;
mod suspension;
mod tritone_substitution;

pub use chromatic_approach::ChromaticApproach;
pub use functional_movement::FunctionalMovement;
pub use modal_borrowing::ModalBorrowing;
pub use neapolitan::Neapolitan;
pub use suspension::Suspension;
pub use tritone_substitution::TritoneSubstitution;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use tracing::debug;

use crate::analysis::{ChordAnalysis, HarmonyAnalyzer};
use crate::style::StyleProfile;
use crate::suggestion::{ChordSuggestion, SuggestionDraft};
use crate::theory::{Chord, ChordProgression, Key, MelodyNote};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    FunctionalMovement,
    ModalBorrowing,
    Neapolitan,
    TritoneSubstitution,
    Suspension,
    ChromaticApproach,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 6] = [
        StrategyKind::FunctionalMovement,
        StrategyKind::ModalBorrowing,
        StrategyKind::Neapolitan,
        StrategyKind::TritoneSubstitution,
        StrategyKind::Suspension,
        StrategyKind::ChromaticApproach,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StrategyKind::FunctionalMovement => "functional_movement",
            StrategyKind::ModalBorrowing => "modal_borrowing",
            StrategyKind::Neapolitan => "neapolitan",
            StrategyKind::TritoneSubstitution => "tritone_substitution",
            StrategyKind::Suspension => "suspension",
            StrategyKind::ChromaticApproach => "chromatic_approach",
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            StrategyKind::FunctionalMovement => {
                "Strengthens tonic-subdominant-dominant motion by replacing or bridging weak moves"
            }
            StrategyKind::ModalBorrowing => {
                "Borrows same-function chords from the parallel mode"
            }
            StrategyKind::Neapolitan => {
                "Offers the Neapolitan sixth as a pre-dominant, mostly in minor"
            }
            StrategyKind::TritoneSubstitution => {
                "Replaces dominant sevenths with the dominant a tritone away"
            }
            StrategyKind::Suspension => {
                "Inserts a sus2/sus4 chord that resolves into the following chord"
            }
            StrategyKind::ChromaticApproach => {
                "Inserts diminished or dominant passing chords across wide root motion"
            }
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        StrategyKind::ALL
            .into_iter()
            .find(|k| k.name() == normalized)
            .ok_or_else(|| Error::UnknownStrategy(s.to_string()))
    }
}

/// Everything a strategy may look at.
#[derive(Clone, Copy)]
pub struct StrategyContext<'a> {
    pub progression: &'a ChordProgression,
    pub key: &'a Key,
    pub analyzer: &'a dyn HarmonyAnalyzer,
    pub melody: &'a [MelodyNote],
    pub style: &'a StyleProfile,
}

impl<'a> StrategyContext<'a> {
    pub fn new(
        progression: &'a ChordProgression,
        key: &'a Key,
        analyzer: &'a dyn HarmonyAnalyzer,
        melody: &'a [MelodyNote],
        style: &'a StyleProfile,
    ) -> Self {
        Self {
            progression,
            key,
            analyzer,
            melody,
            style,
        }
    }

    pub fn chord(&self, position: usize) -> Option<&'a Chord> {
        self.progression.chord(position)
    }

    pub fn analyze(&self, position: usize) -> Option<ChordAnalysis> {
        self.chord(position).map(|c| self.analyze_chord(c))
    }

    pub fn analyze_chord(&self, chord: &Chord) -> ChordAnalysis {
        self.analyzer.analyze(chord, self.key)
    }

    pub fn melody_at(&self, position: usize) -> Vec<&'a MelodyNote> {
        self.progression.melody_at(position, self.melody)
    }

    /// The last two chords form the cadence.
    pub fn is_cadential(&self, position: usize) -> bool {
        position + 2 >= self.progression.len()
    }
}

/// A suggestion strategy.
pub trait Strategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Proposals within `window`, which is non-empty and inside the progression.
    fn propose(&self, ctx: &StrategyContext<'_>, window: Range<usize>) -> Vec<ChordSuggestion>;

    /// Proposals whose position lies in `window`.
    ///
    /// Empty when the style weight is zero or the window misses the progression.
    fn suggest(&self, ctx: &StrategyContext<'_>, window: Range<usize>) -> Vec<ChordSuggestion> {
        if ctx.style.strategy_weight(self.kind()) <= 0.0 {
            debug!(strategy = self.name(), style = ctx.style.name(), "strategy disabled by style");
            return Vec::new();
        }

        let len = ctx.progression.len();
        if window.start >= window.end || window.start >= len {
            debug!(
                strategy = self.name(),
                start = window.start,
                end = window.end,
                len,
                "window outside progression"
            );
            return Vec::new();
        }

        self.propose(ctx, window.start..window.end.min(len))
    }
}

static FUNCTIONAL_MOVEMENT: FunctionalMovement = FunctionalMovement;
static MODAL_BORROWING: ModalBorrowing = ModalBorrowing;
static NEAPOLITAN: Neapolitan = Neapolitan;
static TRITONE_SUBSTITUTION: TritoneSubstitution = TritoneSubstitution;
static SUSPENSION: Suspension = Suspension;
static CHROMATIC_APPROACH: ChromaticApproach = ChromaticApproach;

/// The implementation behind a kind.
pub fn strategy(kind: StrategyKind) -> &'static dyn Strategy {
    match kind {
        StrategyKind::FunctionalMovement => &FUNCTIONAL_MOVEMENT,
        StrategyKind::ModalBorrowing => &MODAL_BORROWING,
        StrategyKind::Neapolitan => &NEAPOLITAN,
        StrategyKind::TritoneSubstitution => &TRITONE_SUBSTITUTION,
        StrategyKind::Suspension => &SUSPENSION,
        StrategyKind::ChromaticApproach => &CHROMATIC_APPROACH,
    }
}

/// Voice-leading estimate from common tones and root motion.
pub fn voice_leading_quality(from: &Chord, to: &Chord) -> f64 {
    let a = from.pitch_classes();
    let b = to.pitch_classes();
    let max_common = a.len().min(b.len());
    if max_common == 0 {
        return 0.5;
    }
    let common = a.iter().filter(|pc| b.contains(pc)).count();
    let common_ratio = common as f64 / max_common as f64;

    let motion = from.root_motion_to(to);
    let distance = motion.min(12 - motion);
    let bonus = match distance {
        5 => 0.2,
        3 | 4 => 0.15,
        1 | 2 => 0.1,
        _ => 0.0,
    };
    let root_quality = 1.0 - distance as f64 / 12.0 + bonus;

    (common_ratio * 0.6 + root_quality * 0.4).clamp(0.0, 1.0)
}

/// Build a draft, dropping it (with a debug log) if it breaks an invariant.
pub(crate) fn finish(draft: SuggestionDraft) -> Option<ChordSuggestion> {
    let source = draft.strategy_source;
    match draft.build() {
        Ok(suggestion) => Some(suggestion),
        Err(e) => {
            debug!(strategy = source.name(), error = %e, "discarding malformed suggestion");
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::analysis::DiatonicAnalyzer;

    pub struct Fixture {
        pub progression: ChordProgression,
        pub key: Key,
        pub melody: Vec<MelodyNote>,
        pub style: StyleProfile,
    }

    impl Fixture {
        pub fn new(symbols: &str, key: &str, style: &str) -> Self {
            Self {
                progression: ChordProgression::parse(symbols, 4.0).unwrap(),
                key: Key::parse(key).unwrap(),
                melody: Vec::new(),
                style: StyleProfile::named(style).unwrap(),
            }
        }

        pub fn with_melody(mut self, melody: Vec<MelodyNote>) -> Self {
            self.melody = melody;
            self
        }

        pub fn run(&self, strategy: &dyn Strategy) -> Vec<ChordSuggestion> {
            let ctx = StrategyContext::new(
                &self.progression,
                &self.key,
                &DiatonicAnalyzer,
                &self.melody,
                &self.style,
            );
            strategy.suggest(&ctx, 0..self.progression.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::Fixture;
    use super::*;
    use crate::theory::ChordQuality;

    #[test]
    fn kinds_round_trip_through_names() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.name().parse::<StrategyKind>().unwrap(), kind);
            assert!(!kind.describe().is_empty());
        }
        assert_eq!(
            "tritone-substitution".parse::<StrategyKind>().unwrap(),
            StrategyKind::TritoneSubstitution
        );
        assert!("subv7".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn out_of_range_window_is_empty() {
        let fixture = Fixture::new("C Am Dm G7", "C major", "jazz");
        let ctx = StrategyContext::new(
            &fixture.progression,
            &fixture.key,
            &crate::analysis::DiatonicAnalyzer,
            &fixture.melody,
            &fixture.style,
        );
        for kind in StrategyKind::ALL {
            assert!(strategy(kind).suggest(&ctx, 4..8).is_empty());
            assert!(strategy(kind).suggest(&ctx, 2..2).is_empty());
        }
    }

    #[test]
    fn zero_weight_disables_strategy() {
        let fixture = Fixture::new("Dm7 G7 Cmaj7", "C major", "classical");
        assert_eq!(fixture.style.strategy_weight(StrategyKind::TritoneSubstitution), 0.0);
        assert!(fixture.run(strategy(StrategyKind::TritoneSubstitution)).is_empty());
    }

    #[test]
    fn voice_leading_prefers_common_tones() {
        let c = Chord::new(0, ChordQuality::Major);
        let am = Chord::new(9, ChordQuality::Minor);
        let fsharp = Chord::new(6, ChordQuality::Major);
        assert!(voice_leading_quality(&c, &am) > voice_leading_quality(&c, &fsharp));
        let same = voice_leading_quality(&c, &c);
        assert!((0.0..=1.0).contains(&same));
    }
}
